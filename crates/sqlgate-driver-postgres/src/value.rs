//! Conversion between gateway values and PostgreSQL wire values

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use postgres_types::{Format, FromSql, IsNull, ToSql, Type};
use sqlgate_core::{ColumnMeta, Result, Row, SqlgateError, Value};
use tokio_postgres::Row as PgRow;

type BoxError = Box<dyn std::error::Error + Sync + Send>;

/// Owned parameter value that tokio-postgres can encode.
///
/// Built against the parameter types of a prepared statement so integers are
/// written with the width the server expects (4 bytes for INT4, not 8).
#[derive(Debug)]
pub(crate) enum PgValue {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    Json(serde_json::Value),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeUtc(DateTime<Utc>),
}

impl PgValue {
    /// Convert a gateway value for a parameter the server typed as `target`.
    ///
    /// Integers that do not fit the target width are rejected.
    pub(crate) fn for_type(value: &Value, target: Option<&Type>) -> Result<Self> {
        let Some(target) = target else {
            return Ok(Self::from_value(value));
        };

        let converted = match value {
            Value::Int8(v) => Self::coerce_int(i64::from(*v), target)?,
            Value::Int16(v) => Self::coerce_int(i64::from(*v), target)?,
            Value::Int32(v) => Self::coerce_int(i64::from(*v), target)?,
            Value::Int64(v) => Self::coerce_int(*v, target)?,
            Value::Float32(v) if *target == Type::FLOAT8 => PgValue::Float64(f64::from(*v)),
            Value::Float64(v) if *target == Type::FLOAT4 => PgValue::Float32(*v as f32),
            Value::String(v) => Self::coerce_string(v, target),
            _ => Self::from_value(value),
        };
        Ok(converted)
    }

    fn coerce_int(value: i64, target: &Type) -> Result<Self> {
        let out_of_range =
            || SqlgateError::Statement(format!("value {value} out of range for {}", target.name()));
        let converted = match *target {
            Type::INT2 => PgValue::Int16(i16::try_from(value).map_err(|_| out_of_range())?),
            Type::INT4 => PgValue::Int32(i32::try_from(value).map_err(|_| out_of_range())?),
            Type::FLOAT4 => PgValue::Float32(value as f32),
            Type::FLOAT8 => PgValue::Float64(value as f64),
            Type::INT8 => PgValue::Int64(value),
            _ => PgValue::Text(value.to_string()),
        };
        Ok(converted)
    }

    /// Strings bound to typed placeholders are parsed into the target type
    /// when they can be; otherwise they go out as text.
    fn coerce_string(value: &str, target: &Type) -> Self {
        let parsed = match *target {
            Type::JSON | Type::JSONB => serde_json::from_str(value).ok().map(PgValue::Json),
            Type::BOOL => value.parse::<bool>().ok().map(PgValue::Bool),
            Type::INT2 => value.parse::<i16>().ok().map(PgValue::Int16),
            Type::INT4 => value.parse::<i32>().ok().map(PgValue::Int32),
            Type::INT8 => value.parse::<i64>().ok().map(PgValue::Int64),
            Type::FLOAT4 => value.parse::<f32>().ok().map(PgValue::Float32),
            Type::FLOAT8 => value.parse::<f64>().ok().map(PgValue::Float64),
            Type::UUID => uuid::Uuid::parse_str(value).ok().map(PgValue::Uuid),
            Type::DATE => NaiveDate::parse_from_str(value, "%Y-%m-%d").ok().map(PgValue::Date),
            Type::TIME => parse_time(value).map(PgValue::Time),
            Type::TIMESTAMP => parse_timestamp(value).map(PgValue::DateTime),
            Type::TIMESTAMPTZ => DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|ts| ts.with_timezone(&Utc))
                .or_else(|| parse_timestamp(value).map(|ts| ts.and_utc()))
                .map(PgValue::DateTimeUtc),
            _ => None,
        };
        parsed.unwrap_or_else(|| PgValue::Text(value.to_string()))
    }

    /// Fallback used when the target type is unknown
    pub(crate) fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => PgValue::Null,
            Value::Bool(v) => PgValue::Bool(*v),
            Value::Int8(v) => PgValue::Int16(*v as i16),
            Value::Int16(v) => PgValue::Int16(*v),
            Value::Int32(v) => PgValue::Int32(*v),
            Value::Int64(v) => PgValue::Int64(*v),
            Value::Float32(v) => PgValue::Float32(*v),
            Value::Float64(v) => PgValue::Float64(*v),
            Value::Decimal(v) | Value::String(v) => PgValue::Text(v.clone()),
            Value::Bytes(v) => PgValue::Bytes(v.clone()),
            Value::Uuid(v) => PgValue::Uuid(*v),
            Value::Json(v) => PgValue::Json(v.clone()),
            Value::Date(v) => PgValue::Date(*v),
            Value::Time(v) => PgValue::Time(*v),
            Value::DateTime(v) => PgValue::DateTime(*v),
            Value::DateTimeUtc(v) => PgValue::DateTimeUtc(*v),
            Value::Array(_) => PgValue::Text(value.to_string()),
        }
    }
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S%.f"))
        .ok()
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

impl ToSql for PgValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        match self {
            PgValue::Null => Ok(IsNull::Yes),
            PgValue::Bool(v) => v.to_sql(ty, out),
            PgValue::Int16(v) => v.to_sql(ty, out),
            PgValue::Int32(v) => v.to_sql(ty, out),
            PgValue::Int64(v) => v.to_sql(ty, out),
            PgValue::Float32(v) => v.to_sql(ty, out),
            PgValue::Float64(v) => v.to_sql(ty, out),
            PgValue::Text(v) => {
                out.extend_from_slice(v.as_bytes());
                Ok(IsNull::No)
            }
            PgValue::Bytes(v) => v.to_sql(ty, out),
            PgValue::Uuid(v) => v.to_sql(ty, out),
            PgValue::Json(v) => v.to_sql(ty, out),
            PgValue::Date(v) => v.to_sql(ty, out),
            PgValue::Time(v) => v.to_sql(ty, out),
            PgValue::DateTime(v) => v.to_sql(ty, out),
            PgValue::DateTimeUtc(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    /// Text values go out in text format so the server parses them into the
    /// target type (numeric, float8, jsonb, ...).
    fn encode_format(&self, _ty: &Type) -> Format {
        match self {
            PgValue::Text(_) => Format::Text,
            _ => Format::Binary,
        }
    }

    postgres_types::to_sql_checked!();
}

/// Binary NUMERIC decoded to its exact decimal text
#[derive(Debug)]
struct PgNumeric(String);

impl PgNumeric {
    const NAN: u16 = 0xC000;
    const NEGATIVE: u16 = 0x4000;

    fn decode(raw: &[u8]) -> std::result::Result<String, BoxError> {
        let header = |at: usize| -> std::result::Result<u16, BoxError> {
            raw.get(at..at + 2)
                .map(|b| u16::from_be_bytes([b[0], b[1]]))
                .ok_or_else(|| "invalid NUMERIC payload: too short".into())
        };

        let ndigits = header(0)? as usize;
        let weight = header(2)? as i16;
        let sign = header(4)?;
        let dscale = header(6)? as usize;

        if sign == Self::NAN {
            return Ok("NaN".to_string());
        }

        let digits = (0..ndigits)
            .map(|index| {
                let group = header(8 + index * 2)?;
                if group > 9999 {
                    return Err::<u16, BoxError>(
                        "invalid NUMERIC payload: group out of range".into(),
                    );
                }
                Ok(group)
            })
            .collect::<std::result::Result<Vec<u16>, BoxError>>()?;

        if digits.is_empty() {
            return Ok("0".to_string());
        }

        let integer_groups = if weight >= 0 { weight as usize + 1 } else { 0 };
        let mut integer = String::new();
        for index in 0..integer_groups {
            let group = digits.get(index).copied().unwrap_or(0);
            if index == 0 {
                integer.push_str(&group.to_string());
            } else {
                integer.push_str(&format!("{group:04}"));
            }
        }
        if integer.is_empty() {
            integer.push('0');
        }

        let mut fraction = String::new();
        if dscale > 0 {
            // Negative weight means leading zero groups after the point
            let leading_zero_groups = if weight < -1 { (-weight - 1) as usize } else { 0 };
            fraction.push_str(&"0000".repeat(leading_zero_groups));
            for group in digits.iter().skip(integer_groups.min(digits.len())) {
                fraction.push_str(&format!("{group:04}"));
            }
            if fraction.len() < dscale {
                fraction.push_str(&"0".repeat(dscale - fraction.len()));
            } else {
                fraction.truncate(dscale);
            }
            while fraction.ends_with('0') {
                fraction.pop();
            }
        }

        let mut output = String::new();
        if sign == Self::NEGATIVE && !(integer == "0" && fraction.is_empty()) {
            output.push('-');
        }
        output.push_str(&integer);
        if !fraction.is_empty() {
            output.push('.');
            output.push_str(&fraction);
        }
        Ok(output)
    }
}

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        Ok(Self(Self::decode(raw)?))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Raw UTF-8 payload for types without a dedicated decoder (enums, refcursor, citext)
#[derive(Debug)]
struct PgRawText(String);

impl<'a> FromSql<'a> for PgRawText {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        Ok(Self(String::from_utf8(raw.to_vec())?))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

fn cell<'a, T, F>(row: &'a PgRow, idx: usize, wrap: F) -> Value
where
    T: FromSql<'a>,
    F: FnOnce(T) -> Value,
{
    match row.try_get::<_, Option<T>>(idx) {
        Ok(Some(value)) => wrap(value),
        Ok(None) => Value::Null,
        Err(e) => {
            tracing::debug!(
                column = idx,
                error = %e,
                "column value could not be decoded, using NULL"
            );
            Value::Null
        }
    }
}

fn array<'a, T, F>(row: &'a PgRow, idx: usize, wrap: F) -> Value
where
    T: FromSql<'a>,
    F: Fn(T) -> Value,
{
    cell::<Vec<T>, _>(row, idx, |items| Value::Array(items.into_iter().map(wrap).collect()))
}

/// Convert one column of a PostgreSQL row into a gateway value
pub(crate) fn postgres_to_value(row: &PgRow, idx: usize) -> Value {
    let type_name = row.columns()[idx].type_().name();

    match type_name {
        "bool" => cell(row, idx, Value::Bool),
        "int2" => cell(row, idx, Value::Int16),
        "int4" => cell(row, idx, Value::Int32),
        "int8" => cell(row, idx, Value::Int64),
        "oid" => cell::<u32, _>(row, idx, |v| Value::Int64(v as i64)),
        "float4" => cell(row, idx, Value::Float32),
        "float8" => cell(row, idx, Value::Float64),
        "numeric" => cell(row, idx, |v: PgNumeric| Value::Decimal(v.0)),
        "text" | "varchar" | "bpchar" | "name" => cell(row, idx, Value::String),
        "bytea" => cell(row, idx, Value::Bytes),
        "uuid" => cell(row, idx, Value::Uuid),
        "json" | "jsonb" => cell(row, idx, Value::Json),
        "date" => cell(row, idx, Value::Date),
        "time" => cell(row, idx, Value::Time),
        "timestamp" => cell(row, idx, Value::DateTime),
        "timestamptz" => cell(row, idx, Value::DateTimeUtc),
        // PostgreSQL prefixes array type names with an underscore
        "_text" | "_varchar" | "_bpchar" | "_name" => array(row, idx, Value::String),
        "_int2" => array(row, idx, Value::Int16),
        "_int4" => array(row, idx, Value::Int32),
        "_int8" => array(row, idx, Value::Int64),
        "_bool" => array(row, idx, Value::Bool),
        _ => cell(row, idx, |v: PgRawText| Value::String(v.0)),
    }
}

/// Column metadata for a prepared statement or row
pub(crate) fn columns_meta(columns: &[tokio_postgres::Column]) -> Vec<ColumnMeta> {
    columns
        .iter()
        .enumerate()
        .map(|(ordinal, col)| ColumnMeta::new(col.name(), col.type_().name(), ordinal))
        .collect()
}

/// Convert a PostgreSQL row, sharing `names` across the rows of one result
pub(crate) fn convert_row(row: &PgRow, names: &[String]) -> Result<Row> {
    let values = (0..row.len()).map(|idx| postgres_to_value(row, idx)).collect();
    Ok(Row::new(names.to_vec(), values))
}
