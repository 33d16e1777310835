//! Typed, directional statement parameters

use crate::Value;
use serde::{Deserialize, Serialize};

/// Direction of a statement parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParamDirection {
    #[default]
    In,
    Out,
    InOut,
}

/// Declared driver type of a parameter.
///
/// Each variant maps to the PostgreSQL type name used when the parameter is
/// rendered as a typed placeholder (`$1::varchar`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    /// Let the server infer the type
    #[default]
    Unspecified,
    Varchar,
    Text,
    Smallint,
    Integer,
    Bigint,
    Real,
    Double,
    Numeric,
    Boolean,
    Json,
    Jsonb,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Uuid,
    Bytea,
    /// Name of an open server-side cursor
    Refcursor,
}

impl ParamType {
    /// PostgreSQL type name, `None` for [`ParamType::Unspecified`]
    pub fn pg_type_name(&self) -> Option<&'static str> {
        let name = match self {
            ParamType::Unspecified => return None,
            ParamType::Varchar => "varchar",
            ParamType::Text => "text",
            ParamType::Smallint => "int2",
            ParamType::Integer => "int4",
            ParamType::Bigint => "int8",
            ParamType::Real => "float4",
            ParamType::Double => "float8",
            ParamType::Numeric => "numeric",
            ParamType::Boolean => "bool",
            ParamType::Json => "json",
            ParamType::Jsonb => "jsonb",
            ParamType::Date => "date",
            ParamType::Time => "time",
            ParamType::Timestamp => "timestamp",
            ParamType::TimestampTz => "timestamptz",
            ParamType::Uuid => "uuid",
            ParamType::Bytea => "bytea",
            ParamType::Refcursor => "refcursor",
        };
        Some(name)
    }

    pub fn is_cursor(&self) -> bool {
        matches!(self, ParamType::Refcursor)
    }
}

/// A logical parameter descriptor: `(name, direction, type, value)`.
///
/// `value == None` means "not supplied". Binding turns an unsupplied
/// `InOut` parameter into an explicit [`Value::Null`].
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub direction: ParamDirection,
    pub param_type: ParamType,
    pub value: Option<Value>,
}

impl Parameter {
    pub fn new(
        name: impl Into<String>,
        direction: ParamDirection,
        param_type: ParamType,
        value: Option<Value>,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            param_type,
            value,
        }
    }

    /// An input parameter with a value
    pub fn input(name: impl Into<String>, param_type: ParamType, value: impl Into<Value>) -> Self {
        Self::new(name, ParamDirection::In, param_type, Some(value.into()))
    }

    /// A pure output parameter
    pub fn output(name: impl Into<String>, param_type: ParamType) -> Self {
        Self::new(name, ParamDirection::Out, param_type, None)
    }

    /// An input/output parameter, optionally with an initial value
    pub fn input_output(
        name: impl Into<String>,
        param_type: ParamType,
        value: Option<Value>,
    ) -> Self {
        Self::new(name, ParamDirection::InOut, param_type, value)
    }

    /// An `InOut` cursor reference whose initial value is its own name
    pub fn cursor(name: impl Into<String>) -> Self {
        let name = name.into();
        let value = Value::String(name.clone());
        Self::new(name, ParamDirection::InOut, ParamType::Refcursor, Some(value))
    }

    pub fn is_cursor(&self) -> bool {
        self.param_type.is_cursor()
    }

    /// The value sent to the driver: unsupplied values go out as NULL
    pub fn effective_value(&self) -> Value {
        self.value.clone().unwrap_or(Value::Null)
    }
}
