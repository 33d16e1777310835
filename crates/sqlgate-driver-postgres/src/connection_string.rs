//! Connection string parsing
//!
//! Three spellings are accepted:
//!
//! - libpq key/value: `host=db port=5432 dbname=app user=svc`
//! - URL: `postgres://svc:secret@db:5432/app?sslmode=require`
//! - ADO.NET: `Server=db;Port=5432;Database=app;User Id=svc;Password=secret`
//!
//! TLS keys (`sslmode`, `sslrootcert`, `sslcert`, `sslkey`) and the
//! command timeout are pulled out before the remainder is handed to
//! `tokio_postgres::Config`, which does not understand all of them.

use crate::tls::{TlsConfig, TlsMode};
use sqlgate_core::{Result, SqlgateError};
use std::str::FromStr;
use std::time::Duration;
use tokio_postgres::Config;

/// Everything needed to open one PostgreSQL session
#[derive(Debug, Clone)]
pub struct PostgresConnectOptions {
    pub config: Config,
    pub tls: TlsConfig,
    /// Default deadline for statements issued with this connection string
    pub command_timeout: Option<Duration>,
}

/// Parse any supported connection string form
pub fn parse_connection_string(connection_string: &str) -> Result<PostgresConnectOptions> {
    let trimmed = connection_string.trim();
    if trimmed.is_empty() {
        return Err(SqlgateError::Configuration("connection string is empty".into()));
    }

    if trimmed.starts_with("postgres://") || trimmed.starts_with("postgresql://") {
        parse_url(trimmed)
    } else if is_ado_style(trimmed) {
        parse_ado(trimmed)
    } else {
        parse_key_value(trimmed)
    }
}

/// ADO.NET strings are `;` separated and use mixed-case keys with spaces
fn is_ado_style(connection_string: &str) -> bool {
    if connection_string.contains(';') {
        return true;
    }
    connection_string
        .split('=')
        .next()
        .map(|key| key.trim().chars().any(|c| c.is_ascii_uppercase() || c == ' '))
        .unwrap_or(false)
}

/// Keys handled here instead of by tokio-postgres
#[derive(Debug, Default)]
struct Extracted {
    tls: TlsConfig,
    command_timeout: Option<Duration>,
}

impl Extracted {
    /// Returns false when `key` is not one of ours
    fn take(&mut self, key: &str, value: &str) -> Result<bool> {
        match key {
            "sslmode" => self.tls.mode = parse_tls_mode(value)?,
            "sslrootcert" => self.tls.ca_cert = non_empty(value).map(Into::into),
            "sslcert" => self.tls.client_cert = non_empty(value).map(Into::into),
            "sslkey" => self.tls.client_key = non_empty(value).map(Into::into),
            "command_timeout" => self.command_timeout = parse_seconds(key, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

fn parse_key_value(connection_string: &str) -> Result<PostgresConnectOptions> {
    let mut extracted = Extracted::default();
    let mut rest = Vec::new();

    for (key, value) in tokenize_key_value(connection_string)? {
        if !extracted.take(&key, &value)? {
            rest.push(format!("{key}={}", quote_key_value(&value)));
        }
    }

    let config = Config::from_str(&rest.join(" ")).map_err(invalid)?;
    Ok(finish(config, extracted))
}

fn parse_url(connection_string: &str) -> Result<PostgresConnectOptions> {
    let mut extracted = Extracted::default();

    let (base, query) = match connection_string.split_once('?') {
        Some((base, query)) => (base, query),
        None => (connection_string, ""),
    };

    let mut kept = Vec::new();
    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if !extracted.take(key, value)? {
            kept.push(pair);
        }
    }

    let url = if kept.is_empty() {
        base.to_string()
    } else {
        format!("{base}?{}", kept.join("&"))
    };

    let config = Config::from_str(&url).map_err(invalid)?;
    Ok(finish(config, extracted))
}

fn parse_ado(connection_string: &str) -> Result<PostgresConnectOptions> {
    let mut config = Config::new();
    let mut extracted = Extracted::default();
    let mut search_path = None;
    let mut has_host = false;

    for (key, value) in tokenize_ado(connection_string)? {
        let normalized: String = key
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "server" | "host" | "datasource" => {
                for host in value.split(',').map(str::trim).filter(|h| !h.is_empty()) {
                    config.host(host);
                    has_host = true;
                }
            }
            "port" => {
                let port = value.trim().parse::<u16>().map_err(|_| {
                    SqlgateError::Configuration(format!(
                        "invalid port in connection string: {value}"
                    ))
                })?;
                config.port(port);
            }
            "database" | "initialcatalog" | "db" => {
                config.dbname(&value);
            }
            "userid" | "user" | "username" | "uid" => {
                config.user(&value);
            }
            "password" | "pwd" | "psw" => {
                config.password(value.as_bytes());
            }
            "timeout" => {
                if let Some(timeout) = parse_seconds(&key, &value)? {
                    config.connect_timeout(timeout);
                }
            }
            "commandtimeout" => extracted.command_timeout = parse_seconds(&key, &value)?,
            "sslmode" => extracted.tls.mode = parse_tls_mode(&value)?,
            "trustservercertificate" => extracted.tls.verify_server = !parse_bool(&key, &value)?,
            "rootcertificate" | "sslrootcert" => {
                extracted.tls.ca_cert = non_empty(&value).map(Into::into)
            }
            "sslcertificate" | "sslcert" => {
                extracted.tls.client_cert = non_empty(&value).map(Into::into)
            }
            "sslkey" => {
                extracted.tls.client_key = non_empty(&value).map(Into::into)
            }
            "applicationname" => {
                config.application_name(&value);
            }
            "searchpath" => search_path = non_empty(&value).map(str::to_string),
            "keepalive" => {
                if let Some(idle) = parse_seconds(&key, &value)? {
                    config.keepalives(true).keepalives_idle(idle);
                }
            }
            "pooling" | "minpoolsize" | "maxpoolsize" | "connectionidlelifetime"
            | "connectionpruninginterval" => {
                tracing::debug!(key = %key, "pool setting ignored; sessions are opened per call");
            }
            _ => {
                tracing::debug!(key = %key, "unknown connection string key ignored");
            }
        }
    }

    if !has_host {
        config.host("localhost");
    }

    if let Some(search_path) = search_path {
        config.options(&format!("-c search_path={search_path}"));
    }

    Ok(finish(config, extracted))
}

fn finish(mut config: Config, extracted: Extracted) -> PostgresConnectOptions {
    config.ssl_mode(extracted.tls.mode.ssl_mode());
    PostgresConnectOptions {
        config,
        tls: extracted.tls,
        command_timeout: extracted.command_timeout,
    }
}

/// Split `Key=Value;Key2="quoted;value"` into pairs.
///
/// Values may be wrapped in single or double quotes; a doubled quote inside
/// a quoted value stands for one quote character.
fn tokenize_ado(input: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace() || *c == ';') {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        for c in chars.by_ref() {
            if c == '=' {
                break;
            }
            key.push(c);
        }
        let key = key.trim().to_string();
        if key.is_empty() {
            return Err(SqlgateError::Configuration(
                "connection string contains a value without a key".into(),
            ));
        }

        while matches!(chars.peek(), Some(c) if *c == ' ' || *c == '\t') {
            chars.next();
        }

        let mut value = String::new();
        match chars.peek().copied() {
            Some(quote @ ('"' | '\'')) => {
                chars.next();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    if c == quote {
                        if chars.peek() == Some(&quote) {
                            chars.next();
                            value.push(quote);
                        } else {
                            closed = true;
                            break;
                        }
                    } else {
                        value.push(c);
                    }
                }
                if !closed {
                    return Err(SqlgateError::Configuration(format!(
                        "unterminated quoted value for key {key}"
                    )));
                }
                for c in chars.by_ref() {
                    if c == ';' {
                        break;
                    }
                }
            }
            _ => {
                for c in chars.by_ref() {
                    if c == ';' {
                        break;
                    }
                    value.push(c);
                }
                value = value.trim().to_string();
            }
        }

        pairs.push((key, value));
    }

    Ok(pairs)
}

/// Split a libpq `key=value key='quoted value'` string into pairs
fn tokenize_key_value(input: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c.is_whitespace() {
                break;
            }
            key.push(c);
            chars.next();
        }
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        if chars.next() != Some('=') {
            return Err(SqlgateError::Configuration(format!(
                "expected `=` after connection string key {key}"
            )));
        }
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }

        let mut value = String::new();
        if chars.peek() == Some(&'\'') {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '\'' => {
                        closed = true;
                        break;
                    }
                    other => value.push(other),
                }
            }
            if !closed {
                return Err(SqlgateError::Configuration(format!(
                    "unterminated quoted value for key {key}"
                )));
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                if c == '\\' {
                    chars.next();
                    if let Some(escaped) = chars.next() {
                        value.push(escaped);
                    }
                    continue;
                }
                value.push(c);
                chars.next();
            }
        }

        pairs.push((key, value));
    }

    Ok(pairs)
}

fn quote_key_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

fn parse_tls_mode(value: &str) -> Result<TlsMode> {
    TlsMode::parse(value)
        .ok_or_else(|| SqlgateError::Configuration(format!("unknown SSL mode: {value}")))
}

/// Whole seconds; `0` means no limit
fn parse_seconds(key: &str, value: &str) -> Result<Option<Duration>> {
    let seconds = value.trim().parse::<u64>().map_err(|_| {
        SqlgateError::Configuration(format!("{key} must be a whole number of seconds, got {value}"))
    })?;
    Ok((seconds > 0).then(|| Duration::from_secs(seconds)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(SqlgateError::Configuration(format!("{key} must be true or false, got {value}"))),
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

fn invalid(e: tokio_postgres::Error) -> SqlgateError {
    SqlgateError::Configuration(format!("invalid connection string: {e}"))
}

#[cfg(test)]
mod tests;
