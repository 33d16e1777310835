//! Call text for cursor-returning procedures
//!
//! Every piece of caller-supplied text that ends up inside the procedure
//! call goes through this module. The payload is either inlined as an
//! escaped literal (the convention the procedures were written against) or
//! bound as `$1`; cursor names are always escaped literals and procedure
//! names must be plain or double-quoted identifiers.

use sqlgate_core::{Result, SqlgateError, Value};

/// How the input payload reaches the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadBinding {
    /// `call proc('<payload>', ...)` with quotes doubled
    #[default]
    Inline,
    /// `call proc($1::varchar, ...)` with the payload as a bound argument
    Placeholder,
}

/// A rendered call and the arguments it expects
#[derive(Debug, Clone, PartialEq)]
pub struct CallStatement {
    pub text: String,
    pub arguments: Vec<Value>,
}

/// Render `call <procedure>(<payload>, '<cursor>', ...)`
pub fn build_call_text(
    procedure: &str,
    payload: &str,
    cursor_names: &[String],
    binding: PayloadBinding,
) -> Result<CallStatement> {
    validate_procedure_name(procedure)?;

    let (payload_arg, arguments) = match binding {
        PayloadBinding::Inline => (quote_literal(payload), Vec::new()),
        PayloadBinding::Placeholder => ("$1::varchar".to_string(), vec![Value::from(payload)]),
    };

    let mut args = vec![payload_arg];
    for name in cursor_names {
        if name.is_empty() {
            return Err(SqlgateError::Statement("cursor name must not be empty".into()));
        }
        args.push(quote_literal(name));
    }

    Ok(CallStatement {
        text: format!("call {procedure}({})", args.join(", ")),
        arguments,
    })
}

/// `FETCH ALL IN "<cursor>"`
pub fn fetch_all_statement(cursor: &str) -> String {
    format!("FETCH ALL IN {}", quote_identifier(cursor))
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn quote_identifier(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Strip the single quotes older callers wrapped cursor names in (`'outjson'`)
pub fn normalize_cursor_name(name: &str) -> String {
    let trimmed = name.trim();
    match trimmed
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        Some(inner) if !inner.contains('\'') => inner.to_string(),
        _ => trimmed.to_string(),
    }
}

/// Accept `name`, `schema.name`, `"Quoted"."Name"`, up to three parts
pub fn validate_procedure_name(name: &str) -> Result<()> {
    let invalid = || SqlgateError::Statement(format!("invalid procedure name: {name:?}"));

    let mut parts = 0;
    let mut chars = name.chars().peekable();
    loop {
        match chars.peek() {
            Some('"') => {
                chars.next();
                let mut length = 0;
                loop {
                    match chars.next() {
                        Some('"') if chars.peek() == Some(&'"') => {
                            chars.next();
                            length += 1;
                        }
                        Some('"') => break,
                        Some(_) => length += 1,
                        None => return Err(invalid()),
                    }
                }
                if length == 0 {
                    return Err(invalid());
                }
            }
            Some(c) if c.is_ascii_alphabetic() || *c == '_' => {
                while chars
                    .peek()
                    .is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '$')
                {
                    chars.next();
                }
            }
            _ => return Err(invalid()),
        }

        parts += 1;
        match chars.next() {
            None => break,
            Some('.') if parts < 3 => continue,
            Some(_) => return Err(invalid()),
        }
    }

    Ok(())
}
