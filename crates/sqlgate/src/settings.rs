//! Gateway settings
//!
//! ```toml
//! default_connection = "ConnectionPg"
//! command_timeout_secs = 30
//!
//! [connection_strings]
//! ConnectionPg = "Server=localhost;Port=5432;Database=app;User Id=app;Password=secret"
//! ```
//!
//! `SQLGATE_CONNECTION_<NAME>` environment variables override entries from
//! the file and `SQLGATE_DEFAULT_CONNECTION` overrides the default name.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sqlgate_core::{Result, SqlgateError};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONNECTION_NAME: &str = "ConnectionPg";
const CONNECTION_ENV_PREFIX: &str = "SQLGATE_CONNECTION_";
const DEFAULT_CONNECTION_ENV: &str = "SQLGATE_DEFAULT_CONNECTION";

fn default_connection_name() -> String {
    DEFAULT_CONNECTION_NAME.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Name used when a lookup is made with an empty name
    #[serde(default = "default_connection_name")]
    pub default_connection: String,

    /// Deadline for each blocking step; unset means no deadline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,

    pub connection_strings: IndexMap<String, String>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            default_connection: default_connection_name(),
            command_timeout_secs: None,
            connection_strings: IndexMap::new(),
        }
    }
}

impl GatewaySettings {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| SqlgateError::Configuration(format!("invalid settings: {e}")))
    }

    /// Load a settings file and apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "loading gateway settings");
        let contents = std::fs::read_to_string(path)?;
        let mut settings = Self::from_toml_str(&contents)?;
        settings.apply_overrides(unicode_vars(std::env::vars_os()));
        Ok(settings)
    }

    /// `<config dir>/sqlgate/settings.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sqlgate").join("settings.toml"))
    }

    /// Load the default settings file; a missing file yields the defaults
    /// plus environment overrides.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => {
                let mut settings = Self::default();
                settings.apply_overrides(unicode_vars(std::env::vars_os()));
                Ok(settings)
            }
        }
    }

    /// Apply `SQLGATE_*` overrides from `vars`.
    ///
    /// Names match existing entries case-insensitively so
    /// `SQLGATE_CONNECTION_CONNECTIONPG` replaces `ConnectionPg`.
    pub fn apply_overrides<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in vars {
            let key = key.as_ref();
            if key == DEFAULT_CONNECTION_ENV {
                self.default_connection = value.into();
                continue;
            }

            let Some(name) = key.strip_prefix(CONNECTION_ENV_PREFIX) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }

            tracing::debug!(name = %name, "connection string overridden from environment");
            let existing = self
                .connection_strings
                .keys()
                .find(|existing| existing.eq_ignore_ascii_case(name))
                .cloned();
            self.connection_strings
                .insert(existing.unwrap_or_else(|| name.to_string()), value.into());
        }
    }

    /// Connection string registered under `name`; `""` selects the default
    pub fn get_connect_string(&self, name: &str) -> Result<String> {
        let name = if name.is_empty() {
            self.default_connection.as_str()
        } else {
            name
        };

        self.connection_strings.get(name).cloned().ok_or_else(|| {
            SqlgateError::Configuration(format!("no connection string named {name:?}"))
        })
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Environment entries whose key and value are both valid Unicode
fn unicode_vars<I>(vars: I) -> impl Iterator<Item = (String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const SETTINGS: &str = r#"
default_connection = "ConnectionPg"
command_timeout_secs = 15

[connection_strings]
ConnectionPg = "Server=localhost;Database=app"
Reporting = "host=reports dbname=warehouse"
"#;

    #[test]
    fn test_empty_name_uses_default_and_is_idempotent() {
        let settings = GatewaySettings::from_toml_str(SETTINGS).unwrap();

        let first = settings.get_connect_string("").unwrap();
        let second = settings.get_connect_string("").unwrap();
        assert_eq!(first, "Server=localhost;Database=app");
        assert_eq!(first, second);
    }

    #[test]
    fn test_named_lookup_and_missing_key() {
        let settings = GatewaySettings::from_toml_str(SETTINGS).unwrap();
        assert_eq!(
            settings.get_connect_string("Reporting").unwrap(),
            "host=reports dbname=warehouse"
        );
        assert!(matches!(
            settings.get_connect_string("Nope"),
            Err(SqlgateError::Configuration(_))
        ));
    }

    #[test]
    fn test_defaults_when_fields_are_missing() {
        let settings = GatewaySettings::from_toml_str("").unwrap();
        assert_eq!(settings.default_connection, DEFAULT_CONNECTION_NAME);
        assert_eq!(settings.command_timeout(), None);
        assert!(settings.get_connect_string("").is_err());
    }

    #[test]
    fn test_command_timeout() {
        let settings = GatewaySettings::from_toml_str(SETTINGS).unwrap();
        assert_eq!(settings.command_timeout(), Some(Duration::from_secs(15)));

        let settings = GatewaySettings::from_toml_str("command_timeout_secs = 0").unwrap();
        assert_eq!(settings.command_timeout(), None);
    }

    #[test]
    fn test_environment_overrides() {
        let mut settings = GatewaySettings::from_toml_str(SETTINGS).unwrap();
        settings.apply_overrides([
            ("SQLGATE_CONNECTION_CONNECTIONPG", "Server=prod;Database=app"),
            ("SQLGATE_CONNECTION_Audit", "host=audit"),
            ("SQLGATE_DEFAULT_CONNECTION", "Audit"),
            ("PATH", "/usr/bin"),
            ("SQLGATE_CONNECTION_", "ignored"),
        ]);

        assert_eq!(
            settings.get_connect_string("ConnectionPg").unwrap(),
            "Server=prod;Database=app"
        );
        assert_eq!(settings.get_connect_string("").unwrap(), "host=audit");
        assert_eq!(settings.connection_strings.len(), 3);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SETTINGS.as_bytes()).unwrap();

        let settings = GatewaySettings::load(file.path()).unwrap();
        assert!(settings.connection_strings.contains_key("Reporting"));
    }

    #[test]
    fn test_invalid_file_is_a_configuration_error() {
        let result = GatewaySettings::from_toml_str("connection_strings = 5");
        assert!(matches!(result, Err(SqlgateError::Configuration(_))));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let result = GatewaySettings::load("/nonexistent/sqlgate/settings.toml");
        assert!(matches!(result, Err(SqlgateError::Io(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_unicode_environment_entries_are_skipped() {
        use std::os::unix::ffi::OsStringExt;

        let vars = vec![
            (OsString::from("SQLGATE_CONNECTION_Audit"), OsString::from("host=audit")),
            (
                OsString::from("SQLGATE_CONNECTION_Bad"),
                OsString::from_vec(vec![b'h', 0xff, 0xfe]),
            ),
            (OsString::from_vec(vec![0xc3, 0x28]), OsString::from("x")),
        ];

        let mut settings = GatewaySettings::default();
        settings.apply_overrides(unicode_vars(vars));

        assert_eq!(settings.get_connect_string("Audit").unwrap(), "host=audit");
        assert!(settings.get_connect_string("Bad").is_err());
        assert_eq!(settings.connection_strings.len(), 1);
    }
}
