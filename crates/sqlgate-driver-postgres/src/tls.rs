//! TLS support for PostgreSQL sessions
//!
//! Maps the `SSL Mode` / `sslmode` settings of a connection string onto a
//! native-tls connector usable by tokio-postgres.

use native_tls::{Certificate, Identity, TlsConnector as NativeTlsConnector, TlsConnectorBuilder};
use postgres_native_tls::MakeTlsConnector;
use sqlgate_core::SqlgateError;
use std::fs;
use std::path::{Path, PathBuf};
use tokio_postgres::config::SslMode;
use tracing::{debug, warn};

/// TLS mode for a PostgreSQL session, matching libpq's `sslmode` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsMode {
    Disable,
    Allow,
    /// Try TLS, fall back to plain text
    #[default]
    Prefer,
    /// Encrypt without verifying the certificate
    Require,
    /// Verify the certificate chain but not the hostname
    VerifyCa,
    VerifyFull,
}

impl TlsMode {
    /// Parse an `sslmode` value. Accepts both libpq spelling (`verify-full`)
    /// and the ADO.NET spelling (`VerifyFull`).
    pub fn parse(value: &str) -> Option<Self> {
        let normalized: String = value
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "disable" | "disabled" => Some(TlsMode::Disable),
            "allow" => Some(TlsMode::Allow),
            "prefer" | "preferred" => Some(TlsMode::Prefer),
            "require" | "required" => Some(TlsMode::Require),
            "verifyca" => Some(TlsMode::VerifyCa),
            "verifyfull" => Some(TlsMode::VerifyFull),
            _ => None,
        }
    }

    pub fn requires_encryption(&self) -> bool {
        matches!(self, TlsMode::Require | TlsMode::VerifyCa | TlsMode::VerifyFull)
    }

    /// The tokio-postgres negotiation mode used with this TLS mode.
    ///
    /// tokio-postgres has no `allow`; it is treated as `prefer`.
    pub fn ssl_mode(&self) -> SslMode {
        match self {
            TlsMode::Disable => SslMode::Disable,
            TlsMode::Allow | TlsMode::Prefer => SslMode::Prefer,
            TlsMode::Require | TlsMode::VerifyCa | TlsMode::VerifyFull => SslMode::Require,
        }
    }
}

/// TLS settings collected from a connection string
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TlsConfig {
    pub mode: TlsMode,
    pub ca_cert: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    /// Verify the server certificate in `prefer`/`require` modes
    pub verify_server: bool,
}

impl TlsConfig {
    pub fn disabled() -> Self {
        Self {
            mode: TlsMode::Disable,
            ..Self::default()
        }
    }

    pub fn with_mode(mode: TlsMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    pub fn client_identity(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.client_cert = Some(cert.into());
        self.client_key = Some(key.into());
        self
    }

    pub fn validate(&self) -> Result<(), TlsError> {
        match (&self.client_cert, &self.client_key) {
            (Some(_), None) => Err(TlsError::ConfigurationError(
                "client certificate given without a client key".to_string(),
            )),
            (None, Some(_)) => Err(TlsError::ConfigurationError(
                "client key given without a client certificate".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("Failed to load CA certificate from {path}: {source}")]
    CaCertLoadFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid CA certificate format: {0}")]
    InvalidCaCert(String),

    #[error("Failed to load client certificate from {path}: {source}")]
    ClientCertLoadFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to load client key from {path}: {source}")]
    ClientKeyLoadFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid client identity (cert + key): {0}")]
    InvalidClientIdentity(String),

    #[error("TLS configuration error: {0}")]
    ConfigurationError(String),

    #[error("TLS mode {mode:?} is not supported for this operation")]
    UnsupportedMode { mode: TlsMode },
}

impl From<TlsError> for SqlgateError {
    fn from(e: TlsError) -> Self {
        SqlgateError::Connection(e.to_string())
    }
}

/// Builds native-tls connectors for tokio-postgres
#[derive(Debug, Clone)]
pub struct PostgresTlsConnector;

impl PostgresTlsConnector {
    /// Build a connector for `config`.
    ///
    /// Fails for [`TlsMode::Disable`]; callers connect with `NoTls` instead.
    pub fn build(config: &TlsConfig) -> Result<MakeTlsConnector, TlsError> {
        config.validate()?;

        if config.mode == TlsMode::Disable {
            return Err(TlsError::UnsupportedMode { mode: config.mode });
        }

        debug!(mode = ?config.mode, "building PostgreSQL TLS connector");

        let mut builder = NativeTlsConnector::builder();
        configure_verification(&mut builder, config);

        if let Some(ca_cert_path) = &config.ca_cert {
            apply_ca_cert(&mut builder, ca_cert_path)?;
        }

        if let (Some(cert_path), Some(key_path)) = (&config.client_cert, &config.client_key) {
            apply_client_cert(&mut builder, cert_path, key_path)?;
        }

        let connector = builder
            .build()
            .map_err(|e| TlsError::ConfigurationError(e.to_string()))?;

        Ok(MakeTlsConnector::new(connector))
    }
}

fn configure_verification(builder: &mut TlsConnectorBuilder, config: &TlsConfig) {
    match config.mode {
        TlsMode::Disable => {}
        TlsMode::Allow | TlsMode::Prefer | TlsMode::Require => {
            if !config.verify_server {
                builder.danger_accept_invalid_certs(true);
                builder.danger_accept_invalid_hostnames(true);
            }
        }
        TlsMode::VerifyCa => {
            builder.danger_accept_invalid_hostnames(true);
        }
        TlsMode::VerifyFull => {
            if !config.verify_server {
                warn!("verify-full requested; server certificate will be verified regardless");
            }
        }
    }
}

fn apply_ca_cert(builder: &mut TlsConnectorBuilder, path: &Path) -> Result<(), TlsError> {
    debug!(path = %path.display(), "loading CA certificate");

    let pem_data = fs::read(path).map_err(|e| TlsError::CaCertLoadFailed {
        path: path.display().to_string(),
        source: e,
    })?;

    let cert =
        Certificate::from_pem(&pem_data).map_err(|e| TlsError::InvalidCaCert(e.to_string()))?;
    builder.add_root_certificate(cert);
    Ok(())
}

fn apply_client_cert(
    builder: &mut TlsConnectorBuilder,
    cert_path: &Path,
    key_path: &Path,
) -> Result<(), TlsError> {
    let cert_pem = fs::read(cert_path).map_err(|e| TlsError::ClientCertLoadFailed {
        path: cert_path.display().to_string(),
        source: e,
    })?;

    let key_pem = fs::read(key_path).map_err(|e| TlsError::ClientKeyLoadFailed {
        path: key_path.display().to_string(),
        source: e,
    })?;

    let identity = Identity::from_pkcs8(&cert_pem, &key_pem)
        .map_err(|e| TlsError::InvalidClientIdentity(e.to_string()))?;
    builder.identity(identity);
    Ok(())
}

/// The libpq `sslmode` spelling of a TLS mode
pub fn tls_mode_to_sslmode(mode: TlsMode) -> &'static str {
    match mode {
        TlsMode::Disable => "disable",
        TlsMode::Allow => "allow",
        TlsMode::Prefer => "prefer",
        TlsMode::Require => "require",
        TlsMode::VerifyCa => "verify-ca",
        TlsMode::VerifyFull => "verify-full",
    }
}

#[cfg(test)]
mod tests;
