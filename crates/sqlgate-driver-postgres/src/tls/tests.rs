use super::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn temp_file_with(content: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_sslmode_spellings() {
    assert_eq!(tls_mode_to_sslmode(TlsMode::Disable), "disable");
    assert_eq!(tls_mode_to_sslmode(TlsMode::VerifyCa), "verify-ca");
    assert_eq!(tls_mode_to_sslmode(TlsMode::VerifyFull), "verify-full");
}

#[test]
fn test_parse_accepts_libpq_and_ado_forms() {
    assert_eq!(TlsMode::parse("verify-full"), Some(TlsMode::VerifyFull));
    assert_eq!(TlsMode::parse("VerifyFull"), Some(TlsMode::VerifyFull));
    assert_eq!(TlsMode::parse("Verify CA"), Some(TlsMode::VerifyCa));
    assert_eq!(TlsMode::parse("Require"), Some(TlsMode::Require));
    assert_eq!(TlsMode::parse("Disable"), Some(TlsMode::Disable));
    assert_eq!(TlsMode::parse("sometimes"), None);
}

#[test]
fn test_parse_round_trips_every_mode() {
    for mode in [
        TlsMode::Disable,
        TlsMode::Allow,
        TlsMode::Prefer,
        TlsMode::Require,
        TlsMode::VerifyCa,
        TlsMode::VerifyFull,
    ] {
        assert_eq!(TlsMode::parse(tls_mode_to_sslmode(mode)), Some(mode));
    }
}

#[test]
fn test_ssl_mode_negotiation() {
    assert_eq!(TlsMode::Disable.ssl_mode(), SslMode::Disable);
    assert_eq!(TlsMode::Allow.ssl_mode(), SslMode::Prefer);
    assert_eq!(TlsMode::VerifyCa.ssl_mode(), SslMode::Require);
    assert!(TlsMode::VerifyFull.requires_encryption());
    assert!(!TlsMode::Prefer.requires_encryption());
}

#[test]
fn test_build_rejects_disabled_mode() {
    let result = PostgresTlsConnector::build(&TlsConfig::disabled());
    assert!(matches!(result, Err(TlsError::UnsupportedMode { mode: TlsMode::Disable })));
}

#[test]
fn test_build_require_without_certificates() {
    let result = PostgresTlsConnector::build(&TlsConfig::with_mode(TlsMode::Require));
    assert!(result.is_ok());
}

#[test]
fn test_build_missing_ca_file() {
    let config = TlsConfig::with_mode(TlsMode::VerifyFull).ca_cert("/nonexistent/ca.crt");
    let result = PostgresTlsConnector::build(&config);
    assert!(matches!(result, Err(TlsError::CaCertLoadFailed { .. })));
}

#[test]
fn test_build_invalid_ca_contents() {
    let file = temp_file_with(b"not a certificate");
    let config = TlsConfig::with_mode(TlsMode::VerifyCa).ca_cert(file.path());
    let result = PostgresTlsConnector::build(&config);
    assert!(matches!(result, Err(TlsError::InvalidCaCert(_))));
}

#[test]
fn test_validate_requires_cert_and_key_together() {
    let mut config = TlsConfig::with_mode(TlsMode::Require);
    config.client_cert = Some("/tmp/client.crt".into());
    assert!(config.validate().is_err());

    let config = TlsConfig::with_mode(TlsMode::Require).client_identity("/tmp/c.crt", "/tmp/c.key");
    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_client_key_file() {
    let cert = temp_file_with(b"-----BEGIN CERTIFICATE-----\n-----END CERTIFICATE-----\n");
    let config = TlsConfig::with_mode(TlsMode::Require)
        .client_identity(cert.path(), "/nonexistent/client.key");
    let result = PostgresTlsConnector::build(&config);
    assert!(matches!(result, Err(TlsError::ClientKeyLoadFailed { .. })));
}

#[test]
fn test_tls_error_maps_to_connection_error() {
    let error: SqlgateError = TlsError::ConfigurationError("bad".into()).into();
    assert!(matches!(error, SqlgateError::Connection(message) if message.contains("bad")));
}
