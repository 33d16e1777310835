use super::*;
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use tokio_postgres::config::{Host, SslMode};

fn hosts(config: &Config) -> Vec<String> {
    config
        .get_hosts()
        .iter()
        .map(|host| match host {
            Host::Tcp(name) => name.clone(),
            #[allow(unreachable_patterns)]
            other => format!("{other:?}"),
        })
        .collect()
}

#[test]
fn test_ado_connection_string() {
    let options = parse_connection_string(
        "Server=db.internal;Port=5433;Database=app;User Id=svc;Password=s3cret;CommandTimeout=45;Timeout=10;Pooling=true",
    )
    .unwrap();

    assert_eq!(hosts(&options.config), vec!["db.internal".to_string()]);
    assert_eq!(options.config.get_ports(), &[5433]);
    assert_eq!(options.config.get_dbname(), Some("app"));
    assert_eq!(options.config.get_user(), Some("svc"));
    assert_eq!(options.config.get_password(), Some(&b"s3cret"[..]));
    assert_eq!(options.command_timeout, Some(Duration::from_secs(45)));
    assert_eq!(options.config.get_connect_timeout(), Some(&Duration::from_secs(10)));
    assert_eq!(options.tls.mode, TlsMode::Prefer);
}

#[test]
fn test_ado_keys_are_case_and_space_insensitive() {
    let connection_string = "SERVER=localhost; user id=postgres ;PASSWORD=pw;DATABASE=stock;";
    let options = parse_connection_string(connection_string).unwrap();

    assert_eq!(options.config.get_user(), Some("postgres"));
    assert_eq!(options.config.get_dbname(), Some("stock"));
}

#[test]
fn test_ado_quoted_value_with_separator() {
    let options =
        parse_connection_string(r#"Host=localhost;Password="a;b""c";Username=svc"#).unwrap();

    assert_eq!(options.config.get_password(), Some(&b"a;b\"c"[..]));
    assert_eq!(options.config.get_user(), Some("svc"));
}

#[test]
fn test_ado_unterminated_quote_is_rejected() {
    let result = parse_connection_string("Host=localhost;Password='oops");
    assert!(matches!(result, Err(SqlgateError::Configuration(_))));
}

#[test]
fn test_ado_invalid_port() {
    let result = parse_connection_string("Server=localhost;Port=fifty");
    assert!(matches!(
        result,
        Err(SqlgateError::Configuration(message)) if message.contains("port")
    ));
}

#[test]
fn test_ado_defaults_host_to_localhost() {
    let options = parse_connection_string("Database=app;User Id=svc").unwrap();
    assert_eq!(hosts(&options.config), vec!["localhost".to_string()]);
}

#[test]
fn test_ado_tls_settings() {
    let options = parse_connection_string(
        "Server=db;SSL Mode=VerifyFull;Root Certificate=/etc/ssl/ca.pem;Trust Server Certificate=false",
    )
    .unwrap();

    assert_eq!(options.tls.mode, TlsMode::VerifyFull);
    assert_eq!(options.tls.ca_cert, Some(PathBuf::from("/etc/ssl/ca.pem")));
    assert!(options.tls.verify_server);
    assert_eq!(options.config.get_ssl_mode(), SslMode::Require);
}

#[test]
fn test_ado_search_path_and_application_name() {
    let connection_string =
        "Server=db;Search Path=stock,public;Application Name=gateway;Keepalive=30";
    let options = parse_connection_string(connection_string).unwrap();

    assert_eq!(options.config.get_options(), Some("-c search_path=stock,public"));
    assert_eq!(options.config.get_application_name(), Some("gateway"));
    assert!(options.config.get_keepalives());
    assert_eq!(options.config.get_keepalives_idle(), Duration::from_secs(30));
}

#[test]
fn test_ado_zero_command_timeout_means_unbounded() {
    let options = parse_connection_string("Server=db;CommandTimeout=0").unwrap();
    assert_eq!(options.command_timeout, None);
}

#[test]
fn test_ado_unknown_ssl_mode() {
    let result = parse_connection_string("Server=db;SSL Mode=Sometimes");
    assert!(matches!(result, Err(SqlgateError::Configuration(_))));
}

#[test]
fn test_key_value_connection_string() {
    let connection_string =
        r"host=localhost port=5432 dbname=app user=svc password='it\'s' sslmode=disable";
    let options = parse_connection_string(connection_string).unwrap();
    assert_eq!(options.config.get_dbname(), Some("app"));
    assert_eq!(options.config.get_password(), Some(&b"it's"[..]));
    assert_eq!(options.tls.mode, TlsMode::Disable);
    assert_eq!(options.config.get_ssl_mode(), SslMode::Disable);
}

#[test]
fn test_key_value_extracts_tls_and_timeout() {
    let options = parse_connection_string(
        "host=db dbname=app sslmode=verify-ca sslrootcert=/tmp/ca.pem command_timeout=5",
    )
    .unwrap();

    assert_eq!(options.tls.mode, TlsMode::VerifyCa);
    assert_eq!(options.tls.ca_cert, Some(PathBuf::from("/tmp/ca.pem")));
    assert_eq!(options.command_timeout, Some(Duration::from_secs(5)));
    assert_eq!(options.config.get_ssl_mode(), SslMode::Require);
}

#[test]
fn test_url_connection_string() {
    let connection_string =
        "postgres://svc:pw@db.example.com:6432/app?sslmode=require&application_name=cli";
    let options = parse_connection_string(connection_string).unwrap();

    assert_eq!(hosts(&options.config), vec!["db.example.com".to_string()]);
    assert_eq!(options.config.get_ports(), &[6432]);
    assert_eq!(options.config.get_dbname(), Some("app"));
    assert_eq!(options.config.get_application_name(), Some("cli"));
    assert_eq!(options.tls.mode, TlsMode::Require);
}

#[test]
fn test_empty_connection_string() {
    assert!(matches!(parse_connection_string("   "), Err(SqlgateError::Configuration(_))));
}

#[test]
fn test_style_detection() {
    assert!(is_ado_style("Server=db"));
    assert!(is_ado_style("host=db;port=5432"));
    assert!(!is_ado_style("host=db port=5432"));
}
