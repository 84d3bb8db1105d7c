//! Tests for `src/config/mod.rs`.

use std::collections::HashMap;
use std::time::Duration;

use courier::config::{CourierConfig, EmailProviderKind};

fn parse(toml: &str) -> CourierConfig {
    CourierConfig::from_toml(toml).expect("config should parse")
}

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| map.get(key).cloned()
}

fn rejection(config: &CourierConfig) -> String {
    config
        .validate()
        .expect_err("config should be rejected")
        .to_string()
}

#[test]
fn full_file_parses_every_section() {
    let config = parse(
        r#"
[database]
path = "/var/lib/courier/courier.db"
max_connections = 8

[retry]
max_retries = 5
base_delay_ms = 250
max_delay_ms = 10000
multiplier = 3.0

[providers]
email = "sendgrid"
sendgrid_api_key = "SG.from-file"
sendgrid_base_url = "http://127.0.0.1:9000/"
request_timeout_secs = 10

[logging]
level = "debug"
dir = "/var/log/courier"
"#,
    );

    assert_eq!(config.database.path, "/var/lib/courier/courier.db");
    assert_eq!(config.database.max_connections, 8);
    let policy = config.retry.policy();
    assert_eq!(policy.max_retries, 5);
    assert_eq!(policy.base_delay, Duration::from_millis(250));
    assert_eq!(policy.max_delay, Duration::from_secs(10));
    assert_eq!(config.providers.email, EmailProviderKind::Sendgrid);
    assert_eq!(config.providers.sendgrid_api_key.as_deref(), Some("SG.from-file"));
    assert_eq!(config.providers.request_timeout_secs, 10);
    assert_eq!(config.logging.level, "debug");
    assert!(config.validate().is_ok());
}

#[test]
fn partial_file_keeps_defaults_elsewhere() {
    let config = parse("[retry]\nmax_retries = 1\n");
    assert_eq!(config.retry.max_retries, 1);
    assert_eq!(config.retry.base_delay_ms, 1_000);
    assert_eq!(config.database.path, "courier.db");
    assert_eq!(config.providers.email, EmailProviderKind::Mock);
}

#[test]
fn empty_file_is_all_defaults() {
    let config = parse("");
    assert_eq!(config.database.max_connections, 5);
    assert_eq!(config.logging.dir, "logs");
    assert!(config.validate().is_ok());
}

#[test]
fn wrongly_typed_field_is_a_parse_error() {
    assert!(CourierConfig::from_toml("[database]\nmax_connections = \"many\"\n").is_err());
    assert!(CourierConfig::from_toml("[providers]\nemail = \"pigeon\"\n").is_err());
}

#[test]
fn env_overrides_win_over_file_values() {
    let mut config = parse("[database]\npath = \"file.db\"\n[retry]\nmax_retries = 1\n");
    config.apply_overrides(env_from(&[
        ("COURIER_DB_PATH", "env.db"),
        ("COURIER_DB_MAX_CONNECTIONS", "2"),
        ("COURIER_MAX_RETRIES", "7"),
        ("COURIER_RETRY_BASE_DELAY_MS", "50"),
        ("COURIER_RETRY_MAX_DELAY_MS", "500"),
        ("COURIER_EMAIL_PROVIDER", "SENDGRID"),
        ("SENDGRID_API_KEY", "SG.from-env"),
        ("COURIER_LOG_LEVEL", "trace"),
        ("COURIER_LOG_DIR", "/tmp/courier-logs"),
    ]));

    assert_eq!(config.database.path, "env.db");
    assert_eq!(config.database.max_connections, 2);
    assert_eq!(config.retry.max_retries, 7);
    assert_eq!(config.retry.base_delay_ms, 50);
    assert_eq!(config.retry.max_delay_ms, 500);
    assert_eq!(config.providers.email, EmailProviderKind::Sendgrid);
    assert_eq!(config.providers.sendgrid_api_key.as_deref(), Some("SG.from-env"));
    assert_eq!(config.logging.level, "trace");
    assert_eq!(config.logging.dir, "/tmp/courier-logs");
    assert!(config.validate().is_ok());
}

#[test]
fn invalid_env_values_are_ignored() {
    let mut config = parse("[retry]\nmax_retries = 2\n");
    config.apply_overrides(env_from(&[
        ("COURIER_MAX_RETRIES", "lots"),
        ("COURIER_DB_MAX_CONNECTIONS", "-1"),
        ("COURIER_EMAIL_PROVIDER", "carrier-pigeon"),
        ("SENDGRID_API_KEY", ""),
    ]));

    assert_eq!(config.retry.max_retries, 2);
    assert_eq!(config.database.max_connections, 5);
    assert_eq!(config.providers.email, EmailProviderKind::Mock);
    assert_eq!(config.providers.sendgrid_api_key, None);
}

#[test]
fn validate_rejects_unusable_settings() {
    let mut config = CourierConfig::default();
    config.database.path = "  ".to_owned();
    assert!(rejection(&config).contains("database.path"));

    let mut config = CourierConfig::default();
    config.database.max_connections = 0;
    assert!(rejection(&config).contains("max_connections"));

    let mut config = CourierConfig::default();
    config.retry.base_delay_ms = 90_000;
    assert!(rejection(&config).contains("exceeds"));

    let mut config = CourierConfig::default();
    config.retry.multiplier = 0.5;
    assert!(rejection(&config).contains("multiplier"));

    let mut config = CourierConfig::default();
    config.retry.multiplier = f64::NAN;
    assert!(rejection(&config).contains("multiplier"));

    let mut config = CourierConfig::default();
    config.providers.email = EmailProviderKind::Sendgrid;
    assert!(rejection(&config).contains("sendgrid_api_key"));

    let mut config = CourierConfig::default();
    config.providers.request_timeout_secs = 0;
    assert!(rejection(&config).contains("request_timeout_secs"));
}

#[test]
fn config_path_comes_from_env_or_working_directory() {
    let custom = CourierConfig::config_path_with(env_from(&[(
        "COURIER_CONFIG_PATH",
        "/etc/courier.toml",
    )]));
    assert_eq!(custom, std::path::PathBuf::from("/etc/courier.toml"));
    assert_eq!(
        CourierConfig::config_path_with(env_from(&[])),
        std::path::PathBuf::from("courier.toml")
    );
}
