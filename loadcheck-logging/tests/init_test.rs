use loadcheck_config::{LogFormat, LogLevel, LoggingConfig};
use loadcheck_logging::{init_logging, init_simple_tracing};

#[test]
fn test_init_from_yaml_config() {
    let config: LoggingConfig = serde_yaml::from_str(
        r#"
level: debug
format: json
include_location: true
"#,
    )
    .unwrap();
    assert_eq!(config.level, LogLevel::Debug);
    assert_eq!(config.format, LogFormat::Json);

    init_logging(&config).unwrap();
    tracing::info!(worker = 1, "subscriber installed");
}

#[test]
fn test_repeated_init_is_harmless() {
    let config = LoggingConfig::default();
    init_logging(&config).unwrap();
    init_logging(&config).unwrap();
    init_simple_tracing("warn").unwrap();
}
