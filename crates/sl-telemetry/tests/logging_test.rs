use sl_telemetry::logging::{init, init_logging, init_logging_json, LogFormat};

#[test]
fn format_names() {
    assert_eq!(LogFormat::from_name("json"), LogFormat::Json);
    assert_eq!(LogFormat::from_name("JSON"), LogFormat::Json);
    assert_eq!(LogFormat::from_name("human"), LogFormat::Human);
    assert_eq!(LogFormat::from_name("anything"), LogFormat::Human);
}

#[test]
fn repeated_init_does_not_panic() {
    init_logging("sl-test", "info");
    init_logging("sl-test", "debug");
    init_logging_json("sl-test", "info");
    init("sl-test", "warn", LogFormat::Json);
    tracing::info!("still logging");
}
