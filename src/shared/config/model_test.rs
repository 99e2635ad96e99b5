use crate::query::progress::ProgressDisplay;
use crate::shared::config::load_settings_from;
use crate::shared::output::OutputFormat;
use std::io::Write;

#[test]
fn missing_file_yields_defaults() {
    let settings = load_settings_from("/nonexistent/flowdist-settings").unwrap();
    assert_eq!(settings.logging.stdout_level, "warn");
    assert!(settings.logging.log_dir.is_none());
    assert_eq!(settings.query.progress, ProgressDisplay::None);
    assert_eq!(settings.query.output_format, OutputFormat::Text);
    assert_eq!(settings.query.max_threads, None);
    assert_eq!(settings.cluster.connect_retries, 40);
}

#[test]
fn file_overrides_defaults() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[logging]
stdout_level = "debug"
log_dir = "/tmp/flowdist-logs"

[query]
max_threads = 3
progress = "bar"
output_format = "json"

[cluster]
listen_addr = "127.0.0.1:9000"
"#
    )
    .unwrap();

    let path = file.path().to_str().unwrap().to_string();
    let settings = load_settings_from(&path).unwrap();
    assert_eq!(settings.logging.stdout_level, "debug");
    assert_eq!(settings.logging.file_level, "debug");
    assert_eq!(settings.logging.log_dir.as_deref(), Some("/tmp/flowdist-logs"));
    assert_eq!(settings.query.max_threads, Some(3));
    assert_eq!(settings.query.progress, ProgressDisplay::Bar);
    assert_eq!(settings.query.output_format, OutputFormat::Json);
    assert_eq!(settings.cluster.listen_addr, "127.0.0.1:9000");
    assert_eq!(settings.cluster.connect_backoff_ms, 250);
}
