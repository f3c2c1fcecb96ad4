use serial_test::serial;
use std::env;
use std::fs;
use std::time::Duration;
use study_assistant::config::AppConfig;
use study_assistant::study::StudyMode;

// Environment that would otherwise leak between tests
fn clear_env_vars() {
    unsafe {
        env::remove_var("STUDY_SERVER__PORT");
        env::remove_var("STUDY_CHAT__SERVER_URL");
        env::remove_var("STUDY_CHAT__REQUEST_TIMEOUT_SECS");
        env::remove_var("CONFIG_FILE");
        env::remove_var("PORT");
        env::remove_var("RATE_LIMIT_ENABLED");
        env::remove_var("TIMEOUT_DISABLED");
    }
}

#[test]
#[serial]
fn test_default_config() {
    clear_env_vars();

    let config = AppConfig::load_from_args(["study-assistant"]).expect("defaults should load");
    assert_eq!(config.server.port, 3000);
    assert_eq!(config.server.host, "0.0.0.0");
    assert!(config.resilience.rate_limit_enabled);
    assert_eq!(config.chat.server_url, "http://127.0.0.1:3000");
    assert_eq!(config.chat.request_timeout(), Some(Duration::from_secs(60)));
    assert_eq!(config.chat.subject, None);
    assert!(!config.logging.json);
}

#[test]
#[serial]
fn test_env_override() {
    clear_env_vars();
    unsafe {
        env::set_var("STUDY_SERVER__PORT", "9090");
        env::set_var("STUDY_CHAT__REQUEST_TIMEOUT_SECS", "0");
    }

    let config = AppConfig::load_from_args(["study-assistant"]).expect("Failed to load config");
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.chat.request_timeout(), None);

    clear_env_vars();
}

#[test]
#[serial]
fn test_cli_beats_env() {
    clear_env_vars();
    unsafe {
        env::set_var("STUDY_SERVER__PORT", "9090");
    }

    let config = AppConfig::load_from_args(["study-assistant", "--port", "4000"])
        .expect("Failed to load config");
    assert_eq!(config.server.port, 4000);

    clear_env_vars();
}

#[test]
#[serial]
fn test_file_load() {
    clear_env_vars();

    let dir = tempfile::tempdir().expect("tempdir");
    let file_path = dir.path().join("study.toml");
    fs::write(
        &file_path,
        r#"
[server]
port = 7070

[chat]
subject = "Physics"
mode = "exam"
"#,
    )
    .expect("Failed to write temp config");

    let path = file_path.to_string_lossy().to_string();
    let config = AppConfig::load_from_args(["study-assistant", "--config", path.as_str()])
        .expect("Failed to load config from file");
    assert_eq!(config.server.port, 7070);
    assert_eq!(config.chat.subject.as_deref(), Some("Physics"));
    assert_eq!(config.chat.mode, Some(StudyMode::Exam));
}

#[test]
#[serial]
fn test_missing_explicit_file_is_an_error() {
    clear_env_vars();

    let result = AppConfig::load_from_args([
        "study-assistant",
        "--config",
        "/definitely/not/here/study.toml",
    ]);
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_chat_flags_override_config() {
    clear_env_vars();

    let config = AppConfig::load_from_args([
        "study-assistant",
        "chat",
        "--server",
        "http://tutor.local:8080",
        "--subject",
        "Chemistry",
        "--mode",
        "homework",
    ])
    .expect("Failed to load config");

    assert_eq!(config.chat.server_url, "http://tutor.local:8080");
    assert_eq!(config.chat.subject.as_deref(), Some("Chemistry"));
    assert_eq!(config.chat.mode, Some(StudyMode::Homework));
}

#[test]
#[serial]
fn test_server_and_local_conflict() {
    clear_env_vars();

    let result = AppConfig::load_from_args([
        "study-assistant",
        "chat",
        "--local",
        "--server",
        "http://tutor.local:8080",
    ]);
    assert!(result.is_err());
}
