//! Comprehensive unit tests for config.rs module

use nl2sql_assistant::config::AppConfig;
use std::io::Write;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn test_default_pipeline_config() {
    let config = AppConfig::default();

    assert_eq!(config.pipeline.max_context_items, 3);
    assert_eq!(config.pipeline.char_budget, 12_000);
    assert!((config.pipeline.relevance_floor - 0.1).abs() < f64::EPSILON);
    assert_eq!(config.pipeline.request_timeout_ms, 30_000);
    assert_eq!(config.pipeline.max_question_chars, 1_000);
    assert_eq!(config.pipeline.scoring, "lexical");
    assert!(!config.pipeline.refine_on_refusal);
}

#[test]
fn test_default_other_sections() {
    let config = AppConfig::default();

    assert_eq!(config.schema.directory, "schemas");
    assert_eq!(config.schema.extension, "txt");
    assert_eq!(config.completion.provider, "gemini");
    assert_eq!(config.completion.api_key, None);
    assert_eq!(config.warehouse.project_id, None);
    assert!(!config.cache.enabled);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, "text");
}

#[test]
fn test_config_validation_success() {
    assert!(AppConfig::default().validate().is_ok());
}

#[test]
fn test_config_validation_failures() {
    let cases: Vec<Box<dyn Fn(&mut AppConfig)>> = vec![
        Box::new(|c| c.pipeline.char_budget = 0),
        Box::new(|c| c.pipeline.request_timeout_ms = 0),
        Box::new(|c| c.pipeline.relevance_floor = 1.5),
        Box::new(|c| c.pipeline.relevance_floor = -0.1),
        Box::new(|c| c.pipeline.scoring = "random".to_string()),
        Box::new(|c| c.pipeline.char_budget = 500),
        Box::new(|c| c.completion.provider = "openai".to_string()),
        Box::new(|c| c.warehouse.project_id = Some("proj".to_string())),
        Box::new(|c| c.logging.level = "verbose".to_string()),
        Box::new(|c| c.logging.format = "xml".to_string()),
    ];

    for (i, mutate) in cases.iter().enumerate() {
        let mut config = AppConfig::default();
        mutate(&mut config);
        assert!(config.validate().is_err(), "case {i} should be rejected");
    }
}

#[test]
fn test_load_with_file_overrides_defaults() {
    let file = write_config(
        "[pipeline]\nchar_budget = 6000\nscoring = \"embedding\"\n\n\
         [warehouse]\nproject_id = \"proj\"\ndataset_id = \"us_census\"\n",
    );

    let config = AppConfig::load_with(Some(file.path())).expect("load");
    assert_eq!(config.pipeline.char_budget, 6_000);
    assert!(config.uses_embeddings());
    assert_eq!(config.warehouse.dataset_id.as_deref(), Some("us_census"));
    // Untouched keys keep their defaults
    assert_eq!(config.pipeline.max_context_items, 3);
}

#[test]
fn test_load_with_invalid_file_fails_validation() {
    let file = write_config("[pipeline]\nrelevance_floor = 2.0\n");
    assert!(AppConfig::load_with(Some(file.path())).is_err());
}

#[test]
fn test_environment_overrides() {
    std::env::set_var("NL2SQL__CACHE__TTL_SECS", "60");
    let config = AppConfig::load().expect("load");
    std::env::remove_var("NL2SQL__CACHE__TTL_SECS");
    assert_eq!(config.cache.ttl_secs, 60);
}

#[test]
fn test_api_key_from_config() {
    let mut config = AppConfig::default();
    config.completion.api_key = Some("from-config".to_string());
    assert_eq!(config.get_api_key().expect("key"), "from-config");
}

#[test]
fn test_pipeline_settings_mirror_config() {
    let mut config = AppConfig::default();
    config.pipeline.max_context_items = 7;
    config.pipeline.refine_on_refusal = true;

    let settings = config.pipeline_settings();
    assert_eq!(settings.max_context_items, 7);
    assert!(settings.refine_on_refusal);
    assert_eq!(config.request_timeout().as_millis(), 30_000);
}
