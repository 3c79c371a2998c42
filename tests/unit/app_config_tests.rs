/*!
 * Tests for configuration loading, validation and worker settings
 */

use anyhow::Result;
use std::collections::HashMap;
use std::fs;

use translate_relay::app_config::{
    CompletionWorkerSettings, Config, ENV_NOTIFY_RECIPIENT, ENV_RESULT_BUCKET,
    ENV_TARGET_LANGUAGE, FailurePolicy, TranslationProvider, TranslationWorkerSettings,
};
use translate_relay::errors::ConfigError;

use crate::common;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let values: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name: &str| values.get(name).cloned()
}

#[test]
fn test_defaultConfig_shouldSerializeAndLoadBack() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("conf.json");

    let config = Config::default();
    fs::write(&path, serde_json::to_string_pretty(&config)?)?;
    let loaded: Config = serde_json::from_str(&fs::read_to_string(&path)?)?;

    assert_eq!(loaded.source_bucket, config.source_bucket);
    assert_eq!(loaded.result_bucket, config.result_bucket);
    assert_eq!(loaded.failure_policy, FailurePolicy::Drop);
    assert_eq!(loaded.translation_queue, config.translation_queue);
    assert!(loaded.validate().is_ok());
    Ok(())
}

#[test]
fn test_partialConfigFile_shouldFillDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        temp_dir.path(),
        "conf.json",
        r#"{ "target_language": "es", "failure_policy": "dead_letter" }"#,
    )?;

    let config: Config = serde_json::from_str(&fs::read_to_string(path)?)?;

    assert_eq!(config.target_language, "es");
    assert_eq!(config.failure_policy, FailurePolicy::DeadLetter);
    assert_eq!(config.translation_queue.batch_size, 5);
    assert_eq!(config.completion_queue.invocation_timeout_secs, 3);
    assert_eq!(config.translation.provider, TranslationProvider::Ollama);
    Ok(())
}

#[test]
fn test_validate_withSameBuckets_shouldReject() {
    let mut config = common::test_config();
    config.result_bucket = config.source_bucket.clone();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::Invalid {
            name: "result_bucket",
            ..
        })
    ));
}

#[test]
fn test_validate_withShortVisibilityTimeout_shouldReject() {
    let mut config = common::test_config();
    config.translation_queue.max_batching_window_secs = 5;
    config.translation_queue.invocation_timeout_secs = 15;
    config.translation_queue.visibility_timeout_secs = 10;

    let error = config.validate().unwrap_err();
    assert!(error.to_string().contains("visibility_timeout_secs"));
}

#[test]
fn test_validate_withAnthropicAndNoKey_shouldReject() {
    let mut config = common::test_config();
    config.translation.provider = TranslationProvider::Anthropic;
    for provider in &mut config.translation.available_providers {
        provider.api_key.clear();
    }
    assert!(matches!(config.validate(), Err(ConfigError::Missing(_))));
}

#[test]
fn test_applyEnvOverrides_shouldReplaceFileValues() {
    let mut config = Config::default();
    config.apply_env_overrides(lookup_from(&[
        (ENV_RESULT_BUCKET, "other-results"),
        (ENV_TARGET_LANGUAGE, "fr"),
        (ENV_NOTIFY_RECIPIENT, "team@example.org"),
    ]));

    assert_eq!(config.result_bucket, "other-results");
    assert_eq!(config.target_language, "fr");
    assert_eq!(config.notification.recipient, "team@example.org");
}

#[test]
fn test_applyEnvOverrides_withBlankValues_shouldKeepFileValues() {
    let mut config = Config::default();
    config.apply_env_overrides(lookup_from(&[(ENV_RESULT_BUCKET, "  ")]));
    assert_eq!(config.result_bucket, Config::default().result_bucket);
}

#[test]
fn test_translationWorkerSettings_fromLookup_shouldRequireBothVariables() {
    let settings = TranslationWorkerSettings::from_lookup(lookup_from(&[
        (ENV_RESULT_BUCKET, "results"),
        (ENV_TARGET_LANGUAGE, "ga"),
    ]))
    .unwrap();
    assert_eq!(settings.destination_bucket, "results");
    assert_eq!(settings.target_language, "ga");

    let missing = TranslationWorkerSettings::from_lookup(lookup_from(&[(ENV_TARGET_LANGUAGE, "ga")]));
    assert!(matches!(missing, Err(ConfigError::Missing(ENV_RESULT_BUCKET))));

    let missing = TranslationWorkerSettings::from_lookup(lookup_from(&[(ENV_RESULT_BUCKET, "results")]));
    assert!(matches!(missing, Err(ConfigError::Missing(ENV_TARGET_LANGUAGE))));
}

#[test]
fn test_translationWorkerSettings_withAutoTarget_shouldReject() {
    assert!(matches!(
        TranslationWorkerSettings::new("results", "auto"),
        Err(ConfigError::Invalid { .. })
    ));
    assert!(matches!(
        TranslationWorkerSettings::new("results", "klingon"),
        Err(ConfigError::Invalid { .. })
    ));
}

#[test]
fn test_completionWorkerSettings_fromLookup_shouldValidateRecipient() {
    assert!(CompletionWorkerSettings::from_lookup(lookup_from(&[(ENV_NOTIFY_RECIPIENT, "a@b.c")])).is_ok());
    assert!(matches!(
        CompletionWorkerSettings::from_lookup(lookup_from(&[])),
        Err(ConfigError::Missing(ENV_NOTIFY_RECIPIENT))
    ));
    assert!(matches!(
        CompletionWorkerSettings::new("not-an-address"),
        Err(ConfigError::Invalid { .. })
    ));
}

#[test]
fn test_failurePolicy_fromStr_shouldAcceptBothSpellings() {
    assert_eq!("drop".parse::<FailurePolicy>().unwrap(), FailurePolicy::Drop);
    assert_eq!("dead_letter".parse::<FailurePolicy>().unwrap(), FailurePolicy::DeadLetter);
    assert_eq!("dead-letter".parse::<FailurePolicy>().unwrap(), FailurePolicy::DeadLetter);
    assert!("retry".parse::<FailurePolicy>().is_err());
}
