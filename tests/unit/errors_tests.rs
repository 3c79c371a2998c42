/*!
 * Tests for error types and conversions
 */

use translate_relay::errors::{
    AppError, ConfigError, DecodeError, MessagingError, NotifyError, ProviderError, StoreError,
    TranslationError, UnitError, WorkerError,
};

#[test]
fn test_providerError_apiError_shouldDisplayStatusAndMessage() {
    let error = ProviderError::ApiError {
        status_code: 429,
        message: "slow down".to_string(),
    };
    assert_eq!(error.to_string(), "API responded with error: 429 - slow down");
}

#[test]
fn test_providerError_isTransient_shouldSeparateRetryableFailures() {
    assert!(ProviderError::ConnectionError("reset".to_string()).is_transient());
    assert!(ProviderError::RateLimitExceeded("quota".to_string()).is_transient());
    assert!(
        ProviderError::ApiError {
            status_code: 503,
            message: String::new()
        }
        .is_transient()
    );
    assert!(
        !ProviderError::ApiError {
            status_code: 400,
            message: String::new()
        }
        .is_transient()
    );
    assert!(!ProviderError::AuthenticationError("bad key".to_string()).is_transient());
    assert!(!ProviderError::ParseError("eof".to_string()).is_transient());
}

#[test]
fn test_translationError_fromProviderError_shouldWrap() {
    let error: TranslationError = ProviderError::ConnectionError("refused".to_string()).into();
    assert_eq!(error.to_string(), "Provider error: Connection error: refused");
}

#[test]
fn test_storeError_notFound_shouldNameBucketAndKey() {
    let error = StoreError::NotFound {
        bucket: "source".to_string(),
        key: "a b.txt".to_string(),
    };
    assert_eq!(error.to_string(), "Object not found: source/a b.txt");
}

#[test]
fn test_decodeError_envelope_shouldKeepSerdeSource() {
    let serde_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let error = DecodeError::Envelope(serde_error);
    assert!(error.to_string().starts_with("Malformed topic envelope: "));
    assert!(std::error::Error::source(&error).is_some());
}

#[test]
fn test_unitError_conversions_shouldPickMatchingVariant() {
    let translate: UnitError = TranslationError::UnsupportedLanguage("xx".to_string()).into();
    assert!(matches!(translate, UnitError::Translate(_)));

    let notify: UnitError = NotifyError::InvalidRecipient("nobody".to_string()).into();
    assert_eq!(notify.to_string(), "Notification failed: Invalid recipient: nobody");

    let encoding: UnitError = String::from_utf8(vec![0xff]).unwrap_err().into();
    assert!(matches!(encoding, UnitError::Encoding(_)));
}

#[test]
fn test_workerError_timedOut_shouldMentionBudget() {
    let error = WorkerError::TimedOut { budget_ms: 15000 };
    assert_eq!(error.to_string(), "Invocation exceeded its 15000 ms time budget");

    let dead_letter = WorkerError::DeadLetter(MessagingError::Closed("q-dlq".to_string()));
    assert_eq!(
        dead_letter.to_string(),
        "Dead-letter hand-off failed: Queue 'q-dlq' is closed"
    );
}

#[test]
fn test_appError_fromConfigError_shouldWrap() {
    let error: AppError = ConfigError::Missing("RESULT_BUCKET").into();
    assert_eq!(
        error.to_string(),
        "Configuration error: Missing required setting: RESULT_BUCKET"
    );

    let error: AppError = StoreError::NoSuchBucket("results".to_string()).into();
    assert!(matches!(error, AppError::Store(_)));
}
