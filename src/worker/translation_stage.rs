/*!
 * Translation stage: source object in, `translated_<key>` object out.
 */

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info};
use std::fmt;
use std::sync::Arc;

use super::{UnitHandler, UnitOutcome};
use crate::app_config::TranslationWorkerSettings;
use crate::errors::UnitError;
use crate::event::WorkUnit;
use crate::providers::{TranslationRequest, Translator};
use crate::storage::{ObjectStore, collect_bytes};

/// Prefix prepended to a source key to form its result key
pub const RESULT_KEY_PREFIX: &str = "translated_";

/// Result object key for `source_key`
pub fn result_key(source_key: &str) -> String {
    format!("{}{}", RESULT_KEY_PREFIX, source_key)
}

/// Fetches a source object, translates it and writes the result object
pub struct TranslationStage {
    store: Arc<dyn ObjectStore>,
    translator: Arc<dyn Translator>,
    settings: TranslationWorkerSettings,
}

impl TranslationStage {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        translator: Arc<dyn Translator>,
        settings: TranslationWorkerSettings,
    ) -> Self {
        Self {
            store,
            translator,
            settings,
        }
    }

    pub fn settings(&self) -> &TranslationWorkerSettings {
        &self.settings
    }

    async fn fetch_text(&self, unit: &WorkUnit) -> Result<String, UnitError> {
        let stream = self
            .store
            .get(&unit.source_bucket, &unit.source_key)
            .await
            .map_err(UnitError::Fetch)?;
        let content = collect_bytes(stream).await.map_err(UnitError::Fetch)?;
        Ok(String::from_utf8(content)?)
    }
}

impl fmt::Debug for TranslationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationStage")
            .field("translator", &self.translator.name())
            .field("settings", &self.settings)
            .finish()
    }
}

#[async_trait]
impl UnitHandler for TranslationStage {
    fn stage(&self) -> &'static str {
        "translation"
    }

    async fn handle(&self, unit: &WorkUnit) -> Result<UnitOutcome, UnitError> {
        let text = self.fetch_text(unit).await?;

        let translated = if text.trim().is_empty() {
            debug!("{} has no text to translate", unit);
            text
        } else {
            let request = TranslationRequest::auto_detect(text, &self.settings.target_language);
            self.translator.translate(&request).await?
        };

        let key = result_key(&unit.source_key);
        let meta = self
            .store
            .put(&self.settings.destination_bucket, &key, Bytes::from(translated))
            .await
            .map_err(UnitError::Write)?;

        info!(
            "Translated {} -> {}/{} ({} bytes)",
            unit, meta.bucket, meta.key, meta.size
        );

        Ok(UnitOutcome::Written {
            bucket: meta.bucket,
            key: meta.key,
        })
    }
}
