/*!
 * Completion stage: one notification per stored translation.
 */

use async_trait::async_trait;
use log::{info, warn};
use std::fmt;
use std::sync::Arc;

use super::{UnitHandler, UnitOutcome};
use crate::app_config::CompletionWorkerSettings;
use crate::errors::UnitError;
use crate::event::WorkUnit;
use crate::notify::{Notification, Notifier};
use crate::storage::{ObjectStore, collect_bytes};

/// Notifies the configured recipient about each stored translation
pub struct CompletionStage {
    store: Arc<dyn ObjectStore>,
    notifier: Arc<dyn Notifier>,
    settings: CompletionWorkerSettings,
}

impl CompletionStage {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        notifier: Arc<dyn Notifier>,
        settings: CompletionWorkerSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            settings,
        }
    }

    /// Translated text of the unit's object, if it can be read
    async fn translated_text(&self, unit: &WorkUnit) -> Option<String> {
        let stream = match self.store.get(&unit.source_bucket, &unit.source_key).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Notifying about {} without its text: {}", unit, e);
                return None;
            }
        };
        match collect_bytes(stream).await {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                warn!("Notifying about {} without its text: {}", unit, e);
                None
            }
        }
    }
}

impl fmt::Debug for CompletionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionStage")
            .field("notifier", &self.notifier)
            .field("settings", &self.settings)
            .finish()
    }
}

#[async_trait]
impl UnitHandler for CompletionStage {
    fn stage(&self) -> &'static str {
        "completion"
    }

    async fn handle(&self, unit: &WorkUnit) -> Result<UnitOutcome, UnitError> {
        let text = self.translated_text(unit).await;
        let notification = Notification::translation_complete(
            &self.settings.recipient,
            &unit.source_bucket,
            &unit.source_key,
            text.as_deref(),
        );

        self.notifier.notify(&notification).await?;
        info!("Notified {} about {}", self.settings.recipient, unit);

        Ok(UnitOutcome::Notified {
            recipient: self.settings.recipient.clone(),
            key: unit.source_key.clone(),
        })
    }
}
