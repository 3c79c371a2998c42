use anyhow::{Context, Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use walkdir::WalkDir;

use crate::app_config::Config;
use crate::notify::{self, Notifier};
use crate::pipeline::Pipeline;
use crate::providers::{self, Translator};
use crate::storage::{FsStore, ObjectStore, collect_bytes};
use crate::worker::result_key;

// @module: Application controller for directory runs through the pipeline

/// Options of one `run` invocation
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Directory scanned for documents
    pub input_dir: PathBuf,
    /// Root directory of the filesystem object store
    pub store_dir: PathBuf,
    /// Where translated documents are copied to, if anywhere
    pub output_dir: Option<PathBuf>,
    /// File extensions treated as documents, lowercase without the dot
    pub extensions: Vec<String>,
    /// Upper bound on waiting for the pipeline to drain
    pub wait_timeout: Duration,
    pub show_progress: bool,
}

impl RunOptions {
    pub fn new(input_dir: impl Into<PathBuf>, store_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            store_dir: store_dir.into(),
            output_dir: None,
            extensions: vec!["txt".to_string()],
            wait_timeout: Duration::from_secs(600),
            show_progress: true,
        }
    }
}

/// Outcome of one `run` invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub uploaded: usize,
    pub translated: u64,
    pub translation_failures: u64,
    pub notified: u64,
    pub notification_failures: u64,
    pub dead_lettered: u64,
    pub exported: usize,
    /// Whether the pipeline drained before the wait timeout
    pub drained: bool,
    pub elapsed: Duration,
}

/// Document found in the input directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDocument {
    pub path: PathBuf,
    /// Object key: path relative to the input directory with `/` separators
    pub key: String,
}

/// Main application controller
pub struct Controller {
    // @field: App configuration
    config: Config,
    translator: Arc<dyn Translator>,
    notifier: Arc<dyn Notifier>,
}

impl Controller {
    // @method: Create a controller with providers built from the configuration
    pub fn with_config(config: Config) -> Result<Self> {
        let translator = providers::translator_from_config(&config.translation);
        let notifier = notify::notifier_from_config(&config.notification);
        Ok(Self::with_components(config, translator, notifier))
    }

    // @method: Create a controller with explicit capabilities
    pub fn with_components(
        config: Config,
        translator: Arc<dyn Translator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            translator,
            notifier,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Documents under `input_dir` with one of `extensions`, sorted by key
    pub fn find_input_documents(input_dir: &Path, extensions: &[String]) -> Result<Vec<InputDocument>> {
        if !input_dir.is_dir() {
            return Err(anyhow!("Input directory does not exist: {:?}", input_dir));
        }

        let mut documents = Vec::new();
        for entry in WalkDir::new(input_dir).follow_links(false) {
            let entry = entry.with_context(|| format!("Failed to scan {:?}", input_dir))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let matches = path
                .extension()
                .map(|ext| ext.to_string_lossy().to_lowercase())
                .is_some_and(|ext| extensions.iter().any(|wanted| *wanted == ext));
            if !matches {
                continue;
            }

            let relative = path.strip_prefix(input_dir).unwrap_or(path);
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            documents.push(InputDocument {
                path: path.to_path_buf(),
                key,
            });
        }

        documents.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(documents)
    }

    /// Upload every document of the input directory into a filesystem store and process it
    pub async fn run(&self, options: &RunOptions) -> Result<RunSummary> {
        let store = FsStore::new(&options.store_dir);
        self.run_with_store(store, options).await
    }

    /// Same as `run` over any object store
    pub async fn run_with_store<S: ObjectStore + 'static>(
        &self,
        store: S,
        options: &RunOptions,
    ) -> Result<RunSummary> {
        let start_time = Instant::now();
        let documents = Self::find_input_documents(&options.input_dir, &options.extensions)?;
        if documents.is_empty() {
            warn!("No documents found in {:?}", options.input_dir);
        }

        let pipeline = Pipeline::start(
            store,
            &self.config,
            self.translator.clone(),
            self.notifier.clone(),
        )
        .await
        .context("Failed to start pipeline")?;

        info!(
            "🚀 Translating {} document(s) to {} with {}",
            documents.len(),
            self.config.target_language,
            self.translator.name()
        );

        for document in &documents {
            let content = tokio::fs::read(&document.path)
                .await
                .with_context(|| format!("Failed to read {:?}", document.path))?;
            pipeline
                .upload(&document.key, content)
                .await
                .with_context(|| format!("Failed to upload {}", document.key))?;
        }

        let drained = Self::wait_with_progress(&pipeline, documents.len(), options).await;
        if !drained {
            warn!(
                "Pipeline still busy after {}, stopping anyway",
                Self::format_duration(options.wait_timeout)
            );
        }

        let exported = match &options.output_dir {
            Some(output_dir) => Self::export_results(&pipeline, &documents, output_dir).await?,
            None => 0,
        };

        let stats = pipeline.shutdown().await;
        let summary = RunSummary {
            uploaded: documents.len(),
            translated: stats.translation.units_completed,
            translation_failures: stats.translation.units_failed,
            notified: stats.completion.units_completed,
            notification_failures: stats.completion.units_failed,
            dead_lettered: stats.translation_dead_letters.sent + stats.completion_dead_letters.sent,
            exported,
            drained,
            elapsed: start_time.elapsed(),
        };

        info!(
            "Done in {}: {} uploaded, {} translated, {} failed, {} notified, {} dead-lettered, {} exported",
            Self::format_duration(summary.elapsed),
            summary.uploaded,
            summary.translated,
            summary.translation_failures,
            summary.notified,
            summary.dead_lettered,
            summary.exported
        );

        Ok(summary)
    }

    async fn wait_with_progress<S: ObjectStore + 'static>(
        pipeline: &Pipeline<S>,
        total: usize,
        options: &RunOptions,
    ) -> bool {
        let progress_bar = if options.show_progress {
            ProgressBar::new(total as u64)
        } else {
            ProgressBar::hidden()
        };
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents ({percent}%) {msg}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(style.progress_chars("█▓▒░"));

        let deadline = Instant::now() + options.wait_timeout;
        let drained = loop {
            let stats = pipeline.stats();
            let done = stats.translation.units_completed + stats.translation.units_failed;
            progress_bar.set_position(done.min(total as u64));
            progress_bar.set_message(format!("{} notified", stats.completion.units_completed));

            if pipeline.wait_idle(Duration::from_millis(200)).await {
                break true;
            }
            if Instant::now() >= deadline {
                break false;
            }
        };

        progress_bar.finish_and_clear();
        drained
    }

    async fn export_results<S: ObjectStore + 'static>(
        pipeline: &Pipeline<S>,
        documents: &[InputDocument],
        output_dir: &Path,
    ) -> Result<usize> {
        let mut exported = 0;
        for document in documents {
            let key = result_key(&document.key);
            let content = match pipeline.store().get(pipeline.result_bucket(), &key).await {
                Ok(stream) => collect_bytes(stream)
                    .await
                    .with_context(|| format!("Failed to read result {}", key))?,
                Err(e) => {
                    warn!("No translation exported for {}: {}", document.key, e);
                    continue;
                }
            };

            let target = output_dir.join(&key);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {:?}", parent))?;
            }
            tokio::fs::write(&target, content)
                .await
                .with_context(|| format!("Failed to write {:?}", target))?;
            info!("Success: {}", target.display());
            exported += 1;
        }
        Ok(exported)
    }

    // Format duration in a human-readable format
    fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
