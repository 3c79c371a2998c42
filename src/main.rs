// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, info, warn};
use std::fs::File;
use std::io::BufReader;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use translate_relay::app_config::{self, Config, FailurePolicy, TranslationProvider};
use translate_relay::app_controller::{Controller, RunOptions};

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    Ollama,
    Anthropic,
    Mock,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::Ollama => TranslationProvider::Ollama,
            CliTranslationProvider::Anthropic => TranslationProvider::Anthropic,
            CliTranslationProvider::Mock => TranslationProvider::Mock,
        }
    }
}

/// CLI Wrapper for FailurePolicy to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliFailurePolicy {
    Drop,
    DeadLetter,
}

impl From<CliFailurePolicy> for FailurePolicy {
    fn from(cli_policy: CliFailurePolicy) -> Self {
        match cli_policy {
            CliFailurePolicy::Drop => FailurePolicy::Drop,
            CliFailurePolicy::DeadLetter => FailurePolicy::DeadLetter,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Push every document of a directory through the pipeline (default command)
    Run(RunArgs),

    /// Generate shell completions for translate-relay
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Directory containing the documents to translate
    #[arg(value_name = "INPUT_DIR")]
    input_dir: Option<PathBuf>,

    /// Directory translated documents are copied to
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Root directory of the object store
    #[arg(long, default_value = ".translate-relay")]
    store_dir: PathBuf,

    /// Translation provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliTranslationProvider>,

    /// Target language code (e.g., 'ga', 'es', 'fr')
    #[arg(short, long)]
    target_language: Option<String>,

    /// Recipient of completion notifications
    #[arg(short, long)]
    recipient: Option<String>,

    /// Handling of units that fail
    #[arg(long, value_enum)]
    failure_policy: Option<CliFailurePolicy>,

    /// File extensions to pick up, comma separated
    #[arg(long, value_delimiter = ',', default_value = "txt")]
    extensions: Vec<String>,

    /// Give up waiting for the pipeline to drain after this many seconds
    #[arg(long, default_value_t = 600)]
    timeout_secs: u64,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

/// translate-relay - event-driven document translation
///
/// Uploads documents into a source bucket and lets the two-stage pipeline
/// translate them and notify a recipient about each result.
#[derive(Parser, Debug)]
#[command(name = "translate-relay")]
#[command(version)]
#[command(about = "Event-driven document translation pipeline")]
#[command(long_about = "translate-relay uploads text documents into a source bucket; a translation \
worker picks them up through a topic and queue, writes translated_<key> into the result bucket, \
and a completion worker notifies a recipient.

EXAMPLES:
    translate-relay docs/                          # Translate using default config
    translate-relay -p mock -o out/ docs/          # Dry run with the offline translator
    translate-relay -t es -r me@example.com docs/  # Spanish, custom recipient
    translate-relay completions bash > translate-relay.bash

CONFIGURATION:
    Configuration is stored in conf.json by default. If the file doesn't exist, a
    default one is created. RESULT_BUCKET, TARGET_LANGUAGE and NOTIFY_RECIPIENT
    override the file values.")]
#[command(args_conflicts_with_subcommands = true)]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        // Filtering follows log::max_level, which is adjusted once the config is loaded
        log::set_boxed_logger(Box::new(CustomLogger { level: LevelFilter::Trace }))?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji for log level
    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌ ",
            Level::Warn => "🚧 ",
            Level::Info => " ",
            Level::Debug => "🔍 ",
            Level::Trace => "📋 ",
        }
    }

    // @returns: ANSI color code for log level
    fn get_color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "1;31",
            Level::Warn => "1;33",
            Level::Info => "1;32",
            Level::Debug => "1;36",
            Level::Trace => "1;35",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level && metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let level = record.level();
            let _ = writeln!(
                std::io::stderr(),
                "\x1B[{}m{} {} {}\x1B[0m",
                Self::get_color_for_level(level),
                now,
                Self::get_emoji_for_level(level),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "translate-relay", &mut std::io::stdout());
            Ok(())
        }
        Some(Commands::Run(args)) => run(args).await,
        None if cli.run.input_dir.is_some() => run(cli.run).await,
        None => {
            CommandLineOptions::command().print_help()?;
            Ok(())
        }
    }
}

/// Load the config file, writing a default one when it is missing
fn load_config(config_path: &str) -> Result<Config> {
    if Path::new(config_path).exists() {
        let file = File::open(config_path)
            .context(format!("Failed to open config file: {}", config_path))?;
        let reader = BufReader::new(file);
        let config: Config = serde_json::from_reader(reader)
            .context(format!("Failed to parse config file: {}", config_path))?;
        return Ok(config);
    }

    warn!("Config file not found at '{}', creating default config.", config_path);
    let config = Config::default();
    let config_json = serde_json::to_string_pretty(&config)
        .context("Failed to serialize default config to JSON")?;
    std::fs::write(config_path, config_json)
        .context(format!("Failed to write default config to file: {}", config_path))?;
    Ok(config)
}

async fn run(options: RunArgs) -> Result<()> {
    if let Some(cmd_log_level) = &options.log_level {
        let level: app_config::LogLevel = cmd_log_level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    let mut config = load_config(&options.config_path)?;
    config.apply_env_overrides(|name| std::env::var(name).ok());

    // Command line flags win over file and environment
    if let Some(provider) = &options.provider {
        config.translation.provider = provider.clone().into();
    }
    if let Some(target_language) = &options.target_language {
        config.target_language = target_language.clone();
    }
    if let Some(recipient) = &options.recipient {
        config.notification.recipient = recipient.clone();
    }
    if let Some(policy) = &options.failure_policy {
        config.failure_policy = policy.clone().into();
    }
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }

    config.validate().context("Configuration validation failed")?;

    if options.log_level.is_none() {
        log::set_max_level(config.log_level.to_level_filter());
    }

    let input_dir = options
        .input_dir
        .ok_or_else(|| anyhow!("INPUT_DIR is required"))?;

    let controller = Controller::with_config(config)?;
    let run_options = RunOptions {
        input_dir,
        store_dir: options.store_dir,
        output_dir: options.output_dir,
        extensions: options
            .extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect(),
        wait_timeout: Duration::from_secs(options.timeout_secs),
        show_progress: true,
    };

    let summary = controller.run(&run_options).await?;
    if summary.translation_failures > 0 || summary.notification_failures > 0 {
        warn!(
            "{} translation and {} notification failure(s); see the log above",
            summary.translation_failures, summary.notification_failures
        );
    } else {
        info!("All {} document(s) processed", summary.uploaded);
    }

    Ok(())
}
