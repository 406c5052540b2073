use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::errors::WorkflowError;

/// Default location of the configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "configs/app_config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),
    #[error("invalid config value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

impl From<ConfigError> for WorkflowError {
    fn from(err: ConfigError) -> Self {
        WorkflowError::Configuration(err.to_string())
    }
}

/// Main configuration structure for Malg-ACTA
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Front-end selection and polling behavior
    pub input: InputConfig,
    /// Receipt output settings
    pub output: OutputConfig,
    /// Persistent data files
    pub data_paths: DataPathsConfig,
    /// Measurement and device recovery timing
    pub acquisition: AcquisitionConfig,
    /// Log sink settings
    pub logging: LoggingConfig,
    /// Declarative strategy registry seed: category -> name -> descriptor
    pub plugins: HashMap<String, HashMap<String, PluginSeed>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InputMethod {
    /// Interactive terminal prompts
    Cli,
    /// JSON-lines submissions pushed by an external front-end
    Queue,
}

impl InputMethod {
    /// Strategy name under the `input` registry category
    pub fn strategy_name(&self) -> &'static str {
        match self {
            InputMethod::Cli => "cli",
            InputMethod::Queue => "queue",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InputConfig {
    pub method: InputMethod,
    /// Idle poll interval
    pub poll_interval_ms: u64,
    /// Attempts made when starting a front-end resource
    pub retry_count: u32,
    /// Delay between startup attempts
    pub retry_delay_ms: u64,
    /// JSON-lines file read by the queue front-end (stdin when absent)
    pub queue_path: Option<PathBuf>,
    /// Bound of the submission queue
    pub queue_capacity: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            method: InputMethod::Cli,
            poll_interval_ms: 100,
            retry_count: 3,
            retry_delay_ms: 1000,
            queue_path: None,
            queue_capacity: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving generated receipts
    pub reports_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            reports_dir: PathBuf::from("data/reports"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DataPathsConfig {
    /// Append-only testing registry
    pub registry_file: PathBuf,
    pub clients_file: PathBuf,
    pub concrete_classes_file: PathBuf,
}

impl Default for DataPathsConfig {
    fn default() -> Self {
        Self {
            registry_file: PathBuf::from("data/registry.jsonl"),
            clients_file: PathBuf::from("data/clients.json"),
            concrete_classes_file: PathBuf::from("data/concrete_classes.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Simulated time an instrument takes to produce a reading
    pub reading_delay_ms: u64,
    /// Simulated time a device takes to reconnect
    pub reconnect_delay_ms: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            reading_delay_ms: 500,
            reconnect_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level directive (overridable with RUST_LOG)
    pub level: String,
    /// Emit structured JSON instead of compact text
    pub json: bool,
    /// Echo developer logs to the console
    pub console_enabled: bool,
    /// Optional log file
    pub path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            console_enabled: true,
            path: Some(PathBuf::from("logs/malg-acta.log")),
        }
    }
}

/// One strategy descriptor as written in configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PluginSeed {
    pub module: Option<String>,
    pub class: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl PluginSeed {
    pub fn new(module: &str, class: &str, description: &str) -> Self {
        Self {
            module: Some(module.to_string()),
            class: Some(class.to_string()),
            description: description.to_string(),
        }
    }
}

/// Registry seed shipped with the binary
pub fn default_plugins() -> HashMap<String, HashMap<String, PluginSeed>> {
    let mut input = HashMap::new();
    input.insert(
        "cli".to_string(),
        PluginSeed::new("input::terminal", "TerminalInput", "Interactive terminal prompts"),
    );
    input.insert(
        "queue".to_string(),
        PluginSeed::new("input::queue", "QueueInput", "JSON-lines submission queue"),
    );

    let mut output = HashMap::new();
    output.insert(
        "receipt_generator".to_string(),
        PluginSeed::new("output::receipts", "ReceiptGenerator", "Text and CSV receipts"),
    );

    let mut plugins = HashMap::new();
    plugins.insert("input".to_string(), input);
    plugins.insert("output".to_string(), output);
    plugins
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (explicit path, or configs/app_config.yaml if present)
    /// 3. Environment variables (prefixed with MALG_ACTA, `__` between sections)
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::with_defaults())?);

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::FileNotFound(path.to_path_buf()));
                }
                builder = builder.add_source(File::from(path));
            }
            None => {
                if Path::new(DEFAULT_CONFIG_PATH).exists() {
                    builder = builder.add_source(File::with_name(DEFAULT_CONFIG_PATH));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("MALG_ACTA")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults including the shipped plugin seed
    pub fn with_defaults() -> Self {
        Self {
            plugins: default_plugins(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input.poll_interval_ms == 0 {
            return Err(invalid("input.poll_interval_ms", "must be greater than zero"));
        }
        if self.input.retry_count == 0 {
            return Err(invalid("input.retry_count", "must be at least 1"));
        }
        if self.input.queue_capacity == 0 {
            return Err(invalid("input.queue_capacity", "must be at least 1"));
        }
        if self.output.reports_dir.as_os_str().is_empty() {
            return Err(invalid("output.reports_dir", "must not be empty"));
        }
        if self.data_paths.registry_file.as_os_str().is_empty() {
            return Err(invalid("data_paths.registry_file", "must not be empty"));
        }
        if self.plugins.keys().any(|category| category.trim().is_empty()) {
            return Err(invalid("plugins", "category names must not be empty"));
        }
        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load .env file if it exists
    pub fn load_env_file() {
        if Path::new(".env").exists() {
            match dotenvy::dotenv() {
                Ok(_) => tracing::info!("Loaded environment variables from .env file"),
                Err(e) => tracing::warn!("Failed to load .env file: {}", e),
            }
        }
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
