use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once, OnceLock};

use thiserror::Error;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::prelude::*;

pub use qgen_archive::ArchiveLayout;

/// Environment variable naming a TOML config file.
pub const QGEN_CONFIG_ENV_VAR: &str = "QGEN_CONFIG_PATH";

/// Environment variable overriding [`TranslatorConfig::backend`].
pub const QGEN_BACKEND_ENV_VAR: &str = "QGEN_BACKEND";

pub const DEFAULT_BACKEND: &str = "uproot";

/// Top-level configuration of a translator deployment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TranslatorConfig {
    /// Code generation backend: `uproot` or `xAOD`.
    ///
    /// Kept as a string here; the translator validates it when it is constructed.
    #[serde(default = "TranslatorConfig::default_backend")]
    pub backend: String,

    #[serde(default)]
    pub cache: CacheSection,

    #[serde(default)]
    pub archive: ArchiveSection,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TranslatorConfig {
    fn default_backend() -> String {
        DEFAULT_BACKEND.to_owned()
    }
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            backend: Self::default_backend(),
            cache: CacheSection::default(),
            archive: ArchiveSection::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSection {
    /// Cache root. `QGEN_CACHE_DIR` takes precedence; unset means `~/.qgen/cache`.
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Parent directory for per-request staging directories. Unset means the system temp
    /// directory.
    #[serde(default)]
    pub staging_root: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveSection {
    #[serde(default)]
    pub layout: ArchiveLayout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Either a simple level (`info`, `debug`, ...) or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs in JSON format.
    #[serde(default)]
    pub json: bool,

    /// Write logs to stderr.
    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to the given file path. If the file cannot be opened, file logging is
    /// disabled while other sinks remain active.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    pub(crate) fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_owned(),
            "debug" => "debug".to_owned(),
            "info" => "info".to_owned(),
            "warn" | "warning" => "warn".to_owned(),
            "error" => "error".to_owned(),
            // Anything else is treated as an `EnvFilter` directive string.
            _ => trimmed.to_owned(),
        }
    }

    fn config_env_filter(&self) -> tracing_subscriber::EnvFilter {
        let directives = Self::normalize_level_directives(&self.level);
        tracing_subscriber::EnvFilter::try_new(directives).unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::default()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        })
    }

    /// The effective filter: the configured level, merged with `RUST_LOG` when set.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        let env_directives = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        let config_directives = Self::normalize_level_directives(&self.level);

        match env_directives {
            Some(env_directives) => {
                let combined = format!("{config_directives},{env_directives}");
                tracing_subscriber::EnvFilter::try_new(combined)
                    .or_else(|_| tracing_subscriber::EnvFilter::try_new(env_directives))
                    .unwrap_or_else(|_| self.config_env_filter())
            }
            None => self.config_env_filter(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The default `Display` includes a source snippet; keep only the message, with
        // quoted values redacted.
        ConfigError::Toml(sanitize_toml_error_message(err.message()))
    }
}

fn sanitize_toml_error_message(message: &str) -> String {
    static DOUBLE_QUOTED: OnceLock<regex::Regex> = OnceLock::new();
    static SINGLE_QUOTED: OnceLock<regex::Regex> = OnceLock::new();
    static BACKTICKED: OnceLock<regex::Regex> = OnceLock::new();

    let double_quoted = DOUBLE_QUOTED.get_or_init(|| {
        regex::Regex::new(r#""(?:[^"\\]|\\.)*""#).expect("valid double-quote regex")
    });
    let single_quoted = SINGLE_QUOTED
        .get_or_init(|| regex::Regex::new(r"'[^']*'").expect("valid single-quote regex"));
    let backticked = BACKTICKED
        .get_or_init(|| regex::Regex::new(r"`[^`]*`").expect("valid backtick regex"));

    let out = double_quoted.replace_all(message, r#""<redacted>""#);
    let out = single_quoted.replace_all(&out, "'<redacted>'");
    // Only the first backticked segment (the offending key/variant); the rest is the list of
    // expected values, which is worth keeping.
    let out = backticked.replace(&out, "`<redacted>`");
    out.into_owned()
}

impl TranslatorConfig {
    /// Load a config file from TOML.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `QGEN_BACKEND` if it is set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(backend) = std::env::var(QGEN_BACKEND_ENV_VAR) {
            let backend = backend.trim();
            if !backend.is_empty() {
                tracing::debug!(
                    target: "qgen.config",
                    backend,
                    "backend overridden from environment"
                );
                self.backend = backend.to_owned();
            }
        }
    }
}

/// The config file named by `QGEN_CONFIG_PATH`, if any.
pub fn discover_config_path() -> Option<PathBuf> {
    std::env::var_os(QGEN_CONFIG_ENV_VAR)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Load the config from `explicit`, else from `QGEN_CONFIG_PATH`, else defaults; then apply
/// environment overrides.
pub fn load_config(explicit: Option<&Path>) -> Result<TranslatorConfig, ConfigError> {
    let path = explicit.map(Path::to_path_buf).or_else(discover_config_path);
    let mut config = match path {
        Some(path) => TranslatorConfig::load_from_path(path)?,
        None => TranslatorConfig::default(),
    };
    config.apply_env_overrides();
    Ok(config)
}

static TRACING_INIT: Once = Once::new();

/// Initializes structured `tracing` logging.
///
/// Safe to call multiple times; only the first call installs a global subscriber.
pub fn init_tracing(logging: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let filter = logging.env_filter();

        let file = logging.file.as_ref().and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
        let file_open_failed = logging.file.is_some() && file.is_none();

        let mut make_writer = if logging.stderr {
            BoxMakeWriter::new(std::io::stderr)
        } else {
            BoxMakeWriter::new(std::io::sink)
        };
        if let Some(file) = file {
            make_writer = BoxMakeWriter::new(make_writer.and(Mutex::new(file)));
        }

        let base_layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if logging.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        };

        let subscriber = tracing_subscriber::registry().with(filter).with(base_layer);
        if tracing::subscriber::set_global_default(subscriber).is_ok() && file_open_failed {
            if let Some(path) = logging.file.as_ref() {
                tracing::warn!(
                    target: "qgen.config",
                    path = %path.display(),
                    "failed to open log file; file logging disabled"
                );
            }
        }
    });
}
