use crate::error::CacheError;
use std::path::PathBuf;

/// Environment variable overriding the cache root.
pub const CACHE_DIR_ENV_VAR: &str = "QGEN_CACHE_DIR";

/// Configuration for selecting the on-disk cache root.
#[derive(Clone, Debug, Default)]
pub struct CacheConfig {
    /// Override the default cache directory (`~/.qgen/cache`).
    pub cache_root_override: Option<PathBuf>,
}

impl CacheConfig {
    pub fn from_env() -> Self {
        Self {
            cache_root_override: std::env::var_os(CACHE_DIR_ENV_VAR)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from),
        }
    }
}

/// Resolve the cache root for `config`.
///
/// The directory is not created here; entries create their own directories on first miss.
pub fn cache_root(config: &CacheConfig) -> Result<PathBuf, CacheError> {
    match &config.cache_root_override {
        Some(root) => Ok(root.clone()),
        None => default_cache_root(),
    }
}

pub(crate) fn default_cache_root() -> Result<PathBuf, CacheError> {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .ok_or(CacheError::MissingHomeDir)?;

    Ok(home.join(".qgen").join("cache"))
}
