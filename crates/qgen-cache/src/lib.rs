//! Content-addressed cache of generated artifact bundles.
//!
//! ## On-disk layout (inventory)
//!
//! Everything lives under a caller-supplied `<cache_root>/`:
//! - `<key>/`:
//!   - one cache entry per distinct query expression; `<key>` is the [`Fingerprint`] of
//!     the expression's canonical text
//!   - holds the code generator's output files, written directly into the entry
//! - `<key>/rep_cache.json`:
//!   - the serialized generator result ([`RESULT_FILENAME`], schema
//!     [`RESULT_SCHEMA_VERSION`]); its presence is what makes the entry a hit
//! - `<key>.lock`:
//!   - per-key [`CacheLock`] file serialising generation of the same key across threads
//!     and processes
//!
//! Nothing here evicts entries; the cache root's lifecycle is owned by whoever operates it.
//!
//! Per-request scratch space comes from [`StagingArea`], which is never inside the cache.

mod cache_dir;
mod error;
mod fingerprint;
mod lock;
mod staging;
mod store;
mod util;

pub use cache_dir::{cache_root, CacheConfig, CACHE_DIR_ENV_VAR};
pub use error::CacheError;
pub use fingerprint::Fingerprint;
pub use lock::CacheLock;
pub use staging::{StagingArea, STAGING_DIR_PREFIX};
pub use store::{
    CacheStore, CachedEntry, LocalCacheStore, RESULT_FILENAME, RESULT_SCHEMA_VERSION,
};
pub use util::{atomic_write, is_atomic_write_tmp_file, now_millis, RESULT_PAYLOAD_LIMIT_BYTES};

/// Version stamped into every persisted cache result.
pub const QGEN_VERSION: &str = env!("CARGO_PKG_VERSION");
