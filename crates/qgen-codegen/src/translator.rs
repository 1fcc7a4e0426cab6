use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use qgen_archive::{write_dir_archive, ArchiveLayout};
use qgen_ast::{extract_dataset_info, find_dataset, parse, DatasetError, DatasetReference, Expr};
use qgen_cache::{
    is_atomic_write_tmp_file, CacheError, CacheStore, CachedEntry, Fingerprint, LocalCacheStore,
    StagingArea, RESULT_FILENAME,
};
use qgen_config::TranslatorConfig;
use thiserror::Error;

use crate::backend::{
    ArtifactDescriptor, Backend, BackendKind, CodeGenerator, GenerateError, UnknownBackend,
};

/// Name of the archive file inside a request's staging directory.
pub const ARCHIVE_FILENAME: &str = "joined.zip";

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("requested codegen for an empty string")]
    EmptyRequest,

    #[error("malformed request: {message}")]
    MalformedRequest { message: String },

    #[error("unknown code generation backend {name:?} (expected `uproot` or `xAOD`)")]
    Configuration { name: String },

    #[error("code generation failed: {message}")]
    GenerationFailure { message: String },
}

impl TranslateError {
    fn generation(err: impl std::fmt::Display) -> Self {
        TranslateError::GenerationFailure {
            message: err.to_string(),
        }
    }
}

impl From<UnknownBackend> for TranslateError {
    fn from(err: UnknownBackend) -> Self {
        TranslateError::Configuration { name: err.name }
    }
}

impl From<GenerateError> for TranslateError {
    fn from(err: GenerateError) -> Self {
        TranslateError::generation(err)
    }
}

impl From<CacheError> for TranslateError {
    fn from(err: CacheError) -> Self {
        TranslateError::generation(err)
    }
}

impl From<DatasetError> for TranslateError {
    fn from(err: DatasetError) -> Self {
        TranslateError::generation(err)
    }
}

impl From<std::io::Error> for TranslateError {
    fn from(err: std::io::Error) -> Self {
        TranslateError::generation(err)
    }
}

impl From<serde_json::Error> for TranslateError {
    fn from(err: serde_json::Error) -> Self {
        TranslateError::generation(CacheError::from(err))
    }
}

impl From<anyhow::Error> for TranslateError {
    fn from(err: anyhow::Error) -> Self {
        // `{:#}` keeps the context chain on one line.
        TranslateError::GenerationFailure {
            message: format!("{err:#}"),
        }
    }
}

/// Parse request text into the single expression it must contain.
pub fn parse_request(code: &str) -> Result<Expr, TranslateError> {
    if code.is_empty() {
        return Err(TranslateError::EmptyRequest);
    }
    let module = parse(code).map_err(|err| TranslateError::MalformedRequest {
        message: err.to_string(),
    })?;
    let count = module.body.len();
    let mut body = module.body.into_iter();
    match (body.next(), count) {
        (Some(statement), 1) => Ok(statement.value),
        _ => Err(TranslateError::MalformedRequest {
            message: format!(
                "request yielded {count} code statements (expected exactly one)"
            ),
        }),
    }
}

/// Everything a request produced.
#[derive(Clone, Debug)]
pub struct Translation {
    pub key: Fingerprint,
    /// `true` when the artifacts came from an existing cache entry.
    pub cache_hit: bool,
    pub dataset: Option<DatasetReference>,
    pub descriptor: ArtifactDescriptor,
    /// Zip archive of the entry's generated files.
    pub archive: Vec<u8>,
}

/// Request-scoped front door: parse, address, reuse-or-generate, archive.
///
/// A translator holds no per-request state and can be shared between threads. Identical
/// concurrent requests against the same cache root generate at most once.
#[derive(Debug)]
pub struct AstTranslator<G = Backend> {
    generator: G,
    layout: ArchiveLayout,
    staging_root: Option<PathBuf>,
    invocations: AtomicUsize,
}

impl AstTranslator<Backend> {
    /// Build a translator for the backend named `backend` (`uproot` or `xAOD`).
    pub fn new(backend: &str) -> Result<Self, TranslateError> {
        let kind: BackendKind = backend.parse()?;
        Ok(Self::with_generator(Backend::new(kind)))
    }

    pub fn from_config(config: &TranslatorConfig) -> Result<Self, TranslateError> {
        let mut translator = Self::new(&config.backend)?.with_layout(config.archive.layout);
        translator.staging_root = config.cache.staging_root.clone();
        Ok(translator)
    }
}

impl<G: CodeGenerator> AstTranslator<G> {
    pub fn with_generator(generator: G) -> Self {
        Self {
            generator,
            layout: ArchiveLayout::default(),
            staging_root: None,
            invocations: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_layout(mut self, layout: ArchiveLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Create staging directories under `root` instead of the system temp dir.
    #[must_use]
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(root.into());
        self
    }

    pub fn backend(&self) -> BackendKind {
        self.generator.kind()
    }

    pub fn layout(&self) -> ArchiveLayout {
        self.layout
    }

    /// How many times this translator has run its generator.
    pub fn generator_invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Translate `code` and return the zip bytes of the generated files.
    pub fn translate_text_ast_to_zip(
        &self,
        code: &str,
        cache_root: &Path,
    ) -> Result<Vec<u8>, TranslateError> {
        Ok(self.translate(code, cache_root)?.archive)
    }

    pub fn translate(&self, code: &str, cache_root: &Path) -> Result<Translation, TranslateError> {
        self.translate_with_store(code, &LocalCacheStore::new(cache_root))
    }

    pub fn translate_with_store<S>(&self, code: &str, store: &S) -> Result<Translation, TranslateError>
    where
        S: CacheStore + ?Sized,
    {
        let expr = parse_request(code)?;
        let key = Fingerprint::for_expr(&expr);
        let dataset = find_dataset(&expr)
            .map(extract_dataset_info)
            .transpose()?;

        let (descriptor, dir, cache_hit) = self.resolve(&expr, &key, store)?;
        let archive = self.archive_entry(&dir)?;

        tracing::debug!(
            target: "qgen.codegen",
            key = %key,
            backend = %self.backend(),
            cache_hit,
            bytes = archive.len(),
            "translated request"
        );
        Ok(Translation {
            key,
            cache_hit,
            dataset,
            descriptor,
            archive,
        })
    }

    /// Return the entry's descriptor and directory, generating the entry first on a miss.
    fn resolve<S>(
        &self,
        expr: &Expr,
        key: &Fingerprint,
        store: &S,
    ) -> Result<(ArtifactDescriptor, PathBuf, bool), TranslateError>
    where
        S: CacheStore + ?Sized,
    {
        if let Some(hit) = self.cached(key, store)? {
            return Ok(hit);
        }

        let _lock = store.lock_entry(key)?;
        // Another request may have finished this entry while we waited for the lock.
        if let Some(hit) = self.cached(key, store)? {
            return Ok(hit);
        }

        tracing::debug!(target: "qgen.codegen", key = %key, "cache miss");
        // Anything already in the entry is left over from an interrupted generation.
        store.discard_entry(key)?;
        let dir = store.create_entry(key)?;

        self.invocations.fetch_add(1, Ordering::SeqCst);
        match self.generate_into(expr, key, &dir, store) {
            Ok(descriptor) => Ok((descriptor, dir, false)),
            Err(err) => {
                if let Err(discard_err) = store.discard_entry(key) {
                    tracing::warn!(
                        target: "qgen.codegen",
                        key = %key,
                        error = %discard_err,
                        "failed to discard cache entry after failed generation"
                    );
                }
                Err(err)
            }
        }
    }

    fn generate_into<S>(
        &self,
        expr: &Expr,
        key: &Fingerprint,
        dir: &Path,
        store: &S,
    ) -> Result<ArtifactDescriptor, TranslateError>
    where
        S: CacheStore + ?Sized,
    {
        let descriptor = self.generator.generate(expr, dir)?;
        store.record_result(key, &serde_json::to_value(&descriptor)?)?;
        Ok(descriptor)
    }

    fn cached<S>(
        &self,
        key: &Fingerprint,
        store: &S,
    ) -> Result<Option<(ArtifactDescriptor, PathBuf, bool)>, TranslateError>
    where
        S: CacheStore + ?Sized,
    {
        let Some(CachedEntry { dir, result, .. }) = store.lookup(key)? else {
            return Ok(None);
        };
        let descriptor: ArtifactDescriptor = match serde_json::from_value(result) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                tracing::debug!(
                    target: "qgen.codegen",
                    key = %key,
                    error = %CacheError::from(err),
                    "cached result is not an artifact descriptor; regenerating"
                );
                return Ok(None);
            }
        };
        if descriptor.backend != self.backend() {
            return Err(TranslateError::GenerationFailure {
                message: format!(
                    "cache entry {key} was generated by the {} backend, not {}",
                    descriptor.backend,
                    self.backend()
                ),
            });
        }
        tracing::debug!(target: "qgen.codegen", key = %key, "cache hit");
        Ok(Some((descriptor, dir, true)))
    }

    /// Zip `dir` through a fresh staging directory and read the archive back into memory.
    fn archive_entry(&self, dir: &Path) -> Result<Vec<u8>, TranslateError> {
        let staging = StagingArea::new(self.staging_root.as_deref())?;
        let archive_path = staging.file_path(ARCHIVE_FILENAME);

        let file = BufWriter::new(File::create(&archive_path)?);
        let (mut file, _summary) =
            write_dir_archive(dir, file, self.layout, |rel| !is_cache_bookkeeping(rel))?;
        file.flush()?;
        drop(file);

        let bytes = std::fs::read(&archive_path)?;
        staging.close()?;
        Ok(bytes)
    }
}

/// The entry's result file (and temp files from writing it) are cache metadata, not output.
fn is_cache_bookkeeping(rel: &Path) -> bool {
    if rel.parent() != Some(Path::new("")) {
        return false;
    }
    let Some(name) = rel.to_str() else {
        return false;
    };
    name == RESULT_FILENAME || (name.starts_with(RESULT_FILENAME) && is_atomic_write_tmp_file(name))
}
