use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use qgen_ast::Expr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::uproot::UprootGenerator;
use crate::xaod::XaodGenerator;

/// Which code generator a translator drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// Columnar/tabular execution: emits a Python transformer.
    #[serde(rename = "uproot")]
    Uproot,
    /// Typed-object navigation: emits C++ sources and a runner script.
    #[serde(rename = "xAOD")]
    Xaod,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::Uproot, BackendKind::Xaod];

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Uproot => "uproot",
            BackendKind::Xaod => "xAOD",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unknown code generation backend {name:?} (expected `uproot` or `xAOD`)")]
pub struct UnknownBackend {
    pub name: String,
}

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownBackend { name: s.to_owned() })
    }
}

/// What a generator produced. Persisted as the cache entry's serialized result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub backend: BackendKind,
    /// Generated files, relative to the output directory, sorted.
    pub files: Vec<String>,
    /// The file a downstream runner should execute, if the backend has one.
    pub main_script: Option<String>,
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("cannot generate code for `{form}`: {reason}")]
    Unsupported { form: String, reason: String },

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A code generation backend.
///
/// `generate` writes zero or more files into `output_dir` (which already exists) and
/// describes what it wrote.
pub trait CodeGenerator: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn generate(&self, expr: &Expr, output_dir: &Path) -> Result<ArtifactDescriptor, GenerateError>;
}

/// The built-in backends, selected once from configuration.
#[derive(Clone, Debug)]
pub enum Backend {
    Uproot(UprootGenerator),
    Xaod(XaodGenerator),
}

impl Backend {
    pub fn new(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Uproot => Backend::Uproot(UprootGenerator),
            BackendKind::Xaod => Backend::Xaod(XaodGenerator),
        }
    }
}

impl CodeGenerator for Backend {
    fn kind(&self) -> BackendKind {
        match self {
            Backend::Uproot(generator) => generator.kind(),
            Backend::Xaod(generator) => generator.kind(),
        }
    }

    fn generate(&self, expr: &Expr, output_dir: &Path) -> Result<ArtifactDescriptor, GenerateError> {
        match self {
            Backend::Uproot(generator) => generator.generate(expr, output_dir),
            Backend::Xaod(generator) => generator.generate(expr, output_dir),
        }
    }
}

pub(crate) fn write_output(
    output_dir: &Path,
    name: &str,
    contents: &str,
) -> Result<(), GenerateError> {
    let path = output_dir.join(name);
    std::fs::write(&path, contents).map_err(|source| GenerateError::Io { path, source })
}
