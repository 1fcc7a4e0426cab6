//! Turn a text-AST query into a zip of generated code, caching by query content.
//!
//! The entry point is [`AstTranslator`]. It parses the request, derives the cache key,
//! reuses a completed cache entry or runs the configured [`CodeGenerator`] into a new one,
//! and returns the entry's files as zip bytes.

mod backend;
mod lower;
mod translator;
mod uproot;
mod xaod;

pub use backend::{
    ArtifactDescriptor, Backend, BackendKind, CodeGenerator, GenerateError, UnknownBackend,
};
pub use translator::{parse_request, AstTranslator, TranslateError, Translation, ARCHIVE_FILENAME};
pub use uproot::UprootGenerator;
pub use xaod::XaodGenerator;
