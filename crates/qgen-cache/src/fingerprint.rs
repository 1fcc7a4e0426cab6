use qgen_ast::Expr;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Domain separator for expression keys. Bumping it invalidates every existing entry, which
/// is what we want if the canonical text form ever changes.
const EXPR_KEY_DOMAIN: &[u8] = b"qgen.expr.v1\0";

/// A stable SHA-256 fingerprint stored as a lowercase hex string.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the SHA-256 fingerprint of an arbitrary byte slice.
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes.as_ref());
        Self(hex::encode(hasher.finalize()))
    }

    /// The cache key of a query expression.
    ///
    /// Depends only on the expression's structure: the input's whitespace and string quote
    /// style are gone by the time the expression is rendered canonically.
    pub fn for_expr(expr: &Expr) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(EXPR_KEY_DOMAIN);
        hasher.update(expr.canonical_text().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
