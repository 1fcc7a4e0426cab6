use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors produced by cache management and persistence.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to determine home directory for default cache path")]
    MissingHomeDir,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {message}")]
    Json { message: String },

    #[error("cache entry {path} exists but is not a directory")]
    EntryNotDirectory { path: PathBuf },
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        // Cached results embed query-derived strings (file names, dataset URLs); keep them
        // out of error messages.
        let message = sanitize_json_error_message(&err.to_string());
        Self::Json { message }
    }
}

fn sanitize_json_error_message(message: &str) -> String {
    // Redact double-quoted values but keep the surrounding text and line/column info.
    let mut out = String::with_capacity(message.len());
    let mut chars = message.chars();
    while let Some(ch) = chars.next() {
        out.push(ch);
        if ch != '"' {
            continue;
        }
        let mut closed = false;
        while let Some(inner) = chars.next() {
            match inner {
                '\\' => {
                    chars.next();
                }
                '"' => {
                    closed = true;
                    break;
                }
                _ => {}
            }
        }
        out.push_str("<redacted>");
        if closed {
            out.push('"');
        }
    }
    redact_backticked_name(&mut out);
    out
}

/// serde reports unknown fields/variants as `unknown field `name`, expected ...`.
fn redact_backticked_name(out: &mut String) {
    let Some(start) = out.find('`') else {
        return;
    };
    let rest = &out[start + 1..];
    let Some(len) = rest.find("`, expected").or_else(|| rest.find('`')) else {
        return;
    };
    out.replace_range(start + 1..start + 1 + len, "<redacted>");
}
