use std::fmt::Write as _;
use std::path::Path;

use qgen_ast::Expr;

use crate::backend::{write_output, ArtifactDescriptor, BackendKind, CodeGenerator, GenerateError};
use crate::lower::{lower, Dialect, Sequence};

pub(crate) const TRANSFORMER_FILENAME: &str = "transformer.py";

/// Lowers a query to a Python expression and writes it as `transformer.py`.
///
/// The generated module defines `run_query(EventDataset)`; the runtime passes in the
/// callable that opens the event source, so the dataset call in the query stays a plain
/// function call.
#[derive(Clone, Copy, Debug, Default)]
pub struct UprootGenerator;

struct Python;

impl Dialect for Python {
    fn string_literal(&self, value: &str) -> String {
        python_string(value)
    }

    fn attribute(&self, object: String, name: &str) -> String {
        format!("{object}.{name}")
    }

    fn method_call(&self, object: String, name: &str, args: Vec<String>) -> String {
        format!("{object}.{name}({})", args.join(", "))
    }

    fn lambda(&self, params: &[&str], body: String) -> String {
        format!("(lambda {}: {body})", params.join(", "))
    }

    fn sequence(&self, kind: Sequence, items: Vec<String>) -> String {
        match (kind, items.len()) {
            (Sequence::List, _) => format!("[{}]", items.join(", ")),
            (Sequence::Tuple, 1) => format!("({},)", items[0]),
            (Sequence::Tuple, _) => format!("({})", items.join(", ")),
        }
    }

    fn conditional(&self, test: String, then: String, otherwise: String) -> String {
        format!("({then} if {test} else {otherwise})")
    }

    fn binary_operator(&self, head: &str) -> Option<&'static str> {
        Some(match head {
            "+" => "+",
            "-" => "-",
            "*" => "*",
            "/" => "/",
            "%" => "%",
            "==" => "==",
            "!=" => "!=",
            "<" => "<",
            "<=" => "<=",
            ">" => ">",
            ">=" => ">=",
            "and" => "and",
            "or" => "or",
            _ => return None,
        })
    }

    fn unary_operator(&self, head: &str) -> Option<&'static str> {
        match head {
            "-" => Some("-"),
            "not" => Some("not "),
            _ => None,
        }
    }
}

fn python_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn render_transformer(expr: &Expr, lowered: &str) -> String {
    format!(
        "# Generated by qgen {version}. Do not edit.\n\
         \n\
         QUERY = {query}\n\
         \n\
         \n\
         def run_query(EventDataset):\n    \
             return {lowered}\n",
        version = qgen_cache::QGEN_VERSION,
        query = python_string(&expr.canonical_text()),
    )
}

impl CodeGenerator for UprootGenerator {
    fn kind(&self) -> BackendKind {
        BackendKind::Uproot
    }

    fn generate(&self, expr: &Expr, output_dir: &Path) -> Result<ArtifactDescriptor, GenerateError> {
        let lowered = lower(&Python, expr)?;
        write_output(
            output_dir,
            TRANSFORMER_FILENAME,
            &render_transformer(expr, &lowered),
        )?;
        Ok(ArtifactDescriptor {
            backend: BackendKind::Uproot,
            files: vec![TRANSFORMER_FILENAME.to_string()],
            main_script: Some(TRANSFORMER_FILENAME.to_string()),
        })
    }
}
