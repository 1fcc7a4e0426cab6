use std::fmt::Write as _;
use std::path::Path;

use qgen_ast::Expr;

use crate::backend::{write_output, ArtifactDescriptor, BackendKind, CodeGenerator, GenerateError};
use crate::lower::{lower, Dialect, Sequence};

pub(crate) const SOURCE_FILENAME: &str = "query.cxx";
pub(crate) const HEADER_FILENAME: &str = "query.h";
pub(crate) const RUNNER_FILENAME: &str = "runner.sh";

/// Sequence operators the object-tree runtime implements as free functions.
const SEQUENCE_OPERATORS: &[&str] = &["Select", "SelectMany", "Where", "First", "Count"];

/// Lowers a query to C++ against the `qgen` object-tree runtime.
///
/// Writes `query.h`, `query.cxx` and an executable `runner.sh` that compiles and runs the
/// query over the files given on its command line.
#[derive(Clone, Copy, Debug, Default)]
pub struct XaodGenerator;

/// Rewrites method-style sequence operators into operator forms:
/// `(call (attr SRC 'Select') f)` becomes `(Select SRC f)`. Applied bottom-up.
pub(crate) fn normalize(expr: &Expr) -> Expr {
    let Expr::Form { head, args } = expr else {
        return expr.clone();
    };
    let args: Vec<Expr> = args.iter().map(normalize).collect();
    if head == "call" {
        if let Some((callee, rest)) = args.split_first() {
            if let Some([source, name]) = callee.as_form("attr") {
                if let Some(op) = name.as_str().filter(|op| SEQUENCE_OPERATORS.contains(op)) {
                    let mut operands = Vec::with_capacity(rest.len() + 1);
                    operands.push(source.clone());
                    operands.extend_from_slice(rest);
                    return Expr::form(op, operands);
                }
            }
        }
    }
    Expr::form(head.clone(), args)
}

struct Cpp;

impl Dialect for Cpp {
    fn string_literal(&self, value: &str) -> String {
        cpp_string(value)
    }

    fn attribute(&self, object: String, name: &str) -> String {
        format!("{object}.{name}()")
    }

    fn method_call(&self, object: String, name: &str, args: Vec<String>) -> String {
        format!("{object}.{name}({})", args.join(", "))
    }

    fn lambda(&self, params: &[&str], body: String) -> String {
        let params: Vec<String> = params
            .iter()
            .map(|param| format!("const auto& {param}"))
            .collect();
        format!("[&]({}) {{ return {body}; }}", params.join(", "))
    }

    fn sequence(&self, kind: Sequence, items: Vec<String>) -> String {
        match kind {
            Sequence::List => format!("qgen::list({})", items.join(", ")),
            Sequence::Tuple => format!("std::make_tuple({})", items.join(", ")),
        }
    }

    fn conditional(&self, test: String, then: String, otherwise: String) -> String {
        format!("({test} ? {then} : {otherwise})")
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
            "and" => "&&",
            "or" => "||",
            _ => return None,
        })
    }

    fn unary_operator(&self, head: &str) -> Option<&'static str> {
        match head {
            "-" => Some("-"),
            "not" => Some("!"),
            _ => None,
        }
    }

    fn custom_form(&self, head: &str, args: &[String]) -> Option<String> {
        SEQUENCE_OPERATORS
            .contains(&head)
            .then(|| format!("qgen::{head}({})", args.join(", ")))
    }
}

fn cpp_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            // Octal escapes stop after three digits; hex escapes would swallow what follows.
            c if c.is_ascii_control() => {
                let _ = write!(out, "\\{:03o}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn render_header(expr: &Expr) -> String {
    format!(
        "// Generated by qgen {version}. Do not edit.\n\
         #pragma once\n\
         \n\
         #include <qgen/runtime.h>\n\
         \n\
         namespace qgen_query {{\n\
         \n\
         inline constexpr const char* kQuery = {query};\n\
         \n\
         void run_query(qgen::Output& output);\n\
         \n\
         }}  // namespace qgen_query\n",
        version = qgen_cache::QGEN_VERSION,
        query = cpp_string(&expr.canonical_text()),
    )
}

fn render_source(lowered: &str) -> String {
    format!(
        "// Generated by qgen {version}. Do not edit.\n\
         #include \"{HEADER_FILENAME}\"\n\
         \n\
         namespace qgen_query {{\n\
         \n\
         void run_query(qgen::Output& output) {{\n    \
             output.write({lowered});\n\
         }}\n\
         \n\
         }}  // namespace qgen_query\n\
         \n\
         int main(int argc, char** argv) {{\n    \
             return qgen::run_main(argc, argv, qgen_query::run_query);\n\
         }}\n",
        version = qgen_cache::QGEN_VERSION,
    )
}

fn render_runner() -> String {
    format!(
        "#!/usr/bin/env bash\n\
         # Generated by qgen {version}. Do not edit.\n\
         set -euo pipefail\n\
         cd \"$(dirname \"$0\")\"\n\
         \"${{CXX:-c++}}\" -std=c++17 -O2 $(qgen-config --cflags --libs) -o query {SOURCE_FILENAME}\n\
         exec ./query \"$@\"\n",
        version = qgen_cache::QGEN_VERSION,
    )
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), GenerateError> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|source| {
        GenerateError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), GenerateError> {
    Ok(())
}

impl CodeGenerator for XaodGenerator {
    fn kind(&self) -> BackendKind {
        BackendKind::Xaod
    }

    fn generate(&self, expr: &Expr, output_dir: &Path) -> Result<ArtifactDescriptor, GenerateError> {
        let lowered = lower(&Cpp, &normalize(expr))?;

        write_output(output_dir, HEADER_FILENAME, &render_header(expr))?;
        write_output(output_dir, SOURCE_FILENAME, &render_source(&lowered))?;
        write_output(output_dir, RUNNER_FILENAME, &render_runner())?;
        make_executable(&output_dir.join(RUNNER_FILENAME))?;

        let mut files = vec![
            SOURCE_FILENAME.to_string(),
            HEADER_FILENAME.to_string(),
            RUNNER_FILENAME.to_string(),
        ];
        files.sort();
        Ok(ArtifactDescriptor {
            backend: BackendKind::Xaod,
            files,
            main_script: Some(RUNNER_FILENAME.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qgen_ast::parse;

    fn expr(text: &str) -> Expr {
        parse(text).unwrap().body.remove(0).value
    }

    #[test]
    fn normalize_rewrites_nested_sequence_operators() {
        let query = expr(
            "(call (attr (call (attr (call EventDataset 'a') 'Where') (lambda (list e) (> (attr e 'pt') 30))) 'Select') (lambda (list e) (attr e 'eta')))",
        );
        assert_eq!(
            normalize(&query).canonical_text(),
            "(Select (Where (call EventDataset 'a') (lambda (list e) (> (attr e 'pt') 30))) (lambda (list e) (attr e 'eta')))"
        );
    }

    #[test]
    fn normalize_keeps_other_method_calls() {
        let query = expr("(call (attr e 'pt'))");
        assert_eq!(normalize(&query), query);
    }

    #[test]
    fn lowers_to_runtime_calls() {
        let query = expr(
            "(call (attr (call EventDataset 'localds://a') 'Select') (lambda (list e) (attr e 'pt')))",
        );
        assert_eq!(
            lower(&Cpp, &normalize(&query)).unwrap(),
            "qgen::Select(EventDataset(\"localds://a\"), [&](const auto& e) { return e.pt(); })"
        );
        assert_eq!(
            lower(&Cpp, &expr("(if (or a (not b)) 1 2)")).unwrap(),
            "((a || (!b)) ? 1 : 2)"
        );
    }

    #[test]
    fn escapes_strings() {
        assert_eq!(cpp_string("say \"hi\"\n"), r#""say \"hi\"\n""#);
        assert_eq!(cpp_string("\u{1}7"), r#""\0017""#);
    }

    #[test]
    fn writes_query_sources_and_runner() {
        let dir = tempfile::tempdir().unwrap();
        let query = expr("(call (attr (call EventDataset 'a') 'Count'))");
        let descriptor = XaodGenerator.generate(&query, dir.path()).unwrap();
        assert_eq!(descriptor.backend, BackendKind::Xaod);
        assert_eq!(descriptor.files, vec!["query.cxx", "query.h", "runner.sh"]);
        assert_eq!(descriptor.main_script.as_deref(), Some("runner.sh"));

        let source = std::fs::read_to_string(dir.path().join("query.cxx")).unwrap();
        assert!(source.contains("output.write(qgen::Count(EventDataset(\"a\")));"));
        let header = std::fs::read_to_string(dir.path().join("query.h")).unwrap();
        assert!(header.contains(r#"kQuery = "(call (attr (call EventDataset 'a') 'Count'))";"#));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(dir.path().join("runner.sh"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn unsupported_form_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let err = XaodGenerator
            .generate(&expr("(frobnicate x)"), dir.path())
            .unwrap_err();
        assert!(matches!(err, GenerateError::Unsupported { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
