use serde::{Deserialize, Serialize};
use std::fmt;

/// A single node of a query expression.
///
/// Number literals hold the canonical spelling the parser gives them (`1.50` is read as
/// `Number("1.5")`), so two parsed expressions are equal exactly when they are
/// structurally identical.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Identifier { name: String },
    Number { literal: String },
    Str { value: String },
    Form { head: String, args: Vec<Expr> },
}

impl Expr {
    pub fn identifier(name: impl Into<String>) -> Self {
        Expr::Identifier { name: name.into() }
    }

    pub fn number(literal: impl Into<String>) -> Self {
        Expr::Number {
            literal: literal.into(),
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::Str {
            value: value.into(),
        }
    }

    pub fn form(head: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Form {
            head: head.into(),
            args,
        }
    }

    /// Returns the form's arguments when `self` is a `(head ...)` form with the given head.
    #[must_use]
    pub fn as_form(&self, expected_head: &str) -> Option<&[Expr]> {
        match self {
            Expr::Form { head, args } if head == expected_head => Some(args),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Expr::Identifier { name } => Some(name),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Expr::Str { value } => Some(value),
            _ => None,
        }
    }

    /// Pre-order traversal of `self` and every nested expression.
    pub fn walk(&self) -> impl Iterator<Item = &Expr> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            if let Expr::Form { args, .. } = next {
                stack.extend(args.iter().rev());
            }
            Some(next)
        })
    }

    /// The canonical text form: single spaces between form elements, strings in single
    /// quotes. Parsing the canonical text yields an equal expression.
    #[must_use]
    pub fn canonical_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Identifier { name } => f.write_str(name),
            Expr::Number { literal } => f.write_str(literal),
            Expr::Str { value } => {
                f.write_str("'")?;
                for ch in value.chars() {
                    match ch {
                        '\\' => f.write_str("\\\\")?,
                        '\'' => f.write_str("\\'")?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        '\r' => f.write_str("\\r")?,
                        other => write!(f, "{other}")?,
                    }
                }
                f.write_str("'")
            }
            Expr::Form { head, args } => {
                write!(f, "({head}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_is_preorder() {
        let expr = Expr::form(
            "call",
            vec![
                Expr::identifier("f"),
                Expr::form("list", vec![Expr::number("1")]),
                Expr::string("x"),
            ],
        );
        let rendered: Vec<String> = expr.walk().map(|e| e.to_string()).collect();
        assert_eq!(
            rendered,
            vec!["(call f (list 1) 'x')", "f", "(list 1)", "1", "'x'"]
        );
    }

    #[test]
    fn display_escapes_quotes_and_control_characters() {
        let expr = Expr::string("it's\n\\");
        assert_eq!(expr.to_string(), r"'it\'s\n\\'");
    }

    #[test]
    fn serde_shape_is_tagged() {
        let expr = Expr::form("attr", vec![Expr::identifier("e"), Expr::string("pt")]);
        let json = serde_json::to_value(&expr).unwrap();
        assert_eq!(json["kind"], "form");
        assert_eq!(json["head"], "attr");
        assert_eq!(json["args"][1]["value"], "pt");
    }
}
