//! Expression lowering shared by the built-in backends.
//!
//! A backend supplies a [`Dialect`] describing how each construct is spelled in its target
//! language; [`lower`] walks the query and asks the dialect for the text of every node.

use qgen_ast::Expr;

use crate::backend::GenerateError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Sequence {
    List,
    Tuple,
}

pub(crate) trait Dialect {
    fn string_literal(&self, value: &str) -> String;

    /// `(attr object 'name')` when it is not the callee of a `call`.
    fn attribute(&self, object: String, name: &str) -> String;

    /// `(call (attr object 'name') args...)`.
    fn method_call(&self, object: String, name: &str, args: Vec<String>) -> String;

    fn lambda(&self, params: &[&str], body: String) -> String;

    fn sequence(&self, kind: Sequence, items: Vec<String>) -> String;

    fn conditional(&self, test: String, then: String, otherwise: String) -> String;

    fn binary_operator(&self, head: &str) -> Option<&'static str>;

    fn unary_operator(&self, head: &str) -> Option<&'static str>;

    /// Heads the dialect handles itself. Arguments arrive already lowered.
    fn custom_form(&self, _head: &str, _args: &[String]) -> Option<String> {
        None
    }
}

pub(crate) fn unsupported(expr: &Expr, reason: impl Into<String>) -> GenerateError {
    GenerateError::Unsupported {
        form: expr.canonical_text(),
        reason: reason.into(),
    }
}

pub(crate) fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

pub(crate) fn lower<D: Dialect>(dialect: &D, expr: &Expr) -> Result<String, GenerateError> {
    match expr {
        Expr::Identifier { name } => {
            if is_valid_identifier(name) {
                Ok(name.clone())
            } else {
                Err(unsupported(expr, "not a valid identifier"))
            }
        }
        Expr::Number { literal } => Ok(literal.clone()),
        Expr::Str { value } => Ok(dialect.string_literal(value)),
        Expr::Form { head, args } => lower_form(dialect, expr, head, args),
    }
}

fn lower_all<D: Dialect>(dialect: &D, args: &[Expr]) -> Result<Vec<String>, GenerateError> {
    args.iter().map(|arg| lower(dialect, arg)).collect()
}

fn attribute_name<'a>(expr: &Expr, name: &'a Expr) -> Result<&'a str, GenerateError> {
    match name.as_str() {
        Some(name) if is_valid_identifier(name) => Ok(name),
        _ => Err(unsupported(
            expr,
            "attribute name must be a string naming an identifier",
        )),
    }
}

fn lower_form<D: Dialect>(
    dialect: &D,
    expr: &Expr,
    head: &str,
    args: &[Expr],
) -> Result<String, GenerateError> {
    match (head, args) {
        ("call", [callee, rest @ ..]) => {
            if let Some([object, name]) = callee.as_form("attr") {
                let name = attribute_name(callee, name)?;
                let object = lower(dialect, object)?;
                return Ok(dialect.method_call(object, name, lower_all(dialect, rest)?));
            }
            let callee = lower(dialect, callee)?;
            Ok(format!("{callee}({})", lower_all(dialect, rest)?.join(", ")))
        }
        ("attr", [object, name]) => {
            let name = attribute_name(expr, name)?;
            Ok(dialect.attribute(lower(dialect, object)?, name))
        }
        ("subscript", [value, index]) => Ok(format!(
            "{}[{}]",
            lower(dialect, value)?,
            lower(dialect, index)?
        )),
        ("lambda", [params, body]) => {
            let Some(params) = params.as_form("list") else {
                return Err(unsupported(expr, "lambda parameters must be a `list` form"));
            };
            let params = params
                .iter()
                .map(|param| match param.as_identifier() {
                    Some(name) if is_valid_identifier(name) => Ok(name),
                    _ => Err(unsupported(expr, "lambda parameters must be identifiers")),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(dialect.lambda(&params, lower(dialect, body)?))
        }
        ("list", items) => Ok(dialect.sequence(Sequence::List, lower_all(dialect, items)?)),
        ("tuple", items) => Ok(dialect.sequence(Sequence::Tuple, lower_all(dialect, items)?)),
        ("if", [test, then, otherwise]) => Ok(dialect.conditional(
            lower(dialect, test)?,
            lower(dialect, then)?,
            lower(dialect, otherwise)?,
        )),
        (op, [operand]) if dialect.unary_operator(op).is_some() => {
            let symbol = dialect.unary_operator(op).unwrap_or(op);
            Ok(format!("({symbol}{})", lower(dialect, operand)?))
        }
        (op, [left, right]) if dialect.binary_operator(op).is_some() => {
            let symbol = dialect.binary_operator(op).unwrap_or(op);
            Ok(format!(
                "({} {symbol} {})",
                lower(dialect, left)?,
                lower(dialect, right)?
            ))
        }
        _ => {
            let lowered = lower_all(dialect, args)?;
            dialect
                .custom_form(head, &lowered)
                .ok_or_else(|| unsupported(expr, format!("unsupported form `{head}`")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_ascii_words() {
        assert!(is_valid_identifier("e"));
        assert!(is_valid_identifier("_jet2"));
        assert!(!is_valid_identifier("2e"));
        assert!(!is_valid_identifier("a.b"));
        assert!(!is_valid_identifier(""));
    }
}
