//! A small reader for the parenthesised text-AST notation.
//!
//! The reader is deliberately permissive about *which* forms appear (that is the code
//! generators' business) but strict about the notation itself: balanced parentheses,
//! terminated strings, and forms that start with an identifier.

use crate::expr::Expr;
use thiserror::Error;

pub use text_size::TextRange;
use text_size::TextSize;

/// Nesting limit for forms. Keeps the recursive reader and the recursive consumers of
/// [`Expr`] (display, lowering) well clear of stack exhaustion on hostile input.
const MAX_DEPTH: usize = 512;

fn text_size(offset: usize) -> TextSize {
    TextSize::from(u32::try_from(offset).unwrap_or(u32::MAX))
}

fn text_range(start: usize, end: usize) -> TextRange {
    TextRange::new(text_size(start), text_size(end))
}

/// One top-level expression and where it came from in the input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Statement {
    pub value: Expr,
    pub range: TextRange,
}

/// The result of reading a text: every top-level expression, in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Module {
    pub body: Vec<Statement>,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unexpected `)` at offset {offset}")]
    UnexpectedClose { offset: usize },

    #[error("unclosed `(` opened at offset {offset}")]
    UnclosedForm { offset: usize },

    #[error("unterminated string literal starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("empty form at offset {offset}")]
    EmptyForm { offset: usize },

    #[error("form at offset {offset} must start with an identifier")]
    InvalidHead { offset: usize },

    #[error("expression nesting exceeds {max} levels")]
    TooDeep { max: usize },
}

/// Read `text` into its top-level statements.
///
/// An empty (or whitespace-only) text yields a module with no statements; deciding whether
/// that is acceptable is left to the caller.
pub fn parse(text: &str) -> Result<Module, ParseError> {
    let mut reader = Reader {
        text,
        bytes: text.as_bytes(),
        pos: 0,
    };

    let mut body = Vec::new();
    loop {
        reader.skip_whitespace();
        if reader.at_end() {
            break;
        }
        let start = reader.pos;
        let value = reader.expr(0)?;
        body.push(Statement {
            value,
            range: text_range(start, reader.pos),
        });
    }

    Ok(Module { body })
}

struct Reader<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if !b.is_ascii_whitespace() {
                break;
            }
            self.pos += 1;
        }
    }

    fn expr(&mut self, depth: usize) -> Result<Expr, ParseError> {
        if depth > MAX_DEPTH {
            return Err(ParseError::TooDeep { max: MAX_DEPTH });
        }

        match self.peek() {
            Some(b'(') => self.form(depth),
            Some(b')') => Err(ParseError::UnexpectedClose { offset: self.pos }),
            Some(b'\'') => self.string('\''),
            Some(b'"') => self.string('"'),
            Some(_) => Ok(self.atom()),
            None => Err(ParseError::UnclosedForm { offset: self.pos }),
        }
    }

    fn form(&mut self, depth: usize) -> Result<Expr, ParseError> {
        let open = self.pos;
        self.pos += 1;

        self.skip_whitespace();
        match self.peek() {
            None => return Err(ParseError::UnclosedForm { offset: open }),
            Some(b')') => return Err(ParseError::EmptyForm { offset: open }),
            Some(_) => {}
        }

        let head_start = self.pos;
        let head = match self.expr(depth + 1)? {
            Expr::Identifier { name } => name,
            _ => return Err(ParseError::InvalidHead { offset: head_start }),
        };

        let mut args = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(ParseError::UnclosedForm { offset: open }),
                Some(b')') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => args.push(self.expr(depth + 1)?),
            }
        }

        Ok(Expr::Form { head, args })
    }

    fn string(&mut self, quote: char) -> Result<Expr, ParseError> {
        let start = self.pos;
        // Skip the opening quote (always a single ASCII byte).
        let body_start = self.pos + 1;

        let mut value = String::new();
        let mut chars = self.text[body_start..].char_indices();
        while let Some((idx, ch)) = chars.next() {
            match ch {
                c if c == quote => {
                    self.pos = body_start + idx + c.len_utf8();
                    return Ok(Expr::Str { value });
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, 'r')) => value.push('\r'),
                    Some((_, c @ ('\\' | '\'' | '"'))) => value.push(c),
                    Some((_, other)) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => break,
                },
                c => value.push(c),
            }
        }

        Err(ParseError::UnterminatedString { offset: start })
    }

    fn atom(&mut self) -> Expr {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() || matches!(b, b'(' | b')' | b'\'' | b'"') {
                break;
            }
            self.pos += 1;
        }

        let text = &self.text[start..self.pos];
        match canonical_number(text) {
            Some(literal) => Expr::number(literal),
            None => Expr::identifier(text),
        }
    }
}

/// The canonical spelling of a numeric atom, or `None` when `text` is not a number.
///
/// Integers lose their `+` sign and leading zeros. Anything else is read as an `f64` and
/// written back in its shortest round-trip form, so `1.50`, `1.5` and `15e-1` are the same
/// literal while `1` and `1.0` stay distinct.
fn canonical_number(text: &str) -> Option<String> {
    let (negative, unsigned) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    // `f64::from_str` also accepts `inf`/`NaN`; the leading-digit check rules those out.
    if !unsigned
        .as_bytes()
        .first()
        .is_some_and(|b| b.is_ascii_digit() || *b == b'.')
    {
        return None;
    }

    if unsigned.bytes().all(|b| b.is_ascii_digit()) {
        let digits = unsigned.trim_start_matches('0');
        return Some(match (negative, digits) {
            (_, "") => "0".to_owned(),
            (true, digits) => format!("-{digits}"),
            (false, digits) => digits.to_owned(),
        });
    }

    let value = unsigned.parse::<f64>().ok().filter(|value| value.is_finite())?;
    let value = if negative { -value } else { value };
    Some(format!("{value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(text: &str) -> Expr {
        let module = parse(text).expect("parse");
        assert_eq!(module.body.len(), 1, "expected one statement in {text:?}");
        module.body.into_iter().next().unwrap().value
    }

    #[test]
    fn reads_bare_identifier() {
        assert_eq!(single("expr1"), Expr::identifier("expr1"));
    }

    #[test]
    fn reads_nested_query() {
        let expr = single(
            "(call (attr (call EventDataset 'localds://mc16') 'Select') \
             (lambda (list e) (attr e 'pt')))",
        );
        assert_eq!(
            expr.to_string(),
            "(call (attr (call EventDataset 'localds://mc16') 'Select') \
             (lambda (list e) (attr e 'pt')))"
        );
    }

    #[test]
    fn classifies_numbers() {
        assert_eq!(single("42"), Expr::number("42"));
        assert_eq!(single("-1.5e3"), Expr::number("-1500.0"));
        assert_eq!(single(".5"), Expr::number("0.5"));
        assert_eq!(single("-"), Expr::identifier("-"));
        assert_eq!(single("inf"), Expr::identifier("inf"));
        assert_eq!(single("NaN"), Expr::identifier("NaN"));
        assert_eq!(single("1e400"), Expr::identifier("1e400"));
    }

    #[test]
    fn number_spellings_of_one_value_are_equal() {
        assert_eq!(single("1.5"), single("1.50"));
        assert_eq!(single("1.5"), single("15e-1"));
        assert_eq!(single("+007"), Expr::number("7"));
        assert_eq!(single("-0"), Expr::number("0"));
        assert_eq!(single("2."), Expr::number("2.0"));
        assert_ne!(single("1"), single("1.0"));

        for text in ["1.50", "-1.5e3", ".5", "1e16", "123456789012345678901234567890"] {
            let literal = single(text);
            assert_eq!(single(&literal.to_string()), literal, "{text:?}");
        }
    }

    #[test]
    fn both_quote_styles_read_the_same_string() {
        assert_eq!(single("'a b'"), single("\"a b\""));
        assert_eq!(single(r#"'it\'s'"#), Expr::string("it's"));
        assert_eq!(single(r#""say \"hi\"""#), Expr::string("say \"hi\""));
    }

    #[test]
    fn unknown_escapes_are_kept_verbatim() {
        assert_eq!(single(r"'a\qb'"), Expr::string(r"a\qb"));
    }

    #[test]
    fn counts_top_level_statements() {
        assert!(parse("").unwrap().body.is_empty());
        assert!(parse("  \n\t").unwrap().body.is_empty());
        let module = parse("a (b c) 'd'").unwrap();
        assert_eq!(module.body.len(), 3);
        assert_eq!(module.body[1].range, text_range(2, 7));
    }

    #[test]
    fn rejects_malformed_notation() {
        assert_eq!(parse("(a b"), Err(ParseError::UnclosedForm { offset: 0 }));
        assert_eq!(parse("a)"), Err(ParseError::UnexpectedClose { offset: 1 }));
        assert_eq!(parse("( )"), Err(ParseError::EmptyForm { offset: 0 }));
        assert_eq!(
            parse("('x' y)"),
            Err(ParseError::InvalidHead { offset: 1 })
        );
        assert_eq!(
            parse("(a 'oops)"),
            Err(ParseError::UnterminatedString { offset: 3 })
        );
    }

    #[test]
    fn rejects_excessive_nesting() {
        let text = format!("{}x{}", "(f ".repeat(MAX_DEPTH + 2), ")".repeat(MAX_DEPTH + 2));
        assert_eq!(parse(&text), Err(ParseError::TooDeep { max: MAX_DEPTH }));
    }

    #[test]
    fn canonical_text_round_trips() {
        let expr = single("(call   f\n 'x\\ny'   \"q'\"  -2 )");
        assert_eq!(single(&expr.canonical_text()), expr);
    }
}
