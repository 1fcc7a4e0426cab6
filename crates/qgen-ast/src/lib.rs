//! Query expressions in the parenthesised text-AST notation.
//!
//! A request is a single expression such as
//!
//! ```text
//! (call (attr (call EventDataset 'localds://mc16') 'Select') (lambda (list e) (attr e 'pt')))
//! ```
//!
//! This crate only knows the notation: atoms, string/number literals and `(head arg*)`
//! forms. What a form *means* is up to the code generators in `qgen-codegen`.

mod dataset;
mod expr;
mod syntax;

pub use dataset::{extract_dataset_info, find_dataset, DatasetError, DatasetReference};
pub use expr::Expr;
pub use syntax::{parse, Module, ParseError, Statement, TextRange};
