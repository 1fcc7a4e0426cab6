use crate::expr::Expr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DATASET_CALLABLE: &str = "EventDataset";

/// Where a query reads its events from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetReference {
    /// Dataset URLs (`localds://...`, `rucio://...`, `file:///...`), in query order.
    pub urls: Vec<String>,
    /// Optional tree/collection name given as the second `EventDataset` argument.
    pub tree_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DatasetError {
    #[error("expression is not an `EventDataset` call")]
    NotADataset,

    #[error("`EventDataset` call has no dataset argument")]
    MissingSource,

    #[error("`EventDataset` source must be a string or a list of strings, found {found}")]
    InvalidSource { found: String },

    #[error("`EventDataset` tree name must be a string, found {found}")]
    InvalidTreeName { found: String },
}

/// Locate the `(call EventDataset ...)` form a query is rooted at.
///
/// Returns the first match in pre-order, or `None` when the query names no dataset. When a
/// lambda body reads a second dataset, the outer query's source is the one returned.
#[must_use]
pub fn find_dataset(expr: &Expr) -> Option<&Expr> {
    expr.walk().find(|node| is_dataset_call(node))
}

fn is_dataset_call(expr: &Expr) -> bool {
    expr.as_form("call")
        .and_then(|args| args.first())
        .and_then(Expr::as_identifier)
        == Some(DATASET_CALLABLE)
}

/// Pull the dataset URLs and tree name out of an `EventDataset` call found by
/// [`find_dataset`].
pub fn extract_dataset_info(call: &Expr) -> Result<DatasetReference, DatasetError> {
    let args = match call.as_form("call") {
        Some(args) if is_dataset_call(call) => args,
        _ => return Err(DatasetError::NotADataset),
    };

    let source = args.get(1).ok_or(DatasetError::MissingSource)?;
    let urls = match source {
        Expr::Str { value } => vec![value.clone()],
        Expr::Form { head, args } if head == "list" => args
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| DatasetError::InvalidSource {
                        found: item.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?,
        other => {
            return Err(DatasetError::InvalidSource {
                found: other.to_string(),
            })
        }
    };

    let tree_name = match args.get(2) {
        None => None,
        Some(Expr::Str { value }) => Some(value.clone()),
        Some(other) => {
            return Err(DatasetError::InvalidTreeName {
                found: other.to_string(),
            })
        }
    };

    Ok(DatasetReference { urls, tree_name })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    fn expr(text: &str) -> Expr {
        parse(text).unwrap().body.remove(0).value
    }

    #[test]
    fn finds_dataset_at_root_of_query_chain() {
        let query = expr(
            "(call (attr (call EventDataset 'localds://mc16' 'CollectionTree') 'Select') \
             (lambda (list e) (attr e 'pt')))",
        );
        let call = find_dataset(&query).expect("dataset");
        let info = extract_dataset_info(call).unwrap();
        assert_eq!(info.urls, vec!["localds://mc16".to_string()]);
        assert_eq!(info.tree_name.as_deref(), Some("CollectionTree"));
    }

    #[test]
    fn nested_sub_query_does_not_replace_outer_source() {
        let query = expr(
            "(call (attr (call EventDataset 'localds://outer') 'Select') \
             (lambda (list e) (call (attr (call EventDataset 'localds://inner') 'Count'))))",
        );
        let info = extract_dataset_info(find_dataset(&query).unwrap()).unwrap();
        assert_eq!(info.urls, vec!["localds://outer"]);
    }

    #[test]
    fn accepts_list_of_urls() {
        let query = expr("(call EventDataset (list 'file:///a.root' \"file:///b.root\"))");
        let info = extract_dataset_info(find_dataset(&query).unwrap()).unwrap();
        assert_eq!(info.urls, vec!["file:///a.root", "file:///b.root"]);
        assert_eq!(info.tree_name, None);
    }

    #[test]
    fn query_without_dataset_has_none() {
        assert!(find_dataset(&expr("expr1")).is_none());
        assert!(find_dataset(&expr("(call Other 'x')")).is_none());
    }

    #[test]
    fn rejects_non_string_sources() {
        let query = expr("(call EventDataset 42)");
        assert_eq!(
            extract_dataset_info(&query),
            Err(DatasetError::InvalidSource {
                found: "42".to_string()
            })
        );
        assert_eq!(
            extract_dataset_info(&expr("(call EventDataset)")),
            Err(DatasetError::MissingSource)
        );
        assert_eq!(
            extract_dataset_info(&expr("(call EventDataset 'a' b)")),
            Err(DatasetError::InvalidTreeName {
                found: "b".to_string()
            })
        );
        assert_eq!(
            extract_dataset_info(&expr("x")),
            Err(DatasetError::NotADataset)
        );
    }
}
