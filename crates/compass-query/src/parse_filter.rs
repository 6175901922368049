use bson::{Bson, Document};

use crate::filter::Filter;

/// Parse error for filter documents.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterParseError(pub String);

impl std::fmt::Display for FilterParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "filter parse error: {}", self.0)
    }
}

impl std::error::Error for FilterParseError {}

/// Parse a filter document into a [`Filter`] tree.
///
/// Follows the document query dialect:
/// - Top-level document is an implicit AND of all entries
/// - `{ "field": value }` is implicit `$eq`
/// - `{ "field": { "$gt": v } }` uses operator sub-documents (`$eq`, `$ne`, `$in`, `$gt`)
/// - `{ "$or": [...] }` for disjunction
/// - An empty document matches everything
///
/// Unknown operators are rejected rather than ignored.
pub fn parse_filter(doc: &Document) -> Result<Filter, FilterParseError> {
    let mut children = Vec::new();

    for (key, value) in doc {
        match key.as_str() {
            "$or" => children.push(parse_or(value)?),
            k if k.starts_with('$') => {
                return Err(FilterParseError(format!("unknown top-level operator: {k}")));
            }
            _ => children.push(parse_field_condition(key, value)?),
        }
    }

    Ok(collapse(children))
}

fn collapse(mut children: Vec<Filter>) -> Filter {
    if children.len() == 1 {
        children.remove(0)
    } else {
        Filter::And(children)
    }
}

fn parse_or(value: &Bson) -> Result<Filter, FilterParseError> {
    let arr = match value {
        Bson::Array(a) => a,
        _ => return Err(FilterParseError("$or value must be an array".into())),
    };

    let mut children = Vec::with_capacity(arr.len());
    for elem in arr {
        match elem {
            Bson::Document(sub_doc) => children.push(parse_filter(sub_doc)?),
            _ => {
                return Err(FilterParseError(
                    "$or array elements must be documents".into(),
                ));
            }
        }
    }

    if children.is_empty() {
        return Err(FilterParseError("$or array must not be empty".into()));
    }

    Ok(Filter::Or(children))
}

/// Parse a field condition: either implicit $eq or an operator sub-document.
fn parse_field_condition(field: &str, value: &Bson) -> Result<Filter, FilterParseError> {
    if field.is_empty() {
        return Err(FilterParseError("empty field name".into()));
    }

    // A sub-document whose first key starts with $ is an operator doc
    if let Bson::Document(sub_doc) = value {
        if let Some(first_key) = sub_doc.keys().next() {
            if first_key.starts_with('$') {
                return parse_operator_doc(field, sub_doc);
            }
        }
    }

    Ok(Filter::Eq(field.to_string(), value.clone()))
}

/// Parse an operator sub-document like `{ "$gt": 21, "$ne": 30 }`.
fn parse_operator_doc(field: &str, doc: &Document) -> Result<Filter, FilterParseError> {
    let mut conditions = Vec::new();

    for (op_key, op_value) in doc {
        let condition = match op_key.as_str() {
            "$eq" => Filter::Eq(field.to_string(), op_value.clone()),
            "$ne" => Filter::Ne(field.to_string(), op_value.clone()),
            "$gt" => Filter::Gt(field.to_string(), op_value.clone()),
            "$in" => match op_value {
                Bson::Array(values) => Filter::In(field.to_string(), values.clone()),
                _ => return Err(FilterParseError("$in value must be an array".into())),
            },
            k => return Err(FilterParseError(format!("unknown field operator: {k}"))),
        };
        conditions.push(condition);
    }

    Ok(collapse(conditions))
}
