use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};

/// A predicate over document fields.
///
/// Field names may be dotted paths into nested documents. `And(vec![])`
/// matches every document, `Or(vec![])` matches none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Eq(String, Bson),
    Ne(String, Bson),
    In(String, Vec<Bson>),
    Gt(String, Bson),
}

impl Default for Filter {
    fn default() -> Self {
        Filter::all()
    }
}

impl Filter {
    pub fn all() -> Self {
        Filter::And(Vec::new())
    }

    pub fn none() -> Self {
        Filter::Or(Vec::new())
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Filter::Ne(field.into(), value.into())
    }

    pub fn one_of<V: Into<Bson>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Filter::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Filter::Gt(field.into(), value.into())
    }

    /// True when the filter places no constraint at all.
    pub fn is_all(&self) -> bool {
        match self {
            Filter::And(children) => children.iter().all(Filter::is_all),
            _ => false,
        }
    }

    /// Combine with another filter under AND, flattening nested conjunctions.
    pub fn and(self, other: Filter) -> Filter {
        let mut children = match self {
            Filter::And(children) => children,
            f => vec![f],
        };
        match other {
            Filter::And(more) => children.extend(more),
            f => children.push(f),
        }
        Filter::And(children)
    }

    /// Render the filter in the native document dialect.
    pub fn to_document(&self) -> Document {
        match self {
            Filter::And(children) => {
                let parts: Vec<Document> = children.iter().map(Filter::to_document).collect();
                let mut merged = Document::new();
                let mut collides = false;
                for part in &parts {
                    for (key, value) in part {
                        collides |= merged.insert(key.clone(), value.clone()).is_some();
                    }
                }
                if collides {
                    let parts: Vec<Bson> = parts.into_iter().map(Bson::Document).collect();
                    return doc! { "$and": parts };
                }
                merged
            }
            // `$or` must be non-empty natively; an empty membership test never matches.
            Filter::Or(children) if children.is_empty() => {
                doc! { "_id": { "$in": [] } }
            }
            Filter::Or(children) => {
                let parts: Vec<Bson> = children
                    .iter()
                    .map(|c| Bson::Document(c.to_document()))
                    .collect();
                doc! { "$or": parts }
            }
            Filter::Eq(field, value) => operator_doc(field, "$eq", value.clone()),
            Filter::Ne(field, value) => operator_doc(field, "$ne", value.clone()),
            Filter::In(field, values) => operator_doc(field, "$in", Bson::Array(values.clone())),
            Filter::Gt(field, value) => operator_doc(field, "$gt", value.clone()),
        }
    }
}

fn operator_doc(field: &str, op: &str, value: Bson) -> Document {
    let mut inner = Document::new();
    inner.insert(op, value);
    let mut outer = Document::new();
    outer.insert(field, inner);
    outer
}
