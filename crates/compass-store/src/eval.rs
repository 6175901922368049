use std::cmp::Ordering;

use bson::{Bson, Document};
use compass_query::Filter;

use crate::encoding::text_form;

/// Look up a dotted path, descending through embedded documents only.
pub(crate) fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        match current {
            Bson::Document(sub) => current = sub.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}

/// Evaluate whether a document matches the given filter.
pub(crate) fn matches(doc: &Document, filter: &Filter) -> bool {
    match filter {
        Filter::And(children) => children.iter().all(|c| matches(doc, c)),
        Filter::Or(children) => children.iter().any(|c| matches(doc, c)),
        Filter::Eq(field, val) => field_eq(get_path(doc, field), val),
        Filter::Ne(field, val) => !field_eq(get_path(doc, field), val),
        Filter::In(field, vals) => {
            let stored = get_path(doc, field);
            vals.iter().any(|v| field_eq(stored, v))
        }
        Filter::Gt(field, val) => match get_path(doc, field) {
            Some(Bson::Array(items)) => items
                .iter()
                .any(|item| value_cmp(item, val) == Some(Ordering::Greater)),
            Some(stored) => value_cmp(stored, val) == Some(Ordering::Greater),
            None => false,
        },
    }
}

fn field_eq(stored: Option<&Bson>, query: &Bson) -> bool {
    // null matches both missing fields and explicit null values
    if matches!(query, Bson::Null) {
        return matches!(stored, None | Some(Bson::Null));
    }
    match stored {
        Some(Bson::Array(items)) if !matches!(query, Bson::Array(_)) => {
            items.iter().any(|item| value_eq(item, query))
        }
        Some(v) => value_eq(v, query),
        None => false,
    }
}

/// Equality: stored value vs query value.
pub(crate) fn value_eq(stored: &Bson, query: &Bson) -> bool {
    match (stored, query) {
        (Bson::String(a), Bson::String(b)) => a == b,
        (Bson::Boolean(a), Bson::Boolean(b)) => a == b,
        (Bson::Null, Bson::Null) => true,
        (Bson::DateTime(a), Bson::DateTime(b)) => a.timestamp_millis() == b.timestamp_millis(),
        (Bson::ObjectId(a), Bson::ObjectId(b)) => a == b,

        // Identity and date strings compare against their stored text.
        (Bson::String(a), Bson::ObjectId(_) | Bson::DateTime(_)) => *a == text_form(query),
        (Bson::ObjectId(_) | Bson::DateTime(_), Bson::String(b)) => text_form(stored) == *b,

        (Bson::Array(a), Bson::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| value_eq(x, y))
        }
        (Bson::Document(a), Bson::Document(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b)
                    .all(|((ka, va), (kb, vb))| ka == kb && value_eq(va, vb))
        }
        _ => match (as_number(stored), as_number(query)) {
            (Some(Number::Int(a)), Some(Number::Int(b))) => a == b,
            (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
            _ => false,
        },
    }
}

/// Ordering between a stored value and a query value of a comparable kind.
/// `None` when the kinds don't compare.
fn value_cmp(stored: &Bson, query: &Bson) -> Option<Ordering> {
    match (stored, query) {
        (Bson::String(a), Bson::String(b)) => Some(a.as_str().cmp(b.as_str())),
        (Bson::DateTime(a), Bson::DateTime(b)) => {
            Some(a.timestamp_millis().cmp(&b.timestamp_millis()))
        }
        (Bson::String(a), Bson::DateTime(_)) => Some(a.as_str().cmp(text_form(query).as_str())),
        _ => match (as_number(stored), as_number(query)) {
            (Some(Number::Int(a)), Some(Number::Int(b))) => Some(a.cmp(&b)),
            (Some(a), Some(b)) => a.as_f64().partial_cmp(&b.as_f64()),
            _ => None,
        },
    }
}

#[derive(Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(f) => f,
        }
    }
}

fn as_number(value: &Bson) -> Option<Number> {
    match value {
        Bson::Int32(n) => Some(Number::Int(i64::from(*n))),
        Bson::Int64(n) => Some(Number::Int(*n)),
        Bson::Double(f) => Some(Number::Float(*f)),
        _ => None,
    }
}

/// Position of a value's kind in the cross-kind sort order: null, numbers,
/// strings, documents, arrays, binary, object ids, booleans, dates.
fn kind_rank(value: &Bson) -> u8 {
    match value {
        Bson::Null | Bson::Undefined => 0,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 1,
        Bson::String(_) | Bson::Symbol(_) => 2,
        Bson::Document(_) => 3,
        Bson::Array(_) => 4,
        Bson::Binary(_) => 5,
        Bson::ObjectId(_) => 6,
        Bson::Boolean(_) => 7,
        Bson::DateTime(_) => 8,
        Bson::Timestamp(_) => 9,
        Bson::RegularExpression(_) => 10,
        _ => 11,
    }
}

/// Sort order for field values: missing and null first, then by kind rank,
/// then by value within a kind. Values of a kind without an ordering compare
/// equal, so the stable sort keeps their insertion order.
pub(crate) fn compare_field_values(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    let (a, b) = match (a, b) {
        (None, None) => return Ordering::Equal,
        (None, Some(b)) => return 0.cmp(&kind_rank(b)),
        (Some(a), None) => return kind_rank(a).cmp(&0),
        (Some(a), Some(b)) => (a, b),
    };
    kind_rank(a)
        .cmp(&kind_rank(b))
        .then_with(|| same_kind_cmp(a, b))
}

fn same_kind_cmp(a: &Bson, b: &Bson) -> Ordering {
    match (a, b) {
        (Bson::String(a), Bson::String(b)) => a.cmp(b),
        (Bson::Boolean(a), Bson::Boolean(b)) => a.cmp(b),
        (Bson::DateTime(a), Bson::DateTime(b)) => a.timestamp_millis().cmp(&b.timestamp_millis()),
        (Bson::ObjectId(a), Bson::ObjectId(b)) => a.bytes().cmp(&b.bytes()),
        _ => match (as_number(a), as_number(b)) {
            (Some(Number::Int(a)), Some(Number::Int(b))) => a.cmp(&b),
            (Some(a), Some(b)) => a.as_f64().total_cmp(&b.as_f64()),
            _ => Ordering::Equal,
        },
    }
}
