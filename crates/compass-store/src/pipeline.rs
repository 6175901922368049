//! In-process result shaping for backends that evaluate filters themselves.

use std::collections::{HashMap, HashSet};

use bson::{Bson, Document};
use compass_query::{ID_FIELD, Query, Sort, SortDirection};

use crate::eval::{compare_field_values, get_path};

/// Apply the query's sort, limit and projection to an already-filtered set.
pub(crate) fn shape(mut docs: Vec<Document>, query: &Query) -> Vec<Document> {
    if let Some(sort) = &query.sort {
        sort_documents(&mut docs, sort);
    }
    if let Some(limit) = query.effective_limit() {
        docs.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    }
    if let Some(columns) = &query.projection {
        for doc in &mut docs {
            apply_projection(doc, columns);
        }
    }
    docs
}

/// Stable sort on a single field.
pub(crate) fn sort_documents(docs: &mut [Document], sort: &Sort) {
    docs.sort_by(|a, b| {
        let ord = compare_field_values(get_path(a, &sort.field), get_path(b, &sort.field));
        match sort.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    });
}

/// Keep only the listed fields (dotted paths allowed) plus `_id`.
pub(crate) fn apply_projection(doc: &mut Document, columns: &[String]) {
    let mut flat_keys: HashSet<&str> = HashSet::new();
    // top-level key → remaining sub-paths
    let mut nested: HashMap<&str, Vec<String>> = HashMap::new();

    for col in columns {
        match col.split_once('.') {
            Some((top, rest)) => nested.entry(top).or_default().push(rest.to_string()),
            None => {
                flat_keys.insert(col.as_str());
            }
        }
    }

    let keys_to_remove: Vec<String> = doc
        .keys()
        .filter(|k| {
            k.as_str() != ID_FIELD
                && !flat_keys.contains(k.as_str())
                && !nested.contains_key(k.as_str())
        })
        .cloned()
        .collect();
    for key in keys_to_remove {
        doc.remove(&key);
    }

    for (top, sub_paths) in &nested {
        if flat_keys.contains(top) {
            continue;
        }
        if let Some(Bson::Document(sub)) = doc.get_mut(*top) {
            apply_projection(sub, sub_paths);
            if !sub_paths.iter().any(|p| p == ID_FIELD) {
                sub.remove(ID_FIELD);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use compass_query::Filter;

    fn tasks() -> Vec<Document> {
        vec![
            doc! { "_id": "1", "title": "a", "created_at": "2024-01-02" },
            doc! { "_id": "2", "title": "b", "created_at": "2024-01-03" },
            doc! { "_id": "3", "title": "c" },
            doc! { "_id": "4", "title": "d", "created_at": "2024-01-01" },
        ]
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.get_str("_id").unwrap()).collect()
    }

    #[test]
    fn sort_desc_puts_missing_last() {
        let mut query = Query::new(Filter::all());
        query.sort = Some(Sort::new("created_at", SortDirection::Desc));
        assert_eq!(ids(&shape(tasks(), &query)), ["2", "1", "4", "3"]);
    }

    #[test]
    fn zero_limit_means_unlimited() {
        let mut query = Query::new(Filter::all());
        query.limit = Some(0);
        assert_eq!(shape(tasks(), &query).len(), 4);
        query.limit = Some(2);
        assert_eq!(ids(&shape(tasks(), &query)), ["1", "2"]);
    }

    #[test]
    fn projection_keeps_id_and_nested_paths() {
        let mut d = doc! {
            "_id": "x",
            "name": "A",
            "secret": 1,
            "profile": { "city": "Pune", "pin": 1 },
        };
        apply_projection(&mut d, &["name".into(), "profile.city".into()]);
        assert_eq!(d, doc! { "_id": "x", "name": "A", "profile": { "city": "Pune" } });
    }
}
