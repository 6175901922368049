use bson::{Bson, Document};
use compass_query::{Filter, ID_FIELD};
use rand::RngCore;

use crate::error::StoreError;

const ID_BYTES: usize = 12;

/// A fresh random identity: 96 random bits as 24 lowercase hex characters.
pub fn generate_id() -> String {
    let mut bytes = [0u8; ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Canonical string form of an identity value, or `None` when the value
/// cannot serve as an identity.
pub fn normalize_id(value: &Bson) -> Option<String> {
    match value {
        Bson::String(s) if !s.is_empty() => Some(s.clone()),
        Bson::ObjectId(oid) => Some(oid.to_hex()),
        Bson::Int32(n) => Some(n.to_string()),
        Bson::Int64(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Give the document its identity before it is persisted.
///
/// A missing `_id` gets a generated one; a present one is rewritten in its
/// canonical string form. Returns the identity.
pub fn assign_id(doc: &mut Document) -> Result<String, StoreError> {
    let id = match doc.get(ID_FIELD) {
        None => generate_id(),
        Some(value) => normalize_id(value)
            .ok_or_else(|| StoreError::InvalidIdentity(format!("{value}")))?,
    };
    doc.insert(ID_FIELD, id.clone());
    Ok(id)
}

/// Rewrite every identity condition in canonical form.
///
/// A condition on a malformed identity cannot match any stored document, so
/// it collapses to match-nothing (or match-all for `Ne`).
pub fn canonicalize_filter(filter: Filter) -> Filter {
    match filter {
        Filter::And(children) => {
            Filter::And(children.into_iter().map(canonicalize_filter).collect())
        }
        Filter::Or(children) => {
            Filter::Or(children.into_iter().map(canonicalize_filter).collect())
        }
        Filter::Eq(field, value) if field == ID_FIELD => match normalize_id(&value) {
            Some(id) => Filter::Eq(field, Bson::String(id)),
            None => {
                tracing::debug!(identity = %value, "malformed identity, treating as not found");
                Filter::none()
            }
        },
        Filter::Ne(field, value) if field == ID_FIELD => match normalize_id(&value) {
            Some(id) => Filter::Ne(field, Bson::String(id)),
            None => Filter::all(),
        },
        Filter::Gt(field, value) if field == ID_FIELD => match normalize_id(&value) {
            Some(id) => Filter::Gt(field, Bson::String(id)),
            None => Filter::none(),
        },
        Filter::In(field, values) if field == ID_FIELD => {
            let ids = values
                .iter()
                .filter_map(normalize_id)
                .map(Bson::String)
                .collect();
            Filter::In(field, ids)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use bson::oid::ObjectId;

    #[test]
    fn generated_ids_are_24_hex_chars_and_distinct() {
        let a = generate_id();
        let b = generate_id();
        assert_eq!(a.len(), 24);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn assign_keeps_and_normalizes_existing_ids() {
        let oid = ObjectId::new();
        let mut doc = doc! { "_id": oid, "name": "x" };
        let id = assign_id(&mut doc).unwrap();
        assert_eq!(id, oid.to_hex());
        assert_eq!(doc.get_str("_id").unwrap(), oid.to_hex());

        let mut doc = doc! { "_id": 42_i32 };
        assert_eq!(assign_id(&mut doc).unwrap(), "42");
    }

    #[test]
    fn assign_generates_missing_id() {
        let mut doc = doc! { "email": "x@y.com" };
        let id = assign_id(&mut doc).unwrap();
        assert_eq!(doc.get_str("_id").unwrap(), id);
    }

    #[test]
    fn assign_rejects_structured_id() {
        let mut doc = doc! { "_id": { "nested": true } };
        assert!(matches!(assign_id(&mut doc), Err(StoreError::InvalidIdentity(_))));
    }

    #[test]
    fn malformed_identity_lookup_matches_nothing() {
        let filter = canonicalize_filter(Filter::eq("_id", Bson::Null));
        assert_eq!(filter, Filter::none());
    }

    #[test]
    fn object_id_lookup_becomes_string() {
        let oid = ObjectId::new();
        let filter = canonicalize_filter(Filter::eq("_id", oid).and(Filter::eq("role", "student")));
        assert_eq!(
            filter,
            Filter::And(vec![
                Filter::eq("_id", oid.to_hex()),
                Filter::eq("role", "student"),
            ])
        );
    }
}
