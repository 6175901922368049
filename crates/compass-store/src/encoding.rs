//! Conversion between BSON documents and the JSON text stored in the
//! relational document column.
//!
//! Encoding is total: values JSON cannot represent are stored as their
//! string form. Decoding never reconstructs dates or object ids, they come
//! back as the strings they were stored as.

use bson::{Bson, Document};
use serde_json::{Map, Number, Value};

use crate::error::StoreError;

pub fn encode_document(doc: &Document) -> Value {
    let mut map = Map::with_capacity(doc.len());
    for (key, value) in doc {
        map.insert(key.clone(), encode_value(value));
    }
    Value::Object(map)
}

pub fn encode_value(value: &Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(n) => Value::from(*n),
        Bson::Int64(n) => Value::from(*n),
        Bson::Double(f) => Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(f.to_string())),
        Bson::String(s) => Value::String(s.clone()),
        Bson::Document(d) => encode_document(d),
        Bson::Array(items) => Value::Array(items.iter().map(encode_value).collect()),
        other => Value::String(text_form(other)),
    }
}

/// Serialize a document to the text stored in the `doc` column.
pub fn to_json_text(doc: &Document) -> Result<String, StoreError> {
    Ok(serde_json::to_string(&encode_document(doc))?)
}

pub fn decode_document(value: Value) -> Result<Document, StoreError> {
    match value {
        Value::Object(map) => Ok(decode_map(map)),
        other => Err(StoreError::Serialization(format!(
            "stored document is not an object: {other}"
        ))),
    }
}

/// Parse the `doc` column back into a document.
pub fn from_json_text(text: &str) -> Result<Document, StoreError> {
    decode_document(serde_json::from_str(text)?)
}

fn decode_map(map: Map<String, Value>) -> Document {
    let mut doc = Document::new();
    for (key, value) in map {
        doc.insert(key, decode_value(value));
    }
    doc
}

pub fn decode_value(value: Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(b),
        Value::Number(n) => decode_number(&n),
        Value::String(s) => Bson::String(s),
        Value::Array(items) => Bson::Array(items.into_iter().map(decode_value).collect()),
        Value::Object(map) => Bson::Document(decode_map(map)),
    }
}

fn decode_number(n: &Number) -> Bson {
    if let Some(i) = n.as_i64() {
        return match i32::try_from(i) {
            Ok(small) => Bson::Int32(small),
            Err(_) => Bson::Int64(i),
        };
    }
    Bson::Double(n.as_f64().unwrap_or(f64::NAN))
}

/// The text a value compares as in the relational backend.
///
/// Mirrors what SQLite yields for a JSON text extraction: strings as-is,
/// booleans as `true`/`false`, numbers in JSON notation, structured values
/// as compact JSON. Dates and object ids use their stored string form.
pub fn text_form(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::Boolean(b) => b.to_string(),
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        Bson::Double(f) => match Number::from_f64(*f) {
            Some(n) => n.to_string(),
            None => f.to_string(),
        },
        Bson::DateTime(dt) => dt
            .try_to_rfc3339_string()
            .unwrap_or_else(|_| dt.timestamp_millis().to_string()),
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::Null | Bson::Undefined => String::new(),
        Bson::Document(_) | Bson::Array(_) => encode_value(value).to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use bson::oid::ObjectId;

    #[test]
    fn plain_documents_round_trip() {
        let original = doc! {
            "_id": "abc",
            "name": "Asha",
            "age": 21,
            "big": 9_000_000_000_i64,
            "gpa": 8.5,
            "active": true,
            "notes": Bson::Null,
            "address": { "city": "Pune", "pin": 411001 },
            "tags": ["a", 1, false],
        };
        let text = to_json_text(&original).unwrap();
        assert_eq!(from_json_text(&text).unwrap(), original);
    }

    #[test]
    fn encoding_is_deterministic() {
        let d = doc! { "b": 1, "a": { "y": 2, "x": 3 } };
        assert_eq!(to_json_text(&d).unwrap(), to_json_text(&d.clone()).unwrap());
        assert_eq!(to_json_text(&d).unwrap(), r#"{"b":1,"a":{"y":2,"x":3}}"#);
    }

    #[test]
    fn dates_and_object_ids_decode_as_strings() {
        let oid = ObjectId::new();
        let when = bson::DateTime::from_millis(1_704_067_200_000);
        let text = to_json_text(&doc! { "ref": oid, "at": when }).unwrap();
        let decoded = from_json_text(&text).unwrap();
        assert_eq!(decoded.get_str("ref").unwrap(), oid.to_hex());
        assert_eq!(decoded.get_str("at").unwrap(), "2024-01-01T00:00:00Z");
    }

    #[test]
    fn non_finite_doubles_fall_back_to_strings() {
        assert_eq!(encode_value(&Bson::Double(f64::NAN)), Value::String("NaN".into()));
        assert_eq!(encode_value(&Bson::Double(f64::INFINITY)), Value::String("inf".into()));
    }

    #[test]
    fn small_int64_narrows_on_decode() {
        assert_eq!(decode_value(encode_value(&Bson::Int64(7))), Bson::Int32(7));
    }

    #[test]
    fn text_forms_match_json_notation() {
        assert_eq!(text_form(&Bson::Double(5.0)), "5.0");
        assert_eq!(text_form(&Bson::Int32(5)), "5");
        assert_eq!(text_form(&Bson::Boolean(false)), "false");
        assert_eq!(text_form(&Bson::Array(vec![Bson::Int32(1), "x".into()])), r#"[1,"x"]"#);
    }

    #[test]
    fn top_level_must_be_object() {
        assert!(matches!(from_json_text("[1,2]"), Err(StoreError::Serialization(_))));
    }
}
