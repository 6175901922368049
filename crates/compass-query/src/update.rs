use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};

use crate::ID_FIELD;

/// A single field-level update operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOp {
    /// Set a field to a value. Creates the field if it doesn't exist.
    Set(Bson),
    /// Add a number to a numeric field. A missing field counts as zero.
    Inc(Bson),
    /// Append one value to an array field. Creates the array if missing.
    Push(Bson),
    /// Append each value not already present in an array field.
    AddToSet(Vec<Bson>),
}

impl UpdateOp {
    /// Application order: set, then inc, then push, then add-to-set.
    fn rank(&self) -> u8 {
        match self {
            UpdateOp::Set(_) => 0,
            UpdateOp::Inc(_) => 1,
            UpdateOp::Push(_) => 2,
            UpdateOp::AddToSet(_) => 3,
        }
    }
}

/// A single field + operator pair within an [`Update`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub field: String,
    pub op: UpdateOp,
}

/// A complete update specification.
///
/// `ops` is kept in application order; use [`Update::push_op`] or the
/// builders rather than pushing onto it directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub ops: Vec<FieldUpdate>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.with(field, UpdateOp::Set(value.into()))
    }

    pub fn inc(self, field: impl Into<String>, amount: impl Into<Bson>) -> Self {
        self.with(field, UpdateOp::Inc(amount.into()))
    }

    pub fn push(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.with(field, UpdateOp::Push(value.into()))
    }

    pub fn add_to_set<V: Into<Bson>>(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.with(field, UpdateOp::AddToSet(values))
    }

    fn with(mut self, field: impl Into<String>, op: UpdateOp) -> Self {
        self.push_op(FieldUpdate {
            field: field.into(),
            op,
        });
        self
    }

    /// Insert an operation, keeping the fixed application order.
    pub fn push_op(&mut self, fu: FieldUpdate) {
        let rank = fu.op.rank();
        let pos = self
            .ops
            .iter()
            .position(|existing| existing.op.rank() > rank)
            .unwrap_or(self.ops.len());
        self.ops.insert(pos, fu);
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Render the update in the native document dialect.
    pub fn to_document(&self) -> Document {
        let mut set = Document::new();
        let mut inc = Document::new();
        let mut push = Document::new();
        let mut add_to_set = Document::new();

        for fu in &self.ops {
            match &fu.op {
                UpdateOp::Set(v) => {
                    set.insert(fu.field.clone(), v.clone());
                }
                UpdateOp::Inc(v) => {
                    inc.insert(fu.field.clone(), v.clone());
                }
                UpdateOp::Push(v) => {
                    push.insert(fu.field.clone(), v.clone());
                }
                UpdateOp::AddToSet(values) => {
                    add_to_set.insert(fu.field.clone(), doc! { "$each": values.clone() });
                }
            }
        }

        let mut out = Document::new();
        for (op, body) in [
            ("$set", set),
            ("$inc", inc),
            ("$push", push),
            ("$addToSet", add_to_set),
        ] {
            if !body.is_empty() {
                out.insert(op, body);
            }
        }
        out
    }
}

/// Parse error for update documents.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateParseError(pub String);

impl std::fmt::Display for UpdateParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "update parse error: {}", self.0)
    }
}

impl std::error::Error for UpdateParseError {}

/// Parse an update document into a validated [`Update`].
///
/// Recognizes `$set`, `$inc`, `$push` and `$addToSet` whose values are
/// sub-documents mapping field paths to operands. `$addToSet` operands are
/// either a bare value or `{ "$each": [...] }`. Bare top-level fields are an
/// implicit `$set`; `_id` is skipped at the top level.
///
/// # Errors
///
/// Unknown operator keys, operators targeting `_id`, non-numeric `$inc`
/// operands and empty update documents are rejected.
pub fn parse_update(doc: &Document) -> Result<Update, UpdateParseError> {
    let mut update = Update::new();

    for (key, value) in doc {
        if key == ID_FIELD {
            continue;
        }

        match key.as_str() {
            "$set" => parse_operator_fields(value, "$set", &mut update, |v| {
                Ok(UpdateOp::Set(v.clone()))
            })?,
            "$inc" => parse_operator_fields(value, "$inc", &mut update, parse_inc_operand)?,
            "$push" => parse_operator_fields(value, "$push", &mut update, |v| {
                Ok(UpdateOp::Push(v.clone()))
            })?,
            "$addToSet" => {
                parse_operator_fields(value, "$addToSet", &mut update, parse_add_to_set_operand)?
            }
            k if k.starts_with('$') => {
                return Err(UpdateParseError(format!("unknown operator: {k}")));
            }
            _ => update.push_op(FieldUpdate {
                field: key.clone(),
                op: UpdateOp::Set(value.clone()),
            }),
        }
    }

    if update.is_empty() {
        return Err(UpdateParseError("empty update document".into()));
    }

    for fu in &update.ops {
        let target = fu.field.split('.').next().unwrap_or(&fu.field);
        if target == ID_FIELD {
            return Err(UpdateParseError("cannot update _id field".into()));
        }
        if fu.field.is_empty() {
            return Err(UpdateParseError("empty field name".into()));
        }
    }

    Ok(update)
}

fn parse_operator_fields(
    value: &Bson,
    op_name: &str,
    update: &mut Update,
    make_op: impl Fn(&Bson) -> Result<UpdateOp, UpdateParseError>,
) -> Result<(), UpdateParseError> {
    let sub_doc = match value {
        Bson::Document(d) => d,
        _ => return Err(UpdateParseError(format!("{op_name} value must be a document"))),
    };
    for (field, operand) in sub_doc {
        update.push_op(FieldUpdate {
            field: field.clone(),
            op: make_op(operand)?,
        });
    }
    Ok(())
}

fn parse_inc_operand(value: &Bson) -> Result<UpdateOp, UpdateParseError> {
    match value {
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => Ok(UpdateOp::Inc(value.clone())),
        _ => Err(UpdateParseError("$inc value must be numeric".into())),
    }
}

fn parse_add_to_set_operand(value: &Bson) -> Result<UpdateOp, UpdateParseError> {
    if let Bson::Document(d) = value {
        if let Some(each) = d.get("$each") {
            return match each {
                Bson::Array(values) if d.len() == 1 => Ok(UpdateOp::AddToSet(values.clone())),
                Bson::Array(_) => Err(UpdateParseError(
                    "$each cannot be combined with other modifiers".into(),
                )),
                _ => Err(UpdateParseError("$each value must be an array".into())),
            };
        }
    }
    Ok(UpdateOp::AddToSet(vec![value.clone()]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operators_are_ordered_for_application() {
        let update = parse_update(&doc! {
            "$addToSet": { "tags": "a" },
            "$push": { "log": "x" },
            "$inc": { "n": 1 },
            "$set": { "status": "done" },
        })
        .unwrap();
        let fields: Vec<&str> = update.ops.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(fields, ["status", "n", "log", "tags"]);
    }

    #[test]
    fn bare_fields_are_implicit_set() {
        let update = parse_update(&doc! { "_id": "skip-me", "name": "Asha" }).unwrap();
        assert_eq!(update, Update::new().set("name", "Asha"));
    }

    #[test]
    fn add_to_set_each_and_bare() {
        let update = parse_update(&doc! {
            "$addToSet": { "tags": { "$each": ["a", "b"] }, "courses": "c-1" }
        })
        .unwrap();
        assert_eq!(
            update.ops,
            vec![
                FieldUpdate {
                    field: "tags".into(),
                    op: UpdateOp::AddToSet(vec![Bson::from("a"), Bson::from("b")]),
                },
                FieldUpdate {
                    field: "courses".into(),
                    op: UpdateOp::AddToSet(vec![Bson::from("c-1")]),
                },
            ]
        );
    }

    #[test]
    fn unknown_operator_errors() {
        let err = parse_update(&doc! { "$unset": { "a": "" } }).unwrap_err();
        assert!(err.0.contains("unknown operator: $unset"), "{}", err.0);
    }

    #[test]
    fn inc_requires_number() {
        let err = parse_update(&doc! { "$inc": { "n": "1" } }).unwrap_err();
        assert!(err.0.contains("numeric"), "{}", err.0);
    }

    #[test]
    fn id_target_rejected() {
        let err = parse_update(&doc! { "$set": { "_id": "other" } }).unwrap_err();
        assert!(err.0.contains("_id"), "{}", err.0);
    }

    #[test]
    fn empty_update_rejected() {
        assert!(parse_update(&doc! {}).is_err());
    }

    #[test]
    fn native_rendering_groups_by_operator() {
        let update = Update::new()
            .inc("login_count", 1)
            .set("last_login", "2024-01-01T00:00:00Z")
            .add_to_set("courses", ["c1"]);
        assert_eq!(
            update.to_document(),
            doc! {
                "$set": { "last_login": "2024-01-01T00:00:00Z" },
                "$inc": { "login_count": 1 },
                "$addToSet": { "courses": { "$each": ["c1"] } },
            }
        );
    }
}
