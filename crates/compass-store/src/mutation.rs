use bson::{Bson, Document};
use compass_query::{ID_FIELD, Update, UpdateOp};

use crate::encoding::text_form;
use crate::error::StoreError;
use crate::eval::value_eq;

/// Field stamped with the modification time whenever an emulated update
/// changes a document.
pub const UPDATED_AT_FIELD: &str = "updated_at";

/// Apply every operator of `update` to `doc` in order.
///
/// Returns whether anything changed. On error the document may be partially
/// updated; callers only persist on success. Updates touching `_id` are
/// refused before anything is applied.
pub(crate) fn apply(doc: &mut Document, update: &Update) -> Result<bool, StoreError> {
    refuse_identity(update)?;
    let mut changed = false;
    for fu in &update.ops {
        let Some((parent, leaf)) = resolve_parent_mut(doc, &fu.field, true)? else {
            continue;
        };
        changed |= match &fu.op {
            UpdateOp::Set(value) => op_set(parent, leaf, value),
            UpdateOp::Inc(amount) => op_inc(parent, leaf, amount)?,
            UpdateOp::Push(value) => op_push(parent, leaf, value)?,
            UpdateOp::AddToSet(values) => op_add_to_set(parent, leaf, values),
        };
    }
    Ok(changed)
}

/// Reject updates whose target path starts at `_id`.
pub(crate) fn refuse_identity(update: &Update) -> Result<(), StoreError> {
    match update
        .ops
        .iter()
        .find(|fu| fu.field.split('.').next() == Some(ID_FIELD))
    {
        Some(fu) => Err(StoreError::Mutation(format!(
            "field '{}': the identity cannot be updated",
            fu.field
        ))),
        None => Ok(()),
    }
}

/// Apply the update and, when something changed, stamp [`UPDATED_AT_FIELD`].
pub(crate) fn apply_and_stamp(doc: &mut Document, update: &Update) -> Result<bool, StoreError> {
    let changed = apply(doc, update)?;
    if changed {
        doc.insert(UPDATED_AT_FIELD, text_form(&Bson::DateTime(bson::DateTime::now())));
    }
    Ok(changed)
}

/// Resolve a dot-path to its parent document and leaf field name.
///
/// For `"address.city"`, walks into `doc["address"]` and returns
/// `(&mut sub_doc, "city")`. With `create`, missing intermediate documents
/// are created; otherwise a missing intermediate yields `None`.
pub(crate) fn resolve_parent_mut<'a>(
    doc: &'a mut Document,
    path: &'a str,
    create: bool,
) -> Result<Option<(&'a mut Document, &'a str)>, StoreError> {
    let (intermediates, leaf) = match path.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, path),
    };
    if leaf.is_empty() {
        return Err(StoreError::InvalidField(path.to_string()));
    }

    let mut current = doc;
    for segment in intermediates.into_iter().flat_map(|p| p.split('.')) {
        if segment.is_empty() {
            return Err(StoreError::InvalidField(path.to_string()));
        }
        if !current.contains_key(segment) {
            if !create {
                return Ok(None);
            }
            current.insert(segment, Document::new());
        }
        current = match current.get_mut(segment) {
            Some(Bson::Document(sub)) => sub,
            Some(_) => {
                return Err(StoreError::Mutation(format!(
                    "field path '{path}': intermediate '{segment}' is not a document"
                )));
            }
            None => return Ok(None),
        };
    }
    Ok(Some((current, leaf)))
}

/// `$set`: set field to value, creating it if missing.
fn op_set(doc: &mut Document, field: &str, value: &Bson) -> bool {
    if doc.get(field) == Some(value) {
        return false;
    }
    doc.insert(field, value.clone());
    true
}

/// `$inc`: add to a numeric field; a missing field counts as zero.
///
/// Type promotion rules:
/// - i32 + i32 → i32 (i64 on overflow)
/// - i32 + i64 → i64 (an error on overflow)
/// - anything + f64 → f64
fn op_inc(doc: &mut Document, field: &str, amount: &Bson) -> Result<bool, StoreError> {
    let Some(current) = doc.get(field) else {
        doc.insert(field, amount.clone());
        return Ok(true);
    };

    let overflow = || StoreError::Mutation(format!("$inc: field '{field}' overflows"));
    let result = match (current, amount) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(i64::from(*a) + i64::from(*b)),
        },
        (Bson::Int32(a), Bson::Int64(b)) => {
            Bson::Int64(i64::from(*a).checked_add(*b).ok_or_else(overflow)?)
        }
        (Bson::Int64(a), Bson::Int32(b)) => {
            Bson::Int64(a.checked_add(i64::from(*b)).ok_or_else(overflow)?)
        }
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.checked_add(*b).ok_or_else(overflow)?),
        (Bson::Double(a), Bson::Double(b)) => Bson::Double(a + b),
        (Bson::Int32(a), Bson::Double(b)) => Bson::Double(f64::from(*a) + b),
        (Bson::Int64(a), Bson::Double(b)) => Bson::Double(*a as f64 + b),
        (Bson::Double(a), Bson::Int32(b)) => Bson::Double(a + f64::from(*b)),
        (Bson::Double(a), Bson::Int64(b)) => Bson::Double(a + *b as f64),
        _ => {
            return Err(StoreError::Mutation(format!(
                "$inc: field '{field}' is not numeric"
            )));
        }
    };

    if &result == current {
        return Ok(false);
    }
    doc.insert(field, result);
    Ok(true)
}

/// `$push`: append to an array field, creating it if missing.
fn op_push(doc: &mut Document, field: &str, value: &Bson) -> Result<bool, StoreError> {
    match doc.get_mut(field) {
        Some(Bson::Array(arr)) => {
            arr.push(value.clone());
            Ok(true)
        }
        Some(_) => Err(StoreError::Mutation(format!(
            "$push: field '{field}' is not an array"
        ))),
        None => {
            doc.insert(field, vec![value.clone()]);
            Ok(true)
        }
    }
}

/// `$addToSet`: append each value not already present.
///
/// A missing or non-array field starts over as an empty array. Existing
/// elements, duplicates included, are left as they are.
fn op_add_to_set(doc: &mut Document, field: &str, values: &[Bson]) -> bool {
    let mut changed = false;
    if !matches!(doc.get(field), Some(Bson::Array(_))) {
        doc.insert(field, Bson::Array(Vec::new()));
        changed = true;
    }
    let Some(Bson::Array(arr)) = doc.get_mut(field) else {
        return changed;
    };
    for value in values {
        if !arr.iter().any(|existing| value_eq(existing, value)) {
            arr.push(value.clone());
            changed = true;
        }
    }
    changed
}
