//! Filter → SQL over the `doc` JSON column.
//!
//! Every non-identity comparison is made against the field's text form:
//! strings as-is, booleans as `true`/`false`, numbers in JSON notation and
//! structured values as minified JSON. Greater-than against a number casts
//! to REAL instead, so numeric fields compare numerically.

use bson::Bson;
use compass_query::{Filter, ID_FIELD, Sort, SortDirection};
use rusqlite::types::Value;

use crate::encoding::text_form;
use crate::error::StoreError;

/// A SQL fragment with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Predicate {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Build the WHERE clause for a filter, or `None` when it matches everything.
pub(crate) fn where_clause(filter: &Filter) -> Result<Option<Predicate>, StoreError> {
    if filter.is_all() {
        return Ok(None);
    }
    let mut params = Vec::new();
    let sql = translate(filter, &mut params)?;
    Ok(Some(Predicate { sql, params }))
}

fn translate(filter: &Filter, params: &mut Vec<Value>) -> Result<String, StoreError> {
    match filter {
        Filter::And(children) => {
            let parts = children
                .iter()
                .filter(|c| !c.is_all())
                .map(|c| translate(c, params))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(match parts.len() {
                0 => "1".to_string(),
                1 => parts.into_iter().next().unwrap_or_default(),
                _ => format!("({})", parts.join(" AND ")),
            })
        }
        Filter::Or(children) if children.is_empty() => Ok("0".to_string()),
        Filter::Or(children) => {
            let parts = children
                .iter()
                .map(|c| translate(c, params).map(|sql| format!("({sql})")))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(format!("({})", parts.join(" OR ")))
        }
        Filter::Eq(field, Bson::Null) => Ok(format!("{} IS NULL", column(field)?)),
        Filter::Eq(field, value) => {
            params.push(Value::Text(text_form(value)));
            Ok(format!("{} = ?", column(field)?))
        }
        Filter::Ne(field, Bson::Null) => Ok(format!("{} IS NOT NULL", column(field)?)),
        Filter::Ne(field, value) => {
            // IS NOT is null-safe, so documents lacking the field match too.
            params.push(Value::Text(text_form(value)));
            Ok(format!("{} IS NOT ?", column(field)?))
        }
        Filter::In(_, values) if values.is_empty() => Ok("0".to_string()),
        Filter::In(field, values) => {
            let col = column(field)?;
            let (nulls, present): (Vec<&Bson>, Vec<&Bson>) =
                values.iter().partition(|v| matches!(v, Bson::Null));
            let mut parts = Vec::with_capacity(2);
            if !present.is_empty() {
                let placeholders = vec!["?"; present.len()].join(", ");
                params.extend(present.iter().map(|v| Value::Text(text_form(v))));
                parts.push(format!("{col} IN ({placeholders})"));
            }
            if !nulls.is_empty() {
                parts.push(format!("{col} IS NULL"));
            }
            Ok(match parts.len() {
                1 => parts.remove(0),
                _ => format!("({})", parts.join(" OR ")),
            })
        }
        Filter::Gt(field, value) => greater_than(field, value, params),
    }
}

fn greater_than(field: &str, value: &Bson, params: &mut Vec<Value>) -> Result<String, StoreError> {
    let numeric = match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(f) if f.is_finite() => Some(*f),
        _ => None,
    };

    if field == ID_FIELD {
        return Ok(match numeric {
            Some(n) => {
                params.push(Value::Real(n));
                "CAST(id AS REAL) > ?".to_string()
            }
            None => {
                params.push(Value::Text(text_form(value)));
                "id > ?".to_string()
            }
        });
    }

    let path = json_path(field)?;
    match (numeric, value) {
        (Some(n), _) => {
            params.push(Value::Real(n));
            Ok(format!(
                "(json_type(doc, {path}) IN ('integer', 'real') AND CAST({} AS REAL) > ?)",
                text_expr(&path)
            ))
        }
        (None, Bson::String(_) | Bson::DateTime(_) | Bson::ObjectId(_)) => {
            params.push(Value::Text(text_form(value)));
            Ok(format!(
                "(json_type(doc, {path}) = 'text' AND {} > ?)",
                text_expr(&path)
            ))
        }
        // Booleans, nulls and structured values have no ordering.
        _ => Ok("0".to_string()),
    }
}

/// The SQL expression a field compares through.
pub(crate) fn column(field: &str) -> Result<String, StoreError> {
    if field == ID_FIELD {
        return Ok("id".to_string());
    }
    Ok(text_expr(&json_path(field)?))
}

/// Text extraction of a JSON path, with JSON booleans kept as `true`/`false`.
pub(crate) fn text_expr(path: &str) -> String {
    format!(
        "CASE json_type(doc, {path}) \
         WHEN 'true' THEN 'true' WHEN 'false' THEN 'false' \
         ELSE CAST(json_extract(doc, {path}) AS TEXT) END"
    )
}

/// A dotted field name as a quoted SQL string literal holding a JSON path,
/// e.g. `profile.city` → `'$."profile"."city"'`.
pub(crate) fn json_path(field: &str) -> Result<String, StoreError> {
    let mut path = String::from("'$");
    for segment in field.split('.') {
        if segment.is_empty() || segment.contains('"') || segment.starts_with('$') {
            return Err(StoreError::InvalidField(field.to_string()));
        }
        path.push_str(".\"");
        path.push_str(&segment.replace('\'', "''"));
        path.push('"');
    }
    path.push('\'');
    Ok(path)
}

/// ORDER BY clause; rows with equal keys keep insertion order.
pub(crate) fn order_by(sort: Option<&Sort>) -> Result<String, StoreError> {
    let Some(sort) = sort else {
        return Ok(" ORDER BY rowid".to_string());
    };
    let direction = match sort.direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    };
    Ok(format!(" ORDER BY {} {direction}, rowid", column(&sort.field)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn empty_filter_has_no_where_clause() {
        assert_eq!(where_clause(&Filter::all()).unwrap(), None);
    }

    #[test]
    fn identity_maps_to_id_column() {
        let pred = where_clause(&Filter::eq("_id", "abc")).unwrap().unwrap();
        assert_eq!(pred.sql, "id = ?");
        assert_eq!(pred.params, vec![text("abc")]);
    }

    #[test]
    fn dotted_fields_become_json_paths() {
        assert_eq!(json_path("profile.city").unwrap(), r#"'$."profile"."city"'"#);
        assert_eq!(json_path("o'brien").unwrap(), r#"'$."o''brien"'"#);
        assert!(json_path("a..b").is_err());
        assert!(json_path(r#"a"b"#).is_err());
    }

    #[test]
    fn equality_compares_text_forms() {
        let pred = where_clause(&Filter::eq("active", true)).unwrap().unwrap();
        assert!(pred.sql.ends_with(" = ?"), "{}", pred.sql);
        assert!(pred.sql.contains(r#"json_type(doc, '$."active"')"#), "{}", pred.sql);
        assert_eq!(pred.params, vec![text("true")]);
    }

    #[test]
    fn conjunction_and_or_group() {
        let f = Filter::eq("a", 1)
            .and(Filter::Or(vec![Filter::eq("b", "x"), Filter::ne("c", "y")]));
        let pred = where_clause(&f).unwrap().unwrap();
        assert!(pred.sql.starts_with('('), "{}", pred.sql);
        assert!(pred.sql.contains(" AND (("), "{}", pred.sql);
        assert!(pred.sql.contains(") OR ("), "{}", pred.sql);
        assert_eq!(pred.params, vec![text("1"), text("x"), text("y")]);
    }

    #[test]
    fn membership_has_one_placeholder_per_value() {
        let pred = where_clause(&Filter::one_of("_id", ["a", "b", "c"])).unwrap().unwrap();
        assert_eq!(pred.sql, "id IN (?, ?, ?)");
        let empty = Filter::one_of("_id", Vec::<String>::new());
        assert_eq!(where_clause(&empty).unwrap().unwrap().sql, "0");
    }

    #[test]
    fn membership_with_null_also_matches_missing() {
        let pred = where_clause(&Filter::In("_id".into(), vec!["a".into(), Bson::Null]))
            .unwrap()
            .unwrap();
        assert_eq!(pred.sql, "(id IN (?) OR id IS NULL)");
    }

    #[test]
    fn greater_than_number_casts() {
        let pred = where_clause(&Filter::gt("score", 10)).unwrap().unwrap();
        assert!(pred.sql.contains("AS REAL) > ?"), "{}", pred.sql);
        assert_eq!(pred.params, vec![Value::Real(10.0)]);
    }

    #[test]
    fn greater_than_boolean_never_matches() {
        assert_eq!(where_clause(&Filter::gt("flag", true)).unwrap().unwrap().sql, "0");
    }

    #[test]
    fn null_equality_uses_is_null() {
        let pred = where_clause(&Filter::eq("mentor", Bson::Null)).unwrap().unwrap();
        assert!(pred.sql.ends_with(" IS NULL"), "{}", pred.sql);
        assert!(pred.params.is_empty());
    }

    #[test]
    fn order_by_breaks_ties_by_rowid() {
        assert_eq!(order_by(None).unwrap(), " ORDER BY rowid");
        let sort = Sort::new("_id", SortDirection::Desc);
        assert_eq!(order_by(Some(&sort)).unwrap(), " ORDER BY id DESC, rowid");
    }
}
