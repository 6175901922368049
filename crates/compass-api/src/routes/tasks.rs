use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use bson::{Bson, Document, doc};
use chrono::{SecondsFormat, Utc};
use compass_store::encoding::encode_value;
use compass_store::{Filter, ID_FIELD, SortDirection, Update};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::state::{AppState, TASKS};

pub const STATUSES: [&str; 3] = ["pending", "in-progress", "completed"];
const COMPLETED: &str = "completed";

#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub student_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub subject: String,
    pub title: String,
    pub description: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
}

fn default_difficulty() -> String {
    "medium".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskListParams {
    pub student_id: String,
    pub status: Option<String>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusChange {
    pub status: String,
}

/// Fixed-width UTC timestamp, so stored values sort as text.
fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Render a stored task with its identity under `id`.
fn task_json(doc: &Document) -> Value {
    let mut out = Map::new();
    if let Some(id) = doc.get(ID_FIELD) {
        out.insert("id".into(), encode_value(id));
    }
    for (key, value) in doc {
        if key != ID_FIELD {
            out.insert(key.clone(), encode_value(value));
        }
    }
    Value::Object(out)
}

pub async fn create(
    State(state): State<AppState>,
    Json(task): Json<NewTask>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if task.student_id.trim().is_empty() {
        return Err(ApiError::BadRequest("student_id is required".into()));
    }
    let tasks = state.require(TASKS).await?;

    let mut doc = doc! {
        "student_id": task.student_id,
        "type": task.kind,
        "subject": task.subject,
        "title": task.title,
        "description": task.description,
        "difficulty": task.difficulty,
        "status": "pending",
        "ai_assistance_used": false,
        "conversation_history": Vec::<Bson>::new(),
        "feedback": Bson::Null,
        "completed_at": Bson::Null,
        "created_at": timestamp(),
    };
    let inserted = tasks.insert_one(doc.clone()).await?;
    doc.insert(ID_FIELD, inserted.inserted_id);

    Ok((StatusCode::CREATED, Json(task_json(&doc))))
}

/// A student's tasks, newest first.
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<TaskListParams>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let tasks = state.require(TASKS).await?;

    let mut filter = Filter::eq("student_id", params.student_id);
    if let Some(status) = params.status {
        filter = filter.and(Filter::eq("status", status));
    }
    let mut cursor = tasks.find(filter)?.sort("created_at", SortDirection::Desc);
    if let Some(limit) = params.limit {
        cursor = cursor.limit(limit);
    }

    let docs = cursor.to_vec().await?;
    Ok(Json(docs.iter().map(task_json).collect()))
}

pub async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(change): Json<StatusChange>,
) -> Result<Json<Value>, ApiError> {
    if !STATUSES.contains(&change.status.as_str()) {
        return Err(ApiError::BadRequest(format!(
            "status must be one of {}",
            STATUSES.join(", ")
        )));
    }
    let tasks = state.require(TASKS).await?;

    let completed_at = if change.status == COMPLETED {
        Bson::String(timestamp())
    } else {
        Bson::Null
    };
    let update = Update::new()
        .set("status", change.status)
        .set("completed_at", completed_at);

    let by_id = Filter::eq(ID_FIELD, id.as_str());
    let result = tasks.update_one(by_id.clone(), update).await?;
    if result.matched_count == 0 {
        return Err(ApiError::not_found("task", &id));
    }

    let task = tasks
        .find_one(by_id)
        .await?
        .ok_or_else(|| ApiError::not_found("task", &id))?;
    Ok(Json(task_json(&task)))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let tasks = state.require(TASKS).await?;
    let result = tasks.delete_one(Filter::eq(ID_FIELD, id.as_str())).await?;
    if result.deleted_count == 0 {
        return Err(ApiError::not_found("task", &id));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_json_leads_with_id() {
        let value = task_json(&doc! { "title": "Essay", "_id": "t1" });
        assert_eq!(value, serde_json::json!({ "id": "t1", "title": "Essay" }));
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, ["id", "title"]);
    }

    #[test]
    fn timestamps_have_fixed_width() {
        let ts = timestamp();
        assert_eq!(ts.len(), "2024-01-01T00:00:00.000Z".len());
        assert!(ts.ends_with('Z'));
    }

    #[test]
    fn difficulty_defaults_to_medium() {
        let task: NewTask = serde_json::from_value(serde_json::json!({
            "student_id": "s1",
            "type": "homework",
            "subject": "Math",
            "title": "Limits",
            "description": "Exercises 1-10",
        }))
        .unwrap();
        assert_eq!(task.difficulty, "medium");
        assert_eq!(task.kind, "homework");
    }
}
