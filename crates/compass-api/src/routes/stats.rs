use axum::Json;
use axum::extract::{Path, Query, State};
use bson::{Bson, Document, doc};
use compass_store::encoding::text_form;
use compass_store::{Filter, ID_FIELD, Pipeline};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::{AppState, INTERNSHIPS, TASKS, USERS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentStats {
    pub tasks_completed: u64,
    pub courses_recommended: u64,
    pub internships_tracked: u64,
    pub career_readiness: u64,
}

impl StudentStats {
    /// Figures shown while the database is unavailable.
    pub const OFFLINE: Self = Self {
        tasks_completed: 12,
        courses_recommended: 5,
        internships_tracked: 3,
        career_readiness: 75,
    };

    pub fn from_activity(tasks_completed: u64, internships_tracked: u64) -> Self {
        let mut readiness = 40;
        if tasks_completed > 5 {
            readiness += 15;
        }
        if internships_tracked > 0 {
            readiness += 10;
        }
        Self {
            tasks_completed,
            courses_recommended: 8,
            internships_tracked,
            career_readiness: readiness.min(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminStats {
    pub total_students: u64,
    pub total_tasks: u64,
    pub active_users: u64,
    pub ai_interactions: u64,
}

impl AdminStats {
    pub const OFFLINE: Self = Self {
        total_students: 150,
        total_tasks: 1240,
        active_users: 85,
        ai_interactions: 4500,
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectProgress {
    pub subject: String,
    pub completed: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubjectsParams {
    pub student_id: Option<String>,
}

pub async fn student(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> Result<Json<StudentStats>, ApiError> {
    let (Some(tasks), Some(internships)) = (
        state.collection(TASKS).await,
        state.collection(INTERNSHIPS).await,
    ) else {
        return Ok(Json(StudentStats::OFFLINE));
    };

    let completed = tasks
        .count_documents(doc! { "student_id": student_id.as_str(), "status": "completed" })
        .await?;
    let tracked = internships
        .count_documents(doc! { "student_id": student_id.as_str() })
        .await?;

    Ok(Json(StudentStats::from_activity(completed, tracked)))
}

pub async fn admin(State(state): State<AppState>) -> Result<Json<AdminStats>, ApiError> {
    let (Some(users), Some(tasks)) = (state.collection(USERS).await, state.collection(TASKS).await)
    else {
        return Ok(Json(AdminStats::OFFLINE));
    };

    let total_students = users.count_documents(Filter::eq("role", "student")).await?;
    let total_tasks = tasks.count_documents(Filter::all()).await?;
    let active_users = users.count_documents(Filter::all()).await?;

    Ok(Json(AdminStats {
        total_students,
        total_tasks,
        active_users,
        ai_interactions: total_tasks * 3,
    }))
}

/// Completed and total task counts per subject, optionally for one student.
pub async fn subjects(
    State(state): State<AppState>,
    Query(params): Query<SubjectsParams>,
) -> Result<Json<Vec<SubjectProgress>>, ApiError> {
    let Some(tasks) = state.collection(TASKS).await else {
        return Ok(Json(Vec::new()));
    };

    let mut pipeline = Pipeline::group_by("subject")
        .count("total")
        .count_if("completed", "status", "completed");
    if let Some(student_id) = params.student_id {
        pipeline = pipeline.matching(Filter::eq("student_id", student_id));
    }

    let groups = tasks.aggregate(pipeline).await?;
    Ok(Json(groups.iter().map(subject_progress).collect()))
}

fn subject_progress(group: &Document) -> SubjectProgress {
    SubjectProgress {
        subject: group.get(ID_FIELD).map(text_form).unwrap_or_default(),
        completed: group.get("completed").map_or(0, count),
        total: group.get("total").map_or(0, count),
    }
}

// Native servers sum into 32-bit integers; the emulated path into 64-bit.
fn count(value: &Bson) -> u64 {
    match value {
        Bson::Int32(n) => u64::try_from(*n).unwrap_or(0),
        Bson::Int64(n) => u64::try_from(*n).unwrap_or(0),
        Bson::Double(n) if *n > 0.0 => *n as u64,
        _ => 0,
    }
}
