mod health;
mod stats;
mod tasks;

use axum::Router;
use axum::routing::{delete, get, patch};

use crate::state::AppState;

pub use health::healthz;
pub use stats::{AdminStats, StudentStats, SubjectProgress, SubjectsParams};
pub use tasks::{NewTask, StatusChange, TaskListParams};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/api/tasks", get(tasks::list).post(tasks::create))
        .route("/api/tasks/{id}", delete(tasks::remove))
        .route("/api/tasks/{id}/status", patch(tasks::set_status))
        .route("/api/stats/student/{student_id}", get(stats::student))
        .route("/api/stats/admin", get(stats::admin))
        .route("/api/stats/subjects", get(stats::subjects))
}

/// Handlers, for callers that drive them without a router.
pub mod handlers {
    pub use super::stats::{admin, student, subjects};
    pub use super::tasks::{create, list, remove, set_status};
}
