#![allow(dead_code)]

use std::sync::Arc;

use compass_api::routes::NewTask;
use compass_api::state::AppState;
use compass_store::{Database, SqliteBackend};

/// Service state over each backend that runs without external services.
pub async fn states() -> Vec<(&'static str, AppState)> {
    let sqlite = SqliteBackend::open_in_memory().await.unwrap();
    let states = vec![
        ("memory", AppState::new(Arc::new(Database::in_memory()))),
        ("sqlite", AppState::new(Arc::new(Database::new(Arc::new(sqlite))))),
    ];
    for (_, state) in &states {
        state.ensure_collections().await;
    }
    states
}

pub fn offline() -> AppState {
    AppState::new(Arc::new(Database::unavailable()))
}

pub fn new_task(student_id: &str, subject: &str, title: &str) -> NewTask {
    NewTask {
        student_id: student_id.into(),
        kind: "homework".into(),
        subject: subject.into(),
        title: title.into(),
        description: format!("{title} for {subject}"),
        difficulty: "medium".into(),
    }
}
