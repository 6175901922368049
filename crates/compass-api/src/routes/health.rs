use axum::Json;
use axum::extract::State;

use crate::state::AppState;

pub async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    let connected = state.db.ping().await;
    let mode = state.db.mode().map(|m| m.to_string());
    Json(serde_json::json!({
        "status": "ok",
        "database": { "mode": mode, "connected": connected },
    }))
}
