use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use compass_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("database unavailable")]
    Unavailable,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn not_found(what: &str, id: &str) -> Self {
        ApiError::NotFound(format!("{what} not found: {id}"))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unavailable | ApiError::Store(StoreError::Unavailable) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(
                StoreError::Filter(_)
                | StoreError::Update(_)
                | StoreError::Pipeline(_)
                | StoreError::InvalidField(_)
                | StoreError::InvalidIdentity(_)
                | StoreError::InvalidCollection(_)
                | StoreError::Mutation(_),
            ) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(ApiError::Unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ApiError::not_found("task", "t1").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(StoreError::InvalidField("a..b".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(StoreError::Backend("disk full".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
