//! Supervisor error taxonomy, mapped to HTTP status codes so the API
//! handlers can return errors directly.

use axum::http::StatusCode;

#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
    /// Bad or missing input (empty name, unknown script). No state change.
    #[error("{0}")]
    Validation(String),

    /// Unknown process id. No state change.
    #[error("Process '{0}' not found")]
    NotFound(String),

    /// OS-level failure to launch; the record transitions to `error`.
    #[error("Failed to spawn process: {0}")]
    Spawn(String),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl SupervisorError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Spawn(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Spawn(_) => "SPAWN_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": self.to_string(),
            "error_code": self.error_code(),
        })
    }
}

impl axum::response::IntoResponse for SupervisorError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = axum::Json(self.to_json());
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            SupervisorError::Validation("empty name".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SupervisorError::NotFound("abc".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            SupervisorError::Spawn("no such file".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn json_shape() {
        let err = SupervisorError::NotFound("abc".into());
        let json = err.to_json();
        assert_eq!(json["success"], false);
        assert_eq!(json["error_code"], "NOT_FOUND");
        assert!(json["error"].as_str().unwrap().contains("abc"));
    }
}
