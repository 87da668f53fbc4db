use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

use crate::types::cli::UsageError;

/// Exit code used when an external tool could not be found on PATH.
pub const TOOL_NOT_FOUND_EXIT_CODE: i32 = 127;

#[derive(Debug, ThisError)]
pub enum LaunchError {
    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error("failed to start companion `{program}`: {reason}")]
    Spawn { program: String, reason: String },

    #[error("Database error: {0}")]
    Storage(#[from] SqlxError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("external tool `{tool}` failed{}", describe_exit(.code))]
    ExternalTool { tool: String, code: Option<i32> },

    #[error("companion request error: {0}")]
    Companion(#[from] reqwest::Error),

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid credentials")]
    Unauthorized,
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!(" with exit code {c}"),
        None => ": not found on PATH".to_string(),
    }
}

impl LaunchError {
    /// Process exit code the launcher should terminate with for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchError::Usage(e) => e.exit_code(),
            LaunchError::ExternalTool { code: Some(c), .. } if *c != 0 => *c,
            LaunchError::ExternalTool { code: None, .. } => TOOL_NOT_FOUND_EXIT_CODE,
            _ => 1,
        }
    }
}

impl From<figment::Error> for LaunchError {
    fn from(e: figment::Error) -> Self {
        LaunchError::Configuration(e.to_string())
    }
}

impl IntoResponse for LaunchError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_body) = match self {
            LaunchError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ApiErrorBody {
                    code: "UNAUTHORIZED".to_string(),
                    message: "Authentication error.".to_string(),
                },
            ),
            LaunchError::Companion(_) => (
                StatusCode::BAD_GATEWAY,
                ApiErrorBody {
                    code: "BAD_GATEWAY".to_string(),
                    message: "Modules server is unavailable.".to_string(),
                },
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorBody {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred.".to_string(),
                },
            ),
        };
        (status, Json(ApiErrorResponse { error: error_body })).into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}
