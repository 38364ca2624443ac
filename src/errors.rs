use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Insufficient coin balance")]
    InsufficientBalance,

    #[error("Ledger amount must be positive")]
    InvalidAmount,

    #[error("Minimum withdrawal is {0} coins")]
    BelowMinimum(i64),

    #[error("Task already has the required number of approved workers")]
    CapacityExceeded,

    #[error("You already have a live submission for this task")]
    AlreadySubmitted,

    #[error("Task is not active")]
    TaskNotActive,

    #[error("{0}")]
    InvalidTransition(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::FORBIDDEN,
            AppError::InsufficientBalance
            | AppError::InvalidAmount
            | AppError::BelowMinimum(_) => StatusCode::BAD_REQUEST,
            AppError::CapacityExceeded
            | AppError::AlreadySubmitted
            | AppError::TaskNotActive
            | AppError::InvalidTransition(_) => StatusCode::CONFLICT,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_message = match &self {
            AppError::Database(err) => {
                tracing::error!("Database error: {:?}", err);
                "Database error occurred".to_string()
            }
            AppError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                msg.clone()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_client_status_codes() {
        assert_eq!(
            AppError::InsufficientBalance.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::BelowMinimum(200).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::CapacityExceeded.status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::AlreadySubmitted.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::NotFound("Task".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Unauthorized("not the task owner".to_string()).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn messages_are_human_readable() {
        assert_eq!(
            AppError::BelowMinimum(200).to_string(),
            "Minimum withdrawal is 200 coins"
        );
        assert_eq!(
            AppError::NotFound("Task".to_string()).to_string(),
            "Task not found"
        );
    }
}
