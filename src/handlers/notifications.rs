use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{delete, get, put},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Notification, NotificationOwnerRequest};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/:id/read", put(mark_read))
        .route("/read-all", put(mark_all_read))
        .route("/:id", delete(delete_notification))
}

/// Insert a notification inside the caller's transaction so it commits
/// atomically with the state transition that caused it.
pub(crate) async fn push(
    conn: &mut PgConnection,
    to_email: &str,
    message: &str,
    action_route: Option<&str>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO notifications (id, to_email, message, action_route)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(to_email)
    .bind(message)
    .bind(action_route)
    .execute(conn)
    .await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    pub email: String,
}

/// GET /notifications?email= - The recipient's notifications, newest first.
async fn list_notifications(
    State(state): State<AppState>,
    Query(params): Query<NotificationQuery>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let notifications = sqlx::query_as::<_, Notification>(
        r#"
        SELECT id, to_email, message, action_route, read, created_at
        FROM notifications
        WHERE to_email = $1
        ORDER BY created_at DESC
        LIMIT 100
        "#,
    )
    .bind(&params.email)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(notifications))
}

/// PUT /notifications/:id/read - Mark one notification read.
///
/// Scoped to the recipient's email, so one user cannot touch another's
/// notifications.
async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<NotificationOwnerRequest>,
) -> Result<Json<Value>, AppError> {
    let result = sqlx::query("UPDATE notifications SET read = true WHERE id = $1 AND to_email = $2")
        .bind(id)
        .bind(&payload.email)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Notification".to_string()));
    }

    Ok(Json(json!({ "success": true })))
}

/// PUT /notifications/read-all - Mark all of the recipient's notifications read.
async fn mark_all_read(
    State(state): State<AppState>,
    Json(payload): Json<NotificationOwnerRequest>,
) -> Result<Json<Value>, AppError> {
    let result = sqlx::query("UPDATE notifications SET read = true WHERE to_email = $1 AND NOT read")
        .bind(&payload.email)
        .execute(&state.db)
        .await?;

    Ok(Json(json!({ "success": true, "updated": result.rows_affected() })))
}

/// DELETE /notifications/:id - Remove one notification.
async fn delete_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<NotificationOwnerRequest>,
) -> Result<Json<Value>, AppError> {
    let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND to_email = $2")
        .bind(id)
        .bind(&payload.email)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Notification".to_string()));
    }

    Ok(Json(json!({ "success": true })))
}
