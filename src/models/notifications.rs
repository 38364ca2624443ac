use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub to_email: String,
    pub message: String,
    pub action_route: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Body of `PUT /notifications/read-all` and the per-id operations; the
/// recipient identifies themselves and every statement is scoped to that
/// email, so one user cannot touch another's notifications.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationOwnerRequest {
    pub email: String,
}
