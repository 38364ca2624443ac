use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "submission_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    /// Approved and rejected are terminal; only pending submissions can be
    /// acted on by the buyer.
    pub fn is_terminal(self) -> bool {
        !matches!(self, SubmissionStatus::Pending)
    }
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: Uuid,
    pub task_id: Uuid,
    pub worker_email: String,
    pub details: String,
    pub status: SubmissionStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubmissionRequest {
    pub task_id: Uuid,
    #[validate(email)]
    pub worker_email: String,
    #[validate(length(min = 1, max = 5000))]
    pub details: String,
}

/// Body of approve/reject: the buyer identifies themselves and the handler
/// checks they own the task.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionActionRequest {
    #[validate(email)]
    pub buyer_email: String,
}

/// A submission in the buyer's review queue.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BuyerReviewRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub submission: Submission,
    pub worker_name: String,
    pub task_title: String,
    pub payable_amount: i64,
}

/// A submission in the worker's history.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSubmissionRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub submission: Submission,
    pub task_title: String,
    pub buyer_email: String,
    pub payable_amount: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_is_the_only_actionable_state() {
        assert!(!SubmissionStatus::Pending.is_terminal());
        assert!(SubmissionStatus::Approved.is_terminal());
        assert!(SubmissionStatus::Rejected.is_terminal());
    }

    #[test]
    fn create_request_requires_details() {
        let req = CreateSubmissionRequest {
            task_id: Uuid::new_v4(),
            worker_email: "worker@example.com".to_string(),
            details: String::new(),
        };
        assert!(req.validate().is_err());
    }
}
