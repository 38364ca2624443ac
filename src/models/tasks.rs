use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Paused,
    Completed,
}

impl TaskStatus {
    /// Only active tasks accept new submissions.
    pub fn accepts_submissions(self) -> bool {
        matches!(self, TaskStatus::Active)
    }

    /// Only active tasks may be edited by the buyer.
    pub fn is_editable(self) -> bool {
        matches!(self, TaskStatus::Active)
    }
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub detail: String,
    pub submission_info: String,
    pub image_url: Option<String>,
    pub buyer_email: String,
    pub required_workers: i32,
    pub payable_amount: i64,
    pub total_payable: i64,
    pub deadline: NaiveDate,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    #[validate(email)]
    pub buyer_email: String,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 5000))]
    pub detail: String,
    #[validate(length(min = 1, max = 2000))]
    pub submission_info: String,
    pub image_url: Option<String>,
    #[validate(range(min = 1, max = 100))]
    pub required_workers: i32,
    #[validate(range(min = 1))]
    pub payable_amount: i64,
    pub deadline: NaiveDate,
}

impl CreateTaskRequest {
    /// Escrow charged at creation. Checked multiply so a hostile payload
    /// cannot wrap the total.
    pub fn total_payable(&self) -> Result<i64, AppError> {
        total_payable(self.required_workers, self.payable_amount)
    }
}

/// Body of `PUT /tasks/:id`. Escrow is fixed at creation, so the two fields
/// that determine it are not editable; they are still accepted here so a stale
/// client gets a clear rejection instead of a silent ignore.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    #[validate(email)]
    pub buyer_email: String,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 5000))]
    pub detail: String,
    #[validate(length(min = 1, max = 2000))]
    pub submission_info: String,
    pub image_url: Option<String>,
    pub deadline: NaiveDate,
    pub required_workers: Option<i32>,
    pub payable_amount: Option<i64>,
}

/// Body of `DELETE /tasks/:id` (the owning buyer identifies themselves).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteTaskRequest {
    pub buyer_email: String,
}

/// A buyer's task annotated with its submission counts.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BuyerTaskRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub task: Task,
    pub pending_count: i64,
    pub approved_count: i64,
}

/// A task as shown in the worker's browse list.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AvailableTaskRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub task: Task,
    pub buyer_name: String,
    pub remaining_workers: i64,
    pub has_submitted: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDetailResponse {
    #[serde(flatten)]
    pub task: Task,
    pub buyer_name: String,
    pub remaining_workers: i64,
    pub has_submitted: bool,
    pub is_completed: bool,
}

pub fn total_payable(required_workers: i32, payable_amount: i64) -> Result<i64, AppError> {
    (required_workers as i64)
        .checked_mul(payable_amount)
        .ok_or_else(|| AppError::Validation("task total is out of range".to_string()))
}

/// Escrow still held by a task: the original total minus coins already paid
/// out through approved submissions. Clamped at zero so a deleted task never
/// refunds more than it holds.
pub fn unconsumed_escrow(total_payable: i64, approved_count: i64, payable_amount: i64) -> i64 {
    (total_payable - approved_count * payable_amount).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(required_workers: i32, payable_amount: i64, deadline: NaiveDate) -> CreateTaskRequest {
        CreateTaskRequest {
            buyer_email: "buyer@example.com".to_string(),
            title: "Watch my video".to_string(),
            detail: "Watch the full video and leave a comment".to_string(),
            submission_info: "Screenshot of your comment".to_string(),
            image_url: None,
            required_workers,
            payable_amount,
            deadline,
        }
    }

    fn future_date() -> NaiveDate {
        Utc::now().date_naive() + chrono::Duration::days(7)
    }

    #[test]
    fn total_payable_is_workers_times_amount() {
        let req = request(5, 20, future_date());
        assert_eq!(req.total_payable().unwrap(), 100);
    }

    #[test]
    fn total_payable_overflow_is_rejected() {
        assert!(total_payable(100, i64::MAX / 2).is_err());
    }

    #[test]
    fn worker_count_bounds_are_enforced() {
        assert!(request(0, 20, future_date()).validate().is_err());
        assert!(request(101, 20, future_date()).validate().is_err());
        assert!(request(1, 20, future_date()).validate().is_ok());
        assert!(request(100, 20, future_date()).validate().is_ok());
    }

    #[test]
    fn zero_payable_amount_is_rejected() {
        assert!(request(5, 0, future_date()).validate().is_err());
    }

    #[test]
    fn unconsumed_escrow_subtracts_approved_payouts() {
        // total 100, one approval of 20 already paid out
        assert_eq!(unconsumed_escrow(100, 1, 20), 80);
        assert_eq!(unconsumed_escrow(100, 0, 20), 100);
        assert_eq!(unconsumed_escrow(100, 5, 20), 0);
    }

    #[test]
    fn unconsumed_escrow_never_negative() {
        assert_eq!(unconsumed_escrow(100, 6, 20), 0);
    }

    #[test]
    fn only_active_tasks_accept_submissions() {
        assert!(TaskStatus::Active.accepts_submissions());
        assert!(!TaskStatus::Paused.accepts_submissions());
        assert!(!TaskStatus::Completed.accepts_submissions());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Completed).unwrap(),
            "\"completed\""
        );
    }
}
