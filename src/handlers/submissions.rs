use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{post, put},
    Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use crate::errors::AppError;
use crate::handlers::notifications;
use crate::ledger;
use crate::models::{
    BuyerReviewRow, CreateSubmissionRequest, Submission, SubmissionActionRequest, SubmissionStatus,
    TaskStatus,
};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(submit_work).get(list_buyer_review))
        .route("/:id/approve", put(approve_submission))
        .route("/:id/reject", put(reject_submission))
}

/// Task fields needed to admit or act on a submission.
#[derive(Debug, sqlx::FromRow)]
struct TaskForSubmission {
    buyer_email: String,
    title: String,
    status: TaskStatus,
    deadline: NaiveDate,
    required_workers: i32,
}

/// POST /submissions - A worker submits work against an active task.
///
/// The task row is locked for the duration so the capacity check and the
/// insert are atomic against concurrent submissions and approvals.
pub async fn submit_work(
    State(state): State<AppState>,
    Json(payload): Json<CreateSubmissionRequest>,
) -> Result<Json<Submission>, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let mut tx = state.db.begin().await?;

    let task = sqlx::query_as::<_, TaskForSubmission>(
        r#"
        SELECT buyer_email, title, status, deadline, required_workers
        FROM tasks WHERE id = $1 FOR UPDATE
        "#,
    )
    .bind(payload.task_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Task".to_string()))?;

    if !task.status.accepts_submissions() {
        return Err(AppError::TaskNotActive);
    }
    // An overdue task is closed to new work even if the housekeeping sweep
    // has not caught up with it yet (browsing applies the same cutoff).
    if task.deadline < Utc::now().date_naive() {
        return Err(AppError::TaskNotActive);
    }
    if task.buyer_email == payload.worker_email {
        return Err(AppError::Validation(
            "you cannot submit work to your own task".to_string(),
        ));
    }

    let already_submitted = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(SELECT 1 FROM submissions
                      WHERE task_id = $1 AND worker_email = $2 AND status <> 'rejected')
        "#,
    )
    .bind(payload.task_id)
    .bind(&payload.worker_email)
    .fetch_one(&mut *tx)
    .await?;

    if already_submitted {
        return Err(AppError::AlreadySubmitted);
    }

    let approved_count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM submissions WHERE task_id = $1 AND status = 'approved'",
    )
    .bind(payload.task_id)
    .fetch_one(&mut *tx)
    .await?;

    if approved_count >= task.required_workers as i64 {
        return Err(AppError::CapacityExceeded);
    }

    let submission = sqlx::query_as::<_, Submission>(
        r#"
        INSERT INTO submissions (id, task_id, worker_email, details)
        VALUES ($1, $2, $3, $4)
        RETURNING id, task_id, worker_email, details, status, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(payload.task_id)
    .bind(&payload.worker_email)
    .bind(&payload.details)
    .fetch_one(&mut *tx)
    .await?;

    notifications::push(
        &mut tx,
        &task.buyer_email,
        &format!(
            "{} submitted work for your task \"{}\"",
            payload.worker_email, task.title
        ),
        Some("/dashboard/my-tasks"),
    )
    .await?;

    tx.commit().await?;

    Ok(Json(submission))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerReviewQuery {
    pub buyer_email: String,
    pub status: Option<SubmissionStatus>,
}

/// GET /submissions?buyerEmail=&status= - The buyer's review queue across all
/// their tasks, optionally filtered by status.
async fn list_buyer_review(
    State(state): State<AppState>,
    Query(params): Query<BuyerReviewQuery>,
) -> Result<Json<Vec<BuyerReviewRow>>, AppError> {
    let rows = sqlx::query_as::<_, BuyerReviewRow>(
        r#"
        SELECT s.id, s.task_id, s.worker_email, s.details, s.status, s.created_at,
               u.name AS worker_name, t.title AS task_title, t.payable_amount
        FROM submissions s
        JOIN tasks t ON t.id = s.task_id
        JOIN users u ON u.email = s.worker_email
        WHERE t.buyer_email = $1
          AND ($2::submission_status IS NULL OR s.status = $2)
        ORDER BY s.created_at DESC
        "#,
    )
    .bind(&params.buyer_email)
    .bind(params.status)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(rows))
}

/// Submission fields needed by approve/reject, with its task locked alongside.
#[derive(Debug, sqlx::FromRow)]
struct SubmissionForAction {
    task_id: Uuid,
    worker_email: String,
    buyer_email: String,
    title: String,
    task_status: TaskStatus,
    payable_amount: i64,
    required_workers: i32,
}

async fn load_for_action(
    tx: &mut sqlx::PgConnection,
    submission_id: Uuid,
    buyer_email: &str,
) -> Result<SubmissionForAction, AppError> {
    let row = sqlx::query_as::<_, SubmissionForAction>(
        r#"
        SELECT s.task_id, s.worker_email, t.buyer_email, t.title,
               t.status AS task_status, t.payable_amount, t.required_workers
        FROM submissions s
        JOIN tasks t ON t.id = s.task_id
        WHERE s.id = $1
        FOR UPDATE OF s, t
        "#,
    )
    .bind(submission_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Submission".to_string()))?;

    if row.buyer_email != buyer_email {
        return Err(AppError::Unauthorized(
            "only the task owner can review this submission".to_string(),
        ));
    }

    Ok(row)
}

/// PUT /submissions/:id/approve - Approve pending work, crediting the worker.
///
/// The transition is a compare-and-swap on `pending`, so two concurrent
/// approvals of the same submission cannot both pay out.
pub async fn approve_submission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmissionActionRequest>,
) -> Result<Json<Value>, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let mut tx = state.db.begin().await?;

    let row = load_for_action(&mut tx, id, &payload.buyer_email).await?;

    // The task row is locked, so this count cannot move under us. Approvals
    // can never exceed the required worker count.
    let approved_count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM submissions WHERE task_id = $1 AND status = 'approved'",
    )
    .bind(row.task_id)
    .fetch_one(&mut *tx)
    .await?;

    if approved_count >= row.required_workers as i64 {
        return Err(AppError::CapacityExceeded);
    }

    // A task completed below capacity was closed at its deadline and its
    // escrow refunded; there are no coins left behind it to pay out.
    if row.task_status == TaskStatus::Completed {
        return Err(AppError::InvalidTransition(
            "task is already completed".to_string(),
        ));
    }

    let updated = sqlx::query(
        "UPDATE submissions SET status = 'approved' WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(AppError::InvalidTransition(
            "submission has already been approved or rejected".to_string(),
        ));
    }

    ledger::credit(&mut tx, &row.worker_email, row.payable_amount).await?;

    let task_completed = approved_count + 1 >= row.required_workers as i64;
    if task_completed {
        sqlx::query("UPDATE tasks SET status = 'completed' WHERE id = $1")
            .bind(row.task_id)
            .execute(&mut *tx)
            .await?;
    }

    notifications::push(
        &mut tx,
        &row.worker_email,
        &format!(
            "Your submission for \"{}\" was approved (+{} coins)",
            row.title, row.payable_amount
        ),
        Some("/dashboard/my-submissions"),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        "Submission {} approved, credited {} coins to {}",
        id,
        row.payable_amount,
        row.worker_email
    );

    Ok(Json(json!({
        "success": true,
        "status": "approved",
        "taskCompleted": task_completed
    })))
}

/// PUT /submissions/:id/reject - Reject pending work. No ledger effect.
pub async fn reject_submission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmissionActionRequest>,
) -> Result<Json<Value>, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let mut tx = state.db.begin().await?;

    let row = load_for_action(&mut tx, id, &payload.buyer_email).await?;

    let updated = sqlx::query(
        "UPDATE submissions SET status = 'rejected' WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(AppError::InvalidTransition(
            "submission has already been approved or rejected".to_string(),
        ));
    }

    notifications::push(
        &mut tx,
        &row.worker_email,
        &format!("Your submission for \"{}\" was rejected", row.title),
        Some("/dashboard/my-submissions"),
    )
    .await?;

    tx.commit().await?;

    Ok(Json(json!({ "success": true, "status": "rejected" })))
}
