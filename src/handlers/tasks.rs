use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::errors::AppError;
use crate::ledger;
use crate::models::{
    unconsumed_escrow, AvailableTaskRow, BuyerTaskRow, CreateTaskRequest, DeleteTaskRequest, Task,
    TaskDetailResponse, TaskStatus, UpdateTaskRequest,
};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_task).get(list_buyer_tasks))
        .route("/available", get(list_available_tasks))
        .route(
            "/:id",
            get(get_task_detail).put(update_task).delete(delete_task),
        )
}

const TASK_COLUMNS: &str = "id, title, detail, submission_info, image_url, buyer_email, \
     required_workers, payable_amount, total_payable, deadline, status, created_at";

/// POST /tasks - Create a task, debiting the buyer's escrow.
///
/// The debit and the insert run in one transaction: either the buyer is
/// charged and the task exists, or neither happened.
pub async fn create_task(
    State(state): State<AppState>,
    Json(payload): Json<CreateTaskRequest>,
) -> Result<Json<Task>, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    if payload.deadline <= Utc::now().date_naive() {
        return Err(AppError::Validation(
            "completion deadline must be in the future".to_string(),
        ));
    }

    let total_payable = payload.total_payable()?;

    let mut tx = state.db.begin().await?;

    ledger::debit(&mut tx, &payload.buyer_email, total_payable).await?;

    let task = sqlx::query_as::<_, Task>(&format!(
        r#"
        INSERT INTO tasks (id, title, detail, submission_info, image_url, buyer_email,
                           required_workers, payable_amount, total_payable, deadline)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {TASK_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(&payload.title)
    .bind(&payload.detail)
    .bind(&payload.submission_info)
    .bind(&payload.image_url)
    .bind(&payload.buyer_email)
    .bind(payload.required_workers)
    .bind(payload.payable_amount)
    .bind(total_payable)
    .bind(payload.deadline)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        "Task {} created by {} (escrow {} coins)",
        task.id,
        task.buyer_email,
        total_payable
    );

    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
pub struct BuyerQuery {
    pub buyer: String,
}

/// GET /tasks?buyer= - The buyer's tasks with submission counts, newest first.
async fn list_buyer_tasks(
    State(state): State<AppState>,
    Query(params): Query<BuyerQuery>,
) -> Result<Json<Vec<BuyerTaskRow>>, AppError> {
    let tasks = sqlx::query_as::<_, BuyerTaskRow>(
        r#"
        SELECT t.id, t.title, t.detail, t.submission_info, t.image_url, t.buyer_email,
               t.required_workers, t.payable_amount, t.total_payable, t.deadline,
               t.status, t.created_at,
               COUNT(s.id) FILTER (WHERE s.status = 'pending') AS pending_count,
               COUNT(s.id) FILTER (WHERE s.status = 'approved') AS approved_count
        FROM tasks t
        LEFT JOIN submissions s ON s.task_id = t.id
        WHERE t.buyer_email = $1
        GROUP BY t.id
        ORDER BY t.created_at DESC
        "#,
    )
    .bind(&params.buyer)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(tasks))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerQuery {
    pub worker_email: String,
}

/// GET /tasks/available?workerEmail= - Active tasks the worker can still take:
/// future deadline, remaining capacity, not their own, annotated with whether
/// they already submitted.
async fn list_available_tasks(
    State(state): State<AppState>,
    Query(params): Query<WorkerQuery>,
) -> Result<Json<Vec<AvailableTaskRow>>, AppError> {
    let tasks = sqlx::query_as::<_, AvailableTaskRow>(
        r#"
        SELECT t.id, t.title, t.detail, t.submission_info, t.image_url, t.buyer_email,
               t.required_workers, t.payable_amount, t.total_payable, t.deadline,
               t.status, t.created_at,
               u.name AS buyer_name,
               (t.required_workers - COUNT(s.id) FILTER (WHERE s.status = 'approved'))::BIGINT
                   AS remaining_workers,
               EXISTS(SELECT 1 FROM submissions ws
                      WHERE ws.task_id = t.id
                        AND ws.worker_email = $1
                        AND ws.status <> 'rejected') AS has_submitted
        FROM tasks t
        JOIN users u ON u.email = t.buyer_email
        LEFT JOIN submissions s ON s.task_id = t.id
        WHERE t.status = 'active'
          AND t.deadline >= CURRENT_DATE
          AND t.buyer_email <> $1
        GROUP BY t.id, u.name
        HAVING COUNT(s.id) FILTER (WHERE s.status = 'approved') < t.required_workers
        ORDER BY t.created_at DESC
        "#,
    )
    .bind(&params.worker_email)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(tasks))
}

/// GET /tasks/:id?workerEmail= - One task as seen by the requesting worker.
async fn get_task_detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<WorkerQuery>,
) -> Result<Json<TaskDetailResponse>, AppError> {
    let row = sqlx::query_as::<_, AvailableTaskRow>(
        r#"
        SELECT t.id, t.title, t.detail, t.submission_info, t.image_url, t.buyer_email,
               t.required_workers, t.payable_amount, t.total_payable, t.deadline,
               t.status, t.created_at,
               u.name AS buyer_name,
               (t.required_workers - COUNT(s.id) FILTER (WHERE s.status = 'approved'))::BIGINT
                   AS remaining_workers,
               EXISTS(SELECT 1 FROM submissions ws
                      WHERE ws.task_id = t.id
                        AND ws.worker_email = $2
                        AND ws.status <> 'rejected') AS has_submitted
        FROM tasks t
        JOIN users u ON u.email = t.buyer_email
        LEFT JOIN submissions s ON s.task_id = t.id
        WHERE t.id = $1
        GROUP BY t.id, u.name
        "#,
    )
    .bind(id)
    .bind(&params.worker_email)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("Task".to_string()))?;

    let is_completed = row.task.status == TaskStatus::Completed || row.remaining_workers <= 0;

    Ok(Json(TaskDetailResponse {
        task: row.task,
        buyer_name: row.buyer_name,
        remaining_workers: row.remaining_workers,
        has_submitted: row.has_submitted,
        is_completed,
    }))
}

/// PUT /tasks/:id - Edit a task. Owning buyer only, active tasks only.
///
/// Escrow is fixed at creation, so `requiredWorkers` and `payableAmount`
/// cannot change; a payload that tries gets an explicit rejection.
async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    if payload.deadline <= Utc::now().date_naive() {
        return Err(AppError::Validation(
            "completion deadline must be in the future".to_string(),
        ));
    }

    let mut tx = state.db.begin().await?;

    let current = sqlx::query_as::<_, Task>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Task".to_string()))?;

    if current.buyer_email != payload.buyer_email {
        return Err(AppError::Unauthorized(
            "only the task owner can edit it".to_string(),
        ));
    }
    if !current.status.is_editable() {
        return Err(AppError::InvalidTransition(
            "only active tasks can be edited".to_string(),
        ));
    }
    if payload.required_workers.is_some_and(|w| w != current.required_workers)
        || payload.payable_amount.is_some_and(|a| a != current.payable_amount)
    {
        return Err(AppError::Validation(
            "requiredWorkers and payableAmount are fixed at creation".to_string(),
        ));
    }

    let task = sqlx::query_as::<_, Task>(&format!(
        r#"
        UPDATE tasks
        SET title = $2, detail = $3, submission_info = $4, image_url = $5, deadline = $6
        WHERE id = $1
        RETURNING {TASK_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(&payload.title)
    .bind(&payload.detail)
    .bind(&payload.submission_info)
    .bind(&payload.image_url)
    .bind(payload.deadline)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Json(task))
}

/// DELETE /tasks/:id - Delete a task, refunding unconsumed escrow to the
/// buyer. The body carries `{buyerEmail}` for authorization.
pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DeleteTaskRequest>,
) -> Result<Json<Value>, AppError> {
    let refunded = delete_with_refund(&state.db, id, Some(&payload.buyer_email)).await?;

    Ok(Json(json!({ "success": true, "refunded": refunded })))
}

/// Shared by the buyer endpoint and the admin console: lock the task, refund
/// `total_payable - approved_count * payable_amount`, delete the row
/// (submissions cascade). `requester` is None for admin-initiated deletes.
pub(crate) async fn delete_with_refund(
    pool: &PgPool,
    task_id: Uuid,
    requester: Option<&str>,
) -> Result<i64, AppError> {
    let mut tx = pool.begin().await?;

    let task = sqlx::query_as::<_, Task>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 FOR UPDATE"
    ))
    .bind(task_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Task".to_string()))?;

    if let Some(requester) = requester {
        if task.buyer_email != requester {
            return Err(AppError::Unauthorized(
                "only the task owner can delete it".to_string(),
            ));
        }
    }

    let approved_count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM submissions WHERE task_id = $1 AND status = 'approved'",
    )
    .bind(task_id)
    .fetch_one(&mut *tx)
    .await?;

    let refund = unconsumed_escrow(task.total_payable, approved_count, task.payable_amount);
    if refund > 0 {
        ledger::credit(&mut tx, &task.buyer_email, refund).await?;
    }

    sqlx::query("DELETE FROM tasks WHERE id = $1")
        .bind(task_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(
        "Task {} deleted, refunded {} of {} escrow coins to {}",
        task_id,
        refund,
        task.total_payable,
        task.buyer_email
    );

    Ok(refund)
}
