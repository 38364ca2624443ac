use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::{Withdrawal, WorkerSubmissionRow};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/submissions", get(list_submissions))
        .route("/withdrawals", get(list_withdrawals))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerHistoryQuery {
    pub worker_email: String,
}

/// GET /worker/submissions?workerEmail= - The worker's submission history.
async fn list_submissions(
    State(state): State<AppState>,
    Query(params): Query<WorkerHistoryQuery>,
) -> Result<Json<Vec<WorkerSubmissionRow>>, AppError> {
    let rows = sqlx::query_as::<_, WorkerSubmissionRow>(
        r#"
        SELECT s.id, s.task_id, s.worker_email, s.details, s.status, s.created_at,
               t.title AS task_title, t.buyer_email, t.payable_amount
        FROM submissions s
        JOIN tasks t ON t.id = s.task_id
        WHERE s.worker_email = $1
        ORDER BY s.created_at DESC
        "#,
    )
    .bind(&params.worker_email)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(rows))
}

/// GET /worker/withdrawals?workerEmail= - The worker's withdrawal history.
async fn list_withdrawals(
    State(state): State<AppState>,
    Query(params): Query<WorkerHistoryQuery>,
) -> Result<Json<Vec<Withdrawal>>, AppError> {
    let rows = sqlx::query_as::<_, Withdrawal>(
        r#"
        SELECT id, worker_email, coin_amount, dollar_amount, payment_system,
               account_number, status, created_at
        FROM withdrawals
        WHERE worker_email = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(&params.worker_email)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(rows))
}
