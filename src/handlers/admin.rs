use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{delete, get, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{PgConnection, Row};
use std::time::Duration;
use uuid::Uuid;
use validator::Validate;

use crate::cache;
use crate::errors::AppError;
use crate::handlers::{notifications, tasks};
use crate::ledger;
use crate::models::{
    AdminActionRequest, PendingWithdrawalRow, Task, UpdateRoleRequest, User, UserRole,
};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/users", get(list_users))
        .route("/users/:email/role", put(update_role))
        .route("/users/:email", delete(delete_user))
        .route("/tasks", get(list_tasks))
        .route("/tasks/:id", delete(delete_task))
        .route("/withdrawals/pending", get(pending_withdrawals))
        .route("/withdrawals/:id/approve", put(approve_withdrawal))
        .route("/withdrawals/:id/reject", put(reject_withdrawal))
}

const DASHBOARD_CACHE_KEY: &str = "admin:dashboard";
const DASHBOARD_CACHE_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminQuery {
    pub admin_email: String,
}

/// Check the acting user really holds the admin role. Every admin endpoint
/// goes through this; the roles live in the database, not in the request.
async fn require_admin(conn: &mut PgConnection, email: &str) -> Result<(), AppError> {
    let role = sqlx::query_scalar::<_, UserRole>("SELECT role FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(conn)
        .await?;

    match role {
        Some(UserRole::Admin) => Ok(()),
        Some(_) => Err(AppError::Unauthorized("admin role required".to_string())),
        None => Err(AppError::NotFound("User".to_string())),
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_workers: i64,
    pub total_buyers: i64,
    pub total_available_coins: i64,
    pub total_payments_cents: i64,
    pub pending_withdrawal_count: i64,
    pub pending_withdrawal_coins: i64,
}

/// GET /admin/dashboard - Platform totals, cached briefly.
async fn dashboard(
    State(state): State<AppState>,
    Query(params): Query<AdminQuery>,
) -> Result<Json<DashboardStats>, AppError> {
    let mut conn = state.db.acquire().await?;
    require_admin(&mut conn, &params.admin_email).await?;

    if let Some(cached) = cache::get::<DashboardStats>(DASHBOARD_CACHE_KEY) {
        return Ok(Json(cached));
    }

    let row = sqlx::query(
        r#"
        SELECT
            (SELECT COUNT(*) FROM users WHERE role = 'worker') AS total_workers,
            (SELECT COUNT(*) FROM users WHERE role = 'buyer') AS total_buyers,
            (SELECT COALESCE(SUM(coins), 0) FROM users) AS total_available_coins,
            (SELECT COALESCE(SUM(amount_cents), 0) FROM payments) AS total_payments_cents,
            (SELECT COUNT(*) FROM withdrawals WHERE status = 'pending') AS pending_withdrawal_count,
            (SELECT COALESCE(SUM(coin_amount), 0) FROM withdrawals WHERE status = 'pending')
                AS pending_withdrawal_coins
        "#,
    )
    .fetch_one(&mut *conn)
    .await?;

    let stats = DashboardStats {
        total_workers: row.get("total_workers"),
        total_buyers: row.get("total_buyers"),
        total_available_coins: row.get("total_available_coins"),
        total_payments_cents: row.get("total_payments_cents"),
        pending_withdrawal_count: row.get("pending_withdrawal_count"),
        pending_withdrawal_coins: row.get("pending_withdrawal_coins"),
    };

    if let Err(e) = cache::set(DASHBOARD_CACHE_KEY, &stats, DASHBOARD_CACHE_TTL) {
        tracing::warn!("Failed to cache dashboard stats: {}", e);
    }

    Ok(Json(stats))
}

/// GET /admin/users - All users, newest first.
async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<AdminQuery>,
) -> Result<Json<Vec<User>>, AppError> {
    let mut conn = state.db.acquire().await?;
    require_admin(&mut conn, &params.admin_email).await?;

    let users = sqlx::query_as::<_, User>(
        "SELECT email, name, profile_pic, role, coins, created_at FROM users ORDER BY created_at DESC",
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(Json(users))
}

/// PUT /admin/users/:email/role - Change a user's role.
async fn update_role(
    State(state): State<AppState>,
    Path(email): Path<String>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<Json<Value>, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let mut conn = state.db.acquire().await?;
    require_admin(&mut conn, &payload.admin_email).await?;

    let result = sqlx::query("UPDATE users SET role = $1 WHERE email = $2")
        .bind(payload.role)
        .bind(&email)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User".to_string()));
    }

    cache::invalidate(DASHBOARD_CACHE_KEY);

    Ok(Json(json!({ "success": true })))
}

/// DELETE /admin/users/:email - Remove a user. Their tasks, submissions, and
/// withdrawals cascade.
async fn delete_user(
    State(state): State<AppState>,
    Path(email): Path<String>,
    Json(payload): Json<AdminActionRequest>,
) -> Result<Json<Value>, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    if email == payload.admin_email {
        return Err(AppError::Validation(
            "admins cannot delete their own account".to_string(),
        ));
    }

    let mut conn = state.db.acquire().await?;
    require_admin(&mut conn, &payload.admin_email).await?;

    let result = sqlx::query("DELETE FROM users WHERE email = $1")
        .bind(&email)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User".to_string()));
    }

    cache::invalidate(DASHBOARD_CACHE_KEY);

    tracing::info!("User {} deleted by admin {}", email, payload.admin_email);

    Ok(Json(json!({ "success": true })))
}

/// GET /admin/tasks - All tasks, newest first.
async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<AdminQuery>,
) -> Result<Json<Vec<Task>>, AppError> {
    let mut conn = state.db.acquire().await?;
    require_admin(&mut conn, &params.admin_email).await?;

    let tasks = sqlx::query_as::<_, Task>(
        r#"
        SELECT id, title, detail, submission_info, image_url, buyer_email,
               required_workers, payable_amount, total_payable, deadline, status, created_at
        FROM tasks
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(Json(tasks))
}

/// DELETE /admin/tasks/:id - Remove a task, refunding the buyer's unconsumed
/// escrow (same path as the buyer-initiated delete, minus the ownership check).
async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdminActionRequest>,
) -> Result<Json<Value>, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    {
        let mut conn = state.db.acquire().await?;
        require_admin(&mut conn, &payload.admin_email).await?;
    }

    let refunded = tasks::delete_with_refund(&state.db, id, None).await?;

    cache::invalidate(DASHBOARD_CACHE_KEY);

    Ok(Json(json!({ "success": true, "refunded": refunded })))
}

/// GET /admin/withdrawals/pending - The admin's payout queue.
async fn pending_withdrawals(
    State(state): State<AppState>,
    Query(params): Query<AdminQuery>,
) -> Result<Json<Vec<PendingWithdrawalRow>>, AppError> {
    let mut conn = state.db.acquire().await?;
    require_admin(&mut conn, &params.admin_email).await?;

    let rows = sqlx::query_as::<_, PendingWithdrawalRow>(
        r#"
        SELECT w.id, w.worker_email, w.coin_amount, w.dollar_amount, w.payment_system,
               w.account_number, w.status, w.created_at,
               u.name AS worker_name
        FROM withdrawals w
        JOIN users u ON u.email = w.worker_email
        WHERE w.status = 'pending'
        ORDER BY w.created_at ASC
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(Json(rows))
}

/// PUT /admin/withdrawals/:id/approve - Approve a payout.
///
/// The coins were already debited at request time, so there is no ledger
/// effect; this is the point where the off-system transfer happens.
pub async fn approve_withdrawal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdminActionRequest>,
) -> Result<Json<Value>, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let mut tx = state.db.begin().await?;

    require_admin(&mut tx, &payload.admin_email).await?;

    let row = sqlx::query(
        r#"
        UPDATE withdrawals SET status = 'approved'
        WHERE id = $1 AND status = 'pending'
        RETURNING worker_email, coin_amount
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| withdrawal_not_pending())?;

    let worker_email: String = row.get("worker_email");
    let coin_amount: i64 = row.get("coin_amount");

    notifications::push(
        &mut tx,
        &worker_email,
        &format!("Your withdrawal of {} coins was approved", coin_amount),
        Some("/dashboard/withdrawals"),
    )
    .await?;

    tx.commit().await?;

    cache::invalidate(DASHBOARD_CACHE_KEY);

    tracing::info!("Withdrawal {} approved for {}", id, worker_email);

    Ok(Json(json!({ "success": true, "status": "approved" })))
}

/// PUT /admin/withdrawals/:id/reject - Reject a payout, reversing the hold.
pub async fn reject_withdrawal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdminActionRequest>,
) -> Result<Json<Value>, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let mut tx = state.db.begin().await?;

    require_admin(&mut tx, &payload.admin_email).await?;

    let row = sqlx::query(
        r#"
        UPDATE withdrawals SET status = 'rejected'
        WHERE id = $1 AND status = 'pending'
        RETURNING worker_email, coin_amount
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| withdrawal_not_pending())?;

    let worker_email: String = row.get("worker_email");
    let coin_amount: i64 = row.get("coin_amount");

    ledger::credit(&mut tx, &worker_email, coin_amount).await?;

    notifications::push(
        &mut tx,
        &worker_email,
        &format!(
            "Your withdrawal of {} coins was rejected; the coins were returned",
            coin_amount
        ),
        Some("/dashboard/withdrawals"),
    )
    .await?;

    tx.commit().await?;

    cache::invalidate(DASHBOARD_CACHE_KEY);

    Ok(Json(json!({ "success": true, "status": "rejected" })))
}

fn withdrawal_not_pending() -> AppError {
    AppError::InvalidTransition("withdrawal is not pending".to_string())
}
