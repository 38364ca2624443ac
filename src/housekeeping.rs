//! Best-effort background job that closes overdue tasks. Not safety-critical:
//! every run is a normal transaction per task, so a crash mid-sweep leaves
//! nothing half-applied.

use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::handlers::notifications;
use crate::ledger;
use crate::models::unconsumed_escrow;

const SWEEP_INTERVAL: Duration = Duration::from_secs(600);

pub fn spawn(pool: PgPool) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            match close_overdue_tasks(&pool).await {
                Ok(0) => {}
                Ok(closed) => info!("Housekeeping: closed {} overdue tasks", closed),
                Err(e) => warn!("Housekeeping sweep failed: {}", e),
            }
        }
    });
}

/// Mark overdue active tasks completed and refund their unconsumed escrow.
pub async fn close_overdue_tasks(pool: &PgPool) -> Result<u64, AppError> {
    let overdue = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM tasks WHERE status = 'active' AND deadline < CURRENT_DATE",
    )
    .fetch_all(pool)
    .await?;

    let mut closed = 0u64;
    for task_id in overdue {
        match close_one(pool, task_id).await {
            Ok(true) => closed += 1,
            Ok(false) => {}
            Err(e) => warn!("Failed to close overdue task {}: {}", task_id, e),
        }
    }

    Ok(closed)
}

#[derive(Debug, sqlx::FromRow)]
struct OverdueTask {
    buyer_email: String,
    title: String,
    payable_amount: i64,
    total_payable: i64,
}

async fn close_one(pool: &PgPool, task_id: Uuid) -> Result<bool, AppError> {
    let mut tx = pool.begin().await?;

    // Re-check under the lock: the task may have been deleted or completed
    // since the sweep query ran.
    let task = sqlx::query_as::<_, OverdueTask>(
        r#"
        SELECT buyer_email, title, payable_amount, total_payable
        FROM tasks
        WHERE id = $1 AND status = 'active' AND deadline < CURRENT_DATE
        FOR UPDATE
        "#,
    )
    .bind(task_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(task) = task else {
        return Ok(false);
    };

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

    // The refund returns the escrow backing every unapproved slot, so any
    // still-pending submission must be closed out with it; approving one
    // later would pay coins the task no longer holds.
    let rejected_workers = sqlx::query_scalar::<_, String>(
        r#"
        UPDATE submissions SET status = 'rejected'
        WHERE task_id = $1 AND status = 'pending'
        RETURNING worker_email
        "#,
    )
    .bind(task_id)
    .fetch_all(&mut *tx)
    .await?;

    for worker_email in &rejected_workers {
        notifications::push(
            &mut tx,
            worker_email,
            &format!(
                "The task \"{}\" closed at its deadline before your submission was reviewed",
                task.title
            ),
            Some("/dashboard/my-submissions"),
        )
        .await?;
    }

    sqlx::query("UPDATE tasks SET status = 'completed' WHERE id = $1")
        .bind(task_id)
        .execute(&mut *tx)
        .await?;

    notifications::push(
        &mut tx,
        &task.buyer_email,
        &format!(
            "Your task \"{}\" passed its deadline and was closed; {} unused escrow coins were returned",
            task.title, refund
        ),
        Some("/dashboard/my-tasks"),
    )
    .await?;

    tx.commit().await?;

    Ok(true)
}
