//! End-to-end escrow lifecycle scenarios against a real Postgres instance.
//! `#[sqlx::test]` provisions an isolated database per test and applies the
//! crate's migrations, so every run starts from an empty schema.

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use earnzy_backend::errors::AppError;
use earnzy_backend::handlers::{admin, submissions, tasks, withdrawals};
use earnzy_backend::housekeeping;
use earnzy_backend::models::{
    coins_to_dollars, AdminActionRequest, CreateSubmissionRequest, CreateTaskRequest,
    CreateWithdrawalRequest, DeleteTaskRequest, Submission, SubmissionActionRequest,
    SubmissionStatus, Task, TaskStatus, UserRole, WithdrawalStatus,
};
use earnzy_backend::AppState;

fn state(pool: &PgPool) -> State<AppState> {
    State(AppState { db: pool.clone() })
}

async fn seed_user(pool: &PgPool, email: &str, role: UserRole, coins: i64) {
    sqlx::query("INSERT INTO users (email, name, role, coins) VALUES ($1, $2, $3, $4)")
        .bind(email)
        .bind(email.split('@').next().unwrap())
        .bind(role)
        .bind(coins)
        .execute(pool)
        .await
        .unwrap();
}

async fn balance(pool: &PgPool, email: &str) -> i64 {
    sqlx::query_scalar("SELECT coins FROM users WHERE email = $1")
        .bind(email)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn task_status(pool: &PgPool, id: Uuid) -> TaskStatus {
    sqlx::query_scalar("SELECT status FROM tasks WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn submission_status(pool: &PgPool, id: Uuid) -> SubmissionStatus {
    sqlx::query_scalar("SELECT status FROM submissions WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

fn task_request(buyer: &str, required_workers: i32, payable_amount: i64) -> CreateTaskRequest {
    CreateTaskRequest {
        buyer_email: buyer.to_string(),
        title: "Watch my video".to_string(),
        detail: "Watch the full video and leave a comment".to_string(),
        submission_info: "Screenshot of your comment".to_string(),
        image_url: None,
        required_workers,
        payable_amount,
        deadline: Utc::now().date_naive() + chrono::Duration::days(7),
    }
}

async fn create_task(
    pool: &PgPool,
    buyer: &str,
    required_workers: i32,
    payable_amount: i64,
) -> Result<Task, AppError> {
    tasks::create_task(state(pool), Json(task_request(buyer, required_workers, payable_amount)))
        .await
        .map(|json| json.0)
}

async fn submit(pool: &PgPool, worker: &str, task_id: Uuid) -> Result<Submission, AppError> {
    submissions::submit_work(
        state(pool),
        Json(CreateSubmissionRequest {
            task_id,
            worker_email: worker.to_string(),
            details: "done, see screenshot".to_string(),
        }),
    )
    .await
    .map(|json| json.0)
}

async fn approve(pool: &PgPool, buyer: &str, submission_id: Uuid) -> Result<(), AppError> {
    submissions::approve_submission(
        state(pool),
        Path(submission_id),
        Json(SubmissionActionRequest {
            buyer_email: buyer.to_string(),
        }),
    )
    .await
    .map(|_| ())
}

/// Force a task's deadline into the past, simulating time passing.
async fn backdate(pool: &PgPool, task_id: Uuid) {
    sqlx::query("UPDATE tasks SET deadline = CURRENT_DATE - 1 WHERE id = $1")
        .bind(task_id)
        .execute(pool)
        .await
        .unwrap();
}

#[sqlx::test]
async fn task_creation_debits_escrow_and_blocks_overdraft(pool: PgPool) {
    seed_user(&pool, "buyer@example.com", UserRole::Buyer, 100).await;

    let task = create_task(&pool, "buyer@example.com", 5, 20).await.unwrap();
    assert_eq!(task.total_payable, 100);
    assert_eq!(balance(&pool, "buyer@example.com").await, 0);

    // A second near-limit creation must fail outright and change nothing.
    let err = create_task(&pool, "buyer@example.com", 1, 1).await.unwrap_err();
    assert!(matches!(err, AppError::InsufficientBalance));
    assert_eq!(balance(&pool, "buyer@example.com").await, 0);
    let task_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(task_count, 1);
}

#[sqlx::test]
async fn approval_pays_worker_exactly_once_and_completes_task(pool: PgPool) {
    seed_user(&pool, "buyer@example.com", UserRole::Buyer, 100).await;
    seed_user(&pool, "worker@example.com", UserRole::Worker, 0).await;
    seed_user(&pool, "late@example.com", UserRole::Worker, 0).await;

    let task = create_task(&pool, "buyer@example.com", 1, 20).await.unwrap();
    let submission = submit(&pool, "worker@example.com", task.id).await.unwrap();

    approve(&pool, "buyer@example.com", submission.id).await.unwrap();
    assert_eq!(balance(&pool, "worker@example.com").await, 20);
    assert_eq!(task_status(&pool, task.id).await, TaskStatus::Completed);

    // Replaying the approval must not pay twice.
    let err = approve(&pool, "buyer@example.com", submission.id).await.unwrap_err();
    assert!(matches!(err, AppError::CapacityExceeded | AppError::InvalidTransition(_)));
    assert_eq!(balance(&pool, "worker@example.com").await, 20);

    // The task is closed to further work.
    let err = submit(&pool, "late@example.com", task.id).await.unwrap_err();
    assert!(matches!(err, AppError::TaskNotActive));
}

#[sqlx::test]
async fn rejection_moves_no_coins_and_allows_resubmission(pool: PgPool) {
    seed_user(&pool, "buyer@example.com", UserRole::Buyer, 100).await;
    seed_user(&pool, "worker@example.com", UserRole::Worker, 0).await;

    let task = create_task(&pool, "buyer@example.com", 5, 20).await.unwrap();
    let submission = submit(&pool, "worker@example.com", task.id).await.unwrap();

    // A live submission blocks a duplicate.
    let err = submit(&pool, "worker@example.com", task.id).await.unwrap_err();
    assert!(matches!(err, AppError::AlreadySubmitted));

    submissions::reject_submission(
        state(&pool),
        Path(submission.id),
        Json(SubmissionActionRequest {
            buyer_email: "buyer@example.com".to_string(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(submission_status(&pool, submission.id).await, SubmissionStatus::Rejected);
    assert_eq!(balance(&pool, "worker@example.com").await, 0);
    assert_eq!(balance(&pool, "buyer@example.com").await, 0);

    // A rejected submission does not block trying again.
    submit(&pool, "worker@example.com", task.id).await.unwrap();
}

#[sqlx::test]
async fn deleting_a_task_refunds_only_unconsumed_escrow(pool: PgPool) {
    seed_user(&pool, "buyer@example.com", UserRole::Buyer, 100).await;
    seed_user(&pool, "worker@example.com", UserRole::Worker, 0).await;

    let task = create_task(&pool, "buyer@example.com", 5, 20).await.unwrap();
    let submission = submit(&pool, "worker@example.com", task.id).await.unwrap();
    approve(&pool, "buyer@example.com", submission.id).await.unwrap();

    tasks::delete_task(
        state(&pool),
        Path(task.id),
        Json(DeleteTaskRequest {
            buyer_email: "buyer@example.com".to_string(),
        }),
    )
    .await
    .unwrap();

    // 100 escrowed, 20 paid out: exactly 80 comes back.
    assert_eq!(balance(&pool, "buyer@example.com").await, 80);
    assert_eq!(balance(&pool, "worker@example.com").await, 20);
}

#[sqlx::test]
async fn withdrawal_request_then_reject_is_net_zero(pool: PgPool) {
    seed_user(&pool, "worker@example.com", UserRole::Worker, 250).await;
    seed_user(&pool, "admin@example.com", UserRole::Admin, 0).await;

    let withdrawal = withdrawals::request_withdrawal(
        state(&pool),
        Json(CreateWithdrawalRequest {
            worker_email: "worker@example.com".to_string(),
            coin_amount: 200,
            dollar_amount: coins_to_dollars(200),
            payment_system: "bkash".to_string(),
            account_number: "01700000000".to_string(),
        }),
    )
    .await
    .unwrap()
    .0;

    assert_eq!(withdrawal.status, WithdrawalStatus::Pending);
    assert_eq!(balance(&pool, "worker@example.com").await, 50);

    admin::reject_withdrawal(
        state(&pool),
        Path(withdrawal.id),
        Json(AdminActionRequest {
            admin_email: "admin@example.com".to_string(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(balance(&pool, "worker@example.com").await, 250);
    let status: WithdrawalStatus =
        sqlx::query_scalar("SELECT status FROM withdrawals WHERE id = $1")
            .bind(withdrawal.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, WithdrawalStatus::Rejected);
}

#[sqlx::test]
async fn withdrawal_approval_keeps_the_hold(pool: PgPool) {
    seed_user(&pool, "worker@example.com", UserRole::Worker, 250).await;
    seed_user(&pool, "admin@example.com", UserRole::Admin, 0).await;

    let withdrawal = withdrawals::request_withdrawal(
        state(&pool),
        Json(CreateWithdrawalRequest {
            worker_email: "worker@example.com".to_string(),
            coin_amount: 200,
            dollar_amount: coins_to_dollars(200),
            payment_system: "bkash".to_string(),
            account_number: "01700000000".to_string(),
        }),
    )
    .await
    .unwrap()
    .0;

    admin::approve_withdrawal(
        state(&pool),
        Path(withdrawal.id),
        Json(AdminActionRequest {
            admin_email: "admin@example.com".to_string(),
        }),
    )
    .await
    .unwrap();

    // The coins left at request time; approval pays out off-system.
    assert_eq!(balance(&pool, "worker@example.com").await, 50);

    // Approved is terminal: a second decision must not double-refund.
    let err = admin::reject_withdrawal(
        state(&pool),
        Path(withdrawal.id),
        Json(AdminActionRequest {
            admin_email: "admin@example.com".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));
    assert_eq!(balance(&pool, "worker@example.com").await, 50);
}

#[sqlx::test]
async fn deadline_close_rejects_pending_work_and_blocks_late_approval(pool: PgPool) {
    seed_user(&pool, "buyer@example.com", UserRole::Buyer, 100).await;
    seed_user(&pool, "worker@example.com", UserRole::Worker, 0).await;

    let task = create_task(&pool, "buyer@example.com", 5, 20).await.unwrap();
    let submission = submit(&pool, "worker@example.com", task.id).await.unwrap();

    backdate(&pool, task.id).await;
    let closed = housekeeping::close_overdue_tasks(&pool).await.unwrap();
    assert_eq!(closed, 1);

    // Nothing was approved, so the whole escrow comes back and the pending
    // submission is closed out with the task.
    assert_eq!(balance(&pool, "buyer@example.com").await, 100);
    assert_eq!(task_status(&pool, task.id).await, TaskStatus::Completed);
    assert_eq!(submission_status(&pool, submission.id).await, SubmissionStatus::Rejected);

    // Approving after the close must not mint coins the task no longer holds.
    let err = approve(&pool, "buyer@example.com", submission.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));
    assert_eq!(balance(&pool, "worker@example.com").await, 0);
    assert_eq!(balance(&pool, "buyer@example.com").await, 100);
}

#[sqlx::test]
async fn overdue_task_stops_accepting_work_before_the_sweep(pool: PgPool) {
    seed_user(&pool, "buyer@example.com", UserRole::Buyer, 100).await;
    seed_user(&pool, "worker@example.com", UserRole::Worker, 0).await;

    let task = create_task(&pool, "buyer@example.com", 5, 20).await.unwrap();
    backdate(&pool, task.id).await;

    // Still 'active' in the table, but past its deadline: closed to new work.
    let err = submit(&pool, "worker@example.com", task.id).await.unwrap_err();
    assert!(matches!(err, AppError::TaskNotActive));
}

#[sqlx::test]
async fn deadline_close_refunds_only_unapproved_slots(pool: PgPool) {
    seed_user(&pool, "buyer@example.com", UserRole::Buyer, 100).await;
    seed_user(&pool, "worker@example.com", UserRole::Worker, 0).await;

    let task = create_task(&pool, "buyer@example.com", 5, 20).await.unwrap();
    let submission = submit(&pool, "worker@example.com", task.id).await.unwrap();
    approve(&pool, "buyer@example.com", submission.id).await.unwrap();

    backdate(&pool, task.id).await;
    housekeeping::close_overdue_tasks(&pool).await.unwrap();

    // One slot consumed: 80 back to the buyer, 20 stays with the worker.
    assert_eq!(balance(&pool, "buyer@example.com").await, 80);
    assert_eq!(balance(&pool, "worker@example.com").await, 20);
}
