//! The coin ledger. The only module allowed to touch `users.coins`.
//!
//! Every other workflow (tasks, submissions, withdrawals, payments) calls
//! `credit`/`debit` inside its own transaction so the balance change commits
//! atomically with the entity change it belongs to.

use sqlx::PgConnection;

use crate::errors::AppError;

/// Increase a user's balance. Idempotency is the caller's responsibility.
pub async fn credit(conn: &mut PgConnection, email: &str, amount: i64) -> Result<i64, AppError> {
    if amount <= 0 {
        return Err(AppError::InvalidAmount);
    }

    let balance = sqlx::query_scalar::<_, i64>(
        "UPDATE users SET coins = coins + $1 WHERE email = $2 RETURNING coins",
    )
    .bind(amount)
    .bind(email)
    .fetch_optional(&mut *conn)
    .await?;

    balance.ok_or_else(|| AppError::NotFound("User".to_string()))
}

/// Decrease a user's balance. The conditional update takes a row lock on the
/// user, so two concurrent debits against the same balance serialize and the
/// second one sees the reduced balance (two near-limit task creations cannot
/// both pass the affordability check).
pub async fn debit(conn: &mut PgConnection, email: &str, amount: i64) -> Result<i64, AppError> {
    if amount <= 0 {
        return Err(AppError::InvalidAmount);
    }

    let balance = sqlx::query_scalar::<_, i64>(
        "UPDATE users SET coins = coins - $1 WHERE email = $2 AND coins >= $1 RETURNING coins",
    )
    .bind(amount)
    .bind(email)
    .fetch_optional(&mut *conn)
    .await?;

    match balance {
        Some(balance) => Ok(balance),
        None => {
            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)",
            )
            .bind(email)
            .fetch_one(&mut *conn)
            .await?;

            if exists {
                Err(AppError::InsufficientBalance)
            } else {
                Err(AppError::NotFound("User".to_string()))
            }
        }
    }
}
