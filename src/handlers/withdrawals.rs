use axum::{extract::State, response::Json, routing::post, Router};
use uuid::Uuid;
use validator::Validate;

use crate::errors::AppError;
use crate::ledger;
use crate::models::{
    coins_to_dollars, CreateWithdrawalRequest, Withdrawal, MIN_WITHDRAWAL_COINS,
};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(request_withdrawal))
}

/// POST /withdraw - A worker requests a cash-out.
///
/// The coins are debited immediately (held in escrow pending the admin
/// decision); a rejection credits them back. The dollar figure is re-derived
/// server-side at the fixed exchange rate and must match what the client sent.
pub async fn request_withdrawal(
    State(state): State<AppState>,
    Json(payload): Json<CreateWithdrawalRequest>,
) -> Result<Json<Withdrawal>, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    if payload.coin_amount < MIN_WITHDRAWAL_COINS {
        return Err(AppError::BelowMinimum(MIN_WITHDRAWAL_COINS));
    }

    let dollar_amount = coins_to_dollars(payload.coin_amount);
    if payload.dollar_amount != dollar_amount {
        return Err(AppError::Validation(
            "dollar amount does not match the exchange rate".to_string(),
        ));
    }

    let mut tx = state.db.begin().await?;

    ledger::debit(&mut tx, &payload.worker_email, payload.coin_amount).await?;

    let withdrawal = sqlx::query_as::<_, Withdrawal>(
        r#"
        INSERT INTO withdrawals (id, worker_email, coin_amount, dollar_amount,
                                 payment_system, account_number)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, worker_email, coin_amount, dollar_amount, payment_system,
                  account_number, status, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&payload.worker_email)
    .bind(payload.coin_amount)
    .bind(dollar_amount)
    .bind(&payload.payment_system)
    .bind(&payload.account_number)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        "Withdrawal {} requested: {} coins held for {}",
        withdrawal.id,
        withdrawal.coin_amount,
        withdrawal.worker_email
    );

    Ok(Json(withdrawal))
}
