use axum::{extract::State, response::Json, routing::post, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use crate::errors::AppError;
use crate::ledger;
use crate::models::{package_price_cents, ConfirmPaymentRequest, CreateIntentRequest};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create-payment-intent", post(create_payment_intent))
        .route("/confirm-payment", post(confirm_payment))
}

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

fn stripe_secret_key() -> Result<String, AppError> {
    std::env::var("STRIPE_SECRET_KEY")
        .map_err(|_| AppError::Upstream("payment provider is not configured".to_string()))
}

#[derive(Debug, Deserialize)]
struct StripeIntent {
    id: String,
    client_secret: Option<String>,
    status: String,
    amount_received: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: Option<String>,
}

/// POST /create-payment-intent - Start a coin purchase.
///
/// The price comes from the server-side package table; the client only names
/// the coin bundle it wants.
async fn create_payment_intent(
    State(_state): State<AppState>,
    Json(payload): Json<CreateIntentRequest>,
) -> Result<Json<Value>, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let amount_cents = package_price_cents(payload.coins)
        .ok_or_else(|| AppError::Validation("unknown coin package".to_string()))?;

    let secret_key = stripe_secret_key()?;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{STRIPE_API_BASE}/payment_intents"))
        .basic_auth(&secret_key, None::<&str>)
        .form(&[
            ("amount", amount_cents.to_string()),
            ("currency", "usd".to_string()),
            ("metadata[email]", payload.email.clone()),
            ("metadata[coins]", payload.coins.to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ])
        .send()
        .await
        .map_err(|e| AppError::Upstream(format!("payment provider unreachable: {e}")))?;

    if !response.status().is_success() {
        let message = response
            .json::<StripeError>()
            .await
            .ok()
            .and_then(|e| e.error.message)
            .unwrap_or_else(|| "payment intent creation failed".to_string());
        return Err(AppError::Upstream(message));
    }

    let intent: StripeIntent = response
        .json()
        .await
        .map_err(|e| AppError::Upstream(format!("invalid payment provider response: {e}")))?;

    Ok(Json(json!({
        "paymentIntentId": intent.id,
        "clientSecret": intent.client_secret,
    })))
}

/// POST /confirm-payment - Credit coins after the provider confirms payment.
///
/// Idempotent on the payment intent id: replaying the call records nothing
/// and credits nothing the second time.
async fn confirm_payment(
    State(state): State<AppState>,
    Json(payload): Json<ConfirmPaymentRequest>,
) -> Result<Json<Value>, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let amount_cents = package_price_cents(payload.coins)
        .ok_or_else(|| AppError::Validation("unknown coin package".to_string()))?;

    let secret_key = stripe_secret_key()?;
    let client = reqwest::Client::new();

    let response = client
        .get(format!(
            "{STRIPE_API_BASE}/payment_intents/{}",
            payload.payment_intent_id
        ))
        .basic_auth(&secret_key, None::<&str>)
        .send()
        .await
        .map_err(|e| AppError::Upstream(format!("payment provider unreachable: {e}")))?;

    if !response.status().is_success() {
        return Err(AppError::Upstream(
            "payment intent could not be retrieved".to_string(),
        ));
    }

    let intent: StripeIntent = response
        .json()
        .await
        .map_err(|e| AppError::Upstream(format!("invalid payment provider response: {e}")))?;

    if intent.status != "succeeded" {
        return Err(AppError::Validation(format!(
            "payment has not succeeded (status: {})",
            intent.status
        )));
    }
    if intent.amount_received != Some(amount_cents) {
        return Err(AppError::Validation(
            "paid amount does not match the coin package".to_string(),
        ));
    }

    let mut tx = state.db.begin().await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO payments (id, email, payment_intent_id, coins, amount_cents)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (payment_intent_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&payload.email)
    .bind(&intent.id)
    .bind(payload.coins)
    .bind(amount_cents)
    .execute(&mut *tx)
    .await?;

    let credited = inserted.rows_affected() == 1;
    let mut balance = None;
    if credited {
        balance = Some(ledger::credit(&mut tx, &payload.email, payload.coins).await?);
    }

    tx.commit().await?;

    if credited {
        tracing::info!(
            "Payment {} confirmed: {} coins credited to {}",
            intent.id,
            payload.coins,
            payload.email
        );
    }

    Ok(Json(json!({
        "success": true,
        "credited": credited,
        "coins": payload.coins,
        "balance": balance,
    })))
}
