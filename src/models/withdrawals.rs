use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Workers cannot cash out below this amount.
pub const MIN_WITHDRAWAL_COINS: i64 = 200;

/// Fixed exchange rate: 20 coins = $1.
pub const COINS_PER_DOLLAR: i64 = 20;

/// Dollar value of a coin amount at the fixed exchange rate, rounded to cents.
pub fn coins_to_dollars(coins: i64) -> Decimal {
    (Decimal::from(coins) / Decimal::from(COINS_PER_DOLLAR)).round_dp(2)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "withdrawal_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    pub id: Uuid,
    pub worker_email: String,
    pub coin_amount: i64,
    pub dollar_amount: Decimal,
    pub payment_system: String,
    pub account_number: String,
    pub status: WithdrawalStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateWithdrawalRequest {
    #[validate(email)]
    pub worker_email: String,
    #[validate(range(min = 1))]
    pub coin_amount: i64,
    /// Client-computed figure, re-derived and checked server-side.
    pub dollar_amount: Decimal,
    #[validate(length(min = 1, max = 50))]
    pub payment_system: String,
    #[validate(length(min = 1, max = 100))]
    pub account_number: String,
}

/// A pending withdrawal in the admin queue.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PendingWithdrawalRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub withdrawal: Withdrawal,
    pub worker_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn twenty_coins_is_one_dollar() {
        assert_eq!(coins_to_dollars(20), dec("1.00"));
        assert_eq!(coins_to_dollars(200), dec("10.00"));
    }

    #[test]
    fn conversion_rounds_to_cents() {
        assert_eq!(coins_to_dollars(25), dec("1.25"));
        assert_eq!(coins_to_dollars(21), dec("1.05"));
    }

    #[test]
    fn withdrawal_request_validates_fields() {
        let req = CreateWithdrawalRequest {
            worker_email: "worker@example.com".to_string(),
            coin_amount: 200,
            dollar_amount: dec("10.00"),
            payment_system: "bkash".to_string(),
            account_number: "01700000000".to_string(),
        };
        assert!(req.validate().is_ok());

        let bad = CreateWithdrawalRequest {
            payment_system: String::new(),
            ..req
        };
        assert!(bad.validate().is_err());
    }
}
