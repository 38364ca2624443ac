use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Purchasable coin bundles: (coins, price in cents).
pub const COIN_PACKAGES: &[(i64, i64)] = &[(10, 100), (150, 1000), (500, 2000), (1000, 3500)];

/// Price of a bundle, or None if the requested coin count is not a bundle we
/// sell. Prices live server-side only; the client never sends an amount.
pub fn package_price_cents(coins: i64) -> Option<i64> {
    COIN_PACKAGES
        .iter()
        .find(|(c, _)| *c == coins)
        .map(|(_, cents)| *cents)
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub email: String,
    pub payment_intent_id: String,
    pub coins: i64,
    pub amount_cents: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    #[validate(email)]
    pub email: String,
    pub coins: i64,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub payment_intent_id: String,
    pub coins: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_packages_have_prices() {
        assert_eq!(package_price_cents(10), Some(100));
        assert_eq!(package_price_cents(150), Some(1000));
        assert_eq!(package_price_cents(500), Some(2000));
        assert_eq!(package_price_cents(1000), Some(3500));
    }

    #[test]
    fn arbitrary_coin_counts_are_not_purchasable() {
        assert_eq!(package_price_cents(0), None);
        assert_eq!(package_price_cents(11), None);
        assert_eq!(package_price_cents(-10), None);
    }
}
