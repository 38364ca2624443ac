use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Worker,
    Buyer,
    Admin,
}

impl UserRole {
    /// Coins granted on first registration.
    pub fn signup_bonus(self) -> i64 {
        match self {
            UserRole::Worker => 10,
            UserRole::Buyer => 50,
            UserRole::Admin => 0,
        }
    }
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub email: String,
    pub name: String,
    pub profile_pic: Option<String>,
    pub role: UserRole,
    pub coins: i64,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /users`. Sent on every login, so it is an upsert: the first
/// call creates the row (with the role's signup bonus), later calls refresh
/// name and avatar only.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpsertUserRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub profile_pic: Option<String>,
    pub role: UserRole,
}

/// Body of admin mutations that carry no other payload (deletes, withdrawal
/// approve/reject). The acting admin identifies themselves; the handler
/// checks the role against the database.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AdminActionRequest {
    #[validate(email)]
    pub admin_email: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoleRequest {
    #[validate(email)]
    pub admin_email: String,
    pub role: UserRole,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signup_bonus_by_role() {
        assert_eq!(UserRole::Worker.signup_bonus(), 10);
        assert_eq!(UserRole::Buyer.signup_bonus(), 50);
        assert_eq!(UserRole::Admin.signup_bonus(), 0);
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&UserRole::Buyer).unwrap(), "\"buyer\"");
        let role: UserRole = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, UserRole::Admin);
    }

    #[test]
    fn upsert_request_rejects_bad_email() {
        let req = UpsertUserRequest {
            email: "not-an-email".to_string(),
            name: "Test".to_string(),
            profile_pic: None,
            role: UserRole::Worker,
        };
        assert!(req.validate().is_err());
    }
}
