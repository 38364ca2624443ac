use axum::{
    extract::{Query, State},
    response::Json,
    routing::post,
    Router,
};
use serde::Deserialize;
use validator::Validate;

use crate::errors::AppError;
use crate::models::{UpsertUserRequest, User};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(upsert_user).get(get_user))
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub email: String,
}

/// POST /users - Upsert a user record.
///
/// Called on every login. The first call creates the row and grants the
/// role-based signup bonus; later calls only refresh name and avatar. The
/// role is never updated here (only an admin can change it).
async fn upsert_user(
    State(state): State<AppState>,
    Json(payload): Json<UpsertUserRequest>,
) -> Result<Json<User>, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (email, name, profile_pic, role, coins)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET
            name = EXCLUDED.name,
            profile_pic = EXCLUDED.profile_pic
        RETURNING email, name, profile_pic, role, coins, created_at
        "#,
    )
    .bind(&payload.email)
    .bind(&payload.name)
    .bind(&payload.profile_pic)
    .bind(payload.role)
    .bind(payload.role.signup_bonus())
    .fetch_one(&state.db)
    .await
    .map_err(|e| {
        tracing::error!("Failed to upsert user {}: {}", payload.email, e);
        AppError::DatabaseError("Failed to register user".to_string())
    })?;

    Ok(Json(user))
}

/// GET /users?email= - Fetch one user.
async fn get_user(
    State(state): State<AppState>,
    Query(params): Query<UserQuery>,
) -> Result<Json<User>, AppError> {
    let user = sqlx::query_as::<_, User>(
        "SELECT email, name, profile_pic, role, coins, created_at FROM users WHERE email = $1",
    )
    .bind(&params.email)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("User".to_string()))?;

    Ok(Json(user))
}
