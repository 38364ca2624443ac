pub mod cache;
pub mod database;
pub mod errors;
pub mod handlers;
pub mod housekeeping;
pub mod ledger;
pub mod middleware;
pub mod models;

use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
}
