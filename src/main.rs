use axum::{http::StatusCode, response::Json, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use earnzy_backend::handlers::{
    admin, notifications, payments, submissions, tasks, uploads, users, withdrawals, worker,
};
use earnzy_backend::{database, housekeeping, middleware, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with reduced SQL verbosity
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(EnvFilter::new("earnzy_backend=info,sqlx=warn,info"))
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = database::create_pool(&database_url)
        .await
        .expect("Failed to connect to PostgreSQL");

    // Run migrations (can be disabled via env var)
    let skip_migrations = std::env::var("SKIP_MIGRATIONS")
        .map(|v| v.to_lowercase() == "true" || v == "1")
        .unwrap_or(false);

    if skip_migrations {
        warn!("Skipping migrations due to SKIP_MIGRATIONS=true");
    } else {
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Migrations completed successfully");
    }

    let state = AppState { db: pool.clone() };

    // CORS - permissive for development, origin list for production
    let is_development = std::env::var("DEBUG_MODE").unwrap_or_default() == "true";

    let cors = if is_development {
        info!("Development mode: using permissive CORS");
        CorsLayer::new().allow_origin(Any).allow_credentials(false)
    } else {
        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "https://earnzy.app,https://www.earnzy.app".to_string());

        let origins: Result<Vec<_>, _> = allowed_origins
            .split(',')
            .map(|origin| origin.trim().parse())
            .collect();

        match origins {
            Ok(parsed_origins) => {
                info!("CORS configured for origins: {}", allowed_origins);
                CorsLayer::new()
                    .allow_origin(parsed_origins)
                    .allow_credentials(true)
            }
            Err(e) => {
                warn!("Failed to parse ALLOWED_ORIGINS ({}), using permissive CORS", e);
                CorsLayer::new().allow_origin(Any).allow_credentials(false)
            }
        }
    }
    .allow_methods([
        axum::http::Method::GET,
        axum::http::Method::POST,
        axum::http::Method::PUT,
        axum::http::Method::DELETE,
        axum::http::Method::OPTIONS,
    ])
    .allow_headers([
        axum::http::header::CONTENT_TYPE,
        axum::http::header::AUTHORIZATION,
        axum::http::header::ACCEPT,
    ]);

    // Public endpoints (no auth)
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    // Protected endpoints (bearer-token auth + CORS)
    let protected_routes = Router::new()
        .nest("/users", users::router())
        .nest("/tasks", tasks::router())
        .nest("/submissions", submissions::router())
        .nest("/worker", worker::router())
        .nest("/withdraw", withdrawals::router())
        .nest("/notifications", notifications::router())
        .nest("/admin", admin::router())
        .merge(payments::router())
        .merge(uploads::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(middleware::auth_middleware))
                .layer(cors),
        )
        .with_state(state);

    let app = public_routes.merge(protected_routes);

    // Background sweep for overdue tasks
    housekeeping::spawn(pool);

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "3001".to_string())
        .parse::<u16>()
        .expect("PORT must be a valid number");

    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}")).await?;

    info!("Server starting on http://{}:{}", host, port);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": "earnzy-backend",
        "timestamp": chrono::Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
    })))
}
