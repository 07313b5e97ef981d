use std::sync::Arc;

use dotenvy::dotenv;
use tokio::net::TcpListener;

use startline::auth::{TokenService, WebhookVerifier};
use startline::config::Config;
use startline::db::PgGateway;
use startline::routes::create_routes;
use startline::state::AppState;

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "startline=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env().expect("Invalid configuration");

    let gateway = PgGateway::connect(&config.database_url, config.max_connections)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Successfully connected to database");

    sqlx::migrate!()
        .run(gateway.pool())
        .await
        .expect("Failed to run migrations");
    tracing::info!("Migrations run successfully");

    let tokens = TokenService::new(&config.jwt_secret, config.access_ttl, config.refresh_ttl);
    let webhooks = WebhookVerifier::new(config.webhook_secret);
    let state = AppState::new(Arc::new(gateway), tokens, webhooks);

    let app = create_routes(state);

    tracing::info!("🚀 Server running at http://{}", config.bind_addr);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
