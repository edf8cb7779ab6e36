mod ai;
mod auth;
mod config;
mod middleware;
mod payments;

mod db;
mod error;
mod lifecycle;
mod models;
mod routes;

use std::sync::Arc;

use crate::{ai::AssistantClient, config::Config, models::AppState, payments::HttpPaymentProvider};

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::header;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;
    let pool = db::connect_pg(&cfg.database_url).await?;

    let state = AppState {
        db: pool,
        session_ttl_hours: cfg.session_ttl_hours,
        payments: Arc::new(HttpPaymentProvider::new(
            &cfg.payment_api_base,
            &cfg.payment_secret_key,
            &cfg.payment_webhook_secret,
            &cfg.checkout_return_url,
        )?),
        assistant: Arc::new(AssistantClient::new(
            &cfg.assistant_api_base,
            &cfg.assistant_api_key,
            &cfg.assistant_model,
        )?),
    };

    // Allow the browser frontend (separate origin in dev) to call the API.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
