use crate::models::AppState;
use axum::Router;

pub mod ai_routes;
pub mod appointment_routes;
pub mod auth_routes;
pub mod connect_routes;
pub mod connection_routes;
pub mod horse_routes;
pub mod message_routes;
pub mod payment_routes;
pub mod record_routes;
pub mod review_routes;
pub mod subscription_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/auth", auth_routes::router())
        .nest("/api", horse_routes::router())
        .nest("/api", record_routes::router())
        .nest("/api", appointment_routes::router())
        .nest("/api", connection_routes::router())
        .nest("/api", message_routes::router())
        .nest("/api", review_routes::router())
        .nest("/api", ai_routes::router())
        .nest("/api", subscription_routes::router())
        .nest("/api", connect_routes::router())
        .nest("/api", payment_routes::router())
        .with_state(state)
}
