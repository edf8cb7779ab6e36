// src/routes/subscription_routes.rs
//
// Professional subscriptions (basic/premium) run through the payment
// processor's hosted checkout; the webhook route flips the stored tier
// once the processor confirms.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, OkData, OkResponse, SubscriptionType, UserProfile, UserRow},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/subscription/create-session", post(create_session))
        .route("/subscription/update", post(update_subscription))
        .route("/subscription/cancel", post(cancel_subscription))
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionRequest {
    pub tier: SubscriptionType,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionSessionDto {
    pub checkout_url: String,
    pub session_ref: String,
}

async fn load_rider(state: &AppState, user_id: Uuid) -> Result<UserRow, ApiError> {
    let user: UserRow = sqlx::query_as::<_, UserRow>(
        r#"
        SELECT user_id, email, display_name, password_hash, user_type,
               subscription_type, customer_ref, subscription_ref,
               connect_account_ref, is_active, created_at
        FROM rider
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    .ok_or_else(ApiError::session_expired)?;
    Ok(user)
}

fn ensure_professional(user: &UserRow) -> Result<(), ApiError> {
    if user.user_type.is_professional() {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Subscriptions are for professionals".into(),
        ))
    }
}

pub async fn create_session(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<SubscriptionRequest>,
) -> Result<Json<ApiOk<SubscriptionSessionDto>>, ApiError> {
    let user = load_rider(&state, auth.user_id).await?;
    ensure_professional(&user)?;

    if user.subscription_ref.is_some() {
        return Err(ApiError::Conflict(
            "ALREADY_SUBSCRIBED",
            "An active subscription exists; use update instead".into(),
        ));
    }

    let session = state
        .payments
        .create_subscription_checkout(user.user_id, req.tier, &user.email)
        .await?;

    tracing::info!(user_id = %user.user_id, tier = ?req.tier, "subscription checkout created");

    Ok(Json(ApiOk {
        data: SubscriptionSessionDto {
            checkout_url: session.url,
            session_ref: session.session_ref,
        },
    }))
}

pub async fn update_subscription(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<SubscriptionRequest>,
) -> Result<Json<ApiOk<UserProfile>>, ApiError> {
    let user = load_rider(&state, auth.user_id).await?;
    ensure_professional(&user)?;

    let Some(subscription_ref) = user.subscription_ref.as_deref() else {
        return Err(ApiError::validation("no active subscription to update"));
    };

    state
        .payments
        .update_subscription(subscription_ref, req.tier)
        .await?;

    let updated: UserRow = sqlx::query_as::<_, UserRow>(
        r#"
        UPDATE rider
        SET subscription_type = $2
        WHERE user_id = $1
        RETURNING user_id, email, display_name, password_hash, user_type,
                  subscription_type, customer_ref, subscription_ref,
                  connect_account_ref, is_active, created_at
        "#,
    )
    .bind(auth.user_id)
    .bind(req.tier)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    tracing::info!(user_id = %auth.user_id, tier = ?req.tier, "subscription updated");

    Ok(Json(ApiOk {
        data: updated.into(),
    }))
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<OkResponse>, ApiError> {
    let user = load_rider(&state, auth.user_id).await?;

    let Some(subscription_ref) = user.subscription_ref.as_deref() else {
        return Err(ApiError::validation("no active subscription to cancel"));
    };

    state.payments.cancel_subscription(subscription_ref).await?;

    sqlx::query(
        r#"
        UPDATE rider
        SET subscription_type = NULL, subscription_ref = NULL
        WHERE user_id = $1
        "#,
    )
    .bind(auth.user_id)
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    tracing::info!(user_id = %auth.user_id, "subscription cancelled");

    Ok(Json(OkResponse {
        data: OkData { ok: true },
    }))
}
