// src/routes/connect_routes.rs
//
// Connect-account onboarding for professionals: the processor hosts the
// whole flow, we only hand out links and mirror the account status.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, Role},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/connect/onboarding", post(start_onboarding))
        .route("/connect/status", get(account_status))
}

#[derive(Debug, Serialize)]
pub struct OnboardingDto {
    pub url: String,
    pub account_ref: String,
}

#[derive(Debug, Serialize)]
pub struct ConnectStatusDto {
    pub onboarded: bool,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub details_submitted: bool,
}

fn ensure_professional(auth: &AuthContext) -> Result<(), ApiError> {
    match auth.role() {
        Role::Professional(_) => Ok(()),
        Role::Client => Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only professionals receive payouts".into(),
        )),
    }
}

pub async fn start_onboarding(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<OnboardingDto>>, ApiError> {
    ensure_professional(&auth)?;

    let existing: Option<String> = sqlx::query_scalar(
        r#"SELECT connect_account_ref FROM rider WHERE user_id = $1"#,
    )
    .bind(auth.user_id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let link = state
        .payments
        .create_onboarding_link(existing.as_deref(), auth.user_id)
        .await?;

    if existing.is_none() {
        sqlx::query(r#"UPDATE rider SET connect_account_ref = $2 WHERE user_id = $1"#)
            .bind(auth.user_id)
            .bind(&link.account_ref)
            .execute(&state.db)
            .await
            .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;
    }

    tracing::info!(user_id = %auth.user_id, account_ref = %link.account_ref, "onboarding link issued");

    Ok(Json(ApiOk {
        data: OnboardingDto {
            url: link.url,
            account_ref: link.account_ref,
        },
    }))
}

pub async fn account_status(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<ConnectStatusDto>>, ApiError> {
    ensure_professional(&auth)?;

    let account_ref: Option<String> = sqlx::query_scalar(
        r#"SELECT connect_account_ref FROM rider WHERE user_id = $1"#,
    )
    .bind(auth.user_id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let dto = match account_ref {
        None => ConnectStatusDto {
            onboarded: false,
            charges_enabled: false,
            payouts_enabled: false,
            details_submitted: false,
        },
        Some(account_ref) => {
            let status = state.payments.account_status(&account_ref).await?;
            ConnectStatusDto {
                onboarded: true,
                charges_enabled: status.charges_enabled,
                payouts_enabled: status.payouts_enabled,
                details_submitted: status.details_submitted,
            }
        }
    };

    Ok(Json(ApiOk { data: dto }))
}
