// src/routes/auth_routes.rs

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};

use crate::{
    auth::{generate_access_token, hash_access_token, hash_password, session_expiry, verify_password},
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::*,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/session", get(session))
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    let e = email.trim();
    if e.is_empty() || !e.contains('@') || e.len() > 254 {
        return Err(ApiError::validation("a valid email address is required"));
    }
    Ok(())
}

fn validate_password(pw: &str) -> Result<(), ApiError> {
    if pw.trim().len() < 8 {
        return Err(ApiError::validation("password must be at least 8 characters"));
    }
    Ok(())
}

fn validate_display_name(name: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::validation("display_name is required"));
    }
    Ok(())
}

async fn create_session(
    state: &AppState,
    user: &UserRow,
    device_name: Option<&str>,
    remember_me: bool,
) -> Result<(String, SessionTokenRow), ApiError> {
    let access_token = generate_access_token();
    let token_hash = hash_access_token(&access_token);

    let ttl_hours = if remember_me {
        24 * 7
    } else {
        state.session_ttl_hours
    };
    let expires_at = session_expiry(ttl_hours);

    let session: SessionTokenRow = sqlx::query_as::<_, SessionTokenRow>(
        r#"
        INSERT INTO session_token (user_id, session_token_hash, device_name, expires_at)
        VALUES ($1, $2, $3, $4)
        RETURNING session_token_id, expires_at
        "#,
    )
    .bind(user.user_id)
    .bind(&token_hash)
    .bind(device_name)
    .bind(expires_at)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok((access_token, session))
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    validate_email(&req.email)?;
    validate_password(&req.password)?;
    validate_display_name(&req.display_name)?;

    let email = req.email.trim().to_lowercase();
    let display_name = req.display_name.trim().to_string();
    let pw_hash = hash_password(req.password.trim()).map_err(ApiError::Internal)?;

    let existing: Option<i32> = sqlx::query_scalar(
        r#"SELECT 1 FROM rider WHERE email = $1"#,
    )
    .bind(&email)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    if existing.is_some() {
        return Err(ApiError::Conflict(
            "EMAIL_TAKEN",
            "An account with this email already exists".into(),
        ));
    }

    let user: UserRow = sqlx::query_as::<_, UserRow>(
        r#"
        INSERT INTO rider (email, display_name, password_hash, user_type)
        VALUES ($1, $2, $3, $4)
        RETURNING user_id, email, display_name, password_hash, user_type,
                  subscription_type, customer_ref, subscription_ref,
                  connect_account_ref, is_active, created_at
        "#,
    )
    .bind(&email)
    .bind(&display_name)
    .bind(&pw_hash)
    .bind(req.user_type)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    tracing::info!(user_id = %user.user_id, user_type = ?user.user_type, "rider registered");

    let (access_token, session) = create_session(&state, &user, None, false).await?;

    Ok(Json(LoginResponse {
        data: LoginResponseData {
            access_token,
            expires_at: session.expires_at,
            rider: user.into(),
        },
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("email and password are required"));
    }

    let user: UserRow = sqlx::query_as::<_, UserRow>(
        r#"
        SELECT user_id, email, display_name, password_hash, user_type,
               subscription_type, customer_ref, subscription_ref,
               connect_account_ref, is_active, created_at
        FROM rider
        WHERE email = $1
        "#,
    )
    .bind(&email)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    .ok_or_else(ApiError::invalid_credentials)?;

    if !user.is_active {
        return Err(ApiError::Forbidden("FORBIDDEN", "Account is disabled".into()));
    }

    if !verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::invalid_credentials());
    }

    let (access_token, session) = create_session(
        &state,
        &user,
        req.device_name.as_deref(),
        req.remember_me.unwrap_or(false),
    )
    .await?;

    Ok(Json(LoginResponse {
        data: LoginResponseData {
            access_token,
            expires_at: session.expires_at,
            rider: user.into(),
        },
    }))
}

pub async fn session(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<SessionResponse>, ApiError> {
    let user: UserRow = sqlx::query_as::<_, UserRow>(
        r#"
        SELECT user_id, email, display_name, password_hash, user_type,
               subscription_type, customer_ref, subscription_ref,
               connect_account_ref, is_active, created_at
        FROM rider
        WHERE user_id = $1
        "#,
    )
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    .ok_or_else(ApiError::session_expired)?;

    if !user.is_active {
        return Err(ApiError::session_expired());
    }

    let session: SessionTokenRow = sqlx::query_as::<_, SessionTokenRow>(
        r#"
        SELECT session_token_id, expires_at
        FROM session_token
        WHERE session_token_id = $1
          AND user_id = $2
          AND revoked_at IS NULL
          AND expires_at > now()
        "#,
    )
    .bind(auth.session_token_id)
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    .ok_or_else(ApiError::session_expired)?;

    Ok(Json(SessionResponse {
        data: SessionResponseData {
            rider: user.into(),
            session: SessionInfo {
                session_token_id: session.session_token_id,
                expires_at: session.expires_at,
            },
        },
    }))
}

/// Logout is best-effort: a failure to revoke must never block the
/// client from dropping its token, so the response is always ok.
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<OkResponse>, ApiError> {
    let res = sqlx::query(
        r#"
        UPDATE session_token
        SET revoked_at = now()
        WHERE session_token_id = $1
          AND user_id = $2
          AND revoked_at IS NULL
        "#,
    )
    .bind(auth.session_token_id)
    .bind(auth.user_id)
    .execute(&state.db)
    .await;

    if let Err(e) = res {
        tracing::warn!(%e, "logout revoke failed");
    }

    Ok(Json(OkResponse {
        data: OkData { ok: true },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("anna@example.com").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("  ").is_err());
        assert!(validate_email("no-at-sign").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("longenough").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password("        ").is_err());
    }

    #[test]
    fn test_validate_display_name() {
        assert!(validate_display_name("Anna").is_ok());
        assert!(validate_display_name("   ").is_err());
    }
}
