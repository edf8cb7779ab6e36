use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization, Cookie};
use uuid::Uuid;

use crate::auth::hash_access_token;
use crate::error::ApiError;
use crate::models::{AppState, Role, UserType};

/// Cookie name used by browser clients; API clients send a Bearer header.
pub const SESSION_COOKIE: &str = "equibook_session";

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub user_type: UserType,
    pub session_token_id: Uuid,
}

impl AuthContext {
    pub fn role(&self) -> Role {
        self.user_type.role()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SessionLookupRow {
    session_token_id: Uuid,
    user_id: Uuid,
    user_type: UserType,
}

/// Pull the raw session token out of the request: Authorization: Bearer
/// first, session cookie second.
async fn extract_token(parts: &mut Parts, state: &AppState) -> Result<String, ApiError> {
    if let Ok(TypedHeader(authz)) =
        TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state).await
    {
        return Ok(authz.token().to_string());
    }

    let TypedHeader(cookies): TypedHeader<Cookie> =
        TypedHeader::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::session_expired())?;

    cookies
        .get(SESSION_COOKIE)
        .map(|t| t.to_string())
        .ok_or_else(ApiError::session_expired)
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            let token = extract_token(parts, state).await?;
            let token_hash = hash_access_token(&token);

            // Validate session_token + ensure the rider is active
            let row: SessionLookupRow = sqlx::query_as::<_, SessionLookupRow>(
                r#"
                SELECT st.session_token_id, st.user_id, u.user_type
                FROM session_token st
                JOIN rider u ON u.user_id = st.user_id
                WHERE st.session_token_hash = $1
                  AND st.revoked_at IS NULL
                  AND st.expires_at > now()
                  AND u.is_active = true
                "#,
            )
            .bind(&token_hash)
            .fetch_optional(&state.db)
            .await
            .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
            .ok_or_else(ApiError::session_expired)?;

            // Touch last_seen_at (best-effort)
            let _ = sqlx::query(
                r#"
                UPDATE session_token
                SET last_seen_at = now()
                WHERE session_token_id = $1
                "#,
            )
            .bind(row.session_token_id)
            .execute(&state.db)
            .await;

            Ok(AuthContext {
                user_id: row.user_id,
                user_type: row.user_type,
                session_token_id: row.session_token_id,
            })
        }
    }
}
