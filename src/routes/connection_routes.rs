// src/routes/connection_routes.rs

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{
        ApiOk, AppState, ConnectionRow, ConnectionStatus, OkData, OkResponse, Role, UserType,
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/connections", get(list_connections).post(create_connection))
        .route("/connections/{connection_id}", axum::routing::delete(delete_connection))
        .route("/connections/{connection_id}/respond", post(respond_connection))
}

#[derive(Debug, Deserialize)]
pub struct CreateConnectionRequest {
    pub professional_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RespondConnectionRequest {
    pub accept: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListConnectionsQuery {
    pub status: Option<ConnectionStatus>,
}

async fn load_connection(state: &AppState, id: Uuid) -> Result<ConnectionRow, ApiError> {
    let row: ConnectionRow = sqlx::query_as::<_, ConnectionRow>(
        r#"
        SELECT connection_id, client_id, professional_id, status, request_date, response_date
        FROM connection
        WHERE connection_id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    .ok_or_else(|| ApiError::not_found("connection"))?;
    Ok(row)
}

/// Clients ask professionals, never the other way around; a live
/// request or accepted link blocks a second one for the same pair.
pub async fn create_connection(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateConnectionRequest>,
) -> Result<Json<ApiOk<ConnectionRow>>, ApiError> {
    if auth.role() != Role::Client {
        return Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only clients request connections".into(),
        ));
    }

    let target_type: UserType = sqlx::query_scalar(
        r#"SELECT user_type FROM rider WHERE user_id = $1 AND is_active = true"#,
    )
    .bind(req.professional_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    .ok_or_else(|| ApiError::not_found("professional"))?;

    if !target_type.is_professional() {
        return Err(ApiError::validation(
            "connections can only be requested from professionals",
        ));
    }

    let live: Option<i32> = sqlx::query_scalar(
        r#"
        SELECT 1
        FROM connection
        WHERE client_id = $1 AND professional_id = $2
          AND status IN ('pending', 'accepted')
        "#,
    )
    .bind(auth.user_id)
    .bind(req.professional_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    if live.is_some() {
        return Err(ApiError::Conflict(
            "CONNECTION_EXISTS",
            "A pending or accepted connection to this professional already exists".into(),
        ));
    }

    let row: ConnectionRow = sqlx::query_as::<_, ConnectionRow>(
        r#"
        INSERT INTO connection (client_id, professional_id)
        VALUES ($1, $2)
        RETURNING connection_id, client_id, professional_id, status, request_date, response_date
        "#,
    )
    .bind(auth.user_id)
    .bind(req.professional_id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    tracing::info!(
        connection_id = %row.connection_id,
        professional_id = %req.professional_id,
        "connection requested"
    );

    Ok(Json(ApiOk { data: row }))
}

pub async fn list_connections(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<ListConnectionsQuery>,
) -> Result<Json<ApiOk<Vec<ConnectionRow>>>, ApiError> {
    let mut qb = sqlx::QueryBuilder::<sqlx::Postgres>::new(
        r#"
        SELECT connection_id, client_id, professional_id, status, request_date, response_date
        FROM connection
        WHERE "#,
    );
    match auth.role() {
        Role::Client => qb.push("client_id = "),
        Role::Professional(_) => qb.push("professional_id = "),
    };
    qb.push_bind(auth.user_id);
    if let Some(status) = q.status {
        qb.push(" AND status = ").push_bind(status);
    }
    qb.push(" ORDER BY request_date DESC");

    let rows: Vec<ConnectionRow> = qb
        .build_query_as()
        .fetch_all(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk { data: rows }))
}

/// The professional answers a pending request, stamping response_date.
pub async fn respond_connection(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(connection_id): Path<Uuid>,
    Json(req): Json<RespondConnectionRequest>,
) -> Result<Json<ApiOk<ConnectionRow>>, ApiError> {
    let row = load_connection(&state, connection_id).await?;

    if row.professional_id != auth.user_id {
        return Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only the requested professional can respond".into(),
        ));
    }
    if row.status != ConnectionStatus::Pending {
        return Err(ApiError::validation("this request has already been answered"));
    }

    let status = if req.accept {
        ConnectionStatus::Accepted
    } else {
        ConnectionStatus::Rejected
    };

    let updated: ConnectionRow = sqlx::query_as::<_, ConnectionRow>(
        r#"
        UPDATE connection
        SET status = $2, response_date = now()
        WHERE connection_id = $1
        RETURNING connection_id, client_id, professional_id, status, request_date, response_date
        "#,
    )
    .bind(connection_id)
    .bind(status)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    tracing::info!(connection_id = %connection_id, accepted = req.accept, "connection answered");

    Ok(Json(ApiOk { data: updated }))
}

/// Either side severs the link; a removed connection also stops new
/// bookings between the pair.
pub async fn delete_connection(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(connection_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    let row = load_connection(&state, connection_id).await?;

    if row.client_id != auth.user_id && row.professional_id != auth.user_id {
        return Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only the connected parties can remove a connection".into(),
        ));
    }

    sqlx::query(r#"DELETE FROM connection WHERE connection_id = $1"#)
        .bind(connection_id)
        .execute(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(OkResponse {
        data: OkData { ok: true },
    }))
}
