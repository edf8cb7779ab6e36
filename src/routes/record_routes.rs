// src/routes/record_routes.rs
//
// Medical and service history of a horse: append-only rows written by
// professionals, never edited or deleted afterwards.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{
        ApiOk, AppState, HorseRow, MedicalRecordRow, Role, ServiceRecordRow, ServiceType,
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/horses/{horse_id}/medical_records",
            get(list_medical_records).post(create_medical_record),
        )
        .route(
            "/horses/{horse_id}/service_records",
            get(list_service_records).post(create_service_record),
        )
}

#[derive(Debug, Deserialize)]
pub struct CreateMedicalRecordRequest {
    pub record_type: String,
    pub description: String,
    pub medication: Option<String>,
    pub next_due: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateServiceRecordRequest {
    pub service_type: ServiceType,
    pub description: String,
    pub price_cents: Option<i32>,
}

fn validate_text(field: &'static str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::validation(format!("{field} is required")));
    }
    Ok(())
}

async fn load_horse(state: &AppState, horse_id: Uuid) -> Result<HorseRow, ApiError> {
    let horse: HorseRow = sqlx::query_as::<_, HorseRow>(
        r#"
        SELECT horse_id, owner_id, name, breed, birth_year, notes, created_at, updated_at
        FROM horse
        WHERE horse_id = $1
        "#,
    )
    .bind(horse_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    .ok_or_else(|| ApiError::not_found("horse"))?;
    Ok(horse)
}

async fn has_accepted_connection(
    state: &AppState,
    client_id: Uuid,
    professional_id: Uuid,
) -> Result<bool, ApiError> {
    let found: Option<i32> = sqlx::query_scalar(
        r#"
        SELECT 1
        FROM connection
        WHERE client_id = $1 AND professional_id = $2 AND status = 'accepted'
        "#,
    )
    .bind(client_id)
    .bind(professional_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;
    Ok(found.is_some())
}

/// The owner sees the history; a professional sees it while connected
/// to the owner. Everyone else gets a 404, not a 403.
async fn ensure_can_view(
    state: &AppState,
    horse: &HorseRow,
    auth: &AuthContext,
) -> Result<(), ApiError> {
    match auth.role() {
        Role::Client => {
            if horse.owner_id == auth.user_id {
                Ok(())
            } else {
                Err(ApiError::not_found("horse"))
            }
        }
        Role::Professional(_) => {
            if has_accepted_connection(state, horse.owner_id, auth.user_id).await? {
                Ok(())
            } else {
                Err(ApiError::not_found("horse"))
            }
        }
    }
}

async fn ensure_can_append(
    state: &AppState,
    horse: &HorseRow,
    auth: &AuthContext,
) -> Result<(), ApiError> {
    match auth.role() {
        Role::Professional(_) => {
            if has_accepted_connection(state, horse.owner_id, auth.user_id).await? {
                Ok(())
            } else {
                Err(ApiError::Forbidden(
                    "NO_CONNECTION",
                    "Records require an accepted connection to the horse's owner".into(),
                ))
            }
        }
        Role::Client => Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only professionals write history records".into(),
        )),
    }
}

pub async fn create_medical_record(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(horse_id): Path<Uuid>,
    Json(req): Json<CreateMedicalRecordRequest>,
) -> Result<Json<ApiOk<MedicalRecordRow>>, ApiError> {
    validate_text("record_type", &req.record_type)?;
    validate_text("description", &req.description)?;

    let horse = load_horse(&state, horse_id).await?;
    ensure_can_append(&state, &horse, &auth).await?;

    let row: MedicalRecordRow = sqlx::query_as::<_, MedicalRecordRow>(
        r#"
        INSERT INTO medical_record (horse_id, professional_id, record_type, description, medication, next_due)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING record_id, horse_id, professional_id, record_type, description,
                  medication, next_due, created_at
        "#,
    )
    .bind(horse_id)
    .bind(auth.user_id)
    .bind(req.record_type.trim())
    .bind(req.description.trim())
    .bind(req.medication.as_deref())
    .bind(req.next_due)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk { data: row }))
}

pub async fn list_medical_records(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(horse_id): Path<Uuid>,
) -> Result<Json<ApiOk<Vec<MedicalRecordRow>>>, ApiError> {
    let horse = load_horse(&state, horse_id).await?;
    ensure_can_view(&state, &horse, &auth).await?;

    let rows: Vec<MedicalRecordRow> = sqlx::query_as::<_, MedicalRecordRow>(
        r#"
        SELECT record_id, horse_id, professional_id, record_type, description,
               medication, next_due, created_at
        FROM medical_record
        WHERE horse_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(horse_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk { data: rows }))
}

pub async fn create_service_record(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(horse_id): Path<Uuid>,
    Json(req): Json<CreateServiceRecordRequest>,
) -> Result<Json<ApiOk<ServiceRecordRow>>, ApiError> {
    validate_text("description", &req.description)?;
    if let Some(p) = req.price_cents {
        if p < 0 {
            return Err(ApiError::validation("price_cents must not be negative"));
        }
    }

    let horse = load_horse(&state, horse_id).await?;
    ensure_can_append(&state, &horse, &auth).await?;

    let row: ServiceRecordRow = sqlx::query_as::<_, ServiceRecordRow>(
        r#"
        INSERT INTO service_record (horse_id, professional_id, service_type, description, price_cents)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING record_id, horse_id, professional_id, service_type, description,
                  price_cents, created_at
        "#,
    )
    .bind(horse_id)
    .bind(auth.user_id)
    .bind(req.service_type)
    .bind(req.description.trim())
    .bind(req.price_cents)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk { data: row }))
}

pub async fn list_service_records(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(horse_id): Path<Uuid>,
) -> Result<Json<ApiOk<Vec<ServiceRecordRow>>>, ApiError> {
    let horse = load_horse(&state, horse_id).await?;
    ensure_can_view(&state, &horse, &auth).await?;

    let rows: Vec<ServiceRecordRow> = sqlx::query_as::<_, ServiceRecordRow>(
        r#"
        SELECT record_id, horse_id, professional_id, service_type, description,
               price_cents, created_at
        FROM service_record
        WHERE horse_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(horse_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk { data: rows }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_text() {
        assert!(validate_text("description", "trimmed hooves").is_ok());
        assert!(validate_text("description", "   ").is_err());
    }
}
