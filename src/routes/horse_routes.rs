// src/routes/horse_routes.rs

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, HorseRow, OkData, OkResponse},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/horses", get(list_horses).post(create_horse))
        .route(
            "/horses/{horse_id}",
            get(get_horse).put(update_horse).delete(delete_horse),
        )
}

#[derive(Debug, Deserialize)]
pub struct CreateHorseRequest {
    pub name: String,
    pub breed: Option<String>,
    pub birth_year: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateHorseRequest {
    pub name: Option<String>,
    pub breed: Option<Option<String>>,
    pub birth_year: Option<Option<i32>>,
    pub notes: Option<Option<String>>,
}

fn validate_name(name: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::validation("name is required"));
    }
    Ok(())
}

fn validate_birth_year(year: i32) -> Result<(), ApiError> {
    let this_year = Utc::now().format("%Y").to_string().parse::<i32>().unwrap_or(2100);
    if !(1980..=this_year).contains(&year) {
        return Err(ApiError::validation("birth_year is out of range"));
    }
    Ok(())
}

/// Load a horse and check the caller owns it.
async fn load_owned_horse(
    state: &AppState,
    horse_id: Uuid,
    owner_id: Uuid,
) -> Result<HorseRow, ApiError> {
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

    if horse.owner_id != owner_id {
        // hide other riders' horses entirely
        return Err(ApiError::not_found("horse"));
    }
    Ok(horse)
}

pub async fn list_horses(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<HorseRow>>>, ApiError> {
    let horses: Vec<HorseRow> = sqlx::query_as::<_, HorseRow>(
        r#"
        SELECT horse_id, owner_id, name, breed, birth_year, notes, created_at, updated_at
        FROM horse
        WHERE owner_id = $1
        ORDER BY name ASC
        "#,
    )
    .bind(auth.user_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk { data: horses }))
}

pub async fn get_horse(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(horse_id): Path<Uuid>,
) -> Result<Json<ApiOk<HorseRow>>, ApiError> {
    let horse = load_owned_horse(&state, horse_id, auth.user_id).await?;
    Ok(Json(ApiOk { data: horse }))
}

pub async fn create_horse(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateHorseRequest>,
) -> Result<Json<ApiOk<HorseRow>>, ApiError> {
    validate_name(&req.name)?;
    if let Some(year) = req.birth_year {
        validate_birth_year(year)?;
    }

    let horse: HorseRow = sqlx::query_as::<_, HorseRow>(
        r#"
        INSERT INTO horse (owner_id, name, breed, birth_year, notes)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING horse_id, owner_id, name, breed, birth_year, notes, created_at, updated_at
        "#,
    )
    .bind(auth.user_id)
    .bind(req.name.trim())
    .bind(req.breed.as_deref())
    .bind(req.birth_year)
    .bind(req.notes.as_deref())
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk { data: horse }))
}

pub async fn update_horse(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(horse_id): Path<Uuid>,
    Json(req): Json<UpdateHorseRequest>,
) -> Result<Json<ApiOk<HorseRow>>, ApiError> {
    let existing = load_owned_horse(&state, horse_id, auth.user_id).await?;

    let name = match req.name.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        Some(_) => return Err(ApiError::validation("name is required")),
        None => existing.name.clone(),
    };
    let breed = req.breed.unwrap_or(existing.breed);
    let birth_year = req.birth_year.unwrap_or(existing.birth_year);
    if let Some(year) = birth_year {
        validate_birth_year(year)?;
    }
    let notes = req.notes.unwrap_or(existing.notes);

    let horse: HorseRow = sqlx::query_as::<_, HorseRow>(
        r#"
        UPDATE horse
        SET name = $1, breed = $2, birth_year = $3, notes = $4, updated_at = now()
        WHERE horse_id = $5
        RETURNING horse_id, owner_id, name, breed, birth_year, notes, created_at, updated_at
        "#,
    )
    .bind(&name)
    .bind(breed.as_deref())
    .bind(birth_year)
    .bind(notes.as_deref())
    .bind(horse_id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk { data: horse }))
}

pub async fn delete_horse(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(horse_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    load_owned_horse(&state, horse_id, auth.user_id).await?;

    sqlx::query(r#"DELETE FROM horse WHERE horse_id = $1"#)
        .bind(horse_id)
        .execute(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(OkResponse {
        data: OkData { ok: true },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Luna").is_ok());
        assert!(validate_name("  ").is_err());
    }

    #[test]
    fn test_validate_birth_year() {
        assert!(validate_birth_year(2015).is_ok());
        assert!(validate_birth_year(1920).is_err());
        assert!(validate_birth_year(2990).is_err());
    }
}
