// src/routes/review_routes.rs

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{average_rating, ApiOk, AppState, OkData, OkResponse, ReviewRow, Role, UserType},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reviews", post(create_review))
        .route(
            "/reviews/{review_id}",
            axum::routing::put(update_review).delete(delete_review),
        )
        .route(
            "/reviews/professional/{professional_id}",
            get(list_for_professional),
        )
}

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub professional_id: Uuid,
    pub rating: i16,
    pub comment: Option<String>,
    pub appointment_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReviewRequest {
    pub rating: i16,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReviewListData {
    pub reviews: Vec<ReviewRow>,
    /// Computed from the listed rows, never stored.
    pub average_rating: Option<f64>,
    pub count: usize,
}

fn validate_rating(rating: i16) -> Result<(), ApiError> {
    if !(1..=5).contains(&rating) {
        return Err(ApiError::validation("rating must be between 1 and 5"));
    }
    Ok(())
}

async fn load_own_review(
    state: &AppState,
    review_id: Uuid,
    client_id: Uuid,
) -> Result<ReviewRow, ApiError> {
    let row: ReviewRow = sqlx::query_as::<_, ReviewRow>(
        r#"
        SELECT review_id, client_id, professional_id, appointment_id,
               rating, comment, created_at, updated_at
        FROM review
        WHERE review_id = $1
        "#,
    )
    .bind(review_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    .ok_or_else(|| ApiError::not_found("review"))?;

    if row.client_id != client_id {
        return Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only the author can change a review".into(),
        ));
    }
    Ok(row)
}

pub async fn create_review(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateReviewRequest>,
) -> Result<Json<ApiOk<ReviewRow>>, ApiError> {
    if auth.role() != Role::Client {
        return Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only clients write reviews".into(),
        ));
    }
    validate_rating(req.rating)?;

    let target_type: UserType = sqlx::query_scalar(
        r#"SELECT user_type FROM rider WHERE user_id = $1 AND is_active = true"#,
    )
    .bind(req.professional_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    .ok_or_else(|| ApiError::not_found("professional"))?;

    if !target_type.is_professional() {
        return Err(ApiError::validation("reviews can only rate professionals"));
    }

    if let Some(appointment_id) = req.appointment_id {
        let matches: Option<i32> = sqlx::query_scalar(
            r#"
            SELECT 1 FROM appointment
            WHERE appointment_id = $1 AND client_id = $2 AND professional_id = $3
            "#,
        )
        .bind(appointment_id)
        .bind(auth.user_id)
        .bind(req.professional_id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;
        if matches.is_none() {
            return Err(ApiError::validation(
                "the referenced appointment does not belong to this pair",
            ));
        }
    }

    let existing: Option<i32> = sqlx::query_scalar(
        r#"SELECT 1 FROM review WHERE client_id = $1 AND professional_id = $2"#,
    )
    .bind(auth.user_id)
    .bind(req.professional_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    if existing.is_some() {
        return Err(ApiError::Conflict(
            "ALREADY_REVIEWED",
            "You have already reviewed this professional".into(),
        ));
    }

    let row: ReviewRow = sqlx::query_as::<_, ReviewRow>(
        r#"
        INSERT INTO review (client_id, professional_id, appointment_id, rating, comment)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING review_id, client_id, professional_id, appointment_id,
                  rating, comment, created_at, updated_at
        "#,
    )
    .bind(auth.user_id)
    .bind(req.professional_id)
    .bind(req.appointment_id)
    .bind(req.rating)
    .bind(req.comment.as_deref())
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk { data: row }))
}

pub async fn update_review(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(review_id): Path<Uuid>,
    Json(req): Json<UpdateReviewRequest>,
) -> Result<Json<ApiOk<ReviewRow>>, ApiError> {
    validate_rating(req.rating)?;
    load_own_review(&state, review_id, auth.user_id).await?;

    let row: ReviewRow = sqlx::query_as::<_, ReviewRow>(
        r#"
        UPDATE review
        SET rating = $2, comment = $3, updated_at = now()
        WHERE review_id = $1
        RETURNING review_id, client_id, professional_id, appointment_id,
                  rating, comment, created_at, updated_at
        "#,
    )
    .bind(review_id)
    .bind(req.rating)
    .bind(req.comment.as_deref())
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk { data: row }))
}

pub async fn delete_review(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(review_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    load_own_review(&state, review_id, auth.user_id).await?;

    sqlx::query(r#"DELETE FROM review WHERE review_id = $1"#)
        .bind(review_id)
        .execute(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(OkResponse {
        data: OkData { ok: true },
    }))
}

pub async fn list_for_professional(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(professional_id): Path<Uuid>,
) -> Result<Json<ApiOk<ReviewListData>>, ApiError> {
    let reviews: Vec<ReviewRow> = sqlx::query_as::<_, ReviewRow>(
        r#"
        SELECT review_id, client_id, professional_id, appointment_id,
               rating, comment, created_at, updated_at
        FROM review
        WHERE professional_id = $1
        ORDER BY created_at ASC
        "#,
    )
    .bind(professional_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let ratings: Vec<i16> = reviews.iter().map(|r| r.rating).collect();

    Ok(Json(ApiOk {
        data: ReviewListData {
            average_rating: average_rating(&ratings),
            count: reviews.len(),
            reviews,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rating_bounds() {
        assert!(validate_rating(1).is_ok());
        assert!(validate_rating(5).is_ok());
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(6).is_err());
        assert!(validate_rating(-3).is_err());
    }

    #[test]
    fn test_average_over_listed_ratings() {
        // aggregate is caller-computed from the listed rows
        assert_eq!(average_rating(&[4, 5]), Some(4.5));
    }
}
