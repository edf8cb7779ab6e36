// src/routes/appointment_routes.rs

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    lifecycle,
    middleware::auth_context::AuthContext,
    models::*,
    payments::{advance_amount, CheckoutMode},
};

const APPT_COLS: &str = r#"
  appointment_id, horse_ids, client_id, professional_id, service_type,
  title, location, notes, start_at, duration_min,
  is_periodic, frequency, repeat_until,
  status, price_cents, payment_status, payment_method, payment_ref,
  commission_cents, fee_collected, transferred_to_professional, invoice_url,
  created_by, has_alternative, original_appointment_id,
  created_at, updated_at
"#;

/// Calendar expansion stops after this many occurrences per booking.
const MAX_OCCURRENCES: usize = 366;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(list_appointments).post(create_appointment))
        .route("/appointments/calendar", get(calendar))
        .route(
            "/appointments/{appointment_id}",
            get(get_appointment).patch(patch_appointment),
        )
        .route("/appointments/{appointment_id}/confirm", post(confirm_appointment))
        .route("/appointments/{appointment_id}/cancel", post(cancel_appointment))
        .route("/appointments/{appointment_id}/complete", post(complete_appointment))
        .route(
            "/appointments/{appointment_id}/propose_alternative",
            post(propose_alternative),
        )
        .route("/appointments/{appointment_id}/checkout", post(start_checkout))
}

/* ============================================================
   DTOs
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct AppointmentDto {
    #[serde(flatten)]
    pub appointment: AppointmentRow,
    pub service_label: &'static str,
    pub status_label: &'static str,
    pub price_display: Option<String>,
    /// Still live and in the future; drives the upcoming/past tab split.
    pub is_upcoming: bool,
    /// Statuses the requesting user could legally move this booking to.
    pub allowed_transitions: Vec<AppointmentStatus>,
}

fn dto_for(row: AppointmentRow, actor: Party) -> AppointmentDto {
    AppointmentDto {
        service_label: row.service_type.label(),
        status_label: row.status.label(),
        price_display: row.price_cents.map(format_cents_eur),
        is_upcoming: lifecycle::is_upcoming(row.status, row.start_at, Utc::now()),
        allowed_transitions: lifecycle::valid_targets(row.status, actor, row.created_by),
        appointment: row,
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    pub horse_ids: Vec<Uuid>,
    /// Required when a professional books on behalf of a client.
    pub client_id: Option<Uuid>,
    /// Required when a client books.
    pub professional_id: Option<Uuid>,
    pub service_type: ServiceType,
    pub title: String,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub start_at: DateTime<Utc>,
    pub duration_min: i32,
    pub is_periodic: Option<bool>,
    pub frequency: Option<Frequency>,
    pub repeat_until: Option<DateTime<Utc>>,
    pub price_cents: Option<i32>,
    pub commission_cents: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct PatchAppointmentRequest {
    pub title: Option<String>,
    pub location: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub start_at: Option<DateTime<Utc>>,
    pub duration_min: Option<i32>,
    pub price_cents: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewTab {
    Upcoming,
    Past,
    Cancelled,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub view: Option<ViewTab>,
    pub status: Option<AppointmentStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub horse_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CalendarEntryDto {
    pub appointment_id: Uuid,
    pub title: String,
    pub service_type: ServiceType,
    pub status: AppointmentStatus,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    /// False for the stored date, true for dates expanded from a
    /// periodic booking.
    pub is_occurrence: bool,
}

#[derive(Debug, Deserialize)]
pub struct ProposeAlternativeRequest {
    pub start_at: DateTime<Utc>,
    pub duration_min: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    /// "advance" for the deposit, "full" for the whole price.
    pub mode: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutDto {
    pub checkout_url: String,
    pub session_ref: String,
    pub amount_cents: i32,
    pub mode: &'static str,
}

/* ============================================================
   Shared loading helpers
   ============================================================ */

async fn load_appointment(state: &AppState, id: Uuid) -> Result<AppointmentRow, ApiError> {
    let row: AppointmentRow = sqlx::query_as::<_, AppointmentRow>(&format!(
        "SELECT {APPT_COLS} FROM appointment WHERE appointment_id = $1"
    ))
    .bind(id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    .ok_or_else(|| ApiError::not_found("appointment"))?;
    Ok(row)
}

/// Load an appointment and resolve which side of it the caller is on.
async fn load_as_party(
    state: &AppState,
    id: Uuid,
    user_id: Uuid,
) -> Result<(AppointmentRow, Party), ApiError> {
    let row = load_appointment(state, id).await?;
    let party = lifecycle::party_of(user_id, row.client_id, row.professional_id)
        .ok_or_else(ApiError::not_a_party)?;
    Ok((row, party))
}

async fn ensure_accepted_connection(
    state: &AppState,
    client_id: Uuid,
    professional_id: Uuid,
) -> Result<(), ApiError> {
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

    if found.is_none() {
        return Err(ApiError::Forbidden(
            "NO_CONNECTION",
            "Appointments require an accepted connection between client and professional".into(),
        ));
    }
    Ok(())
}

async fn ensure_horses_owned_by(
    state: &AppState,
    horse_ids: &[Uuid],
    owner_id: Uuid,
) -> Result<(), ApiError> {
    let owned: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM horse
        WHERE horse_id = ANY($1) AND owner_id = $2
        "#,
    )
    .bind(horse_ids)
    .bind(owner_id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    if owned != horse_ids.len() as i64 {
        return Err(ApiError::validation(
            "every horse on the booking must belong to the client",
        ));
    }
    Ok(())
}

/// Keep first occurrence of each horse id, preserving order:
/// `horse_ids[0]` stays the primary horse.
fn dedupe_horses(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = std::collections::HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/* ============================================================
   POST /appointments (create)
   ============================================================ */

pub async fn create_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<Json<ApiOk<AppointmentDto>>, ApiError> {
    // Who books determines both parties and created_by.
    let (client_id, professional_id, created_by) = match auth.role() {
        Role::Client => {
            let professional_id = req
                .professional_id
                .ok_or_else(|| ApiError::validation("professional_id is required"))?;
            (auth.user_id, professional_id, Party::Client)
        }
        Role::Professional(_) => {
            let client_id = req
                .client_id
                .ok_or_else(|| ApiError::validation("client_id is required"))?;
            (client_id, auth.user_id, Party::Professional)
        }
    };

    if req.title.trim().is_empty() {
        return Err(ApiError::validation("title is required"));
    }

    let horse_ids = dedupe_horses(&req.horse_ids);
    let is_periodic = req.is_periodic.unwrap_or(false);
    lifecycle::validate_schedule(
        horse_ids.len(),
        req.duration_min,
        req.start_at,
        is_periodic,
        req.frequency,
        req.repeat_until,
    )?;

    if let Some(price) = req.price_cents {
        if price < 0 {
            return Err(ApiError::validation("price_cents must not be negative"));
        }
    }

    // The counterpart must exist and be of the right kind.
    let counterpart_id = match created_by {
        Party::Client => professional_id,
        Party::Professional => client_id,
    };
    let counterpart_type: UserType = sqlx::query_scalar(
        r#"SELECT user_type FROM rider WHERE user_id = $1 AND is_active = true"#,
    )
    .bind(counterpart_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    .ok_or_else(|| ApiError::not_found("user"))?;

    match (created_by, counterpart_type.role()) {
        (Party::Client, Role::Professional(_)) | (Party::Professional, Role::Client) => {}
        _ => {
            return Err(ApiError::validation(
                "appointments connect one client and one professional",
            ))
        }
    }

    ensure_accepted_connection(&state, client_id, professional_id).await?;
    ensure_horses_owned_by(&state, &horse_ids, client_id).await?;

    let commission = req.commission_cents.unwrap_or(DEFAULT_COMMISSION_CENTS);
    let frequency = if is_periodic { req.frequency } else { None };
    let repeat_until = if is_periodic { req.repeat_until } else { None };

    let row: AppointmentRow = sqlx::query_as::<_, AppointmentRow>(&format!(
        r#"
        INSERT INTO appointment (
          horse_ids, client_id, professional_id, service_type,
          title, location, notes, start_at, duration_min,
          is_periodic, frequency, repeat_until,
          price_cents, commission_cents, created_by
        )
        VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15)
        RETURNING {APPT_COLS}
        "#
    ))
    .bind(&horse_ids)
    .bind(client_id)
    .bind(professional_id)
    .bind(req.service_type)
    .bind(req.title.trim())
    .bind(req.location.as_deref())
    .bind(req.notes.as_deref())
    .bind(req.start_at)
    .bind(req.duration_min)
    .bind(is_periodic)
    .bind(frequency)
    .bind(repeat_until)
    .bind(req.price_cents)
    .bind(commission)
    .bind(created_by)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    tracing::info!(
        appointment_id = %row.appointment_id,
        created_by = ?created_by,
        "appointment requested"
    );

    Ok(Json(ApiOk {
        data: dto_for(row, created_by),
    }))
}

/* ============================================================
   GET /appointments (list, tab filters)
   ============================================================ */

pub async fn list_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<ListQuery>,
) -> Result<Json<ApiOk<Vec<AppointmentDto>>>, ApiError> {
    let actor = match auth.role() {
        Role::Client => Party::Client,
        Role::Professional(_) => Party::Professional,
    };

    let mut qb = sqlx::QueryBuilder::<sqlx::Postgres>::new(format!(
        "SELECT {APPT_COLS} FROM appointment WHERE "
    ));
    match actor {
        Party::Client => qb.push("client_id = "),
        Party::Professional => qb.push("professional_id = "),
    };
    qb.push_bind(auth.user_id);

    if let Some(status) = q.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(horse_id) = q.horse_id {
        qb.push(" AND ").push_bind(horse_id).push(" = ANY(horse_ids)");
    }
    if let Some(from) = q.from {
        qb.push(" AND start_at >= ").push_bind(from);
    }
    if let Some(to) = q.to {
        qb.push(" AND start_at < ").push_bind(to);
    }

    // upcoming = still live and in the future, soonest first;
    // past tabs read backwards from now
    match q.view {
        Some(ViewTab::Upcoming) => {
            qb.push(" AND status IN ('pending','confirmed') AND start_at > now()");
            qb.push(" ORDER BY start_at ASC");
        }
        Some(ViewTab::Past) => {
            qb.push(" AND start_at <= now()");
            qb.push(" ORDER BY start_at DESC");
        }
        Some(ViewTab::Cancelled) => {
            qb.push(" AND status = 'cancelled'");
            qb.push(" ORDER BY start_at DESC");
        }
        None => {
            qb.push(" ORDER BY start_at ASC");
        }
    }

    let rows: Vec<AppointmentRow> = qb
        .build_query_as()
        .fetch_all(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk {
        data: rows.into_iter().map(|r| dto_for(r, actor)).collect(),
    }))
}

/* ============================================================
   GET /appointments/calendar
   ============================================================ */

pub async fn calendar(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<CalendarQuery>,
) -> Result<Json<ApiOk<Vec<CalendarEntryDto>>>, ApiError> {
    if q.to <= q.from {
        return Err(ApiError::validation("to must be after from"));
    }

    let side = match auth.role() {
        Role::Client => "client_id",
        Role::Professional(_) => "professional_id",
    };

    // One query picks up plain bookings inside the window plus periodic
    // bookings whose range overlaps it; expansion happens here, not in
    // the store.
    let rows: Vec<AppointmentRow> = sqlx::query_as::<_, AppointmentRow>(&format!(
        r#"
        SELECT {APPT_COLS}
        FROM appointment
        WHERE {side} = $1
          AND status <> 'cancelled'
          AND (
            (NOT is_periodic AND start_at >= $2 AND start_at < $3)
            OR (is_periodic AND start_at < $3 AND repeat_until >= $2)
          )
        ORDER BY start_at ASC
        "#
    ))
    .bind(auth.user_id)
    .bind(q.from)
    .bind(q.to)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let mut entries = Vec::new();
    for row in rows {
        let duration = Duration::minutes(row.duration_min as i64);
        match (row.is_periodic, row.frequency, row.repeat_until) {
            (true, Some(freq), Some(until)) => {
                for occurrence in
                    lifecycle::expand_occurrences(row.start_at, freq, until, MAX_OCCURRENCES)
                {
                    if occurrence >= q.from && occurrence < q.to {
                        entries.push(CalendarEntryDto {
                            appointment_id: row.appointment_id,
                            title: row.title.clone(),
                            service_type: row.service_type,
                            status: row.status,
                            start_at: occurrence,
                            end_at: occurrence + duration,
                            is_occurrence: occurrence != row.start_at,
                        });
                    }
                }
            }
            _ => entries.push(CalendarEntryDto {
                appointment_id: row.appointment_id,
                title: row.title.clone(),
                service_type: row.service_type,
                status: row.status,
                start_at: row.start_at,
                end_at: row.start_at + duration,
                is_occurrence: false,
            }),
        }
    }
    entries.sort_by_key(|e| e.start_at);

    Ok(Json(ApiOk { data: entries }))
}

/* ============================================================
   GET /appointments/{id}
   ============================================================ */

pub async fn get_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<AppointmentDto>>, ApiError> {
    let row = load_appointment(&state, appointment_id).await?;
    // non-parties don't learn the appointment exists
    let party = lifecycle::party_of(auth.user_id, row.client_id, row.professional_id)
        .ok_or_else(|| ApiError::not_found("appointment"))?;
    Ok(Json(ApiOk {
        data: dto_for(row, party),
    }))
}

/* ============================================================
   PATCH /appointments/{id} (descriptive edits; never the status)
   ============================================================ */

pub async fn patch_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
    Json(req): Json<PatchAppointmentRequest>,
) -> Result<Json<ApiOk<AppointmentDto>>, ApiError> {
    let (row, party) = load_as_party(&state, appointment_id, auth.user_id).await?;

    if row.status.is_terminal() {
        return Err(ApiError::validation(
            "cancelled or completed appointments can no longer be edited",
        ));
    }

    let title = match req.title.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        Some(_) => return Err(ApiError::validation("title is required")),
        None => row.title.clone(),
    };
    let duration_min = req.duration_min.unwrap_or(row.duration_min);
    if duration_min <= 0 {
        return Err(ApiError::validation("duration must be at least one minute"));
    }
    let price_cents = match req.price_cents {
        Some(p) if p < 0 => return Err(ApiError::validation("price_cents must not be negative")),
        Some(p) => {
            if matches!(
                row.payment_status,
                PaymentStatus::PaidAdvance | PaymentStatus::PaidComplete
            ) {
                return Err(ApiError::validation("the price is fixed once paid"));
            }
            Some(p)
        }
        None => row.price_cents,
    };

    let start_at = req.start_at.unwrap_or(row.start_at);
    let location = req.location.unwrap_or(row.location);
    let notes = req.notes.unwrap_or(row.notes);

    // commission_cents is deliberately absent: fixed at creation
    let updated: AppointmentRow = sqlx::query_as::<_, AppointmentRow>(&format!(
        r#"
        UPDATE appointment
        SET title = $2, location = $3, notes = $4,
            start_at = $5, duration_min = $6, price_cents = $7,
            updated_at = now()
        WHERE appointment_id = $1
        RETURNING {APPT_COLS}
        "#
    ))
    .bind(appointment_id)
    .bind(&title)
    .bind(location.as_deref())
    .bind(notes.as_deref())
    .bind(start_at)
    .bind(duration_min)
    .bind(price_cents)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk {
        data: dto_for(updated, party),
    }))
}

/* ============================================================
   Status transitions
   ============================================================ */

async fn transition(
    state: &AppState,
    auth: &AuthContext,
    appointment_id: Uuid,
    target: AppointmentStatus,
) -> Result<Json<ApiOk<AppointmentDto>>, ApiError> {
    let (row, party) = load_as_party(state, appointment_id, auth.user_id).await?;

    lifecycle::validate_transition(row.status, target, party, row.created_by)?;

    let updated: AppointmentRow = sqlx::query_as::<_, AppointmentRow>(&format!(
        r#"
        UPDATE appointment
        SET status = $2, updated_at = now()
        WHERE appointment_id = $1
        RETURNING {APPT_COLS}
        "#
    ))
    .bind(appointment_id)
    .bind(target)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    tracing::info!(
        appointment_id = %appointment_id,
        from = ?row.status,
        to = ?target,
        by = ?party,
        "appointment transition"
    );

    Ok(Json(ApiOk {
        data: dto_for(updated, party),
    }))
}

pub async fn confirm_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<AppointmentDto>>, ApiError> {
    transition(&state, &auth, appointment_id, AppointmentStatus::Confirmed).await
}

pub async fn cancel_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<AppointmentDto>>, ApiError> {
    transition(&state, &auth, appointment_id, AppointmentStatus::Cancelled).await
}

pub async fn complete_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<AppointmentDto>>, ApiError> {
    transition(&state, &auth, appointment_id, AppointmentStatus::Completed).await
}

/* ============================================================
   POST /appointments/{id}/propose_alternative

   Declining with a counter-offer: the original is cancelled and
   flagged, a fresh pending appointment points back at it. created_by
   flips to the proposer, so the original creator answers this one.
   ============================================================ */

pub async fn propose_alternative(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
    Json(req): Json<ProposeAlternativeRequest>,
) -> Result<Json<ApiOk<AppointmentDto>>, ApiError> {
    let (row, party) = load_as_party(&state, appointment_id, auth.user_id).await?;

    if row.status != AppointmentStatus::Pending {
        return Err(ApiError::validation(
            "only a pending appointment can get an alternative proposal",
        ));
    }
    if party == row.created_by {
        return Err(ApiError::validation(
            "the requesting party cannot counter its own appointment",
        ));
    }

    let duration_min = req.duration_min.unwrap_or(row.duration_min);
    lifecycle::validate_schedule(row.horse_ids.len(), duration_min, req.start_at, false, None, None)?;

    let mut tx = state
        .db
        .begin()
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    sqlx::query(
        r#"
        UPDATE appointment
        SET status = 'cancelled', has_alternative = true, updated_at = now()
        WHERE appointment_id = $1
        "#,
    )
    .bind(appointment_id)
    .execute(&mut *tx)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let proposal: AppointmentRow = sqlx::query_as::<_, AppointmentRow>(&format!(
        r#"
        INSERT INTO appointment (
          horse_ids, client_id, professional_id, service_type,
          title, location, notes, start_at, duration_min,
          price_cents, commission_cents, created_by, original_appointment_id
        )
        VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
        RETURNING {APPT_COLS}
        "#
    ))
    .bind(&row.horse_ids)
    .bind(row.client_id)
    .bind(row.professional_id)
    .bind(row.service_type)
    .bind(&row.title)
    .bind(row.location.as_deref())
    .bind(req.notes.as_deref().or(row.notes.as_deref()))
    .bind(req.start_at)
    .bind(duration_min)
    .bind(row.price_cents)
    .bind(row.commission_cents)
    .bind(party)
    .bind(appointment_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    tx.commit()
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    tracing::info!(
        original = %appointment_id,
        proposal = %proposal.appointment_id,
        by = ?party,
        "alternative proposed"
    );

    Ok(Json(ApiOk {
        data: dto_for(proposal, party),
    }))
}

/* ============================================================
   POST /appointments/{id}/checkout
   ============================================================ */

pub async fn start_checkout(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<ApiOk<CheckoutDto>>, ApiError> {
    let (row, party) = load_as_party(&state, appointment_id, auth.user_id).await?;

    if party != Party::Client {
        return Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only the client pays for an appointment".into(),
        ));
    }

    let mode = CheckoutMode::parse(&req.mode)
        .ok_or_else(|| ApiError::validation("mode must be \"advance\" or \"full\""))?;

    let price = lifecycle::can_initiate_checkout(row.status, row.price_cents, row.payment_status)?;
    let amount = match mode {
        CheckoutMode::Advance => advance_amount(price),
        CheckoutMode::Full => price,
    };
    if amount <= 0 {
        return Err(ApiError::validation("the amount to charge is zero"));
    }

    let email: String = sqlx::query_scalar(r#"SELECT email FROM rider WHERE user_id = $1"#)
        .bind(auth.user_id)
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let session = state
        .payments
        .create_appointment_checkout(appointment_id, amount, mode, &email)
        .await?;

    tracing::info!(
        appointment_id = %appointment_id,
        session_ref = %session.session_ref,
        amount_cents = amount,
        mode = mode.as_str(),
        "checkout session created"
    );

    Ok(Json(ApiOk {
        data: CheckoutDto {
            checkout_url: session.url,
            session_ref: session.session_ref,
            amount_cents: amount,
            mode: mode.as_str(),
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupe_horses_keeps_primary_first() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(dedupe_horses(&[a, b, a]), vec![a, b]);
        assert_eq!(dedupe_horses(&[b, b, b]), vec![b]);
        assert!(dedupe_horses(&[]).is_empty());
    }

    #[test]
    fn test_dto_surfaces_price_display_and_transitions() {
        let now = Utc::now();
        let row = AppointmentRow {
            appointment_id: Uuid::new_v4(),
            horse_ids: vec![Uuid::new_v4()],
            client_id: Uuid::new_v4(),
            professional_id: Uuid::new_v4(),
            service_type: ServiceType::Farrier,
            title: "Shoeing".into(),
            location: None,
            notes: None,
            start_at: now + Duration::days(3),
            duration_min: 45,
            is_periodic: false,
            frequency: None,
            repeat_until: None,
            status: AppointmentStatus::Pending,
            price_cents: Some(10000),
            payment_status: PaymentStatus::Pending,
            payment_method: None,
            payment_ref: None,
            commission_cents: DEFAULT_COMMISSION_CENTS,
            fee_collected: false,
            transferred_to_professional: false,
            invoice_url: None,
            created_by: Party::Client,
            has_alternative: false,
            original_appointment_id: None,
            created_at: now,
            updated_at: now,
        };

        // the professional answers a client-created request
        let dto = dto_for(row.clone(), Party::Professional);
        assert_eq!(dto.price_display.as_deref(), Some("100,00 €"));
        assert!(dto.is_upcoming);
        assert_eq!(
            dto.allowed_transitions,
            vec![AppointmentStatus::Confirmed, AppointmentStatus::Cancelled]
        );

        // the client may only withdraw its own request
        let dto = dto_for(row, Party::Client);
        assert_eq!(dto.allowed_transitions, vec![AppointmentStatus::Cancelled]);
    }
}
