// src/routes/payment_routes.rs
//
// Webhook endpoint for the payment processor. No session auth here; a
// shared-secret signature over the raw payload gates the route. This is
// the only path through which the processor reaches local rows.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use uuid::Uuid;

use crate::{
    error::ApiError,
    lifecycle,
    models::{AppState, AppointmentStatus, OkData, OkResponse, PaymentStatus, SubscriptionType},
    payments::{CheckoutMode, WebhookEvent, WebhookObject},
};

const SIGNATURE_HEADER: &str = "x-payment-signature";

pub fn router() -> Router<AppState> {
    Router::new().route("/payments/webhook", post(webhook))
}

fn paid_status_for(mode: CheckoutMode) -> PaymentStatus {
    match mode {
        CheckoutMode::Advance => PaymentStatus::PaidAdvance,
        CheckoutMode::Full => PaymentStatus::PaidComplete,
    }
}

fn metadata_uuid(object: &WebhookObject, key: &str) -> Option<Uuid> {
    object.metadata.get(key).and_then(|v| Uuid::parse_str(v).ok())
}

fn metadata_tier(object: &WebhookObject) -> Option<SubscriptionType> {
    match object.metadata.get("tier").map(String::as_str) {
        Some("basic") => Some(SubscriptionType::Basic),
        Some("premium") => Some(SubscriptionType::Premium),
        _ => None,
    }
}

pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<OkResponse>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ApiError::Unauthorized("INVALID_SIGNATURE", "Missing webhook signature".into())
        })?;

    if !state.payments.verify_webhook(&body, signature) {
        return Err(ApiError::Unauthorized(
            "INVALID_SIGNATURE",
            "Webhook signature mismatch".into(),
        ));
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::validation(format!("unparseable webhook payload: {e}")))?;

    match event.event_type.as_str() {
        "checkout.session.completed" => {
            let object = &event.data.object;
            if let Some(appointment_id) = metadata_uuid(object, "appointment_id") {
                handle_appointment_paid(&state, appointment_id, object).await?;
            } else if let Some(user_id) = metadata_uuid(object, "user_id") {
                handle_subscription_started(&state, user_id, object).await?;
            } else {
                tracing::warn!(session = %object.id, "checkout completed without routable metadata");
            }
        }
        "customer.subscription.updated" => {
            let object = &event.data.object;
            if let (Some(user_id), Some(tier)) = (metadata_uuid(object, "user_id"), metadata_tier(object)) {
                sqlx::query(r#"UPDATE rider SET subscription_type = $2 WHERE user_id = $1"#)
                    .bind(user_id)
                    .bind(tier)
                    .execute(&state.db)
                    .await
                    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;
                tracing::info!(user_id = %user_id, tier = ?tier, "subscription tier synced");
            }
        }
        "transfer.created" => {
            let object = &event.data.object;
            if let Some(appointment_id) = metadata_uuid(object, "appointment_id") {
                sqlx::query(
                    r#"
                    UPDATE appointment
                    SET transferred_to_professional = true, updated_at = now()
                    WHERE appointment_id = $1
                    "#,
                )
                .bind(appointment_id)
                .execute(&state.db)
                .await
                .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;
                tracing::info!(appointment_id = %appointment_id, "payout transfer recorded");
            }
        }
        other => {
            // acknowledged so the processor stops retrying
            tracing::debug!(event_type = other, "ignoring webhook event");
        }
    }

    Ok(Json(OkResponse {
        data: OkData { ok: true },
    }))
}

async fn handle_appointment_paid(
    state: &AppState,
    appointment_id: Uuid,
    object: &WebhookObject,
) -> Result<(), ApiError> {
    let mode = object
        .metadata
        .get("checkout_mode")
        .and_then(|m| CheckoutMode::parse(m))
        .unwrap_or(CheckoutMode::Full);
    let target = paid_status_for(mode);

    let current: Option<AppointmentStatus> = sqlx::query_scalar(
        r#"SELECT status FROM appointment WHERE appointment_id = $1"#,
    )
    .bind(appointment_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let Some(current) = current else {
        tracing::warn!(appointment_id = %appointment_id, "payment for unknown appointment");
        return Ok(());
    };

    // A cancelled appointment keeps its payment state; the confirmation
    // is acknowledged but not applied (refunds run outside).
    if let Err(e) = lifecycle::validate_payment_progress(current, target) {
        tracing::warn!(appointment_id = %appointment_id, %e, "payment confirmation not applied");
        return Ok(());
    }

    sqlx::query(
        r#"
        UPDATE appointment
        SET payment_status = $2,
            payment_ref = $3,
            payment_method = COALESCE($4, payment_method),
            invoice_url = COALESCE($5, invoice_url),
            fee_collected = true,
            updated_at = now()
        WHERE appointment_id = $1
        "#,
    )
    .bind(appointment_id)
    .bind(target)
    .bind(&object.id)
    .bind(object.payment_method.as_deref())
    .bind(object.invoice_url.as_deref())
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    tracing::info!(
        appointment_id = %appointment_id,
        payment_status = ?target,
        "payment confirmed"
    );
    Ok(())
}

async fn handle_subscription_started(
    state: &AppState,
    user_id: Uuid,
    object: &WebhookObject,
) -> Result<(), ApiError> {
    let Some(tier) = metadata_tier(object) else {
        tracing::warn!(user_id = %user_id, "subscription checkout without tier metadata");
        return Ok(());
    };

    sqlx::query(
        r#"
        UPDATE rider
        SET subscription_type = $2,
            customer_ref = COALESCE($3, customer_ref),
            subscription_ref = COALESCE($4, subscription_ref)
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .bind(tier)
    .bind(object.customer.as_deref())
    .bind(object.subscription.as_deref())
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    tracing::info!(user_id = %user_id, tier = ?tier, "subscription activated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn object_with(metadata: &[(&str, &str)]) -> WebhookObject {
        WebhookObject {
            id: "cs_test".into(),
            metadata: metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            customer: None,
            subscription: None,
            invoice_url: None,
            payment_method: None,
        }
    }

    #[test]
    fn test_paid_status_for_mode() {
        assert_eq!(paid_status_for(CheckoutMode::Advance), PaymentStatus::PaidAdvance);
        assert_eq!(paid_status_for(CheckoutMode::Full), PaymentStatus::PaidComplete);
    }

    #[test]
    fn test_metadata_uuid_parsing() {
        let id = Uuid::new_v4();
        let object = object_with(&[("appointment_id", &id.to_string())]);
        assert_eq!(metadata_uuid(&object, "appointment_id"), Some(id));
        assert_eq!(metadata_uuid(&object, "user_id"), None);

        let broken = object_with(&[("appointment_id", "not-a-uuid")]);
        assert_eq!(metadata_uuid(&broken, "appointment_id"), None);
    }

    #[test]
    fn test_metadata_tier_parsing() {
        assert_eq!(
            metadata_tier(&object_with(&[("tier", "basic")])),
            Some(SubscriptionType::Basic)
        );
        assert_eq!(
            metadata_tier(&object_with(&[("tier", "premium")])),
            Some(SubscriptionType::Premium)
        );
        assert_eq!(metadata_tier(&object_with(&[("tier", "gold")])), None);
        assert_eq!(metadata_tier(&object_with(&[])), None);
    }
}
