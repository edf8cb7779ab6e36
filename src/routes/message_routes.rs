// src/routes/message_routes.rs

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, MessageRow},
};

const MAX_CONTENT_LEN: usize = 5000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/messages/previews", get(list_previews))
        .route("/messages/{user_id}", get(list_conversation).post(send_message))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// One row per counterpart: the latest message plus how many of their
/// messages the caller has not read yet.
#[derive(Debug, Serialize, PartialEq)]
pub struct ConversationPreview {
    pub counterpart_id: Uuid,
    pub last_message: String,
    pub last_sender_id: Uuid,
    pub last_sent_at: DateTime<Utc>,
    pub unread_count: i64,
}

fn validate_content(content: &str) -> Result<&str, ApiError> {
    let c = content.trim();
    if c.is_empty() {
        return Err(ApiError::validation("message content is required"));
    }
    if c.len() > MAX_CONTENT_LEN {
        return Err(ApiError::validation("message content is too long"));
    }
    Ok(c)
}

/// Fold messages (newest first) into per-counterpart previews, ordered
/// by recency. Unread counts only consider messages sent *to* `me`.
fn fold_previews(me: Uuid, rows: &[MessageRow]) -> Vec<ConversationPreview> {
    let mut previews: Vec<ConversationPreview> = Vec::new();
    for m in rows {
        let counterpart = if m.sender_id == me { m.receiver_id } else { m.sender_id };
        let unread = (m.receiver_id == me && !m.is_read) as i64;
        match previews.iter_mut().find(|p| p.counterpart_id == counterpart) {
            Some(p) => p.unread_count += unread,
            None => previews.push(ConversationPreview {
                counterpart_id: counterpart,
                last_message: m.content.clone(),
                last_sender_id: m.sender_id,
                last_sent_at: m.sent_at,
                unread_count: unread,
            }),
        }
    }
    previews
}

pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<ApiOk<MessageRow>>, ApiError> {
    let content = validate_content(&req.content)?;

    if user_id == auth.user_id {
        return Err(ApiError::validation("cannot message yourself"));
    }

    let receiver: Option<i32> = sqlx::query_scalar(
        r#"SELECT 1 FROM rider WHERE user_id = $1 AND is_active = true"#,
    )
    .bind(user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    if receiver.is_none() {
        return Err(ApiError::not_found("user"));
    }

    let row: MessageRow = sqlx::query_as::<_, MessageRow>(
        r#"
        INSERT INTO message (sender_id, receiver_id, content)
        VALUES ($1, $2, $3)
        RETURNING message_id, sender_id, receiver_id, content, is_read, sent_at
        "#,
    )
    .bind(auth.user_id)
    .bind(user_id)
    .bind(content)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk { data: row }))
}

/// Both directions, oldest first. Fetching a conversation marks the
/// counterpart's messages to the caller as read.
pub async fn list_conversation(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiOk<Vec<MessageRow>>>, ApiError> {
    let rows: Vec<MessageRow> = sqlx::query_as::<_, MessageRow>(
        r#"
        SELECT message_id, sender_id, receiver_id, content, is_read, sent_at
        FROM message
        WHERE (sender_id = $1 AND receiver_id = $2)
           OR (sender_id = $2 AND receiver_id = $1)
        ORDER BY sent_at ASC
        "#,
    )
    .bind(auth.user_id)
    .bind(user_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    // mark-read is best-effort; the poll loop retries anyway
    let _ = sqlx::query(
        r#"
        UPDATE message
        SET is_read = true
        WHERE sender_id = $2 AND receiver_id = $1 AND is_read = false
        "#,
    )
    .bind(auth.user_id)
    .bind(user_id)
    .execute(&state.db)
    .await;

    Ok(Json(ApiOk { data: rows }))
}

pub async fn list_previews(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<ConversationPreview>>>, ApiError> {
    let rows: Vec<MessageRow> = sqlx::query_as::<_, MessageRow>(
        r#"
        SELECT message_id, sender_id, receiver_id, content, is_read, sent_at
        FROM message
        WHERE sender_id = $1 OR receiver_id = $1
        ORDER BY sent_at DESC
        "#,
    )
    .bind(auth.user_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk {
        data: fold_previews(auth.user_id, &rows),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn msg(
        sender: Uuid,
        receiver: Uuid,
        content: &str,
        is_read: bool,
        minute: u32,
    ) -> MessageRow {
        MessageRow {
            message_id: Uuid::new_v4(),
            sender_id: sender,
            receiver_id: receiver,
            content: content.into(),
            is_read,
            sent_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, minute, 0).unwrap(),
        }
    }

    #[test]
    fn test_validate_content() {
        assert!(validate_content("hello").is_ok());
        assert_eq!(validate_content("  hi  ").unwrap(), "hi");
        assert!(validate_content("   ").is_err());
        assert!(validate_content(&"x".repeat(MAX_CONTENT_LEN + 1)).is_err());
    }

    #[test]
    fn test_fold_previews_counts_only_incoming_unread() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        // newest first, as the query returns them
        let rows = vec![
            msg(other, me, "are you coming?", false, 30),
            msg(me, other, "saddle is ready", false, 20), // my own unread flag never counts
            msg(other, me, "hello", true, 10),
        ];

        let previews = fold_previews(me, &rows);
        assert_eq!(previews.len(), 1);
        assert_eq!(previews[0].counterpart_id, other);
        assert_eq!(previews[0].last_message, "are you coming?");
        assert_eq!(previews[0].last_sender_id, other);
        assert_eq!(previews[0].unread_count, 1);
    }

    #[test]
    fn test_fold_previews_orders_counterparts_by_recency() {
        let me = Uuid::new_v4();
        let anna = Uuid::new_v4();
        let bert = Uuid::new_v4();
        let rows = vec![
            msg(bert, me, "newest", false, 40),
            msg(anna, me, "older", false, 30),
            msg(me, bert, "oldest", true, 10),
        ];

        let previews = fold_previews(me, &rows);
        assert_eq!(previews.len(), 2);
        assert_eq!(previews[0].counterpart_id, bert);
        assert_eq!(previews[0].last_message, "newest");
        assert_eq!(previews[1].counterpart_id, anna);
    }
}
