// src/routes/ai_routes.rs

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, HorseRow},
};

const MAX_PROMPT_LEN: usize = 4000;

pub fn router() -> Router<AppState> {
    Router::new().route("/ai/chat", post(chat))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
    /// Include the caller's horses as context for care questions.
    pub include_horses: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ChatData {
    pub reply: String,
}

fn validate_prompt(prompt: &str) -> Result<&str, ApiError> {
    let p = prompt.trim();
    if p.is_empty() {
        return Err(ApiError::validation("prompt is required"));
    }
    if p.len() > MAX_PROMPT_LEN {
        return Err(ApiError::validation("prompt is too long"));
    }
    Ok(p)
}

/// One line per horse, enough for the model to personalize advice.
fn horses_context(horses: &[HorseRow]) -> String {
    horses
        .iter()
        .map(|h| {
            let mut line = format!("- {}", h.name);
            if let Some(breed) = &h.breed {
                line.push_str(&format!(", {breed}"));
            }
            if let Some(year) = h.birth_year {
                line.push_str(&format!(", born {year}"));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn chat(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ApiOk<ChatData>>, ApiError> {
    let prompt = validate_prompt(&req.prompt)?;

    let context = if req.include_horses.unwrap_or(false) {
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

        if horses.is_empty() {
            None
        } else {
            Some(horses_context(&horses))
        }
    } else {
        None
    };

    let reply = state.assistant.chat(prompt, context.as_deref()).await?;

    Ok(Json(ApiOk {
        data: ChatData { reply },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_validate_prompt() {
        assert_eq!(validate_prompt("  how often to shoe?  ").unwrap(), "how often to shoe?");
        assert!(validate_prompt("   ").is_err());
        assert!(validate_prompt(&"y".repeat(MAX_PROMPT_LEN + 1)).is_err());
    }

    #[test]
    fn test_horses_context_lines() {
        let now = Utc::now();
        let horses = vec![
            HorseRow {
                horse_id: Uuid::new_v4(),
                owner_id: Uuid::new_v4(),
                name: "Luna".into(),
                breed: Some("Haflinger".into()),
                birth_year: Some(2015),
                notes: None,
                created_at: now,
                updated_at: now,
            },
            HorseRow {
                horse_id: Uuid::new_v4(),
                owner_id: Uuid::new_v4(),
                name: "Max".into(),
                breed: None,
                birth_year: None,
                notes: None,
                created_at: now,
                updated_at: now,
            },
        ];
        assert_eq!(horses_context(&horses), "- Luna, Haflinger, born 2015\n- Max");
    }
}
