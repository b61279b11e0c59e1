use axum::extract::State;
use axum::Json;
use chrono::Utc;
use metrics::increment_counter;
use serde_json::{json, Value};
use tracing::info;

use crate::chat::{recent_context, triggered_personas, CONTEXT_MESSAGES, MESSAGE_LOG_CAP};
use crate::entities::Message;
use crate::error::ApiError;
use crate::AppState;

pub async fn get_messages(State(state): State<AppState>) -> Json<Vec<Message>> {
    Json(state.store.messages().await)
}

/// Legacy developer chat endpoint. Field names are lenient (`author` or
/// `sender`, `text` or `message`) because the old frontends disagree.
pub async fn post_message(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let author = payload
        .get("author")
        .or_else(|| payload.get("sender"))
        .and_then(Value::as_str)
        .unwrap_or("Anonymous")
        .to_string();
    let text = payload
        .get("text")
        .or_else(|| payload.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    if text.is_empty() {
        return Err(ApiError::bad_request("empty text"));
    }
    info!("chat message from {author}");

    let mut messages = state.store.messages().await;
    messages.push(Message::new(author.clone(), text.clone(), Utc::now()));

    let triggered = triggered_personas(&text, &author);
    for persona in &triggered {
        increment_counter!("nexus_chat_trigger", "persona" => persona.name);
        let context = recent_context(&messages, CONTEXT_MESSAGES);
        if let Some(reply) = state.chat.reply(persona, &text, &context).await {
            messages.push(Message::new(persona.name.to_string(), reply, Utc::now()));
        }
    }

    if messages.len() > MESSAGE_LOG_CAP {
        let excess = messages.len() - MESSAGE_LOG_CAP;
        messages.drain(..excess);
    }
    state.store.save_messages(&messages).await?;

    Ok(Json(json!({
        "status": "ok",
        "ai_triggered": triggered.iter().map(|p| p.name).collect::<Vec<_>>(),
    })))
}
