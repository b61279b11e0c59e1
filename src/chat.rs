use std::time::Duration;

use color_eyre::eyre::{eyre, WrapErr};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::entities::Message;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const REPLY_MAX_TOKENS: u32 = 500;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How many trailing messages get packed into the prompt as context.
pub const CONTEXT_MESSAGES: usize = 5;

/// The message log keeps only this many recent entries.
pub const MESSAGE_LOG_CAP: usize = 100;

/// A scripted developer persona. Mentioning its trigger word in a chat
/// message makes it reply.
#[derive(Debug)]
pub struct Persona {
    pub name: &'static str,
    pub trigger: &'static str,
    pub system_prompt: &'static str,
}

pub const PERSONAS: &[Persona] = &[
    Persona {
        name: "jacques",
        trigger: "jacques",
        system_prompt: "You are Jacques, a skilled Python developer helping Kevin \
            with his card marketplace project. You're casual, helpful, and concise. \
            Part of Kevin's dev squad.",
    },
    Persona {
        name: "mendel",
        trigger: "mendel",
        system_prompt: "You are Mendel, the IDE AI in Kevin's dev squad. You're \
            technical and efficient. You live in the editor: write code, debug, deploy.",
    },
    Persona {
        name: "clouse",
        trigger: "clouse",
        system_prompt: "You are Clouse, the browser agent AI in Kevin's dev squad. \
            You navigate the web, scrape data, interact with websites. Keep responses \
            short and action-oriented.",
    },
];

/// Personas whose trigger word appears in `text`. A persona never triggers
/// on its own messages.
pub fn triggered_personas(text: &str, author: &str) -> Vec<&'static Persona> {
    let text = text.to_lowercase();
    PERSONAS
        .iter()
        .filter(|p| !author.eq_ignore_ascii_case(p.name))
        .filter(|p| text.contains(p.trigger))
        .collect()
}

/// Format the last few messages as `author: text` lines for the prompt.
pub fn recent_context(messages: &[Message], limit: usize) -> String {
    let start = messages.len().saturating_sub(limit);
    messages[start..]
        .iter()
        .map(|m| format!("{}: {}", m.author, m.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Client for the chat-completion API. Without a key it stays disabled and
/// every reply attempt is skipped with a log line.
#[derive(Clone)]
pub struct ChatResponder {
    http: reqwest::Client,
    api_url: String,
    model: String,
    api_key: Option<String>,
}

impl ChatResponder {
    pub fn new(
        api_url: String,
        model: String,
        api_key: Option<String>,
    ) -> color_eyre::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .wrap_err("failed to build chat API client")?;
        Ok(Self {
            http,
            api_url,
            model,
            api_key,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Ask the completion API for a persona reply. Failures are logged and
    /// collapse to `None`; the chat simply carries on without the persona.
    pub async fn reply(
        &self,
        persona: &Persona,
        latest: &str,
        context: &str,
    ) -> Option<String> {
        let Some(api_key) = self.api_key.as_deref().filter(|k| !k.is_empty()) else {
            debug!("chat responder disabled, skipping {}", persona.name);
            return None;
        };

        let prompt = if context.is_empty() {
            latest.to_string()
        } else {
            format!("Recent chat:\n{context}\n\nLatest: {latest}")
        };

        match self.request(api_key, persona, &prompt).await {
            Ok(text) => Some(text),
            Err(err) => {
                warn!("chat completion failed for {}: {err}", persona.name);
                None
            }
        }
    }

    async fn request(
        &self,
        api_key: &str,
        persona: &Persona,
        prompt: &str,
    ) -> color_eyre::Result<String> {
        let body = json!({
            "model": self.model,
            "max_tokens": REPLY_MAX_TOKENS,
            "system": persona.system_prompt,
            "messages": [{ "role": "user", "content": prompt }]
        });

        let response = self
            .http
            .post(&self.api_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let payload: Value = response.json().await?;
        parse_reply_text(&payload).ok_or_else(|| eyre!("no text content in completion response"))
    }
}

/// Extract the first text block from a Messages API response.
///
/// Expected shape: `{ "content": [ { "type": "text", "text": "..." } ] }`
pub(crate) fn parse_reply_text(v: &Value) -> Option<String> {
    v.get("content")?
        .get(0)?
        .get("text")?
        .as_str()
        .map(str::to_string)
}
