#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use moka::future::Cache;
use routes::status::AnalyticsSummary;

pub mod cards;
pub mod chat;
pub mod config;
pub mod entities;
pub mod error;
pub mod routes;
pub mod store;
pub mod util;

use cards::CardClient;
use chat::ChatResponder;
use config::Config;
use store::Store;

/// TTL for the analytics summary; it is also invalidated explicitly on
/// every mutation, the TTL just bounds staleness if an invalidation is
/// missed.
const SUMMARY_TTL_SECS: u64 = 60;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub cards: CardClient,
    pub chat: ChatResponder,
    // Since the summary is just 1 object, we make a simple cache.
    pub summary_cache: Cache<(), AnalyticsSummary>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: &Config) -> color_eyre::Result<Self> {
        let store = Store::new(&config.data_dir)?;
        let cards = CardClient::new(
            config.card_api_url.clone(),
            store.path("card_cache.json"),
        )?;
        let chat = ChatResponder::new(
            config.chat_api_url.clone(),
            config.chat_model.clone(),
            config.anthropic_api_key.clone(),
        )?;

        let summary_cache = Cache::builder()
            .max_capacity(1)
            .time_to_live(std::time::Duration::from_secs(SUMMARY_TTL_SECS))
            .build();

        Ok(Self {
            store,
            cards,
            chat,
            summary_cache,
            started_at: Utc::now(),
        })
    }
}
