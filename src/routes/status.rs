use std::collections::{BTreeMap, HashSet};

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::entities::Listing;
use crate::util::round_cents;
use crate::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

pub async fn status(State(state): State<AppState>) -> Json<Value> {
    let listings = state.store.listings().await;
    let active = listings.iter().filter(|l| l.is_active()).count();
    let sellers = state.store.sellers().await.len();
    let orders = state.store.orders().await.len();
    let uptime_secs = (Utc::now() - state.started_at).num_seconds();

    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "listings": listings.len(),
        "active_listings": active,
        "sellers": sellers,
        "orders": orders,
        "cached_cards": state.cards.entry_count(),
        "uptime_secs": uptime_secs,
    }))
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSummary {
    pub total_value: f64,
    pub total_cards: u32,
    pub unique_cards: usize,
    pub rarities: BTreeMap<String, u32>,
    pub average_value: f64,
}

/// Aggregate over active listings only; sold stock is not part of the
/// storefront's value.
pub(crate) fn compute_summary(listings: &[Listing]) -> AnalyticsSummary {
    let active: Vec<&Listing> = listings.iter().filter(|l| l.is_active()).collect();

    let total_cards: u32 = active.iter().map(|l| l.quantity).sum();
    let total_value = round_cents(
        active
            .iter()
            .map(|l| l.price * f64::from(l.quantity))
            .sum(),
    );
    let unique_cards = active
        .iter()
        .map(|l| l.card_name.to_lowercase())
        .collect::<HashSet<_>>()
        .len();

    let mut rarities: BTreeMap<String, u32> = BTreeMap::new();
    for listing in &active {
        let rarity = listing.rarity.clone().unwrap_or_else(|| "unknown".into());
        *rarities.entry(rarity).or_insert(0) += listing.quantity;
    }

    let average_value = if total_cards > 0 {
        round_cents(total_value / f64::from(total_cards))
    } else {
        0.0
    };

    AnalyticsSummary {
        total_value,
        total_cards,
        unique_cards,
        rarities,
        average_value,
    }
}

pub async fn analytics_summary(State(state): State<AppState>) -> Json<AnalyticsSummary> {
    let store = state.store.clone();
    let summary = state
        .summary_cache
        .get_with((), async move { compute_summary(&store.listings().await) })
        .await;
    Json(summary)
}
