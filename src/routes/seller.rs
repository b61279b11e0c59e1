use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use metrics::{histogram, increment_counter};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::entities::{Listing, ListingStatus, Order, OrderStatus, Seller, SellerStatus};
use crate::error::ApiError;
use crate::store::Store;
use crate::util::generate_api_key;
use crate::AppState;

const API_KEY_HEADER: &str = "x-api-key";

/// Resolve the `X-API-Key` header to a seller. Missing or unknown keys are
/// both a 401; the response does not distinguish them.
pub(crate) async fn authenticate(store: &Store, headers: &HeaderMap) -> Result<Seller, ApiError> {
    let key = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::InvalidApiKey)?;

    let sellers = store.sellers().await;
    sellers
        .into_iter()
        .find(|s| s.api_key == key)
        .ok_or(ApiError::InvalidApiKey)
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "shop_name is required"))]
    pub shop_name: String,
    #[validate(email(message = "a valid email is required"))]
    pub email: String,
    pub location: Option<String>,
}

/// Register a new seller. The response is the only place the generated API
/// key ever appears.
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<Seller>, ApiError> {
    payload
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let mut sellers = state.store.sellers().await;
    if sellers
        .iter()
        .any(|s| s.email.eq_ignore_ascii_case(&payload.email))
    {
        return Err(ApiError::bad_request("email already registered"));
    }

    let seller = Seller {
        id: Uuid::new_v4().to_string(),
        shop_name: payload.shop_name,
        email: payload.email,
        api_key: generate_api_key(),
        location: payload.location,
        status: SellerStatus::Active,
        created_at: Utc::now(),
    };
    sellers.push(seller.clone());
    state.store.save_sellers(&sellers).await?;

    increment_counter!("nexus_seller_register");
    info!("registered seller {}", seller.shop_name);

    Ok(Json(seller))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    #[default]
    Replace,
    Merge,
}

#[derive(Debug, Deserialize)]
pub struct SyncListing {
    pub card_name: String,
    pub set_code: String,
    pub condition: String,
    pub price: f64,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub mode: SyncMode,
    pub listings: Vec<SyncListing>,
}

/// Bulk-load a seller's inventory. Replace mode drops the seller's prior
/// listings first; merge appends. Each listing is enriched from the card
/// database, silently staying bare when the lookup fails.
pub async fn sync(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SyncRequest>,
) -> Result<Json<Value>, ApiError> {
    let seller = authenticate(&state.store, &headers).await?;
    info!(
        "Received sync of {} listings from {}",
        payload.listings.len(),
        seller.shop_name
    );

    for item in &payload.listings {
        if item.card_name.trim().is_empty() {
            return Err(ApiError::bad_request("card_name is required"));
        }
        if item.set_code.trim().is_empty() {
            return Err(ApiError::bad_request("set_code is required"));
        }
        if item.price < 0.0 {
            return Err(ApiError::bad_request("price must not be negative"));
        }
    }

    let sync_time = Instant::now();
    let mut listings = state.store.listings().await;
    if payload.mode == SyncMode::Replace {
        listings.retain(|l| l.seller_id != seller.id);
    }

    let mut inserted = 0usize;
    for item in payload.listings {
        let details = state.cards.lookup(&item.card_name, &item.set_code).await;
        let now = Utc::now();
        let (image_url, type_line, mana_cost, rarity) = match details {
            Some(d) => (d.image_url, d.type_line, d.mana_cost, d.rarity),
            None => (None, None, None, None),
        };

        listings.push(Listing {
            id: Uuid::new_v4().to_string(),
            seller_id: seller.id.clone(),
            card_name: item.card_name,
            set_code: item.set_code,
            condition: item.condition,
            price: item.price,
            quantity: item.quantity,
            status: if item.quantity == 0 {
                ListingStatus::Sold
            } else {
                ListingStatus::Active
            },
            image_url,
            type_line,
            mana_cost,
            rarity,
            created_at: now,
            updated_at: now,
        });
        inserted += 1;
    }

    state.store.save_listings(&listings).await?;
    state.summary_cache.invalidate(&()).await;

    let mode_label = match payload.mode {
        SyncMode::Replace => "replace",
        SyncMode::Merge => "merge",
    };
    increment_counter!("nexus_seller_sync", "mode" => mode_label);
    histogram!("nexus_seller_sync_time", sync_time.elapsed());

    Ok(Json(json!({
        "status": "ok",
        "mode": mode_label,
        "count": inserted,
    })))
}

/// The seller's own listings, all statuses included.
pub async fn my_listings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Listing>>, ApiError> {
    let seller = authenticate(&state.store, &headers).await?;
    let listings = state.store.listings().await;
    Ok(Json(
        listings
            .into_iter()
            .filter(|l| l.seller_id == seller.id)
            .collect(),
    ))
}

pub async fn my_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Order>>, ApiError> {
    let seller = authenticate(&state.store, &headers).await?;
    let orders = state.store.orders().await;
    Ok(Json(
        orders
            .into_iter()
            .filter(|o| o.seller_id == seller.id)
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderRequest {
    pub status: String,
}

/// Seller-side order status transition. Another seller's order id looks the
/// same as a missing one: 404 either way.
pub async fn update_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<UpdateOrderRequest>,
) -> Result<Json<Order>, ApiError> {
    let seller = authenticate(&state.store, &headers).await?;
    let status = OrderStatus::parse(&payload.status).ok_or_else(|| {
        ApiError::bad_request(format!("unknown order status `{}`", payload.status))
    })?;

    let mut orders = state.store.orders().await;
    let order = orders
        .iter_mut()
        .find(|o| o.id == id && o.seller_id == seller.id)
        .ok_or_else(|| ApiError::not_found(format!("order {id} not found")))?;

    order.status = status;
    order.updated_at = Utc::now();
    let updated = order.clone();
    state.store.save_orders(&orders).await?;

    info!("order {id} updated to {:?} by {}", status, seller.shop_name);
    Ok(Json(updated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_mode_defaults_to_replace() {
        let req: SyncRequest = serde_json::from_str(r#"{ "listings": [] }"#).unwrap();
        assert_eq!(req.mode, SyncMode::Replace);

        let req: SyncRequest =
            serde_json::from_str(r#"{ "mode": "merge", "listings": [] }"#).unwrap();
        assert_eq!(req.mode, SyncMode::Merge);
    }

    #[test]
    fn register_payload_validation() {
        let ok = RegisterRequest {
            shop_name: "Kevin's Cards".into(),
            email: "kevin@example.com".into(),
            location: None,
        };
        assert!(ok.validate().is_ok());

        let bad = RegisterRequest {
            shop_name: String::new(),
            email: "kevin@example.com".into(),
            location: None,
        };
        assert!(bad.validate().is_err());

        let bad = RegisterRequest {
            shop_name: "Kevin's Cards".into(),
            email: "nope".into(),
            location: None,
        };
        assert!(bad.validate().is_err());
    }
}
