use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::{Json, TypedHeader};
use chrono::{DateTime, Utc};
use headers::Cookie;
use metrics::increment_counter;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::entities::{Buyer, CartItem, Listing, ListingStatus, Order, OrderItem, OrderStatus};
use crate::error::ApiError;
use crate::util::round_cents;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CartQuery {
    pub cart_id: Option<String>,
}

/// Carts are keyed by a client-supplied identifier: the `cart_id` cookie,
/// or a `cart_id` query parameter for cookie-less clients.
fn resolve_cart_id(
    cookie: Option<&TypedHeader<Cookie>>,
    query: &CartQuery,
) -> Result<String, ApiError> {
    if let Some(id) = cookie.and_then(|TypedHeader(c)| c.get("cart_id")) {
        return Ok(id.to_string());
    }
    query
        .cart_id
        .clone()
        .ok_or_else(|| ApiError::bad_request("missing cart_id"))
}

#[derive(Debug, Serialize)]
pub struct CartLine {
    pub listing_id: String,
    pub card_name: String,
    pub set_code: String,
    pub condition: String,
    pub price: f64,
    pub quantity: u32,
    pub line_total: f64,
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub cart_id: String,
    pub items: Vec<CartLine>,
    pub total: f64,
}

/// Join cart items against the current listings. Listings can vanish
/// between requests; dead references are skipped rather than erroring.
pub(crate) fn build_cart_view(
    cart_id: String,
    items: &[CartItem],
    listings: &[Listing],
) -> CartView {
    let mut lines = Vec::new();
    let mut total = 0.0;

    for item in items {
        let Some(listing) = listings.iter().find(|l| l.id == item.listing_id) else {
            continue;
        };
        let line_total = round_cents(listing.price * f64::from(item.quantity));
        total += line_total;
        lines.push(CartLine {
            listing_id: listing.id.clone(),
            card_name: listing.card_name.clone(),
            set_code: listing.set_code.clone(),
            condition: listing.condition.clone(),
            price: listing.price,
            quantity: item.quantity,
            line_total,
        });
    }

    CartView {
        cart_id,
        items: lines,
        total: round_cents(total),
    }
}

pub async fn get_cart(
    State(state): State<AppState>,
    cookie: Option<TypedHeader<Cookie>>,
    Query(query): Query<CartQuery>,
) -> Result<Json<CartView>, ApiError> {
    let cart_id = resolve_cart_id(cookie.as_ref(), &query)?;
    let carts = state.store.carts().await;
    let items = carts.get(&cart_id).cloned().unwrap_or_default();
    let listings = state.store.listings().await;
    Ok(Json(build_cart_view(cart_id, &items, &listings)))
}

#[derive(Debug, Deserialize)]
pub struct AddRequest {
    pub listing_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

/// Merge a line into the cart, holding the requested total within the
/// listing's available quantity.
pub(crate) fn add_to_cart(
    cart: &mut Vec<CartItem>,
    listing: &Listing,
    quantity: u32,
) -> Result<(), ApiError> {
    if quantity == 0 {
        return Err(ApiError::bad_request("quantity must be at least 1"));
    }

    let current = cart
        .iter()
        .find(|i| i.listing_id == listing.id)
        .map_or(0, |i| i.quantity);
    let requested = current + quantity;
    if requested > listing.quantity {
        return Err(ApiError::bad_request(format!(
            "insufficient quantity for {}",
            listing.card_name
        )));
    }

    if let Some(item) = cart.iter_mut().find(|i| i.listing_id == listing.id) {
        item.quantity = requested;
    } else {
        cart.push(CartItem {
            listing_id: listing.id.clone(),
            quantity,
        });
    }
    Ok(())
}

pub async fn add(
    State(state): State<AppState>,
    cookie: Option<TypedHeader<Cookie>>,
    Query(query): Query<CartQuery>,
    Json(payload): Json<AddRequest>,
) -> Result<Json<Value>, ApiError> {
    let cart_id = resolve_cart_id(cookie.as_ref(), &query)?;

    let listings = state.store.listings().await;
    let listing = listings
        .iter()
        .find(|l| l.id == payload.listing_id)
        .ok_or_else(|| {
            ApiError::bad_request(format!("unknown listing {}", payload.listing_id))
        })?;
    if !listing.is_active() {
        return Err(ApiError::bad_request(format!(
            "{} is no longer available",
            listing.card_name
        )));
    }

    let mut carts = state.store.carts().await;
    let cart = carts.entry(cart_id.clone()).or_default();
    add_to_cart(cart, listing, payload.quantity)?;
    let item_count = cart.len();
    state.store.save_carts(&carts).await?;

    Ok(Json(json!({
        "status": "ok",
        "cart_id": cart_id,
        "items": item_count,
    })))
}

#[derive(Debug, Deserialize)]
pub struct RemoveRequest {
    pub listing_id: String,
}

pub async fn remove(
    State(state): State<AppState>,
    cookie: Option<TypedHeader<Cookie>>,
    Query(query): Query<CartQuery>,
    Json(payload): Json<RemoveRequest>,
) -> Result<Json<Value>, ApiError> {
    let cart_id = resolve_cart_id(cookie.as_ref(), &query)?;

    let mut carts = state.store.carts().await;
    let item_count = match carts.get_mut(&cart_id) {
        Some(cart) => {
            cart.retain(|i| i.listing_id != payload.listing_id);
            cart.len()
        }
        None => 0,
    };
    state.store.save_carts(&carts).await?;

    Ok(Json(json!({
        "status": "ok",
        "cart_id": cart_id,
        "items": item_count,
    })))
}

pub async fn clear(
    State(state): State<AppState>,
    cookie: Option<TypedHeader<Cookie>>,
    Query(query): Query<CartQuery>,
) -> Result<Json<Value>, ApiError> {
    let cart_id = resolve_cart_id(cookie.as_ref(), &query)?;

    let mut carts = state.store.carts().await;
    carts.remove(&cart_id);
    state.store.save_carts(&carts).await?;

    Ok(Json(json!({ "status": "ok", "cart_id": cart_id })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate]
    pub buyer: BuyerInfo,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BuyerInfo {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(email(message = "a valid email is required"))]
    pub email: String,
    pub address: Option<String>,
}

/// Turn a cart into orders, one per seller represented in it. Validates
/// everything before mutating, so a rejected checkout leaves listings
/// untouched.
pub(crate) fn apply_checkout(
    listings: &mut [Listing],
    items: &[CartItem],
    buyer: &Buyer,
    now: DateTime<Utc>,
) -> Result<Vec<Order>, ApiError> {
    // Requested quantity per listing index; cart lines for the same
    // listing collapse together.
    let mut picks: BTreeMap<usize, u32> = BTreeMap::new();
    for item in items {
        let idx = listings
            .iter()
            .position(|l| l.id == item.listing_id)
            .ok_or_else(|| {
                ApiError::bad_request(format!("listing {} no longer exists", item.listing_id))
            })?;
        *picks.entry(idx).or_insert(0) += item.quantity;
    }

    for (&idx, &quantity) in &picks {
        let listing = &listings[idx];
        if quantity == 0 {
            return Err(ApiError::bad_request("quantity must be at least 1"));
        }
        if !listing.is_active() {
            return Err(ApiError::bad_request(format!(
                "{} is no longer available",
                listing.card_name
            )));
        }
        if quantity > listing.quantity {
            return Err(ApiError::bad_request(format!(
                "insufficient quantity for {}",
                listing.card_name
            )));
        }
    }

    let mut per_seller: BTreeMap<String, Vec<OrderItem>> = BTreeMap::new();
    for (&idx, &quantity) in &picks {
        let listing = &mut listings[idx];
        listing.quantity -= quantity;
        if listing.quantity == 0 {
            listing.status = ListingStatus::Sold;
        }
        listing.updated_at = now;

        per_seller
            .entry(listing.seller_id.clone())
            .or_default()
            .push(OrderItem {
                listing_id: listing.id.clone(),
                card_name: listing.card_name.clone(),
                set_code: listing.set_code.clone(),
                condition: listing.condition.clone(),
                price: listing.price,
                quantity,
            });
    }

    let orders = per_seller
        .into_iter()
        .map(|(seller_id, items)| {
            let total = round_cents(
                items
                    .iter()
                    .map(|i| i.price * f64::from(i.quantity))
                    .sum(),
            );
            Order {
                id: Uuid::new_v4().to_string(),
                seller_id,
                buyer: buyer.clone(),
                items,
                total,
                status: OrderStatus::Pending,
                created_at: now,
                updated_at: now,
            }
        })
        .collect();

    Ok(orders)
}

pub async fn checkout(
    State(state): State<AppState>,
    cookie: Option<TypedHeader<Cookie>>,
    Query(query): Query<CartQuery>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<Value>, ApiError> {
    increment_counter!("nexus_checkout_request");

    payload
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let cart_id = resolve_cart_id(cookie.as_ref(), &query)?;

    let mut carts = state.store.carts().await;
    let items = carts.get(&cart_id).cloned().unwrap_or_default();
    if items.is_empty() {
        return Err(ApiError::bad_request("cart is empty"));
    }

    let buyer = Buyer {
        name: payload.buyer.name,
        email: payload.buyer.email,
        address: payload.buyer.address,
    };

    let mut listings = state.store.listings().await;
    let orders = apply_checkout(&mut listings, &items, &buyer, Utc::now())?;

    state.store.save_listings(&listings).await?;

    let mut all_orders = state.store.orders().await;
    all_orders.extend(orders.iter().cloned());
    state.store.save_orders(&all_orders).await?;

    carts.remove(&cart_id);
    state.store.save_carts(&carts).await?;
    state.summary_cache.invalidate(&()).await;

    let grand_total = round_cents(orders.iter().map(|o| o.total).sum());
    info!(
        "checkout for cart {cart_id}: {} orders, total {grand_total}",
        orders.len()
    );

    Ok(Json(json!({
        "status": "ok",
        "orders": orders
            .iter()
            .map(|o| json!({
                "order_id": o.id,
                "seller_id": o.seller_id,
                "total": o.total,
            }))
            .collect::<Vec<_>>(),
        "total": grand_total,
    })))
}
