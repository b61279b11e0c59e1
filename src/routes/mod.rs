use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod cart;
pub mod chat;
pub mod listing;
pub mod seller;
pub mod status;

/// Assemble the full HTTP surface. The prometheus layer and /metrics route
/// are attached in main, where the metric handle lives.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(status::health))
        .route("/status", get(status::status))
        .route("/api/analytics/summary", get(status::analytics_summary))
        .route("/api/listings", get(listing::list))
        .route("/api/listings/:id", get(listing::detail))
        .route("/api/sellers", get(listing::sellers))
        .route("/api/cart", get(cart::get_cart))
        .route("/api/cart/add", post(cart::add))
        .route("/api/cart/remove", post(cart::remove))
        .route("/api/cart/clear", post(cart::clear))
        .route("/api/checkout", post(cart::checkout))
        .route("/api/seller/register", post(seller::register))
        .route("/api/seller/sync", post(seller::sync))
        .route("/api/seller/listings", get(seller::my_listings))
        .route("/api/seller/orders", get(seller::my_orders))
        .route("/api/seller/order/:id/update", post(seller::update_order))
        .route("/dev/messages", get(chat::get_messages).post(chat::post_message))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
