use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::Json;
use metrics::{histogram, increment_counter};
use serde::{Deserialize, Serialize};

use crate::entities::{Listing, ListingStatus, PublicSeller};
use crate::error::ApiError;
use crate::AppState;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Debug, Default, Deserialize)]
pub struct ListingsQuery {
    pub name: Option<String>,
    pub set: Option<String>,
    pub rarity: Option<String>,
    pub condition: Option<String>,
    pub seller_id: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    /// `active` (default), `sold`, or `all`.
    pub status: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusFilter {
    Active,
    Sold,
    All,
}

impl StatusFilter {
    fn parse(raw: Option<&str>) -> Result<Self, ApiError> {
        match raw {
            None => Ok(Self::Active),
            Some(s) => match s.to_lowercase().as_str() {
                "active" => Ok(Self::Active),
                "sold" => Ok(Self::Sold),
                "all" => Ok(Self::All),
                other => Err(ApiError::bad_request(format!(
                    "unknown status filter `{other}`"
                ))),
            },
        }
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn matches(listing: &Listing, query: &ListingsQuery, status: StatusFilter) -> bool {
    let status_ok = match status {
        StatusFilter::Active => listing.is_active(),
        StatusFilter::Sold => listing.status == ListingStatus::Sold,
        StatusFilter::All => true,
    };

    status_ok
        && query
            .name
            .as_deref()
            .map_or(true, |n| contains_ci(&listing.card_name, n))
        && query
            .set
            .as_deref()
            .map_or(true, |s| contains_ci(&listing.set_code, s))
        && query.rarity.as_deref().map_or(true, |r| {
            listing
                .rarity
                .as_deref()
                .map_or(false, |lr| contains_ci(lr, r))
        })
        && query
            .condition
            .as_deref()
            .map_or(true, |c| contains_ci(&listing.condition, c))
        && query
            .seller_id
            .as_deref()
            .map_or(true, |s| listing.seller_id == s)
        && query.min_price.map_or(true, |min| listing.price >= min)
        && query.max_price.map_or(true, |max| listing.price <= max)
}

pub(crate) fn filter_listings<'a>(
    listings: &'a [Listing],
    query: &ListingsQuery,
) -> Result<Vec<&'a Listing>, ApiError> {
    let status = StatusFilter::parse(query.status.as_deref())?;
    Ok(listings
        .iter()
        .filter(|l| matches(l, query, status))
        .collect())
}

#[derive(Debug, Serialize)]
pub struct ListingsResponse {
    pub listings: Vec<Listing>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListingsQuery>,
) -> Result<Json<ListingsResponse>, ApiError> {
    increment_counter!("nexus_listings_request");
    let start = Instant::now();

    let all = state.store.listings().await;
    let filtered = filter_listings(&all, &query)?;
    let total = filtered.len();

    let page = query.page.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let listings: Vec<Listing> = filtered
        .into_iter()
        .skip(page * limit)
        .take(limit)
        .cloned()
        .collect();

    histogram!("nexus_listings_time", start.elapsed());

    Ok(Json(ListingsResponse {
        listings,
        total,
        page,
        limit,
    }))
}

#[derive(Debug, Serialize)]
pub struct ListingDetail {
    pub listing: Listing,
    /// Best-effort join; None when the seller record has gone missing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller: Option<PublicSeller>,
}

pub async fn detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ListingDetail>, ApiError> {
    let listings = state.store.listings().await;
    let listing = listings
        .iter()
        .find(|l| l.id == id)
        .cloned()
        .ok_or_else(|| ApiError::not_found(format!("listing {id} not found")))?;

    let sellers = state.store.sellers().await;
    let seller = sellers
        .iter()
        .find(|s| s.id == listing.seller_id)
        .map(PublicSeller::from);

    Ok(Json(ListingDetail { listing, seller }))
}

pub async fn sellers(State(state): State<AppState>) -> Json<Vec<PublicSeller>> {
    let sellers = state.store.sellers().await;
    Json(sellers.iter().map(PublicSeller::from).collect())
}
