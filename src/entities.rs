use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Active,
    Sold,
}

/// A seller's offer for a specific card/condition/quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub seller_id: String,
    pub card_name: String,
    pub set_code: String,
    pub condition: String,
    pub price: f64,
    pub quantity: u32,
    pub status: ListingStatus,
    // Enrichment fields, absent when the card lookup failed or never ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mana_cost: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rarity: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    pub fn is_active(&self) -> bool {
        self.status == ListingStatus::Active && self.quantity > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SellerStatus {
    Active,
    Suspended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seller {
    pub id: String,
    pub shop_name: String,
    pub email: String,
    /// Bearer credential for the seller endpoints. Returned once at
    /// registration, never through the public directory.
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub status: SellerStatus,
    pub created_at: DateTime<Utc>,
}

/// Buyer-facing view of a seller, with credentials and contact stripped.
#[derive(Debug, Clone, Serialize)]
pub struct PublicSeller {
    pub id: String,
    pub shop_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub status: SellerStatus,
}

impl From<&Seller> for PublicSeller {
    fn from(s: &Seller) -> Self {
        Self {
            id: s.id.clone(),
            shop_name: s.shop_name.clone(),
            location: s.location.clone(),
            status: s.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub listing_id: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Shipped,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Parse a status supplied by a seller update. Unknown values are a
    /// validation error, not a silent default.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "shipped" => Some(Self::Shipped),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Buyer {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Snapshot of a listing at purchase time. Listings keep mutating after
/// checkout, so orders carry their own copy of the fields that matter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub listing_id: String,
    pub card_name: String,
    pub set_code: String,
    pub condition: String,
    pub price: f64,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub seller_id: String,
    pub buyer: Buyer,
    pub items: Vec<OrderItem>,
    pub total: f64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub author: String,
    pub text: String,
    /// Clock-face time for the chat UI, e.g. "03:45 PM".
    pub time: String,
    pub datetime: DateTime<Utc>,
}

impl Message {
    pub fn new(author: String, text: String, now: DateTime<Utc>) -> Self {
        Self {
            author,
            text,
            time: now.format("%I:%M %p").to_string(),
            datetime: now,
        }
    }
}

/// Metadata fetched from the external card database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mana_cost: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rarity: Option<String>,
}
