use std::collections::HashMap;
use std::path::PathBuf;

use color_eyre::eyre::WrapErr;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::entities::{CartItem, Listing, Message, Order, Seller};

/// Flat-file JSON storage: one whole-file blob per collection, rewritten on
/// every mutation. No indexing, no partial writes, no locking — readers get
/// whatever the last completed write left behind.
#[derive(Debug, Clone)]
pub struct Store {
    data_dir: PathBuf,
}

impl Store {
    pub fn new(data_dir: impl Into<PathBuf>) -> color_eyre::Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)
            .wrap_err_with(|| format!("failed to create data dir {}", data_dir.display()))?;
        Ok(Self { data_dir })
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }

    /// Read a collection, degrading to the default on a missing or
    /// unparsable file.
    async fn read<T>(&self, file: &str) -> T
    where
        T: DeserializeOwned + Default,
    {
        let path = self.path(file);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return T::default(),
            Err(err) => {
                warn!("failed to read {}: {err}", path.display());
                return T::default();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(err) => {
                warn!("failed to parse {}: {err}", path.display());
                T::default()
            }
        }
    }

    /// Rewrite a collection in full. Pretty-printed so the files stay
    /// hand-inspectable.
    async fn write<T>(&self, file: &str, value: &T) -> color_eyre::Result<()>
    where
        T: Serialize,
    {
        let path = self.path(file);
        let bytes = serde_json::to_vec_pretty(value)
            .wrap_err_with(|| format!("failed to serialize {file}"))?;
        tokio::fs::write(&path, bytes)
            .await
            .wrap_err_with(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    pub async fn listings(&self) -> Vec<Listing> {
        self.read("listings.json").await
    }

    pub async fn save_listings(&self, listings: &[Listing]) -> color_eyre::Result<()> {
        self.write("listings.json", &listings).await
    }

    pub async fn sellers(&self) -> Vec<Seller> {
        self.read("sellers.json").await
    }

    pub async fn save_sellers(&self, sellers: &[Seller]) -> color_eyre::Result<()> {
        self.write("sellers.json", &sellers).await
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.read("orders.json").await
    }

    pub async fn save_orders(&self, orders: &[Order]) -> color_eyre::Result<()> {
        self.write("orders.json", &orders).await
    }

    pub async fn carts(&self) -> HashMap<String, Vec<CartItem>> {
        self.read("carts.json").await
    }

    pub async fn save_carts(&self, carts: &HashMap<String, Vec<CartItem>>) -> color_eyre::Result<()> {
        self.write("carts.json", carts).await
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.read("messages.json").await
    }

    pub async fn save_messages(&self, messages: &[Message]) -> color_eyre::Result<()> {
        self.write("messages.json", &messages).await
    }
}
