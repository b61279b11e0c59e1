use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use color_eyre::eyre::WrapErr;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::entities::CardDetails;

/// Cached card metadata expires after a week; prices and images on the
/// upstream database barely move faster than that.
pub const CACHE_TTL_DAYS: i64 = 7;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CACHE_CAPACITY: u64 = 50_000;

type CardKey = (String, String);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedCard {
    pub details: CardDetails,
    pub fetched_at: DateTime<Utc>,
}

impl CachedCard {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.fetched_at < chrono::Duration::days(CACHE_TTL_DAYS)
    }
}

/// One row of the on-disk cache snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotEntry {
    name: String,
    set_code: String,
    fetched_at: DateTime<Utc>,
    details: CardDetails,
}

/// Client for the external card-metadata API, with a 7-day in-memory cache
/// keyed by (name, set) and a JSON snapshot persisted to disk.
#[derive(Clone)]
pub struct CardClient {
    http: reqwest::Client,
    base_url: String,
    cache: Cache<CardKey, CachedCard>,
    snapshot_path: PathBuf,
}

impl CardClient {
    pub fn new(base_url: String, snapshot_path: PathBuf) -> color_eyre::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .wrap_err("failed to build card API client")?;

        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(Duration::from_secs(CACHE_TTL_DAYS as u64 * 24 * 3600))
            .build();

        Ok(Self {
            http,
            base_url,
            cache,
            snapshot_path,
        })
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Look up card metadata, serving from cache when fresh. Any failure
    /// degrades to `None`; listings simply stay unenriched.
    pub async fn lookup(&self, name: &str, set: &str) -> Option<CardDetails> {
        let key = (name.to_lowercase(), set.to_lowercase());

        if let Some(hit) = self.cache.get(&key) {
            // Snapshot-restored entries carry their original fetch time, so
            // re-check age rather than trusting the moka TTL alone.
            if hit.is_fresh(Utc::now()) {
                debug!("card cache hit for {name} ({set})");
                return Some(hit.details);
            }
            self.cache.invalidate(&key).await;
        }

        metrics::increment_counter!("nexus_card_lookup", "cache" => "miss");

        match self.fetch(name, set).await {
            Ok(Some(details)) => {
                self.cache
                    .insert(
                        key,
                        CachedCard {
                            details: details.clone(),
                            fetched_at: Utc::now(),
                        },
                    )
                    .await;
                Some(details)
            }
            Ok(None) => {
                debug!("card not found upstream: {name} ({set})");
                None
            }
            Err(err) => {
                warn!("card lookup failed for {name} ({set}): {err}");
                None
            }
        }
    }

    async fn fetch(&self, name: &str, set: &str) -> color_eyre::Result<Option<CardDetails>> {
        let url = format!("{}/cards/named", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("exact", name), ("set", set)])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: Value = response.error_for_status()?.json().await?;
        Ok(Some(parse_card(&body)))
    }

    /// Restore the cache from the on-disk snapshot, skipping entries past
    /// their 7-day expiry. Missing or unparsable snapshots start empty.
    pub async fn load_snapshot(&self) {
        let bytes = match tokio::fs::read(&self.snapshot_path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
            Err(err) => {
                warn!(
                    "failed to read card cache snapshot {}: {err}",
                    self.snapshot_path.display()
                );
                return;
            }
        };

        let entries: Vec<SnapshotEntry> = match serde_json::from_slice(&bytes) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(
                    "failed to parse card cache snapshot {}: {err}",
                    self.snapshot_path.display()
                );
                return;
            }
        };

        let now = Utc::now();
        let mut restored = 0usize;
        for entry in entries {
            let cached = CachedCard {
                details: entry.details,
                fetched_at: entry.fetched_at,
            };
            if cached.is_fresh(now) {
                self.cache
                    .insert((entry.name, entry.set_code), cached)
                    .await;
                restored += 1;
            }
        }
        info!("restored {restored} cached cards from snapshot");
    }

    /// Persist the cache to disk. Run periodically from the scheduler.
    pub async fn flush_snapshot(&self) -> color_eyre::Result<()> {
        let entries: Vec<SnapshotEntry> = self
            .cache
            .iter()
            .map(|(key, cached)| SnapshotEntry {
                name: key.0.clone(),
                set_code: key.1.clone(),
                fetched_at: cached.fetched_at,
                details: cached.details,
            })
            .collect();

        let bytes = serde_json::to_vec_pretty(&entries)
            .wrap_err("failed to serialize card cache snapshot")?;
        tokio::fs::write(&self.snapshot_path, bytes)
            .await
            .wrap_err_with(|| {
                format!(
                    "failed to write card cache snapshot {}",
                    self.snapshot_path.display()
                )
            })?;
        debug!("flushed {} cached cards to snapshot", entries.len());
        Ok(())
    }
}

/// Pull the fields we care about out of the card API's response JSON.
///
/// Expected shape (Scryfall-style):
/// `{ "image_uris": { "normal": "..." }, "type_line": "...",
///    "mana_cost": "...", "rarity": "..." }`
pub(crate) fn parse_card(v: &Value) -> CardDetails {
    CardDetails {
        image_url: v
            .get("image_uris")
            .and_then(|uris| uris.get("normal"))
            .and_then(Value::as_str)
            .map(str::to_string),
        type_line: v
            .get("type_line")
            .and_then(Value::as_str)
            .map(str::to_string),
        mana_cost: v
            .get("mana_cost")
            .and_then(Value::as_str)
            .map(str::to_string),
        rarity: v.get("rarity").and_then(Value::as_str).map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_card_full_payload() {
        let body = json!({
            "name": "Lightning Bolt",
            "image_uris": { "small": "s.jpg", "normal": "n.jpg" },
            "type_line": "Instant",
            "mana_cost": "{R}",
            "rarity": "uncommon"
        });
        let details = parse_card(&body);
        assert_eq!(details.image_url.as_deref(), Some("n.jpg"));
        assert_eq!(details.type_line.as_deref(), Some("Instant"));
        assert_eq!(details.mana_cost.as_deref(), Some("{R}"));
        assert_eq!(details.rarity.as_deref(), Some("uncommon"));
    }

    #[test]
    fn parse_card_partial_payload() {
        let body = json!({ "name": "Some Card", "rarity": "rare" });
        let details = parse_card(&body);
        assert!(details.image_url.is_none());
        assert!(details.type_line.is_none());
        assert_eq!(details.rarity.as_deref(), Some("rare"));
    }

    #[test]
    fn freshness_window_is_seven_days() {
        let now = Utc::now();
        let fresh = CachedCard {
            details: CardDetails {
                image_url: None,
                type_line: None,
                mana_cost: None,
                rarity: None,
            },
            fetched_at: now - chrono::Duration::days(6),
        };
        let stale = CachedCard {
            fetched_at: now - chrono::Duration::days(8),
            ..fresh.clone()
        };
        assert!(fresh.is_fresh(now));
        assert!(!stale.is_fresh(now));
    }

    fn tmp(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("nexus_cards_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn snapshot_round_trip_drops_expired_entries() {
        let dir = tmp("snapshot");
        let path = dir.join("card_cache.json");

        let entries = vec![
            SnapshotEntry {
                name: "lightning bolt".into(),
                set_code: "lea".into(),
                fetched_at: Utc::now() - chrono::Duration::days(1),
                details: CardDetails {
                    image_url: Some("n.jpg".into()),
                    type_line: Some("Instant".into()),
                    mana_cost: Some("{R}".into()),
                    rarity: Some("common".into()),
                },
            },
            SnapshotEntry {
                name: "black lotus".into(),
                set_code: "lea".into(),
                fetched_at: Utc::now() - chrono::Duration::days(30),
                details: CardDetails {
                    image_url: None,
                    type_line: None,
                    mana_cost: None,
                    rarity: Some("rare".into()),
                },
            },
        ];
        std::fs::write(&path, serde_json::to_vec_pretty(&entries).unwrap()).unwrap();

        let client = CardClient::new("http://127.0.0.1:9".into(), path.clone()).unwrap();
        client.load_snapshot().await;

        // Only the fresh entry survives the restore.
        let hit = client.lookup("Lightning Bolt", "LEA").await;
        assert_eq!(hit.unwrap().image_url.as_deref(), Some("n.jpg"));
        // The expired entry is gone; the refetch against an unroutable base
        // URL degrades to None.
        assert!(client.lookup("Black Lotus", "LEA").await.is_none());

        client.flush_snapshot().await.unwrap();
        let flushed: Vec<SnapshotEntry> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].name, "lightning bolt");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn lookup_against_mock_server() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await;

            let body = r#"{"name":"Counterspell","image_uris":{"normal":"cs.jpg"},"type_line":"Instant","mana_cost":"{U}{U}","rarity":"common"}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
        });

        let dir = tmp("mock");
        let client =
            CardClient::new(format!("http://{addr}"), dir.join("card_cache.json")).unwrap();

        let details = client.lookup("Counterspell", "MMQ").await.unwrap();
        assert_eq!(details.image_url.as_deref(), Some("cs.jpg"));
        assert_eq!(details.mana_cost.as_deref(), Some("{U}{U}"));

        // Second lookup hits the cache; the mock server is already gone.
        let _ = server.await;
        let cached = client.lookup("Counterspell", "MMQ").await.unwrap();
        assert_eq!(cached.image_url.as_deref(), Some("cs.jpg"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn unreachable_api_degrades_to_none() {
        let dir = tmp("unreachable");
        let client =
            CardClient::new("http://127.0.0.1:9".into(), dir.join("card_cache.json")).unwrap();
        assert!(client.lookup("Anything", "XXX").await.is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
