//! File-backed listing persistence + immutable upload artifact storage.

use std::path::{Path, PathBuf};

use chrono::Utc;
use mavuno_core::{Listing, ListingDraft, ListingSource, ListingStatus, ListingType};
use mavuno_match::MatchEngine;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

pub const CRATE_NAME: &str = "mavuno-store";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("listing {0} not found")]
    NotFound(Uuid),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Optional facets for listing queries. `None` means "don't care".
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ListingFilter {
    #[serde(rename = "type")]
    pub kind: Option<ListingType>,
    pub source: Option<ListingSource>,
    pub status: Option<ListingStatus>,
}

impl ListingFilter {
    fn accepts(&self, listing: &Listing) -> bool {
        self.kind.map_or(true, |k| listing.kind == k)
            && self.source.map_or(true, |s| listing.source == s)
            && self.status.map_or(true, |s| listing.status == s)
    }
}

/// JSON-snapshot-backed listing store. Creation runs the match engine once
/// and embeds the result; every mutation rewrites the snapshot through an
/// atomic temp-file rename.
#[derive(Debug)]
pub struct ListingStore {
    snapshot_path: PathBuf,
    engine: MatchEngine,
    listings: Mutex<Vec<Listing>>,
}

impl ListingStore {
    /// Open (or initialize) a store under `data_dir`.
    pub async fn open(data_dir: impl Into<PathBuf>, engine: MatchEngine) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).await?;
        let snapshot_path = data_dir.join("listings.json");

        let listings = if fs::try_exists(&snapshot_path).await? {
            let bytes = fs::read(&snapshot_path).await?;
            serde_json::from_slice(&bytes)?
        } else {
            Vec::new()
        };

        Ok(Self {
            snapshot_path,
            engine,
            listings: Mutex::new(listings),
        })
    }

    pub fn engine(&self) -> &MatchEngine {
        &self.engine
    }

    /// Persist a new listing. This is the single point where the matcher
    /// runs for a listing; matches are immutable afterwards.
    pub async fn create(&self, draft: ListingDraft) -> Result<Listing, StoreError> {
        let matches = self.engine.match_listing(&draft);
        let listing = Listing::from_draft(Uuid::new_v4(), Utc::now(), draft, matches);

        let mut listings = self.listings.lock().await;
        listings.push(listing.clone());
        self.persist(&listings).await?;
        info!(id = %listing.id, county = %listing.county, matches = listing.matches.len(), "listing created");
        Ok(listing)
    }

    pub async fn get(&self, id: Uuid) -> Option<Listing> {
        self.listings.lock().await.iter().find(|l| l.id == id).cloned()
    }

    pub async fn list(&self) -> Vec<Listing> {
        self.listings.lock().await.clone()
    }

    pub async fn filtered(&self, filter: ListingFilter) -> Vec<Listing> {
        self.listings
            .lock()
            .await
            .iter()
            .filter(|l| filter.accepts(l))
            .cloned()
            .collect()
    }

    pub async fn waste_listings(&self) -> Vec<Listing> {
        self.listings
            .lock()
            .await
            .iter()
            .filter(|l| l.kind.is_waste())
            .cloned()
            .collect()
    }

    pub async fn update_status(&self, id: Uuid, status: ListingStatus) -> Result<Listing, StoreError> {
        let mut listings = self.listings.lock().await;
        let listing = listings
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or(StoreError::NotFound(id))?;
        listing.status = status;
        let updated = listing.clone();
        self.persist(&listings).await?;
        Ok(updated)
    }

    async fn persist(&self, listings: &[Listing]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(listings)?;
        let temp_path = self
            .snapshot_path
            .parent()
            .expect("snapshot path always has parent")
            .join(format!(".{}.tmp", Uuid::new_v4()));

        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);

        match fs::rename(&temp_path, &self.snapshot_path).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(err.into())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub content_hash: String,
    pub path: PathBuf,
    pub byte_size: usize,
    pub deduplicated: bool,
}

/// Immutable hash-addressed storage for raw uploaded files. Identical
/// bytes land on the same path and are not rewritten.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub async fn store_bytes(&self, extension: &str, bytes: &[u8]) -> Result<StoredUpload, StoreError> {
        let content_hash = Self::sha256_hex(bytes);
        let ext = extension.trim_start_matches('.').trim();
        let ext = if ext.is_empty() { "bin" } else { ext };
        let path = self.root.join(format!("{content_hash}.{ext}"));

        fs::create_dir_all(&self.root).await?;
        if fs::try_exists(&path).await? {
            return Ok(StoredUpload {
                content_hash,
                path,
                byte_size: bytes.len(),
                deduplicated: true,
            });
        }

        let temp_path = self.root.join(format!(".{}.tmp", Uuid::new_v4()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        match fs::rename(&temp_path, &path).await {
            Ok(()) => Ok(StoredUpload {
                content_hash,
                path,
                byte_size: bytes.len(),
                deduplicated: false,
            }),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                let _ = fs::remove_file(&temp_path).await;
                Ok(StoredUpload {
                    content_hash,
                    path,
                    byte_size: bytes.len(),
                    deduplicated: true,
                })
            }
            Err(err) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavuno_core::PostedBy;
    use tempfile::tempdir;

    fn mk_draft(kind: ListingType, county: &str) -> ListingDraft {
        ListingDraft {
            title: "Market day produce".to_string(),
            source: ListingSource::Farmer,
            kind,
            category: "Vegetables".to_string(),
            quantity: "40 crates".to_string(),
            value: 12_000.0,
            description: "Picked this morning".to_string(),
            county: county.to_string(),
            expiry_date: None,
            posted_by: PostedBy {
                id: "u9".to_string(),
                name: "Otieno".to_string(),
                organization: Some("Green Acres".to_string()),
            },
        }
    }

    #[tokio::test]
    async fn create_attaches_matches_and_survives_reopen() {
        let dir = tempdir().expect("tempdir");
        let store = ListingStore::open(dir.path(), MatchEngine::with_builtin_registry())
            .await
            .expect("open");

        let created = store.create(mk_draft(ListingType::Produce, "Nairobi")).await.expect("create");
        assert_eq!(created.status, ListingStatus::Available);
        assert_eq!(created.matches.len(), 3);
        assert_eq!(created.matches[0].name, "Nairobi Food Bank");

        let reopened = ListingStore::open(dir.path(), MatchEngine::with_builtin_registry())
            .await
            .expect("reopen");
        let loaded = reopened.get(created.id).await.expect("listing persisted");
        assert_eq!(loaded, created);
    }

    #[tokio::test]
    async fn waste_listings_are_stored_without_matches() {
        let dir = tempdir().expect("tempdir");
        let store = ListingStore::open(dir.path(), MatchEngine::with_builtin_registry())
            .await
            .expect("open");

        let created = store
            .create(mk_draft(ListingType::Biodegradable, "Nakuru"))
            .await
            .expect("create");
        assert!(created.matches.is_empty());
        assert_eq!(store.waste_listings().await.len(), 1);
    }

    #[tokio::test]
    async fn filters_narrow_by_type_source_and_status() {
        let dir = tempdir().expect("tempdir");
        let store = ListingStore::open(dir.path(), MatchEngine::with_builtin_registry())
            .await
            .expect("open");

        let surplus = store.create(mk_draft(ListingType::Surplus, "Kisumu")).await.expect("create");
        store.create(mk_draft(ListingType::Produce, "Kisumu")).await.expect("create");

        store
            .update_status(surplus.id, ListingStatus::PendingPickup)
            .await
            .expect("update");

        let filter = ListingFilter {
            status: Some(ListingStatus::PendingPickup),
            ..Default::default()
        };
        let rows = store.filtered(filter).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, surplus.id);

        let filter = ListingFilter {
            kind: Some(ListingType::Produce),
            ..Default::default()
        };
        assert_eq!(store.filtered(filter).await.len(), 1);
    }

    #[tokio::test]
    async fn status_update_on_unknown_id_is_not_found() {
        let dir = tempdir().expect("tempdir");
        let store = ListingStore::open(dir.path(), MatchEngine::with_builtin_registry())
            .await
            .expect("open");
        let missing = Uuid::new_v4();
        let err = store
            .update_status(missing, ListingStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn uploads_deduplicate_by_content_hash() {
        let dir = tempdir().expect("tempdir");
        let uploads = UploadStore::new(dir.path().join("uploads"));

        let first = uploads.store_bytes("csv", b"date,value\n").await.expect("first");
        let second = uploads.store_bytes("csv", b"date,value\n").await.expect("second");

        assert!(!first.deduplicated);
        assert!(second.deduplicated);
        assert_eq!(first.content_hash, second.content_hash);
        assert_eq!(first.path, second.path);
        assert!(first.path.exists());
    }
}
