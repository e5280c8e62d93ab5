use crate::models::{Record, Role};
use crate::services::store::{KvStore, StoreError};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

const RECORDS_KEY: &str = "records:v1";
const EMAIL_INDEX_KEY: &str = "records:v1:emails";
const SEEDED_MARKER_KEY: &str = "records:v1:seeded";

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("email already exists: {0}")]
    Conflict(String),

    #[error("invalid record input: {0}")]
    Validation(String),

    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),

    #[error("stored record is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// CRUD over the record collection.
///
/// Each record lives in its own hash field, with a companion hash mapping the
/// lower-cased email to the owning id. A record and its index entry are
/// always written and removed together in one atomic store operation.
#[derive(Clone)]
pub struct RecordRepository {
    store: Arc<dyn KvStore>,
}

impl RecordRepository {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Write the sample records unless the collection already exists.
    pub async fn ensure_seeded(&self) -> Result<bool, RepositoryError> {
        if self.store.exists(SEEDED_MARKER_KEY).await? {
            tracing::debug!("Record collection present, skipping seed");
            return Ok(false);
        }

        // A seed already present (from an interrupted earlier run) is skipped.
        for record in seed_records() {
            let json = serde_json::to_string(&record)?;
            self.store
                .insert_unique(
                    RECORDS_KEY,
                    &record.id.to_string(),
                    &json,
                    EMAIL_INDEX_KEY,
                    &record.email_key(),
                )
                .await?;
        }
        self.store
            .set(SEEDED_MARKER_KEY, &Utc::now().to_rfc3339())
            .await?;

        tracing::info!("Seeded record collection");
        Ok(true)
    }

    /// All records ordered by creation time, then id.
    pub async fn list(&self) -> Result<Vec<Record>, RepositoryError> {
        let mut records = self
            .store
            .hash_values(RECORDS_KEY)
            .await?
            .iter()
            .map(|raw| serde_json::from_str::<Record>(raw))
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Record, RepositoryError> {
        let raw = self
            .store
            .hash_get(RECORDS_KEY, id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub async fn create(
        &self,
        name: &str,
        email: &str,
        role: Option<Role>,
    ) -> Result<Record, RepositoryError> {
        let name = name.trim();
        let email = email.trim();
        if name.is_empty() || email.is_empty() {
            return Err(RepositoryError::Validation(
                "name and email are required".to_string(),
            ));
        }

        let record = Record::new(name.to_string(), email.to_string(), role.unwrap_or_default());
        let id = record.id.to_string();
        let json = serde_json::to_string(&record)?;

        let inserted = self
            .store
            .insert_unique(RECORDS_KEY, &id, &json, EMAIL_INDEX_KEY, &record.email_key())
            .await?;
        if !inserted {
            return Err(RepositoryError::Conflict(email.to_string()));
        }

        tracing::info!(record_id = %id, "Record created");
        Ok(record)
    }

    pub async fn delete_by_id(&self, id: &str) -> Result<(), RepositoryError> {
        let record = self.get_by_id(id).await?;

        let removed = self
            .store
            .remove_unique(RECORDS_KEY, id, EMAIL_INDEX_KEY, &record.email_key())
            .await?;
        if !removed {
            // Removed concurrently between the read and the delete.
            return Err(RepositoryError::NotFound(id.to_string()));
        }

        tracing::info!(record_id = %id, "Record deleted");
        Ok(())
    }
}

/// Sample data written on first start. Fixed ids and timestamps keep
/// repeated seeding byte-for-byte identical.
pub fn seed_records() -> Vec<Record> {
    let seeds = [
        (
            "6f1c2a9e-4b7d-4c3a-9f0e-1d2b3c4d5e60",
            "Alice Johnson",
            "alice@example.com",
            Role::Admin,
            1_704_067_200,
        ),
        (
            "8a3d5b1f-2c6e-4d7a-8b9c-0e1f2a3b4c5d",
            "Bob Smith",
            "bob@example.com",
            Role::User,
            1_704_153_600,
        ),
        (
            "c4e6f8a0-1b3d-4e5f-a7b9-c1d3e5f7a9b1",
            "Carol White",
            "carol@example.com",
            Role::User,
            1_704_240_000,
        ),
    ];

    seeds
        .iter()
        .filter_map(|(id, name, email, role, ts)| {
            let created_at: DateTime<Utc> = Utc.timestamp_opt(*ts, 0).single()?;
            Some(Record {
                id: Uuid::parse_str(id).ok()?,
                name: name.to_string(),
                email: email.to_string(),
                role: *role,
                created_at,
            })
        })
        .collect()
}
