//! Persistence of named segments.
//!
//! Records live in the sled tree `saved_filters`, keyed by the trimmed segment
//! name, with a JSON document as value. Every mutation runs inside a single sled
//! transaction so a failed rename never leaves both names behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::condition::ConditionTree;

const FILTER_TREE: &str = "saved_filters";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("saved filter '{0}' not found")]
    NotFound(String),

    #[error("a saved filter named '{0}' already exists")]
    ConstraintViolation(String),

    #[error("segment name is required")]
    InvalidName,

    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("corrupt saved filter record: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<TransactionError<StoreError>> for StoreError {
    fn from(err: TransactionError<StoreError>) -> Self {
        match err {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => StoreError::Storage(e),
        }
    }
}

/// A persisted segment definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedFilter {
    pub name: String,
    pub tree: ConditionTree,
    #[serde(default)]
    pub description: Option<String>,
    pub created_by: String,
    /// Refreshed on every update, so it doubles as "last modified"
    pub created_at: DateTime<Utc>,
}

pub trait FilterStore {
    /// Upserts `name`. When `previous_name` names a different record it is removed
    /// in the same transaction.
    fn save_or_update(
        &self,
        name: &str,
        tree: &ConditionTree,
        previous_name: Option<&str>,
    ) -> Result<SavedFilter, StoreError>;

    /// Inserts `name`, failing if it already exists.
    fn create(&self, name: &str, tree: &ConditionTree) -> Result<SavedFilter, StoreError>;

    /// Every saved filter, newest first, optionally narrowed by a
    /// case-insensitive substring of the name.
    fn list(&self, search: Option<&str>) -> Result<Vec<SavedFilter>, StoreError>;

    fn get(&self, name: &str) -> Result<SavedFilter, StoreError>;

    fn get_tree(&self, name: &str) -> Result<ConditionTree, StoreError> {
        self.get(name).map(|filter| filter.tree)
    }

    /// Returns whether a record was removed. Missing names are not an error.
    fn delete(&self, name: &str) -> Result<bool, StoreError>;

    /// Sets or clears the free-text description of an existing filter.
    fn describe(&self, name: &str, description: Option<&str>) -> Result<SavedFilter, StoreError>;
}

pub struct SledFilterStore {
    _db: sled::Db,
    filters: sled::Tree,
    created_by: String,
}

impl SledFilterStore {
    pub fn open(path: impl AsRef<Path>, created_by: impl Into<String>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::with_db(db, created_by.into())
    }

    /// A store that lives only as long as the process
    pub fn temporary(created_by: impl Into<String>) -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::with_db(db, created_by.into())
    }

    fn with_db(db: sled::Db, created_by: String) -> Result<Self, StoreError> {
        let filters = db.open_tree(FILTER_TREE)?;
        Ok(Self { _db: db, filters, created_by })
    }

    fn key(name: &str) -> Result<&str, StoreError> {
        let key = name.trim();
        if key.is_empty() {
            Err(StoreError::InvalidName)
        } else {
            Ok(key)
        }
    }
}

fn decode(bytes: &[u8]) -> Result<SavedFilter, StoreError> {
    Ok(serde_json::from_slice(bytes)?)
}

fn tx_get(tx: &TransactionalTree, key: &str) -> Result<Option<SavedFilter>, ConflictableTransactionError<StoreError>> {
    match tx.get(key)? {
        Some(bytes) => decode(&bytes).map(Some).map_err(ConflictableTransactionError::Abort),
        None => Ok(None),
    }
}

fn tx_put(tx: &TransactionalTree, record: &SavedFilter) -> Result<(), ConflictableTransactionError<StoreError>> {
    let bytes = serde_json::to_vec(record).map_err(|e| ConflictableTransactionError::Abort(e.into()))?;
    tx.insert(record.name.as_str(), bytes)?;
    Ok(())
}

impl FilterStore for SledFilterStore {
    fn save_or_update(
        &self,
        name: &str,
        tree: &ConditionTree,
        previous_name: Option<&str>,
    ) -> Result<SavedFilter, StoreError> {
        let key = Self::key(name)?;
        let previous = previous_name.map(str::trim).filter(|p| !p.is_empty() && *p != key);

        let saved = self.filters.transaction(|tx| {
            let renamed_from = match previous {
                Some(old) => tx_get(tx, old)?,
                None => None,
            };
            let existing = tx_get(tx, key)?;
            if let Some(old) = previous {
                tx.remove(old)?;
            }

            // An existing record under `name` is updated in place and keeps its
            // authorship and description; a plain rename carries them over
            let base = existing.or(renamed_from);
            let record = SavedFilter {
                name: key.to_string(),
                tree: tree.clone(),
                description: base.as_ref().and_then(|b| b.description.clone()),
                created_by: base.map_or_else(|| self.created_by.clone(), |b| b.created_by),
                created_at: Utc::now(),
            };
            tx_put(tx, &record)?;
            Ok::<_, ConflictableTransactionError<StoreError>>(record)
        })?;

        match previous {
            Some(old) => info!(from = old, to = key, "renamed saved filter"),
            None => info!(name = key, "saved filter"),
        }
        Ok(saved)
    }

    fn create(&self, name: &str, tree: &ConditionTree) -> Result<SavedFilter, StoreError> {
        let key = Self::key(name)?;
        let record = SavedFilter {
            name: key.to_string(),
            tree: tree.clone(),
            description: None,
            created_by: self.created_by.clone(),
            created_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&record)?;

        // compare_and_swap from None only succeeds for a fresh key
        self.filters
            .compare_and_swap(key, None as Option<&[u8]>, Some(bytes))?
            .map_err(|_| StoreError::ConstraintViolation(key.to_string()))?;

        info!(name = key, "created saved filter");
        Ok(record)
    }

    fn list(&self, search: Option<&str>) -> Result<Vec<SavedFilter>, StoreError> {
        let needle = search
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let mut filters = Vec::new();
        for item in self.filters.iter() {
            let (_key, value) = item?;
            let filter = decode(&value)?;
            if needle.as_ref().map_or(true, |n| filter.name.to_lowercase().contains(n.as_str())) {
                filters.push(filter);
            }
        }
        filters.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.name.cmp(&b.name)));

        debug!(count = filters.len(), search = ?needle, "listed saved filters");
        Ok(filters)
    }

    fn get(&self, name: &str) -> Result<SavedFilter, StoreError> {
        let key = Self::key(name)?;
        match self.filters.get(key)? {
            Some(bytes) => decode(&bytes),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let key = Self::key(name)?;
        let removed = self
            .filters
            .transaction(|tx| Ok::<_, ConflictableTransactionError<StoreError>>(tx.remove(key)?.is_some()))?;
        if removed {
            info!(name = key, "deleted saved filter");
        } else {
            debug!(name = key, "delete of missing saved filter ignored");
        }
        Ok(removed)
    }

    fn describe(&self, name: &str, description: Option<&str>) -> Result<SavedFilter, StoreError> {
        let key = Self::key(name)?;
        let description = description.map(str::trim).filter(|d| !d.is_empty()).map(str::to_string);

        let updated = self.filters.transaction(|tx| {
            let Some(mut record) = tx_get(tx, key)? else {
                return Err(ConflictableTransactionError::Abort(StoreError::NotFound(key.to_string())));
            };
            record.description = description.clone();
            tx_put(tx, &record)?;
            Ok(record)
        })?;

        info!(name = key, "updated saved filter description");
        Ok(updated)
    }
}
