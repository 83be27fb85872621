//! # Durable Storage
//!
//! A single text slot holding the durable snapshot under
//! [`STATE_STORAGE_KEY`]. Backends:
//! - [`MemoryStore`]: in-process, with an optional quota to model a full
//!   store.
//! - [`RedbStore`]: a redb database file.

mod redb_store;

pub use redb_store::RedbStore;

use crate::FlexError;
use crate::primitives::STATE_STORAGE_KEY;

/// Key-value slot for the durable snapshot.
pub trait DurableStore {
    /// The stored snapshot text, if any.
    fn load(&self) -> Result<Option<String>, FlexError>;

    /// Replace the stored snapshot.
    fn store(&mut self, text: &str) -> Result<(), FlexError>;

    /// Remove the stored snapshot. Clearing an empty store is not an error.
    fn clear(&mut self) -> Result<(), FlexError>;
}

impl<S: DurableStore + ?Sized> DurableStore for Box<S> {
    fn load(&self) -> Result<Option<String>, FlexError> {
        (**self).load()
    }

    fn store(&mut self, text: &str) -> Result<(), FlexError> {
        (**self).store(text)
    }

    fn clear(&mut self) -> Result<(), FlexError> {
        (**self).clear()
    }
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// In-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    key: String,
    value: Option<String>,
    quota: Option<usize>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            key: STATE_STORAGE_KEY.to_string(),
            ..Self::default()
        }
    }

    /// A store that rejects writes larger than `bytes`.
    #[must_use]
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            quota: Some(bytes),
            ..Self::new()
        }
    }

    /// A store pre-seeded with `text`.
    #[must_use]
    pub fn seeded(text: impl Into<String>) -> Self {
        Self {
            value: Some(text.into()),
            ..Self::new()
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }
}

impl DurableStore for MemoryStore {
    fn load(&self) -> Result<Option<String>, FlexError> {
        Ok(self.value.clone())
    }

    fn store(&mut self, text: &str) -> Result<(), FlexError> {
        if let Some(quota) = self.quota
            && text.len() > quota
        {
            return Err(FlexError::IoError(format!(
                "Quota exceeded for '{}': {} > {quota} bytes",
                self.key,
                text.len()
            )));
        }
        self.value = Some(text.to_string());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), FlexError> {
        self.value = None;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
