//! Preference store trait definitions

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;

/// Immutable snapshot of every stored preference
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Preferences {
    entries: BTreeMap<String, String>,
}

impl Preferences {
    /// Create a snapshot from existing entries
    pub fn from_entries(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }

    /// Get the value stored under `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in key order
    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    /// Apply mutations in order, returning the resulting snapshot
    pub fn apply(&self, mutations: &[PreferenceMutation]) -> Self {
        let mut entries = self.entries.clone();
        for mutation in mutations {
            match mutation {
                PreferenceMutation::Set { key, value } => {
                    entries.insert(key.clone(), value.clone());
                }
                PreferenceMutation::Remove { key } => {
                    entries.remove(key);
                }
            }
        }
        Self { entries }
    }
}

/// One change inside an atomic edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreferenceMutation {
    Set { key: String, value: String },
    Remove { key: String },
}

impl PreferenceMutation {
    /// Set `key` to `value`
    pub fn set(key: &str, value: &str) -> Self {
        PreferenceMutation::Set {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    /// Remove `key`
    pub fn remove(key: &str) -> Self {
        PreferenceMutation::Remove {
            key: key.to_string(),
        }
    }
}

/// Stream of snapshots: the current one first, then every committed change
pub type PreferenceStream = BoxStream<'static, Preferences>;

/// Trait for persistent preference backends
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Start a new snapshot stream; each call starts over from the current state
    fn data(&self) -> PreferenceStream;

    /// Current snapshot
    fn snapshot(&self) -> Preferences;

    /// Apply all mutations atomically and durably, returning the new snapshot
    async fn edit(&self, mutations: Vec<PreferenceMutation>) -> Result<Preferences>;

    /// Where the store lives
    fn location(&self) -> &Path;
}
