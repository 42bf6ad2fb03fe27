//! JSON file preference store
//!
//! Keeps the current snapshot in memory and rewrites the whole file on every
//! committed edit. Readers follow changes through a watch channel.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tokio::sync::{watch, Mutex};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error};

use super::traits::{PreferenceMutation, PreferenceStore, PreferenceStream, Preferences};
use crate::error::{BioauthError, Result};

/// Default file name inside the data directory
pub const PREFERENCES_FILE_NAME: &str = "bioauth.preferences.json";

const FILE_VERSION: u32 = 1;

/// File format for persistent storage
#[derive(Debug, Serialize, Deserialize)]
struct PreferenceFile {
    version: u32,
    entries: BTreeMap<String, String>,
}

/// Preference store persisted as a single JSON file
pub struct PreferenceFileStore {
    path: PathBuf,
    state: watch::Sender<Preferences>,
    /// Serializes edits so each one sees the previous commit
    write_lock: Mutex<()>,
}

impl PreferenceFileStore {
    /// Open (or create) the store at `path`.
    ///
    /// Fails if the location cannot be created or is not writable.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let open_error = |source: std::io::Error| BioauthError::StoreOpen {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(open_error)?;
        }

        // Surface an unwritable location now instead of on the first edit
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(open_error)?;

        let contents = std::fs::read_to_string(&path).map_err(open_error)?;
        let entries = if contents.trim().is_empty() {
            BTreeMap::new()
        } else {
            let file: PreferenceFile =
                serde_json::from_str(&contents).map_err(|e| open_error(e.into()))?;
            file.entries
        };

        debug!("Preference store opened at {:?} ({} entries)", path, entries.len());

        let (state, _) = watch::channel(Preferences::from_entries(entries));
        Ok(Self {
            path,
            state,
            write_lock: Mutex::new(()),
        })
    }

    /// Write a snapshot to disk atomically using a temp file
    async fn persist(&self, prefs: &Preferences) -> Result<()> {
        let file = PreferenceFile {
            version: FILE_VERSION,
            entries: prefs.entries().clone(),
        };
        let contents = serde_json::to_string_pretty(&file)?;

        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        debug!("Saved {} preferences to {:?}", prefs.len(), self.path);
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for PreferenceFileStore {
    fn data(&self) -> PreferenceStream {
        WatchStream::new(self.state.subscribe()).boxed()
    }

    fn snapshot(&self) -> Preferences {
        self.state.borrow().clone()
    }

    async fn edit(&self, mutations: Vec<PreferenceMutation>) -> Result<Preferences> {
        let _guard = self.write_lock.lock().await;

        let current = self.snapshot();
        let next = current.apply(&mutations);
        if next == current {
            debug!("Edit left preferences unchanged");
            return Ok(next);
        }

        if let Err(e) = self.persist(&next).await {
            error!("Failed to persist preferences to {:?}: {}", self.path, e);
            return Err(e);
        }

        // Publish only after the write is durable
        self.state.send_replace(next.clone());
        Ok(next)
    }

    fn location(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> PreferenceFileStore {
        PreferenceFileStore::open_at(dir.path().join(PREFERENCES_FILE_NAME)).unwrap()
    }

    #[tokio::test]
    async fn test_open_creates_missing_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/deeper").join(PREFERENCES_FILE_NAME);

        let store = PreferenceFileStore::open_at(&path).unwrap();

        assert!(path.exists());
        assert!(store.snapshot().is_empty());
        assert_eq!(store.location(), path.as_path());
    }

    #[tokio::test]
    async fn test_open_fails_below_a_regular_file() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();

        let result = PreferenceFileStore::open_at(blocker.join(PREFERENCES_FILE_NAME));

        assert!(matches!(result, Err(BioauthError::StoreOpen { .. })));
    }

    #[tokio::test]
    async fn test_edit_and_reopen() {
        let temp_dir = TempDir::new().unwrap();

        {
            let store = store_in(&temp_dir);
            let prefs = store
                .edit(vec![PreferenceMutation::set("data_store", "Enabled")])
                .await
                .unwrap();
            assert_eq!(prefs.get("data_store"), Some("Enabled"));
        }

        let store = store_in(&temp_dir);
        assert_eq!(store.snapshot().get("data_store"), Some("Enabled"));
    }

    #[tokio::test]
    async fn test_file_format() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);

        store
            .edit(vec![PreferenceMutation::set("data_store", "Disabled")])
            .await
            .unwrap();

        let contents = std::fs::read_to_string(store.location()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["entries"]["data_store"], "Disabled");
        assert!(!store.location().with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(PREFERENCES_FILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();

        let result = PreferenceFileStore::open_at(&path);

        match result {
            Err(BioauthError::StoreOpen { path: failed, source }) => {
                assert_eq!(failed, path);
                assert_eq!(source.kind(), std::io::ErrorKind::InvalidData);
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("corrupt file was accepted"),
        }
    }

    #[tokio::test]
    async fn test_data_starts_from_current_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);

        let mut first = store.data();
        assert!(first.next().await.unwrap().is_empty());

        store
            .edit(vec![PreferenceMutation::set("data_store", "Enabled")])
            .await
            .unwrap();
        assert_eq!(first.next().await.unwrap().get("data_store"), Some("Enabled"));

        // A fresh stream restarts at the latest committed state
        let mut second = store.data();
        assert_eq!(second.next().await.unwrap().get("data_store"), Some("Enabled"));
    }

    #[tokio::test]
    async fn test_noop_edit_does_not_write() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);

        store.edit(vec![PreferenceMutation::remove("missing")]).await.unwrap();

        let contents = std::fs::read_to_string(store.location()).unwrap();
        assert!(contents.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_edits_are_all_applied() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(store_in(&temp_dir));

        let mut tasks = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .edit(vec![PreferenceMutation::set(&format!("key{}", i), "v")])
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.snapshot().len(), 8);
        let reopened = store_in(&temp_dir);
        assert_eq!(reopened.snapshot().len(), 8);
    }
}
