//! Preference persistence
//!
//! This module provides:
//! 1. The `PreferenceStore` backend trait and snapshot types
//! 2. A JSON file backend
//! 3. The process-wide handle that opens the backend on first use

mod file;
mod handle;
mod traits;

pub use file::{PreferenceFileStore, PREFERENCES_FILE_NAME};
pub use handle::{get_store, StoreHandle};
pub use traits::{PreferenceMutation, PreferenceStore, PreferenceStream, Preferences};
