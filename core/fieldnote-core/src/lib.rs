//! Core library for Fieldnote.
//!
//! Shared pieces that both the daemon and its clients need: storage path
//! management, the key/value store, daemon configuration, the core error
//! type, and the static HTML renderer for final reports. The daemon is
//! the store's only writer; other consumers open it read-only.

pub mod config;
pub mod error;
pub mod report;
pub mod storage;
pub mod store;

pub use config::ModelConfig;
pub use error::{CoreError, Result};
pub use storage::StorageConfig;
pub use store::Store;
