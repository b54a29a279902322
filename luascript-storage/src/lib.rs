//! Key-value storage backing the `storage_*` script capabilities.
//!
//! Stores are namespaced (one namespace per embedding page/origin) and
//! string-valued, mirroring a browser's local storage.
//!
//! - `MemoryStore`: process-lifetime map, used for headless runs and tests
//! - `SqliteStore`: SQLite file, survives restarts

mod error;
mod memory;
mod sqlite;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// A string key-value store.
///
/// Implementations use interior mutability so a single store can be shared
/// behind an `Rc`/`Arc` by every capability that needs it.
pub trait KeyValueStore {
    /// Returns the value for `key`, or `None` if it was never set.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Inserts or replaces the value for `key`.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removes `key`. Returns whether a value was present.
    fn remove(&self, key: &str) -> StorageResult<bool>;

    /// Removes every key in this store's namespace.
    fn clear(&self) -> StorageResult<()>;

    /// Lists keys in ascending order.
    fn keys(&self) -> StorageResult<Vec<String>>;
}
