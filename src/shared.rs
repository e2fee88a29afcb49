//! Shared database snapshot with atomic replace-on-reload
//!
//! The codec is read-only against a loaded database, so concurrent decodes
//! need no locking - they each hold an `Arc` snapshot. The only mutation
//! point is reload: a new `Database` is built off to the side and swapped in
//! whole, so an in-flight decode keeps seeing the schema it started with.

use crate::database::Database;
use std::sync::{Arc, RwLock};

/// Holder for the currently installed database
///
/// # Example
/// ```no_run
/// use can_signal_codec::{Codec, Database, SharedDatabase};
/// use std::path::Path;
///
/// let shared = SharedDatabase::new();
/// shared.install(Database::load(Path::new("powertrain.dbc")).unwrap());
///
/// // Per-frame hot path: grab a snapshot, decode against it.
/// if let Some(db) = shared.snapshot() {
///     let _ = Codec::decode(&db, 0x123, &[0u8; 8]);
/// }
/// ```
#[derive(Default)]
pub struct SharedDatabase {
    current: RwLock<Option<Arc<Database>>>,
}

impl SharedDatabase {
    /// Create an empty holder (no database loaded)
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a freshly loaded database, replacing any previous one
    ///
    /// Readers holding a snapshot of the old database are unaffected; the
    /// old value is dropped once the last snapshot goes away.
    pub fn install(&self, database: Database) -> Arc<Database> {
        let database = Arc::new(database);
        *self.write_guard() = Some(Arc::clone(&database));
        log::info!(
            "installed database snapshot: {} messages",
            database.stats().num_messages
        );
        database
    }

    /// Drop the installed database (unloaded state)
    pub fn clear(&self) {
        *self.write_guard() = None;
    }

    /// Get the current snapshot, if a database is loaded
    pub fn snapshot(&self) -> Option<Arc<Database>> {
        self.read_guard().clone()
    }

    /// Whether a database is currently installed
    pub fn is_loaded(&self) -> bool {
        self.read_guard().is_some()
    }

    // A poisoned lock only means a writer panicked mid-swap of an Option;
    // the value itself is always a whole Arc, so recover it.
    fn read_guard(&self) -> std::sync::RwLockReadGuard<'_, Option<Arc<Database>>> {
        match self.current.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_guard(&self) -> std::sync::RwLockWriteGuard<'_, Option<Arc<Database>>> {
        match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
