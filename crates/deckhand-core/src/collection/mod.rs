pub mod archive;
pub mod manager;
pub mod migrations;
pub mod review;
mod schema;
pub mod store;
pub mod undo;

use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::CoreError;

pub type CollectionResult<T> = Result<T, CoreError>;

pub use archive::{
    ArchiveError, COLLECTION_ENTRY, LEGACY_COLLECTION_ENTRY, MEDIA_MAP_ENTRY, PackageArchive,
};
pub use manager::CollectionManager;
pub use migrations::{SqliteMigration, current_schema_version, migration, migrations};
pub use review::{ReviewQueue, today};
pub use store::{Collection, CollectionTx, MergeReport, RepairReport};
pub use undo::UndoStack;

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
