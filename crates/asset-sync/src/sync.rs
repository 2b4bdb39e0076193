use std::ops::AddAssign;

use crate::source::SourceError;
use crate::store::StoreError;

/// Repository-level failures. Any of these aborts the sync of that
/// repository; per-package failures never surface here.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Tallies from one importer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub icons_imported: u64,
    /// Packages without an icon URL.
    pub icons_skipped: u64,
    pub icons_failed: u64,
    pub files_imported: u64,
    /// Versions whose files were already stored with the same digest.
    pub files_skipped: u64,
    pub files_failed: u64,
}

impl ImportReport {
    pub fn failures(&self) -> u64 {
        self.icons_failed + self.files_failed
    }
}

impl AddAssign for ImportReport {
    fn add_assign(&mut self, other: Self) {
        self.icons_imported += other.icons_imported;
        self.icons_skipped += other.icons_skipped;
        self.icons_failed += other.icons_failed;
        self.files_imported += other.files_imported;
        self.files_skipped += other.files_skipped;
        self.files_failed += other.files_failed;
    }
}

/// Result of syncing one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The checksum matched the last completed sync.
    Unchanged { checksum: String },
    Synced {
        checksum: String,
        packages: usize,
        report: ImportReport,
    },
}
