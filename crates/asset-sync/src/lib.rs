pub mod checksum;
pub mod gate;
pub mod index;
pub mod model;
pub mod source;
pub mod store;
pub mod sync;

pub use checksum::sha256_hex;
pub use gate::{RepoDecision, VersionDecision, check_repository, check_version};
pub use model::{
    Maintainer, Package, PackageFiles, PackageVersion, RepoType, RepositoryRef, VersionFiles,
    escape_package_name, files_id, package_id, unescape_package_name,
};
pub use source::{RepoSource, SourceError};
pub use store::{AssetStore, StoreError};
pub use sync::{ImportReport, SyncError, SyncOutcome};

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
