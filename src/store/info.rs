//! store::info
//!
//! Resolved values handed to readers.

use crate::core::metadata::MetaData;
use crate::core::types::Oid;
use crate::git::RepoHandle;

use super::error::StoreResult;

/// Lazy access to a data blob.
///
/// Nothing is read until [`DataSource::read`] is called, so listing and
/// metadata-only callers never pay for the content.
#[derive(Clone)]
pub struct DataSource {
    handle: RepoHandle,
    oid: Oid,
}

impl DataSource {
    pub fn new(handle: RepoHandle, oid: Oid) -> Self {
        Self { handle, oid }
    }

    pub fn oid(&self) -> &Oid {
        &self.oid
    }

    /// Read the blob content. Blocks on the object store.
    pub fn read(&self) -> StoreResult<Vec<u8>> {
        let git = self.handle.open()?;
        Ok(git.read_blob(&self.oid)?)
    }

    /// Read the blob content on the blocking pool.
    pub async fn fetch(&self) -> StoreResult<Vec<u8>> {
        let source = self.clone();
        match tokio::task::spawn_blocking(move || source.read()).await {
            Ok(result) => result,
            Err(join) => std::panic::resume_unwind(join.into_panic()),
        }
    }
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource").field("oid", &self.oid).finish()
    }
}

/// The resolved value of a key.
///
/// A value without data is the master metadata of a directory key.
#[derive(Debug, Clone)]
pub struct StoreInfo {
    data: Option<DataSource>,
    metadata: MetaData,
    metadata_version: Option<Oid>,
}

impl StoreInfo {
    /// A data key. `metadata_version` is the blob its metadata came from,
    /// which may be an inherited master or nothing at all.
    pub fn data(data: DataSource, metadata: MetaData, metadata_version: Option<Oid>) -> Self {
        Self {
            data: Some(data),
            metadata,
            metadata_version,
        }
    }

    /// Master metadata of a directory key.
    pub fn master(metadata: MetaData, metadata_version: Oid) -> Self {
        Self {
            data: None,
            metadata,
            metadata_version: Some(metadata_version),
        }
    }

    pub fn is_master(&self) -> bool {
        self.data.is_none()
    }

    pub fn data_source(&self) -> Option<&DataSource> {
        self.data.as_ref()
    }

    pub fn metadata(&self) -> &MetaData {
        &self.metadata
    }

    /// Version of the data; `None` for master entries.
    pub fn data_version(&self) -> Option<&Oid> {
        self.data.as_ref().map(DataSource::oid)
    }

    pub fn metadata_version(&self) -> Option<&Oid> {
        self.metadata_version.as_ref()
    }

    /// The token writers compare against: the data version for data keys,
    /// the metadata version for directory keys.
    pub fn version(&self) -> Option<&Oid> {
        self.data_version().or(self.metadata_version.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(c: char) -> Oid {
        Oid::new(c.to_string().repeat(40)).unwrap()
    }

    #[test]
    fn master_has_no_data() {
        let info = StoreInfo::master(MetaData::default(), oid('a'));
        assert!(info.is_master());
        assert!(info.data_version().is_none());
        assert_eq!(info.version(), Some(&oid('a')));
    }

    #[test]
    fn data_version_wins() {
        let source = DataSource::new(RepoHandle::new("/nonexistent"), oid('b'));
        let info = StoreInfo::data(source, MetaData::default(), Some(oid('c')));
        assert!(!info.is_master());
        assert_eq!(info.version(), Some(&oid('b')));
        assert_eq!(info.metadata_version(), Some(&oid('c')));
    }
}
