//! Service traits consumed and exposed by the pull-through layers

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io;

use crate::digest::Digest;
use crate::error::DistributionResult;

/// A writer stream for blob contents.
pub type Writer<'w> = dyn io::AsyncWrite + Unpin + Send + Sync + 'w;

/// Blob stat result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// The content digest of the blob.
    pub digest: Digest,

    /// The size of the blob in bytes.
    pub size: u64,

    /// The media type of the blob.
    pub media_type: String,
}

/// Options for a manifest put.
#[derive(Debug, Clone, Copy, Default)]
pub struct PutOptions {
    /// Allow dependency verification to stat blobs that live only in
    /// remote repositories, not in local storage. The pull-through
    /// manifest decorator forces this on, because a pushed manifest
    /// may reference layers that were never mirrored locally.
    pub cross_repo_verification: bool,
}

/// The blob capability set: stat, read, stream, and delete blobs by
/// digest. Implemented by local storage, remote repository handles,
/// and the pull-through decorators alike.
#[async_trait::async_trait]
pub trait BlobService: fmt::Debug + Send + Sync {
    /// Describe a blob without reading its contents.
    ///
    /// A missing blob is `DistributionError::BlobUnknown`.
    async fn stat(&self, digest: &Digest) -> DistributionResult<Descriptor>;

    /// Read a whole blob into memory.
    async fn get(&self, digest: &Digest) -> DistributionResult<Bytes>;

    /// Open a blob for streaming reads.
    async fn open(&self, digest: &Digest)
        -> DistributionResult<Box<dyn io::AsyncRead + Send + Unpin>>;

    /// Stream a blob into a writer, returning its descriptor.
    async fn serve_blob(
        &self,
        digest: &Digest,
        writer: &mut Writer<'_>,
    ) -> DistributionResult<Descriptor>;

    /// Delete a blob.
    async fn delete(&self, digest: &Digest) -> DistributionResult<()>;
}

/// The manifest capability set, keyed by manifest revision digest.
#[async_trait::async_trait]
pub trait ManifestService: fmt::Debug + Send + Sync {
    /// Whether a manifest revision exists.
    async fn exists(&self, digest: &Digest) -> DistributionResult<bool>;

    /// Fetch a manifest payload.
    ///
    /// A missing manifest is `DistributionError::ManifestUnknown`.
    async fn get(&self, digest: &Digest) -> DistributionResult<Bytes>;

    /// Store a manifest payload.
    async fn put(
        &self,
        digest: &Digest,
        payload: Bytes,
        options: PutOptions,
    ) -> DistributionResult<()>;

    /// Delete a manifest revision.
    async fn delete(&self, digest: &Digest) -> DistributionResult<()>;
}

/// A handle onto a single remote repository.
pub trait RemoteRepository: fmt::Debug + Send + Sync {
    /// The blob service of the remote repository.
    fn blobs(&self) -> Arc<dyn BlobService>;

    /// The manifest service of the remote repository.
    fn manifests(&self) -> Arc<dyn ManifestService>;
}

/// Locates remote repositories by registry host and repository path.
#[async_trait::async_trait]
pub trait RepositoryRetriever: fmt::Debug + Send + Sync {
    /// Open a handle onto `repository` at `registry`, optionally
    /// tolerating insecure transport.
    async fn repository(
        &self,
        registry: &str,
        repository: &str,
        insecure: bool,
    ) -> DistributionResult<Arc<dyn RemoteRepository>>;
}

/// One historical location an image tag has pointed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagEvent {
    /// The full pull spec of the image at this point in history.
    pub reference: String,
}

/// The history of a single tag, newest location first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagEntry {
    /// Whether this tag's import policy tolerates insecure transport.
    pub insecure: bool,

    /// Historical locations, newest first.
    pub items: Vec<TagEvent>,
}

/// Tag history of the repository owning a pull-through resolution,
/// as recorded by the metadata store.
///
/// The map is ordered so candidate resolution is deterministic for a
/// given snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagHistory {
    /// Per-tag history entries.
    pub tags: BTreeMap<String, TagEntry>,
}

/// Read access to the owning repository's tag history.
///
/// A repository whose backing metadata object does not exist reports
/// `DistributionError::RepositoryUnknown`.
#[async_trait::async_trait]
pub trait TagHistoryGetter: fmt::Debug + Send + Sync {
    /// Fetch the current tag-history snapshot.
    async fn tag_history(&self) -> DistributionResult<TagHistory>;
}
