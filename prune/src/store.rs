//! Collaborator traits for garbage collection
//!
//! The graph walks two views of the registry: the metadata store, which
//! knows which repositories and manifest revisions exist and which are
//! marked for deletion, and the physical storage layout of repository
//! directories, layer links, and the shared blob store.

use std::fmt;
use std::sync::Arc;

use registry_core::{Digest, DistributionResult};

/// Which group of manifest revisions to enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManifestKind {
    /// Revisions explicitly marked for deletion
    MarkedForDeletion,
    /// All other revisions
    Retained,
}

/// Metadata recorded for one manifest revision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestInfo {
    /// Tag pointing at this revision, if any
    pub tag: Option<String>,
    /// Digests of the layer blobs the manifest references
    pub layers: Vec<Digest>,
    /// Digests of signature blobs stored alongside the manifest
    pub signatures: Vec<Digest>,
}

/// Opaque pagination cursor for [`MetadataStore::list_repositories`].
pub type Cursor = String;

/// The metadata side of the registry.
#[async_trait::async_trait]
pub trait MetadataStore: fmt::Debug + Send + Sync {
    /// One page of repository names.
    ///
    /// The listing is only eventually consistent; a later page may
    /// repeat a name an earlier page already returned.
    async fn list_repositories(
        &self,
        cursor: Option<Cursor>,
    ) -> DistributionResult<(Vec<String>, Option<Cursor>)>;

    /// Repositories whose backing metadata object is pending deletion.
    async fn list_pending_deletion(&self) -> DistributionResult<Vec<String>>;

    /// A handle over one repository's manifest metadata.
    async fn repository(&self, name: &str) -> DistributionResult<Arc<dyn MetadataRepository>>;

    /// Clear a repository's pending-deletion marker.
    async fn remove_deletion_marker(&self, name: &str) -> DistributionResult<()>;
}

/// One repository's manifest metadata.
#[async_trait::async_trait]
pub trait MetadataRepository: fmt::Debug + Send + Sync {
    /// The digests of this repository's manifest revisions of one kind.
    async fn enumerate_manifests(&self, kind: ManifestKind) -> DistributionResult<Vec<Digest>>;

    /// The recorded metadata for one manifest revision.
    async fn manifest(&self, digest: &Digest) -> DistributionResult<ManifestInfo>;

    /// Remove one manifest revision from the metadata store.
    async fn delete_manifest(&self, digest: &Digest) -> DistributionResult<()>;
}

/// The physical side of the registry.
#[async_trait::async_trait]
pub trait GraphStorage: fmt::Debug + Send + Sync {
    /// Repository directories present on disk.
    async fn list_repositories(&self) -> DistributionResult<Vec<String>>;

    /// The layer links recorded under one repository directory.
    async fn layer_links(&self, repository: &str) -> DistributionResult<Vec<Digest>>;

    /// Remove one layer link from a repository directory.
    async fn delete_layer_link(&self, repository: &str, digest: &Digest)
        -> DistributionResult<()>;

    /// Remove a repository directory entirely.
    async fn delete_repository(&self, repository: &str) -> DistributionResult<()>;

    /// Remove a blob from the shared blob store.
    async fn delete_blob(&self, digest: &Digest) -> DistributionResult<()>;
}
