//! Mark-and-sweep collection over the registry graph
//!
//! A run has two phases. Load walks every repository the metadata store
//! or physical storage knows about and partitions manifests, layer
//! links, and blobs into keep and delete sets. Prune then deletes only
//! objects that were never marked keep, leaving the shared blob store
//! for last because blobs are shared across repositories.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use registry_core::{Digest, DistributionError, DistributionResult};

use crate::store::{GraphStorage, ManifestInfo, ManifestKind, MetadataStore};

/// One failed deletion during a prune run.
#[derive(Debug, thiserror::Error)]
pub enum PruneError {
    /// The repository's metadata handle could not be opened
    #[error("opening repository {repository}: {source}")]
    Repository {
        /// The repository being pruned
        repository: String,
        /// The underlying failure
        #[source]
        source: DistributionError,
    },

    /// A manifest revision could not be deleted from the metadata store
    #[error("deleting manifest {digest} in {repository}: {source}")]
    Manifest {
        /// The repository being pruned
        repository: String,
        /// The manifest revision
        digest: Digest,
        /// The underlying failure
        #[source]
        source: DistributionError,
    },

    /// A layer link could not be removed from a repository directory
    #[error("deleting layer link {digest} in {repository}: {source}")]
    LayerLink {
        /// The repository being pruned
        repository: String,
        /// The linked layer
        digest: Digest,
        /// The underlying failure
        #[source]
        source: DistributionError,
    },

    /// An emptied repository directory could not be removed
    #[error("removing repository directory {repository}: {source}")]
    Directory {
        /// The repository being pruned
        repository: String,
        /// The underlying failure
        #[source]
        source: DistributionError,
    },

    /// A pending-deletion marker could not be removed
    #[error("removing deletion marker for {repository}: {source}")]
    DeletionMarker {
        /// The repository whose marker remains
        repository: String,
        /// The underlying failure
        #[source]
        source: DistributionError,
    },

    /// A blob could not be deleted from the shared store
    #[error("deleting blob {digest}: {source}")]
    Blob {
        /// The blob that remains
        digest: Digest,
        /// The underlying failure
        #[source]
        source: DistributionError,
    },
}

/// Outcome of a prune run.
#[derive(Debug, Default)]
pub struct PruneSummary {
    /// Every deletion that failed, in the order the failures occurred
    pub errors: Vec<PruneError>,

    /// Blobs removed from the shared blob store
    pub blobs_deleted: usize,

    /// Manifest revisions removed from the metadata store
    pub manifests_deleted: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Keep,
    Delete,
}

/// Per-repository bookkeeping built during Load. Owned exclusively by
/// one [`RegistryGraph`]; never shared across repositories.
#[derive(Debug, Default)]
struct RepositoryInfo {
    layers_to_delete: BTreeSet<Digest>,
    layers_to_keep: BTreeSet<Digest>,
    manifests_to_delete: BTreeMap<Digest, ManifestInfo>,
    manifests_to_keep: BTreeMap<Digest, ManifestInfo>,
}

impl RepositoryInfo {
    fn keep_layer(&mut self, digest: &Digest) {
        self.layers_to_keep.insert(digest.clone());
        self.layers_to_delete.remove(digest);
    }

    fn delete_layer(&mut self, digest: &Digest) {
        if !self.layers_to_keep.contains(digest) {
            self.layers_to_delete.insert(digest.clone());
        }
    }
}

/// Configures and runs the Load phase of a collection run.
///
/// Loading consumes the loader and yields a [`RegistryGraph`]; pruning
/// consumes the graph. A run therefore always loads fully before it
/// deletes anything, and prunes at most once.
#[derive(Debug)]
pub struct RegistryGraphLoader {
    metadata: Arc<dyn MetadataStore>,
    storage: Arc<dyn GraphStorage>,
    ignore_errors: bool,
}

impl RegistryGraphLoader {
    /// Build a loader over the two registry views.
    pub fn new(metadata: Arc<dyn MetadataStore>, storage: Arc<dyn GraphStorage>) -> Self {
        RegistryGraphLoader {
            metadata,
            storage,
            ignore_errors: false,
        }
    }

    /// Continue past individual deletion failures during Prune instead
    /// of aborting on the first one.
    pub fn ignore_errors(mut self, ignore_errors: bool) -> Self {
        self.ignore_errors = ignore_errors;
        self
    }

    /// Walk the registry and build the keep and delete sets.
    ///
    /// Repositories are enumerated in three passes: those pending
    /// deletion (disposition delete), those the metadata store knows
    /// (disposition keep), and finally those present only in physical
    /// storage (disposition keep, since storage the metadata store does
    /// not know about may be reachable by other means). A repository is
    /// processed once; its first sighting decides its disposition.
    #[tracing::instrument(skip(self))]
    pub async fn load(self) -> DistributionResult<RegistryGraph> {
        let mut graph = RegistryGraph {
            metadata: self.metadata,
            storage: self.storage,
            ignore_errors: self.ignore_errors,
            blobs_to_delete: BTreeSet::new(),
            blobs_to_keep: BTreeSet::new(),
            repos_to_delete: BTreeMap::new(),
            repos_to_keep: BTreeMap::new(),
        };
        let mut visited: HashSet<String> = HashSet::new();

        for name in graph.metadata.list_pending_deletion().await? {
            graph
                .load_repository(&name, Disposition::Delete, &mut visited)
                .await?;
        }

        let mut cursor = None;
        loop {
            let (names, next) = graph.metadata.list_repositories(cursor).await?;
            for name in names {
                graph
                    .load_repository(&name, Disposition::Keep, &mut visited)
                    .await?;
            }
            match next {
                Some(token) => cursor = Some(token),
                None => break,
            }
        }

        for name in graph.storage.list_repositories().await? {
            graph.load_storage_repository(&name, &mut visited).await?;
        }

        tracing::debug!(
            repositories_to_delete = graph.repos_to_delete.len(),
            repositories_to_keep = graph.repos_to_keep.len(),
            blobs_to_delete = graph.blobs_to_delete.len(),
            "registry graph loaded"
        );
        Ok(graph)
    }
}

struct Aborted;

/// A fully loaded registry graph, ready to prune.
///
/// The sets are exclusively owned by this run. Once a digest is marked
/// keep it can never reappear in a delete set; delete markings are
/// always taken as a set difference against the keep sets.
#[derive(Debug)]
pub struct RegistryGraph {
    metadata: Arc<dyn MetadataStore>,
    storage: Arc<dyn GraphStorage>,
    ignore_errors: bool,
    blobs_to_delete: BTreeSet<Digest>,
    blobs_to_keep: BTreeSet<Digest>,
    repos_to_delete: BTreeMap<String, RepositoryInfo>,
    repos_to_keep: BTreeMap<String, RepositoryInfo>,
}

impl RegistryGraph {
    async fn load_repository(
        &mut self,
        name: &str,
        disposition: Disposition,
        visited: &mut HashSet<String>,
    ) -> DistributionResult<()> {
        if !visited.insert(name.to_string()) {
            tracing::trace!(repository = %name, "already visited, first disposition wins");
            return Ok(());
        }
        tracing::debug!(repository = %name, ?disposition, "loading repository");

        let repository = self.metadata.repository(name).await?;
        let mut info = RepositoryInfo::default();

        // Revisions explicitly marked for deletion are deleted even in
        // a kept repository; the rest follow the pass's disposition.
        for digest in repository
            .enumerate_manifests(ManifestKind::MarkedForDeletion)
            .await?
        {
            let manifest = repository.manifest(&digest).await?;
            self.record_manifest(&mut info, digest, manifest, Disposition::Delete);
        }
        for digest in repository.enumerate_manifests(ManifestKind::Retained).await? {
            let manifest = repository.manifest(&digest).await?;
            self.record_manifest(&mut info, digest, manifest, disposition);
        }

        match disposition {
            Disposition::Delete => self.repos_to_delete.insert(name.to_string(), info),
            Disposition::Keep => self.repos_to_keep.insert(name.to_string(), info),
        };
        Ok(())
    }

    async fn load_storage_repository(
        &mut self,
        name: &str,
        visited: &mut HashSet<String>,
    ) -> DistributionResult<()> {
        if !visited.insert(name.to_string()) {
            return Ok(());
        }
        tracing::debug!(repository = %name, "repository present only in storage, keeping");

        let mut info = RepositoryInfo::default();
        for digest in self.storage.layer_links(name).await? {
            info.keep_layer(&digest);
            self.keep_blob(&digest);
        }
        self.repos_to_keep.insert(name.to_string(), info);
        Ok(())
    }

    fn record_manifest(
        &mut self,
        info: &mut RepositoryInfo,
        digest: Digest,
        manifest: ManifestInfo,
        disposition: Disposition,
    ) {
        match disposition {
            Disposition::Keep => {
                for layer in &manifest.layers {
                    info.keep_layer(layer);
                    self.keep_blob(layer);
                }
                for signature in &manifest.signatures {
                    self.keep_blob(signature);
                }
                self.keep_blob(&digest);
                info.manifests_to_delete.remove(&digest);
                info.manifests_to_keep.insert(digest, manifest);
            }
            Disposition::Delete => {
                for layer in &manifest.layers {
                    info.delete_layer(layer);
                    self.delete_blob_candidate(layer);
                }
                for signature in &manifest.signatures {
                    self.delete_blob_candidate(signature);
                }
                self.delete_blob_candidate(&digest);
                if !info.manifests_to_keep.contains_key(&digest) {
                    info.manifests_to_delete.insert(digest, manifest);
                }
            }
        }
    }

    fn keep_blob(&mut self, digest: &Digest) {
        self.blobs_to_keep.insert(digest.clone());
        self.blobs_to_delete.remove(digest);
    }

    fn delete_blob_candidate(&mut self, digest: &Digest) {
        if !self.blobs_to_keep.contains(digest) {
            self.blobs_to_delete.insert(digest.clone());
        }
    }

    fn keep_manifest_blobs(&mut self, digest: &Digest, manifest: &ManifestInfo) {
        self.keep_blob(digest);
        for layer in &manifest.layers {
            self.keep_blob(layer);
        }
        for signature in &manifest.signatures {
            self.keep_blob(signature);
        }
    }

    /// Delete everything Load marked delete.
    ///
    /// Repositories marked delete go first (manifests, then layer
    /// links, then the emptied directory, then the pending-deletion
    /// marker), then the per-repository cleanup of kept repositories,
    /// and the shared blob store last. Failures are accumulated into
    /// the summary; without `ignore_errors` the first failure aborts
    /// the run. With it, the failed object's dependent blobs are
    /// re-marked keep so a failed deletion never leaves a dangling
    /// reference.
    #[tracing::instrument(skip(self))]
    pub async fn prune(mut self) -> PruneSummary {
        let mut summary = PruneSummary::default();

        let delete_repos = std::mem::take(&mut self.repos_to_delete);
        for (name, info) in delete_repos {
            match self.prune_repository(&name, info, true, &mut summary).await {
                Ok(true) => {
                    if let Err(error) = self.metadata.remove_deletion_marker(&name).await {
                        summary.errors.push(PruneError::DeletionMarker {
                            repository: name.clone(),
                            source: error,
                        });
                        if !self.ignore_errors {
                            return summary;
                        }
                    }
                }
                Ok(false) => {
                    tracing::warn!(repository = %name,
                        "leaving deletion marker in place after failed deletions");
                }
                Err(Aborted) => return summary,
            }
        }

        let keep_repos = std::mem::take(&mut self.repos_to_keep);
        for (name, info) in keep_repos {
            if self
                .prune_repository(&name, info, false, &mut summary)
                .await
                .is_err()
            {
                return summary;
            }
        }

        // Blobs are shared across repositories, so they go last, after
        // every repository's local references have been resolved.
        let blobs = std::mem::take(&mut self.blobs_to_delete);
        for digest in blobs {
            if self.blobs_to_keep.contains(&digest) {
                continue;
            }
            match self.storage.delete_blob(&digest).await {
                Ok(()) => {
                    tracing::trace!(%digest, "deleted blob");
                    summary.blobs_deleted += 1;
                }
                Err(error) => {
                    summary.errors.push(PruneError::Blob {
                        digest,
                        source: error,
                    });
                    if !self.ignore_errors {
                        return summary;
                    }
                }
            }
        }

        tracing::debug!(
            blobs_deleted = summary.blobs_deleted,
            manifests_deleted = summary.manifests_deleted,
            errors = summary.errors.len(),
            "prune complete"
        );
        summary
    }

    /// Delete one repository's marked manifests and layer links.
    /// Returns whether the pass completed without error.
    async fn prune_repository(
        &mut self,
        name: &str,
        info: RepositoryInfo,
        remove_directory: bool,
        summary: &mut PruneSummary,
    ) -> Result<bool, Aborted> {
        let mut clean = true;

        if !info.manifests_to_delete.is_empty() {
            match self.metadata.repository(name).await {
                Ok(repository) => {
                    for (digest, manifest) in &info.manifests_to_delete {
                        match repository.delete_manifest(digest).await {
                            Ok(()) => {
                                tracing::trace!(repository = %name, %digest, "deleted manifest");
                                summary.manifests_deleted += 1;
                            }
                            Err(error) => {
                                summary.errors.push(PruneError::Manifest {
                                    repository: name.to_string(),
                                    digest: digest.clone(),
                                    source: error,
                                });
                                if !self.ignore_errors {
                                    return Err(Aborted);
                                }
                                // The metadata store still references
                                // this manifest, so its blobs stay.
                                self.keep_manifest_blobs(digest, manifest);
                                clean = false;
                            }
                        }
                    }
                }
                Err(error) => {
                    summary.errors.push(PruneError::Repository {
                        repository: name.to_string(),
                        source: error,
                    });
                    if !self.ignore_errors {
                        return Err(Aborted);
                    }
                    for (digest, manifest) in &info.manifests_to_delete {
                        self.keep_manifest_blobs(digest, manifest);
                    }
                    clean = false;
                }
            }
        }

        for digest in &info.layers_to_delete {
            match self.storage.delete_layer_link(name, digest).await {
                Ok(()) => {
                    tracing::trace!(repository = %name, %digest, "deleted layer link");
                }
                Err(error) => {
                    summary.errors.push(PruneError::LayerLink {
                        repository: name.to_string(),
                        digest: digest.clone(),
                        source: error,
                    });
                    if !self.ignore_errors {
                        return Err(Aborted);
                    }
                    // A link that could not be removed still references
                    // its underlying blob.
                    self.keep_blob(digest);
                    clean = false;
                }
            }
        }

        if remove_directory && clean && info.manifests_to_keep.is_empty() {
            if let Err(error) = self.storage.delete_repository(name).await {
                summary.errors.push(PruneError::Directory {
                    repository: name.to_string(),
                    source: error,
                });
                if !self.ignore_errors {
                    return Err(Aborted);
                }
                clean = false;
            }
        }

        Ok(clean)
    }
}
