//! Pull-through manifest service decorator

use std::sync::Arc;

use bytes::Bytes;

use registry_core::{Digest, DistributionResult, ManifestService, PutOptions};

use crate::remote::RemoteBlobGetter;

/// Decorates a local manifest service so that manifests the local
/// store does not hold are fetched from a remote repository instead.
#[derive(Debug)]
pub struct PullthroughManifestService {
    local: Arc<dyn ManifestService>,
    remote: Arc<RemoteBlobGetter>,
}

impl PullthroughManifestService {
    /// Wrap `local` with pull-through fallback via `remote`.
    pub fn new(local: Arc<dyn ManifestService>, remote: Arc<RemoteBlobGetter>) -> Self {
        PullthroughManifestService { local, remote }
    }
}

#[async_trait::async_trait]
impl ManifestService for PullthroughManifestService {
    async fn exists(&self, digest: &Digest) -> DistributionResult<bool> {
        if self.local.exists(digest).await? {
            return Ok(true);
        }
        self.remote.manifest_exists(digest).await
    }

    #[tracing::instrument(skip(self), fields(digest = %digest))]
    async fn get(&self, digest: &Digest) -> DistributionResult<Bytes> {
        match self.local.get(digest).await {
            Err(error) if error.is_not_found() => {
                tracing::debug!(%digest, "manifest not found locally, trying pull-through");
                self.remote.manifest_get(digest).await
            }
            answer => answer,
        }
    }

    async fn put(
        &self,
        digest: &Digest,
        payload: Bytes,
        _options: PutOptions,
    ) -> DistributionResult<()> {
        // A pushed manifest may reference layers that exist only in a
        // remote repository; dependency verification must be allowed to
        // reach across the pull-through boundary.
        let options = PutOptions {
            cross_repo_verification: true,
        };
        self.local.put(digest, payload, options).await
    }

    async fn delete(&self, digest: &Digest) -> DistributionResult<()> {
        self.local.delete(digest).await
    }
}
