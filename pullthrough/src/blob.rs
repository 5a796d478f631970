//! Pull-through blob store decorator

use std::sync::Arc;

use bytes::Bytes;
use tokio::io;

use registry_core::{
    BlobService, Descriptor, Digest, DistributionResult, Writer,
};

use crate::remote::RemoteBlobGetter;

/// Decorates a local blob store so that blobs the local store does not
/// hold are served from a remote repository instead.
///
/// Only the distinguished not-found answer triggers the remote path;
/// every other local answer, success or failure, is final.
#[derive(Debug)]
pub struct PullthroughBlobStore {
    local: Arc<dyn BlobService>,
    remote: Arc<RemoteBlobGetter>,
}

impl PullthroughBlobStore {
    /// Wrap `local` with pull-through fallback via `remote`.
    pub fn new(local: Arc<dyn BlobService>, remote: Arc<RemoteBlobGetter>) -> Self {
        PullthroughBlobStore { local, remote }
    }
}

#[async_trait::async_trait]
impl BlobService for PullthroughBlobStore {
    #[tracing::instrument(skip(self), fields(digest = %digest))]
    async fn stat(&self, digest: &Digest) -> DistributionResult<Descriptor> {
        match self.local.stat(digest).await {
            Err(error) if error.is_not_found() => {
                tracing::debug!(%digest, "blob not found locally, trying pull-through");
                self.remote.stat(digest).await
            }
            answer => answer,
        }
    }

    async fn get(&self, digest: &Digest) -> DistributionResult<Bytes> {
        match self.local.get(digest).await {
            Err(error) if error.is_not_found() => self.remote.get(digest).await,
            answer => answer,
        }
    }

    async fn open(
        &self,
        digest: &Digest,
    ) -> DistributionResult<Box<dyn io::AsyncRead + Send + Unpin>> {
        match self.local.open(digest).await {
            Err(error) if error.is_not_found() => self.remote.open(digest).await,
            answer => answer,
        }
    }

    async fn serve_blob(
        &self,
        digest: &Digest,
        writer: &mut Writer<'_>,
    ) -> DistributionResult<Descriptor> {
        match self.local.serve_blob(digest, writer).await {
            Err(error) if error.is_not_found() => {
                // The remote body streams through a plain copy, so a
                // non-seekable transport still serves fully.
                self.remote.serve_blob(digest, writer).await
            }
            answer => answer,
        }
    }

    async fn delete(&self, digest: &Digest) -> DistributionResult<()> {
        // Deletion only ever touches local storage.
        self.local.delete(digest).await
    }
}
