//! Remote blob location and retrieval
//!
//! Orchestrates candidate discovery, the digest-to-repository cache,
//! and the repository retriever to find whichever remote repository
//! actually holds a digest, then proxies reads to it.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::io;

use registry_core::{
    BlobService, Descriptor, Digest, DistributionError, DistributionResult, RepositoryRetriever,
    TagHistoryGetter, Writer,
};

use crate::cache::RepositoryCache;
use crate::config::PullthroughConfig;
use crate::resolver::{identify_candidate_repositories, PullthroughSpec};

/// Locates and serves blobs (and manifests) from the remote
/// repositories referenced by the owning repository's tag history.
///
/// Constructed per repository request scope; the [`RepositoryCache`] it
/// shares is process-wide. Resolved remote stores are memoized for the
/// lifetime of one instance, so an open or serve following a stat does
/// not repeat the candidate search.
#[derive(Debug)]
pub struct RemoteBlobGetter {
    history: Arc<dyn TagHistoryGetter>,
    retriever: Arc<dyn RepositoryRetriever>,
    cache: Arc<RepositoryCache>,
    config: PullthroughConfig,
    digest_to_store: Mutex<HashMap<Digest, Arc<dyn BlobService>>>,
}

impl RemoteBlobGetter {
    /// Create a getter over the given collaborators.
    pub fn new(
        history: Arc<dyn TagHistoryGetter>,
        retriever: Arc<dyn RepositoryRetriever>,
        cache: Arc<RepositoryCache>,
        config: PullthroughConfig,
    ) -> Self {
        RemoteBlobGetter {
            history,
            retriever,
            cache,
            config,
            digest_to_store: Mutex::new(HashMap::new()),
        }
    }

    async fn tag_history_for_blob(
        &self,
        digest: &Digest,
    ) -> DistributionResult<registry_core::TagHistory> {
        match self.history.tag_history().await {
            Ok(history) => Ok(history),
            // A missing image stream means the blob cannot be located.
            Err(DistributionError::RepositoryUnknown(_)) => {
                Err(DistributionError::BlobUnknown(digest.clone()))
            }
            Err(error) => Err(error),
        }
    }

    /// Run the two-pass candidate search for `digest`, returning the
    /// winning descriptor after memoizing the winning store.
    #[tracing::instrument(skip(self), fields(digest = %digest))]
    async fn resolve(&self, digest: &Digest) -> DistributionResult<Descriptor> {
        let history = self.tag_history_for_blob(digest).await?;

        let (names, specs) = identify_candidate_repositories(
            &history,
            &self.config.local_registry_hosts,
            true,
            self.config.insecure_by_default,
        );
        if let Some(descriptor) = self.find_candidate_repository(digest, &names, &specs).await {
            return Ok(descriptor);
        }

        // The secondary pass excludes anything the primary pass already
        // probed, so no remote is contacted twice.
        let (mut names, mut secondary) = identify_candidate_repositories(
            &history,
            &self.config.local_registry_hosts,
            false,
            self.config.insecure_by_default,
        );
        names.retain(|name| !specs.contains_key(name));
        secondary.retain(|name, _| !specs.contains_key(name));
        if let Some(descriptor) = self
            .find_candidate_repository(digest, &names, &secondary)
            .await
        {
            return Ok(descriptor);
        }

        Err(DistributionError::BlobUnknown(digest.clone()))
    }

    /// Probe cached repositories first, then the full candidate list in
    /// search-priority order. The first successful stat wins and stops
    /// the search; slow-path wins are recorded into the cache.
    async fn find_candidate_repository(
        &self,
        digest: &Digest,
        names: &[String],
        specs: &BTreeMap<String, PullthroughSpec>,
    ) -> Option<Descriptor> {
        if specs.is_empty() {
            return None;
        }

        for name in self.cache.repositories_for_digest(digest) {
            let Some(spec) = specs.get(&name) else {
                continue;
            };
            if let Some((descriptor, store)) = self.probe_blob(digest, &name, spec).await {
                tracing::debug!(%digest, repository = %name, "blob found via cached repository");
                self.digest_to_store
                    .lock()
                    .insert(digest.clone(), store);
                return Some(descriptor);
            }
        }

        for name in names {
            let spec = &specs[name];
            if let Some((descriptor, store)) = self.probe_blob(digest, name, spec).await {
                tracing::debug!(%digest, repository = %name, "blob found via candidate search");
                self.cache.remember_at(
                    Utc::now(),
                    digest,
                    self.config.mirror_ttl(),
                    &[name.as_str()],
                );
                self.digest_to_store
                    .lock()
                    .insert(digest.clone(), store);
                return Some(descriptor);
            }
        }

        None
    }

    /// Stat `digest` in one candidate repository. Any failure is logged
    /// and swallowed so the search can continue.
    async fn probe_blob(
        &self,
        digest: &Digest,
        name: &str,
        spec: &PullthroughSpec,
    ) -> Option<(Descriptor, Arc<dyn BlobService>)> {
        let repository = match self.remote_repository(name, spec).await {
            Ok(repository) => repository,
            Err(error) => {
                tracing::warn!(repository = %name, %error, "failed to open remote repository");
                return None;
            }
        };
        let store = repository.blobs();
        match store.stat(digest).await {
            Ok(descriptor) => Some((descriptor, store)),
            Err(error) if error.is_not_found() => {
                tracing::trace!(%digest, repository = %name, "remote repository does not have blob");
                None
            }
            Err(error) => {
                tracing::warn!(%digest, repository = %name, %error, "remote blob stat failed");
                None
            }
        }
    }

    async fn remote_repository(
        &self,
        name: &str,
        spec: &PullthroughSpec,
    ) -> DistributionResult<Arc<dyn registry_core::RemoteRepository>> {
        let registry = spec
            .reference
            .registry()
            .ok_or_else(|| DistributionError::ReferenceInvalid(name.to_string()))?;
        self.retriever
            .repository(registry, &spec.reference.repository(), spec.insecure)
            .await
    }

    /// The memoized store for `digest`, running a full stat resolution
    /// if this instance has not located the digest yet.
    async fn store_for(&self, digest: &Digest) -> DistributionResult<Arc<dyn BlobService>> {
        if let Some(store) = self.digest_to_store.lock().get(digest).cloned() {
            return Ok(store);
        }
        self.resolve(digest).await?;
        self.digest_to_store
            .lock()
            .get(digest)
            .cloned()
            .ok_or_else(|| DistributionError::BlobUnknown(digest.clone()))
    }

    /// Whether any candidate remote repository has the manifest.
    pub async fn manifest_exists(&self, digest: &Digest) -> DistributionResult<bool> {
        Ok(self.find_candidate_manifest(digest).await?.is_some())
    }

    /// Fetch a manifest from whichever candidate remote repository has
    /// it.
    #[tracing::instrument(skip(self), fields(digest = %digest))]
    pub async fn manifest_get(&self, digest: &Digest) -> DistributionResult<Bytes> {
        match self.find_candidate_manifest(digest).await? {
            Some(payload) => Ok(payload),
            None => Err(DistributionError::ManifestUnknown(digest.clone())),
        }
    }

    /// Two-pass manifest search mirroring the blob search; the winning
    /// repository is remembered in the cache under the manifest digest.
    async fn find_candidate_manifest(&self, digest: &Digest) -> DistributionResult<Option<Bytes>> {
        let history = match self.history.tag_history().await {
            Ok(history) => history,
            Err(DistributionError::RepositoryUnknown(_)) => {
                return Err(DistributionError::ManifestUnknown(digest.clone()))
            }
            Err(error) => return Err(error),
        };

        let (names, specs) = identify_candidate_repositories(
            &history,
            &self.config.local_registry_hosts,
            true,
            self.config.insecure_by_default,
        );
        if let Some(payload) = self.probe_manifest_candidates(digest, &names, &specs).await {
            return Ok(Some(payload));
        }

        let (mut names, mut secondary) = identify_candidate_repositories(
            &history,
            &self.config.local_registry_hosts,
            false,
            self.config.insecure_by_default,
        );
        names.retain(|name| !specs.contains_key(name));
        secondary.retain(|name, _| !specs.contains_key(name));
        Ok(self
            .probe_manifest_candidates(digest, &names, &secondary)
            .await)
    }

    async fn probe_manifest_candidates(
        &self,
        digest: &Digest,
        names: &[String],
        specs: &BTreeMap<String, PullthroughSpec>,
    ) -> Option<Bytes> {
        if specs.is_empty() {
            return None;
        }

        for name in self.cache.repositories_for_digest(digest) {
            let Some(spec) = specs.get(&name) else {
                continue;
            };
            if let Some(payload) = self.probe_manifest(digest, &name, spec).await {
                return Some(payload);
            }
        }

        for name in names {
            if let Some(payload) = self.probe_manifest(digest, name, &specs[name]).await {
                self.cache.remember_at(
                    Utc::now(),
                    digest,
                    self.config.mirror_ttl(),
                    &[name.as_str()],
                );
                return Some(payload);
            }
        }

        None
    }

    async fn probe_manifest(
        &self,
        digest: &Digest,
        name: &str,
        spec: &PullthroughSpec,
    ) -> Option<Bytes> {
        let repository = match self.remote_repository(name, spec).await {
            Ok(repository) => repository,
            Err(error) => {
                tracing::warn!(repository = %name, %error, "failed to open remote repository");
                return None;
            }
        };
        match repository.manifests().get(digest).await {
            Ok(payload) => {
                tracing::debug!(%digest, repository = %name, "manifest found in remote repository");
                Some(payload)
            }
            Err(error) if error.is_not_found() => None,
            Err(error) => {
                tracing::warn!(%digest, repository = %name, %error, "remote manifest fetch failed");
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl BlobService for RemoteBlobGetter {
    #[tracing::instrument(skip(self), fields(digest = %digest))]
    async fn stat(&self, digest: &Digest) -> DistributionResult<Descriptor> {
        // The guard must drop before the await below.
        let memoized = self.digest_to_store.lock().get(digest).cloned();
        if let Some(store) = memoized {
            return store.stat(digest).await;
        }
        self.resolve(digest).await
    }

    async fn get(&self, digest: &Digest) -> DistributionResult<Bytes> {
        let store = self.store_for(digest).await?;
        store.get(digest).await
    }

    async fn open(
        &self,
        digest: &Digest,
    ) -> DistributionResult<Box<dyn io::AsyncRead + Send + Unpin>> {
        let store = self.store_for(digest).await?;
        store.open(digest).await
    }

    async fn serve_blob(
        &self,
        digest: &Digest,
        writer: &mut Writer<'_>,
    ) -> DistributionResult<Descriptor> {
        let store = self.store_for(digest).await?;
        store.serve_blob(digest, writer).await
    }

    async fn delete(&self, digest: &Digest) -> DistributionResult<()> {
        // Pull-through is read-only; deletion of remote content is
        // never proxied.
        Err(DistributionError::BlobUnknown(digest.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use registry_core::{ManifestService, PutOptions, RemoteRepository, TagEntry, TagEvent};

    #[derive(Debug, Default)]
    struct CountingBlobStore {
        digests: HashSet<Digest>,
        stat_calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl BlobService for CountingBlobStore {
        async fn stat(&self, digest: &Digest) -> DistributionResult<Descriptor> {
            self.stat_calls.fetch_add(1, Ordering::SeqCst);
            if self.digests.contains(digest) {
                Ok(Descriptor {
                    digest: digest.clone(),
                    size: 4,
                    media_type: "application/octet-stream".to_string(),
                })
            } else {
                Err(DistributionError::BlobUnknown(digest.clone()))
            }
        }

        async fn get(&self, digest: &Digest) -> DistributionResult<Bytes> {
            if self.digests.contains(digest) {
                Ok(Bytes::from_static(b"data"))
            } else {
                Err(DistributionError::BlobUnknown(digest.clone()))
            }
        }

        async fn open(
            &self,
            digest: &Digest,
        ) -> DistributionResult<Box<dyn io::AsyncRead + Send + Unpin>> {
            let data = self.get(digest).await?;
            Ok(Box::new(std::io::Cursor::new(data.to_vec())))
        }

        async fn serve_blob(
            &self,
            digest: &Digest,
            writer: &mut Writer<'_>,
        ) -> DistributionResult<Descriptor> {
            let data = self.get(digest).await?;
            let mut reader = std::io::Cursor::new(data.to_vec());
            io::copy(&mut reader, writer).await?;
            self.stat(digest).await
        }

        async fn delete(&self, digest: &Digest) -> DistributionResult<()> {
            Err(DistributionError::BlobUnknown(digest.clone()))
        }
    }

    #[derive(Debug, Default)]
    struct CountingManifests {
        manifests: HashMap<Digest, Bytes>,
        get_calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ManifestService for CountingManifests {
        async fn exists(&self, digest: &Digest) -> DistributionResult<bool> {
            Ok(self.manifests.contains_key(digest))
        }

        async fn get(&self, digest: &Digest) -> DistributionResult<Bytes> {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            self.manifests
                .get(digest)
                .cloned()
                .ok_or_else(|| DistributionError::ManifestUnknown(digest.clone()))
        }

        async fn put(
            &self,
            digest: &Digest,
            _payload: Bytes,
            _options: PutOptions,
        ) -> DistributionResult<()> {
            Err(DistributionError::ManifestUnknown(digest.clone()))
        }

        async fn delete(&self, digest: &Digest) -> DistributionResult<()> {
            Err(DistributionError::ManifestUnknown(digest.clone()))
        }
    }

    #[derive(Debug, Default)]
    struct FakeRepo {
        blobs: Arc<CountingBlobStore>,
        manifests: Arc<CountingManifests>,
    }

    impl RemoteRepository for FakeRepo {
        fn blobs(&self) -> Arc<dyn BlobService> {
            self.blobs.clone()
        }

        fn manifests(&self) -> Arc<dyn ManifestService> {
            self.manifests.clone()
        }
    }

    #[derive(Debug, Default)]
    struct FakeRetriever {
        repositories: HashMap<String, Arc<FakeRepo>>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl RepositoryRetriever for FakeRetriever {
        async fn repository(
            &self,
            registry: &str,
            repository: &str,
            _insecure: bool,
        ) -> DistributionResult<Arc<dyn RemoteRepository>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = format!("{registry}/{repository}");
            self.repositories
                .get(&name)
                .cloned()
                .map(|repository| repository as Arc<dyn RemoteRepository>)
                .ok_or_else(|| DistributionError::remote(name, "connection refused"))
        }
    }

    #[derive(Debug)]
    struct FakeHistory {
        result: DistributionResult<registry_core::TagHistory>,
    }

    #[async_trait::async_trait]
    impl TagHistoryGetter for FakeHistory {
        async fn tag_history(&self) -> DistributionResult<registry_core::TagHistory> {
            match &self.result {
                Ok(history) => Ok(history.clone()),
                Err(DistributionError::RepositoryUnknown(name)) => {
                    Err(DistributionError::RepositoryUnknown(name.clone()))
                }
                Err(_) => Err(DistributionError::metadata("metadata store unreachable")),
            }
        }
    }

    fn history_with(tags: &[(&str, &[&str])]) -> registry_core::TagHistory {
        let mut history = registry_core::TagHistory::default();
        for (tag, items) in tags {
            history.tags.insert(
                tag.to_string(),
                TagEntry {
                    insecure: false,
                    items: items
                        .iter()
                        .map(|reference| TagEvent {
                            reference: reference.to_string(),
                        })
                        .collect(),
                },
            );
        }
        history
    }

    fn repo_with_blob(digest: &Digest) -> Arc<FakeRepo> {
        Arc::new(FakeRepo {
            blobs: Arc::new(CountingBlobStore {
                digests: HashSet::from([digest.clone()]),
                stat_calls: AtomicUsize::new(0),
            }),
            manifests: Arc::default(),
        })
    }

    fn getter(
        history: registry_core::TagHistory,
        retriever: Arc<FakeRetriever>,
        cache: Arc<RepositoryCache>,
    ) -> RemoteBlobGetter {
        RemoteBlobGetter::new(
            Arc::new(FakeHistory {
                result: Ok(history),
            }),
            retriever,
            cache,
            PullthroughConfig::default(),
        )
    }

    #[tokio::test]
    async fn search_stops_at_first_successful_probe() {
        let digest = Digest::from_bytes(b"shared layer");
        let first = repo_with_blob(&digest);
        let second = repo_with_blob(&digest);
        let retriever = Arc::new(FakeRetriever {
            repositories: HashMap::from([
                ("a.example.com/user/app".to_string(), first.clone()),
                ("b.example.com/user/app".to_string(), second.clone()),
            ]),
            calls: AtomicUsize::new(0),
        });
        let history = history_with(&[
            ("t1", &["a.example.com/user/app:latest"]),
            ("t2", &["b.example.com/user/app:latest"]),
        ]);
        let cache = Arc::new(RepositoryCache::new(&PullthroughConfig::default()));
        let getter = getter(history, retriever, cache);

        getter.stat(&digest).await.unwrap();

        // "a" sorts first and answers, so "b" is never probed.
        assert_eq!(first.blobs.stat_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.blobs.stat_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn winning_repository_is_remembered() {
        let digest = Digest::from_bytes(b"layer");
        let repo = repo_with_blob(&digest);
        let retriever = Arc::new(FakeRetriever {
            repositories: HashMap::from([("a.example.com/user/app".to_string(), repo)]),
            calls: AtomicUsize::new(0),
        });
        let history = history_with(&[("latest", &["a.example.com/user/app:latest"])]);
        let cache = Arc::new(RepositoryCache::new(&PullthroughConfig::default()));
        let getter = getter(history, retriever, cache.clone());

        getter.stat(&digest).await.unwrap();

        assert_eq!(
            cache.repositories_for_digest(&digest),
            vec!["a.example.com/user/app"]
        );
    }

    #[tokio::test]
    async fn cached_repository_is_probed_before_search_order() {
        let digest = Digest::from_bytes(b"layer");
        let first = repo_with_blob(&digest);
        let second = repo_with_blob(&digest);
        let retriever = Arc::new(FakeRetriever {
            repositories: HashMap::from([
                ("a.example.com/user/app".to_string(), first.clone()),
                ("b.example.com/user/app".to_string(), second.clone()),
            ]),
            calls: AtomicUsize::new(0),
        });
        let history = history_with(&[
            ("t1", &["a.example.com/user/app:latest"]),
            ("t2", &["b.example.com/user/app:latest"]),
        ]);
        let config = PullthroughConfig::default();
        let cache = Arc::new(RepositoryCache::new(&config));
        cache.remember(&digest, config.mirror_ttl(), &["b.example.com/user/app"]);
        let getter = getter(history, retriever, cache);

        getter.stat(&digest).await.unwrap();

        // The cached association wins even though "a" has search priority.
        assert_eq!(first.blobs.stat_calls.load(Ordering::SeqCst), 0);
        assert_eq!(second.blobs.stat_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn secondary_pass_skips_repositories_probed_in_primary() {
        let digest = Digest::from_bytes(b"layer");
        // "a" is both the newest and an older location; it has nothing.
        // "b" only appears in the tail and has the blob.
        let empty = Arc::new(FakeRepo::default());
        let winner = repo_with_blob(&digest);
        let retriever = Arc::new(FakeRetriever {
            repositories: HashMap::from([
                ("a.example.com/user/app".to_string(), empty.clone()),
                ("b.example.com/user/app".to_string(), winner.clone()),
            ]),
            calls: AtomicUsize::new(0),
        });
        let history = history_with(&[(
            "latest",
            &[
                "a.example.com/user/app:v2",
                "a.example.com/user/app:v1",
                "b.example.com/user/app:v1",
            ],
        )]);
        let cache = Arc::new(RepositoryCache::new(&PullthroughConfig::default()));
        let getter = getter(history, retriever, cache);

        getter.stat(&digest).await.unwrap();

        assert_eq!(empty.blobs.stat_calls.load(Ordering::SeqCst), 1);
        assert_eq!(winner.blobs.stat_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn repeated_stat_reuses_memoized_store() {
        let digest = Digest::from_bytes(b"layer");
        let repo = repo_with_blob(&digest);
        let retriever = Arc::new(FakeRetriever {
            repositories: HashMap::from([("a.example.com/user/app".to_string(), repo.clone())]),
            calls: AtomicUsize::new(0),
        });
        let history = history_with(&[("latest", &["a.example.com/user/app:latest"])]);
        let cache = Arc::new(RepositoryCache::new(&PullthroughConfig::default()));
        let getter = getter(history, retriever.clone(), cache);

        getter.stat(&digest).await.unwrap();
        getter.stat(&digest).await.unwrap();

        // The second stat goes straight to the remembered store without
        // another candidate search.
        assert_eq!(retriever.calls.load(Ordering::SeqCst), 1);
        assert_eq!(repo.blobs.stat_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn resolved_store_is_memoized_across_operations() {
        let digest = Digest::from_bytes(b"layer");
        let repo = repo_with_blob(&digest);
        let retriever = Arc::new(FakeRetriever {
            repositories: HashMap::from([("a.example.com/user/app".to_string(), repo)]),
            calls: AtomicUsize::new(0),
        });
        let history = history_with(&[("latest", &["a.example.com/user/app:latest"])]);
        let cache = Arc::new(RepositoryCache::new(&PullthroughConfig::default()));
        let getter = getter(history, retriever.clone(), cache);

        getter.stat(&digest).await.unwrap();
        let after_stat = retriever.calls.load(Ordering::SeqCst);

        let data = getter.get(&digest).await.unwrap();
        assert_eq!(&data[..], b"data");
        assert_eq!(retriever.calls.load(Ordering::SeqCst), after_stat);
    }

    #[tokio::test]
    async fn probe_failures_continue_to_next_candidate() {
        let digest = Digest::from_bytes(b"layer");
        // "a" is unreachable (no entry in the retriever); "b" answers.
        let winner = repo_with_blob(&digest);
        let retriever = Arc::new(FakeRetriever {
            repositories: HashMap::from([(
                "b.example.com/user/app".to_string(),
                winner.clone(),
            )]),
            calls: AtomicUsize::new(0),
        });
        let history = history_with(&[
            ("t1", &["a.example.com/user/app:latest"]),
            ("t2", &["b.example.com/user/app:latest"]),
        ]);
        let cache = Arc::new(RepositoryCache::new(&PullthroughConfig::default()));
        let getter = getter(history, retriever, cache);

        let descriptor = getter.stat(&digest).await.unwrap();
        assert_eq!(descriptor.digest, digest);
    }

    #[tokio::test]
    async fn missing_image_stream_is_blob_unknown() {
        let digest = Digest::from_bytes(b"layer");
        let getter = RemoteBlobGetter::new(
            Arc::new(FakeHistory {
                result: Err(DistributionError::RepositoryUnknown("user/app".into())),
            }),
            Arc::new(FakeRetriever::default()),
            Arc::new(RepositoryCache::new(&PullthroughConfig::default())),
            PullthroughConfig::default(),
        );

        let error = getter.stat(&digest).await.unwrap_err();
        assert!(matches!(error, DistributionError::BlobUnknown(_)));
    }

    #[tokio::test]
    async fn metadata_failure_is_surfaced() {
        let digest = Digest::from_bytes(b"layer");
        let getter = RemoteBlobGetter::new(
            Arc::new(FakeHistory {
                result: Err(DistributionError::metadata("etcd down")),
            }),
            Arc::new(FakeRetriever::default()),
            Arc::new(RepositoryCache::new(&PullthroughConfig::default())),
            PullthroughConfig::default(),
        );

        let error = getter.stat(&digest).await.unwrap_err();
        assert!(matches!(error, DistributionError::Metadata(_)));
    }

    #[tokio::test]
    async fn manifest_search_serves_remote_manifest() {
        let payload = Bytes::from_static(b"{\"schemaVersion\": 2}");
        let digest = Digest::from_bytes(&payload);
        let repo = Arc::new(FakeRepo {
            blobs: Arc::default(),
            manifests: Arc::new(CountingManifests {
                manifests: HashMap::from([(digest.clone(), payload.clone())]),
                get_calls: AtomicUsize::new(0),
            }),
        });
        let retriever = Arc::new(FakeRetriever {
            repositories: HashMap::from([("a.example.com/user/app".to_string(), repo)]),
            calls: AtomicUsize::new(0),
        });
        let history = history_with(&[("latest", &["a.example.com/user/app:latest"])]);
        let cache = Arc::new(RepositoryCache::new(&PullthroughConfig::default()));
        let getter = getter(history, retriever, cache.clone());

        let served = getter.manifest_get(&digest).await.unwrap();
        assert_eq!(served, payload);
        // The winning repository is remembered for the manifest digest too.
        assert_eq!(
            cache.repositories_for_digest(&digest),
            vec!["a.example.com/user/app"]
        );
    }
}
