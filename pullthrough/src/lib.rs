//! # Pull-through blob and manifest serving
//!
//! This crate lets a local registry transparently serve blobs and
//! manifests it does not physically hold, by locating them in the
//! remote repositories referenced by the owning image stream's tag
//! history and proxying reads from whichever remote actually has the
//! content.
//!
//! ## Components
//!
//! - [`RepositoryCache`] — a bounded, TTL-based reverse index from blob
//!   digest to the repositories recently seen to hold it
//! - [`identify_candidate_repositories`] — candidate discovery and
//!   secure-before-insecure search ordering from a tag history
//! - [`RemoteBlobGetter`] — probes candidates in priority order and
//!   remembers the winner
//! - [`PullthroughBlobStore`] / [`PullthroughManifestService`] —
//!   decorators that try local storage first and fall back to the
//!   remote getter on a not-found answer
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use registry_pullthrough::{
//!     PullthroughBlobStore, PullthroughConfig, RemoteBlobGetter, RepositoryCache,
//! };
//! # fn example(
//! #     local: Arc<dyn registry_core::BlobService>,
//! #     history: Arc<dyn registry_core::TagHistoryGetter>,
//! #     retriever: Arc<dyn registry_core::RepositoryRetriever>,
//! # ) {
//! let config = PullthroughConfig::default();
//! let cache = Arc::new(RepositoryCache::new(&config));
//! let getter = Arc::new(RemoteBlobGetter::new(history, retriever, cache, config));
//! let store = PullthroughBlobStore::new(local, getter);
//! # }
//! ```

mod blob;
mod cache;
mod config;
mod manifest;
mod remote;
mod resolver;

pub use blob::PullthroughBlobStore;
pub use cache::RepositoryCache;
pub use config::PullthroughConfig;
pub use manifest::PullthroughManifestService;
pub use remote::RemoteBlobGetter;
pub use resolver::{identify_candidate_repositories, PullthroughSpec};
