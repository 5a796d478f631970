//! # Registry core types
//!
//! Shared leaf types for the registry pull-through and pruning layers:
//! content digests, docker-style image references, the distribution
//! error taxonomy, and the narrow service traits the higher layers
//! consume and decorate.
//!
//! Nothing in this crate performs I/O on its own; the traits here are
//! implemented either by a local storage engine or by remote repository
//! handles, both out of scope for this workspace.

mod digest;
mod error;
mod reference;
mod service;

pub use digest::Digest;
pub use error::{DistributionError, DistributionResult};
pub use reference::DockerImageReference;
pub use service::{
    BlobService, Descriptor, ManifestService, PutOptions, RemoteRepository, RepositoryRetriever,
    TagEntry, TagEvent, TagHistory, TagHistoryGetter, Writer,
};
