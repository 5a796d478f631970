//! # Registry garbage collection
//!
//! Mark-and-sweep reclamation of manifests, layer links, and blobs no
//! repository references anymore. [`RegistryGraphLoader::load`] walks
//! the metadata store and physical storage and builds keep and delete
//! sets; [`RegistryGraph::prune`] then deletes only objects never
//! marked keep, finishing with the shared blob store so a blob is
//! never removed while some repository might still reference it.
//!
//! The graph is built in full before anything is deleted, which is
//! what makes collection sound on an eventually-consistent storage
//! backend.

mod graph;
mod store;

pub use graph::{PruneError, PruneSummary, RegistryGraph, RegistryGraphLoader};
pub use store::{
    Cursor, GraphStorage, ManifestInfo, ManifestKind, MetadataRepository, MetadataStore,
};
