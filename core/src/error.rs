//! Error taxonomy for the distribution layers

use std::error::Error as StdError;

use crate::digest::Digest;

/// Result type for distribution operations
pub type DistributionResult<T> = Result<T, DistributionError>;

/// Error types shared by the pull-through and pruning layers.
///
/// The "unknown" variants are the distinguished not-found signals that
/// trigger pull-through fallback; callers dispatch on them with
/// [`DistributionError::is_not_found`] rather than comparing error
/// values by identity.
#[derive(Debug, thiserror::Error)]
pub enum DistributionError {
    /// Blob is not present in the queried store
    #[error("blob unknown: {0}")]
    BlobUnknown(Digest),

    /// Manifest is not present in the queried store
    #[error("manifest unknown: {0}")]
    ManifestUnknown(Digest),

    /// Repository (or its backing metadata object) does not exist
    #[error("repository unknown: {0}")]
    RepositoryUnknown(String),

    /// Digest string is malformed
    #[error("invalid digest: {0}")]
    DigestInvalid(String),

    /// Image pull spec could not be parsed
    #[error("invalid image reference: {0}")]
    ReferenceInvalid(String),

    /// A remote repository probe failed
    #[error("remote repository {repository}: {source}")]
    Remote {
        /// The remote repository that was being contacted
        repository: String,
        /// The underlying transport or protocol error
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },

    /// The metadata store could not be consulted
    #[error("metadata store: {0}")]
    Metadata(#[source] Box<dyn StdError + Send + Sync + 'static>),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DistributionError {
    /// Whether this error is one of the distinguished not-found signals.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DistributionError::BlobUnknown(_)
                | DistributionError::ManifestUnknown(_)
                | DistributionError::RepositoryUnknown(_)
        )
    }

    /// Wrap a remote probe failure with the repository that was contacted.
    pub fn remote<E>(repository: impl Into<String>, error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        DistributionError::Remote {
            repository: repository.into(),
            source: error.into(),
        }
    }

    /// Wrap a metadata store failure.
    pub fn metadata<E>(error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        DistributionError::Metadata(error.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_variants() {
        let digest = Digest::from_bytes(b"x");
        assert!(DistributionError::BlobUnknown(digest.clone()).is_not_found());
        assert!(DistributionError::ManifestUnknown(digest).is_not_found());
        assert!(DistributionError::RepositoryUnknown("ns/app".into()).is_not_found());
        assert!(!DistributionError::DigestInvalid("junk".into()).is_not_found());
        assert!(!DistributionError::remote("a.example.com/ns/app", "connection refused").is_not_found());
    }
}
