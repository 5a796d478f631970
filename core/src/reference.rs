//! Docker-style image pull spec parsing

use std::fmt;
use std::str::FromStr;

use crate::digest::Digest;
use crate::error::DistributionError;

/// The implicit namespace for single-component repository paths.
const DEFAULT_NAMESPACE: &str = "library";

/// A parsed docker pull spec:
/// `[registry[:port]/]namespace/name[:tag][@digest]`.
///
/// A leading component is treated as a registry host only when it
/// contains a `.` or `:` or equals `localhost`; a bare single-component
/// path defaults its namespace to `library`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerImageReference {
    registry: Option<String>,
    namespace: Option<String>,
    name: String,
    tag: Option<String>,
    id: Option<Digest>,
}

impl DockerImageReference {
    /// Parse a pull spec string.
    pub fn parse(spec: &str) -> Result<Self, DistributionError> {
        if spec.is_empty() {
            return Err(DistributionError::ReferenceInvalid(spec.to_string()));
        }

        let (rest, id) = match spec.split_once('@') {
            Some((rest, digest)) => (rest, Some(Digest::parse(digest)?)),
            None => (spec, None),
        };

        let (registry, remainder) = match rest.split_once('/') {
            Some((first, tail))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (Some(first.to_string()), tail)
            }
            _ => (None, rest),
        };

        // A colon in the last path component separates the tag.
        let (path, tag) = match remainder.rsplit_once(':') {
            Some((path, tag)) if !tag.contains('/') && !path.is_empty() => {
                (path, Some(tag.to_string()))
            }
            _ => (remainder, None),
        };

        if path.is_empty() || path.split('/').any(str::is_empty) {
            return Err(DistributionError::ReferenceInvalid(spec.to_string()));
        }

        let (namespace, name) = match path.split_once('/') {
            Some((namespace, name)) => (Some(namespace.to_string()), name.to_string()),
            None => (None, path.to_string()),
        };

        Ok(DockerImageReference {
            registry,
            namespace,
            name,
            tag,
            id,
        })
    }

    /// The registry host, if the spec named one.
    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    /// The `namespace/name` repository path, with the `library`
    /// namespace defaulted for single-component paths.
    pub fn repository(&self) -> String {
        format!(
            "{}/{}",
            self.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE),
            self.name
        )
    }

    /// The tag, if any.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// The digest, if the spec pinned one.
    pub fn id(&self) -> Option<&Digest> {
        self.id.as_ref()
    }

    /// This reference with tag and digest stripped, identifying just
    /// the repository.
    pub fn as_repository(&self) -> Self {
        DockerImageReference {
            registry: self.registry.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            tag: None,
            id: None,
        }
    }

    /// The full string form of this reference.
    pub fn exact(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DockerImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{registry}/")?;
        }
        if let Some(namespace) = &self.namespace {
            write!(f, "{namespace}/")?;
        }
        f.write_str(&self.name)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(id) = &self.id {
            write!(f, "@{id}")?;
        }
        Ok(())
    }
}

impl FromStr for DockerImageReference {
    type Err = DistributionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DockerImageReference::parse(s)
    }
}
