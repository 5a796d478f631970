//! Pull-through configuration

use chrono::Duration;
use serde::Deserialize;

/// Configuration for the pull-through layer.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PullthroughConfig {
    /// Maximum repositories remembered per digest.
    pub bucket_size: usize,

    /// Maximum distinct digests tracked by the repository cache; the
    /// least recently used digest is evicted beyond this bound.
    pub max_digests: usize,

    /// How long a successful remote lookup is remembered, in seconds.
    pub mirror_ttl_seconds: u64,

    /// Hostnames under which this registry is reachable; candidate
    /// locations on these hosts are self-references, not pull-through.
    pub local_registry_hosts: Vec<String>,

    /// Whether remote registries may be contacted over insecure
    /// transport even when no tag requests it.
    pub insecure_by_default: bool,
}

impl Default for PullthroughConfig {
    fn default() -> Self {
        PullthroughConfig {
            bucket_size: 10,
            max_digests: 2048,
            mirror_ttl_seconds: 600,
            local_registry_hosts: Vec::new(),
            insecure_by_default: false,
        }
    }
}

impl PullthroughConfig {
    /// The mirror TTL as a duration.
    pub fn mirror_ttl(&self) -> Duration {
        Duration::seconds(self.mirror_ttl_seconds as i64)
    }
}
