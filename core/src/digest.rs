//! Content digests

use std::fmt;
use std::str::FromStr;

use sha2::{Digest as _, Sha256};

use crate::error::DistributionError;

/// A content digest of the form `algorithm:hex`, e.g.
/// `sha256:6c3c624b58dbbcd3c0dd82b4c53f04194d1247c6eebdaab7c610cf7d66709b3b`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest(String);

impl Digest {
    /// Parse a digest string, validating its `algorithm:hex` shape.
    pub fn parse(s: &str) -> Result<Self, DistributionError> {
        let Some((algorithm, hex)) = s.split_once(':') else {
            return Err(DistributionError::DigestInvalid(s.to_string()));
        };
        if algorithm.is_empty() || hex.is_empty() {
            return Err(DistributionError::DigestInvalid(s.to_string()));
        }
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(DistributionError::DigestInvalid(s.to_string()));
        }
        Ok(Digest(s.to_string()))
    }

    /// Compute the canonical `sha256:<hex>` digest of a byte payload.
    pub fn from_bytes(data: &[u8]) -> Self {
        Digest(format!("sha256:{}", hex::encode(Sha256::digest(data))))
    }

    /// The algorithm component, e.g. `sha256`.
    pub fn algorithm(&self) -> &str {
        self.0.split_once(':').map(|(a, _)| a).unwrap_or_default()
    }

    /// The hex component.
    pub fn hex(&self) -> &str {
        self.0.split_once(':').map(|(_, h)| h).unwrap_or_default()
    }

    /// The full `algorithm:hex` string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Digest {
    type Err = DistributionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Digest::parse(s)
    }
}
