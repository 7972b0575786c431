//! Records held in the oracle's ring buffers.

use ethnum::U256;
use serde::{Deserialize, Serialize};

use crate::ProvenanceHash;

/// One externally reported reference price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexObservation {
    /// Time the observation was ingested.
    pub timestamp: u64,
    /// Reported price, never zero.
    pub underlying_price: U256,
    /// Digest of the report that produced the price.
    pub provenance: ProvenanceHash,
}

/// One traded / mark price sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastPriceObservation {
    /// Time the sample was recorded.
    pub timestamp: u64,
    /// Sampled price, never zero.
    pub last_price: U256,
}

/// Running-mean summary of the raw samples inside one sampling interval.
///
/// `price` and `timestamp` are means, not sums; `cardinality` counts the
/// samples merged so far (at least 1 for any stored epoch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PriceEpoch {
    /// Mean price of the merged samples.
    pub price: U256,
    /// Mean timestamp of the merged samples.
    pub timestamp: u64,
    /// Number of merged samples.
    pub cardinality: u32,
}

impl PriceEpoch {
    /// A freshly opened epoch holding a single sample.
    pub fn opened(price: U256, timestamp: u64) -> Self {
        Self {
            price,
            timestamp,
            cardinality: 1,
        }
    }
}
