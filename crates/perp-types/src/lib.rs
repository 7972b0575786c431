//! # perp-types
//!
//! Shared domain types for the perpetual price oracle: instrument ids,
//! the three stored record shapes and the events the store publishes.

pub mod events;
pub mod observation;

pub use ethnum::{I256, U256};
pub use events::OracleEvent;
pub use observation::{IndexObservation, LastPriceObservation, PriceEpoch};

use std::fmt;

use serde::{Deserialize, Serialize};

/// 32-byte digest identifying where an index price came from.
pub type ProvenanceHash = [u8; 32];

/// Provenance used for prices with no external source (initialization).
pub const ZERO_PROVENANCE: ProvenanceHash = [0u8; 32];

/// Dense index of a tracked instrument, `0..N-1` in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstrumentId(pub u16);

impl InstrumentId {
    /// Position of the instrument in per-instrument tables.
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u16> for InstrumentId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

/// Which observation family a query or record refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceKind {
    /// Externally reported reference prices.
    Index,
    /// Traded / mark price samples fed back by the store.
    LastPrice,
}

impl fmt::Display for PriceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceKind::Index => f.write_str("index"),
            PriceKind::LastPrice => f.write_str("last_price"),
        }
    }
}

/// Render a provenance hash as lowercase hex.
pub fn provenance_hex(hash: &ProvenanceHash) -> String {
    hex::encode(hash)
}

/// Parse a 64-character hex string into a provenance hash.
pub fn parse_provenance(s: &str) -> Option<ProvenanceHash> {
    let bytes = hex::decode(s.trim_start_matches("0x")).ok()?;
    bytes.try_into().ok()
}
