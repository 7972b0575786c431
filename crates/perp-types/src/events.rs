//! Events published by the oracle store.

use ethnum::U256;
use serde::{Deserialize, Serialize};

use crate::{InstrumentId, PriceKind, ProvenanceHash};

/// A state change in the oracle store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OracleEvent {
    /// A new index observation was stored.
    IndexPriceUpdated {
        /// Instrument the price belongs to.
        instrument: InstrumentId,
        /// Stored price.
        price: U256,
        /// Ingestion time.
        timestamp: u64,
        /// Source digest.
        provenance: ProvenanceHash,
    },
    /// A new last-price observation was stored.
    LastPriceUpdated {
        /// Instrument the price belongs to.
        instrument: InstrumentId,
        /// Stored price.
        price: U256,
        /// Sample time.
        timestamp: u64,
    },
    /// The mark price was recomputed.
    MarkPriceUpdated {
        /// Instrument the mark belongs to.
        instrument: InstrumentId,
        /// New mark price.
        mark_price: U256,
        /// Funding-adjusted index projection.
        projected_index: U256,
        /// Short-window average of last prices.
        short_window_average: U256,
        /// Mark price before this update.
        previous_mark: U256,
        /// Computation time.
        timestamp: u64,
    },
    /// An epoch ring opened a new slot.
    EpochOpened {
        /// Instrument the epoch belongs to.
        instrument: InstrumentId,
        /// Which observation family fed the epoch.
        kind: PriceKind,
        /// Epoch count after opening (1-based sequence number).
        sequence: u64,
        /// Timestamp of the first sample in the epoch.
        timestamp: u64,
    },
}

impl OracleEvent {
    /// The instrument this event concerns.
    pub fn instrument(&self) -> InstrumentId {
        match self {
            OracleEvent::IndexPriceUpdated { instrument, .. }
            | OracleEvent::LastPriceUpdated { instrument, .. }
            | OracleEvent::MarkPriceUpdated { instrument, .. }
            | OracleEvent::EpochOpened { instrument, .. } => *instrument,
        }
    }

    /// Stable event name, matching the serialized `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            OracleEvent::IndexPriceUpdated { .. } => "index_price_updated",
            OracleEvent::LastPriceUpdated { .. } => "last_price_updated",
            OracleEvent::MarkPriceUpdated { .. } => "mark_price_updated",
            OracleEvent::EpochOpened { .. } => "epoch_opened",
        }
    }
}
