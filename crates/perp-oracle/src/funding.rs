//! Funding-rate collaborator.
//!
//! The funding engine computes rates elsewhere; the store only reads the last
//! rate and the time to the next funding event when projecting the index
//! price. [`SharedFunding`] is a table that engine writes into.

use std::collections::HashMap;
use std::sync::RwLock;

use ethnum::I256;
use perp_types::InstrumentId;
use serde::{Deserialize, Serialize};

/// Funding inputs for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingState {
    /// Last funding rate, scaled by 1e18 (1e18 = 100 %). May be negative.
    pub last_funding_rate: I256,
    /// Seconds until the next funding event.
    pub next_funding_interval: u64,
}

impl Default for FundingState {
    fn default() -> Self {
        Self {
            last_funding_rate: I256::ZERO,
            next_funding_interval: 0,
        }
    }
}

/// Source of funding inputs, queried on every mark price computation.
pub trait FundingSource: Send + Sync {
    /// Current funding inputs for `instrument`.
    fn funding_state(&self, instrument: InstrumentId) -> FundingState;
}

/// Lock-protected funding table, zero rate for unknown instruments.
#[derive(Debug, Default)]
pub struct SharedFunding {
    states: RwLock<HashMap<InstrumentId, FundingState>>,
}

impl SharedFunding {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the funding engine's latest state for `instrument`.
    pub fn set_funding_state(&self, instrument: InstrumentId, state: FundingState) {
        match self.states.write() {
            Ok(mut states) => {
                tracing::debug!(
                    %instrument,
                    rate = %state.last_funding_rate,
                    next_interval = state.next_funding_interval,
                    "funding state updated"
                );
                states.insert(instrument, state);
            }
            Err(_) => tracing::error!(%instrument, "funding table lock poisoned"),
        }
    }
}

impl FundingSource for SharedFunding {
    fn funding_state(&self, instrument: InstrumentId) -> FundingState {
        self.states
            .read()
            .ok()
            .and_then(|states| states.get(&instrument).copied())
            .unwrap_or_default()
    }
}
