//! Epoch aggregation.
//!
//! Raw samples are down-sampled into [`PriceEpoch`] buckets. Each aggregator
//! is a two-state machine:
//!
//! ```text
//! Empty   --sample-->                 Open(e)
//! Open(e) --sample, within interval--> Open(merge(e, sample))   same slot
//! Open(e) --sample, interval elapsed-> Open(new epoch)          next slot
//! ```
//!
//! "Within interval" compares against the open epoch's *mean* timestamp, so
//! an epoch's reach drifts forward as samples are merged into it.
//!
//! Merging keeps running means with floor division:
//!
//! ```text
//! price'     = (price * n + p) / (n + 1)
//! timestamp' = (timestamp * n + t) / (n + 1)
//! n'         = n + 1
//! ```
//!
//! The rounding drift this accumulates is part of the contract and is kept.

use std::num::NonZeroUsize;

use ethnum::U256;
use perp_math::cast::u128_to_u64;
use perp_math::MathError;
use perp_types::PriceEpoch;

use crate::ring::RingBuffer;

/// Current state of an aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochState<'a> {
    /// No sample has been recorded yet.
    Empty,
    /// The most recently opened epoch.
    Open(&'a PriceEpoch),
}

/// What recording a sample does to the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochTransition {
    /// The sample was folded into the open epoch, which becomes this value.
    Merge(PriceEpoch),
    /// The sample opened a new epoch slot holding this value.
    Rotate(PriceEpoch),
}

impl EpochTransition {
    /// The epoch as it will be stored.
    pub fn epoch(&self) -> &PriceEpoch {
        match self {
            EpochTransition::Merge(e) | EpochTransition::Rotate(e) => e,
        }
    }

    /// Whether this transition opens a new slot.
    pub fn is_rotation(&self) -> bool {
        matches!(self, EpochTransition::Rotate(_))
    }
}

/// Epoch ring for one (instrument, kind) pair.
#[derive(Debug, Clone)]
pub struct EpochAggregator {
    ring: RingBuffer<PriceEpoch>,
}

impl EpochAggregator {
    /// Create an empty aggregator retaining `capacity` epochs.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            ring: RingBuffer::new(capacity),
        }
    }

    /// The underlying epoch ring.
    pub fn ring(&self) -> &RingBuffer<PriceEpoch> {
        &self.ring
    }

    /// Number of epochs ever opened.
    pub fn total(&self) -> u64 {
        self.ring.total()
    }

    /// Whether an epoch is open, and which.
    pub fn state(&self) -> EpochState<'_> {
        match self.ring.newest() {
            Some(epoch) => EpochState::Open(epoch),
            None => EpochState::Empty,
        }
    }

    /// Decide how a sample would be recorded, without recording it.
    ///
    /// # Errors
    ///
    /// - [`MathError::Overflow`] if the merged mean cannot be computed
    pub fn plan(
        &self,
        now: u64,
        price: U256,
        sampling_interval: u64,
    ) -> Result<EpochTransition, MathError> {
        match self.state() {
            EpochState::Open(current)
                if now.saturating_sub(current.timestamp) < sampling_interval =>
            {
                Ok(EpochTransition::Merge(merge(current, now, price)?))
            }
            EpochState::Open(_) | EpochState::Empty => {
                Ok(EpochTransition::Rotate(PriceEpoch::opened(price, now)))
            }
        }
    }

    /// Store a planned transition. Returns the epoch count afterwards.
    pub fn apply(&mut self, transition: EpochTransition) -> u64 {
        match transition {
            EpochTransition::Merge(epoch) => {
                self.ring.replace_newest(epoch);
                self.ring.total()
            }
            EpochTransition::Rotate(epoch) => self.ring.push(epoch),
        }
    }
}

fn merge(current: &PriceEpoch, now: u64, price: U256) -> Result<PriceEpoch, MathError> {
    let n = U256::from(current.cardinality);
    let price_sum = current
        .price
        .checked_mul(n)
        .and_then(|sum| sum.checked_add(price))
        .ok_or(MathError::Overflow)?;

    // u64 * u32 + u64 stays far below 2^128.
    let count = u128::from(current.cardinality);
    let timestamp_sum = u128::from(current.timestamp) * count + u128::from(now);

    let cardinality = current
        .cardinality
        .checked_add(1)
        .ok_or(MathError::Overflow)?;

    Ok(PriceEpoch {
        price: price_sum / U256::from(cardinality),
        timestamp: u128_to_u64(timestamp_sum / u128::from(cardinality))?,
        cardinality,
    })
}
