//! Store configuration.
//!
//! Capacities are fixed when the store is built. The three intervals live in
//! [`Intervals`] and can be changed at runtime through the store's setters.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::{OracleError, Result};

/// Default epoch length in seconds (8 hours).
pub const DEFAULT_SAMPLING_INTERVAL: u64 = 8 * 60 * 60;

/// Default short window for the mark price average, in seconds.
pub const DEFAULT_MARK_SAMPLING_INTERVAL: u64 = 300;

/// Default funding period in seconds (8 hours).
pub const DEFAULT_FUNDING_PERIOD: u64 = 8 * 60 * 60;

/// Default raw observation ring capacity.
pub const DEFAULT_OBSERVATION_CAPACITY: usize = 65_535;

/// Default epoch ring capacity.
pub const DEFAULT_EPOCH_CAPACITY: usize = 1_094;

/// Complete store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Length of one epoch bucket.
    #[serde(default = "default_sampling_interval")]
    pub sampling_interval: u64,
    /// Trailing window of the last-price average used by the mark price.
    #[serde(default = "default_mark_sampling_interval")]
    pub mark_sampling_interval: u64,
    /// Funding period the funding rate refers to.
    #[serde(default = "default_funding_period")]
    pub funding_period: u64,
    /// Slots per raw observation ring.
    #[serde(default = "default_observation_capacity")]
    pub observation_capacity: usize,
    /// Slots per epoch ring.
    #[serde(default = "default_epoch_capacity")]
    pub epoch_capacity: usize,
}

/// Runtime-mutable part of the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intervals {
    /// Length of one epoch bucket.
    pub sampling_interval: u64,
    /// Trailing window of the mark price's last-price average.
    pub mark_sampling_interval: u64,
    /// Funding period.
    pub funding_period: u64,
}

fn default_sampling_interval() -> u64 {
    DEFAULT_SAMPLING_INTERVAL
}

fn default_mark_sampling_interval() -> u64 {
    DEFAULT_MARK_SAMPLING_INTERVAL
}

fn default_funding_period() -> u64 {
    DEFAULT_FUNDING_PERIOD
}

fn default_observation_capacity() -> usize {
    DEFAULT_OBSERVATION_CAPACITY
}

fn default_epoch_capacity() -> usize {
    DEFAULT_EPOCH_CAPACITY
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            sampling_interval: DEFAULT_SAMPLING_INTERVAL,
            mark_sampling_interval: DEFAULT_MARK_SAMPLING_INTERVAL,
            funding_period: DEFAULT_FUNDING_PERIOD,
            observation_capacity: DEFAULT_OBSERVATION_CAPACITY,
            epoch_capacity: DEFAULT_EPOCH_CAPACITY,
        }
    }
}

impl OracleConfig {
    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidConfig`] if any interval or capacity is zero
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("sampling_interval", self.sampling_interval == 0),
            ("mark_sampling_interval", self.mark_sampling_interval == 0),
            ("funding_period", self.funding_period == 0),
            ("observation_capacity", self.observation_capacity == 0),
            ("epoch_capacity", self.epoch_capacity == 0),
        ];
        for (name, is_zero) in checks {
            if is_zero {
                return Err(OracleError::InvalidConfig(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }

    /// The interval part of the configuration.
    pub fn intervals(&self) -> Intervals {
        Intervals {
            sampling_interval: self.sampling_interval,
            mark_sampling_interval: self.mark_sampling_interval,
            funding_period: self.funding_period,
        }
    }

    pub(crate) fn capacities(&self) -> Result<(NonZeroUsize, NonZeroUsize)> {
        let observation = NonZeroUsize::new(self.observation_capacity).ok_or_else(|| {
            OracleError::InvalidConfig("observation_capacity must be non-zero".to_string())
        })?;
        let epoch = NonZeroUsize::new(self.epoch_capacity).ok_or_else(|| {
            OracleError::InvalidConfig("epoch_capacity must be non-zero".to_string())
        })?;
        Ok((observation, epoch))
    }
}
