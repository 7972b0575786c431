//! # perp-oracle
//!
//! Bounded, append-only price store for perpetual instruments.
//!
//! Each tracked instrument owns two raw observation rings (index prices and
//! last prices), two smaller epoch rings that down-sample them into
//! sampling-interval buckets, and a mark price derived on every index push as
//! the median of a funding-adjusted index projection, a short-window average
//! of last prices and the previous mark.
//!
//! ## Modules
//!
//! - [`ring`]: fixed-capacity circular buffer
//! - [`epoch`]: running-mean epoch aggregation
//! - [`window`]: windowed averages over rings
//! - [`mark`]: mark price computation
//! - [`store`]: the per-instrument store tying it together
//! - [`auth`]: caller authorization collaborator
//! - [`funding`]: funding-rate collaborator
//! - [`events`]: event bus
//! - [`config`]: store configuration

pub mod auth;
pub mod config;
pub mod epoch;
pub mod events;
pub mod funding;
pub mod mark;
pub mod ring;
pub mod store;
pub mod window;

pub use auth::{AllowAll, AllowList, Authorizer, CallerId, Role};
pub use config::{Intervals, OracleConfig};
pub use funding::{FundingSource, FundingState, SharedFunding};
pub use store::{InstrumentSpec, MarkUpdate, OracleStore};
pub use window::WindowedAverage;

use perp_math::MathError;
use perp_types::{InstrumentId, PriceKind};

/// Error types for oracle operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    /// The caller does not hold the role the operation requires.
    #[error("caller {caller} is not authorized as {role}")]
    Unauthorized {
        /// Rejected caller.
        caller: CallerId,
        /// Role that was required.
        role: Role,
    },

    /// A pushed price was zero; zero is reserved as the "no data" sentinel.
    #[error("price must be non-zero")]
    ZeroPrice,

    /// A query found no stored samples.
    #[error("no {kind} observations for instrument {instrument}")]
    NoObservations {
        /// Instrument that was queried.
        instrument: InstrumentId,
        /// Observation family that was queried.
        kind: PriceKind,
    },

    /// The instrument is not registered.
    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),

    /// A configuration value was rejected.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Arithmetic failure in the fixed-point kernel.
    #[error(transparent)]
    Math(#[from] MathError),

    /// A writer panicked while holding an instrument lock.
    #[error("instrument state lock poisoned")]
    LockPoisoned,
}

/// Convenience result type for oracle operations.
pub type Result<T> = std::result::Result<T, OracleError>;
