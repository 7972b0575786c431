//! Windowed averages over ring buffers.
//!
//! The walk starts at the newest entry and moves backward, wrapping through
//! slot 0, for at most `capacity` steps. Timestamps are non-decreasing in
//! push order, so the walk stops at the first entry older than the window.
//!
//! ```text
//! average = sum(value_i * weight_i) / sum(weight_i)    for start <= t_i <= end
//! ```
//!
//! Raw observations weigh 1; epochs weigh their cardinality.

use ethnum::U256;
use perp_math::MathError;
use perp_types::{IndexObservation, LastPriceObservation, PriceEpoch};
use serde::Serialize;

use crate::ring::RingBuffer;

/// A timestamped value that can be averaged.
pub trait Sample {
    /// When the sample was taken.
    fn timestamp(&self) -> u64;
    /// The sampled price.
    fn value(&self) -> U256;
    /// How many raw samples this entry stands for.
    fn weight(&self) -> u32 {
        1
    }
}

impl Sample for IndexObservation {
    fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn value(&self) -> U256 {
        self.underlying_price
    }
}

impl Sample for LastPriceObservation {
    fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn value(&self) -> U256 {
        self.last_price
    }
}

impl Sample for PriceEpoch {
    fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn value(&self) -> U256 {
        self.price
    }

    fn weight(&self) -> u32 {
        self.cardinality
    }
}

/// Closed time range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// First included timestamp.
    pub start: u64,
    /// Last included timestamp.
    pub end: u64,
}

impl TimeRange {
    /// Create a range from explicit bounds.
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// The `length` seconds ending at `now`.
    pub fn trailing(now: u64, length: u64) -> Self {
        Self {
            start: now.saturating_sub(length),
            end: now,
        }
    }
}

/// Grid that a clamped start is snapped onto: `origin + k * interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alignment {
    /// First boundary.
    pub origin: u64,
    /// Distance between boundaries.
    pub interval: u64,
}

impl Alignment {
    /// Smallest boundary that is `>= timestamp`.
    ///
    /// # Errors
    ///
    /// - [`MathError::DivisionByZero`] if `interval` is zero
    /// - [`MathError::Overflow`] if the boundary exceeds `u64`
    pub fn boundary_at_or_after(&self, timestamp: u64) -> Result<u64, MathError> {
        if self.interval == 0 {
            return Err(MathError::DivisionByZero);
        }
        if timestamp <= self.origin {
            return Ok(self.origin);
        }
        let periods = (timestamp - self.origin).div_ceil(self.interval);
        periods
            .checked_mul(self.interval)
            .and_then(|offset| self.origin.checked_add(offset))
            .ok_or(MathError::Overflow)
    }
}

/// What to report when no sample falls inside the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// The newest retained sample.
    Latest,
    /// Zero, meaning "no data".
    Zero,
}

/// Result of a windowed query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowedAverage {
    /// Weighted integer mean of the contributing samples.
    pub average: U256,
    /// Timestamp of the newest contributing sample.
    pub last_timestamp: u64,
    /// Total weight of the contributing samples; 0 when a fallback was used.
    pub samples: u64,
}

/// Average the samples of `ring` that fall inside `range`.
///
/// `range.end` is clamped to the newest sample. Once the ring has wrapped, a
/// `range.start` older than the oldest retained sample is moved forward to
/// that sample, snapped onto `alignment` when one is given, so the query never
/// claims data that was overwritten.
///
/// Returns `Ok(None)` for an empty ring.
///
/// # Errors
///
/// - [`MathError::Overflow`] if the weighted sum exceeds 256 bits
pub fn windowed_average<T: Sample>(
    ring: &RingBuffer<T>,
    range: TimeRange,
    alignment: Option<Alignment>,
    fallback: Fallback,
) -> Result<Option<WindowedAverage>, MathError> {
    let Some(newest) = ring.newest() else {
        return Ok(None);
    };

    if ring.total() == 1 {
        return Ok(Some(WindowedAverage {
            average: newest.value(),
            last_timestamp: newest.timestamp(),
            samples: u64::from(newest.weight()),
        }));
    }

    let end = range.end.min(newest.timestamp());
    let mut start = range.start;
    if ring.is_wrapped() {
        if let Some(oldest) = ring.oldest() {
            if start < oldest.timestamp() {
                start = match alignment {
                    Some(grid) => grid.boundary_at_or_after(oldest.timestamp())?,
                    None => oldest.timestamp(),
                };
            }
        }
    }

    let mut sum = U256::ZERO;
    let mut count: u64 = 0;
    let mut last_timestamp = None;
    for sample in ring.iter_newest_first() {
        let ts = sample.timestamp();
        if ts > end {
            continue;
        }
        if ts < start {
            break;
        }
        let weight = sample.weight();
        let contribution = sample
            .value()
            .checked_mul(U256::from(weight))
            .ok_or(MathError::Overflow)?;
        sum = sum.checked_add(contribution).ok_or(MathError::Overflow)?;
        count = count
            .checked_add(u64::from(weight))
            .ok_or(MathError::Overflow)?;
        last_timestamp.get_or_insert(ts);
    }

    if let Some(last_timestamp) = last_timestamp.filter(|_| count > 0) {
        return Ok(Some(WindowedAverage {
            average: sum / U256::from(count),
            last_timestamp,
            samples: count,
        }));
    }

    let fallback = match fallback {
        Fallback::Latest => WindowedAverage {
            average: newest.value(),
            last_timestamp: newest.timestamp(),
            samples: 0,
        },
        Fallback::Zero => WindowedAverage {
            average: U256::ZERO,
            last_timestamp: 0,
            samples: 0,
        },
    };
    Ok(Some(fallback))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;

    fn ring_of(capacity: usize, samples: &[(u64, u128)]) -> RingBuffer<LastPriceObservation> {
        let mut ring = RingBuffer::new(NonZeroUsize::new(capacity).expect("non-zero"));
        for &(timestamp, price) in samples {
            ring.push(LastPriceObservation {
                timestamp,
                last_price: U256::new(price),
            });
        }
        ring
    }

    fn avg(
        ring: &RingBuffer<LastPriceObservation>,
        start: u64,
        end: u64,
        fallback: Fallback,
    ) -> WindowedAverage {
        windowed_average(ring, TimeRange::new(start, end), None, fallback)
            .expect("no overflow")
            .expect("non-empty")
    }

    #[test]
    fn test_empty_ring_is_none() {
        let ring = ring_of(4, &[]);
        let result = windowed_average(&ring, TimeRange::new(0, 10), None, Fallback::Latest)
            .expect("no overflow");
        assert_eq!(result, None);
    }

    #[test]
    fn test_single_sample_short_circuits() {
        let ring = ring_of(4, &[(100, 42)]);
        // Window far away from the sample still returns it.
        let result = avg(&ring, 5000, 6000, Fallback::Zero);
        assert_eq!(result.average, U256::new(42));
        assert_eq!(result.last_timestamp, 100);
    }

    #[test]
    fn test_closed_interval_mean() {
        let ring = ring_of(8, &[(10, 100), (20, 200), (30, 300), (40, 400)]);
        let result = avg(&ring, 20, 30, Fallback::Zero);
        assert_eq!(result.average, U256::new(250));
        assert_eq!(result.last_timestamp, 30);
        assert_eq!(result.samples, 2);
    }

    #[test]
    fn test_end_clamped_to_newest() {
        let ring = ring_of(8, &[(10, 100), (20, 200)]);
        let result = avg(&ring, 0, 1_000_000, Fallback::Zero);
        assert_eq!(result.average, U256::new(150));
        assert_eq!(result.last_timestamp, 20);
    }

    #[test]
    fn test_integer_average_truncates() {
        let ring = ring_of(8, &[(1, 1), (2, 2)]);
        assert_eq!(avg(&ring, 0, 2, Fallback::Zero).average, U256::new(1));
    }

    #[test]
    fn test_fallbacks_when_window_empty() {
        let ring = ring_of(8, &[(10, 100), (20, 200)]);
        let latest = avg(&ring, 100, 200, Fallback::Latest);
        assert_eq!(latest.average, U256::new(200));
        assert_eq!(latest.samples, 0);

        let zero = avg(&ring, 100, 200, Fallback::Zero);
        assert_eq!(zero.average, U256::ZERO);
        assert_eq!(zero.last_timestamp, 0);
    }

    #[test]
    fn test_wrapped_ring_only_sees_retained() {
        // Capacity 3: samples at 10 and 20 are overwritten.
        let ring = ring_of(3, &[(10, 1000), (20, 1000), (30, 30), (40, 40), (50, 50)]);
        let result = avg(&ring, 0, 50, Fallback::Zero);
        assert_eq!(result.average, U256::new(40));
        assert_eq!(result.samples, 3);
    }

    #[test]
    fn test_wrapped_start_snaps_to_alignment() {
        let ring = ring_of(3, &[(0, 1), (100, 2), (150, 3), (200, 4), (250, 5)]);
        // Oldest retained is 150; with a 100s grid the start moves to 200.
        let grid = Alignment {
            origin: 0,
            interval: 100,
        };
        let result = windowed_average(&ring, TimeRange::new(0, 250), Some(grid), Fallback::Zero)
            .expect("no overflow")
            .expect("non-empty");
        assert_eq!(result.average, U256::new(4)); // (4 + 5) / 2
        assert_eq!(result.samples, 2);
    }

    #[test]
    fn test_epoch_weighting() {
        let mut ring = RingBuffer::new(NonZeroUsize::new(4).expect("non-zero"));
        ring.push(PriceEpoch {
            price: U256::new(100),
            timestamp: 10,
            cardinality: 3,
        });
        ring.push(PriceEpoch {
            price: U256::new(200),
            timestamp: 20,
            cardinality: 1,
        });
        let result = windowed_average(&ring, TimeRange::new(0, 20), None, Fallback::Zero)
            .expect("no overflow")
            .expect("non-empty");
        // (100 * 3 + 200) / 4
        assert_eq!(result.average, U256::new(125));
        assert_eq!(result.samples, 4);
    }

    #[test]
    fn test_alignment_boundaries() {
        let grid = Alignment {
            origin: 1000,
            interval: 60,
        };
        assert_eq!(grid.boundary_at_or_after(900).expect("before"), 1000);
        assert_eq!(grid.boundary_at_or_after(1000).expect("on"), 1000);
        assert_eq!(grid.boundary_at_or_after(1001).expect("after"), 1060);
        assert_eq!(grid.boundary_at_or_after(1120).expect("on grid"), 1120);

        let broken = Alignment {
            origin: 0,
            interval: 0,
        };
        assert_eq!(
            broken.boundary_at_or_after(5),
            Err(MathError::DivisionByZero)
        );
    }

    #[test]
    fn test_trailing_range_saturates() {
        assert_eq!(TimeRange::trailing(100, 300), TimeRange::new(0, 100));
        assert_eq!(TimeRange::trailing(1000, 300), TimeRange::new(700, 1000));
    }
}
