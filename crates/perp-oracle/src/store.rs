//! The oracle store.
//!
//! Owns every buffer for every instrument. Each instrument's state sits
//! behind its own `RwLock`: a push holds the write lock for the whole
//! push + aggregate + mark sequence, queries take the read lock and may run
//! concurrently with each other.
//!
//! Mutations are planned first and committed last, so a failing push leaves
//! the raw rings, the epoch rings and the mark price untouched.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ethnum::U256;
use perp_types::{
    IndexObservation, InstrumentId, LastPriceObservation, OracleEvent, PriceEpoch, PriceKind,
    ProvenanceHash, ZERO_PROVENANCE,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::auth::{Authorizer, CallerId, Role};
use crate::config::{Intervals, OracleConfig};
use crate::epoch::{EpochAggregator, EpochTransition};
use crate::events::EventBus;
use crate::funding::FundingSource;
use crate::mark::{compute_mark, MarkInputs};
use crate::ring::RingBuffer;
use crate::window::{windowed_average, Alignment, Fallback, Sample, TimeRange, WindowedAverage};
use crate::{OracleError, Result};

/// Registration data for one instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentSpec {
    /// External identifier (market or token address). Must be unique.
    pub external_id: String,
    /// First index price.
    pub initial_index_price: U256,
    /// First last price; also the initial mark price.
    pub initial_last_price: U256,
}

/// Outcome of the mark price step of an index push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkUpdate {
    /// Instrument that was updated.
    pub instrument: InstrumentId,
    /// Push time.
    pub timestamp: u64,
    /// Funding-adjusted index projection.
    pub projected_index: U256,
    /// Short-window last-price average.
    pub short_window_average: U256,
    /// Mark price before the push.
    pub previous_mark: U256,
    /// Mark price after the push.
    pub mark_price: U256,
    /// False when the median was zero and the previous mark was kept.
    pub applied: bool,
}

/// All buffers of one instrument.
#[derive(Debug)]
struct InstrumentBook {
    id: InstrumentId,
    external_id: String,
    index: RingBuffer<IndexObservation>,
    last_price: RingBuffer<LastPriceObservation>,
    index_epochs: EpochAggregator,
    last_price_epochs: EpochAggregator,
    latest_mark_price: U256,
    initial_timestamp: Option<u64>,
}

impl InstrumentBook {
    fn epochs(&self, kind: PriceKind) -> &EpochAggregator {
        match kind {
            PriceKind::Index => &self.index_epochs,
            PriceKind::LastPrice => &self.last_price_epochs,
        }
    }

    fn observation_total(&self, kind: PriceKind) -> u64 {
        match kind {
            PriceKind::Index => self.index.total(),
            PriceKind::LastPrice => self.last_price.total(),
        }
    }

    fn observation_at(&self, kind: PriceKind, age: usize) -> Option<(u64, U256)> {
        match kind {
            PriceKind::Index => self.index.get(age).map(|o| (o.timestamp(), o.value())),
            PriceKind::LastPrice => self.last_price.get(age).map(|o| (o.timestamp(), o.value())),
        }
    }

    /// Sampling grid anchored at the first last-price push, or at the oldest
    /// entry of `ring` before that has happened.
    fn alignment<T: Sample>(&self, ring: &RingBuffer<T>, interval: u64) -> Option<Alignment> {
        self.initial_timestamp
            .or_else(|| ring.oldest().map(|entry| entry.timestamp()))
            .map(|origin| Alignment { origin, interval })
    }

    fn no_observations(&self, kind: PriceKind) -> OracleError {
        OracleError::NoObservations {
            instrument: self.id,
            kind,
        }
    }

    /// Commit an index observation and its planned epoch transition.
    fn commit_index(
        &mut self,
        observation: IndexObservation,
        transition: EpochTransition,
        events: &EventBus,
    ) {
        let total = self.index.push(observation);
        let epochs = self.index_epochs.apply(transition);
        debug!(
            instrument = %self.id,
            total,
            epochs,
            merged = !transition.is_rotation(),
            epoch_price = %transition.epoch().price,
            "index observation stored"
        );
        events.emit(OracleEvent::IndexPriceUpdated {
            instrument: self.id,
            price: observation.underlying_price,
            timestamp: observation.timestamp,
            provenance: observation.provenance,
        });
        self.emit_rotation(PriceKind::Index, transition, epochs, events);
    }

    /// Commit a last-price observation and its planned epoch transition.
    fn commit_last_price(
        &mut self,
        observation: LastPriceObservation,
        transition: EpochTransition,
        events: &EventBus,
    ) {
        let total = self.last_price.push(observation);
        if total == 1 {
            self.initial_timestamp = Some(observation.timestamp);
        }
        let epochs = self.last_price_epochs.apply(transition);
        debug!(
            instrument = %self.id,
            total,
            epochs,
            merged = !transition.is_rotation(),
            epoch_price = %transition.epoch().price,
            "last price observation stored"
        );
        events.emit(OracleEvent::LastPriceUpdated {
            instrument: self.id,
            price: observation.last_price,
            timestamp: observation.timestamp,
        });
        self.emit_rotation(PriceKind::LastPrice, transition, epochs, events);
    }

    fn emit_rotation(
        &self,
        kind: PriceKind,
        transition: EpochTransition,
        sequence: u64,
        events: &EventBus,
    ) {
        if let EpochTransition::Rotate(epoch) = transition {
            events.emit(OracleEvent::EpochOpened {
                instrument: self.id,
                kind,
                sequence,
                timestamp: epoch.timestamp,
            });
        }
    }
}

/// Bounded time-series store for a fixed set of instruments.
pub struct OracleStore {
    books: Vec<RwLock<InstrumentBook>>,
    by_external: HashMap<String, InstrumentId>,
    intervals: RwLock<Intervals>,
    authorizer: Arc<dyn Authorizer>,
    funding: Arc<dyn FundingSource>,
    events: EventBus,
}

impl OracleStore {
    /// Build a store and register `instruments` as ids `0..N-1`.
    ///
    /// Each instrument starts with one index observation, one last-price
    /// observation (both at `now`), one epoch in each epoch ring, and a mark
    /// price equal to its initial last price.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidConfig`] for a zero interval or capacity, a
    ///   duplicate external id, or more than 65 536 instruments
    /// - [`OracleError::ZeroPrice`] if an initial price is zero
    pub fn new(
        config: OracleConfig,
        instruments: Vec<InstrumentSpec>,
        authorizer: Arc<dyn Authorizer>,
        funding: Arc<dyn FundingSource>,
        now: u64,
    ) -> Result<Self> {
        config.validate()?;
        let (observation_capacity, epoch_capacity) = config.capacities()?;
        let intervals = config.intervals();
        let events = EventBus::default();

        let mut books = Vec::with_capacity(instruments.len());
        let mut by_external = HashMap::with_capacity(instruments.len());

        for (position, spec) in instruments.into_iter().enumerate() {
            let id = u16::try_from(position).map(InstrumentId).map_err(|_| {
                OracleError::InvalidConfig("too many instruments".to_string())
            })?;
            if spec.initial_index_price == U256::ZERO || spec.initial_last_price == U256::ZERO {
                return Err(OracleError::ZeroPrice);
            }
            if by_external.insert(spec.external_id.clone(), id).is_some() {
                return Err(OracleError::InvalidConfig(format!(
                    "duplicate instrument {}",
                    spec.external_id
                )));
            }

            let mut book = InstrumentBook {
                id,
                external_id: spec.external_id,
                index: RingBuffer::new(observation_capacity),
                last_price: RingBuffer::new(observation_capacity),
                index_epochs: EpochAggregator::new(epoch_capacity),
                last_price_epochs: EpochAggregator::new(epoch_capacity),
                latest_mark_price: spec.initial_last_price,
                initial_timestamp: None,
            };

            let index_epoch =
                book.index_epochs
                    .plan(now, spec.initial_index_price, intervals.sampling_interval)?;
            book.commit_index(
                IndexObservation {
                    timestamp: now,
                    underlying_price: spec.initial_index_price,
                    provenance: ZERO_PROVENANCE,
                },
                index_epoch,
                &events,
            );
            let last_epoch = book.last_price_epochs.plan(
                now,
                spec.initial_last_price,
                intervals.sampling_interval,
            )?;
            book.commit_last_price(
                LastPriceObservation {
                    timestamp: now,
                    last_price: spec.initial_last_price,
                },
                last_epoch,
                &events,
            );

            info!(
                instrument = %id,
                external_id = %book.external_id,
                index_price = %spec.initial_index_price,
                last_price = %spec.initial_last_price,
                "instrument registered"
            );
            books.push(RwLock::new(book));
        }

        Ok(Self {
            books,
            by_external,
            intervals: RwLock::new(intervals),
            authorizer,
            funding,
            events,
        })
    }

    /// The store's event bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Number of registered instruments.
    pub fn instrument_count(&self) -> usize {
        self.books.len()
    }

    /// Look up an instrument by its external identifier.
    pub fn instrument_id(&self, external_id: &str) -> Option<InstrumentId> {
        self.by_external.get(external_id).copied()
    }

    /// External identifier of a registered instrument.
    pub fn external_id(&self, instrument: InstrumentId) -> Result<String> {
        Ok(self.read(instrument)?.external_id.clone())
    }

    /// Current interval settings.
    pub fn intervals(&self) -> Result<Intervals> {
        self.intervals
            .read()
            .map(|intervals| *intervals)
            .map_err(|_| OracleError::LockPoisoned)
    }

    fn book(&self, instrument: InstrumentId) -> Result<&RwLock<InstrumentBook>> {
        self.books
            .get(instrument.index())
            .ok_or_else(|| OracleError::UnknownInstrument(instrument.to_string()))
    }

    fn read(&self, instrument: InstrumentId) -> Result<RwLockReadGuard<'_, InstrumentBook>> {
        self.book(instrument)?
            .read()
            .map_err(|_| OracleError::LockPoisoned)
    }

    fn write(&self, instrument: InstrumentId) -> Result<RwLockWriteGuard<'_, InstrumentBook>> {
        self.book(instrument)?
            .write()
            .map_err(|_| OracleError::LockPoisoned)
    }

    fn authorize(&self, caller: &CallerId, role: Role) -> Result<()> {
        if self.authorizer.is_allowed(caller, role) {
            return Ok(());
        }
        warn!(%caller, %role, "unauthorized oracle call rejected");
        Err(OracleError::Unauthorized {
            caller: caller.clone(),
            role,
        })
    }

    // ------------------------------------------------------------------
    // Pushes
    // ------------------------------------------------------------------

    /// Store an index observation and recompute the mark price.
    ///
    /// The new mark is appended as a last-price observation, which is how
    /// the previous-mark input evolves.
    ///
    /// # Errors
    ///
    /// - [`OracleError::Unauthorized`] without the `PricePusher` role
    /// - [`OracleError::ZeroPrice`] if `price` is zero
    /// - [`OracleError::UnknownInstrument`] for an unregistered instrument
    /// - [`OracleError::Math`] if the mark or epoch arithmetic fails
    pub fn push_index_observation(
        &self,
        caller: &CallerId,
        instrument: InstrumentId,
        price: U256,
        provenance: ProvenanceHash,
        now: u64,
    ) -> Result<MarkUpdate> {
        self.authorize(caller, Role::PricePusher)?;
        if price == U256::ZERO {
            warn!(%instrument, "zero index price rejected");
            return Err(OracleError::ZeroPrice);
        }

        let intervals = self.intervals()?;
        let funding = self.funding.funding_state(instrument);
        let mut book = self.write(instrument)?;

        // Plan: nothing below may fail once the first write happens.
        let short_window_average = windowed_average(
            &book.last_price,
            TimeRange::trailing(now, intervals.mark_sampling_interval),
            book.alignment(&book.last_price, intervals.sampling_interval),
            Fallback::Latest,
        )?
        .map(|w| w.average)
        .unwrap_or(U256::ZERO);

        let computation = compute_mark(&MarkInputs {
            index_price: price,
            funding,
            funding_period: intervals.funding_period,
            short_window_average,
            previous_mark: book.latest_mark_price,
        })?;

        let index_epoch = book
            .index_epochs
            .plan(now, price, intervals.sampling_interval)?;

        // The previous mark and the short-window average are never zero, so
        // neither is their median; a zero here means that invariant broke.
        let applied = computation.mark_price != U256::ZERO;
        let last_epoch = if applied {
            Some(book.last_price_epochs.plan(
                now,
                computation.mark_price,
                intervals.sampling_interval,
            )?)
        } else {
            None
        };

        // Commit.
        book.commit_index(
            IndexObservation {
                timestamp: now,
                underlying_price: price,
                provenance,
            },
            index_epoch,
            &self.events,
        );

        match last_epoch {
            Some(transition) => {
                book.latest_mark_price = computation.mark_price;
                book.commit_last_price(
                    LastPriceObservation {
                        timestamp: now,
                        last_price: computation.mark_price,
                    },
                    transition,
                    &self.events,
                );
                self.events.emit(OracleEvent::MarkPriceUpdated {
                    instrument,
                    mark_price: computation.mark_price,
                    projected_index: computation.projected_index,
                    short_window_average: computation.short_window_average,
                    previous_mark: computation.previous_mark,
                    timestamp: now,
                });
                info!(
                    %instrument,
                    mark = %computation.mark_price,
                    projected = %computation.projected_index,
                    short_avg = %computation.short_window_average,
                    previous = %computation.previous_mark,
                    "mark price updated"
                );
            }
            None => {
                warn!(%instrument, "median mark price is zero; keeping previous mark");
            }
        }

        Ok(MarkUpdate {
            instrument,
            timestamp: now,
            projected_index: computation.projected_index,
            short_window_average: computation.short_window_average,
            previous_mark: computation.previous_mark,
            mark_price: book.latest_mark_price,
            applied,
        })
    }

    /// Store a last-price observation without touching the mark price.
    ///
    /// # Errors
    ///
    /// - [`OracleError::Unauthorized`] without the `PricePusher` role
    /// - [`OracleError::ZeroPrice`] if `price` is zero
    /// - [`OracleError::UnknownInstrument`] for an unregistered instrument
    /// - [`OracleError::Math`] if the epoch merge overflows
    pub fn push_last_price_observation(
        &self,
        caller: &CallerId,
        instrument: InstrumentId,
        price: U256,
        now: u64,
    ) -> Result<()> {
        self.authorize(caller, Role::PricePusher)?;
        if price == U256::ZERO {
            warn!(%instrument, "zero last price rejected");
            return Err(OracleError::ZeroPrice);
        }

        let intervals = self.intervals()?;
        let mut book = self.write(instrument)?;
        let transition = book
            .last_price_epochs
            .plan(now, price, intervals.sampling_interval)?;
        book.commit_last_price(
            LastPriceObservation {
                timestamp: now,
                last_price: price,
            },
            transition,
            &self.events,
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Newest `(timestamp, price)` of the given kind.
    ///
    /// # Errors
    ///
    /// - [`OracleError::NoObservations`] if nothing was stored
    pub fn latest(&self, instrument: InstrumentId, kind: PriceKind) -> Result<(u64, U256)> {
        let book = self.read(instrument)?;
        book.observation_at(kind, 0)
            .ok_or_else(|| book.no_observations(kind))
    }

    /// Newest index price.
    pub fn latest_index_price(&self, instrument: InstrumentId) -> Result<U256> {
        Ok(self.latest(instrument, PriceKind::Index)?.1)
    }

    /// Newest last price.
    pub fn latest_last_price(&self, instrument: InstrumentId) -> Result<U256> {
        Ok(self.latest(instrument, PriceKind::LastPrice)?.1)
    }

    /// Current mark price.
    pub fn latest_mark_price(&self, instrument: InstrumentId) -> Result<U256> {
        Ok(self.read(instrument)?.latest_mark_price)
    }

    /// Average of the raw index prices over the `window` seconds ending at
    /// `now`. An empty window averages to zero ("no data").
    ///
    /// Once the ring has wrapped, a start older than the oldest retained
    /// observation snaps to the next sampling boundary after it.
    pub fn windowed_index_sma(
        &self,
        instrument: InstrumentId,
        window: u64,
        now: u64,
    ) -> Result<WindowedAverage> {
        let intervals = self.intervals()?;
        let book = self.read(instrument)?;
        windowed_average(
            &book.index,
            TimeRange::trailing(now, window),
            book.alignment(&book.index, intervals.sampling_interval),
            Fallback::Zero,
        )?
        .ok_or_else(|| book.no_observations(PriceKind::Index))
    }

    /// Average of the raw last prices over the `window` seconds ending at
    /// `now`. An empty window falls back to the newest last price.
    pub fn windowed_last_price_sma(
        &self,
        instrument: InstrumentId,
        window: u64,
        now: u64,
    ) -> Result<U256> {
        let intervals = self.intervals()?;
        let book = self.read(instrument)?;
        windowed_average(
            &book.last_price,
            TimeRange::trailing(now, window),
            book.alignment(&book.last_price, intervals.sampling_interval),
            Fallback::Latest,
        )?
        .map(|w| w.average)
        .ok_or_else(|| book.no_observations(PriceKind::LastPrice))
    }

    /// Cardinality-weighted average of the epochs in `[start, end]`.
    ///
    /// Once the epoch ring has wrapped, a start older than the oldest retained
    /// epoch snaps to the next sampling boundary after it. An empty window
    /// yields zero for index epochs and the newest epoch price for last-price
    /// epochs.
    pub fn epoch_sma(
        &self,
        instrument: InstrumentId,
        start: u64,
        end: u64,
        kind: PriceKind,
    ) -> Result<U256> {
        let intervals = self.intervals()?;
        let book = self.read(instrument)?;
        let ring = book.epochs(kind).ring();
        let alignment = book.alignment(ring, intervals.sampling_interval);
        let fallback = match kind {
            PriceKind::Index => Fallback::Zero,
            PriceKind::LastPrice => Fallback::Latest,
        };
        windowed_average(ring, TimeRange::new(start, end), alignment, fallback)?
            .map(|w| w.average)
            .ok_or_else(|| book.no_observations(kind))
    }

    /// Number of observations of `kind` ever pushed.
    pub fn observation_count(&self, instrument: InstrumentId, kind: PriceKind) -> Result<u64> {
        Ok(self.read(instrument)?.observation_total(kind))
    }

    /// Number of epochs of `kind` ever opened.
    pub fn epoch_count(&self, instrument: InstrumentId, kind: PriceKind) -> Result<u64> {
        Ok(self.read(instrument)?.epochs(kind).total())
    }

    /// The open (most recent) epoch of `kind`.
    pub fn latest_epoch(&self, instrument: InstrumentId, kind: PriceKind) -> Result<PriceEpoch> {
        let book = self.read(instrument)?;
        book.epochs(kind)
            .ring()
            .newest()
            .copied()
            .ok_or_else(|| book.no_observations(kind))
    }

    /// Observation of `kind` pushed `age` pushes ago, if still retained.
    pub fn observation_at(
        &self,
        instrument: InstrumentId,
        kind: PriceKind,
        age: usize,
    ) -> Result<Option<(u64, U256)>> {
        Ok(self.read(instrument)?.observation_at(kind, age))
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    fn update_intervals(
        &self,
        caller: &CallerId,
        name: &str,
        value: u64,
        apply: impl FnOnce(&mut Intervals),
    ) -> Result<()> {
        self.authorize(caller, Role::Configurator)?;
        if value == 0 {
            return Err(OracleError::InvalidConfig(format!("{name} must be non-zero")));
        }
        let mut intervals = self
            .intervals
            .write()
            .map_err(|_| OracleError::LockPoisoned)?;
        apply(&mut *intervals);
        info!(%caller, setting = name, value, "oracle interval updated");
        Ok(())
    }

    /// Change the epoch length.
    pub fn set_sampling_interval(&self, caller: &CallerId, value: u64) -> Result<()> {
        self.update_intervals(caller, "sampling_interval", value, |i| {
            i.sampling_interval = value
        })
    }

    /// Change the mark price's short window.
    pub fn set_mark_sampling_interval(&self, caller: &CallerId, value: u64) -> Result<()> {
        self.update_intervals(caller, "mark_sampling_interval", value, |i| {
            i.mark_sampling_interval = value
        })
    }

    /// Change the funding period.
    pub fn set_funding_period(&self, caller: &CallerId, value: u64) -> Result<()> {
        self.update_intervals(caller, "funding_period", value, |i| i.funding_period = value)
    }
}

impl std::fmt::Debug for OracleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleStore")
            .field("instruments", &self.books.len())
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}
