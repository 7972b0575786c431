//! Configuration, funding and status handlers.

use perp_oracle::{Authorizer, FundingSource, FundingState, OracleError, Role};
use perp_types::{InstrumentId, PriceKind};
use serde_json::{json, Value};
use tracing::warn;

use super::{caller, instrument, seconds, signed, Result};
use crate::DaemonState;

/// `set_funding_state {caller, instrument, last_funding_rate, next_funding_interval}`
///
/// Requires the configurator role; the rate is 1e18-scaled and may be negative.
pub fn set_funding_state(state: &DaemonState, params: &Value) -> Result {
    let caller = caller(params)?;
    if !state.access.is_allowed(&caller, Role::Configurator) {
        warn!(%caller, "unauthorized funding update rejected");
        return Err(OracleError::Unauthorized {
            caller,
            role: Role::Configurator,
        }
        .into());
    }
    let id = instrument(state, params)?;
    let funding = FundingState {
        last_funding_rate: signed(params, "last_funding_rate")?,
        next_funding_interval: seconds(params, "next_funding_interval")?,
    };
    state.funding.set_funding_state(id, funding);
    Ok(json!({
        "instrument": id.0,
        "last_funding_rate": funding.last_funding_rate.to_string(),
        "next_funding_interval": funding.next_funding_interval,
    }))
}

/// `set_sampling_interval {caller, value}`
pub fn set_sampling_interval(state: &DaemonState, params: &Value) -> Result {
    let caller = caller(params)?;
    let value = seconds(params, "value")?;
    state.store.set_sampling_interval(&caller, value)?;
    intervals(state)
}

/// `set_mark_sampling_interval {caller, value}`
pub fn set_mark_sampling_interval(state: &DaemonState, params: &Value) -> Result {
    let caller = caller(params)?;
    let value = seconds(params, "value")?;
    state.store.set_mark_sampling_interval(&caller, value)?;
    intervals(state)
}

/// `set_funding_period {caller, value}`
pub fn set_funding_period(state: &DaemonState, params: &Value) -> Result {
    let caller = caller(params)?;
    let value = seconds(params, "value")?;
    state.store.set_funding_period(&caller, value)?;
    intervals(state)
}

fn intervals(state: &DaemonState) -> Result {
    let intervals = state.store.intervals()?;
    Ok(json!(intervals))
}

/// `list_instruments {}`
pub fn list_instruments(state: &DaemonState) -> Result {
    let count = u16::try_from(state.store.instrument_count()).unwrap_or(u16::MAX);
    let mut out = Vec::with_capacity(usize::from(count));
    for raw in 0..count {
        let id = InstrumentId(raw);
        let (_, index_price) = state.store.latest(id, PriceKind::Index)?;
        let (_, last_price) = state.store.latest(id, PriceKind::LastPrice)?;
        out.push(json!({
            "instrument": raw,
            "external_id": state.store.external_id(id)?,
            "index_price": index_price.to_string(),
            "last_price": last_price.to_string(),
            "mark_price": state.store.latest_mark_price(id)?.to_string(),
            "index_observations": state.store.observation_count(id, PriceKind::Index)?,
            "last_price_observations": state.store.observation_count(id, PriceKind::LastPrice)?,
            "index_epochs": state.store.epoch_count(id, PriceKind::Index)?,
            "last_price_epochs": state.store.epoch_count(id, PriceKind::LastPrice)?,
        }));
    }
    Ok(Value::Array(out))
}

/// `get_status {}`
pub fn get_status(state: &DaemonState, now: u64) -> Result {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "instruments": state.store.instrument_count(),
        "intervals": state.store.intervals()?,
        "event_sequence": state.store.events().sequence(),
        "socket_path": state.config.daemon.socket_path,
        "started_at": state.started_at,
        "uptime_secs": now.saturating_sub(state.started_at),
    }))
}

/// Look up one instrument's funding inputs: `get_funding_state {instrument}`.
pub fn get_funding_state(state: &DaemonState, params: &Value) -> Result {
    let id = instrument(state, params)?;
    let funding = state.funding.funding_state(id);
    Ok(json!({
        "instrument": id.0,
        "last_funding_rate": funding.last_funding_rate.to_string(),
        "next_funding_interval": funding.next_funding_interval,
    }))
}
