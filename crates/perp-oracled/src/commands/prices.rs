//! Price push and query handlers.

use perp_types::{parse_provenance, provenance_hex, PriceKind, ZERO_PROVENANCE};
use serde_json::{json, Value};

use super::{caller, instrument, price, seconds, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

/// `push_index_price {caller, instrument, price, provenance?}`
pub fn push_index_price(state: &DaemonState, params: &Value, now: u64) -> Result {
    let caller = caller(params)?;
    let id = instrument(state, params)?;
    let price = price(params, "price")?;
    let provenance = match params.get("provenance").and_then(Value::as_str) {
        Some(hex) => parse_provenance(hex)
            .ok_or_else(|| RpcError::invalid_params("provenance must be 32 bytes of hex"))?,
        None => ZERO_PROVENANCE,
    };

    let update = state
        .store
        .push_index_observation(&caller, id, price, provenance, now)?;

    Ok(json!({
        "instrument": id.0,
        "timestamp": update.timestamp,
        "provenance": provenance_hex(&provenance),
        "mark_price": update.mark_price.to_string(),
        "projected_index": update.projected_index.to_string(),
        "short_window_average": update.short_window_average.to_string(),
        "previous_mark": update.previous_mark.to_string(),
        "applied": update.applied,
    }))
}

/// `push_last_price {caller, instrument, price}`
pub fn push_last_price(state: &DaemonState, params: &Value, now: u64) -> Result {
    let caller = caller(params)?;
    let id = instrument(state, params)?;
    let price = price(params, "price")?;
    state
        .store
        .push_last_price_observation(&caller, id, price, now)?;
    Ok(json!({"instrument": id.0, "timestamp": now}))
}

fn latest(state: &DaemonState, params: &Value, kind: PriceKind) -> Result {
    let id = instrument(state, params)?;
    let (timestamp, price) = state.store.latest(id, kind)?;
    Ok(json!({
        "instrument": id.0,
        "price": price.to_string(),
        "timestamp": timestamp,
    }))
}

/// `latest_index_price {instrument}`
pub fn latest_index_price(state: &DaemonState, params: &Value) -> Result {
    latest(state, params, PriceKind::Index)
}

/// `latest_last_price {instrument}`
pub fn latest_last_price(state: &DaemonState, params: &Value) -> Result {
    latest(state, params, PriceKind::LastPrice)
}

/// `latest_mark_price {instrument}`
pub fn latest_mark_price(state: &DaemonState, params: &Value) -> Result {
    let id = instrument(state, params)?;
    let mark = state.store.latest_mark_price(id)?;
    Ok(json!({"instrument": id.0, "price": mark.to_string()}))
}

/// `windowed_index_sma {instrument, window}`
pub fn windowed_index_sma(state: &DaemonState, params: &Value, now: u64) -> Result {
    let id = instrument(state, params)?;
    let window = seconds(params, "window")?;
    let avg = state.store.windowed_index_sma(id, window, now)?;
    Ok(json!({
        "instrument": id.0,
        "average": avg.average.to_string(),
        "last_timestamp": avg.last_timestamp,
        "samples": avg.samples,
    }))
}

/// `windowed_last_price_sma {instrument, window}`
pub fn windowed_last_price_sma(state: &DaemonState, params: &Value, now: u64) -> Result {
    let id = instrument(state, params)?;
    let window = seconds(params, "window")?;
    let average = state.store.windowed_last_price_sma(id, window, now)?;
    Ok(json!({"instrument": id.0, "average": average.to_string()}))
}

/// `epoch_sma {instrument, start, end, kind}` with kind `"index"` or `"last_price"`.
pub fn epoch_sma(state: &DaemonState, params: &Value) -> Result {
    let id = instrument(state, params)?;
    let start = seconds(params, "start")?;
    let end = seconds(params, "end")?;
    let kind: PriceKind = params
        .get("kind")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .ok_or_else(|| RpcError::invalid_params("kind must be \"index\" or \"last_price\""))?;
    if start > end {
        return Err(RpcError::invalid_params("start must not be after end"));
    }

    let average = state.store.epoch_sma(id, start, end, kind)?;
    Ok(json!({
        "instrument": id.0,
        "kind": kind,
        "average": average.to_string(),
    }))
}
