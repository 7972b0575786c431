//! JSON-RPC command handlers.
//!
//! - [`prices`]: pushes and price queries
//! - [`admin`]: interval setters, funding state, listing and status
//!
//! Parameter helpers shared by both live here. Prices travel as decimal
//! strings; instruments are addressed by index or by external id.

pub mod admin;
pub mod prices;

use perp_math::{I256, U256};
use perp_oracle::CallerId;
use perp_types::InstrumentId;
use serde_json::Value;

use crate::rpc::RpcError;
use crate::DaemonState;

/// Handler result.
pub type Result = std::result::Result<Value, RpcError>;

/// The mandatory `caller` parameter.
pub(crate) fn caller(params: &Value) -> std::result::Result<CallerId, RpcError> {
    params
        .get("caller")
        .and_then(Value::as_str)
        .map(CallerId::from)
        .ok_or_else(|| RpcError::invalid_params("caller required"))
}

/// The `instrument` parameter: an index (`0`) or an external id (`"BTC-PERP"`).
pub(crate) fn instrument(
    state: &DaemonState,
    params: &Value,
) -> std::result::Result<InstrumentId, RpcError> {
    let value = params
        .get("instrument")
        .ok_or_else(|| RpcError::invalid_params("instrument required"))?;

    let id = match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .map(InstrumentId)
            .ok_or_else(|| RpcError::invalid_params("instrument index out of range"))?,
        Value::String(s) => state
            .store
            .instrument_id(s)
            .ok_or_else(|| RpcError::unknown_instrument(s))?,
        _ => return Err(RpcError::invalid_params("instrument must be an index or an id")),
    };

    if id.index() >= state.store.instrument_count() {
        return Err(RpcError::unknown_instrument(&id.to_string()));
    }
    Ok(id)
}

/// A non-negative decimal integer, given as a string or a JSON integer.
pub(crate) fn price(params: &Value, key: &str) -> std::result::Result<U256, RpcError> {
    match params.get(key) {
        Some(Value::String(s)) => U256::from_str_radix(s.trim(), 10)
            .map_err(|_| RpcError::invalid_params(&format!("{key} must be a decimal integer"))),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| RpcError::invalid_params(&format!("{key} must be non-negative"))),
        _ => Err(RpcError::invalid_params(&format!("{key} required"))),
    }
}

/// A signed decimal integer, given as a string or a JSON integer.
pub(crate) fn signed(params: &Value, key: &str) -> std::result::Result<I256, RpcError> {
    match params.get(key) {
        Some(Value::String(s)) => I256::from_str_radix(s.trim(), 10)
            .map_err(|_| RpcError::invalid_params(&format!("{key} must be a decimal integer"))),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(I256::from)
            .ok_or_else(|| RpcError::invalid_params(&format!("{key} must be an integer"))),
        _ => Err(RpcError::invalid_params(&format!("{key} required"))),
    }
}

/// A mandatory `u64` parameter.
pub(crate) fn seconds(params: &Value, key: &str) -> std::result::Result<u64, RpcError> {
    params
        .get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))
}
