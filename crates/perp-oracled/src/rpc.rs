//! JSON-RPC 2.0 server over a Unix socket.
//!
//! One request per line, one response per line. Requests on a connection are
//! handled in order; connections are served concurrently.

use std::path::PathBuf;
use std::sync::Arc;

use perp_oracle::OracleError;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tracing::{debug, error, info, warn};

use crate::clock::unix_now;
use crate::commands::{self, admin, prices};
use crate::DaemonState;

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Method name.
    pub method: String,
    /// Parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    /// JSON-RPC version.
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RpcError {
    pub code: i32,
    /// Stable upper-case error name.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    /// Create a success response.
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    fn new(code: i32, message: &str, data: Option<serde_json::Value>) -> Self {
        Self {
            code,
            message: message.to_string(),
            data,
        }
    }

    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self::new(-32700, "PARSE_ERROR", None)
    }

    /// Invalid request (-32600).
    pub fn invalid_request() -> Self {
        Self::new(-32600, "INVALID_REQUEST", None)
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            -32601,
            "METHOD_NOT_FOUND",
            Some(serde_json::json!({"method": method})),
        )
    }

    /// Invalid params (-32602).
    pub fn invalid_params(detail: &str) -> Self {
        Self::new(
            -32602,
            "INVALID_PARAMS",
            Some(serde_json::json!({"detail": detail})),
        )
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self::new(
            -32603,
            "INTERNAL_ERROR",
            Some(serde_json::json!({"detail": detail})),
        )
    }

    /// Unknown instrument (-32004).
    pub fn unknown_instrument(instrument: &str) -> Self {
        Self::new(
            -32004,
            "UNKNOWN_INSTRUMENT",
            Some(serde_json::json!({"instrument": instrument})),
        )
    }
}

impl From<OracleError> for RpcError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::Unauthorized { caller, role } => Self::new(
                -32001,
                "UNAUTHORIZED",
                Some(serde_json::json!({"caller": caller, "role": role})),
            ),
            OracleError::ZeroPrice => Self::new(-32002, "ZERO_PRICE", None),
            OracleError::NoObservations { instrument, kind } => Self::new(
                -32003,
                "NO_OBSERVATIONS",
                Some(serde_json::json!({"instrument": instrument.0, "kind": kind})),
            ),
            OracleError::UnknownInstrument(instrument) => Self::unknown_instrument(&instrument),
            OracleError::InvalidConfig(detail) => Self::new(
                -32005,
                "INVALID_CONFIG",
                Some(serde_json::json!({"detail": detail})),
            ),
            OracleError::Math(math) => Self::new(
                -32006,
                "MATH_ERROR",
                Some(serde_json::json!({"detail": math.to_string()})),
            ),
            OracleError::LockPoisoned => Self::internal_error("instrument state lock poisoned"),
        }
    }
}

/// The RPC server.
pub struct RpcServer {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
}

impl RpcServer {
    /// Create a new RPC server.
    pub fn new(state: Arc<DaemonState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Run the server, accepting connections until the task is dropped.
    pub async fn run(&self) -> anyhow::Result<()> {
        // Stale socket from a previous run.
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        info!(path = ?self.socket_path, "JSON-RPC server listening");

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(state, stream).await {
                            warn!("connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("accept error: {}", e);
                }
            }
        }
    }
}

/// Serve one client connection until EOF.
async fn handle_connection(
    state: Arc<DaemonState>,
    stream: tokio::net::UnixStream,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let response = handle_line(&state, &line);

        let mut response_json = serde_json::to_string(&response)?;
        response_json.push('\n');
        writer.write_all(response_json.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Parse and dispatch one request line.
pub fn handle_line(state: &DaemonState, line: &str) -> RpcResponse {
    match serde_json::from_str::<RpcRequest>(line) {
        Ok(request) => dispatch_request(state, request, unix_now()),
        Err(_) => RpcResponse::error(serde_json::Value::Null, RpcError::parse_error()),
    }
}

/// Dispatch a request to its handler. `now` is the timestamp given to pushes
/// and trailing-window queries.
pub fn dispatch_request(state: &DaemonState, request: RpcRequest, now: u64) -> RpcResponse {
    let id = request.id.clone();
    if request.jsonrpc != "2.0" {
        return RpcResponse::error(id, RpcError::invalid_request());
    }

    let method = request.method.as_str();
    let params = &request.params;
    debug!(method, "dispatching RPC method");

    let result: commands::Result = match method {
        // Pushes
        "push_index_price" => prices::push_index_price(state, params, now),
        "push_last_price" => prices::push_last_price(state, params, now),

        // Queries
        "latest_index_price" => prices::latest_index_price(state, params),
        "latest_mark_price" => prices::latest_mark_price(state, params),
        "latest_last_price" => prices::latest_last_price(state, params),
        "windowed_index_sma" => prices::windowed_index_sma(state, params, now),
        "windowed_last_price_sma" => prices::windowed_last_price_sma(state, params, now),
        "epoch_sma" => prices::epoch_sma(state, params),

        // Administration
        "set_funding_state" => admin::set_funding_state(state, params),
        "get_funding_state" => admin::get_funding_state(state, params),
        "set_sampling_interval" => admin::set_sampling_interval(state, params),
        "set_mark_sampling_interval" => admin::set_mark_sampling_interval(state, params),
        "set_funding_period" => admin::set_funding_period(state, params),
        "list_instruments" => admin::list_instruments(state),
        "get_status" => admin::get_status(state, now),

        _ => Err(RpcError::method_not_found(method)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => {
            debug!(method, code = err.code, "RPC method failed");
            RpcResponse::error(id, err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AccessConfig, DaemonConfig, InstrumentConfig};
    use perp_math::MathError;
    use perp_oracle::{CallerId, Role};
    use perp_types::{InstrumentId, PriceKind};
    use serde_json::{json, Value};

    const T0: u64 = 1_700_000_000;

    fn state() -> DaemonState {
        let config = DaemonConfig {
            access: AccessConfig {
                price_pushers: vec!["keeper".to_string()],
                configurators: vec!["admin".to_string()],
            },
            instruments: vec![
                InstrumentConfig {
                    external_id: "BTC-PERP".to_string(),
                    initial_index_price: "100".to_string(),
                    initial_last_price: "100".to_string(),
                },
                InstrumentConfig {
                    external_id: "ETH-PERP".to_string(),
                    initial_index_price: "50".to_string(),
                    initial_last_price: "50".to_string(),
                },
            ],
            ..DaemonConfig::default()
        };
        DaemonState::from_config(config, T0).expect("state")
    }

    fn call(state: &DaemonState, method: &str, params: Value, now: u64) -> RpcResponse {
        let request = RpcRequest {
            jsonrpc: "2.0".to_string(),
            id: json!(1),
            method: method.to_string(),
            params,
        };
        dispatch_request(state, request, now)
    }

    fn ok(response: RpcResponse) -> Value {
        assert!(response.error.is_none(), "unexpected error: {:?}", response.error);
        response.result.expect("result")
    }

    fn err(response: RpcResponse) -> RpcError {
        response.error.expect("error")
    }

    #[test]
    fn test_rpc_error_codes() {
        let cases = [
            (
                OracleError::Unauthorized {
                    caller: CallerId::from("x"),
                    role: Role::PricePusher,
                },
                -32001,
            ),
            (OracleError::ZeroPrice, -32002),
            (
                OracleError::NoObservations {
                    instrument: InstrumentId(0),
                    kind: PriceKind::Index,
                },
                -32003,
            ),
            (OracleError::UnknownInstrument("#9".to_string()), -32004),
            (OracleError::InvalidConfig("x".to_string()), -32005),
            (OracleError::Math(MathError::DivisionByZero), -32006),
            (OracleError::LockPoisoned, -32603),
        ];
        for (oracle, code) in cases {
            assert_eq!(RpcError::from(oracle).code, code);
        }
        assert_eq!(RpcError::method_not_found("nope").code, -32601);
    }

    #[test]
    fn test_rpc_response_shapes() {
        let resp = RpcResponse::success(json!(1), json!({"price": "1"}));
        assert!(resp.result.is_some());
        assert!(resp.error.is_none());

        let resp = RpcResponse::error(json!(1), RpcError::internal_error("test"));
        assert!(resp.result.is_none());
        let encoded = serde_json::to_string(&resp).expect("serialize");
        assert!(!encoded.contains("\"result\""));
    }

    #[test]
    fn test_push_and_query_by_external_id() {
        let s = state();
        let result = ok(call(
            &s,
            "push_index_price",
            json!({"caller": "keeper", "instrument": "BTC-PERP", "price": "110"}),
            T0 + 1000,
        ));
        assert_eq!(result["mark_price"], "100");
        assert_eq!(result["projected_index"], "110");
        assert_eq!(result["applied"], true);
        assert_eq!(result["provenance"], "0".repeat(64));

        let provenance = format!("0x{}", "ab".repeat(32));
        let result = ok(call(
            &s,
            "push_index_price",
            json!({"caller": "keeper", "instrument": 0, "price": "110", "provenance": provenance}),
            T0 + 1001,
        ));
        assert_eq!(result["provenance"], "ab".repeat(32));

        let latest = ok(call(&s, "latest_index_price", json!({"instrument": 0}), T0 + 1001));
        assert_eq!(latest["price"], "110");
        assert_eq!(latest["timestamp"], T0 + 1001);

        let mark = ok(call(&s, "latest_mark_price", json!({"instrument": "BTC-PERP"}), T0));
        assert_eq!(mark["price"], "100");
    }

    #[test]
    fn test_unauthorized_push() {
        let s = state();
        let e = err(call(
            &s,
            "push_last_price",
            json!({"caller": "admin", "instrument": 0, "price": "1"}),
            T0 + 1,
        ));
        assert_eq!(e.code, -32001);
        assert_eq!(e.message, "UNAUTHORIZED");
    }

    #[test]
    fn test_zero_price_rejected() {
        let s = state();
        let e = err(call(
            &s,
            "push_index_price",
            json!({"caller": "keeper", "instrument": 1, "price": "0"}),
            T0 + 1,
        ));
        assert_eq!(e.code, -32002);
    }

    #[test]
    fn test_unknown_instrument() {
        let s = state();
        assert_eq!(
            err(call(&s, "latest_index_price", json!({"instrument": 7}), T0)).code,
            -32004
        );
        assert_eq!(
            err(call(&s, "latest_index_price", json!({"instrument": "SOL-PERP"}), T0)).code,
            -32004
        );
    }

    #[test]
    fn test_funding_state_moves_projection() {
        let s = state();
        let e = err(call(
            &s,
            "set_funding_state",
            json!({"caller": "keeper", "instrument": 0, "last_funding_rate": "1", "next_funding_interval": 1}),
            T0,
        ));
        assert_eq!(e.code, -32001);

        ok(call(
            &s,
            "set_funding_state",
            json!({
                "caller": "admin",
                "instrument": 0,
                "last_funding_rate": "10000000000000000",
                "next_funding_interval": 28800,
            }),
            T0,
        ));
        let result = ok(call(
            &s,
            "push_index_price",
            json!({"caller": "keeper", "instrument": 0, "price": "1000"}),
            T0 + 10,
        ));
        assert_eq!(result["projected_index"], "1010");
    }

    #[test]
    fn test_setters_and_status() {
        let s = state();
        let intervals = ok(call(
            &s,
            "set_mark_sampling_interval",
            json!({"caller": "admin", "value": 60}),
            T0,
        ));
        assert_eq!(intervals["mark_sampling_interval"], 60);

        let e = err(call(
            &s,
            "set_funding_period",
            json!({"caller": "admin", "value": 0}),
            T0,
        ));
        assert_eq!(e.code, -32005);

        let status = ok(call(&s, "get_status", json!({}), T0 + 30));
        assert_eq!(status["instruments"], 2);
        assert_eq!(status["uptime_secs"], 30);
    }

    #[test]
    fn test_list_instruments() {
        let s = state();
        let list = ok(call(&s, "list_instruments", Value::Null, T0));
        let entries = list.as_array().expect("array");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1]["external_id"], "ETH-PERP");
        assert_eq!(entries[1]["mark_price"], "50");
        assert_eq!(entries[0]["index_observations"], 1);
    }

    #[test]
    fn test_epoch_sma_kind_param() {
        let s = state();
        let result = ok(call(
            &s,
            "epoch_sma",
            json!({"instrument": 0, "start": T0, "end": T0, "kind": "last_price"}),
            T0,
        ));
        assert_eq!(result["average"], "100");

        let e = err(call(
            &s,
            "epoch_sma",
            json!({"instrument": 0, "start": T0, "end": T0, "kind": "funding"}),
            T0,
        ));
        assert_eq!(e.code, -32602);
    }

    #[test]
    fn test_bad_requests() {
        let s = state();
        assert_eq!(err(handle_line(&s, "not json")).code, -32700);
        assert_eq!(err(call(&s, "nope", json!({}), T0)).code, -32601);

        let request = RpcRequest {
            jsonrpc: "1.0".to_string(),
            id: json!(5),
            method: "get_status".to_string(),
            params: Value::Null,
        };
        assert_eq!(err(dispatch_request(&s, request, T0)).code, -32600);
    }
}
