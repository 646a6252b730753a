//! JSON-RPC 2.0 dispatch for the `pob_` namespace
//!
//! Transport is left to the embedding node; requests arrive already framed.

use crate::api::PobApi;
use crate::errors::ConsensusError;
use pob_state::{Address, Hash};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const ENGINE_ERROR: i32 = -32000;
pub const PARSE_ERROR: i32 = -32700;

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: message.into(),
        }
    }
}

impl From<ConsensusError> for RpcError {
    fn from(e: ConsensusError) -> Self {
        Self {
            code: ENGINE_ERROR,
            message: e.to_string(),
        }
    }
}

pub struct RpcHandler {
    api: PobApi,
}

impl RpcHandler {
    pub fn new(api: PobApi) -> Self {
        Self { api }
    }

    /// Parse and dispatch a raw request body
    pub fn handle_raw(&self, body: &str) -> RpcResponse {
        match serde_json::from_str::<RpcRequest>(body) {
            Ok(request) => self.handle(request),
            Err(e) => respond(
                Value::Null,
                Err(RpcError {
                    code: PARSE_ERROR,
                    message: format!("Parse error: {}", e),
                }),
            ),
        }
    }

    pub fn handle(&self, request: RpcRequest) -> RpcResponse {
        let params = request.params.unwrap_or(Value::Null);
        let result = match request.method.as_str() {
            // Snapshot queries
            "pob_getSnapshot" => block_number(&params)
                .and_then(|number| Ok(json!(self.api.get_snapshot(number)?))),
            "pob_getSnapshotAtHash" => field::<Hash>(&params, "hash")
                .and_then(|hash| Ok(json!(self.api.get_snapshot_at_hash(&hash)?))),
            "pob_getBehaviorScores" => block_number(&params)
                .and_then(|number| Ok(json!(self.api.get_behavior_scores(number)?))),
            "pob_getBehaviorScoresAtHash" => field::<Hash>(&params, "hash")
                .and_then(|hash| Ok(json!(self.api.get_behavior_scores_at_hash(&hash)?))),
            "pob_getValidators" => block_number(&params)
                .and_then(|number| Ok(json!(self.api.get_validators(number)?))),
            "pob_getValidatorsAtHash" => field::<Hash>(&params, "hash")
                .and_then(|hash| Ok(json!(self.api.get_validators_at_hash(&hash)?))),

            // Proposals
            "pob_proposals" => Ok(json!(self.api.proposals())),
            "pob_propose" => field::<Address>(&params, "address").and_then(|address| {
                let authorize = field::<bool>(&params, "authorize")?;
                self.api.propose(address, authorize);
                Ok(Value::Null)
            }),
            "pob_discard" => field::<Address>(&params, "address").map(|address| {
                self.api.discard(&address);
                Value::Null
            }),

            "pob_status" => self.api.status().map(|status| json!(status)).map_err(RpcError::from),

            _ => Err(RpcError {
                code: METHOD_NOT_FOUND,
                message: "Method not found".to_string(),
            }),
        };

        if let Err(error) = &result {
            debug!("RPC {} failed: {} ({})", request.method, error.message, error.code);
        }
        respond(request.id, result)
    }
}

fn respond(id: Value, result: Result<Value, RpcError>) -> RpcResponse {
    match result {
        Ok(result) => RpcResponse {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        },
        Err(error) => RpcResponse {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id,
        },
    }
}

/// Required named parameter
fn field<T: DeserializeOwned>(params: &Value, name: &str) -> Result<T, RpcError> {
    let value = params
        .get(name)
        .ok_or_else(|| RpcError::invalid_params(format!("Missing {} parameter", name)))?;
    serde_json::from_value(value.clone())
        .map_err(|e| RpcError::invalid_params(format!("Invalid {} parameter: {}", name, e)))
}

/// Optional `number`: absent, null or "latest" selects the head; accepts
/// plain integers and 0x-prefixed hex strings
fn block_number(params: &Value) -> Result<Option<u64>, RpcError> {
    match params.get("number") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| RpcError::invalid_params("Invalid number parameter")),
        Some(Value::String(s)) if s == "latest" => Ok(None),
        Some(Value::String(s)) => {
            let digits = s.strip_prefix("0x").unwrap_or(s);
            u64::from_str_radix(digits, 16)
                .map(Some)
                .map_err(|_| RpcError::invalid_params(format!("Invalid number parameter: {}", s)))
        }
        Some(_) => Err(RpcError::invalid_params("Invalid number parameter")),
    }
}
