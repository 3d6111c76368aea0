//! Typed JSON-RPC client for the two ledger endpoints the engine consumes
//!
//! Responses are validated against explicit schemas here, at the boundary;
//! nothing downstream ever touches raw JSON. The handle is constructed once
//! and injected into the paginator and batcher.

use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::SyncError;
use crate::retry::{RetryPolicy, with_retry};

/// One row of a getSignaturesForAddress page.
#[derive(Debug, Clone, Deserialize)]
pub struct SignatureInfo {
    pub signature: String,
    #[serde(rename = "blockTime")]
    pub block_time: Option<i64>,
}

/// getTransaction body, reduced to the fields the engine reads.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionEnvelope {
    pub meta: Option<TransactionMeta>,
    #[serde(rename = "blockTime")]
    pub block_time: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionMeta {
    pub fee: u64,
    #[serde(default)]
    pub err: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// JSON-RPC client handle for one ledger endpoint.
pub struct RpcHandle {
    client: reqwest::Client,
    url: String,
}

impl RpcHandle {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    /// One page of signature history, newest first. A missing result is an
    /// empty page (exhausted history).
    pub async fn get_signatures_page(
        &self,
        policy: &RetryPolicy,
        address: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<SignatureInfo>, SyncError> {
        let mut opts = json!({ "limit": limit });
        if let Some(cursor) = before {
            opts["before"] = json!(cursor);
        }
        let params = json!([address, opts]);

        let page = with_retry(policy, || {
            self.call::<Vec<SignatureInfo>>("getSignaturesForAddress", params.clone())
        })
        .await?;

        Ok(page.unwrap_or_default())
    }

    /// Full transaction body. `Ok(None)` means the ledger has no retrievable
    /// body for this signature; callers must treat that as unknown, not zero.
    pub async fn get_transaction(
        &self,
        policy: &RetryPolicy,
        signature: &str,
    ) -> Result<Option<TransactionEnvelope>, SyncError> {
        let params = json!([
            signature,
            { "encoding": "jsonParsed", "maxSupportedTransactionVersion": 0 }
        ]);

        with_retry(policy, || {
            self.call::<TransactionEnvelope>("getTransaction", params.clone())
        })
        .await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, SyncError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::Transport(format!("{} request failed: {}", method, e)))?;

        if response.status().as_u16() == 429 {
            return Err(SyncError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(SyncError::Transport(format!(
                "{} returned HTTP {}",
                method,
                response.status()
            )));
        }

        let parsed: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| SyncError::Transport(format!("{} parse error: {}", method, e)))?;

        if let Some(err) = parsed.error {
            return Err(SyncError::Transport(format!(
                "{} RPC error {}: {}",
                method, err.code, err.message
            )));
        }

        Ok(parsed.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_row_parses_with_and_without_block_time() {
        let row: SignatureInfo = serde_json::from_str(
            r#"{"signature":"5j7s6N","slot":301234567,"err":null,"blockTime":1741400000}"#,
        )
        .unwrap();
        assert_eq!(row.signature, "5j7s6N");
        assert_eq!(row.block_time, Some(1741400000));

        let row: SignatureInfo =
            serde_json::from_str(r#"{"signature":"abc","blockTime":null}"#).unwrap();
        assert_eq!(row.block_time, None);
    }

    #[test]
    fn transaction_envelope_exposes_fee_and_outcome() {
        let tx: TransactionEnvelope = serde_json::from_str(
            r#"{"blockTime":1741400100,"meta":{"fee":5000,"err":null,"computeUnitsConsumed":1500},"slot":301234568}"#,
        )
        .unwrap();
        let meta = tx.meta.unwrap();
        assert_eq!(meta.fee, 5000);
        assert!(meta.err.is_none());
        assert_eq!(tx.block_time, Some(1741400100));

        // Failed transactions still carry their fee
        let tx: TransactionEnvelope = serde_json::from_str(
            r#"{"blockTime":1741400200,"meta":{"fee":5000,"err":{"InstructionError":[0,"Custom"]}}}"#,
        )
        .unwrap();
        assert!(tx.meta.unwrap().err.is_some());
    }

    #[test]
    fn rpc_error_object_is_detected() {
        let resp: RpcResponse<Vec<SignatureInfo>> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"Invalid param"}}"#,
        )
        .unwrap();
        assert!(resp.result.is_none());
        let err = resp.error.unwrap();
        assert_eq!(err.code, -32602);
        assert_eq!(err.message, "Invalid param");
    }

    #[test]
    fn null_result_maps_to_none() {
        let resp: RpcResponse<TransactionEnvelope> =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        assert!(resp.result.is_none());
        assert!(resp.error.is_none());
    }
}
