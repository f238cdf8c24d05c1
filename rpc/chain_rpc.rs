// ============================================================================
// Chain RPC - Plasma node JSON-RPC communication
// ============================================================================
//
// Thin client for the node's chain API. Every call is a POST with a JSON
// body, matching what the reference JS client sends.
//
// Node Endpoints:
//   POST /v1/chain/get_info          - Chain id and head block
//   POST /v1/chain/get_block         - Reference block for TaPoS
//   POST /v1/chain/abi_json_to_bin   - Serialize action data with the contract ABI
//   POST /v1/chain/push_transaction  - Broadcast a signed packed transaction
//
// ============================================================================

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::packed_transaction::transaction_id;
use crate::ledger_client::{LedgerError, TransactResult};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Default node endpoint
pub const DEFAULT_HTTP_ENDPOINT: &str = "http://127.0.0.1:8888";

/// Default timeout for node calls (seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Head block reported in mock mode
pub const MOCK_HEAD_BLOCK_NUM: u32 = 12345;

// ============================================================================
// REQUEST/RESPONSE TYPES
// ============================================================================

/// get_info response (fields we use; the node sends more)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetInfoResponse {
    #[serde(default)]
    pub server_version: String,
    pub chain_id: String,
    pub head_block_num: u32,
    #[serde(default)]
    pub last_irreversible_block_num: u32,
    #[serde(default)]
    pub head_block_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetBlockRequest {
    pub block_num_or_id: u32,
}

/// get_block response (header fields needed for TaPoS)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetBlockResponse {
    pub timestamp: String,
    pub block_num: u32,
    pub ref_block_prefix: u32,
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbiJsonToBinRequest {
    pub code: String,
    pub action: String,
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbiJsonToBinResponse {
    pub binargs: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushTransactionRequest {
    pub signatures: Vec<String>,
    pub compression: u8,
    pub packed_context_free_data: String,
    pub packed_trx: String,
}

/// Error body returned by the node on a failed call
#[derive(Debug, Clone, Default, Deserialize)]
struct NodeErrorBody {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
    #[serde(default)]
    error: NodeErrorDetail,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct NodeErrorDetail {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    what: String,
    #[serde(default)]
    details: Vec<NodeErrorMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct NodeErrorMessage {
    #[serde(default)]
    message: String,
}

/// Map a failed response to a `LedgerError`, preferring the most specific message
fn node_error(status: u16, body: &str) -> LedgerError {
    match serde_json::from_str::<NodeErrorBody>(body) {
        Ok(parsed) => {
            let detail = parsed
                .error
                .details
                .iter()
                .map(|d| d.message.as_str())
                .find(|m| !m.is_empty());

            let message = detail
                .or(Some(parsed.error.what.as_str()).filter(|w| !w.is_empty()))
                .unwrap_or(parsed.message.as_str())
                .to_string();

            LedgerError::Rpc {
                code: if parsed.error.code != 0 { parsed.error.code } else { parsed.code as i64 },
                name: parsed.error.name,
                message,
            }
        }
        Err(_) => LedgerError::Transport(format!("node returned status {}: {}", status, body)),
    }
}

// ============================================================================
// CHAIN RPC CONFIG
// ============================================================================

/// Configuration for the node connection
#[derive(Debug, Clone)]
pub struct ChainRpcConfig {
    /// Node endpoint URL
    pub endpoint: String,

    /// Request timeout
    pub timeout: Duration,

    /// Whether to use mock mode (no real node)
    pub mock_mode: bool,
}

impl Default for ChainRpcConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_HTTP_ENDPOINT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            mock_mode: false,
        }
    }
}

impl ChainRpcConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Create mock mode config (for dry runs and tests)
    pub fn mock() -> Self {
        Self {
            mock_mode: true,
            ..Default::default()
        }
    }
}

// ============================================================================
// CHAIN RPC CLIENT
// ============================================================================

/// JSON-RPC client for a Plasma node
#[derive(Debug, Clone)]
pub struct ChainRpc {
    config: ChainRpcConfig,
    client: Client,
}

impl ChainRpc {
    pub fn new(config: ChainRpcConfig) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LedgerError::Transport(format!("Failed to create client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Create in mock mode
    pub fn mock() -> Self {
        Self {
            config: ChainRpcConfig::mock(),
            client: Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    pub fn is_mock(&self) -> bool {
        self.config.mock_mode
    }

    /// Log connection status (call on startup)
    pub fn log_status(&self) {
        if self.is_mock() {
            warn!("chain RPC in mock mode, transactions are signed but never broadcast");
        } else {
            info!(endpoint = %self.endpoint(), "chain RPC configured");
        }
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, LedgerError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/v1/chain/{}", self.config.endpoint.trim_end_matches('/'), path);
        debug!(%url, "node request");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(node_error(status.as_u16(), &text));
        }

        serde_json::from_str(&text)
            .map_err(|e| LedgerError::InvalidResponse(format!("{}: {}", path, e)))
    }

    // ========================================================================
    // CHAIN STATE
    // ========================================================================

    /// POST /v1/chain/get_info
    pub async fn get_info(&self) -> Result<GetInfoResponse, LedgerError> {
        if self.config.mock_mode {
            return Ok(GetInfoResponse {
                server_version: "mock".to_string(),
                chain_id: "0".repeat(64),
                head_block_num: MOCK_HEAD_BLOCK_NUM,
                last_irreversible_block_num: MOCK_HEAD_BLOCK_NUM,
                head_block_time: mock_block_time(),
            });
        }

        self.post("get_info", &serde_json::json!({})).await
    }

    /// POST /v1/chain/get_block
    pub async fn get_block(&self, block_num: u32) -> Result<GetBlockResponse, LedgerError> {
        if self.config.mock_mode {
            return Ok(GetBlockResponse {
                timestamp: mock_block_time(),
                block_num,
                ref_block_prefix: 0,
                id: format!("{:08x}{}", block_num, "0".repeat(56)),
            });
        }

        self.post("get_block", &GetBlockRequest { block_num_or_id: block_num }).await
    }

    // ========================================================================
    // TRANSACTIONS
    // ========================================================================

    /// POST /v1/chain/abi_json_to_bin
    ///
    /// In mock mode the JSON itself is returned as the binary payload.
    pub async fn abi_json_to_bin(
        &self,
        code: &str,
        action: &str,
        args: &serde_json::Value,
    ) -> Result<Vec<u8>, LedgerError> {
        let binargs = if self.config.mock_mode {
            let bytes = serde_json::to_vec(args)
                .map_err(|e| LedgerError::Serialization(e.to_string()))?;
            hex::encode(bytes)
        } else {
            let request = AbiJsonToBinRequest {
                code: code.to_string(),
                action: action.to_string(),
                args: args.clone(),
            };
            let response: AbiJsonToBinResponse = self.post("abi_json_to_bin", &request).await?;
            response.binargs
        };

        hex::decode(&binargs)
            .map_err(|e| LedgerError::InvalidResponse(format!("binargs is not hex: {}", e)))
    }

    /// POST /v1/chain/push_transaction
    pub async fn push_transaction(
        &self,
        signatures: Vec<String>,
        packed_trx: &[u8],
    ) -> Result<TransactResult, LedgerError> {
        if self.config.mock_mode {
            return Ok(TransactResult {
                transaction_id: transaction_id(packed_trx),
                processed: serde_json::Value::Null,
            });
        }

        let request = PushTransactionRequest {
            signatures,
            compression: 0,
            packed_context_free_data: String::new(),
            packed_trx: hex::encode(packed_trx),
        };

        self.post("push_transaction", &request).await
    }
}

fn mock_block_time() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

// ============================================================================
// TESTS
// ============================================================================
