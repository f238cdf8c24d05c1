/// Plasma Oracles - Ledger Client
///
/// The single seam between the oracles and the chain. Callers hand over one
/// action with its authorization and validity window; the client packs,
/// signs and broadcasts it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::keys::{KeyError, SigningKey};
use crate::rpc::{
    block_time_to_secs, encode_name, ChainRpc, PackError, PackedAction, PackedPermission,
    Transaction,
};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Permission used for every oracle authorization
pub const ACTIVE_PERMISSION: &str = "active";

/// Reference block distance from head
pub const DEFAULT_BLOCKS_BEHIND: u32 = 3;

/// Seconds past the reference block before the transaction expires
pub const DEFAULT_EXPIRE_SECONDS: u32 = 30;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Request never produced a node answer (connect, timeout, non-JSON failure)
    #[error("Node request failed: {0}")]
    Transport(String),
    /// Node rejected the call
    #[error("Node rejected request ({code} {name}): {message}")]
    Rpc { code: i64, name: String, message: String },
    /// Node answered with something we could not parse
    #[error("Invalid node response: {0}")]
    InvalidResponse(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Signing error: {0}")]
    Signing(String),
}

impl From<PackError> for LedgerError {
    fn from(err: PackError) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<KeyError> for LedgerError {
    fn from(err: KeyError) -> Self {
        LedgerError::Signing(err.to_string())
    }
}

// ============================================================================
// ACTION TYPES
// ============================================================================

/// Who authorizes an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionLevel {
    pub actor: String,
    pub permission: String,
}

impl PermissionLevel {
    pub fn active(actor: impl Into<String>) -> Self {
        PermissionLevel {
            actor: actor.into(),
            permission: ACTIVE_PERMISSION.to_string(),
        }
    }
}

/// A contract call; `data` is the JSON form of the action payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub account: String,
    pub name: String,
    pub data: serde_json::Value,
}

/// Transaction validity window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactOptions {
    pub blocks_behind: u32,
    pub expire_seconds: u32,
}

impl Default for TransactOptions {
    fn default() -> Self {
        TransactOptions {
            blocks_behind: DEFAULT_BLOCKS_BEHIND,
            expire_seconds: DEFAULT_EXPIRE_SECONDS,
        }
    }
}

/// Receipt returned by the node after a successful broadcast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactResult {
    pub transaction_id: String,
    #[serde(default)]
    pub processed: serde_json::Value,
}

// ============================================================================
// LEDGER CLIENT TRAIT
// ============================================================================

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Build, sign and broadcast one transaction carrying `action`
    async fn submit(
        &self,
        action: Action,
        authorization: Vec<PermissionLevel>,
        options: TransactOptions,
    ) -> Result<TransactResult, LedgerError>;
}

// ============================================================================
// HTTP LEDGER CLIENT
// ============================================================================

/// Ledger client backed by a node's chain API and a local signing key
#[derive(Debug, Clone)]
pub struct HttpLedgerClient {
    rpc: ChainRpc,
    signing_key: SigningKey,
}

impl HttpLedgerClient {
    pub fn new(rpc: ChainRpc, signing_key: SigningKey) -> Self {
        HttpLedgerClient { rpc, signing_key }
    }

    /// Log endpoint and signing key (call on startup)
    pub fn log_status(&self) {
        self.rpc.log_status();
        info!(public_key = %self.signing_key.public_key_string(), "signing key loaded");
    }

    /// Resolve the reference block and pack the transaction, returning it
    /// together with the chain id it must be signed for.
    pub async fn build_transaction(
        &self,
        action: &Action,
        authorization: &[PermissionLevel],
        options: TransactOptions,
    ) -> Result<(Transaction, Vec<u8>), LedgerError> {
        // Names first so a bad config fails before any network call
        let account = encode_name(&action.account)?;
        let name = encode_name(&action.name)?;
        let authorization = authorization
            .iter()
            .map(|level| {
                Ok(PackedPermission {
                    actor: encode_name(&level.actor)?,
                    permission: encode_name(&level.permission)?,
                })
            })
            .collect::<Result<Vec<_>, PackError>>()?;

        let info = self.rpc.get_info().await?;
        let chain_id = hex::decode(&info.chain_id)
            .map_err(|e| LedgerError::InvalidResponse(format!("chain_id is not hex: {}", e)))?;

        let ref_block_num = info.head_block_num.saturating_sub(options.blocks_behind).max(1);
        let block = self.rpc.get_block(ref_block_num).await?;

        let expiration = block_time_to_secs(&block.timestamp)?
            .checked_add(options.expire_seconds)
            .ok_or_else(|| LedgerError::Serialization("expiration overflows u32".to_string()))?;

        let data = self
            .rpc
            .abi_json_to_bin(&action.account, &action.name, &action.data)
            .await?;

        debug!(
            ref_block_num = block.block_num,
            expiration,
            data_len = data.len(),
            "transaction packed"
        );

        let packed_action = PackedAction {
            account,
            name,
            authorization,
            data,
        };

        let transaction = Transaction::new(
            expiration,
            block.block_num,
            block.ref_block_prefix,
            vec![packed_action],
        );

        Ok((transaction, chain_id))
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn submit(
        &self,
        action: Action,
        authorization: Vec<PermissionLevel>,
        options: TransactOptions,
    ) -> Result<TransactResult, LedgerError> {
        let (transaction, chain_id) = self
            .build_transaction(&action, &authorization, options)
            .await?;

        let digest = transaction.signing_digest(&chain_id);
        let signature = self.signing_key.sign_digest(&digest)?;

        let result = self
            .rpc
            .push_transaction(vec![signature], &transaction.pack())
            .await;

        match &result {
            Ok(receipt) => info!(
                transaction_id = %receipt.transaction_id,
                contract = %action.account,
                action = %action.name,
                "transaction broadcast"
            ),
            Err(e) => warn!(error = %e, action = %action.name, "transaction broadcast failed"),
        }

        result
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::recover_public_key;

    fn sample_action() -> Action {
        Action {
            account: "currencies".to_string(),
            name: "updaterates".to_string(),
            data: serde_json::json!({"user": "oracle", "data": [], "type": "fiat", "memo": 1}),
        }
    }

    #[test]
    fn test_default_options() {
        let options = TransactOptions::default();
        assert_eq!(options.blocks_behind, 3);
        assert_eq!(options.expire_seconds, 30);
    }

    #[test]
    fn test_active_permission() {
        let level = PermissionLevel::active("oracle");
        assert_eq!(level.actor, "oracle");
        assert_eq!(level.permission, "active");
    }

    #[tokio::test]
    async fn test_mock_build_transaction() {
        let client = HttpLedgerClient::new(ChainRpc::mock(), SigningKey::generate());
        let (tx, chain_id) = client
            .build_transaction(
                &sample_action(),
                &[PermissionLevel::active("oracle")],
                TransactOptions::default(),
            )
            .await
            .expect("Should build");

        assert_eq!(chain_id, vec![0u8; 32]);
        assert_eq!(tx.ref_block_num as u32, crate::rpc::MOCK_HEAD_BLOCK_NUM - 3);
        assert_eq!(tx.actions.len(), 1);
        assert_eq!(tx.actions[0].account, encode_name("currencies").unwrap());
        assert_eq!(tx.actions[0].authorization[0].actor, encode_name("oracle").unwrap());

        let now = chrono::Utc::now().timestamp() as u64;
        assert!(!tx.is_expired(now));
        assert!(tx.is_expired(now + 60));

        // Signature over the digest recovers to the configured key
        let digest = tx.signing_digest(&chain_id);
        let signature = client.signing_key.sign_digest(&digest).unwrap();
        assert_eq!(
            recover_public_key(&signature, &digest).unwrap(),
            client.signing_key.public_key_string()
        );
    }

    #[tokio::test]
    async fn test_mock_submit_returns_receipt() {
        let client = HttpLedgerClient::new(ChainRpc::mock(), SigningKey::generate());
        let receipt = client
            .submit(
                sample_action(),
                vec![PermissionLevel::active("oracle")],
                TransactOptions::default(),
            )
            .await
            .expect("Should submit");

        assert_eq!(receipt.transaction_id.len(), 64);
        assert!(hex::decode(&receipt.transaction_id).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_account_name_is_serialization_error() {
        let client = HttpLedgerClient::new(ChainRpc::mock(), SigningKey::generate());
        let mut action = sample_action();
        action.account = "Currencies".to_string();

        let result = client
            .submit(action, vec![PermissionLevel::active("oracle")], TransactOptions::default())
            .await;
        assert!(matches!(result, Err(LedgerError::Serialization(_))));
    }

    #[test]
    fn test_error_conversions() {
        let err: LedgerError = KeyError::InvalidChecksum.into();
        assert_eq!(err, LedgerError::Signing("Checksum mismatch".to_string()));

        let err: LedgerError = PackError::Truncated(3).into();
        assert!(matches!(err, LedgerError::Serialization(_)));
    }
}
