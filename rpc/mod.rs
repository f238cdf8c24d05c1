// ============================================================================
// RPC Module - Node Communication & Packed Transactions
// ============================================================================
//
// This module handles all communication with the Plasma node, including
// transaction packing, signing digests, and broadcast.
//
// Components:
//   - packed_transaction: binary transaction layout and account names
//   - chain_rpc: node JSON-RPC client with mock mode
//
// ============================================================================

pub mod chain_rpc;
pub mod packed_transaction;

pub use chain_rpc::*;
pub use packed_transaction::*;
