/// Plasma Oracles
/// Exports all modules for use as a library crate

pub mod config;
pub mod currencies;
pub mod keys;
pub mod ledger_client;

#[path = "../rpc/mod.rs"]
pub mod rpc;

pub use config::{ConfigError, NetworkConfig};
pub use currencies::{
    build_rate_records, pair_string, parse_rates, CurrenciesSubmitter, RateObservation,
    RateRecord, UpdateRatesData, UPDATE_RATES_ACTION,
};
pub use keys::{KeyError, SigningKey};
pub use ledger_client::{
    Action, HttpLedgerClient, LedgerClient, LedgerError, PermissionLevel, TransactOptions,
    TransactResult,
};
pub use rpc::{ChainRpc, ChainRpcConfig, PackError, Transaction};
