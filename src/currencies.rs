/// Plasma Oracles - Currency Rates Submitter
///
/// Reshapes rate observations into the currencies contract's `updaterates`
/// payload and hands the resulting action to a `LedgerClient`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::NetworkConfig;
use crate::ledger_client::{
    Action, LedgerClient, LedgerError, PermissionLevel, TransactOptions, TransactResult,
};

/// Action name on the currencies contract
pub const UPDATE_RATES_ACTION: &str = "updaterates";

// ============================================================================
// CORE TYPES
// ============================================================================

/// One observed exchange rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateObservation {
    pub from: String,
    pub to: String,
    pub rate: f64,
}

/// Rate as the contract stores it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    pub rate: f64,
    pub precision: u8,
    pub pair: String,
}

impl RateRecord {
    pub fn from_observation(observation: &RateObservation, precision: u8) -> Self {
        RateRecord {
            rate: observation.rate,
            precision,
            pair: pair_string(&observation.from, &observation.to),
        }
    }
}

/// Payload of the `updaterates` action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRatesData {
    pub user: String,
    pub data: Vec<RateRecord>,
    #[serde(rename = "type")]
    pub token_type: String,
    /// Milliseconds since the Unix epoch at submission time
    pub memo: i64,
}

/// Contract-side pair key, e.g. `USDP-EURP`
pub fn pair_string(from: &str, to: &str) -> String {
    format!("{}P-{}P", from, to)
}

/// Build one record per observation, keeping iteration order
pub fn build_rate_records<'a, I>(rates: I, precision: u8) -> Vec<RateRecord>
where
    I: IntoIterator<Item = &'a RateObservation>,
{
    rates
        .into_iter()
        .map(|observation| RateRecord::from_observation(observation, precision))
        .collect()
}

/// Parse a rates file: a JSON object of pair id to observation.
///
/// Observations come back in file order, which is the order they are submitted in.
pub fn parse_rates(raw: &str) -> Result<Vec<RateObservation>, serde_json::Error> {
    let entries: serde_json::Map<String, serde_json::Value> = serde_json::from_str(raw)?;
    entries
        .into_iter()
        .map(|(_, value)| serde_json::from_value(value))
        .collect()
}

// ============================================================================
// SUBMITTER
// ============================================================================

/// Sends rate updates to the currencies contract
#[derive(Clone)]
pub struct CurrenciesSubmitter {
    client: Arc<dyn LedgerClient>,
    contract: String,
    account: String,
    precision: u8,
}

impl CurrenciesSubmitter {
    pub fn new(
        client: Arc<dyn LedgerClient>,
        contract: impl Into<String>,
        account: impl Into<String>,
        precision: u8,
    ) -> Self {
        CurrenciesSubmitter {
            client,
            contract: contract.into(),
            account: account.into(),
            precision,
        }
    }

    pub fn from_config(client: Arc<dyn LedgerClient>, config: &NetworkConfig) -> Self {
        Self::new(
            client,
            config.currencies_contract.clone(),
            config.currencies_account.clone(),
            config.precision,
        )
    }

    /// Submit all `rates` in one `updaterates` transaction tagged with `token`.
    ///
    /// An empty collection is still submitted. Client failures are returned as-is.
    pub async fn update_currencies<'a, I>(
        &self,
        rates: I,
        token: &str,
    ) -> Result<TransactResult, LedgerError>
    where
        I: IntoIterator<Item = &'a RateObservation>,
    {
        let rates = build_rate_records(rates, self.precision);
        debug!(?rates, "rates prepared for sending into contract");

        let payload = UpdateRatesData {
            user: self.account.clone(),
            data: rates,
            token_type: token.to_string(),
            memo: chrono::Utc::now().timestamp_millis(),
        };
        let data = serde_json::to_value(&payload)
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;

        let action = Action {
            account: self.contract.clone(),
            name: UPDATE_RATES_ACTION.to_string(),
            data,
        };

        self.client
            .submit(
                action,
                vec![PermissionLevel::active(self.account.clone())],
                TransactOptions::default(),
            )
            .await
    }
}

impl std::fmt::Debug for CurrenciesSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurrenciesSubmitter")
            .field("contract", &self.contract)
            .field("account", &self.account)
            .field("precision", &self.precision)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(from: &str, to: &str, rate: f64) -> RateObservation {
        RateObservation {
            from: from.to_string(),
            to: to.to_string(),
            rate,
        }
    }

    #[test]
    fn test_pair_string() {
        assert_eq!(pair_string("USD", "EUR"), "USDP-EURP");
        assert_eq!(pair_string("BTC", "USD"), "BTCP-USDP");
    }

    #[test]
    fn test_records_keep_order_and_precision() {
        let rates = vec![
            observation("USD", "EUR", 0.91),
            observation("BTC", "USD", 64000.5),
            observation("EUR", "GBP", 0.85),
        ];

        let records = build_rate_records(&rates, 4);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], RateRecord { rate: 0.91, precision: 4, pair: "USDP-EURP".into() });
        assert_eq!(records[1].pair, "BTCP-USDP");
        assert_eq!(records[2].pair, "EURP-GBPP");
        assert!(records.iter().all(|r| r.precision == 4));
    }

    #[test]
    fn test_empty_rates() {
        let rates: Vec<RateObservation> = Vec::new();
        assert!(build_rate_records(&rates, 8).is_empty());
    }

    #[test]
    fn test_parse_rates_keeps_file_order() {
        let raw = r#"{
            "usd-eur": {"from": "USD", "to": "EUR", "rate": 0.91},
            "btc-usd": {"from": "BTC", "to": "USD", "rate": 64000.5},
            "aud-jpy": {"from": "AUD", "to": "JPY", "rate": 97.3}
        }"#;

        let rates = parse_rates(raw).unwrap();
        let pairs: Vec<String> = build_rate_records(&rates, 4)
            .into_iter()
            .map(|record| record.pair)
            .collect();
        assert_eq!(pairs, vec!["USDP-EURP", "BTCP-USDP", "AUDP-JPYP"]);
    }

    #[test]
    fn test_parse_rates_rejects_bad_entries() {
        assert!(parse_rates(r#"{"usd-eur": {"from": "USD", "rate": 0.91}}"#).is_err());
        assert!(parse_rates(r#"[{"from": "USD", "to": "EUR", "rate": 0.91}]"#).is_err());
        assert!(parse_rates("{}").unwrap().is_empty());
    }

    #[test]
    fn test_payload_field_names() {
        let payload = UpdateRatesData {
            user: "oracle".into(),
            data: vec![RateRecord { rate: 0.91, precision: 4, pair: "USDP-EURP".into() }],
            token_type: "fiat".into(),
            memo: 1_700_000_000_000,
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "user": "oracle",
                "data": [{"rate": 0.91, "precision": 4, "pair": "USDP-EURP"}],
                "type": "fiat",
                "memo": 1_700_000_000_000i64
            })
        );
    }
}
