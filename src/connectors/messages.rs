// src/connectors/messages.rs
use serde::Deserialize;

/// Body of the oracle price endpoint, e.g. `{"price":1.0213,"decimals":18,"timestamp":1718000000}`.
/// `price` is already scaled by `decimals` upstream.
#[derive(Debug, Deserialize)]
pub struct OracleQuoteMessage {
    pub price: f64,

    #[serde(default)]
    pub decimals: Option<u8>,

    /// Unix seconds of the oracle round.
    pub timestamp: i64,
}

/// Per-address on-chain account read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStateMessage {
    pub collateral: f64,
    pub debt: f64,
    pub reputation_score: f64,
    pub oracle_price: f64,
    pub health_factor: f64,
}
