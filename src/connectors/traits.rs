// src/connectors/traits.rs
use async_trait::async_trait;
use thiserror::Error;

/// A single oracle read: price plus the round timestamp in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OraclePrice {
    pub price: f64,
    pub timestamp_secs: i64,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("malformed payload: {0}")]
    Parse(String),

    #[error("invalid price {0}")]
    InvalidPrice(f64),

    #[error("invalid round timestamp {0}")]
    InvalidTimestamp(i64),
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_price(&self) -> Result<OraclePrice, FeedError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TxReceipt {
    pub id: String,
    pub function: String,
}

/// Wallet and transaction layer. The desk reads `address` and `write_pending`
/// and never looks inside a receipt.
#[async_trait]
pub trait WalletLink: Send + Sync {
    fn address(&self) -> Option<String>;

    fn write_pending(&self) -> bool;

    async fn write(&self, function: &str, args: Vec<String>) -> anyhow::Result<TxReceipt>;
}

/// On-chain account state for one address.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UserState {
    pub collateral: f64,
    pub debt: f64,
    pub reputation_score: f64,
    pub oracle_price: f64,
    pub health_factor: f64,
}

#[async_trait]
pub trait UserStateReader: Send + Sync {
    async fn user_state(&self, address: &str) -> anyhow::Result<UserState>;
}
