// src/connectors/oracle.rs
use crate::connectors::messages::OracleQuoteMessage;
use crate::connectors::traits::{FeedError, OraclePrice, PriceSource};
use crate::utils::time::now_secs;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Price served when a degraded upstream is allowed to answer anyway.
pub const FALLBACK_PRICE: f64 = 1.0;

/// Polls an HTTP oracle endpoint returning `{price, decimals, timestamp}`.
pub struct HttpOracle {
    http_client: Client,
    url: Url,
    fallback_on_error: bool,
    // Newest round seen from the upstream, NO_ROUND until the first success.
    last_round: AtomicI64,
}

const NO_ROUND: i64 = i64::MIN;

impl HttpOracle {
    pub fn new(url: &str, timeout: Duration, fallback_on_error: bool) -> Result<Self> {
        let url = Url::parse(url).with_context(|| format!("Invalid oracle url {}", url))?;
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            url,
            fallback_on_error,
            last_round: AtomicI64::new(NO_ROUND),
        })
    }

    async fn fetch_upstream(&self) -> Result<OraclePrice, FeedError> {
        let response = self
            .http_client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;
        parse_quote(&body)
    }
}

pub fn parse_quote(body: &str) -> Result<OraclePrice, FeedError> {
    let msg: OracleQuoteMessage =
        serde_json::from_str(body).map_err(|e| FeedError::Parse(e.to_string()))?;
    debug!(
        "Oracle quote {} (decimals {:?}) @ {}",
        msg.price, msg.decimals, msg.timestamp
    );
    Ok(OraclePrice {
        price: msg.price,
        timestamp_secs: msg.timestamp,
    })
}

/// Degraded quote. It carries the last real round when one is known, so a
/// wall-clock stamp never runs ahead of the rounds that follow.
pub fn fallback_quote(last_round: Option<i64>) -> OraclePrice {
    OraclePrice {
        price: FALLBACK_PRICE,
        timestamp_secs: last_round.unwrap_or_else(now_secs),
    }
}

#[async_trait]
impl PriceSource for HttpOracle {
    async fn fetch_price(&self) -> Result<OraclePrice, FeedError> {
        match self.fetch_upstream().await {
            Ok(quote) => {
                self.last_round.fetch_max(quote.timestamp_secs, Ordering::SeqCst);
                Ok(quote)
            }
            Err(e) if self.fallback_on_error => {
                warn!("Oracle degraded ({}), serving fallback price", e);
                let last = self.last_round.load(Ordering::SeqCst);
                Ok(fallback_quote((last != NO_ROUND).then_some(last)))
            }
            Err(e) => Err(e),
        }
    }
}
