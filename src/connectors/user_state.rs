// src/connectors/user_state.rs
use crate::connectors::messages::UserStateMessage;
use crate::connectors::traits::{UserState, UserStateReader};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Reads `(collateral, debt, reputation, oracle price, health factor)` from an
/// HTTP endpoint. `{address}` in the template is replaced per request.
pub struct HttpUserState {
    http_client: Client,
    url_template: String,
}

impl HttpUserState {
    pub fn new(url_template: String, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http_client,
            url_template,
        })
    }

    fn url_for(&self, address: &str) -> String {
        self.url_template.replace("{address}", address)
    }
}

impl From<UserStateMessage> for UserState {
    fn from(msg: UserStateMessage) -> Self {
        UserState {
            collateral: msg.collateral,
            debt: msg.debt,
            reputation_score: msg.reputation_score,
            oracle_price: msg.oracle_price,
            health_factor: msg.health_factor,
        }
    }
}

#[async_trait]
impl UserStateReader for HttpUserState {
    async fn user_state(&self, address: &str) -> Result<UserState> {
        let url = self.url_for(address);
        let msg = self
            .http_client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<UserStateMessage>()
            .await
            .with_context(|| format!("Failed to parse user state for {}", address))?;
        Ok(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_substitutes_address() {
        let reader = HttpUserState::new(
            "http://localhost:3000/api/user-state/{address}".to_string(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            reader.url_for("0xabc"),
            "http://localhost:3000/api/user-state/0xabc"
        );
    }

    #[test]
    fn message_maps_to_user_state() {
        let msg: UserStateMessage = serde_json::from_str(
            r#"{"collateral":100.0,"debt":40.0,"reputationScore":7.0,"oraclePrice":1.02,"healthFactor":2.5}"#,
        )
        .unwrap();
        let state = UserState::from(msg);
        assert_eq!(state.oracle_price, 1.02);
        assert_eq!(state.health_factor, 2.5);
        assert_eq!(state.reputation_score, 7.0);
    }
}
