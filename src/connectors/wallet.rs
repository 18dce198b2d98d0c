// src/connectors/wallet.rs
use crate::connectors::traits::{TxReceipt, WalletLink};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Local stand-in for a browser wallet. A write holds `write_pending` for the
/// configured latency.
pub struct PaperWallet {
    address: Option<String>,
    pending: AtomicBool,
    latency: Duration,
}

impl PaperWallet {
    pub fn new(address: Option<String>, latency: Duration) -> Self {
        Self {
            address,
            pending: AtomicBool::new(false),
            latency,
        }
    }

    #[cfg(test)]
    pub fn set_pending(&self, pending: bool) {
        self.pending.store(pending, Ordering::SeqCst);
    }
}

struct PendingGuard<'a>(&'a AtomicBool);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl WalletLink for PaperWallet {
    fn address(&self) -> Option<String> {
        self.address.clone()
    }

    fn write_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    async fn write(&self, function: &str, args: Vec<String>) -> Result<TxReceipt> {
        if self.address().is_none() {
            bail!("wallet not connected");
        }
        if self
            .pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            bail!("another transaction is pending");
        }
        let _pending = PendingGuard(&self.pending);

        info!("Submitting {}({})", function, args.join(", "));
        tokio::time::sleep(self.latency).await;

        Ok(TxReceipt {
            id: format!("0x{}", Uuid::new_v4().simple()),
            function: function.to_string(),
        })
    }
}
