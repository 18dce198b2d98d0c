// src/core/engine.rs
use crate::config::MarkSource;
use crate::connectors::traits::{TxReceipt, UserStateReader, WalletLink};
use crate::core::gate::{self, DenyReason, GateInputs};
use crate::core::ledger::LedgerError;
use crate::core::sampler::{PriceSampler, SamplerHandle};
use crate::core::session::{Session, SharedSession};
use crate::storage::SessionStore;
use crate::types::{
    DeskCommand, DeskSnapshot, LedgerEntry, MarkPrice, PositionId, SettlementResult, Side,
    UiEvent,
};
use anyhow::Result;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum DeskError {
    #[error("rejected: {0}")]
    Denied(DenyReason),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("no mark price available yet")]
    MarkPriceUnavailable,

    #[error("amount must be positive, got {0}")]
    InvalidAmount(f64),

    #[error("wallet write failed: {0}")]
    Wallet(String),
}

impl From<DenyReason> for DeskError {
    fn from(reason: DenyReason) -> Self {
        DeskError::Denied(reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transfer {
    Lend,
    Borrow,
}

impl Transfer {
    fn function(self) -> &'static str {
        match self {
            Transfer::Lend => "lend",
            Transfer::Borrow => "borrow",
        }
    }
}

type WriteOutcome = Result<anyhow::Result<TxReceipt>, JoinError>;

/// Lend or borrow whose wallet write has been submitted but not confirmed.
struct PendingWrite {
    transfer: Transfer,
    amount: f64,
    task: JoinHandle<anyhow::Result<TxReceipt>>,
}

/// Single writer for the trading session: turns user commands into gated
/// ledger mutations and owns the price feed switch.
pub struct TradingDesk {
    session: SharedSession,
    sampler: PriceSampler,
    feed: Option<SamplerHandle>,
    wallet: Arc<dyn WalletLink>,
    user_state: Option<Arc<dyn UserStateReader>>,
    store: Arc<dyn SessionStore>,
    ui_sender: mpsc::Sender<UiEvent>,
    pending_write: Option<PendingWrite>,
    // Last on-chain mark read. Only used with oracle marks.
    oracle_mark: Option<f64>,
    // Set when the stored ledger could not be loaded; saving would overwrite it.
    saves_blocked: bool,
}

impl TradingDesk {
    pub fn new(
        session: SharedSession,
        sampler: PriceSampler,
        wallet: Arc<dyn WalletLink>,
        store: Arc<dyn SessionStore>,
        ui_sender: mpsc::Sender<UiEvent>,
    ) -> Self {
        Self {
            session,
            sampler,
            feed: None,
            wallet,
            user_state: None,
            store,
            ui_sender,
            pending_write: None,
            oracle_mark: None,
            saves_blocked: false,
        }
    }

    /// Values positions at the on-chain oracle price instead of the polled feed.
    pub fn with_oracle_marks(mut self, reader: Arc<dyn UserStateReader>) -> Self {
        self.user_state = Some(reader);
        self
    }

    pub fn mark_source(&self) -> MarkSource {
        if self.user_state.is_some() {
            MarkSource::Oracle
        } else {
            MarkSource::Feed
        }
    }

    pub async fn load_state(&mut self) {
        let state = match self.store.load().await {
            Ok(Some(state)) => state,
            Ok(None) => {
                info!("No stored ledger, starting fresh");
                return;
            }
            Err(e) => {
                self.block_saves(format!("Failed to load ledger state: {}", e));
                return;
            }
        };

        let (positions, lends, borrows) =
            (state.positions.len(), state.lends.len(), state.borrows.len());
        let restored = self.session.lock().await.ledger_mut().replace_state(state);
        match restored {
            Ok(()) => info!(
                "Restored ledger: {} open position(s), {} lends, {} borrows",
                positions, lends, borrows
            ),
            Err(e) => self.block_saves(format!("Stored ledger rejected: {}", e)),
        }
    }

    fn block_saves(&mut self, reason: String) {
        error!("{}. The stored file is left untouched until restart.", reason);
        self.saves_blocked = true;
        self.send_ui_event(UiEvent::Log(format!("{} (not saving)", reason)));
    }

    async fn save_state(&self) {
        if self.saves_blocked {
            warn!("Ledger not saved: stored state could not be loaded at startup");
            return;
        }
        let state = self.session.lock().await.ledger().state().clone();
        if let Err(e) = self.store.save(&state).await {
            error!("Failed to save ledger state: {}", e);
        }
    }

    fn send_ui_event(&self, event: UiEvent) {
        match self.ui_sender.try_send(event) {
            Ok(_) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("UI Channel closed! Interface is likely dead.");
            }
        }
    }

    pub fn feed_active(&self) -> bool {
        self.feed.is_some()
    }

    pub async fn set_feed_active(&mut self, active: bool) {
        match (active, self.feed.take()) {
            (true, None) => self.feed = Some(self.sampler.start()),
            (true, Some(handle)) => self.feed = Some(handle),
            (false, Some(handle)) => handle.stop().await,
            (false, None) => {}
        }
    }

    /// Resolves the mark from the configured source. On-chain reads are kept
    /// so snapshots value the position at the same price.
    pub async fn mark_price(&mut self) -> Result<MarkPrice, DeskError> {
        let mark = match &self.user_state {
            None => self
                .session
                .lock()
                .await
                .latest_price()
                .map(MarkPrice::Feed),
            Some(reader) => {
                let address = self.wallet.address().ok_or(DenyReason::WalletDisconnected)?;
                match reader.user_state(&address).await {
                    Ok(state) => {
                        debug!(
                            "On-chain state for {}: collateral {} debt {} reputation {} health {}",
                            address,
                            state.collateral,
                            state.debt,
                            state.reputation_score,
                            state.health_factor
                        );
                        Some(MarkPrice::OnChain(state.oracle_price))
                    }
                    Err(e) => {
                        warn!("On-chain price read failed: {:#}", e);
                        None
                    }
                }
            }
        };
        let mark = mark
            .filter(|m| m.value().is_finite() && m.value() > 0.0)
            .ok_or(DeskError::MarkPriceUnavailable)?;
        if let MarkPrice::OnChain(price) = mark {
            self.oracle_mark = Some(price);
        }
        Ok(mark)
    }

    /// Re-reads the on-chain mark while a position is open.
    pub async fn refresh_mark(&mut self) {
        if self.user_state.is_none() || !self.session.lock().await.ledger().has_active() {
            return;
        }
        if let Err(e) = self.mark_price().await {
            debug!("Mark refresh skipped: {}", e);
        }
    }

    fn current_mark(&self, session: &Session) -> Option<MarkPrice> {
        match self.user_state {
            None => session.latest_price().map(MarkPrice::Feed),
            Some(_) => self.oracle_mark.map(MarkPrice::OnChain),
        }
    }

    fn write_pending(&self) -> bool {
        self.pending_write.is_some() || self.wallet.write_pending()
    }

    fn gate_inputs(&self, session: &Session, size: f64) -> GateInputs {
        GateInputs {
            wallet_connected: self.wallet.address().is_some(),
            write_pending: self.write_pending(),
            size,
            has_active_position: session.ledger().has_active(),
            risk: session.risk(),
        }
    }

    pub async fn open_position(
        &mut self,
        side: Side,
        size: f64,
    ) -> Result<PositionId, DeskError> {
        let id = {
            let session = self.session.lock().await;
            gate::evaluate_open(&self.gate_inputs(&session, size)).into_result()?;
            drop(session);

            let mark = self.mark_price().await?;
            let mut session = self.session.lock().await;
            // Re-checked: risk may have moved while the mark was read.
            gate::evaluate_open(&self.gate_inputs(&session, size)).into_result()?;
            session.ledger_mut().open(side, size, mark.value())?
        };
        self.save_state().await;
        Ok(id)
    }

    pub async fn close_position(&mut self, id: &str) -> Result<SettlementResult, DeskError> {
        {
            let session = self.session.lock().await;
            gate::evaluate_close(&self.gate_inputs(&session, 0.0)).into_result()?;
        }

        let mark = self.mark_price().await?;
        let result = {
            let mut session = self.session.lock().await;
            gate::evaluate_close(&self.gate_inputs(&session, 0.0)).into_result()?;
            session.ledger_mut().close(id, mark.value())?
        };
        self.save_state().await;
        Ok(result)
    }

    pub async fn close_active(&mut self) -> Result<SettlementResult, DeskError> {
        let active = self
            .session
            .lock()
            .await
            .ledger()
            .active_position()
            .map(|p| p.id.clone());
        let id = active.ok_or(DenyReason::NoActivePosition)?;
        self.close_position(&id).await
    }

    pub async fn lend(&mut self, amount: f64) -> Result<LedgerEntry, DeskError> {
        self.submit_transfer(Transfer::Lend, amount).await
    }

    pub async fn borrow(&mut self, amount: f64) -> Result<LedgerEntry, DeskError> {
        self.submit_transfer(Transfer::Borrow, amount).await
    }

    /// Submits and waits for confirmation. The command loop does not wait;
    /// it keeps serving commands while the write is outstanding.
    async fn submit_transfer(
        &mut self,
        transfer: Transfer,
        amount: f64,
    ) -> Result<LedgerEntry, DeskError> {
        self.start_transfer(transfer, amount).await?;
        let outcome = wait_for_write(&mut self.pending_write).await;
        self.finish_transfer(outcome).await.map(|(_, entry)| entry)
    }

    async fn start_transfer(&mut self, transfer: Transfer, amount: f64) -> Result<(), DeskError> {
        if !(amount > 0.0) {
            return Err(DeskError::InvalidAmount(amount));
        }
        {
            let session = self.session.lock().await;
            gate::evaluate_transfer(&self.gate_inputs(&session, amount)).into_result()?;
        }

        let wallet = self.wallet.clone();
        let function = transfer.function();
        let task =
            tokio::spawn(async move { wallet.write(function, vec![amount.to_string()]).await });
        self.pending_write = Some(PendingWrite {
            transfer,
            amount,
            task,
        });
        Ok(())
    }

    async fn finish_transfer(
        &mut self,
        outcome: WriteOutcome,
    ) -> Result<(Transfer, LedgerEntry), DeskError> {
        let Some(pending) = self.pending_write.take() else {
            return Err(DeskError::Wallet("no write in flight".to_string()));
        };
        let receipt = match outcome {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => return Err(DeskError::Wallet(format!("{:#}", e))),
            Err(e) => return Err(DeskError::Wallet(e.to_string())),
        };
        info!("{} confirmed in {}", receipt.function, receipt.id);

        let entry = {
            let mut session = self.session.lock().await;
            let ledger = session.ledger_mut();
            match pending.transfer {
                Transfer::Lend => ledger.record_lend(pending.amount),
                Transfer::Borrow => ledger.record_borrow(pending.amount),
            }
        };
        self.save_state().await;
        Ok((pending.transfer, entry))
    }

    async fn on_transfer_done(&mut self, outcome: WriteOutcome) {
        match self.finish_transfer(outcome).await {
            Ok((Transfer::Lend, entry)) => {
                self.log(format!("Lent {} ({})", entry.amount, short_id(&entry.id)))
            }
            Ok((Transfer::Borrow, entry)) => {
                self.log(format!("Borrowed {} ({})", entry.amount, short_id(&entry.id)))
            }
            Err(e) => self.reject(e),
        }
    }

    pub async fn snapshot(&self) -> DeskSnapshot {
        let session = self.session.lock().await;
        let ledger = session.ledger().snapshot();
        let mark = self.current_mark(&session);
        let unrealized_pnl = match (&ledger.position, mark) {
            (Some(pos), Some(mark)) => Some(pos.unrealized_pnl(mark.value())),
            _ => None,
        };
        DeskSnapshot {
            ledger,
            risk: session.risk(),
            last_price: session.latest_price(),
            samples: session.window().len(),
            mark,
            oracle_marks: self.user_state.is_some(),
            unrealized_pnl,
            feed_active: self.feed_active(),
            wallet_address: self.wallet.address(),
            write_pending: self.write_pending(),
        }
    }

    async fn publish(&self) {
        self.send_ui_event(UiEvent::Snapshot(self.snapshot().await));
    }

    async fn handle_command(&mut self, command: DeskCommand) -> Result<(), DeskError> {
        match command {
            DeskCommand::SetFeedActive(active) => {
                self.set_feed_active(active).await;
                self.log(format!("Price feed {}", if active { "on" } else { "off" }));
            }
            DeskCommand::Open { side, size } => {
                let id = self.open_position(side, size).await?;
                self.log(format!("Opened {} {} ({})", side, size, short_id(&id)));
            }
            DeskCommand::CloseActive => {
                let r = self.close_active().await?;
                self.log(format!(
                    "Closed {} @ {:.4}: pnl {:+.4} (user {:+.4} / lenders {:+.4} / protocol {:+.4})",
                    r.position.side,
                    r.exit_price,
                    r.settlement.pnl,
                    r.settlement.user_delta,
                    r.settlement.lender_delta,
                    r.settlement.protocol_delta
                ));
            }
            DeskCommand::Lend(amount) => {
                self.start_transfer(Transfer::Lend, amount).await?;
                self.log(format!("Submitting lend of {}...", amount));
            }
            DeskCommand::Borrow(amount) => {
                self.start_transfer(Transfer::Borrow, amount).await?;
                self.log(format!("Submitting borrow of {}...", amount));
            }
            DeskCommand::Shutdown => {}
        }
        Ok(())
    }

    fn log(&self, msg: String) {
        info!("{}", msg);
        self.send_ui_event(UiEvent::Log(msg));
    }

    fn reject(&self, e: DeskError) {
        warn!("Command rejected: {}", e);
        self.send_ui_event(UiEvent::Log(format!("Rejected: {}", e)));
    }

    pub async fn run(&mut self, mut commands: mpsc::Receiver<DeskCommand>) -> Result<()> {
        info!("Desk starting (mark source: {:?})", self.mark_source());
        self.load_state().await;
        self.publish().await;

        let mut mark_refresh = tokio::time::interval(self.sampler.period());
        mark_refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if matches!(command, DeskCommand::Shutdown) {
                        break;
                    }
                    if let Err(e) = self.handle_command(command).await {
                        self.reject(e);
                    }
                }
                outcome = wait_for_write(&mut self.pending_write), if self.pending_write.is_some() => {
                    self.on_transfer_done(outcome).await;
                }
                _ = mark_refresh.tick(), if self.user_state.is_some() => {
                    self.refresh_mark().await;
                }
            }
            self.publish().await;
        }

        if self.pending_write.is_some() {
            info!("Waiting for the pending wallet write before stopping");
            let outcome = wait_for_write(&mut self.pending_write).await;
            self.on_transfer_done(outcome).await;
        }
        self.set_feed_active(false).await;
        info!("Desk stopped");
        Ok(())
    }
}

async fn wait_for_write(pending: &mut Option<PendingWrite>) -> WriteOutcome {
    match pending {
        Some(write) => (&mut write.task).await,
        None => std::future::pending().await,
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
