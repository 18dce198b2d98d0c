// src/core/ledger.rs
use crate::core::settlement::SettlementPolicy;
use crate::types::{
    LedgerEntry, LedgerSnapshot, PnlPools, Position, PositionId, SettlementResult, Side,
};
use crate::utils::time::now_millis;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("invalid size {0}: must be positive")]
    InvalidSize(f64),

    #[error("invalid entry price {0}: must be positive and finite")]
    InvalidPrice(f64),

    #[error("position {0} is already open")]
    PositionAlreadyOpen(PositionId),

    #[error("position {0} not found")]
    PositionNotFound(PositionId),
}

/// Persistable ledger contents. This is what the session store reads and writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerState {
    pub positions: HashMap<PositionId, Position>,
    pub pools: PnlPools,
    pub lends: Vec<LedgerEntry>,
    pub borrows: Vec<LedgerEntry>,
}

/// Owns simulated positions and the realized PnL pools.
///
/// Positions are keyed by id but only one may be active at a time.
#[derive(Debug, Default)]
pub struct PositionLedger {
    state: LedgerState,
    policy: SettlementPolicy,
}

impl PositionLedger {
    pub fn new(policy: SettlementPolicy) -> Self {
        Self {
            state: LedgerState::default(),
            policy,
        }
    }

    /// Swaps in previously stored contents, keeping the settlement policy.
    /// Stored positions must satisfy the same checks as `open`.
    pub fn replace_state(&mut self, state: LedgerState) -> Result<(), LedgerError> {
        for position in state.positions.values() {
            check_terms(position.size, position.entry_price)?;
        }
        self.state = state;
        Ok(())
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn active_position(&self) -> Option<&Position> {
        // A restored state can only hold more than one entry if it was written by hand.
        self.state
            .positions
            .values()
            .min_by_key(|p| p.opened_at)
    }

    pub fn has_active(&self) -> bool {
        !self.state.positions.is_empty()
    }

    pub fn open(
        &mut self,
        side: Side,
        size: f64,
        entry_price: f64,
    ) -> Result<PositionId, LedgerError> {
        check_terms(size, entry_price)?;
        if let Some(active) = self.active_position() {
            return Err(LedgerError::PositionAlreadyOpen(active.id.clone()));
        }

        let position = Position {
            id: Uuid::new_v4().to_string(),
            side,
            size,
            entry_price,
            opened_at: now_millis(),
        };
        let id = position.id.clone();

        info!(
            "Opened {} {} @ {} (id {})",
            position.side, position.size, position.entry_price, id
        );
        self.state.positions.insert(id.clone(), position);
        Ok(id)
    }

    pub fn close(&mut self, id: &str, exit_price: f64) -> Result<SettlementResult, LedgerError> {
        let position = self
            .state
            .positions
            .remove(id)
            .ok_or_else(|| LedgerError::PositionNotFound(id.to_string()))?;

        let settlement = self.policy.settle(&position, exit_price);
        let pools = &mut self.state.pools;
        pools.user += settlement.user_delta;
        pools.lender += settlement.lender_delta;
        pools.protocol += settlement.protocol_delta;

        info!(
            "Closed {} {} @ {} -> pnl {:.6} (user {:.6}, lenders {:.6}, protocol {:.6})",
            position.side,
            position.size,
            exit_price,
            settlement.pnl,
            settlement.user_delta,
            settlement.lender_delta,
            settlement.protocol_delta
        );

        Ok(SettlementResult {
            position,
            exit_price,
            settlement,
        })
    }

    pub fn record_lend(&mut self, amount: f64) -> LedgerEntry {
        let entry = new_entry(amount);
        self.state.lends.push(entry.clone());
        entry
    }

    pub fn record_borrow(&mut self, amount: f64) -> LedgerEntry {
        let entry = new_entry(amount);
        self.state.borrows.push(entry.clone());
        entry
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            position: self.active_position().cloned(),
            user_pnl: self.state.pools.user,
            lender_pnl: self.state.pools.lender,
            protocol_pnl: self.state.pools.protocol,
            lends: self.state.lends.len(),
            borrows: self.state.borrows.len(),
        }
    }
}

fn check_terms(size: f64, entry_price: f64) -> Result<(), LedgerError> {
    // NaN fails both checks as well.
    if !(size > 0.0) {
        return Err(LedgerError::InvalidSize(size));
    }
    if !(entry_price > 0.0) || !entry_price.is_finite() {
        return Err(LedgerError::InvalidPrice(entry_price));
    }
    Ok(())
}

fn new_entry(amount: f64) -> LedgerEntry {
    LedgerEntry {
        id: Uuid::new_v4().to_string(),
        amount,
        created_at: now_millis(),
    }
}
