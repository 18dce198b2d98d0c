// src/core/settlement.rs
//! Realized PnL split between the user, lenders and the protocol.
//!
//! Profits are shared by a fixed table. Losses (and flat closes) land on the
//! user alone.

use crate::types::{Position, Settlement};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfitShares {
    pub user: f64,
    pub lender: f64,
    pub protocol: f64,
}

impl ProfitShares {
    pub const DEFAULT: ProfitShares = ProfitShares {
        user: 0.80,
        lender: 0.15,
        protocol: 0.05,
    };
}

#[derive(Debug, Clone, Copy)]
pub struct SettlementPolicy {
    shares: ProfitShares,
}

impl SettlementPolicy {
    pub fn new(shares: ProfitShares) -> Self {
        Self { shares }
    }

    pub fn settle(&self, position: &Position, exit_price: f64) -> Settlement {
        let pnl = position.directional_diff(exit_price) * position.size;
        self.split(pnl)
    }

    pub fn split(&self, pnl: f64) -> Settlement {
        if pnl > 0.0 {
            let user_delta = pnl * self.shares.user;
            let lender_delta = pnl * self.shares.lender;
            // Protocol takes the remainder so the three deltas add back up to pnl.
            let protocol_delta = pnl - user_delta - lender_delta;
            Settlement {
                pnl,
                user_delta,
                lender_delta,
                protocol_delta,
            }
        } else {
            Settlement {
                pnl,
                user_delta: pnl,
                lender_delta: 0.0,
                protocol_delta: 0.0,
            }
        }
    }
}

impl Default for SettlementPolicy {
    fn default() -> Self {
        Self::new(ProfitShares::DEFAULT)
    }
}
