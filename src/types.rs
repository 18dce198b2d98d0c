// src/types.rs
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// One observation from the price feed. Never mutated after it is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub timestamp_millis: i64,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
        }
    }
}

pub type PositionId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub side: Side,
    pub size: f64,
    pub entry_price: f64,
    pub opened_at: i64,
}

impl Position {
    /// Price move in the position's favour, per unit of size.
    pub fn directional_diff(&self, price: f64) -> f64 {
        match self.side {
            Side::Long => price - self.entry_price,
            Side::Short => self.entry_price - price,
        }
    }

    /// Mark-to-market PnL while the position is still open.
    pub fn unrealized_pnl(&self, mark_price: f64) -> f64 {
        self.directional_diff(mark_price) * self.size
    }
}

/// Lend or borrow record. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub amount: f64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PnlPools {
    pub user: f64,
    pub lender: f64,
    pub protocol: f64,
}

/// Reference price used to value and settle a position. Either origin is
/// accepted wherever a mark is needed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarkPrice {
    Feed(f64),
    OnChain(f64),
}

impl MarkPrice {
    pub fn value(&self) -> f64 {
        match *self {
            MarkPrice::Feed(p) | MarkPrice::OnChain(p) => p,
        }
    }
}

/// Outcome of closing a position: realized PnL and what each pool received.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub pnl: f64,
    pub user_delta: f64,
    pub lender_delta: f64,
    pub protocol_delta: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SettlementResult {
    pub position: Position,
    pub exit_price: f64,
    pub settlement: Settlement,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LedgerSnapshot {
    pub position: Option<Position>,
    pub user_pnl: f64,
    pub lender_pnl: f64,
    pub protocol_pnl: f64,
    pub lends: usize,
    pub borrows: usize,
}

/// Everything the dashboard needs to redraw after a desk mutation.
#[derive(Debug, Clone, Default)]
pub struct DeskSnapshot {
    pub ledger: LedgerSnapshot,
    pub risk: RiskLevel,
    pub last_price: Option<f64>,
    pub samples: usize,
    /// Price the open position is valued at. Matches the price a close would settle at.
    pub mark: Option<MarkPrice>,
    /// Marks come from the on-chain reader, so feed samples do not revalue the position.
    pub oracle_marks: bool,
    pub unrealized_pnl: Option<f64>,
    pub feed_active: bool,
    pub wallet_address: Option<String>,
    pub write_pending: bool,
}

#[derive(Debug, Clone)]
pub enum UiEvent {
    Sample { sample: PriceSample, risk: RiskLevel },
    Snapshot(DeskSnapshot),
    Log(String),
}

#[derive(Debug, Clone)]
pub enum DeskCommand {
    SetFeedActive(bool),
    Open { side: Side, size: f64 },
    CloseActive,
    Lend(f64),
    Borrow(f64),
    Shutdown,
}
