// src/core/gate.rs
//! Admission checks run before any open/close reaches the ledger.
//!
//! HIGH risk blocks new exposure only. Closing stays available at every risk
//! level so a position can always be exited.

use crate::types::RiskLevel;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateInputs {
    pub wallet_connected: bool,
    pub write_pending: bool,
    pub size: f64,
    pub has_active_position: bool,
    pub risk: RiskLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    WalletDisconnected,
    WritePending,
    InvalidSize,
    PositionActive,
    RiskTooHigh,
    NoActivePosition,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            DenyReason::WalletDisconnected => "wallet not connected",
            DenyReason::WritePending => "a transaction is still pending",
            DenyReason::InvalidSize => "size must be positive",
            DenyReason::PositionActive => "a position is already open",
            DenyReason::RiskTooHigh => "risk level is HIGH",
            DenyReason::NoActivePosition => "no open position",
        };
        f.write_str(msg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Admit,
    Deny(DenyReason),
}

impl GateDecision {
    pub fn is_admit(&self) -> bool {
        matches!(self, GateDecision::Admit)
    }

    pub fn into_result(self) -> Result<(), DenyReason> {
        match self {
            GateDecision::Admit => Ok(()),
            GateDecision::Deny(reason) => Err(reason),
        }
    }
}

pub fn evaluate_open(inputs: &GateInputs) -> GateDecision {
    let reason = if !inputs.wallet_connected {
        DenyReason::WalletDisconnected
    } else if inputs.write_pending {
        DenyReason::WritePending
    } else if !(inputs.size > 0.0) {
        DenyReason::InvalidSize
    } else if inputs.has_active_position {
        DenyReason::PositionActive
    } else if inputs.risk == RiskLevel::High {
        DenyReason::RiskTooHigh
    } else {
        return GateDecision::Admit;
    };
    GateDecision::Deny(reason)
}

pub fn evaluate_close(inputs: &GateInputs) -> GateDecision {
    let reason = if !inputs.has_active_position {
        DenyReason::NoActivePosition
    } else if !inputs.wallet_connected {
        DenyReason::WalletDisconnected
    } else if inputs.write_pending {
        DenyReason::WritePending
    } else {
        return GateDecision::Admit;
    };
    GateDecision::Deny(reason)
}

/// Lend and borrow submit a wallet write, so they need a connected wallet
/// and no write already in flight.
pub fn evaluate_transfer(inputs: &GateInputs) -> GateDecision {
    let reason = if !inputs.wallet_connected {
        DenyReason::WalletDisconnected
    } else if inputs.write_pending {
        DenyReason::WritePending
    } else {
        return GateDecision::Admit;
    };
    GateDecision::Deny(reason)
}

pub fn can_open(inputs: &GateInputs) -> bool {
    evaluate_open(inputs).is_admit()
}

pub fn can_close(inputs: &GateInputs) -> bool {
    evaluate_close(inputs).is_admit()
}

pub fn can_transfer(inputs: &GateInputs) -> bool {
    evaluate_transfer(inputs).is_admit()
}
