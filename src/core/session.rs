// src/core/session.rs
use crate::core::classifier::RiskClassifier;
use crate::core::ledger::PositionLedger;
use crate::core::sampler::PriceWindow;
use crate::types::{PriceSample, RiskLevel};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Process-wide session context. Every core mutation goes through one lock,
/// and nothing inside awaits while it is held.
pub type SharedSession = Arc<Mutex<Session>>;

#[derive(Debug)]
pub struct Session {
    window: PriceWindow,
    risk: RiskLevel,
    classifier: RiskClassifier,
    ledger: PositionLedger,
}

impl Session {
    pub fn new(
        window_capacity: usize,
        classifier: RiskClassifier,
        ledger: PositionLedger,
    ) -> Self {
        Self {
            window: PriceWindow::new(window_capacity),
            risk: RiskLevel::default(),
            classifier,
            ledger,
        }
    }

    pub fn shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    pub fn window(&self) -> &PriceWindow {
        &self.window
    }

    pub fn risk(&self) -> RiskLevel {
        self.risk
    }

    pub fn latest_price(&self) -> Option<f64> {
        self.window.latest().map(|s| s.price)
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut PositionLedger {
        &mut self.ledger
    }

    /// Appends a sample and re-evaluates risk. Returns `None` when the sample
    /// is older than the newest one already held.
    pub fn record_sample(&mut self, sample: PriceSample) -> Option<RiskLevel> {
        if let Some(last) = self.window.latest() {
            if sample.timestamp_millis < last.timestamp_millis {
                warn!(
                    "Dropping out-of-order sample ({} < {})",
                    sample.timestamp_millis, last.timestamp_millis
                );
                return None;
            }
        }

        self.window.push(sample);
        let level = self.classifier.classify(&self.window, self.risk);
        if level != self.risk {
            info!("Risk level {} -> {}", self.risk, level);
            self.risk = level;
        }
        debug!(
            "Sample {} @ {} (window {}, risk {})",
            sample.price,
            sample.timestamp_millis,
            self.window.len(),
            self.risk
        );
        Some(self.risk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: i64, price: f64) -> PriceSample {
        PriceSample {
            timestamp_millis: ts,
            price,
        }
    }

    #[test]
    fn risk_holds_until_enough_samples() {
        let mut s = Session::new(50, RiskClassifier::default(), PositionLedger::default());
        for (i, p) in [1.00, 1.05, 1.00, 1.05].iter().enumerate() {
            assert_eq!(s.record_sample(sample(i as i64, *p)), Some(RiskLevel::Low));
        }
        assert_eq!(s.record_sample(sample(4, 1.00)), Some(RiskLevel::High));
        assert_eq!(s.latest_price(), Some(1.00));
    }

    #[test]
    fn stale_samples_are_ignored() {
        let mut s = Session::new(50, RiskClassifier::default(), PositionLedger::default());
        s.record_sample(sample(10_000, 1.0));
        assert_eq!(s.record_sample(sample(5_000, 2.0)), None);
        assert_eq!(s.window().len(), 1);
        // Equal timestamps are allowed; on-chain feeds often repeat the last round.
        assert!(s.record_sample(sample(10_000, 1.1)).is_some());
        assert_eq!(s.window().len(), 2);
    }
}
