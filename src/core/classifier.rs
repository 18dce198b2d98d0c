// src/core/classifier.rs
//! Volatility risk classification over the sampled price window.
//!
//! volatility = (max - min) / mid, mid = (min + max) / 2 (1 when mid is 0).
//! Below `low_ceiling` is LOW, below `medium_ceiling` is MEDIUM, anything
//! else is HIGH.

use crate::core::sampler::PriceWindow;
use crate::types::RiskLevel;

pub const DEFAULT_MIN_SAMPLES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskThresholds {
    low_ceiling: f64,
    medium_ceiling: f64,
}

impl RiskThresholds {
    /// 0.5% / 2%. Default.
    pub const STRICT: RiskThresholds = RiskThresholds {
        low_ceiling: 0.005,
        medium_ceiling: 0.02,
    };

    /// 1% / 3%.
    pub const RELAXED: RiskThresholds = RiskThresholds {
        low_ceiling: 0.01,
        medium_ceiling: 0.03,
    };

    pub fn new(low_ceiling: f64, medium_ceiling: f64) -> Option<Self> {
        if low_ceiling.is_finite()
            && medium_ceiling.is_finite()
            && low_ceiling > 0.0
            && low_ceiling < medium_ceiling
        {
            Some(Self {
                low_ceiling,
                medium_ceiling,
            })
        } else {
            None
        }
    }

    pub fn low_ceiling(&self) -> f64 {
        self.low_ceiling
    }

    pub fn medium_ceiling(&self) -> f64 {
        self.medium_ceiling
    }

    pub fn level_for(&self, volatility: f64) -> RiskLevel {
        if volatility < self.low_ceiling {
            RiskLevel::Low
        } else if volatility < self.medium_ceiling {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self::STRICT
    }
}

/// Relative high-low spread of the window, or `None` for an empty window.
pub fn volatility(window: &PriceWindow) -> Option<f64> {
    let mut prices = window.iter().map(|s| s.price);
    let first = prices.next()?;
    let (min, max) = prices.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p)));

    let mut mid = (min + max) / 2.0;
    if mid == 0.0 {
        mid = 1.0;
    }
    Some((max - min) / mid)
}

#[derive(Debug, Clone, Copy)]
pub struct RiskClassifier {
    thresholds: RiskThresholds,
    min_samples: usize,
}

impl RiskClassifier {
    pub fn new(thresholds: RiskThresholds, min_samples: usize) -> Self {
        Self {
            thresholds,
            min_samples,
        }
    }

    /// Classifies the window, keeping `previous` while there is not enough data.
    pub fn classify(&self, window: &PriceWindow, previous: RiskLevel) -> RiskLevel {
        if window.is_empty() || window.len() < self.min_samples {
            return previous;
        }
        match volatility(window) {
            Some(v) => self.thresholds.level_for(v),
            None => previous,
        }
    }
}

impl Default for RiskClassifier {
    fn default() -> Self {
        Self::new(RiskThresholds::STRICT, DEFAULT_MIN_SAMPLES)
    }
}
