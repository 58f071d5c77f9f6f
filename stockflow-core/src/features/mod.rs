//! Per-ticker derived features.
//!
//! Every function here is a pure transform over one ticker's `Close` series in
//! ascending date order, with `None` for a missing observation. The panel
//! gathers each ticker group, calls these, and scatters the results back into
//! row order.

pub mod crossover;
pub mod daily_return;
pub mod ema;
pub mod rolling;

pub use crossover::crossover;
pub use daily_return::pct_change;
pub use ema::ema_of_series;
pub use rolling::rolling_mean;

use serde::{Deserialize, Serialize};

use crate::error::EtlError;

pub const DEFAULT_ROLL_WINDOW: usize = 30;
pub const DEFAULT_EMA_SPAN: usize = 14;

pub const DAILY_RETURN_COLUMN: &str = "DailyReturn";
pub const CROSSOVER_COLUMN: &str = "Crossover";

/// Name of the rolling average column for window `n`.
pub fn roll_avg_column(window: usize) -> String {
    format!("RollAvg{window}Days")
}

/// Name of the EMA column for span `s`.
pub fn ema_column(span: usize) -> String {
    format!("EMA{span}")
}

/// Window and span used by one transform run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformParams {
    pub roll_window: usize,
    pub ema_span: usize,
}

impl TransformParams {
    pub fn new(roll_window: usize, ema_span: usize) -> Result<Self, EtlError> {
        if roll_window == 0 {
            return Err(EtlError::InvalidParameter(
                "rolling window must be >= 1".into(),
            ));
        }
        if ema_span == 0 {
            return Err(EtlError::InvalidParameter("EMA span must be >= 1".into()));
        }
        Ok(Self {
            roll_window,
            ema_span,
        })
    }

    pub fn roll_avg_column(&self) -> String {
        roll_avg_column(self.roll_window)
    }

    pub fn ema_column(&self) -> String {
        ema_column(self.ema_span)
    }
}

impl Default for TransformParams {
    fn default() -> Self {
        Self {
            roll_window: DEFAULT_ROLL_WINDOW,
            ema_span: DEFAULT_EMA_SPAN,
        }
    }
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for feature tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

/// Wrap plain closes as a fully present series.
#[cfg(test)]
pub fn present(values: &[f64]) -> Vec<Option<f64>> {
    values.iter().copied().map(Some).collect()
}
