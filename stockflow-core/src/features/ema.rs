//! Exponential Moving Average (EMA).
//!
//! Recursive, non-adjusted: EMA[t] = alpha * x[t] + (1 - alpha) * EMA[t-1]
//! with alpha = 2 / (span + 1).
//! Seed: EMA equals the first present observation (no SMA warm-up), so the
//! first row of a fully present series is the close itself.

/// Compute the EMA of a series with gaps.
///
/// Positions before the first observation are `None`. A missing observation
/// after the seed repeats the previous EMA, and the recursion picks up again
/// at the next present value. An observation equal to the current EMA leaves it
/// unchanged exactly.
pub fn ema_of_series(values: &[Option<f64>], span: usize) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());
    if span == 0 {
        result.resize(values.len(), None);
        return result;
    }

    let alpha = 2.0 / (span as f64 + 1.0);
    let mut prev: Option<f64> = None;
    for &value in values {
        prev = match (prev, value) {
            (None, v) => v,
            (Some(p), Some(x)) if x == p => Some(p),
            (Some(p), Some(x)) => Some(alpha * x + (1.0 - alpha) * p),
            (Some(p), None) => Some(p),
        };
        result.push(prev);
    }

    result
}
