//! Moving-average crossover regime.

use std::cmp::Ordering;

/// Sign of `roll - ema`: `1` above, `-1` below, `0` when equal.
///
/// Exact comparison, no tolerance. A missing side, or a NaN on either side,
/// yields `0`.
pub fn crossover(roll: Option<f64>, ema: Option<f64>) -> i8 {
    match (roll, ema) {
        (Some(r), Some(e)) => match r.partial_cmp(&e) {
            Some(Ordering::Greater) => 1,
            Some(Ordering::Less) => -1,
            _ => 0,
        },
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_of_difference() {
        assert_eq!(crossover(Some(2.0), Some(1.0)), 1);
        assert_eq!(crossover(Some(1.0), Some(2.0)), -1);
        assert_eq!(crossover(Some(1.5), Some(1.5)), 0);
    }

    #[test]
    fn exact_comparison() {
        assert_eq!(crossover(Some(1.0 + f64::EPSILON), Some(1.0)), 1);
    }

    #[test]
    fn missing_or_nan_is_flat() {
        assert_eq!(crossover(None, Some(1.0)), 0);
        assert_eq!(crossover(Some(1.0), None), 0);
        assert_eq!(crossover(Some(f64::NAN), Some(1.0)), 0);
    }
}
