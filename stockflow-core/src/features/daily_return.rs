//! Daily return.
//!
//! `(close[t] - close[t-1]) / close[t-1]`; the first observation has no prior
//! and is `None`, as is any step where either side is missing. A zero prior
//! close follows IEEE division (infinite or NaN), it is not special-cased.

pub fn pct_change(closes: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(closes.len());
    if !closes.is_empty() {
        result.push(None);
    }
    for pair in closes.windows(2) {
        result.push(match (pair[0], pair[1]) {
            (Some(prev), Some(cur)) => Some((cur - prev) / prev),
            _ => None,
        });
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{assert_approx, present, DEFAULT_EPSILON};

    #[test]
    fn first_is_none_then_relative_change() {
        let r = pct_change(&present(&[1.0, 2.0, 3.0, 4.0, 5.0]));
        assert_eq!(r.len(), 5);
        assert_eq!(r[0], None);
        assert_eq!(r[1], Some(1.0));
        assert_approx(r[2].unwrap(), 0.5, DEFAULT_EPSILON);
        assert_approx(r[4].unwrap(), 0.25, DEFAULT_EPSILON);
    }

    #[test]
    fn missing_operand_gives_none() {
        let r = pct_change(&[Some(10.0), None, Some(12.0), Some(6.0)]);
        assert_eq!(r, vec![None, None, None, Some(-0.5)]);
    }

    #[test]
    fn empty_and_single() {
        assert!(pct_change(&[]).is_empty());
        assert_eq!(pct_change(&[Some(3.0)]), vec![None]);
    }

    #[test]
    fn zero_prior_close_is_not_special_cased() {
        let r = pct_change(&[Some(0.0), Some(1.0)]);
        assert!(r[1].unwrap().is_infinite());
    }
}
