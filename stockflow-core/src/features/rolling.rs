//! Trailing simple moving average with a minimum of one observation.
//!
//! The window at index `i` is `[i + 1 - window, i]` clipped at the start of the
//! series. Missing values inside the window are skipped; the mean is `None`
//! only when the whole window is missing. A fully present series therefore
//! has a value at every index, the first one included.

pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut result = vec![None; n];
    if window == 0 {
        return result;
    }

    let mut acc = WindowSum::default();
    for i in 0..n {
        if let Some(entering) = values[i] {
            acc.add(entering);
        }
        if i >= window {
            if let Some(leaving) = values[i - window] {
                acc.remove(leaving);
            }
        }
        result[i] = acc.mean();
    }

    result
}

/// Compensated running sum over the present values of a sliding window.
///
/// Also tracks the run of identical values most recently added: when that run
/// covers every value in the window, the mean is that value exactly.
#[derive(Debug, Default)]
struct WindowSum {
    sum: f64,
    compensation: f64,
    count: usize,
    last: Option<f64>,
    same_run: usize,
}

impl WindowSum {
    fn add(&mut self, value: f64) {
        self.count += 1;
        self.accumulate(value);
        if self.last == Some(value) {
            self.same_run += 1;
        } else {
            self.last = Some(value);
            self.same_run = 1;
        }
    }

    fn remove(&mut self, value: f64) {
        self.count -= 1;
        self.accumulate(-value);
        if self.count == 0 {
            *self = Self::default();
        }
    }

    /// Kahan summation step.
    fn accumulate(&mut self, value: f64) {
        let y = value - self.compensation;
        let t = self.sum + y;
        self.compensation = (t - self.sum) - y;
        self.sum = t;
    }

    fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        match self.last {
            Some(value) if self.same_run >= self.count => Some(value),
            _ => Some(self.sum / self.count as f64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{assert_approx, present, DEFAULT_EPSILON};

    #[test]
    fn window_2_from_first_row() {
        let r = rolling_mean(&present(&[1.0, 2.0, 3.0, 4.0, 5.0]), 2);
        assert_eq!(r, present(&[1.0, 1.5, 2.5, 3.5, 4.5]));
    }

    #[test]
    fn window_5_partial_then_full() {
        let r = rolling_mean(&present(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0]), 5);
        assert_approx(r[0].unwrap(), 10.0, DEFAULT_EPSILON);
        assert_approx(r[1].unwrap(), 10.5, DEFAULT_EPSILON);
        assert_approx(r[4].unwrap(), 12.0, DEFAULT_EPSILON);
        assert_approx(r[5].unwrap(), 13.0, DEFAULT_EPSILON);
        assert_approx(r[6].unwrap(), 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn window_1_is_identity() {
        let r = rolling_mean(&present(&[100.0, 200.0, 300.0]), 1);
        assert_eq!(r, present(&[100.0, 200.0, 300.0]));
    }

    #[test]
    fn window_longer_than_series() {
        let r = rolling_mean(&present(&[2.0, 4.0]), 30);
        assert_eq!(r, present(&[2.0, 3.0]));
    }

    #[test]
    fn missing_values_are_skipped() {
        let r = rolling_mean(&[Some(10.0), None, Some(14.0), Some(16.0)], 3);
        assert_eq!(r[0], Some(10.0));
        assert_eq!(r[1], Some(10.0));
        assert_eq!(r[2], Some(12.0));
        assert_eq!(r[3], Some(15.0));
    }

    #[test]
    fn constant_window_is_exact() {
        let r = rolling_mean(&[Some(0.1); 10], 3);
        assert!(r.iter().all(|v| *v == Some(0.1)));
    }

    #[test]
    fn run_after_a_step_settles_on_the_repeated_value() {
        let mut values = vec![Some(0.7)];
        values.extend(std::iter::repeat(Some(0.1)).take(40));
        let r = rolling_mean(&values, 3);
        assert_approx(r[1].unwrap(), 0.4, DEFAULT_EPSILON);
        assert!(r[3..].iter().all(|v| *v == Some(0.1)));
    }

    #[test]
    fn constant_run_across_a_gap_is_exact() {
        let r = rolling_mean(&[Some(0.3), None, Some(0.3), Some(0.3)], 3);
        assert_eq!(r, vec![Some(0.3); 4]);
    }

    #[test]
    fn all_missing_window_is_none() {
        let r = rolling_mean(&[None, None, Some(4.0), None, None, None], 2);
        assert_eq!(r, vec![None, None, Some(4.0), Some(4.0), None, None]);
    }
}
