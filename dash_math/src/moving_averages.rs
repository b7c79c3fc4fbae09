//! Trailing moving averages
//!
//! Contains:
//! - Simple Moving Average (SMA) that accepts values one at a time
//! - `rolling_mean`, the batch form with minimum-period-1 semantics

use crate::{MathError, Result};
use std::collections::VecDeque;

/// Simple Moving Average (SMA) implementation
///
/// Unlike a strict SMA, `value` is available as soon as one value has been
/// seen: until the window fills it averages everything seen so far.
#[derive(Debug, Clone)]
pub struct SimpleMovingAverage {
    period: usize,
    values: VecDeque<f64>,
    sum: f64,
}

impl SimpleMovingAverage {
    /// Create a new Simple Moving Average with the specified period
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(MathError::InvalidInput(
                "Period must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            period,
            values: VecDeque::with_capacity(period),
            sum: 0.0,
        })
    }

    /// Update the SMA with a new value
    pub fn update(&mut self, value: f64) {
        self.values.push_back(value);
        self.sum += value;

        // Remove oldest value if we have more than period values
        if self.values.len() > self.period {
            if let Some(old_value) = self.values.pop_front() {
                self.sum -= old_value;
            }
        }
    }

    /// Get the current SMA value
    pub fn value(&self) -> Result<f64> {
        if self.values.is_empty() {
            return Err(MathError::InsufficientData(
                "No values seen yet for SMA calculation".to_string(),
            ));
        }

        Ok(self.sum / self.values.len() as f64)
    }

    /// Number of values currently inside the window
    pub fn filled(&self) -> usize {
        self.values.len()
    }

    /// Get the current period
    pub fn period(&self) -> usize {
        self.period
    }

    /// Reset the SMA, clearing all values
    pub fn reset(&mut self) {
        self.values.clear();
        self.sum = 0.0;
    }
}

/// Trailing mean over `window` values with a minimum period of one.
///
/// Position `i` averages indices `max(0, i - window + 1)..=i`, so the output
/// has the same length as the input and position 0 equals `values[0]`.
pub fn rolling_mean(values: &[f64], window: usize) -> Result<Vec<f64>> {
    let mut sma = SimpleMovingAverage::new(window)?;
    let mut out = Vec::with_capacity(values.len());

    for &value in values {
        sma.update(value);
        out.push(sma.value()?);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zero_period_rejected() {
        assert!(SimpleMovingAverage::new(0).is_err());
        assert!(rolling_mean(&[1.0], 0).is_err());
    }

    #[test]
    fn test_partial_window_averages_what_is_seen() {
        let out = rolling_mean(&[2.0, 4.0, 6.0, 8.0], 3).unwrap();
        assert_relative_eq!(out[0], 2.0);
        assert_relative_eq!(out[1], 3.0);
        assert_relative_eq!(out[2], 4.0);
        assert_relative_eq!(out[3], 6.0);
    }

    #[test]
    fn test_window_counts_exactly_min_i_plus_one_w() {
        let values: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        let out = rolling_mean(&values, 4).unwrap();
        for (i, avg) in out.iter().enumerate() {
            let start = (i + 1).saturating_sub(4);
            let expected = values[start..=i].iter().sum::<f64>() / (i + 1 - start) as f64;
            assert_relative_eq!(*avg, expected);
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(rolling_mean(&[], 7).unwrap().is_empty());
    }

    #[test]
    fn test_reset() {
        let mut sma = SimpleMovingAverage::new(2).unwrap();
        sma.update(10.0);
        assert_eq!(sma.filled(), 1);
        sma.reset();
        assert!(sma.value().is_err());
    }
}
