//! Descriptive statistics over plain `f64` slices.
//!
//! Callers strip nulls before calling.

use serde::Serialize;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Sample variance (n - 1 denominator); needs at least two values.
pub fn variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some(ss / (values.len() - 1) as f64)
}

/// Sample standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    variance(values).map(f64::sqrt)
}

pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

/// Percent change from `base` to `value`; `None` when the base is zero.
pub fn percent_change(base: f64, value: f64) -> Option<f64> {
    if base == 0.0 {
        None
    } else {
        Some((value - base) / base.abs() * 100.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    /// Absent for a single value.
    pub std_dev: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub range: f64,
}

impl Summary {
    pub fn of(values: &[f64]) -> Option<Self> {
        let (min, max) = (min(values)?, max(values)?);
        Some(Self {
            count: values.len(),
            mean: mean(values)?,
            median: median(values)?,
            std_dev: std_dev(values),
            min,
            max,
            range: max - min,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_stats() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&values), Some(5.0));
        assert_eq!(median(&values), Some(4.5));
        let sd = std_dev(&values).unwrap();
        assert!((sd - 2.138089935299395).abs() < 1e-12);
        assert_eq!(min(&values), Some(2.0));
        assert_eq!(max(&values), Some(9.0));
    }

    #[test]
    fn test_odd_median_and_empty() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(mean(&[]), None);
        assert_eq!(std_dev(&[1.0]), None);
        assert!(Summary::of(&[]).is_none());
    }

    #[test]
    fn test_percent_change() {
        assert_eq!(percent_change(10.0, 20.0), Some(100.0));
        assert_eq!(percent_change(-10.0, -5.0), Some(50.0));
        assert_eq!(percent_change(0.0, 5.0), None);
    }
}
