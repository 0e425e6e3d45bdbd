//! Trend analysis over a single metric in row order.

use super::dataset::{Dataset, Value};
use super::descriptive::{max, mean, min, percent_change, std_dev};
use super::inference::linear_regression;
use super::{ensure_finite, fmt_num, fmt_signed_pct, metric_column, DataQuality, StatParams};
use crate::config::StatsConfig;
use crate::error::StatsError;
use serde::Serialize;
use std::collections::BTreeMap;

/// Columns copied onto best and worst points when present.
const CONTEXT_COLUMNS: [&str; 4] = ["season", "round", "match_date", "opponent"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Direction {
    pub classification: TrendDirection,
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MomentumState {
    Hot,
    Cold,
    Neutral,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Momentum {
    pub classification: MomentumState,
    pub window: usize,
    pub recent_avg: Option<f64>,
    pub historical_avg: f64,
    pub percent_difference: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollingAverage {
    pub window: usize,
    pub current: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtremePoint {
    /// Row index in the dataset.
    pub row: usize,
    pub value: f64,
    pub context: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    VeryConsistent,
    Consistent,
    Moderate,
    Inconsistent,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Volatility {
    pub coefficient_of_variation: Option<f64>,
    pub std_dev: f64,
    pub classification: Consistency,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    pub overall_percent: f64,
    /// Last window against the window before it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_percent: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendResult {
    pub metric: String,
    pub direction: Direction,
    pub momentum: Momentum,
    pub rolling_averages: Vec<RollingAverage>,
    pub best: ExtremePoint,
    pub worst: ExtremePoint,
    pub volatility: Volatility,
    pub change: Change,
    pub confidence: Confidence,
    pub data_quality: DataQuality,
}

impl TrendResult {
    pub fn summary(&self) -> String {
        let direction = match self.direction.classification {
            TrendDirection::Improving => "improving",
            TrendDirection::Declining => "declining",
            TrendDirection::Stable => "stable",
        };
        let mut line = format!(
            "{} is {} over {} points ({} overall",
            self.metric,
            direction,
            self.data_quality.sample_size,
            fmt_signed_pct(self.change.overall_percent)
        );
        if let Some(recent) = self.change.recent_percent {
            line.push_str(&format!(", {} recently", fmt_signed_pct(recent)));
        }
        line.push(')');
        match self.momentum.classification {
            MomentumState::Hot => line.push_str("; running hot"),
            MomentumState::Cold => line.push_str("; running cold"),
            _ => {}
        }
        line.push_str(&format!(
            "; best {} at row {}, worst {} at row {}",
            fmt_num(self.best.value),
            self.best.row,
            fmt_num(self.worst.value),
            self.worst.row
        ));
        line
    }
}

pub(crate) fn compute(dataset: &Dataset, params: &StatParams, config: &StatsConfig) -> Result<TrendResult, StatsError> {
    let metric = metric_column(dataset, params)?;
    let series = dataset.series(metric);
    let values: Vec<f64> = series.iter().map(|(_, v)| *v).collect();
    let n = values.len();
    let needed = config.min_trend_points.max(3);
    if n < needed {
        return Err(StatsError::InsufficientData { needed, found: n });
    }

    let insufficient = || StatsError::InsufficientData { needed, found: n };
    let overall_mean = ensure_finite(mean(&values).ok_or_else(insufficient)?, "mean")?;
    let fit = linear_regression(&values).ok_or_else(insufficient)?;
    ensure_finite(fit.slope, "slope")?;

    let flat = fit.slope.abs() < config.stable_slope_pct / 100.0 * overall_mean.abs();
    let classification = if fit.p_value >= config.significance_level || flat {
        TrendDirection::Stable
    } else if fit.slope > 0.0 {
        TrendDirection::Improving
    } else {
        TrendDirection::Declining
    };

    let window = params.window.unwrap_or(config.momentum_window);
    let momentum = momentum(&values, window, overall_mean, config);

    let rolling_averages = config
        .rolling_windows
        .iter()
        .filter(|&&w| w > 0 && w <= n)
        .filter_map(|&w| {
            let means: Vec<f64> = values.windows(w).filter_map(mean).collect();
            Some(RollingAverage {
                window: w,
                current: *means.last()?,
                min: min(&means)?,
                max: max(&means)?,
            })
        })
        .collect();

    let (best_pos, worst_pos) = extreme_positions(&values).ok_or_else(insufficient)?;
    let best = extreme_point(dataset, series[best_pos]);
    let worst = extreme_point(dataset, series[worst_pos]);

    let sd = std_dev(&values).ok_or_else(insufficient)?;
    let cv = (overall_mean != 0.0).then(|| sd / overall_mean.abs() * 100.0);
    let volatility = Volatility {
        coefficient_of_variation: cv,
        std_dev: sd,
        classification: match cv {
            None => Consistency::Unknown,
            Some(cv) if cv < 10.0 => Consistency::VeryConsistent,
            Some(cv) if cv < 20.0 => Consistency::Consistent,
            Some(cv) if cv < 30.0 => Consistency::Moderate,
            Some(_) => Consistency::Inconsistent,
        },
    };

    let change = Change {
        overall_percent: percent_change(values[0], values[n - 1]).unwrap_or(0.0),
        recent_percent: recent_change(&values, window),
    };

    let confidence = if n >= config.high_confidence_points {
        Confidence::High
    } else if n >= config.medium_confidence_points {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    Ok(TrendResult {
        metric: dataset.columns()[metric].clone(),
        direction: Direction {
            classification,
            slope: fit.slope,
            intercept: fit.intercept,
            r_squared: fit.r_squared,
            p_value: fit.p_value,
        },
        momentum,
        rolling_averages,
        best,
        worst,
        volatility,
        change,
        confidence,
        data_quality: DataQuality::assess(n, dataset.null_count(metric), config),
    })
}

fn momentum(values: &[f64], window: usize, overall_mean: f64, config: &StatsConfig) -> Momentum {
    let recent_avg = (window > 0 && values.len() >= window)
        .then(|| mean(&values[values.len() - window..]))
        .flatten();
    let percent_difference = recent_avg.and_then(|recent| percent_change(overall_mean, recent));
    let threshold = config.momentum_threshold_pct;
    let classification = match percent_difference {
        None => MomentumState::Unknown,
        Some(pct) if pct > threshold => MomentumState::Hot,
        Some(pct) if pct < -threshold => MomentumState::Cold,
        Some(_) => MomentumState::Neutral,
    };
    Momentum {
        classification,
        window,
        recent_avg,
        historical_avg: overall_mean,
        percent_difference,
    }
}

fn recent_change(values: &[f64], window: usize) -> Option<f64> {
    let n = values.len();
    if window == 0 || n < 2 * window {
        return None;
    }
    let previous = mean(&values[n - 2 * window..n - window])?;
    let recent = mean(&values[n - window..])?;
    percent_change(previous, recent)
}

/// Positions of the first maximum and the first minimum.
fn extreme_positions(values: &[f64]) -> Option<(usize, usize)> {
    let first = *values.first()?;
    let (mut best, mut worst) = ((0, first), (0, first));
    for (pos, &v) in values.iter().enumerate().skip(1) {
        if v > best.1 {
            best = (pos, v);
        }
        if v < worst.1 {
            worst = (pos, v);
        }
    }
    Some((best.0, worst.0))
}

fn extreme_point(dataset: &Dataset, (row, value): (usize, f64)) -> ExtremePoint {
    let context = CONTEXT_COLUMNS
        .iter()
        .filter_map(|name| {
            let col = dataset.column_index(name)?;
            let v = dataset.value(row, col);
            (!v.is_null()).then(|| (name.to_string(), v.clone()))
        })
        .collect();
    ExtremePoint { row, value, context }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn series(values: &[f64]) -> Dataset {
        let rows = values
            .iter()
            .enumerate()
            .map(|(i, v)| json!({"round": i + 1, "disposals": v}))
            .collect::<Vec<_>>();
        Dataset::from_json_rows(&serde_json::Value::Array(rows)).unwrap()
    }

    fn run(values: &[f64]) -> Result<TrendResult, StatsError> {
        compute(&series(values), &StatParams::default(), &StatsConfig::default())
    }

    #[test]
    fn test_linear_improvement() {
        let result = run(&[10.0, 12.0, 14.0, 16.0, 18.0, 20.0]).unwrap();
        assert_eq!(result.metric, "disposals");
        assert_eq!(result.direction.classification, TrendDirection::Improving);
        assert!(result.direction.p_value < 0.05);
        assert!((result.change.overall_percent - 100.0).abs() < 1e-9);
        assert_eq!(result.best.row, 5);
        assert_eq!(result.worst.row, 0);
        assert_eq!(result.best.context.get("round"), Some(&Value::Number(6.0)));
        assert_eq!(result.confidence, Confidence::Low);
    }

    #[test]
    fn test_declining_and_flat() {
        let down = run(&[30.0, 27.0, 24.0, 21.0, 18.0]).unwrap();
        assert_eq!(down.direction.classification, TrendDirection::Declining);

        let flat = run(&[20.0, 20.0, 20.0, 20.0]).unwrap();
        assert_eq!(flat.direction.classification, TrendDirection::Stable);
        assert_eq!(flat.volatility.classification, Consistency::VeryConsistent);
    }

    #[test]
    fn test_too_few_points() {
        assert_eq!(
            run(&[1.0, 2.0]),
            Err(StatsError::InsufficientData { needed: 3, found: 2 })
        );
    }

    #[test]
    fn test_momentum_windows() {
        // overall mean 14, last five average 16.4
        let values = [10.0, 10.0, 10.0, 12.0, 14.0, 16.0, 18.0, 22.0];
        let result = run(&values).unwrap();
        assert_eq!(result.momentum.classification, MomentumState::Hot);
        assert_eq!(result.momentum.recent_avg, Some(16.4));
        assert_eq!(result.change.recent_percent, None);

        let short = run(&[10.0, 11.0, 12.0]).unwrap();
        assert_eq!(short.momentum.classification, MomentumState::Unknown);
        assert_eq!(short.momentum.recent_avg, None);
    }

    #[test]
    fn test_recent_change_needs_two_windows() {
        let mut values = vec![10.0; 5];
        values.extend([15.0; 5]);
        let result = run(&values).unwrap();
        assert_eq!(result.change.recent_percent, Some(50.0));
        let json = serde_json::to_value(&run(&values[..9]).unwrap()).unwrap();
        assert!(json["change"].get("recent_percent").is_none());
    }

    #[test]
    fn test_rolling_averages_trailing() {
        let result = run(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let windows: Vec<usize> = result.rolling_averages.iter().map(|r| r.window).collect();
        assert_eq!(windows, vec![3, 5]);
        let three = &result.rolling_averages[0];
        assert_eq!((three.current, three.min, three.max), (4.0, 2.0, 4.0));
    }

    #[test]
    fn test_zero_mean_volatility_unknown() {
        let result = run(&[-2.0, 2.0, -2.0, 2.0]).unwrap();
        assert_eq!(result.volatility.classification, Consistency::Unknown);
        assert_eq!(result.volatility.coefficient_of_variation, None);
    }

    #[test]
    fn test_zero_start_change_is_zero() {
        let result = run(&[0.0, 5.0, 10.0]).unwrap();
        assert_eq!(result.change.overall_percent, 0.0);
    }
}
