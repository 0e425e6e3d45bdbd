//! Ranking with percentiles and gaps.
//!
//! Gaps are always measured toward "better": with the default descending
//! order a higher value is better, with `ascending` a lower one is.

use super::dataset::Dataset;
use super::descriptive::{mean, Summary};
use super::{fmt_num, group_column, group_rows, metric_column, values_for, DataQuality, StatParams};
use crate::config::StatsConfig;
use crate::error::StatsError;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedItem {
    pub rank: usize,
    pub entity: String,
    pub value: f64,
    /// Samples behind an aggregated value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    pub percentile: f64,
    pub gap_to_leader: f64,
    pub gap_to_previous: Option<f64>,
    pub gap_to_next: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankResult {
    pub metric: String,
    pub group_by: Option<String>,
    pub ascending: bool,
    pub total: usize,
    pub rankings: Vec<RankedItem>,
    pub top_3: Vec<RankedItem>,
    /// Worst first.
    pub bottom_3: Vec<RankedItem>,
    pub statistics: Summary,
    pub data_quality: DataQuality,
}

impl RankResult {
    pub fn leader(&self) -> Option<&RankedItem> {
        self.rankings.first()
    }

    pub fn position_of(&self, entity: &str) -> Option<&RankedItem> {
        self.rankings.iter().find(|r| r.entity == entity)
    }

    pub fn summary(&self) -> String {
        let Some(leader) = self.rankings.first() else {
            return format!("No values to rank for {}", self.metric);
        };
        let mut line = format!(
            "{} ranks first on {} with {}",
            leader.entity,
            self.metric,
            fmt_num(leader.value)
        );
        if let Some(second) = self.rankings.get(1) {
            line.push_str(&format!(
                ", {} ahead of {}",
                fmt_num(second.gap_to_leader),
                second.entity
            ));
        }
        if self.rankings.len() > 2 {
            if let Some(last) = self.rankings.last() {
                line.push_str(&format!(
                    "; {} trails with {}",
                    last.entity,
                    fmt_num(last.value)
                ));
            }
        }
        line
    }
}

pub(crate) fn compute(dataset: &Dataset, params: &StatParams, config: &StatsConfig) -> Result<RankResult, StatsError> {
    let metric = metric_column(dataset, params)?;
    let group_col = group_column(dataset, params)?.filter(|&c| c != metric);

    let mut missing_values = 0;
    let mut single_samples = Vec::new();
    let mut sample_size = 0;
    let entries: Vec<(String, f64, Option<usize>)> = match group_col {
        Some(col) => group_rows(dataset, col)
            .into_iter()
            .filter_map(|(entity, rows)| {
                let values = values_for(dataset, &rows, metric);
                missing_values += rows.len() - values.len();
                sample_size += values.len();
                if values.len() == 1 {
                    single_samples.push(entity.clone());
                }
                mean(&values).map(|m| (entity, m, Some(values.len())))
            })
            .collect(),
        None => {
            missing_values = dataset.null_count(metric);
            let series = dataset.series(metric);
            sample_size = series.len();
            series
                .into_iter()
                .map(|(row, v)| (format!("row {}", row + 1), v, None))
                .collect()
        }
    };

    if entries.is_empty() {
        return Err(StatsError::InsufficientData { needed: 1, found: 0 });
    }

    let mut sorted = entries;
    if params.ascending {
        sorted.sort_by(|a, b| a.1.total_cmp(&b.1));
    } else {
        sorted.sort_by(|a, b| b.1.total_cmp(&a.1));
    }

    // +1 when higher is better, -1 when lower is better
    let sign = if params.ascending { -1.0 } else { 1.0 };
    let n = sorted.len();
    let leader_value = sorted[0].1;
    let rankings: Vec<RankedItem> = sorted
        .iter()
        .enumerate()
        .map(|(idx, (entity, value, count))| {
            let rank = idx + 1;
            RankedItem {
                rank,
                entity: entity.clone(),
                value: *value,
                count: *count,
                percentile: percentile(rank, n),
                gap_to_leader: sign * (leader_value - value),
                gap_to_previous: idx.checked_sub(1).map(|p| sign * (sorted[p].1 - value)),
                gap_to_next: sorted.get(idx + 1).map(|next| sign * (value - next.1)),
            }
        })
        .collect();

    let values: Vec<f64> = rankings.iter().map(|r| r.value).collect();
    let statistics = Summary::of(&values).ok_or(StatsError::InsufficientData { needed: 1, found: 0 })?;

    let mut data_quality = DataQuality::assess(sample_size, missing_values, config);
    if !single_samples.is_empty() {
        data_quality.warnings.push(format!(
            "Only one sample for: {}",
            single_samples.join(", ")
        ));
    }

    Ok(RankResult {
        metric: dataset.columns()[metric].clone(),
        group_by: group_col.map(|c| dataset.columns()[c].clone()),
        ascending: params.ascending,
        total: n,
        top_3: rankings.iter().take(3).cloned().collect(),
        bottom_3: rankings.iter().rev().take(3).cloned().collect(),
        rankings,
        statistics,
        data_quality,
    })
}

/// (n - rank + 1) / n as a percentage, one decimal place.
fn percentile(rank: usize, n: usize) -> f64 {
    let raw = (n - rank + 1) as f64 / n as f64 * 100.0;
    (raw * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(rows: serde_json::Value, params: StatParams) -> Result<RankResult, StatsError> {
        let ds = Dataset::from_json_rows(&rows).unwrap();
        compute(&ds, &params, &StatsConfig::default())
    }

    fn abc() -> serde_json::Value {
        json!([
            {"team": "A", "score": 10},
            {"team": "B", "score": 20},
            {"team": "C", "score": 15},
        ])
    }

    #[test]
    fn test_descending_rank() {
        let result = run(abc(), StatParams::default()).unwrap();
        let order: Vec<&str> = result.rankings.iter().map(|r| r.entity.as_str()).collect();
        assert_eq!(order, vec!["B", "C", "A"]);
        assert_eq!(result.top_3[0].entity, "B");
        assert_eq!(result.top_3[0].percentile, 100.0);
        assert_eq!(result.rankings[1].percentile, 66.7);
        assert_eq!(result.rankings[2].percentile, 33.3);
        assert_eq!(result.rankings[2].gap_to_leader, 10.0);
        assert_eq!(result.rankings[1].gap_to_previous, Some(5.0));
        assert_eq!(result.rankings[1].gap_to_next, Some(5.0));
        assert_eq!(result.rankings[0].gap_to_previous, None);
        assert_eq!(result.bottom_3[0].entity, "A");
        assert_eq!(result.group_by.as_deref(), Some("team"));
        assert_eq!(result.summary(), "B ranks first on score with 20.00, 5.00 ahead of C; A trails with 10.00");
    }

    #[test]
    fn test_ascending_flips_gaps() {
        let params = StatParams {
            ascending: true,
            ..Default::default()
        };
        let result = run(abc(), params).unwrap();
        assert_eq!(result.leader().unwrap().entity, "A");
        let c = result.position_of("C").unwrap();
        assert_eq!(c.rank, 2);
        assert_eq!(c.gap_to_leader, 5.0);
        assert_eq!(c.gap_to_next, Some(5.0));
    }

    #[test]
    fn test_group_means_with_counts() {
        let result = run(
            json!([
                {"player": "X", "disposals": 20}, {"player": "Y", "disposals": 25},
                {"player": "X", "disposals": 30}, {"player": "Y", "disposals": null},
            ]),
            StatParams::default(),
        )
        .unwrap();
        assert_eq!(result.rankings[0].entity, "X");
        assert_eq!(result.rankings[0].value, 25.0);
        assert_eq!(result.rankings[0].count, Some(2));
        assert_eq!(result.data_quality.missing_values, 1);
        assert!(result.data_quality.warnings.iter().any(|w| w == "Only one sample for: Y"));
    }

    #[test]
    fn test_rows_ranked_without_group() {
        let result = run(json!([{"score": 3}, {"score": 9}]), StatParams::default()).unwrap();
        assert_eq!(result.group_by, None);
        assert_eq!(result.rankings[0].entity, "row 2");
        assert_eq!(result.rankings[0].count, None);
    }

    #[test]
    fn test_ties_are_stable() {
        let result = run(
            json!([{"team": "A", "v": 5}, {"team": "B", "v": 5}, {"team": "C", "v": 7}]),
            StatParams::default(),
        )
        .unwrap();
        let order: Vec<&str> = result.rankings.iter().map(|r| r.entity.as_str()).collect();
        assert_eq!(order, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_no_numeric_columns() {
        assert_eq!(
            run(json!([{"team": "A"}]), StatParams::default()),
            Err(StatsError::NoNumericColumns)
        );
    }
}
