//! Entity comparison: per-entity metric summaries, leaders and laggards,
//! and a significance test when exactly two entities are compared.

use super::dataset::Dataset;
use super::descriptive::{mean, median, percent_change, std_dev};
use super::inference::welch_t_test;
use super::{fmt_num, group_column, group_rows, metric_column, values_for, DataQuality, StatParams};
use crate::config::StatsConfig;
use crate::error::StatsError;
use itertools::Itertools;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityStats {
    pub entity: String,
    pub mean: f64,
    pub median: f64,
    pub std_dev: Option<f64>,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignificanceTier {
    High,
    Moderate,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Significance {
    pub test: &'static str,
    pub t_statistic: Option<f64>,
    pub degrees_of_freedom: f64,
    pub p_value: f64,
    pub tier: SignificanceTier,
    pub significant: bool,
    pub interpretation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairwiseDifference {
    pub first: String,
    pub second: String,
    /// first minus second
    pub difference: f64,
    /// Relative to the second entity; absent when its mean is zero.
    pub percent_difference: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricComparison {
    pub metric: String,
    pub entities: Vec<EntityStats>,
    pub leader: String,
    pub laggard: String,
    pub gap: f64,
    pub gap_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub significance: Option<Significance>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pairwise: Vec<PairwiseDifference>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricLeader {
    pub entity: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub group_by: String,
    pub entity_count: usize,
    pub entities: Vec<String>,
    pub metrics: Vec<MetricComparison>,
    pub leaders: BTreeMap<String, MetricLeader>,
    pub laggards: BTreeMap<String, MetricLeader>,
    pub data_quality: DataQuality,
}

impl ComparisonResult {
    pub fn metric(&self, name: &str) -> Option<&MetricComparison> {
        self.metrics.iter().find(|m| m.metric == name)
    }

    /// Entity leading the most metrics; earlier entities win ties.
    pub fn overall_leader(&self) -> Option<(&str, usize)> {
        let mut best: Option<(&str, usize)> = None;
        for entity in &self.entities {
            let wins = self.metrics.iter().filter(|m| &m.leader == entity).count();
            if best.map_or(true, |(_, most)| wins > most) {
                best = Some((entity.as_str(), wins));
            }
        }
        best
    }

    pub fn summary(&self) -> String {
        let mut line = match self.overall_leader() {
            Some((entity, wins)) => format!(
                "{} leads {} of {} metric{} across {} entities",
                entity,
                wins,
                self.metrics.len(),
                if self.metrics.len() == 1 { "" } else { "s" },
                self.entity_count
            ),
            None => format!("Compared {} entities", self.entity_count),
        };
        if let Some(first) = self.metrics.first() {
            line.push_str(&format!(
                "; {}: {} {} vs {} {}",
                first.metric,
                first.leader,
                fmt_num(entity_mean(first, &first.leader)),
                first.laggard,
                fmt_num(entity_mean(first, &first.laggard))
            ));
        }
        let significant = self
            .metrics
            .iter()
            .find_map(|m| m.significance.as_ref().filter(|s| s.significant).map(|s| (m, s)));
        if let Some((m, s)) = significant {
            line.push_str(&format!(
                "; the {} difference is significant (p={:.4})",
                m.metric, s.p_value
            ));
        }
        line
    }
}

fn entity_mean(metric: &MetricComparison, entity: &str) -> f64 {
    metric
        .entities
        .iter()
        .find(|e| e.entity == entity)
        .map_or(0.0, |e| e.mean)
}

pub(crate) fn compute(dataset: &Dataset, params: &StatParams, config: &StatsConfig) -> Result<ComparisonResult, StatsError> {
    let group_col = group_column(dataset, params)?.ok_or(StatsError::NoGroupColumn)?;
    let groups = group_rows(dataset, group_col);
    if groups.len() < 2 {
        return Err(StatsError::TooFewEntities(groups.len()));
    }

    let metric_cols: Vec<usize> = match &params.metric {
        Some(_) => vec![metric_column(dataset, params)?],
        None => dataset
            .numeric_columns()
            .into_iter()
            .filter(|&c| c != group_col)
            .collect(),
    };
    if metric_cols.is_empty() {
        return Err(StatsError::NoNumericColumns);
    }

    let mut metrics = Vec::new();
    let mut missing_values = 0;
    for &col in &metric_cols {
        let metric = dataset.columns()[col].clone();
        let mut entities = Vec::new();
        let mut samples = Vec::new();
        for (entity, rows) in &groups {
            let values = values_for(dataset, rows, col);
            missing_values += rows.len() - values.len();
            let (Some(m), Some(med)) = (mean(&values), median(&values)) else {
                continue;
            };
            entities.push(EntityStats {
                entity: entity.clone(),
                mean: m,
                median: med,
                std_dev: std_dev(&values),
                count: values.len(),
            });
            samples.push(values);
        }
        if entities.len() < 2 {
            continue;
        }
        metrics.push(compare_metric(metric, entities, &samples, groups.len(), config));
    }
    if metrics.is_empty() {
        return Err(StatsError::TooFewEntities(1));
    }

    let pick = |m: &MetricComparison, entity: &str| MetricLeader {
        entity: entity.to_string(),
        value: entity_mean(m, entity),
    };
    let leaders = metrics
        .iter()
        .map(|m| (m.metric.clone(), pick(m, &m.leader)))
        .collect();
    let laggards = metrics
        .iter()
        .map(|m| (m.metric.clone(), pick(m, &m.laggard)))
        .collect();

    let sample_size: usize = groups.iter().map(|(_, rows)| rows.len()).sum();
    let mut data_quality = DataQuality::assess(sample_size, missing_values, config);
    let single: Vec<&str> = groups
        .iter()
        .filter(|(_, rows)| rows.len() == 1)
        .map(|(entity, _)| entity.as_str())
        .collect();
    if !single.is_empty() {
        data_quality.warnings.push(format!(
            "Only one sample for: {}",
            single.join(", ")
        ));
    }

    Ok(ComparisonResult {
        group_by: dataset.columns()[group_col].clone(),
        entity_count: groups.len(),
        entities: groups.into_iter().map(|(entity, _)| entity).collect(),
        metrics,
        leaders,
        laggards,
        data_quality,
    })
}

/// Head-to-head comparisons (exactly two groups) get a significance test;
/// larger comparisons get pairwise differences between the entities that
/// have values for `metric`, even when only two of them do.
fn compare_metric(
    metric: String,
    entities: Vec<EntityStats>,
    samples: &[Vec<f64>],
    group_count: usize,
    config: &StatsConfig,
) -> MetricComparison {
    let mut leader = &entities[0];
    let mut laggard = &entities[0];
    for e in &entities[1..] {
        if e.mean > leader.mean {
            leader = e;
        }
        if e.mean < laggard.mean {
            laggard = e;
        }
    }
    let gap = leader.mean - laggard.mean;
    let gap_percent = percent_change(laggard.mean, leader.mean);

    let significance = if group_count == 2 {
        significance(&metric, &entities[0].entity, &entities[1].entity, &samples[0], &samples[1], config)
    } else {
        None
    };

    let pairwise = if group_count > 2 {
        entities
            .iter()
            .tuple_combinations()
            .map(|(a, b)| PairwiseDifference {
                first: a.entity.clone(),
                second: b.entity.clone(),
                difference: a.mean - b.mean,
                percent_difference: percent_change(b.mean, a.mean),
            })
            .collect()
    } else {
        Vec::new()
    };

    MetricComparison {
        leader: leader.entity.clone(),
        laggard: laggard.entity.clone(),
        metric,
        gap,
        gap_percent,
        significance,
        pairwise,
        entities,
    }
}

fn significance(metric: &str, a: &str, b: &str, sample_a: &[f64], sample_b: &[f64], config: &StatsConfig) -> Option<Significance> {
    let test = welch_t_test(sample_a, sample_b)?;
    let tier = if test.p_value < config.high_significance_level {
        SignificanceTier::High
    } else if test.p_value < config.significance_level {
        SignificanceTier::Moderate
    } else {
        SignificanceTier::Low
    };
    let interpretation = match tier {
        SignificanceTier::High => format!(
            "The {} difference between {} and {} is highly significant",
            metric, a, b
        ),
        SignificanceTier::Moderate => format!(
            "The {} difference between {} and {} is statistically significant",
            metric, a, b
        ),
        SignificanceTier::Low => format!(
            "The {} difference between {} and {} is not statistically significant and may be due to chance",
            metric, a, b
        ),
    };
    Some(Significance {
        test: "welch_t_test",
        t_statistic: test.t_statistic,
        degrees_of_freedom: test.degrees_of_freedom,
        p_value: test.p_value,
        tier,
        significant: tier != SignificanceTier::Low,
        interpretation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(rows: serde_json::Value, params: StatParams) -> Result<ComparisonResult, StatsError> {
        let ds = Dataset::from_json_rows(&rows).unwrap();
        compute(&ds, &params, &StatsConfig::default())
    }

    #[test]
    fn test_two_entities_with_significance() {
        let result = run(
            json!([
                {"team": "Geelong", "score": 1}, {"team": "Carlton", "score": 6},
                {"team": "Geelong", "score": 2}, {"team": "Carlton", "score": 7},
                {"team": "Geelong", "score": 3}, {"team": "Carlton", "score": 8},
                {"team": "Geelong", "score": 4}, {"team": "Carlton", "score": 9},
                {"team": "Geelong", "score": 5}, {"team": "Carlton", "score": 10},
            ]),
            StatParams::default(),
        )
        .unwrap();
        assert_eq!(result.entities, vec!["Geelong", "Carlton"]);
        let score = result.metric("score").unwrap();
        assert_eq!(score.leader, "Carlton");
        assert_eq!(score.laggard, "Geelong");
        assert_eq!(score.gap, 5.0);
        assert!((score.gap_percent.unwrap() - 500.0 / 3.0).abs() < 1e-9);
        let sig = score.significance.as_ref().unwrap();
        assert_eq!(sig.tier, SignificanceTier::High);
        assert!(sig.p_value < 0.01);
        assert!(score.pairwise.is_empty());
        assert_eq!(result.leaders["score"].entity, "Carlton");
        assert!(result.summary().starts_with("Carlton leads 1 of 1 metric"));
    }

    #[test]
    fn test_three_entities_pairwise() {
        let result = run(
            json!([
                {"name": "A", "goals": 10}, {"name": "B", "goals": 20}, {"name": "C", "goals": 0},
            ]),
            StatParams::default(),
        )
        .unwrap();
        let goals = result.metric("goals").unwrap();
        assert!(goals.significance.is_none());
        let pairs: Vec<(&str, &str)> = goals
            .pairwise
            .iter()
            .map(|p| (p.first.as_str(), p.second.as_str()))
            .collect();
        assert_eq!(pairs, vec![("A", "B"), ("A", "C"), ("B", "C")]);
        assert_eq!(goals.pairwise[1].percent_difference, None);
        assert_eq!(goals.gap_percent, None);
        assert!(result
            .data_quality
            .warnings
            .iter()
            .any(|w| w == "Only one sample for: A, B, C"));
    }

    #[test]
    fn test_metric_missing_for_one_of_three_entities() {
        let result = run(
            json!([
                {"team": "A", "goals": 10, "kicks": 200}, {"team": "A", "goals": 12, "kicks": 210},
                {"team": "B", "goals": 8, "kicks": 190}, {"team": "B", "goals": 9, "kicks": 195},
                {"team": "C", "goals": 11, "kicks": null}, {"team": "C", "goals": 14, "kicks": null},
            ]),
            StatParams::default(),
        )
        .unwrap();
        assert_eq!(result.entity_count, 3);
        let kicks = result.metric("kicks").unwrap();
        assert_eq!(kicks.entities.len(), 2);
        assert!(kicks.significance.is_none());
        assert_eq!(kicks.pairwise.len(), 1);
        assert_eq!(kicks.pairwise[0].first, "A");
        assert_eq!(kicks.pairwise[0].second, "B");
        assert_eq!(kicks.pairwise[0].difference, 12.5);
        assert_eq!(result.metric("goals").unwrap().pairwise.len(), 3);
    }

    #[test]
    fn test_ties_keep_first_entity() {
        let result = run(
            json!([{"team": "A", "v": 5}, {"team": "B", "v": 5}]),
            StatParams::default(),
        )
        .unwrap();
        let v = result.metric("v").unwrap();
        assert_eq!(v.leader, "A");
        assert_eq!(v.laggard, "A");
    }

    #[test]
    fn test_group_errors() {
        assert_eq!(
            run(json!([{"team": "A", "v": 1}, {"team": "A", "v": 2}]), StatParams::default()),
            Err(StatsError::TooFewEntities(1))
        );
        assert_eq!(
            run(json!([{"v": 1}, {"v": 2}]), StatParams::default()),
            Err(StatsError::NoGroupColumn)
        );
    }

    #[test]
    fn test_explicit_group_and_metric() {
        let result = run(
            json!([
                {"venue": "MCG", "team": "A", "goals": 10, "behinds": 3},
                {"venue": "SCG", "team": "A", "goals": 12, "behinds": 7},
            ]),
            StatParams {
                group_by: Some("venue".into()),
                metric: Some("behinds".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(result.group_by, "venue");
        assert_eq!(result.metrics.len(), 1);
        assert_eq!(result.metrics[0].leader, "SCG");
    }
}
