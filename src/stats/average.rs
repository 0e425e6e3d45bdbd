//! Descriptive statistics for every numeric column.

use super::dataset::Dataset;
use super::descriptive::Summary;
use super::fmt_num;
use crate::error::StatsError;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnAverage {
    pub column: String,
    #[serde(flatten)]
    pub stats: Summary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AverageResult {
    pub row_count: usize,
    pub averages: Vec<ColumnAverage>,
}

impl AverageResult {
    pub fn column(&self, name: &str) -> Option<&ColumnAverage> {
        self.averages.iter().find(|a| a.column == name)
    }

    pub fn summary(&self) -> String {
        let parts: Vec<String> = self
            .averages
            .iter()
            .take(3)
            .map(|a| {
                format!(
                    "{} averages {} (median {}, range {} to {})",
                    a.column,
                    fmt_num(a.stats.mean),
                    fmt_num(a.stats.median),
                    fmt_num(a.stats.min),
                    fmt_num(a.stats.max)
                )
            })
            .collect();
        let more = self.averages.len().saturating_sub(3);
        let mut line = format!(
            "Across {} row{}: {}",
            self.row_count,
            if self.row_count == 1 { "" } else { "s" },
            parts.join("; ")
        );
        if more > 0 {
            line.push_str(&format!("; plus {} more column{}", more, if more == 1 { "" } else { "s" }));
        }
        line
    }
}

pub(crate) fn compute(dataset: &Dataset) -> Result<AverageResult, StatsError> {
    if dataset.is_empty() {
        return Err(StatsError::InsufficientData { needed: 1, found: 0 });
    }
    let numeric = dataset.numeric_columns();
    if numeric.is_empty() {
        return Err(StatsError::NoNumericColumns);
    }

    let averages = numeric
        .into_iter()
        .filter_map(|col| {
            let values: Vec<f64> = dataset.series(col).into_iter().map(|(_, v)| v).collect();
            Summary::of(&values).map(|stats| ColumnAverage {
                column: dataset.columns()[col].clone(),
                stats,
            })
        })
        .collect();

    Ok(AverageResult {
        row_count: dataset.row_count(),
        averages,
    })
}
