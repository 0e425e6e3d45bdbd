//! Statistics Engine
//!
//! Turns materialized query results into structured insight for the
//! response and chart layers. Four analysis kinds are supported:
//!
//! - `average`: descriptive statistics for every numeric column
//! - `trend`: regression direction, momentum, rolling averages, volatility
//! - `comparison`: per-entity metrics, leaders, significance testing
//! - `rank`: ordering with percentiles and gaps
//!
//! Every kind fails independently. A failure is returned as a result with
//! `success == false`, never as a panic, so a caller asking for several
//! kinds still receives the ones that worked.

pub mod average;
pub mod comparison;
pub mod dataset;
pub mod descriptive;
pub mod inference;
pub mod rank;
pub mod trend;

pub use average::AverageResult;
pub use comparison::ComparisonResult;
pub use dataset::{ColumnKind, Dataset, Value};
pub use rank::RankResult;
pub use trend::TrendResult;

use crate::config::StatsConfig;
use crate::error::StatsError;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    Average,
    Trend,
    Comparison,
    Rank,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 4] = [
        AnalysisKind::Average,
        AnalysisKind::Trend,
        AnalysisKind::Comparison,
        AnalysisKind::Rank,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Average => "average",
            AnalysisKind::Trend => "trend",
            AnalysisKind::Comparison => "comparison",
            AnalysisKind::Rank => "rank",
        }
    }
}

impl std::fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AnalysisKind {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "average" | "averages" => Ok(AnalysisKind::Average),
            "trend" | "trends" => Ok(AnalysisKind::Trend),
            "comparison" | "comparisons" => Ok(AnalysisKind::Comparison),
            "rank" | "ranks" | "ranking" | "rankings" => Ok(AnalysisKind::Rank),
            _ => Err(StatsError::UnknownKind(s.to_string())),
        }
    }
}

/// Optional knobs shared by the analysis kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatParams {
    /// Column to analyze for trend and rank.
    pub metric: Option<String>,
    /// Column naming the entities for comparison and rank.
    pub group_by: Option<String>,
    /// Rank lower values first.
    pub ascending: bool,
    /// Momentum window; defaults to the configured window.
    pub window: Option<usize>,
}

/// Kind-specific payload of a successful analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatPayload {
    Average(AverageResult),
    Trend(TrendResult),
    Comparison(ComparisonResult),
    Rank(RankResult),
}

/// Uniform envelope returned by every analysis kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatResult {
    pub success: bool,
    pub kind: AnalysisKind,
    #[serde(flatten)]
    pub payload: Option<StatPayload>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_error"
    )]
    pub error: Option<StatsError>,
    pub summary: String,
}

fn serialize_error<S: Serializer>(error: &Option<StatsError>, s: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => s.serialize_str(&e.to_string()),
        None => s.serialize_none(),
    }
}

impl StatResult {
    fn ok(kind: AnalysisKind, payload: StatPayload, summary: String) -> Self {
        Self {
            success: true,
            kind,
            payload: Some(payload),
            error: None,
            summary,
        }
    }

    fn failed(kind: AnalysisKind, error: StatsError) -> Self {
        Self {
            success: false,
            kind,
            payload: None,
            summary: error.to_string(),
            error: Some(error),
        }
    }

    pub fn as_average(&self) -> Option<&AverageResult> {
        match &self.payload {
            Some(StatPayload::Average(r)) => Some(r),
            _ => None,
        }
    }

    pub fn as_trend(&self) -> Option<&TrendResult> {
        match &self.payload {
            Some(StatPayload::Trend(r)) => Some(r),
            _ => None,
        }
    }

    pub fn as_comparison(&self) -> Option<&ComparisonResult> {
        match &self.payload {
            Some(StatPayload::Comparison(r)) => Some(r),
            _ => None,
        }
    }

    pub fn as_rank(&self) -> Option<&RankResult> {
        match &self.payload {
            Some(StatPayload::Rank(r)) => Some(r),
            _ => None,
        }
    }
}

/// Results of several kinds over the same dataset. Failed kinds are left
/// out of `results` and reported in `failures`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedStats {
    pub success: bool,
    pub results: BTreeMap<AnalysisKind, StatResult>,
    pub failures: BTreeMap<AnalysisKind, String>,
}

impl CombinedStats {
    pub fn get(&self, kind: AnalysisKind) -> Option<&StatResult> {
        self.results.get(&kind)
    }
}

/// Sample-size bookkeeping attached to trend, comparison and rank results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataQuality {
    pub sample_size: usize,
    pub missing_values: usize,
    pub warnings: Vec<String>,
}

impl DataQuality {
    fn assess(sample_size: usize, missing_values: usize, config: &StatsConfig) -> Self {
        let mut warnings = Vec::new();
        if sample_size < config.small_sample_warning {
            warnings.push(format!(
                "Small sample size (n={}); treat results as indicative only",
                sample_size
            ));
        }
        if missing_values > 0 {
            warnings.push(format!(
                "{} missing value{} excluded from the analysis",
                missing_values,
                if missing_values == 1 { " was" } else { "s were" }
            ));
        }
        Self {
            sample_size,
            missing_values,
            warnings,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatisticsEngine {
    config: StatsConfig,
}

impl StatisticsEngine {
    pub fn new(config: StatsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    /// Run one analysis kind.
    pub fn compute(&self, dataset: &Dataset, kind: AnalysisKind, params: &StatParams) -> StatResult {
        debug!(
            "Computing {} statistics over {} rows",
            kind,
            dataset.row_count()
        );
        let outcome = match kind {
            AnalysisKind::Average => average::compute(dataset)
                .map(|r| (r.summary(), StatPayload::Average(r))),
            AnalysisKind::Trend => trend::compute(dataset, params, &self.config)
                .map(|r| (r.summary(), StatPayload::Trend(r))),
            AnalysisKind::Comparison => comparison::compute(dataset, params, &self.config)
                .map(|r| (r.summary(), StatPayload::Comparison(r))),
            AnalysisKind::Rank => rank::compute(dataset, params, &self.config)
                .map(|r| (r.summary(), StatPayload::Rank(r))),
        };

        match outcome {
            Ok((summary, payload)) => StatResult::ok(kind, payload, summary),
            Err(e) => {
                warn!("{} analysis failed: {}", kind, e);
                StatResult::failed(kind, e)
            }
        }
    }

    /// Run a kind named by a string.
    pub fn compute_named(&self, dataset: &Dataset, kind: &str, params: &StatParams) -> Result<StatResult, StatsError> {
        let kind: AnalysisKind = kind.parse()?;
        Ok(self.compute(dataset, kind, params))
    }

    /// Run several kinds; each fails on its own.
    pub fn compute_many(&self, dataset: &Dataset, kinds: &[AnalysisKind], params: &StatParams) -> CombinedStats {
        let mut results = BTreeMap::new();
        let mut failures = BTreeMap::new();
        for &kind in kinds {
            let result = self.compute(dataset, kind, params);
            if result.success {
                results.insert(kind, result);
            } else {
                failures.insert(kind, result.summary);
            }
        }
        CombinedStats {
            success: !results.is_empty(),
            results,
            failures,
        }
    }
}

/// Columns preferred, in order, as the entity column.
const GROUP_COLUMN_PREFERENCE: [&str; 5] = ["name", "team", "player", "team_name", "player_name"];

/// Columns that order rows rather than measure anything.
const SEQUENCE_COLUMNS: [&str; 6] = ["season", "year", "round", "round_number", "match_id", "id"];

fn column_by_name(dataset: &Dataset, name: &str) -> Result<usize, StatsError> {
    dataset
        .column_index(name)
        .ok_or_else(|| StatsError::UnknownColumn(name.to_string()))
}

/// Entity column: explicit parameter, then a conventionally named column,
/// then the first non-numeric column.
fn group_column(dataset: &Dataset, params: &StatParams) -> Result<Option<usize>, StatsError> {
    if let Some(name) = &params.group_by {
        return column_by_name(dataset, name).map(Some);
    }
    let preferred = GROUP_COLUMN_PREFERENCE
        .iter()
        .find_map(|name| dataset.column_index(name));
    Ok(preferred.or_else(|| (0..dataset.columns().len()).find(|&c| !dataset.is_numeric(c))))
}

/// Metric column: explicit parameter, else the first numeric column that is
/// not a sequencing column, else the first numeric column.
fn metric_column(dataset: &Dataset, params: &StatParams) -> Result<usize, StatsError> {
    if let Some(name) = &params.metric {
        let idx = column_by_name(dataset, name)?;
        if !dataset.is_numeric(idx) {
            return Err(StatsError::UnknownColumn(format!("{} (not numeric)", name)));
        }
        return Ok(idx);
    }
    let numeric = dataset.numeric_columns();
    numeric
        .iter()
        .copied()
        .find(|&c| !SEQUENCE_COLUMNS.contains(&dataset.columns()[c].as_str()))
        .or_else(|| numeric.first().copied())
        .ok_or(StatsError::NoNumericColumns)
}

/// Row indices per entity label, entities in order of first appearance.
/// Rows without a label are skipped.
fn group_rows(dataset: &Dataset, group_col: usize) -> Vec<(String, Vec<usize>)> {
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for row in 0..dataset.row_count() {
        let Some(label) = dataset.value(row, group_col).label() else {
            continue;
        };
        match positions.get(&label) {
            Some(&pos) => groups[pos].1.push(row),
            None => {
                positions.insert(label.clone(), groups.len());
                groups.push((label, vec![row]));
            }
        }
    }
    groups
}

/// Non-null values of `col` for the given rows.
fn values_for(dataset: &Dataset, rows: &[usize], col: usize) -> Vec<f64> {
    rows.iter()
        .filter_map(|&r| dataset.value(r, col).as_f64())
        .collect()
}

fn ensure_finite(value: f64, what: &'static str) -> Result<f64, StatsError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(StatsError::NonFinite(what))
    }
}

fn fmt_num(value: f64) -> String {
    format!("{:.2}", value)
}

fn fmt_signed_pct(value: f64) -> String {
    format!("{:+.1}%", value)
}
