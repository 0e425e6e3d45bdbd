//! Configuration
//!
//! Every threshold the three components use lives here. Defaults match the
//! production deployment; a JSON file can override any subset of fields and
//! a handful of `AFL_INSIGHT_*` environment variables are applied on top.

use crate::error::{InsightError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightConfig {
    pub sql_gate: SqlGateConfig,
    pub entities: EntityConfig,
    pub stats: StatsConfig,
}

/// How the gate looks for blocked keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordScan {
    /// Case-insensitive search over the whole SQL text, literals and
    /// identifiers included.
    Substring,
    /// Only unquoted word tokens are compared against the blocklist.
    Token,
}

impl std::str::FromStr for KeywordScan {
    type Err = InsightError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "substring" => Ok(KeywordScan::Substring),
            "token" => Ok(KeywordScan::Token),
            other => Err(InsightError::Config(format!(
                "unknown keyword scan mode '{}' (expected 'substring' or 'token')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlGateConfig {
    pub allowed_tables: Vec<String>,
    /// Checked in order; the first hit is reported.
    pub forbidden_keywords: Vec<String>,
    pub keyword_scan: KeywordScan,
    pub min_length: usize,
}

impl Default for SqlGateConfig {
    fn default() -> Self {
        Self {
            allowed_tables: ["matches", "teams", "players", "player_stats", "team_stats"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
            forbidden_keywords: [
                "DROP", "DELETE", "UPDATE", "INSERT", "ALTER", "CREATE", "TRUNCATE", "GRANT",
                "REVOKE", "EXEC", "EXECUTE", "CALL", "DECLARE",
            ]
            .iter()
            .map(|k| k.to_string())
            .collect(),
            keyword_scan: KeywordScan::Substring,
            min_length: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityConfig {
    /// Minimum normalized edit-distance similarity for a fuzzy team match.
    pub fuzzy_threshold: f64,
    pub min_season: i64,
    pub max_season: i64,
    /// How many canonical names the "did you mean" suggestion lists.
    pub suggestion_count: usize,
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.75,
            min_season: 1990,
            max_season: 2025,
            suggestion_count: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub min_trend_points: usize,
    pub momentum_window: usize,
    pub rolling_windows: Vec<usize>,
    /// Percent difference between recent and historical mean that counts as hot/cold.
    pub momentum_threshold_pct: f64,
    /// Slopes smaller than this percent of the series mean are treated as flat.
    pub stable_slope_pct: f64,
    pub significance_level: f64,
    pub high_significance_level: f64,
    pub high_confidence_points: usize,
    pub medium_confidence_points: usize,
    /// Samples below this size get a data quality warning.
    pub small_sample_warning: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            min_trend_points: 3,
            momentum_window: 5,
            rolling_windows: vec![3, 5, 10],
            momentum_threshold_pct: 5.0,
            stable_slope_pct: 1.0,
            significance_level: 0.05,
            high_significance_level: 0.01,
            high_confidence_points: 20,
            medium_confidence_points: 10,
            small_sample_warning: 5,
        }
    }
}

impl InsightConfig {
    /// Load a JSON config file; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: InsightConfig = serde_json::from_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        config.validated()
    }

    /// Apply `AFL_INSIGHT_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(tables) = lookup("AFL_INSIGHT_ALLOWED_TABLES") {
            self.sql_gate.allowed_tables = tables
                .split(',')
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect();
        }
        if let Some(mode) = lookup("AFL_INSIGHT_KEYWORD_SCAN") {
            self.sql_gate.keyword_scan = mode.parse()?;
        }
        if let Some(threshold) = lookup("AFL_INSIGHT_FUZZY_THRESHOLD") {
            self.entities.fuzzy_threshold = threshold.trim().parse().map_err(|_| {
                InsightError::Config(format!("invalid AFL_INSIGHT_FUZZY_THRESHOLD '{}'", threshold))
            })?;
        }
        if let Some(window) = lookup("AFL_INSIGHT_MOMENTUM_WINDOW") {
            self.stats.momentum_window = window.trim().parse().map_err(|_| {
                InsightError::Config(format!("invalid AFL_INSIGHT_MOMENTUM_WINDOW '{}'", window))
            })?;
        }
        self.validated()
    }

    fn validated(self) -> Result<Self> {
        if !(0.0..=1.0).contains(&self.entities.fuzzy_threshold) {
            return Err(InsightError::Config(format!(
                "fuzzy_threshold must be within [0, 1], got {}",
                self.entities.fuzzy_threshold
            )));
        }
        if self.entities.min_season > self.entities.max_season {
            return Err(InsightError::Config(format!(
                "season range is empty: {}..{}",
                self.entities.min_season, self.entities.max_season
            )));
        }
        if self.stats.momentum_window == 0 || self.stats.rolling_windows.contains(&0) {
            return Err(InsightError::Config("window sizes must be positive".to_string()));
        }
        if self.stats.min_trend_points < 3 {
            return Err(InsightError::Config(
                "min_trend_points must be at least 3 for a regression p-value".to_string(),
            ));
        }
        Ok(self)
    }
}
