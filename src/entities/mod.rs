//! Entity Normalizer
//!
//! Converts natural language team mentions ("Cats", "RIC", "Richmnd") into
//! canonical database values and range-checks season years before the
//! entities are handed to SQL generation.
//!
//! Resolution never guesses: anything below the similarity threshold comes
//! back unresolved and is surfaced to the user as a clarification.

pub mod catalog;
pub mod metrics;

pub use catalog::{afl_team_index, AliasIndex, CanonicalEntity};
pub use metrics::MetricResolver;

use crate::config::EntityConfig;
use crate::error::ResolutionError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use strsim::normalized_levenshtein;
use tracing::{info, warn};

lazy_static::lazy_static! {
    static ref WHITESPACE: regex::Regex = regex::Regex::new(r"\s+").unwrap();
}

/// Trim, lowercase and collapse runs of whitespace.
pub(crate) fn normalize_text(input: &str) -> String {
    WHITESPACE
        .replace_all(input.trim(), " ")
        .to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Exact,
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamMatch {
    pub canonical: String,
    pub method: MatchMethod,
    /// 1.0 for exact matches.
    pub score: f64,
    pub matched_alias: String,
}

/// Entities as extracted by the upstream language understanding step.
/// Seasons may arrive as numbers or strings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RawEntities {
    pub teams: Vec<String>,
    pub seasons: Vec<Value>,
    pub players: Option<Value>,
    pub metrics: Option<Value>,
    pub rounds: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorrectedEntities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teams: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seasons: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub players: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rounds: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityValidation {
    pub is_valid: bool,
    pub corrected: CorrectedEntities,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

pub struct EntityNormalizer {
    index: Arc<AliasIndex>,
    config: EntityConfig,
}

impl Default for EntityNormalizer {
    fn default() -> Self {
        Self::afl(EntityConfig::default())
    }
}

impl EntityNormalizer {
    /// Normalizer over the shared AFL team index.
    pub fn afl(config: EntityConfig) -> Self {
        Self::with_index(afl_team_index(), config)
    }

    pub fn with_index(index: Arc<AliasIndex>, config: EntityConfig) -> Self {
        Self { index, config }
    }

    pub fn index(&self) -> &AliasIndex {
        &self.index
    }

    /// Resolve a team mention to its canonical name, or `None`.
    pub fn resolve_team(&self, input: &str) -> Option<String> {
        self.resolve(input).ok().map(|m| m.canonical)
    }

    /// Exact alias lookup first, then fuzzy matching. On a fuzzy tie the
    /// entity declared first in the index wins.
    pub fn resolve(&self, input: &str) -> Result<TeamMatch, ResolutionError> {
        let result = self.resolve_inner(input, false);
        match &result {
            Ok(m) => info!(
                "Resolved '{}' → '{}' ({:?}, score {:.3})",
                input, m.canonical, m.method, m.score
            ),
            Err(_) => warn!("Could not resolve team name: '{}'", input),
        }
        result
    }

    /// Like [`resolve`](Self::resolve) but refuses to pick between distinct
    /// entities that tie on the best fuzzy score.
    pub fn resolve_strict(&self, input: &str) -> Result<TeamMatch, ResolutionError> {
        self.resolve_inner(input, true)
    }

    fn resolve_inner(&self, input: &str, strict: bool) -> Result<TeamMatch, ResolutionError> {
        let normalized = normalize_text(input);
        if normalized.is_empty() {
            return Err(ResolutionError::Unresolved(input.to_string()));
        }

        if let Some(entity) = self.index.get(&normalized) {
            return Ok(TeamMatch {
                canonical: entity.name().to_string(),
                method: MatchMethod::Exact,
                score: 1.0,
                matched_alias: normalized,
            });
        }

        let mut best: Option<(f64, &CanonicalEntity, &str)> = None;
        let mut tied: Vec<&str> = Vec::new();
        for entity in self.index.entities() {
            for alias in entity.aliases() {
                let score = normalized_levenshtein(&normalized, alias);
                if score < self.config.fuzzy_threshold {
                    continue;
                }
                match best {
                    Some((best_score, _, _)) if score < best_score => {}
                    Some((best_score, best_entity, _)) if score == best_score => {
                        if best_entity.name() != entity.name() && !tied.contains(&entity.name()) {
                            tied.push(entity.name());
                        }
                    }
                    _ => {
                        best = Some((score, entity, alias.as_str()));
                        tied = vec![entity.name()];
                    }
                }
            }
        }

        match best {
            Some(_) if strict && tied.len() > 1 => Err(ResolutionError::Ambiguous(
                tied.iter().map(|name| name.to_string()).collect(),
            )),
            Some((score, entity, alias)) => Ok(TeamMatch {
                canonical: entity.name().to_string(),
                method: MatchMethod::Fuzzy,
                score,
                matched_alias: alias.to_string(),
            }),
            None => Err(ResolutionError::Unresolved(input.to_string())),
        }
    }

    /// Validate and normalize extracted entities.
    pub fn validate_entities(&self, raw: &RawEntities) -> EntityValidation {
        let mut validation = EntityValidation {
            is_valid: true,
            corrected: CorrectedEntities::default(),
            warnings: Vec::new(),
            suggestions: Vec::new(),
        };

        if !raw.teams.is_empty() {
            let mut corrected_teams = Vec::with_capacity(raw.teams.len());
            for team in &raw.teams {
                match self.resolve_team(team) {
                    Some(canonical) => corrected_teams.push(canonical),
                    None => {
                        validation.is_valid = false;
                        validation.warnings.push(format!("Unknown team: '{}'", team));
                    }
                }
            }
            if !validation.is_valid {
                let names: Vec<&str> = self
                    .canonical_names()
                    .take(self.config.suggestion_count)
                    .collect();
                validation.suggestions.push(format!(
                    "Did you mean one of these teams? {}",
                    names.join(", ")
                ));
            }
            validation.corrected.teams = Some(corrected_teams);
        }

        if !raw.seasons.is_empty() {
            let mut corrected_seasons = Vec::with_capacity(raw.seasons.len());
            for season in &raw.seasons {
                match season_year(season) {
                    Some(year)
                        if (self.config.min_season..=self.config.max_season).contains(&year) =>
                    {
                        corrected_seasons.push(year.to_string())
                    }
                    Some(year) => validation.warnings.push(format!(
                        "Season {} outside data range ({}-{})",
                        year, self.config.min_season, self.config.max_season
                    )),
                    None => validation
                        .warnings
                        .push(format!("Invalid season: '{}'", display_value(season))),
                }
            }
            validation.corrected.seasons = Some(corrected_seasons);
        }

        validation.corrected.players = raw.players.clone();
        validation.corrected.metrics = raw.metrics.clone();
        validation.corrected.rounds = raw.rounds.clone();

        validation
    }

    /// Canonical names having an alias that starts with `partial`, or whose
    /// name contains it, in declaration order.
    pub fn suggest_teams(&self, partial: &str, limit: usize) -> Vec<String> {
        let normalized = normalize_text(partial);
        if normalized.is_empty() {
            return Vec::new();
        }
        self.index
            .entities()
            .iter()
            .filter(|e| {
                e.aliases().iter().any(|a| a.starts_with(&normalized))
                    || e.name().to_lowercase().contains(&normalized)
            })
            .take(limit)
            .map(|e| e.name().to_string())
            .collect()
    }

    pub fn canonical_names(&self) -> impl Iterator<Item = &str> {
        self.index.entities().iter().map(|e| e.name())
    }

    /// Every alias of a canonical name; empty for unknown names.
    pub fn variations(&self, canonical: &str) -> &[String] {
        self.index
            .entity(canonical)
            .map(|e| e.aliases())
            .unwrap_or(&[])
    }
}

fn season_year(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
