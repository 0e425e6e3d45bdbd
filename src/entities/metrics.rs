//! Metric alias normalization ("victories" → "wins").

use super::normalize_text;

/// Canonical metric names with their aliases, in lookup order. "score"
/// appears under both goals and points; goals wins.
const METRIC_ALIASES: &[(&str, &[&str])] = &[
    ("wins", &["wins", "victories", "won", "win", "w"]),
    ("losses", &["losses", "defeats", "lost", "loss", "l"]),
    ("draws", &["draws", "ties", "drawn", "draw", "d"]),
    ("goals", &["goals", "goals scored", "total goals", "score"]),
    ("points", &["points", "total points", "score"]),
    (
        "margin",
        &["margin", "winning margin", "margin of victory", "diff", "difference"],
    ),
    ("percentage", &["percentage", "pct", "%", "win percentage"]),
    (
        "ladder_position",
        &["ladder position", "position", "rank", "ranking", "place"],
    ),
];

pub struct MetricResolver;

impl MetricResolver {
    pub fn resolve_metric(input: &str) -> Option<&'static str> {
        let normalized = normalize_text(input);
        if normalized.is_empty() {
            return None;
        }
        METRIC_ALIASES
            .iter()
            .find(|(canonical, aliases)| *canonical == normalized || aliases.contains(&normalized.as_str()))
            .map(|(canonical, _)| *canonical)
    }

    pub fn canonical_metrics() -> impl Iterator<Item = &'static str> {
        METRIC_ALIASES.iter().map(|(canonical, _)| *canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_metric() {
        assert_eq!(MetricResolver::resolve_metric("Victories"), Some("wins"));
        assert_eq!(MetricResolver::resolve_metric("  margin of   victory "), Some("margin"));
        assert_eq!(MetricResolver::resolve_metric("ladder_position"), Some("ladder_position"));
        assert_eq!(MetricResolver::resolve_metric("score"), Some("goals"));
        assert_eq!(MetricResolver::resolve_metric("tackles"), None);
        assert_eq!(MetricResolver::resolve_metric(""), None);
    }
}
