use afl_insight::config::EntityConfig;
use afl_insight::entities::{EntityNormalizer, MatchMethod, MetricResolver, RawEntities};
use afl_insight::error::ResolutionError;
use serde_json::json;

fn raw(value: serde_json::Value) -> RawEntities {
    serde_json::from_value(value).unwrap()
}

#[test]
fn test_resolves_nicknames_and_typos() {
    let normalizer = EntityNormalizer::default();
    assert_eq!(normalizer.resolve_team("Cats").as_deref(), Some("Geelong"));
    assert_eq!(normalizer.resolve_team("the  TIGERS").as_deref(), Some("Richmond"));
    assert_eq!(normalizer.resolve_team("Richmnd").as_deref(), Some("Richmond"));
    assert_eq!(normalizer.resolve_team("colingwood").as_deref(), Some("Collingwood"));
    assert_eq!(normalizer.resolve_team("footscray").as_deref(), Some("Western Bulldogs"));
    assert_eq!(normalizer.resolve_team("Qantas"), None);
    assert_eq!(normalizer.resolve_team("   "), None);
}

#[test]
fn test_exact_match_reports_alias() {
    let normalizer = EntityNormalizer::default();
    let m = normalizer.resolve("Port Adelaide Power").unwrap();
    assert_eq!(m.canonical, "Port Adelaide");
    assert_eq!(m.method, MatchMethod::Exact);
    assert_eq!(m.score, 1.0);
}

#[test]
fn test_fuzzy_tie_prefers_earlier_team() {
    // "dies" is one edit from both "pies" and "dees"
    let normalizer = EntityNormalizer::default();
    assert_eq!(normalizer.resolve_team("dies").as_deref(), Some("Collingwood"));
    assert_eq!(
        normalizer.resolve_strict("dies"),
        Err(ResolutionError::Ambiguous(vec![
            "Collingwood".to_string(),
            "Melbourne".to_string()
        ]))
    );
    assert_eq!(
        normalizer.resolve_strict("Richmnd").map(|m| m.canonical),
        Ok("Richmond".to_string())
    );
}

#[test]
fn test_threshold_is_configurable() {
    let strict = EntityNormalizer::afl(EntityConfig {
        fuzzy_threshold: 0.9,
        ..Default::default()
    });
    assert_eq!(strict.resolve_team("Richmnd"), None);
    assert_eq!(strict.resolve_team("Cats").as_deref(), Some("Geelong"));
}

#[test]
fn test_validate_entities_flags_unknown_team() {
    let normalizer = EntityNormalizer::default();
    let validation = normalizer.validate_entities(&raw(json!({"teams": ["Cats", "Unknownteam"]})));
    assert!(!validation.is_valid);
    assert_eq!(validation.corrected.teams, Some(vec!["Geelong".to_string()]));
    assert_eq!(validation.warnings, vec!["Unknown team: 'Unknownteam'".to_string()]);
    assert_eq!(validation.suggestions.len(), 1);
    assert!(validation.suggestions[0].contains("Adelaide, Brisbane Lions, Carlton"));
}

#[test]
fn test_validate_entities_checks_seasons() {
    let normalizer = EntityNormalizer::default();
    let validation = normalizer.validate_entities(&raw(json!({
        "teams": ["Swans"],
        "seasons": [2024, "2019", 1985, "last year"],
        "metrics": ["goals"],
    })));
    assert!(validation.is_valid);
    assert_eq!(
        validation.corrected.seasons,
        Some(vec!["2024".to_string(), "2019".to_string()])
    );
    assert_eq!(
        validation.warnings,
        vec![
            "Season 1985 outside data range (1990-2025)".to_string(),
            "Invalid season: 'last year'".to_string(),
        ]
    );
    assert_eq!(validation.corrected.metrics, Some(json!(["goals"])));
    assert_eq!(validation.corrected.players, None);
}

#[test]
fn test_validation_serializes_without_absent_fields() {
    let normalizer = EntityNormalizer::default();
    let validation = normalizer.validate_entities(&raw(json!({"teams": ["Dockers"]})));
    let value = serde_json::to_value(&validation).unwrap();
    assert_eq!(value["corrected"], json!({"teams": ["Fremantle"]}));
    assert_eq!(value["is_valid"], json!(true));
}

#[test]
fn test_suggestions_and_variations() {
    let normalizer = EntityNormalizer::default();
    assert_eq!(
        normalizer.suggest_teams("west", 5),
        vec!["Greater Western Sydney", "West Coast", "Western Bulldogs"]
    );
    assert!(normalizer.variations("Geelong").contains(&"cats".to_string()));
    assert!(normalizer.variations("Nowhere").is_empty());
    assert_eq!(normalizer.canonical_names().count(), 18);
}

#[test]
fn test_metric_aliases() {
    assert_eq!(MetricResolver::resolve_metric("Victories"), Some("wins"));
    assert_eq!(MetricResolver::resolve_metric("score"), Some("goals"));
    assert_eq!(MetricResolver::resolve_metric("hit outs"), None);
}

#[test]
fn test_resolution_is_repeatable() {
    let normalizer = EntityNormalizer::default();
    let first = normalizer.resolve("Essendn").unwrap();
    let second = normalizer.resolve("Essendn").unwrap();
    assert_eq!(first, second);
    assert_eq!(first.canonical, "Essendon");
}
