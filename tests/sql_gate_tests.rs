use afl_insight::config::{KeywordScan, SqlGateConfig};
use afl_insight::error::ValidationError;
use afl_insight::safety::SqlSafetyGate;

fn token_gate() -> SqlSafetyGate {
    SqlSafetyGate::new(&SqlGateConfig {
        keyword_scan: KeywordScan::Token,
        ..Default::default()
    })
}

#[test]
fn test_accepts_plain_select() {
    let gate = SqlSafetyGate::default();
    let outcome = gate.validate(
        "SELECT home_team, away_team, home_score FROM matches WHERE season = 2024 ORDER BY round",
    );
    assert!(outcome.accepted, "{:?}", outcome.reason);
    assert_eq!(outcome.reason, None);
}

#[test]
fn test_accepts_cte_joined_with_allowed_table() {
    let gate = SqlSafetyGate::default();
    let sql = "WITH recent_form AS (SELECT home_team, home_score FROM matches WHERE season = 2024) \
               SELECT * FROM recent_form JOIN teams ON teams.name = recent_form.home_team";
    assert_eq!(gate.check(sql), Ok(()));
}

#[test]
fn test_rejects_non_select_statements() {
    let gate = SqlSafetyGate::default();
    for sql in [
        "DELETE FROM matches WHERE season = 2020",
        "UPDATE teams SET name = 'Cats' WHERE id = 1",
        "INSERT INTO matches VALUES (1, 2, 3)",
        "DROP TABLE matches",
    ] {
        assert_eq!(gate.check(sql), Err(ValidationError::NotSelect), "{}", sql);
    }
}

#[test]
fn test_rejects_stacked_statements() {
    let gate = SqlSafetyGate::default();
    assert_eq!(
        gate.check("SELECT * FROM matches; DROP TABLE matches"),
        Err(ValidationError::NotSelect)
    );
}

#[test]
fn test_blocked_words_anywhere_in_substring_mode() {
    let gate = SqlSafetyGate::default();
    let cases = [
        ("SELECT updated_at FROM matches", "UPDATE"),
        ("SELECT * FROM matches WHERE venue = 'drop zone'", "DROP"),
        ("SELECT created_on FROM players", "CREATE"),
        ("SELECT * FROM teams WHERE name = 'grant'", "GRANT"),
    ];
    for (sql, keyword) in cases {
        assert_eq!(
            gate.check(sql),
            Err(ValidationError::ForbiddenKeyword(keyword.to_string())),
            "{}",
            sql
        );
    }
}

#[test]
fn test_token_mode_ignores_identifiers_and_literals() {
    let gate = token_gate();
    assert_eq!(gate.check("SELECT updated_at FROM matches"), Ok(()));
    assert_eq!(
        gate.check("SELECT * FROM matches WHERE venue = 'drop zone'"),
        Ok(())
    );
}

#[test]
fn test_token_mode_still_catches_bare_keywords() {
    let gate = token_gate();
    assert_eq!(
        gate.check("SELECT * FROM matches WHERE EXEC(1) = 1"),
        Err(ValidationError::ForbiddenKeyword("EXEC".to_string()))
    );
}

#[test]
fn test_rejects_tables_outside_allow_list() {
    let gate = SqlSafetyGate::default();
    assert_eq!(
        gate.check("SELECT * FROM matches m JOIN users u ON u.id = m.id JOIN audit_log a ON a.id = u.id"),
        Err(ValidationError::InvalidTable(vec![
            "audit_log".to_string(),
            "users".to_string()
        ]))
    );
}

#[test]
fn test_extract_from_is_not_a_table() {
    let gate = SqlSafetyGate::default();
    assert_eq!(
        gate.check("SELECT EXTRACT(YEAR FROM match_date) AS yr FROM matches"),
        Ok(())
    );
}

#[test]
fn test_derived_table_alias_is_not_a_table() {
    let gate = SqlSafetyGate::default();
    let sql = "SELECT t.team FROM (SELECT home_team AS team FROM matches) AS t JOIN teams ON teams.name = t.team";
    assert_eq!(gate.check(sql), Ok(()));
}

#[test]
fn test_subquery_tables_are_checked() {
    let gate = SqlSafetyGate::default();
    assert_eq!(
        gate.check("SELECT * FROM matches WHERE home_team IN (SELECT name FROM secrets)"),
        Err(ValidationError::InvalidTable(vec!["secrets".to_string()]))
    );
}

#[test]
fn test_too_short() {
    let gate = SqlSafetyGate::default();
    assert_eq!(gate.check("SELECT 1"), Err(ValidationError::TooShort));
}

#[test]
fn test_unbalanced_sql_is_a_parse_failure() {
    let gate = SqlSafetyGate::default();
    assert!(matches!(
        gate.check("SELECT * FROM (SELECT * FROM matches"),
        Err(ValidationError::ParseFailure(_))
    ));
    assert!(matches!(gate.check("   "), Err(ValidationError::ParseFailure(_))));
}

#[test]
fn test_custom_allow_list() {
    let gate = SqlSafetyGate::new(&SqlGateConfig {
        allowed_tables: vec!["Ladder".to_string()],
        ..Default::default()
    });
    assert_eq!(gate.check("SELECT * FROM ladder ORDER BY points"), Ok(()));
    assert_eq!(
        gate.check("SELECT * FROM matches ORDER BY round"),
        Err(ValidationError::InvalidTable(vec!["matches".to_string()]))
    );
}

#[test]
fn test_validation_is_repeatable() {
    let gate = SqlSafetyGate::default();
    let sql = "SELECT * FROM players WHERE team = 'Geelong'";
    assert_eq!(gate.validate(sql), gate.validate(sql));
}

#[test]
fn test_parenthesized_joins_and_table_queries_are_checked() {
    let gate = SqlSafetyGate::default();
    let cases = [
        "SELECT * FROM (matches m JOIN users u ON u.id = m.id)",
        "SELECT * FROM (users CROSS JOIN teams)",
        "SELECT * FROM matches WHERE home_team IN (TABLE users)",
        "SELECT name FROM teams UNION TABLE users",
    ];
    for sql in cases {
        assert_eq!(
            gate.check(sql),
            Err(ValidationError::InvalidTable(vec!["users".to_string()])),
            "{}",
            sql
        );
    }
    assert_eq!(
        gate.check("SELECT * FROM (matches m JOIN teams t ON t.name = m.home_team)"),
        Ok(())
    );
}

#[test]
fn test_select_into_is_rejected() {
    for gate in [SqlSafetyGate::default(), token_gate()] {
        assert_eq!(
            gate.check("SELECT * INTO backup_matches FROM matches"),
            Err(ValidationError::NotSelect)
        );
    }
}

#[test]
fn test_outcome_converts_to_result() {
    let gate = SqlSafetyGate::default();
    let sql = "SELECT * FROM matches JOIN users ON users.id = matches.id";
    assert_eq!(gate.validate(sql).into_result(), gate.check(sql));
    assert_eq!(
        gate.validate("SELECT * FROM ladder_view").into_result(),
        Err(ValidationError::InvalidTable(vec!["ladder_view".to_string()]))
    );
    assert_eq!(gate.validate("SELECT * FROM teams").into_result(), Ok(()));
}

#[test]
fn test_allowed_tables_are_normalized() {
    let gate = SqlSafetyGate::new(&SqlGateConfig {
        allowed_tables: vec![" Ladder ".to_string(), "MATCHES".to_string()],
        ..Default::default()
    });
    assert_eq!(gate.allowed_tables().collect::<Vec<_>>(), vec!["ladder", "matches"]);
}
