//! SQL Safety Gate
//!
//! Certifies that externally generated SQL is a read-only SELECT over the
//! allow-listed tables before anything is executed.
//!
//! Checks run in a fixed order and the first failure is reported:
//! 1. the text must tokenize into balanced statements
//! 2. every statement must lead with SELECT (optionally after a WITH clause)
//! 3. no blocked keyword may appear
//! 4. every referenced relation must be allow-listed or a CTE
//! 5. the query must not be trivially short

pub mod scanner;

use crate::config::{KeywordScan, SqlGateConfig};
use crate::error::ValidationError;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Result of a single validation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub accepted: bool,
    pub reason: Option<ValidationError>,
}

impl ValidationOutcome {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    pub fn rejected(reason: ValidationError) -> Self {
        Self {
            accepted: false,
            reason: Some(reason),
        }
    }

    /// Human readable rejection reason, if any.
    pub fn message(&self) -> Option<String> {
        self.reason.as_ref().map(|r| r.to_string())
    }

    pub fn into_result(self) -> Result<(), ValidationError> {
        match self.reason {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqlSafetyGate {
    allowed_tables: BTreeSet<String>,
    forbidden_keywords: Vec<String>,
    keyword_scan: KeywordScan,
    min_length: usize,
}

impl Default for SqlSafetyGate {
    fn default() -> Self {
        Self::new(&SqlGateConfig::default())
    }
}

impl SqlSafetyGate {
    pub fn new(config: &SqlGateConfig) -> Self {
        Self {
            allowed_tables: config
                .allowed_tables
                .iter()
                .map(|t| t.trim().to_lowercase())
                .collect(),
            forbidden_keywords: config
                .forbidden_keywords
                .iter()
                .map(|k| k.trim().to_uppercase())
                .filter(|k| !k.is_empty())
                .collect(),
            keyword_scan: config.keyword_scan,
            min_length: config.min_length,
        }
    }

    pub fn allowed_tables(&self) -> impl Iterator<Item = &str> {
        self.allowed_tables.iter().map(|t| t.as_str())
    }

    /// Validate SQL text for safety.
    pub fn validate(&self, sql: &str) -> ValidationOutcome {
        match self.check(sql) {
            Ok(()) => {
                debug!("SQL accepted by safety gate");
                ValidationOutcome::accepted()
            }
            Err(reason) => {
                warn!("SQL validation failed: {}", reason);
                ValidationOutcome::rejected(reason)
            }
        }
    }

    /// Same checks as [`validate`](Self::validate), as a `Result`.
    pub fn check(&self, sql: &str) -> Result<(), ValidationError> {
        let shape = scanner::scan(sql)?;

        if let Some(head) = shape.statements.iter().find(|s| !s.is_select) {
            debug!("Rejecting statement led by {:?}", head.leading_keyword);
            return Err(ValidationError::NotSelect);
        }

        if let Some(keyword) = self.find_forbidden_keyword(sql, &shape.bare_words) {
            return Err(ValidationError::ForbiddenKeyword(keyword));
        }

        let invalid = self.invalid_tables(&shape.table_refs, &shape.cte_names);
        if !invalid.is_empty() {
            return Err(ValidationError::InvalidTable(invalid));
        }

        if sql.trim().chars().count() < self.min_length {
            return Err(ValidationError::TooShort);
        }

        Ok(())
    }

    fn find_forbidden_keyword(&self, sql: &str, bare_words: &[String]) -> Option<String> {
        match self.keyword_scan {
            KeywordScan::Substring => {
                let sql_upper = sql.to_uppercase();
                self.forbidden_keywords
                    .iter()
                    .find(|k| sql_upper.contains(k.as_str()))
                    .cloned()
            }
            KeywordScan::Token => self
                .forbidden_keywords
                .iter()
                .find(|k| bare_words.iter().any(|w| w == *k))
                .cloned(),
        }
    }

    fn invalid_tables(&self, table_refs: &[String], cte_names: &BTreeSet<String>) -> Vec<String> {
        let invalid: BTreeSet<String> = table_refs
            .iter()
            .filter(|name| !cte_names.contains(name.as_str()))
            .filter(|name| {
                let unqualified = name.strip_prefix("public.").unwrap_or(name.as_str());
                !self.allowed_tables.contains(unqualified)
            })
            .cloned()
            .collect();
        invalid.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_message() {
        let gate = SqlSafetyGate::default();
        let outcome = gate.validate("SELECT * FROM users WHERE id = 1");
        assert!(!outcome.accepted);
        assert_eq!(outcome.message().as_deref(), Some("Invalid table names: users"));
    }

    #[test]
    fn test_public_schema_is_allowed() {
        let gate = SqlSafetyGate::default();
        assert!(gate.validate("SELECT * FROM public.matches LIMIT 5").accepted);
        assert_eq!(
            gate.check("SELECT * FROM archive.matches LIMIT 5"),
            Err(ValidationError::InvalidTable(vec!["archive.matches".to_string()]))
        );
    }

    #[test]
    fn test_first_blocked_keyword_in_order_is_reported() {
        let gate = SqlSafetyGate::default();
        assert_eq!(
            gate.check("SELECT 'insert then drop' FROM teams"),
            Err(ValidationError::ForbiddenKeyword("DROP".to_string()))
        );
    }
}
