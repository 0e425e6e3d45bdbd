//! Statement Scanner
//!
//! Turns SQL text into the small amount of structure the safety gate needs:
//! the leading keyword of every statement, the names introduced by WITH
//! clauses, and every relation referenced in a FROM / JOIN position.
//!
//! Tokenization is done by `sqlparser`, so string literals, quoted
//! identifiers and comments can never be mistaken for structure. The scan
//! itself is a state machine over the significant tokens, not a full parse.

use crate::error::ValidationError;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer};
use std::collections::BTreeSet;

/// Structure extracted from one piece of SQL text.
#[derive(Debug, Clone, Default)]
pub struct SqlShape {
    pub statements: Vec<StatementHead>,
    /// Lowercased, possibly schema-qualified relation names in order of appearance.
    pub table_refs: Vec<String>,
    pub cte_names: BTreeSet<String>,
    /// Uppercased unquoted word tokens.
    pub bare_words: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementHead {
    pub leading_keyword: Option<String>,
    pub is_select: bool,
}

/// Tokenize and scan `sql`.
pub fn scan(sql: &str) -> Result<SqlShape, ValidationError> {
    let dialect = PostgreSqlDialect {};
    let tokens = Tokenizer::new(&dialect, sql)
        .tokenize()
        .map_err(|e| ValidationError::ParseFailure(e.to_string()))?;

    let tokens: Vec<Token> = tokens
        .into_iter()
        .filter(|t| !matches!(t, Token::Whitespace(_) | Token::EOF))
        .collect();

    let statements = split_statements(&tokens)?;
    if statements.is_empty() {
        return Err(ValidationError::ParseFailure(
            "no SQL statement found".to_string(),
        ));
    }

    let mut shape = SqlShape::default();
    for statement in statements {
        shape.statements.push(statement_head(statement));
        shape.cte_names.extend(collect_cte_names(statement));
        shape.table_refs.extend(collect_table_refs(statement));
    }
    shape.bare_words = tokens
        .iter()
        .filter_map(|t| match t {
            Token::Word(w) if w.quote_style.is_none() => Some(w.value.to_uppercase()),
            _ => None,
        })
        .collect();

    Ok(shape)
}

/// Split on top-level semicolons, dropping empty statements.
fn split_statements(tokens: &[Token]) -> Result<Vec<&[Token]>, ValidationError> {
    let mut statements = Vec::new();
    let mut depth: usize = 0;
    let mut start = 0;

    for (idx, token) in tokens.iter().enumerate() {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    ValidationError::ParseFailure("unbalanced parentheses".to_string())
                })?;
            }
            Token::SemiColon if depth == 0 => {
                if idx > start {
                    statements.push(&tokens[start..idx]);
                }
                start = idx + 1;
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(ValidationError::ParseFailure(
            "unbalanced parentheses".to_string(),
        ));
    }
    if start < tokens.len() {
        statements.push(&tokens[start..]);
    }
    Ok(statements)
}

/// Uppercased value of an unquoted word at `idx`.
fn keyword_at(tokens: &[Token], idx: usize) -> Option<String> {
    match tokens.get(idx) {
        Some(Token::Word(w)) if w.quote_style.is_none() => Some(w.value.to_uppercase()),
        _ => None,
    }
}

fn is_keyword(tokens: &[Token], idx: usize, keyword: &str) -> bool {
    keyword_at(tokens, idx).as_deref() == Some(keyword)
}

fn skip_open_parens(tokens: &[Token], mut idx: usize) -> usize {
    while matches!(tokens.get(idx), Some(Token::LParen)) {
        idx += 1;
    }
    idx
}

/// Index of the parenthesis closing the one at `open`.
fn matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

struct CteList {
    names: Vec<String>,
    end: usize,
}

/// Parse `[RECURSIVE] name [(cols)] AS [NOT] [MATERIALIZED] (body) [, ...]`
/// starting right after a WITH keyword.
fn parse_cte_list(tokens: &[Token], start: usize) -> Option<CteList> {
    let mut idx = start;
    if is_keyword(tokens, idx, "RECURSIVE") {
        idx += 1;
    }

    let mut names = Vec::new();
    loop {
        let name = match tokens.get(idx) {
            Some(Token::Word(w)) => w.value.to_lowercase(),
            _ => return None,
        };
        idx += 1;

        if matches!(tokens.get(idx), Some(Token::LParen)) {
            idx = matching_paren(tokens, idx)? + 1;
        }
        if !is_keyword(tokens, idx, "AS") {
            return None;
        }
        idx += 1;
        if is_keyword(tokens, idx, "NOT") {
            idx += 1;
        }
        if is_keyword(tokens, idx, "MATERIALIZED") {
            idx += 1;
        }
        if !matches!(tokens.get(idx), Some(Token::LParen)) {
            return None;
        }
        idx = matching_paren(tokens, idx)? + 1;
        names.push(name);

        if matches!(tokens.get(idx), Some(Token::Comma)) {
            idx += 1;
        } else {
            return Some(CteList { names, end: idx });
        }
    }
}

fn statement_head(tokens: &[Token]) -> StatementHead {
    let mut idx = skip_open_parens(tokens, 0);
    if is_keyword(tokens, idx, "WITH") {
        match parse_cte_list(tokens, idx + 1) {
            Some(ctes) => idx = skip_open_parens(tokens, ctes.end),
            None => {
                return StatementHead {
                    leading_keyword: Some("WITH".to_string()),
                    is_select: false,
                }
            }
        }
    }

    let leading_keyword = keyword_at(tokens, idx);
    StatementHead {
        is_select: leading_keyword.as_deref() == Some("SELECT") && !has_top_level_into(tokens),
        leading_keyword,
    }
}

/// `SELECT ... INTO name` creates a table. Only an INTO outside every
/// parenthesis belongs to the statement itself.
fn has_top_level_into(tokens: &[Token]) -> bool {
    let mut depth = 0usize;
    for (idx, token) in tokens.iter().enumerate() {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            _ if depth == 0 && is_keyword(tokens, idx, "INTO") => return true,
            _ => {}
        }
    }
    false
}

/// CTE names from every WITH clause, nested ones included.
fn collect_cte_names(tokens: &[Token]) -> Vec<String> {
    (0..tokens.len())
        .filter(|&idx| is_keyword(tokens, idx, "WITH"))
        .filter_map(|idx| parse_cte_list(tokens, idx + 1))
        .flat_map(|ctes| ctes.names)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    /// Inside a query: FROM and JOIN introduce relations.
    Query,
    /// Function arguments, value lists, column lists.
    Expression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FromState {
    Idle,
    ExpectRelation,
    AfterRelation,
}

#[derive(Debug, Clone, Copy)]
struct Scope {
    kind: ScopeKind,
    state: FromState,
}

/// Words that end a FROM list.
const CLAUSE_KEYWORDS: &[&str] = &[
    "WHERE", "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "UNION", "EXCEPT", "INTERSECT",
    "ON", "USING", "WINDOW", "FETCH", "QUALIFY", "FOR", "SELECT", "FROM", "RETURNING",
];

fn is_clause_keyword(word: &str) -> bool {
    CLAUSE_KEYWORDS.contains(&word)
}

/// A parenthesis opens a query scope when a statement keyword follows it.
fn opens_query(tokens: &[Token], open: usize) -> bool {
    let first = skip_open_parens(tokens, open + 1);
    matches!(
        keyword_at(tokens, first).as_deref(),
        Some("SELECT" | "WITH" | "VALUES" | "TABLE" | "INSERT" | "UPDATE" | "DELETE")
    )
}

/// `TABLE name` is a query of its own at a statement head, right after `(`,
/// or after a set operator.
fn starts_table_query(tokens: &[Token], idx: usize) -> bool {
    if !is_keyword(tokens, idx, "TABLE") {
        return false;
    }
    let mut head = idx;
    if head > 0 && (is_keyword(tokens, head - 1, "ALL") || is_keyword(tokens, head - 1, "DISTINCT")) {
        head -= 1;
    }
    match head.checked_sub(1) {
        None => true,
        Some(prev) => {
            matches!(tokens[prev], Token::LParen)
                || ["UNION", "EXCEPT", "INTERSECT"]
                    .iter()
                    .any(|op| is_keyword(tokens, prev, op))
        }
    }
}

/// Read `name(.name)*` starting at `idx`; returns the lowercased dotted name
/// and the index after it.
fn read_relation_name(tokens: &[Token], idx: usize) -> (String, usize) {
    let mut parts = Vec::new();
    let mut next = idx;
    while let Some(Token::Word(w)) = tokens.get(next) {
        parts.push(w.value.to_lowercase());
        next += 1;
        let continues = matches!(tokens.get(next), Some(Token::Period))
            && matches!(tokens.get(next + 1), Some(Token::Word(_)));
        if !continues {
            break;
        }
        next += 1;
    }
    (parts.join("."), next)
}

fn collect_table_refs(tokens: &[Token]) -> Vec<String> {
    let mut refs = Vec::new();
    let mut scopes = vec![Scope {
        kind: ScopeKind::Query,
        state: FromState::Idle,
    }];
    let mut idx = 0;

    while idx < tokens.len() {
        let top = scopes.len() - 1;
        match &tokens[idx] {
            Token::LParen => {
                let query = opens_query(tokens, idx);
                let scope = if scopes[top].state == FromState::ExpectRelation {
                    // Whatever alias follows the closing paren is not a relation.
                    scopes[top].state = FromState::AfterRelation;
                    if query {
                        // derived table
                        Scope {
                            kind: ScopeKind::Query,
                            state: FromState::Idle,
                        }
                    } else {
                        // parenthesized join: `FROM (a JOIN b ON ...)`
                        Scope {
                            kind: ScopeKind::Query,
                            state: FromState::ExpectRelation,
                        }
                    }
                } else if query {
                    Scope {
                        kind: ScopeKind::Query,
                        state: FromState::Idle,
                    }
                } else {
                    Scope {
                        kind: ScopeKind::Expression,
                        state: FromState::Idle,
                    }
                };
                scopes.push(scope);
                idx += 1;
                continue;
            }
            Token::RParen => {
                if scopes.len() > 1 {
                    scopes.pop();
                }
                idx += 1;
                continue;
            }
            _ => {}
        }

        if scopes[top].kind == ScopeKind::Expression {
            idx += 1;
            continue;
        }

        let word = keyword_at(tokens, idx);
        match scopes[top].state {
            FromState::Idle => {
                if starts_table_query(tokens, idx) {
                    let (name, next) = read_relation_name(tokens, idx + 1);
                    if !name.is_empty() {
                        refs.push(name);
                    }
                    idx = next.max(idx + 1);
                    continue;
                }
                let starts_list = match word.as_deref() {
                    Some("FROM") => !(idx > 0 && is_keyword(tokens, idx - 1, "DISTINCT")),
                    Some("JOIN") => true,
                    _ => false,
                };
                if starts_list {
                    scopes[top].state = FromState::ExpectRelation;
                }
            }
            FromState::ExpectRelation => match (&tokens[idx], word.as_deref()) {
                (_, Some("LATERAL")) | (_, Some("ONLY")) => {}
                (_, Some(w)) if is_clause_keyword(w) => scopes[top].state = FromState::Idle,
                (Token::Word(_), _) => {
                    let (name, next) = read_relation_name(tokens, idx);
                    refs.push(name);
                    scopes[top].state = FromState::AfterRelation;
                    idx = next;
                    continue;
                }
                _ => scopes[top].state = FromState::Idle,
            },
            FromState::AfterRelation => match (&tokens[idx], word.as_deref()) {
                (Token::Comma, _) => scopes[top].state = FromState::ExpectRelation,
                (_, Some("JOIN")) => scopes[top].state = FromState::ExpectRelation,
                (_, Some(w)) if is_clause_keyword(w) => scopes[top].state = FromState::Idle,
                // aliases, AS, and join modifiers such as LEFT OUTER
                (Token::Word(_), _) => {}
                _ => scopes[top].state = FromState::Idle,
            },
        }
        idx += 1;
    }

    refs
}
