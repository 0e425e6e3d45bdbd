use serde::Serialize;
use thiserror::Error;

/// Reasons the SQL safety gate refuses a candidate query.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("Only SELECT statements are allowed")]
    NotSelect,

    #[error("Forbidden keyword found: {0}")]
    ForbiddenKeyword(String),

    #[error("Invalid table names: {}", .0.join(", "))]
    InvalidTable(Vec<String>),

    #[error("Query too short to be valid")]
    TooShort,

    #[error("Unable to parse SQL query: {0}")]
    ParseFailure(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Could not resolve '{0}'")]
    Unresolved(String),

    #[error("Ambiguous match, candidates: {}", .0.join(", "))]
    Ambiguous(Vec<String>),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    #[error("Insufficient data: need at least {needed} values, found {found}")]
    InsufficientData { needed: usize, found: usize },

    #[error("No numeric columns available for analysis")]
    NoNumericColumns,

    #[error("No column available to group entities by")]
    NoGroupColumn,

    #[error("Need at least 2 entities to compare, found {0}")]
    TooFewEntities(usize),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Unknown analysis type: {0}")]
    UnknownKind(String),

    #[error("Malformed dataset: {0}")]
    MalformedDataset(String),

    #[error("Computation produced a non-finite {0}")]
    NonFinite(&'static str),
}

#[derive(Error, Debug)]
pub enum InsightError {
    #[error("SQL validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Entity resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Statistics error: {0}")]
    Stats(#[from] StatsError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, InsightError>;
