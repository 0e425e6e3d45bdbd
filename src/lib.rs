pub mod config;
pub mod entities;
pub mod error;
pub mod safety;
pub mod stats;

pub use config::{InsightConfig, KeywordScan};
pub use entities::{EntityNormalizer, EntityValidation, MetricResolver, RawEntities, TeamMatch};
pub use error::{InsightError, ResolutionError, Result, StatsError, ValidationError};
pub use safety::{SqlSafetyGate, ValidationOutcome};
pub use stats::{AnalysisKind, CombinedStats, Dataset, StatParams, StatResult, StatisticsEngine};
