//! Dataset - materialized query results
//!
//! Rows are kept in the order the query returned them; trend analysis treats
//! that order as the time axis.

use crate::error::{Result, StatsError};
use serde::Serialize;
use std::io::Read;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Number(f64),
    Text(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Label used when a value names an entity.
    pub fn label(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
            Value::Number(n) => Some(n.to_string()),
        }
    }

    /// Parse a raw CSV field: empty and NULL-like fields are null, anything
    /// that parses as a finite number is numeric.
    fn from_field(field: &str) -> Self {
        let trimmed = field.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") || trimmed.eq_ignore_ascii_case("nan") {
            return Value::Null;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => Value::Number(n),
            _ => Value::Text(field.to_string()),
        }
    }

    fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Bool(b) => Value::Text(b.to_string()),
            other => Value::Text(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Text,
}

/// Immutable table of rows with named, typed columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    kinds: Vec<ColumnKind>,
    rows: Vec<Vec<Value>>,
}

impl Dataset {
    /// A column is numeric when it has at least one value and every
    /// non-null value is a number.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> std::result::Result<Self, StatsError> {
        for (idx, name) in columns.iter().enumerate() {
            if columns[..idx].contains(name) {
                return Err(StatsError::MalformedDataset(format!(
                    "duplicate column '{}'",
                    name
                )));
            }
        }
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != columns.len()) {
            return Err(StatsError::MalformedDataset(format!(
                "row {} has {} values, expected {}",
                idx,
                row.len(),
                columns.len()
            )));
        }

        let kinds = (0..columns.len())
            .map(|col| {
                let mut non_null = rows.iter().map(|r| &r[col]).filter(|v| !v.is_null()).peekable();
                let has_values = non_null.peek().is_some();
                if has_values && non_null.all(|v| matches!(v, Value::Number(_))) {
                    ColumnKind::Numeric
                } else {
                    ColumnKind::Text
                }
            })
            .collect();

        Ok(Self {
            columns,
            kinds,
            rows,
        })
    }

    /// Build from a JSON array of row objects. Columns appear in the order
    /// serde_json yields object keys (sorted), first row first; missing keys
    /// are null.
    pub fn from_json_rows(value: &serde_json::Value) -> Result<Self> {
        let rows = value.as_array().ok_or_else(|| {
            StatsError::MalformedDataset("expected a JSON array of row objects".to_string())
        })?;

        let mut columns: Vec<String> = Vec::new();
        for row in rows {
            let object = row.as_object().ok_or_else(|| {
                StatsError::MalformedDataset("every row must be a JSON object".to_string())
            })?;
            for key in object.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }

        let values = rows
            .iter()
            .filter_map(|row| row.as_object())
            .map(|object| {
                columns
                    .iter()
                    .map(|c| object.get(c).map(Value::from_json).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Ok(Self::new(columns, values)?)
    }

    /// Build from CSV with a header row.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let columns: Vec<String> = csv_reader.headers()?.iter().map(|h| h.to_string()).collect();
        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            rows.push(record.iter().map(Value::from_field).collect());
        }

        Ok(Self::new(columns, rows)?)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column_kind(&self, idx: usize) -> Option<ColumnKind> {
        self.kinds.get(idx).copied()
    }

    pub fn is_numeric(&self, idx: usize) -> bool {
        self.column_kind(idx) == Some(ColumnKind::Numeric)
    }

    /// Indices of numeric columns in column order.
    pub fn numeric_columns(&self) -> Vec<usize> {
        (0..self.columns.len()).filter(|&c| self.is_numeric(c)).collect()
    }

    pub fn value(&self, row: usize, col: usize) -> &Value {
        &self.rows[row][col]
    }

    /// Column values as numbers, nulls as `None`.
    pub fn numeric_values(&self, col: usize) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r[col].as_f64()).collect()
    }

    /// Non-null numbers of a column paired with their row index.
    pub fn series(&self, col: usize) -> Vec<(usize, f64)> {
        self.rows
            .iter()
            .enumerate()
            .filter_map(|(idx, r)| r[col].as_f64().map(|v| (idx, v)))
            .collect()
    }

    pub fn null_count(&self, col: usize) -> usize {
        self.rows.iter().filter(|r| r[col].is_null()).count()
    }
}
