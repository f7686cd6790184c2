//! Statement result types.
//!
//! Defines the structures used to represent results returned by the warehouse.

use serde::Serialize;

/// Result of executing one statement.
#[derive(Debug, Clone, Default)]
pub struct StatementResult {
    /// Column metadata for the result set.
    pub columns: Vec<ColumnDescriptor>,

    /// Rows of data.
    pub rows: Vec<Row>,

    /// Number of rows returned (may be truncated).
    pub row_count: usize,

    /// Total number of rows before truncation (if known).
    pub total_rows: Option<usize>,

    /// Whether rows were dropped to honor the row limit.
    pub was_truncated: bool,

    /// Warehouse-assigned statement identifier.
    pub statement_id: Option<String>,
}

impl StatementResult {
    /// Creates an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a result with the given columns and rows.
    pub fn with_data(columns: Vec<ColumnDescriptor>, rows: Vec<Row>) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
            total_rows: Some(row_count),
            ..Self::default()
        }
    }

    /// Sets the statement identifier.
    pub fn with_statement_id(mut self, id: impl Into<String>) -> Self {
        self.statement_id = Some(id.into());
        self
    }

    /// Drops rows beyond `max_rows`, recording the truncation.
    pub fn truncate(mut self, max_rows: usize) -> Self {
        let total = self.total_rows.unwrap_or(self.rows.len()).max(self.rows.len());
        if self.rows.len() > max_rows {
            self.rows.truncate(max_rows);
        }
        self.row_count = self.rows.len();
        self.total_rows = Some(total);
        self.was_truncated = total > self.row_count;
        self
    }

    /// Returns a truncation warning message if the result was truncated.
    pub fn truncation_warning(&self) -> Option<String> {
        if self.was_truncated {
            let total = self.total_rows.unwrap_or(self.row_count);
            Some(format!(
                "Result truncated: showing {} of {} rows",
                self.row_count, total
            ))
        } else {
            None
        }
    }

    /// Column names in result order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Column metadata as reported by the warehouse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,

    /// Declared type (e.g. `fixed`, `text`, `timestamp_ntz`).
    #[serde(rename = "type")]
    pub data_type: String,

    pub nullable: bool,

    pub scale: Option<i64>,

    pub precision: Option<i64>,
}

impl ColumnDescriptor {
    /// Creates a nullable column with no numeric metadata.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            scale: None,
            precision: None,
        }
    }

    /// Sets numeric scale and precision.
    pub fn with_numeric(mut self, precision: i64, scale: i64) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    /// Sets nullability.
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

/// A row of data from a statement result.
pub type Row = Vec<Value>;

/// A normalized cell value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (up to i64).
    Int(i64),

    /// Floating point number.
    Float(f64),

    /// Text, dates and times rendered as ISO strings.
    String(String),

    /// Semi-structured value (variant, object, array).
    Json(serde_json::Value),
}

impl Value {
    /// Converts the value to its JSON representation.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Json(v) => v.clone(),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
