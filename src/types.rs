//! Column types and column definitions
//!
//! The retail schema only uses four column types. Each maps to a PostgreSQL
//! type and knows how to validate an incoming JSON attribute value.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Column Types
// ============================================================================

/// Column type with validation rules and SQL mapping
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ColumnType {
    /// Integer field (maps to BIGINT)
    Integer,

    /// Floating point field (maps to DOUBLE PRECISION)
    Float,

    /// Text field, optionally length-limited (maps to TEXT or VARCHAR(n))
    String {
        #[serde(default, rename = "maxLength", skip_serializing_if = "Option::is_none")]
        max_length: Option<u32>,
    },

    /// Timestamp, stored in UTC (maps to TIMESTAMPTZ)
    DateTime,
}

impl ColumnType {
    /// Unbounded text column
    pub const fn text() -> Self {
        ColumnType::String { max_length: None }
    }

    /// Length-limited text column
    pub const fn varchar(max_length: u32) -> Self {
        ColumnType::String {
            max_length: Some(max_length),
        }
    }

    /// Convert column type to PostgreSQL type string
    pub fn to_sql_type(&self) -> String {
        match self {
            ColumnType::Integer => "BIGINT".to_string(),
            ColumnType::Float => "DOUBLE PRECISION".to_string(),
            ColumnType::String { max_length: None } => "TEXT".to_string(),
            ColumnType::String {
                max_length: Some(n),
            } => format!("VARCHAR({})", n),
            ColumnType::DateTime => "TIMESTAMPTZ".to_string(),
        }
    }

    /// Validate that a JSON value is compatible with this column type
    ///
    /// Null always passes; nullability is checked against the column definition.
    pub fn validate_value(&self, value: &serde_json::Value) -> Result<(), String> {
        if value.is_null() {
            return Ok(());
        }

        match (self, value) {
            (ColumnType::Integer, serde_json::Value::Number(n)) if n.is_i64() => Ok(()),
            (ColumnType::Integer, serde_json::Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(|_| ())
                .map_err(|_| format!("Cannot convert '{}' to integer", s)),
            (ColumnType::Float, serde_json::Value::Number(_)) => Ok(()),
            (ColumnType::Float, serde_json::Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(|_| ())
                .ok_or_else(|| format!("Cannot convert '{}' to float", s)),
            (ColumnType::String { max_length }, serde_json::Value::String(s)) => {
                match max_length {
                    Some(max) if s.chars().count() > *max as usize => Err(format!(
                        "Value is {} characters long, maximum is {}",
                        s.chars().count(),
                        max
                    )),
                    _ => Ok(()),
                }
            }
            (ColumnType::DateTime, serde_json::Value::String(s)) => parse_datetime(s).map(|_| ()),
            _ => Err(format!("Type mismatch: expected {}, got {}", self.label(), value)),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::String { .. } => "string",
            ColumnType::DateTime => "datetime",
        }
    }
}

/// Parse a timestamp attribute
///
/// Accepts RFC 3339 as well as naive `YYYY-MM-DD HH:MM:SS[.f]` and
/// `YYYY-MM-DDTHH:MM:SS[.f]`, which are taken to be UTC.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(format!("Invalid datetime '{}'", s))
}

// ============================================================================
// Column and Index Definitions
// ============================================================================

/// Reference from a foreign-key column to the primary key of another table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForeignKey {
    /// Referenced table name
    pub table: String,
    /// Referenced column (always the primary key)
    pub column: String,
}

fn default_nullable() -> bool {
    true
}

/// Column definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnDefinition {
    /// Column name (must be a valid PostgreSQL identifier)
    pub name: String,

    /// Column type with validation rules
    #[serde(flatten)]
    pub column_type: ColumnType,

    /// Whether the column allows NULL values (default: true)
    #[serde(default = "default_nullable")]
    pub nullable: bool,

    /// Whether this column is the table's primary key
    #[serde(default, rename = "primaryKey")]
    pub primary_key: bool,

    /// Foreign key target, if any
    #[serde(default, rename = "references", skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKey>,
}

impl ColumnDefinition {
    /// Create a new nullable column definition
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            primary_key: false,
            foreign_key: None,
        }
    }

    /// Integer primary key column named `id`
    pub fn id() -> Self {
        Self::new("id", ColumnType::Integer).primary_key()
    }

    /// Integer column referencing `table.id`
    pub fn foreign_key(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Integer).references(table, "id")
    }

    /// Set the column as non-nullable
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Mark the column as primary key (implies NOT NULL)
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Reference another table's column
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_key = Some(ForeignKey {
            table: table.into(),
            column: column.into(),
        });
        self
    }

    /// Whether a value must be supplied when inserting a row
    pub fn is_required(&self) -> bool {
        !self.nullable && !self.primary_key
    }
}

/// Index definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexDefinition {
    /// Index name (prefixed with the table name when created)
    pub name: String,

    /// Columns included in the index
    pub columns: Vec<String>,

    /// Whether this is a UNIQUE index (default: false)
    #[serde(default)]
    pub unique: bool,
}

impl IndexDefinition {
    /// Create a new index definition
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            unique: false,
        }
    }

    /// Set the index as unique
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}
