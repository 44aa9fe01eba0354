//! Typed SQL parameters
//!
//! JSON attribute values are converted to a column-typed parameter before
//! binding, so comparisons and inserts use the column's native type.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::Postgres;

use crate::types::{ColumnType, parse_datetime};

/// A bind parameter carrying its column type, including typed NULLs
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Integer(Option<i64>),
    Float(Option<f64>),
    Text(Option<String>),
    DateTime(Option<DateTime<Utc>>),
}

impl SqlValue {
    /// Convert a JSON value for a column of `column_type`
    ///
    /// Accepts the same coercions as [`ColumnType::validate_value`].
    pub fn from_json(
        column_type: &ColumnType,
        column_name: &str,
        value: &serde_json::Value,
    ) -> Result<Self, String> {
        column_type
            .validate_value(value)
            .map_err(|e| format!("Invalid value for '{}': {}", column_name, e))?;

        if value.is_null() {
            return Ok(Self::null(column_type));
        }

        Ok(match column_type {
            ColumnType::Integer => Self::Integer(Some(
                value
                    .as_i64()
                    .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
                    .ok_or_else(|| format!("'{}' expected integer", column_name))?,
            )),
            ColumnType::Float => Self::Float(Some(
                value
                    .as_f64()
                    .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
                    .ok_or_else(|| format!("'{}' expected float", column_name))?,
            )),
            ColumnType::String { .. } => Self::Text(Some(
                value
                    .as_str()
                    .ok_or_else(|| format!("'{}' expected string", column_name))?
                    .to_string(),
            )),
            ColumnType::DateTime => {
                let raw = value
                    .as_str()
                    .ok_or_else(|| format!("'{}' expected datetime string", column_name))?;
                Self::DateTime(Some(parse_datetime(raw)?))
            }
        })
    }

    /// Typed NULL for a column
    pub fn null(column_type: &ColumnType) -> Self {
        match column_type {
            ColumnType::Integer => Self::Integer(None),
            ColumnType::Float => Self::Float(None),
            ColumnType::String { .. } => Self::Text(None),
            ColumnType::DateTime => Self::DateTime(None),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(
            self,
            Self::Integer(None) | Self::Float(None) | Self::Text(None) | Self::DateTime(None)
        )
    }

    /// Bind onto a query
    pub fn bind<'q>(
        self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        match self {
            Self::Integer(v) => query.bind(v),
            Self::Float(v) => query.bind(v),
            Self::Text(v) => query.bind(v),
            Self::DateTime(v) => query.bind(v),
        }
    }
}

/// Bind every parameter in order
pub fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: impl IntoIterator<Item = SqlValue>,
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = param.bind(query);
    }
    query
}
