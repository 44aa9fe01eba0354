//! WHERE and ORDER BY clause building
//!
//! Conditions reference columns of a single table. Values are converted to
//! the column's type and bound as parameters; field names are checked
//! against the table before they are quoted into SQL.

use serde::{Deserialize, Serialize};

use crate::schema::TableSchema;
use crate::sql::sanitize::quote_identifier;
use crate::sql::value::SqlValue;

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// SQL LIKE on the text form of the column; `%` and `_` are wildcards
    Like,
}

impl CompareOp {
    /// Parse the operator names used in `filter[field][op]`
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "eq" => Some(Self::Eq),
            "ne" | "neq" => Some(Self::Ne),
            "gt" => Some(Self::Gt),
            "gte" | "ge" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" | "le" => Some(Self::Lte),
            "like" => Some(Self::Like),
            _ => None,
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Like => "LIKE",
        }
    }
}

/// Filter expression over the columns of one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Condition {
    Compare {
        field: String,
        cmp: CompareOp,
        value: serde_json::Value,
    },
    In {
        field: String,
        values: Vec<serde_json::Value>,
    },
    IsNull {
        field: String,
    },
    IsNotNull {
        field: String,
    },
    And {
        conditions: Vec<Condition>,
    },
    Or {
        conditions: Vec<Condition>,
    },
    Not {
        condition: Box<Condition>,
    },
}

impl Condition {
    pub fn compare(field: impl Into<String>, cmp: CompareOp, value: serde_json::Value) -> Self {
        Self::Compare {
            field: field.into(),
            cmp,
            value,
        }
    }

    pub fn eq(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    pub fn gt(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    pub fn lt(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::compare(field, CompareOp::Like, serde_json::Value::String(pattern.into()))
    }

    pub fn is_in(field: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        Self::In {
            field: field.into(),
            values,
        }
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Self::IsNull {
            field: field.into(),
        }
    }

    pub fn and(conditions: Vec<Condition>) -> Self {
        Self::And { conditions }
    }

    pub fn or(conditions: Vec<Condition>) -> Self {
        Self::Or { conditions }
    }

    pub fn negate(condition: Condition) -> Self {
        Self::Not {
            condition: Box::new(condition),
        }
    }

    /// Combine with another condition, flattening nested ANDs
    pub fn and_also(self, other: Condition) -> Self {
        match self {
            Self::And { mut conditions } => {
                conditions.push(other);
                Self::And { conditions }
            }
            first => Self::And {
                conditions: vec![first, other],
            },
        }
    }
}

/// Build a parameterised WHERE fragment
///
/// Placeholders start at `*param_offset`, which is advanced past the last
/// one used. Returns the clause and its parameters in placeholder order.
pub fn build_condition_clause(
    condition: &Condition,
    table: &TableSchema,
    param_offset: &mut usize,
) -> Result<(String, Vec<SqlValue>), String> {
    match condition {
        Condition::And { conditions } => join_clauses(conditions, " AND ", table, param_offset),
        Condition::Or { conditions } => join_clauses(conditions, " OR ", table, param_offset),
        Condition::Not { condition } => {
            let (clause, params) = build_condition_clause(condition, table, param_offset)?;
            Ok((format!("NOT ({})", clause), params))
        }
        Condition::IsNull { field } => {
            let column = resolve_column(table, field)?;
            Ok((format!("{} IS NULL", column), Vec::new()))
        }
        Condition::IsNotNull { field } => {
            let column = resolve_column(table, field)?;
            Ok((format!("{} IS NOT NULL", column), Vec::new()))
        }
        Condition::Compare { field, cmp, value } => {
            let column = resolve_column(table, field)?;

            if value.is_null() {
                return match cmp {
                    CompareOp::Eq => Ok((format!("{} IS NULL", column), Vec::new())),
                    CompareOp::Ne => Ok((format!("{} IS NOT NULL", column), Vec::new())),
                    _ => Err(format!("{:?} comparison with null is not supported", cmp)),
                };
            }

            if *cmp == CompareOp::Like {
                let pattern = value
                    .as_str()
                    .ok_or_else(|| format!("LIKE on '{}' requires a string pattern", field))?;
                let clause = format!("{}::text LIKE ${}", column, param_offset);
                *param_offset += 1;
                return Ok((clause, vec![SqlValue::Text(Some(pattern.to_string()))]));
            }

            let param = typed_param(table, field, value)?;
            let clause = format!("{} {} ${}", column, cmp.sql(), param_offset);
            *param_offset += 1;
            Ok((clause, vec![param]))
        }
        Condition::In { field, values } => {
            let column = resolve_column(table, field)?;
            if values.is_empty() {
                return Ok(("FALSE".to_string(), Vec::new()));
            }

            let mut placeholders = Vec::with_capacity(values.len());
            let mut params = Vec::with_capacity(values.len());
            for value in values {
                params.push(typed_param(table, field, value)?);
                placeholders.push(format!("${}", param_offset));
                *param_offset += 1;
            }
            Ok((format!("{} IN ({})", column, placeholders.join(", ")), params))
        }
    }
}

fn join_clauses(
    conditions: &[Condition],
    separator: &str,
    table: &TableSchema,
    param_offset: &mut usize,
) -> Result<(String, Vec<SqlValue>), String> {
    if conditions.is_empty() {
        return Err(format!(
            "{} requires at least one condition",
            separator.trim()
        ));
    }

    let mut clauses = Vec::with_capacity(conditions.len());
    let mut params = Vec::new();
    for sub in conditions {
        let (clause, mut sub_params) = build_condition_clause(sub, table, param_offset)?;
        clauses.push(format!("({})", clause));
        params.append(&mut sub_params);
    }
    Ok((clauses.join(separator), params))
}

fn resolve_column(table: &TableSchema, field: &str) -> Result<String, String> {
    table
        .column(field)
        .map(|c| quote_identifier(&c.name))
        .ok_or_else(|| {
            format!(
                "Unknown filter field '{}' on {}",
                field, table.collection_name
            )
        })
}

fn typed_param(
    table: &TableSchema,
    field: &str,
    value: &serde_json::Value,
) -> Result<SqlValue, String> {
    let column = table
        .column(field)
        .ok_or_else(|| format!("Unknown filter field '{}'", field))?;
    SqlValue::from_json(&column.column_type, field, value)
}

/// Build an ORDER BY clause from a JSON:API `sort` parameter
///
/// Fields are comma separated, a leading `-` sorts descending. The primary
/// key is appended as a tiebreaker so pages are stable. Returns the clause
/// without the `ORDER BY` prefix.
pub fn build_order_by_clause(sort: Option<&str>, table: &TableSchema) -> Result<String, String> {
    let pk = table
        .primary_key()
        .map(|c| c.name.as_str())
        .unwrap_or("id");

    let mut parts = Vec::new();
    let mut has_pk = false;

    for raw in sort.unwrap_or("").split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let (field, direction) = match raw.strip_prefix('-') {
            Some(rest) => (rest, "DESC"),
            None => (raw.strip_prefix('+').unwrap_or(raw), "ASC"),
        };
        if table.column(field).is_none() {
            return Err(format!(
                "Invalid sort field: '{}'. Must be a column of {}.",
                field, table.collection_name
            ));
        }
        has_pk |= field == pk;
        parts.push(format!("{} {}", quote_identifier(field), direction));
    }

    if !has_pk {
        parts.push(format!("{} ASC", quote_identifier(pk)));
    }

    Ok(parts.join(", "))
}
