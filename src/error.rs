//! Error types for store and API operations

use thiserror::Error;

/// Errors that can occur while reading or writing retail resources
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Unknown relationship: {0}")]
    UnknownRelationship(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unknown_collection(msg: impl Into<String>) -> Self {
        Self::UnknownCollection(msg.into())
    }

    pub fn unknown_relationship(msg: impl Into<String>) -> Self {
        Self::UnknownRelationship(msg.into())
    }

    pub fn not_found(collection: &str, id: i64) -> Self {
        Self::ResourceNotFound(format!("{}/{}", collection, id))
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    /// Translate constraint violations reported by PostgreSQL into domain errors.
    ///
    /// Anything that is not a recognised constraint violation stays an SQL error.
    pub fn from_db(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let detail = db_err.message().to_string();
            match db_err.code().as_deref() {
                Some("23503") => return Self::Conflict(format!("Foreign key violation: {}", detail)),
                Some("23505") => return Self::Conflict(format!("Unique violation: {}", detail)),
                Some("23502") => return Self::Validation(format!("Not null violation: {}", detail)),
                _ => {}
            }
        }
        Self::Sql(err)
    }

    /// HTTP status code this error maps to on the JSON:API surface
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::InvalidQuery(_) | Self::Json(_) => 400,
            Self::UnknownCollection(_)
            | Self::UnknownRelationship(_)
            | Self::ResourceNotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Sql(_) => 500,
            Self::Connection(_) => 503,
        }
    }

    /// Short human-readable title used in JSON:API error objects
    pub fn title(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Validation error",
            Self::UnknownCollection(_) => "Unknown collection",
            Self::UnknownRelationship(_) => "Unknown relationship",
            Self::ResourceNotFound(_) => "Resource not found",
            Self::Conflict(_) => "Conflict",
            Self::InvalidQuery(_) => "Invalid query",
            Self::Sql(_) => "Database error",
            Self::Connection(_) => "Service unavailable",
            Self::Json(_) => "Malformed JSON",
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
