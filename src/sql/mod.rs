//! SQL utilities
//!
//! DDL generation, condition building, typed parameters and identifier sanitization.

pub mod condition;
pub mod ddl;
pub mod sanitize;
pub mod value;

pub use condition::{CompareOp, Condition, build_condition_clause, build_order_by_clause};
pub use ddl::DdlGenerator;
pub use sanitize::{POSTGRES_RESERVED_WORDS, qualified_table, quote_identifier, validate_identifier};
pub use value::SqlValue;
