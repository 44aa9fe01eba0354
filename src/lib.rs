//! # retail-store
//!
//! The retail order-management schema (customers, addresses, products,
//! categories, suppliers, orders, items, invoices and payments) stored in
//! PostgreSQL and exposed as a JSON:API.
//!
//! The schema is declared once in [`catalog`]. From that declaration the
//! crate creates the tables, validates and stores resources, follows
//! relationships in both directions and serves everything over HTTP.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use retail_store::{QueryParams, ResourceRequest, ResourceStore, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StoreConfig::builder("postgres://localhost/retail").build();
//!     let store = ResourceStore::new(config).await?;
//!     store.migrate().await?;
//!
//!     let customer = store
//!         .create(
//!             "Customer",
//!             ResourceRequest::from_json(
//!                 "Customer",
//!                 serde_json::json!({"name": "Alice", "credit_limit": 1000.0, "balance": 0.0}),
//!             ),
//!         )
//!         .await?;
//!
//!     let query = QueryParams::new(store.config()).with_sort("-balance");
//!     let (customers, total) = store.list("Customer", &query).await?;
//!     println!("{} of {} customers, first id {}", customers.len(), total, customer.id);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use retail_store::StoreConfig;
//!
//! let config = StoreConfig::builder("postgres://localhost/retail")
//!     .namespace("shop")                    // PostgreSQL schema (default "public")
//!     .default_page_limit(20)               // page[limit] when omitted
//!     .base_url("https://retail.example")   // absolute links in documents
//!     .build();
//! assert_eq!(config.link("/Order/1"), "https://retail.example/api/Order/1");
//! ```

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod models;
pub mod resource;
pub mod schema;
pub mod sql;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use catalog::Catalog;
pub use config::{StoreConfig, StoreConfigBuilder};
pub use error::{Result, StoreError};
pub use models::Entity;
pub use resource::{
    Document, ErrorDocument, Linkage, QueryParams, Resource, ResourceIdentifier, ResourceRequest,
};
pub use schema::{Relationship, RelationshipKind, TableSchema};
pub use store::{Related, ResourceStore};
pub use types::{ColumnDefinition, ColumnType, IndexDefinition};

// Re-export SQL utilities for advanced users
pub use sql::condition::{CompareOp, Condition, build_condition_clause, build_order_by_clause};
pub use sql::ddl::DdlGenerator;
pub use sql::sanitize::{quote_identifier, validate_identifier};
