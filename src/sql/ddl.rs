//! DDL generation for the retail tables
//!
//! Generates PostgreSQL statements that create the catalog's tables inside
//! the configured namespace, with foreign keys and supporting indexes.

use crate::config::StoreConfig;
use crate::schema::TableSchema;
use crate::sql::sanitize::{qualified_table, quote_identifier};
use crate::types::{ColumnDefinition, IndexDefinition};

/// DDL generator bound to a store configuration
pub struct DdlGenerator<'a> {
    config: &'a StoreConfig,
}

impl<'a> DdlGenerator<'a> {
    pub fn new(config: &'a StoreConfig) -> Self {
        Self { config }
    }

    fn table(&self, table_name: &str) -> String {
        qualified_table(&self.config.namespace, table_name)
    }

    /// Generate CREATE SCHEMA for the configured namespace
    pub fn generate_create_namespace(&self) -> String {
        format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            quote_identifier(&self.config.namespace)
        )
    }

    /// Generate CREATE TABLE with primary key and foreign key constraints
    ///
    /// Foreign keys always reference tables in the same namespace.
    pub fn generate_create_table(&self, table: &TableSchema) -> String {
        let mut definitions: Vec<String> = table
            .columns
            .iter()
            .map(Self::format_column_definition)
            .collect();

        for col in &table.columns {
            if let Some(fk) = &col.foreign_key {
                definitions.push(format!(
                    "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({})",
                    quote_identifier(&format!("fk_{}_{}", table.table_name, col.name)),
                    quote_identifier(&col.name),
                    self.table(&fk.table),
                    quote_identifier(&fk.column)
                ));
            }
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.table(&table.table_name),
            definitions.join(", ")
        )
    }

    /// Generate one index per foreign-key column plus any declared indexes
    pub fn generate_indexes(&self, table: &TableSchema) -> Vec<String> {
        let foreign_key_indexes = table.foreign_keys().map(|col| {
            IndexDefinition::new(col.name.clone(), vec![col.name.clone()])
        });

        foreign_key_indexes
            .chain(table.indexes.iter().cloned())
            .map(|index| self.generate_create_index(&table.table_name, &index))
            .collect()
    }

    /// Generate CREATE INDEX statement; the index name is prefixed with the table name
    pub fn generate_create_index(&self, table_name: &str, index: &IndexDefinition) -> String {
        let quoted_index_name = quote_identifier(&format!("idx_{}_{}", table_name, index.name));
        let quoted_columns: Vec<String> =
            index.columns.iter().map(|col| quote_identifier(col)).collect();
        let unique_clause = if index.unique { "UNIQUE " } else { "" };

        format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {}({})",
            unique_clause,
            quoted_index_name,
            self.table(table_name),
            quoted_columns.join(", ")
        )
    }

    /// Generate DROP TABLE statement
    pub fn generate_drop_table(&self, table_name: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.table(table_name))
    }

    /// Format a single column for CREATE TABLE
    ///
    /// Primary keys are identity columns that still accept explicit values,
    /// so rows can be loaded with their existing ids.
    pub fn format_column_definition(col: &ColumnDefinition) -> String {
        let mut parts = vec![quote_identifier(&col.name), col.column_type.to_sql_type()];

        if col.primary_key {
            parts.push("GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY".to_string());
        } else if !col.nullable {
            parts.push("NOT NULL".to_string());
        }

        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::types::ColumnType;

    fn config() -> StoreConfig {
        StoreConfig::builder("postgres://localhost/test")
            .namespace("shop")
            .build()
    }

    #[test]
    fn test_create_namespace() {
        let config = config();
        assert_eq!(
            DdlGenerator::new(&config).generate_create_namespace(),
            "CREATE SCHEMA IF NOT EXISTS \"shop\""
        );
    }

    #[test]
    fn test_format_column_definitions() {
        assert_eq!(
            DdlGenerator::format_column_definition(&ColumnDefinition::id()),
            "\"id\" BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY"
        );
        assert_eq!(
            DdlGenerator::format_column_definition(
                &ColumnDefinition::new("zip_code", ColumnType::varchar(10)).not_null()
            ),
            "\"zip_code\" VARCHAR(10) NOT NULL"
        );
        assert_eq!(
            DdlGenerator::format_column_definition(&ColumnDefinition::new(
                "date_shipped",
                ColumnType::DateTime
            )),
            "\"date_shipped\" TIMESTAMPTZ"
        );
    }

    #[test]
    fn test_create_table_with_foreign_keys() {
        let config = config();
        let catalog = Catalog::retail();
        let ddl = DdlGenerator::new(&config).generate_create_table(catalog.table("Item").unwrap());

        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"shop\".\"items\" ("));
        assert!(ddl.contains("\"quantity\" BIGINT NOT NULL"));
        assert!(ddl.contains("\"unit_price\" DOUBLE PRECISION NOT NULL"));
        assert!(ddl.contains(
            "CONSTRAINT \"fk_items_order_id\" FOREIGN KEY (\"order_id\") REFERENCES \"shop\".\"orders\"(\"id\")"
        ));
        assert!(ddl.contains(
            "FOREIGN KEY (\"product_id\") REFERENCES \"shop\".\"products\"(\"id\")"
        ));
    }

    #[test]
    fn test_create_table_without_foreign_keys() {
        let config = config();
        let catalog = Catalog::retail();
        let ddl =
            DdlGenerator::new(&config).generate_create_table(catalog.table("Supplier").unwrap());

        assert!(!ddl.contains("FOREIGN KEY"));
        assert!(ddl.contains("\"contact_name\" TEXT,") || ddl.ends_with("\"contact_name\" TEXT)"));
    }

    #[test]
    fn test_foreign_key_indexes() {
        let config = config();
        let catalog = Catalog::retail();
        let generator = DdlGenerator::new(&config);

        let indexes = generator.generate_indexes(catalog.table("CustomerAddress").unwrap());
        assert_eq!(
            indexes,
            vec![
                "CREATE INDEX IF NOT EXISTS \"idx_customer_addresses_customer_id\" ON \"shop\".\"customer_addresses\"(\"customer_id\")".to_string(),
                "CREATE INDEX IF NOT EXISTS \"idx_customer_addresses_address_id\" ON \"shop\".\"customer_addresses\"(\"address_id\")".to_string(),
            ]
        );

        assert!(generator
            .generate_indexes(catalog.table("Category").unwrap())
            .is_empty());
    }

    #[test]
    fn test_declared_unique_index() {
        let config = config();
        let generator = DdlGenerator::new(&config);
        let sql = generator.generate_create_index(
            "product_categories",
            &IndexDefinition::new(
                "pair",
                vec!["product_id".to_string(), "category_id".to_string()],
            )
            .unique(),
        );
        assert_eq!(
            sql,
            "CREATE UNIQUE INDEX IF NOT EXISTS \"idx_product_categories_pair\" ON \"shop\".\"product_categories\"(\"product_id\", \"category_id\")"
        );
    }

    #[test]
    fn test_drop_table() {
        let config = config();
        assert_eq!(
            DdlGenerator::new(&config).generate_drop_table("orders"),
            "DROP TABLE IF EXISTS \"shop\".\"orders\""
        );
    }
}
