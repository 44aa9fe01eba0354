//! Identifier quoting and validation
//!
//! Every table, column and namespace name reaches SQL through these helpers.

use std::sync::LazyLock;

use regex::Regex;

/// PostgreSQL reserved keywords that cannot be used as unquoted identifiers
pub const POSTGRES_RESERVED_WORDS: &[&str] = &[
    "ALL",
    "ANALYSE",
    "ANALYZE",
    "AND",
    "ANY",
    "ARRAY",
    "AS",
    "ASC",
    "ASYMMETRIC",
    "BOTH",
    "CASE",
    "CAST",
    "CHECK",
    "COLLATE",
    "COLUMN",
    "CONSTRAINT",
    "CREATE",
    "CURRENT_CATALOG",
    "CURRENT_DATE",
    "CURRENT_ROLE",
    "CURRENT_TIME",
    "CURRENT_TIMESTAMP",
    "CURRENT_USER",
    "DEFAULT",
    "DEFERRABLE",
    "DESC",
    "DISTINCT",
    "DO",
    "ELSE",
    "END",
    "EXCEPT",
    "FALSE",
    "FETCH",
    "FOR",
    "FOREIGN",
    "FROM",
    "GRANT",
    "GROUP",
    "HAVING",
    "IN",
    "INITIALLY",
    "INTERSECT",
    "INTO",
    "LATERAL",
    "LEADING",
    "LIMIT",
    "LOCALTIME",
    "LOCALTIMESTAMP",
    "NOT",
    "NULL",
    "OFFSET",
    "ON",
    "ONLY",
    "OR",
    "ORDER",
    "PLACING",
    "PRIMARY",
    "REFERENCES",
    "RETURNING",
    "SELECT",
    "SESSION_USER",
    "SOME",
    "SYMMETRIC",
    "TABLE",
    "THEN",
    "TO",
    "TRAILING",
    "TRUE",
    "UNION",
    "UNIQUE",
    "USER",
    "USING",
    "VARIADIC",
    "WHEN",
    "WHERE",
    "WINDOW",
    "WITH",
];

static IDENTIFIER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("identifier pattern is valid"));

/// Quote a SQL identifier, doubling any embedded double quotes
///
/// # Example
/// ```
/// use retail_store::sql::quote_identifier;
///
/// assert_eq!(quote_identifier("customers"), "\"customers\"");
/// ```
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Quote a table name qualified by its PostgreSQL schema
///
/// ```
/// use retail_store::sql::qualified_table;
///
/// assert_eq!(qualified_table("shop", "orders"), "\"shop\".\"orders\"");
/// ```
pub fn qualified_table(namespace: &str, table: &str) -> String {
    format!("{}.{}", quote_identifier(namespace), quote_identifier(table))
}

/// Validate a namespace, table or column name
///
/// Names must start with a lowercase letter, contain only `[a-z0-9_]`, and
/// must not be a PostgreSQL reserved word.
///
/// ```
/// use retail_store::sql::validate_identifier;
///
/// assert!(validate_identifier("customer_addresses").is_ok());
/// assert!(validate_identifier("order").is_err());
/// ```
pub fn validate_identifier(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Identifier cannot be empty".to_string());
    }

    if !IDENTIFIER_PATTERN.is_match(name) {
        return Err(format!(
            "Identifier '{}' is invalid. Must start with a lowercase letter and contain only lowercase letters, numbers, and underscores.",
            name
        ));
    }

    if POSTGRES_RESERVED_WORDS.contains(&name.to_uppercase().as_str()) {
        return Err(format!(
            "Identifier '{}' is a PostgreSQL reserved keyword and cannot be used.",
            name
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("orders"), "\"orders\"");
        assert_eq!(quote_identifier("zip_code"), "\"zip_code\"");
        assert_eq!(quote_identifier(""), "\"\"");
    }

    #[test]
    fn test_quote_identifier_escapes_quotes() {
        assert_eq!(
            quote_identifier("items\"; DROP TABLE orders; --"),
            "\"items\"\"; DROP TABLE orders; --\""
        );
    }

    #[test]
    fn test_qualified_table() {
        assert_eq!(
            qualified_table("public", "customer_addresses"),
            "\"public\".\"customer_addresses\""
        );
    }

    #[test]
    fn test_validate_retail_table_names() {
        for name in [
            "addresses",
            "categories",
            "customers",
            "products",
            "suppliers",
            "customer_addresses",
            "orders",
            "payments",
            "product_categories",
            "supplier_products",
            "invoices",
            "items",
        ] {
            assert!(validate_identifier(name).is_ok(), "{} should be valid", name);
        }
    }

    #[test]
    fn test_validate_identifier_empty() {
        let result = validate_identifier("");
        assert!(result.unwrap_err().contains("cannot be empty"));
    }

    #[test]
    fn test_validate_identifier_bad_shapes() {
        assert!(validate_identifier("1orders").is_err());
        assert!(validate_identifier("_orders").is_err());
        assert!(validate_identifier("Orders").is_err());
        assert!(validate_identifier("order-items").is_err());
        assert!(validate_identifier("shop.orders").is_err());
        assert!(validate_identifier("unit price").is_err());
    }

    #[test]
    fn test_validate_identifier_reserved_keyword() {
        let result = validate_identifier("order");
        assert!(result.unwrap_err().contains("reserved keyword"));
        assert!(validate_identifier("user").is_err());
        assert!(validate_identifier("table").is_err());
    }

    #[test]
    fn test_validate_identifier_accepts_id() {
        assert!(validate_identifier("id").is_ok());
    }
}
