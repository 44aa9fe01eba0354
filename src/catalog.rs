//! The retail schema
//!
//! Declares the order-management tables (customers, products, orders,
//! invoices, suppliers, categories, addresses, payments and the linking
//! tables between them) and validates that every relationship is wired to a
//! real foreign key with a matching back-reference.

use std::collections::{HashMap, HashSet};

use crate::error::{Result, StoreError};
use crate::schema::{Relationship, RelationshipKind, TableSchema};
use crate::sql::sanitize::validate_identifier;
use crate::types::{ColumnDefinition, ColumnType};

/// A validated set of tables
#[derive(Debug, Clone)]
pub struct Catalog {
    tables: Vec<TableSchema>,
    /// Indexes into `tables`, parents before children
    creation_order: Vec<usize>,
}

impl Catalog {
    /// Build a catalog, checking identifiers, foreign keys and relationships
    pub fn new(tables: Vec<TableSchema>) -> Result<Self> {
        validate_tables(&tables)?;
        let creation_order = creation_order(&tables)?;
        Ok(Self {
            tables,
            creation_order,
        })
    }

    /// The built-in retail catalog
    pub fn retail() -> Self {
        Self::new(retail_tables()).expect("retail catalog is well-formed")
    }

    /// Tables in declaration order
    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    /// Tables ordered so that every referenced table precedes its children
    pub fn creation_order(&self) -> impl DoubleEndedIterator<Item = &TableSchema> {
        self.creation_order.iter().map(|&i| &self.tables[i])
    }

    /// Look a table up by its collection name
    pub fn table(&self, collection: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.collection_name == collection)
    }

    /// Look a table up by collection name, failing with `UnknownCollection`
    pub fn require(&self, collection: &str) -> Result<&TableSchema> {
        self.table(collection)
            .ok_or_else(|| StoreError::unknown_collection(collection))
    }

    /// Look a table up by its database table name
    pub fn table_by_name(&self, table_name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.table_name == table_name)
    }

    /// Look a relationship up, failing with `UnknownRelationship`
    pub fn relationship(&self, collection: &str, name: &str) -> Result<&Relationship> {
        self.require(collection)?.relationship(name).ok_or_else(|| {
            StoreError::unknown_relationship(format!("{}.{}", collection, name))
        })
    }
}

fn validate_tables(tables: &[TableSchema]) -> Result<()> {
    let mut collections = HashSet::new();
    let mut table_names = HashSet::new();

    for table in tables {
        if !collections.insert(table.collection_name.as_str()) {
            return Err(StoreError::validation(format!(
                "Duplicate collection '{}'",
                table.collection_name
            )));
        }
        if !table_names.insert(table.table_name.as_str()) {
            return Err(StoreError::validation(format!(
                "Duplicate table '{}'",
                table.table_name
            )));
        }
        validate_identifier(&table.table_name).map_err(StoreError::validation)?;

        let mut column_names = HashSet::new();
        for col in &table.columns {
            validate_identifier(&col.name).map_err(|e| {
                StoreError::validation(format!("{}.{}: {}", table.table_name, col.name, e))
            })?;
            if !column_names.insert(col.name.as_str()) {
                return Err(StoreError::validation(format!(
                    "Duplicate column '{}.{}'",
                    table.table_name, col.name
                )));
            }
        }

        let primary_keys: Vec<_> = table.columns.iter().filter(|c| c.primary_key).collect();
        match primary_keys.as_slice() {
            [pk] if pk.column_type == ColumnType::Integer => {}
            _ => {
                return Err(StoreError::validation(format!(
                    "Table '{}' must have exactly one integer primary key",
                    table.table_name
                )));
            }
        }
    }

    for table in tables {
        for col in table.foreign_keys() {
            let Some(fk) = &col.foreign_key else { continue };
            let target = tables
                .iter()
                .find(|t| t.table_name == fk.table)
                .ok_or_else(|| {
                    StoreError::validation(format!(
                        "{}.{} references unknown table '{}'",
                        table.table_name, col.name, fk.table
                    ))
                })?;
            if target.primary_key().map(|pk| pk.name.as_str()) != Some(fk.column.as_str()) {
                return Err(StoreError::validation(format!(
                    "{}.{} must reference the primary key of '{}'",
                    table.table_name, col.name, fk.table
                )));
            }
        }

        for rel in &table.relationships {
            validate_relationship(tables, table, rel)?;
        }
    }

    Ok(())
}

fn validate_relationship(
    tables: &[TableSchema],
    table: &TableSchema,
    rel: &Relationship,
) -> Result<()> {
    let context = format!("{}.{}", table.collection_name, rel.name);

    if table.column(&rel.name).is_some() {
        return Err(StoreError::validation(format!(
            "{}: relationship name clashes with a column",
            context
        )));
    }

    let target = tables
        .iter()
        .find(|t| t.collection_name == rel.target)
        .ok_or_else(|| {
            StoreError::validation(format!("{}: unknown target '{}'", context, rel.target))
        })?;

    let (child, parent) = match rel.kind {
        RelationshipKind::Parent => (table, target),
        RelationshipKind::Children => (target, table),
    };

    let fk_column = child.column(&rel.foreign_key).ok_or_else(|| {
        StoreError::validation(format!(
            "{}: foreign key '{}' is not a column of '{}'",
            context, rel.foreign_key, child.table_name
        ))
    })?;
    match &fk_column.foreign_key {
        Some(fk) if fk.table == parent.table_name => {}
        _ => {
            return Err(StoreError::validation(format!(
                "{}: '{}.{}' does not reference '{}'",
                context, child.table_name, rel.foreign_key, parent.table_name
            )));
        }
    }

    let back = target.relationship(&rel.back_populates).ok_or_else(|| {
        StoreError::validation(format!(
            "{}: back reference '{}.{}' is missing",
            context, target.collection_name, rel.back_populates
        ))
    })?;
    if back.kind == rel.kind
        || back.target != table.collection_name
        || back.foreign_key != rel.foreign_key
        || back.back_populates != rel.name
    {
        return Err(StoreError::validation(format!(
            "{}: back reference '{}.{}' does not mirror it",
            context, target.collection_name, rel.back_populates
        )));
    }

    Ok(())
}

/// Stable topological sort over foreign keys; self-references are ignored
fn creation_order(tables: &[TableSchema]) -> Result<Vec<usize>> {
    let index: HashMap<&str, usize> = tables
        .iter()
        .enumerate()
        .map(|(i, t)| (t.table_name.as_str(), i))
        .collect();

    let parents: Vec<HashSet<usize>> = tables
        .iter()
        .enumerate()
        .map(|(i, t)| {
            t.foreign_keys()
                .filter_map(|c| c.foreign_key.as_ref())
                .filter_map(|fk| index.get(fk.table.as_str()).copied())
                .filter(|&p| p != i)
                .collect()
        })
        .collect();

    let mut order = Vec::with_capacity(tables.len());
    let mut placed = vec![false; tables.len()];

    while order.len() < tables.len() {
        let next = (0..tables.len())
            .find(|&i| !placed[i] && parents[i].iter().all(|&p| placed[p]))
            .ok_or_else(|| {
                let stuck: Vec<_> = (0..tables.len())
                    .filter(|&i| !placed[i])
                    .map(|i| tables[i].table_name.as_str())
                    .collect();
                StoreError::validation(format!(
                    "Foreign keys form a cycle between: {}",
                    stuck.join(", ")
                ))
            })?;
        placed[next] = true;
        order.push(next);
    }

    Ok(order)
}

// ============================================================================
// Retail tables
// ============================================================================

fn text(name: &str) -> ColumnDefinition {
    ColumnDefinition::new(name, ColumnType::text()).not_null()
}

fn float(name: &str) -> ColumnDefinition {
    ColumnDefinition::new(name, ColumnType::Float).not_null()
}

fn fk(name: &str, table: &str) -> ColumnDefinition {
    ColumnDefinition::foreign_key(name, table).not_null()
}

/// Table declarations for the retail database
pub fn retail_tables() -> Vec<TableSchema> {
    vec![
        TableSchema::new(
            "Address",
            "addresses",
            vec![
                ColumnDefinition::id(),
                text("street"),
                text("city"),
                text("state"),
                ColumnDefinition::new("zip_code", ColumnType::varchar(10)).not_null(),
                text("country"),
            ],
        )
        .with_description("Table representing addresses which can be linked to various entities.")
        .with_relationship(Relationship::children(
            "CustomerAddressList",
            "CustomerAddress",
            "address_id",
            "address",
        )),
        TableSchema::new(
            "Category",
            "categories",
            vec![ColumnDefinition::id(), text("name")],
        )
        .with_description("Table representing product categories.")
        .with_relationship(Relationship::children(
            "ProductCategoryList",
            "ProductCategory",
            "category_id",
            "category",
        )),
        TableSchema::new(
            "Customer",
            "customers",
            vec![
                ColumnDefinition::id(),
                text("name"),
                float("credit_limit"),
                float("balance"),
            ],
        )
        .with_description(
            "Table representing customers, including their balance and credit limit.",
        )
        .with_relationship(Relationship::children(
            "CustomerAddressList",
            "CustomerAddress",
            "customer_id",
            "customer",
        ))
        .with_relationship(Relationship::children(
            "OrderList",
            "Order",
            "customer_id",
            "customer",
        ))
        .with_relationship(Relationship::children(
            "PaymentList",
            "Payment",
            "customer_id",
            "customer",
        )),
        TableSchema::new(
            "Product",
            "products",
            vec![ColumnDefinition::id(), text("name"), float("unit_price")],
        )
        .with_description("Table containing product details.")
        .with_relationship(Relationship::children(
            "ProductCategoryList",
            "ProductCategory",
            "product_id",
            "product",
        ))
        .with_relationship(Relationship::children(
            "SupplierProductList",
            "SupplierProduct",
            "product_id",
            "product",
        ))
        .with_relationship(Relationship::children(
            "ItemList",
            "Item",
            "product_id",
            "product",
        )),
        TableSchema::new(
            "Supplier",
            "suppliers",
            vec![
                ColumnDefinition::id(),
                text("name"),
                ColumnDefinition::new("contact_name", ColumnType::text()),
            ],
        )
        .with_description("Table representing suppliers providing products.")
        .with_relationship(Relationship::children(
            "SupplierProductList",
            "SupplierProduct",
            "supplier_id",
            "supplier",
        )),
        TableSchema::new(
            "CustomerAddress",
            "customer_addresses",
            vec![
                ColumnDefinition::id(),
                fk("customer_id", "customers"),
                fk("address_id", "addresses"),
                text("address_type"),
            ],
        )
        .with_description("Linking table to associate customers with addresses.")
        .with_relationship(Relationship::parent(
            "address",
            "Address",
            "address_id",
            "CustomerAddressList",
        ))
        .with_relationship(Relationship::parent(
            "customer",
            "Customer",
            "customer_id",
            "CustomerAddressList",
        )),
        TableSchema::new(
            "Order",
            "orders",
            vec![
                ColumnDefinition::id(),
                fk("customer_id", "customers"),
                float("amount_total"),
                ColumnDefinition::new("date_shipped", ColumnType::DateTime),
                ColumnDefinition::new("notes", ColumnType::text()),
            ],
        )
        .with_description("Table representing customer orders. Includes a note field.")
        .with_relationship(Relationship::parent(
            "customer",
            "Customer",
            "customer_id",
            "OrderList",
        ))
        .with_relationship(Relationship::children(
            "InvoiceList",
            "Invoice",
            "order_id",
            "order",
        ))
        .with_relationship(Relationship::children(
            "ItemList", "Item", "order_id", "order",
        )),
        TableSchema::new(
            "Payment",
            "payments",
            vec![
                ColumnDefinition::id(),
                fk("customer_id", "customers"),
                float("amount"),
                ColumnDefinition::new("payment_date", ColumnType::DateTime).not_null(),
            ],
        )
        .with_description("Table representing payments made by customers.")
        .with_relationship(Relationship::parent(
            "customer",
            "Customer",
            "customer_id",
            "PaymentList",
        )),
        TableSchema::new(
            "ProductCategory",
            "product_categories",
            vec![
                ColumnDefinition::id(),
                fk("product_id", "products"),
                fk("category_id", "categories"),
            ],
        )
        .with_description("Linking table to associate products with categories.")
        .with_relationship(Relationship::parent(
            "category",
            "Category",
            "category_id",
            "ProductCategoryList",
        ))
        .with_relationship(Relationship::parent(
            "product",
            "Product",
            "product_id",
            "ProductCategoryList",
        )),
        TableSchema::new(
            "SupplierProduct",
            "supplier_products",
            vec![
                ColumnDefinition::id(),
                fk("supplier_id", "suppliers"),
                fk("product_id", "products"),
            ],
        )
        .with_description("Linking table to associate suppliers with products they provide.")
        .with_relationship(Relationship::parent(
            "product",
            "Product",
            "product_id",
            "SupplierProductList",
        ))
        .with_relationship(Relationship::parent(
            "supplier",
            "Supplier",
            "supplier_id",
            "SupplierProductList",
        )),
        TableSchema::new(
            "Invoice",
            "invoices",
            vec![
                ColumnDefinition::id(),
                fk("order_id", "orders"),
                ColumnDefinition::new("invoice_date", ColumnType::DateTime).not_null(),
                float("total_amount"),
            ],
        )
        .with_description("Table representing invoices associated with orders.")
        .with_relationship(Relationship::parent(
            "order",
            "Order",
            "order_id",
            "InvoiceList",
        )),
        TableSchema::new(
            "Item",
            "items",
            vec![
                ColumnDefinition::id(),
                fk("order_id", "orders"),
                fk("product_id", "products"),
                ColumnDefinition::new("quantity", ColumnType::Integer).not_null(),
                float("unit_price"),
                float("amount"),
            ],
        )
        .with_description("Table representing individual items within an order.")
        .with_relationship(Relationship::parent(
            "order", "Order", "order_id", "ItemList",
        ))
        .with_relationship(Relationship::parent(
            "product",
            "Product",
            "product_id",
            "ItemList",
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retail_catalog_is_valid() {
        let catalog = Catalog::new(retail_tables()).unwrap();
        assert_eq!(catalog.tables().len(), 12);
    }

    #[test]
    fn test_lookup_by_collection_and_table() {
        let catalog = Catalog::retail();
        assert_eq!(catalog.table("Order").unwrap().table_name, "orders");
        assert_eq!(
            catalog.table_by_name("customer_addresses").unwrap().collection_name,
            "CustomerAddress"
        );
        assert!(catalog.table("orders").is_none());
        assert!(matches!(
            catalog.require("Widget"),
            Err(StoreError::UnknownCollection(_))
        ));
    }

    #[test]
    fn test_relationship_lookup() {
        let catalog = Catalog::retail();
        let rel = catalog.relationship("Customer", "OrderList").unwrap();
        assert_eq!(rel.kind, RelationshipKind::Children);
        assert_eq!(rel.target, "Order");
        assert_eq!(rel.foreign_key, "customer_id");

        assert!(matches!(
            catalog.relationship("Customer", "InvoiceList"),
            Err(StoreError::UnknownRelationship(_))
        ));
    }

    #[test]
    fn test_every_foreign_key_has_both_relationship_ends() {
        let catalog = Catalog::retail();
        let mut fk_count = 0;
        for table in catalog.tables() {
            for col in table.foreign_keys() {
                fk_count += 1;
                let parent_rel = table
                    .relationships
                    .iter()
                    .find(|r| r.is_to_one() && r.foreign_key == col.name)
                    .unwrap_or_else(|| panic!("no parent relationship for {}", col.name));
                let target = catalog.table(&parent_rel.target).unwrap();
                assert!(target.relationship(&parent_rel.back_populates).is_some());
            }
        }
        assert_eq!(fk_count, 11);
    }

    #[test]
    fn test_creation_order_puts_parents_first() {
        let catalog = Catalog::retail();
        let order: Vec<_> = catalog
            .creation_order()
            .map(|t| t.table_name.as_str())
            .collect();
        let pos = |name: &str| order.iter().position(|t| *t == name).unwrap();

        assert!(pos("customers") < pos("orders"));
        assert!(pos("orders") < pos("invoices"));
        assert!(pos("orders") < pos("items"));
        assert!(pos("products") < pos("items"));
        assert!(pos("suppliers") < pos("supplier_products"));
        assert!(pos("addresses") < pos("customer_addresses"));
    }

    #[test]
    fn test_nullable_columns_match_schema() {
        let catalog = Catalog::retail();
        let order = catalog.table("Order").unwrap();
        assert!(order.column("date_shipped").unwrap().nullable);
        assert!(order.column("notes").unwrap().nullable);
        assert!(!order.column("amount_total").unwrap().nullable);

        let supplier = catalog.table("Supplier").unwrap();
        assert!(supplier.column("contact_name").unwrap().nullable);

        let address = catalog.table("Address").unwrap();
        assert_eq!(
            address.column("zip_code").unwrap().column_type,
            ColumnType::varchar(10)
        );
    }

    #[test]
    fn test_rejects_missing_back_reference() {
        let mut tables = retail_tables();
        let customer = tables
            .iter_mut()
            .find(|t| t.collection_name == "Customer")
            .unwrap();
        customer.relationships.retain(|r| r.name != "PaymentList");

        let err = Catalog::new(tables).unwrap_err();
        assert!(err.to_string().contains("back reference"));
    }

    #[test]
    fn test_rejects_unknown_foreign_key_table() {
        let mut tables = retail_tables();
        tables.push(TableSchema::new(
            "Shipment",
            "shipments",
            vec![
                ColumnDefinition::id(),
                ColumnDefinition::foreign_key("carrier_id", "carriers").not_null(),
            ],
        ));

        let err = Catalog::new(tables).unwrap_err();
        assert!(err.to_string().contains("unknown table 'carriers'"));
    }

    #[test]
    fn test_rejects_relationship_on_wrong_column() {
        let mut tables = retail_tables();
        let invoice = tables
            .iter_mut()
            .find(|t| t.collection_name == "Invoice")
            .unwrap();
        invoice.relationships[0].foreign_key = "total_amount".to_string();

        assert!(Catalog::new(tables).is_err());
    }

    #[test]
    fn test_rejects_cycles() {
        let tables = vec![
            TableSchema::new(
                "A",
                "a_rows",
                vec![
                    ColumnDefinition::id(),
                    ColumnDefinition::foreign_key("b_id", "b_rows"),
                ],
            ),
            TableSchema::new(
                "B",
                "b_rows",
                vec![
                    ColumnDefinition::id(),
                    ColumnDefinition::foreign_key("a_id", "a_rows"),
                ],
            ),
        ];

        let err = Catalog::new(tables).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_self_reference_is_allowed() {
        let tables = vec![TableSchema::new(
            "Category",
            "categories",
            vec![
                ColumnDefinition::id(),
                ColumnDefinition::foreign_key("parent_id", "categories"),
            ],
        )];
        assert!(Catalog::new(tables).is_ok());
    }

    #[test]
    fn test_rejects_duplicate_collection() {
        let mut tables = retail_tables();
        tables.push(TableSchema::new("Order", "orders_archive", vec![ColumnDefinition::id()]));
        assert!(Catalog::new(tables).is_err());
    }
}
