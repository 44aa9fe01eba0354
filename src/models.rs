//! Typed records for the retail tables
//!
//! One struct per table, mapped with `sqlx::FromRow`. These mirror the
//! declarations in [`crate::catalog`]; the JSON:API path works on the
//! dynamic declarations while these give typed access from Rust code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row type backed by one table of the retail catalog
pub trait Entity: for<'r> FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin {
    /// Collection name in the catalog
    const COLLECTION: &'static str;
    /// Database table name
    const TABLE: &'static str;
    /// Columns in select order
    const COLUMNS: &'static [&'static str];

    fn id(&self) -> i64;
}

macro_rules! entity {
    ($ty:ident, $collection:literal, $table:literal, [$($col:literal),+ $(,)?]) => {
        impl Entity for $ty {
            const COLLECTION: &'static str = $collection;
            const TABLE: &'static str = $table;
            const COLUMNS: &'static [&'static str] = &[$($col),+];

            fn id(&self) -> i64 {
                self.id
            }
        }
    };
}

/// Address which can be linked to various entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Address {
    pub id: i64,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

/// Product category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// Customer, including balance and credit limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub credit_limit: f64,
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub unit_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Supplier {
    pub id: i64,
    pub name: String,
    pub contact_name: Option<String>,
}

/// Links a customer to an address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CustomerAddress {
    pub id: i64,
    pub customer_id: i64,
    pub address_id: i64,
    pub address_type: String,
}

/// Customer order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: i64,
    pub customer_id: i64,
    pub amount_total: f64,
    pub date_shipped: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: i64,
    pub customer_id: i64,
    pub amount: f64,
    pub payment_date: DateTime<Utc>,
}

/// Links a product to a category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ProductCategory {
    pub id: i64,
    pub product_id: i64,
    pub category_id: i64,
}

/// Links a supplier to a product it provides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SupplierProduct {
    pub id: i64,
    pub supplier_id: i64,
    pub product_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub id: i64,
    pub order_id: i64,
    pub invoice_date: DateTime<Utc>,
    pub total_amount: f64,
}

/// Line item within an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Item {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price: f64,
    pub amount: f64,
}

entity!(Address, "Address", "addresses", ["id", "street", "city", "state", "zip_code", "country"]);
entity!(Category, "Category", "categories", ["id", "name"]);
entity!(Customer, "Customer", "customers", ["id", "name", "credit_limit", "balance"]);
entity!(Product, "Product", "products", ["id", "name", "unit_price"]);
entity!(Supplier, "Supplier", "suppliers", ["id", "name", "contact_name"]);
entity!(
    CustomerAddress,
    "CustomerAddress",
    "customer_addresses",
    ["id", "customer_id", "address_id", "address_type"]
);
entity!(
    Order,
    "Order",
    "orders",
    ["id", "customer_id", "amount_total", "date_shipped", "notes"]
);
entity!(Payment, "Payment", "payments", ["id", "customer_id", "amount", "payment_date"]);
entity!(
    ProductCategory,
    "ProductCategory",
    "product_categories",
    ["id", "product_id", "category_id"]
);
entity!(
    SupplierProduct,
    "SupplierProduct",
    "supplier_products",
    ["id", "supplier_id", "product_id"]
);
entity!(
    Invoice,
    "Invoice",
    "invoices",
    ["id", "order_id", "invoice_date", "total_amount"]
);
entity!(
    Item,
    "Item",
    "items",
    ["id", "order_id", "product_id", "quantity", "unit_price", "amount"]
);
