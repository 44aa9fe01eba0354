//! Table and relationship declarations
//!
//! A `TableSchema` mirrors one database table: its columns plus the
//! relationships that navigate its foreign keys in either direction.

use serde::{Deserialize, Serialize};

use crate::types::{ColumnDefinition, IndexDefinition};

/// Direction of a relationship, seen from the table that declares it
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RelationshipKind {
    /// To-one: this table holds the foreign key (e.g. `Order.customer`)
    Parent,
    /// To-many: the target table holds the foreign key (e.g. `Customer.OrderList`)
    Children,
}

/// Navigation along a single foreign key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Relationship {
    /// Relationship name as exposed on the resource
    pub name: String,
    pub kind: RelationshipKind,
    /// Collection name of the table on the other end
    pub target: String,
    /// Foreign-key column, always on the child table
    #[serde(rename = "foreignKey")]
    pub foreign_key: String,
    /// Name of the matching relationship on the target
    #[serde(rename = "backPopulates")]
    pub back_populates: String,
}

impl Relationship {
    /// To-one relationship held by this table's `foreign_key` column
    pub fn parent(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
        back_populates: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: RelationshipKind::Parent,
            target: target.into(),
            foreign_key: foreign_key.into(),
            back_populates: back_populates.into(),
        }
    }

    /// To-many relationship whose rows reference this table via `foreign_key`
    pub fn children(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
        back_populates: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: RelationshipKind::Children,
            target: target.into(),
            foreign_key: foreign_key.into(),
            back_populates: back_populates.into(),
        }
    }

    pub fn is_to_one(&self) -> bool {
        self.kind == RelationshipKind::Parent
    }
}

/// Declaration of one table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    /// JSON:API resource type and URL segment, e.g. `CustomerAddress`
    #[serde(rename = "collectionName")]
    pub collection_name: String,
    /// Database table name, e.g. `customer_addresses`
    #[serde(rename = "tableName")]
    pub table_name: String,
    pub description: Option<String>,
    pub columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexDefinition>,
}

impl TableSchema {
    pub fn new(
        collection_name: impl Into<String>,
        table_name: impl Into<String>,
        columns: Vec<ColumnDefinition>,
    ) -> Self {
        Self {
            collection_name: collection_name.into(),
            table_name: table_name.into(),
            description: None,
            columns,
            relationships: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Set description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a relationship
    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Add an index
    pub fn with_index(mut self, index: IndexDefinition) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.primary_key)
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Columns exposed as JSON:API attributes (everything but the primary key)
    pub fn attribute_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(|c| !c.primary_key)
    }

    /// Foreign-key columns, in declaration order
    pub fn foreign_keys(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(|c| c.foreign_key.is_some())
    }
}
