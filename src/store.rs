//! ResourceStore - repository over the retail tables in PostgreSQL
//!
//! Creates the catalog's tables, converts JSON:API requests into typed
//! parameterised SQL and renders rows back as resource objects.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, info, instrument, warn};

use crate::catalog::Catalog;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::models::Entity;
use crate::resource::{
    Linkage, QueryParams, Resource, ResourceIdentifier, ResourceRequest, parse_id,
};
use crate::schema::{Relationship, TableSchema};
use crate::sql::condition::{Condition, build_condition_clause, build_order_by_clause};
use crate::sql::ddl::DdlGenerator;
use crate::sql::sanitize::{qualified_table, quote_identifier};
use crate::sql::value::{SqlValue, bind_all};
use crate::types::{ColumnDefinition, ColumnType};

/// Result of following a relationship from one resource
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// To-one: the parent, or `None` when the foreign key is null
    One(Option<Resource>),
    /// To-many: one page of children and the total number of children
    Many(Vec<Resource>, i64),
}

/// Repository for the retail catalog in a single PostgreSQL namespace
pub struct ResourceStore {
    pool: PgPool,
    config: StoreConfig,
    catalog: Catalog,
}

impl ResourceStore {
    /// Connect using the configuration's database URL and pool size
    pub async fn new(config: StoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .map_err(|e| StoreError::Connection(format!("Database connection failed: {}", e)))?;

        Ok(Self::from_pool(pool, config))
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool, config: StoreConfig) -> Self {
        Self {
            pool,
            config,
            catalog: Catalog::retail(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn table_sql(&self, table: &TableSchema) -> String {
        qualified_table(&self.config.namespace, &table.table_name)
    }

    // =========================================================================
    // Schema management
    // =========================================================================

    /// Create the namespace, every table and the foreign-key indexes
    ///
    /// Tables are created parents first inside one transaction. Safe to run
    /// against an already migrated database.
    pub async fn migrate(&self) -> Result<()> {
        let ddl = DdlGenerator::new(&self.config);
        let mut tx = self.pool.begin().await?;

        sqlx::query(&ddl.generate_create_namespace())
            .execute(&mut *tx)
            .await?;

        for table in self.catalog.creation_order() {
            let create_sql = ddl.generate_create_table(table);
            debug!(sql = %create_sql, "create table");
            sqlx::query(&create_sql).execute(&mut *tx).await?;

            for index_sql in ddl.generate_indexes(table) {
                debug!(sql = %index_sql, "create index");
                sqlx::query(&index_sql).execute(&mut *tx).await?;
            }
        }

        tx.commit().await?;
        info!(
            namespace = %self.config.namespace,
            tables = self.catalog.tables().len(),
            "retail schema migrated"
        );
        Ok(())
    }

    /// Drop every table, children first
    pub async fn drop_all(&self) -> Result<()> {
        let ddl = DdlGenerator::new(&self.config);
        let mut tx = self.pool.begin().await?;

        for table in self.catalog.creation_order().rev() {
            sqlx::query(&ddl.generate_drop_table(&table.table_name))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        info!(namespace = %self.config.namespace, "retail tables dropped");
        Ok(())
    }

    // =========================================================================
    // Resource operations
    // =========================================================================

    /// Insert a resource
    ///
    /// Every non-null column must be supplied, either as an attribute or,
    /// for foreign keys, through to-one relationship linkage.
    #[instrument(skip(self, request))]
    pub async fn create(&self, collection: &str, request: ResourceRequest) -> Result<Resource> {
        let table = self.catalog.require(collection)?;
        check_type(collection, &request)?;

        let mut values = collect_values(table, &request)?;
        let client_id = request.id()?;
        if let Some(id) = client_id {
            let pk = primary_key(table)?;
            values.insert(0, (pk, SqlValue::Integer(Some(id))));
        }

        for col in table.columns.iter().filter(|c| c.is_required()) {
            if !values.iter().any(|(c, _)| c.name == col.name) {
                return Err(StoreError::validation(format!(
                    "Required attribute '{}' is missing",
                    col.name
                )));
            }
        }

        let insert_sql = if values.is_empty() {
            format!(
                "INSERT INTO {} DEFAULT VALUES RETURNING {}",
                self.table_sql(table),
                select_columns(table)
            )
        } else {
            let column_names: Vec<String> =
                values.iter().map(|(c, _)| quote_identifier(&c.name)).collect();
            let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("${}", i)).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
                self.table_sql(table),
                column_names.join(", "),
                placeholders.join(", "),
                select_columns(table)
            )
        };
        debug!(sql = %insert_sql, "insert");

        let params = values.into_iter().map(|(_, v)| v);
        let mut tx = self.pool.begin().await?;
        let row = bind_all(sqlx::query(&insert_sql), params)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error)?;

        // An explicit id does not advance the identity sequence
        if client_id.is_some() {
            self.sync_identity(&mut tx, table).await?;
        }
        tx.commit().await?;

        self.row_to_resource(table, &row)
    }

    /// Move the primary key's identity sequence past the largest stored id
    async fn sync_identity(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        table: &TableSchema,
    ) -> Result<()> {
        let pk = primary_key(table)?;
        let setval_sql = format!(
            "SELECT setval(pg_get_serial_sequence($1, $2), GREATEST((SELECT MAX({}) FROM {}), 1))",
            quote_identifier(&pk.name),
            self.table_sql(table)
        );
        debug!(sql = %setval_sql, "sync identity");

        sqlx::query(&setval_sql)
            .bind(self.table_sql(table))
            .bind(&pk.name)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Fetch a resource by id
    pub async fn get(&self, collection: &str, id: i64) -> Result<Option<Resource>> {
        let table = self.catalog.require(collection)?;
        self.get_in(table, id).await
    }

    async fn get_in(&self, table: &TableSchema, id: i64) -> Result<Option<Resource>> {
        let select_sql = format!(
            "SELECT {} FROM {} WHERE {} = $1",
            select_columns(table),
            self.table_sql(table),
            quote_identifier(&primary_key(table)?.name)
        );
        debug!(sql = %select_sql, id, "select by id");

        let row = sqlx::query(&select_sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| self.row_to_resource(table, &row)).transpose()
    }

    /// One page of a collection plus the total number of matching rows
    #[instrument(skip(self, query))]
    pub async fn list(
        &self,
        collection: &str,
        query: &QueryParams,
    ) -> Result<(Vec<Resource>, i64)> {
        let table = self.catalog.require(collection)?;
        self.fetch_page(table, query.condition(), query).await
    }

    /// Partially update a resource
    ///
    /// A body id, when present, must equal `id`.
    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        collection: &str,
        id: i64,
        request: ResourceRequest,
    ) -> Result<Resource> {
        let table = self.catalog.require(collection)?;
        check_type(collection, &request)?;

        if let Some(body_id) = request.id()? {
            if body_id != id {
                return Err(StoreError::conflict(format!(
                    "Body id {} does not match {}/{}",
                    body_id, collection, id
                )));
            }
        }

        let values = collect_values(table, &request)?;
        if values.is_empty() {
            return self
                .get_in(table, id)
                .await?
                .ok_or_else(|| StoreError::not_found(collection, id));
        }

        let set_clauses: Vec<String> = values
            .iter()
            .enumerate()
            .map(|(i, (c, _))| format!("{} = ${}", quote_identifier(&c.name), i + 2))
            .collect();

        let update_sql = format!(
            "UPDATE {} SET {} WHERE {} = $1 RETURNING {}",
            self.table_sql(table),
            set_clauses.join(", "),
            quote_identifier(&primary_key(table)?.name),
            select_columns(table)
        );
        debug!(sql = %update_sql, "update");

        let params = values.into_iter().map(|(_, v)| v);
        let row = bind_all(sqlx::query(&update_sql).bind(id), params)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| StoreError::not_found(collection, id))?;

        self.row_to_resource(table, &row)
    }

    /// Delete a resource
    ///
    /// Fails with a conflict while other rows still reference it.
    #[instrument(skip(self))]
    pub async fn delete(&self, collection: &str, id: i64) -> Result<()> {
        let table = self.catalog.require(collection)?;

        let delete_sql = format!(
            "DELETE FROM {} WHERE {} = $1",
            self.table_sql(table),
            quote_identifier(&primary_key(table)?.name)
        );
        debug!(sql = %delete_sql, "delete");

        let result = sqlx::query(&delete_sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(collection, id));
        }

        Ok(())
    }

    // =========================================================================
    // Relationships
    // =========================================================================

    /// Follow a relationship of an existing resource
    ///
    /// To-many results are paginated, filtered and sorted by `query`.
    #[instrument(skip(self, query))]
    pub async fn related(
        &self,
        collection: &str,
        id: i64,
        relationship: &str,
        query: &QueryParams,
    ) -> Result<Related> {
        let rel = self.catalog.relationship(collection, relationship)?;
        let source = self
            .get(collection, id)
            .await?
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        let target = self.catalog.require(&rel.target)?;

        if rel.is_to_one() {
            return match foreign_key_value(&source, rel) {
                Some(parent_id) => Ok(Related::One(self.get_in(target, parent_id).await?)),
                None => Ok(Related::One(None)),
            };
        }

        let by_parent = Condition::eq(rel.foreign_key.clone(), serde_json::json!(id));
        let condition = match query.condition() {
            Some(extra) => by_parent.and_also(extra),
            None => by_parent,
        };
        let (resources, total) = self.fetch_page(target, Some(condition), query).await?;
        Ok(Related::Many(resources, total))
    }

    /// Resource linkage of a relationship (identifiers only)
    pub async fn linkage(&self, collection: &str, id: i64, relationship: &str) -> Result<Linkage> {
        let rel = self.catalog.relationship(collection, relationship)?;
        let source = self
            .get(collection, id)
            .await?
            .ok_or_else(|| StoreError::not_found(collection, id))?;

        if rel.is_to_one() {
            return Ok(Linkage::One(
                foreign_key_value(&source, rel)
                    .map(|fk| ResourceIdentifier::new(rel.target.clone(), fk)),
            ));
        }

        let target = self.catalog.require(&rel.target)?;
        let pk = quote_identifier(&primary_key(target)?.name);
        let select_sql = format!(
            "SELECT {} FROM {} WHERE {} = $1 ORDER BY {} ASC",
            pk,
            self.table_sql(target),
            quote_identifier(&rel.foreign_key),
            pk
        );
        debug!(sql = %select_sql, "select linkage");

        let rows = sqlx::query(&select_sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let child: i64 = row.try_get(0)?;
                Ok::<_, StoreError>(ResourceIdentifier::new(rel.target.clone(), child))
            })
            .collect::<Result<Vec<_>>>()
            .map(Linkage::Many)
    }

    /// Resources reachable through `include` from a set of primary resources
    ///
    /// Each related resource appears once. To-many relationships that are
    /// included get their linkage filled in on the primary resources.
    #[instrument(skip(self, resources))]
    pub async fn included(
        &self,
        collection: &str,
        resources: &mut [Resource],
        include: &[String],
    ) -> Result<Vec<Resource>> {
        let mut seen = BTreeSet::new();
        let mut included = Vec::new();
        let mut names = BTreeSet::new();

        for name in include {
            if name.contains('.') {
                return Err(StoreError::invalid_query(format!(
                    "Nested include '{}' is not supported",
                    name
                )));
            }
            if !names.insert(name.as_str()) {
                continue;
            }

            let rel = self.catalog.relationship(collection, name)?;
            let target = self.catalog.require(&rel.target)?;

            let related = if rel.is_to_one() {
                let ids: BTreeSet<i64> = resources
                    .iter()
                    .filter_map(|r| foreign_key_value(r, rel))
                    .collect();
                self.fetch_by_ids(target, "id", ids).await?
            } else {
                let parent_ids: BTreeSet<i64> = resources
                    .iter()
                    .map(|r| r.id_value())
                    .collect::<Result<_>>()?;
                let children = self
                    .fetch_by_ids(target, &rel.foreign_key, parent_ids)
                    .await?;

                let mut by_parent: HashMap<i64, Vec<ResourceIdentifier>> = HashMap::new();
                for child in &children {
                    if let Some(parent_id) =
                        child.attributes.get(&rel.foreign_key).and_then(|v| v.as_i64())
                    {
                        by_parent
                            .entry(parent_id)
                            .or_default()
                            .push(child.identifier());
                    }
                }
                for resource in resources.iter_mut() {
                    let ids = by_parent.remove(&resource.id_value()?).unwrap_or_default();
                    resource.set_linkage(&rel.name, Linkage::Many(ids));
                }
                children
            };

            for resource in related {
                if seen.insert(resource.identifier()) {
                    included.push(resource);
                }
            }
        }

        Ok(included)
    }

    // =========================================================================
    // Typed access
    // =========================================================================

    /// Fetch one typed record by id
    pub async fn find<E: Entity>(&self, id: i64) -> Result<Option<E>> {
        let select_sql = format!(
            "SELECT {} FROM {} WHERE \"id\" = $1",
            entity_columns::<E>(),
            qualified_table(&self.config.namespace, E::TABLE)
        );
        debug!(sql = %select_sql, collection = E::COLLECTION, "find");

        Ok(sqlx::query_as::<_, E>(&select_sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Fetch typed records ordered by id
    pub async fn find_all<E: Entity>(&self, limit: i64, offset: i64) -> Result<Vec<E>> {
        let select_sql = format!(
            "SELECT {} FROM {} ORDER BY \"id\" ASC LIMIT $1 OFFSET $2",
            entity_columns::<E>(),
            qualified_table(&self.config.namespace, E::TABLE)
        );
        debug!(sql = %select_sql, collection = E::COLLECTION, "find all");

        Ok(sqlx::query_as::<_, E>(&select_sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?)
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    async fn fetch_page(
        &self,
        table: &TableSchema,
        condition: Option<Condition>,
        query: &QueryParams,
    ) -> Result<(Vec<Resource>, i64)> {
        let (where_clause, params) = match condition {
            Some(condition) => {
                let mut param_offset = 1;
                build_condition_clause(&condition, table, &mut param_offset)
                    .map_err(StoreError::InvalidQuery)?
            }
            None => ("TRUE".to_string(), Vec::new()),
        };

        let order_by_clause =
            build_order_by_clause(query.sort.as_deref(), table).map_err(StoreError::InvalidQuery)?;

        let count_sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            self.table_sql(table),
            where_clause
        );
        let select_sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {} LIMIT ${} OFFSET ${}",
            select_columns(table),
            self.table_sql(table),
            where_clause,
            order_by_clause,
            params.len() + 1,
            params.len() + 2
        );
        debug!(sql = %select_sql, "select page");

        let count_row = bind_all(sqlx::query(&count_sql), params.clone())
            .fetch_one(&self.pool)
            .await?;
        let total: i64 = count_row.try_get(0)?;

        let rows = bind_all(sqlx::query(&select_sql), params)
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await?;

        let resources = rows
            .iter()
            .map(|row| self.row_to_resource(table, row))
            .collect::<Result<Vec<_>>>()?;

        Ok((resources, total))
    }

    /// All rows whose `column` is one of `ids`, ordered by primary key
    async fn fetch_by_ids(
        &self,
        table: &TableSchema,
        column: &str,
        ids: BTreeSet<i64>,
    ) -> Result<Vec<Resource>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let condition = Condition::is_in(column, ids.into_iter().map(serde_json::Value::from).collect());
        let mut param_offset = 1;
        let (where_clause, params) = build_condition_clause(&condition, table, &mut param_offset)
            .map_err(StoreError::InvalidQuery)?;
        let order_by_clause = build_order_by_clause(None, table).map_err(StoreError::InvalidQuery)?;

        let select_sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {}",
            select_columns(table),
            self.table_sql(table),
            where_clause,
            order_by_clause
        );
        debug!(sql = %select_sql, "select included");

        let rows = bind_all(sqlx::query(&select_sql), params)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| self.row_to_resource(table, row))
            .collect()
    }

    fn row_to_resource(&self, table: &TableSchema, row: &PgRow) -> Result<Resource> {
        let id: i64 = row.try_get(primary_key(table)?.name.as_str())?;

        let mut attributes = serde_json::Map::new();
        for col in table.attribute_columns() {
            attributes.insert(col.name.clone(), extract_column_value(row, col)?);
        }

        Ok(Resource::from_row(table, &self.config, id, attributes))
    }
}

fn check_type(collection: &str, request: &ResourceRequest) -> Result<()> {
    if request.data.resource_type != collection {
        return Err(StoreError::conflict(format!(
            "Resource type '{}' does not match collection '{}'",
            request.data.resource_type, collection
        )));
    }
    Ok(())
}

fn primary_key(table: &TableSchema) -> Result<&ColumnDefinition> {
    table.primary_key().ok_or_else(|| {
        StoreError::validation(format!("{} has no primary key", table.collection_name))
    })
}

/// Typed values for the attributes and to-one linkage of a request, in column order
fn collect_values<'t>(
    table: &'t TableSchema,
    request: &ResourceRequest,
) -> Result<Vec<(&'t ColumnDefinition, SqlValue)>> {
    let mut by_column: BTreeMap<&str, SqlValue> = BTreeMap::new();

    for (name, value) in &request.data.attributes {
        let col = table
            .column(name)
            .filter(|c| !c.primary_key)
            .ok_or_else(|| {
                StoreError::validation(format!(
                    "Unknown attribute '{}' for {}",
                    name, table.collection_name
                ))
            })?;

        if !col.nullable && value.is_null() {
            return Err(StoreError::validation(format!(
                "Attribute '{}' does not allow null",
                col.name
            )));
        }

        let param = SqlValue::from_json(&col.column_type, &col.name, value)
            .map_err(StoreError::Validation)?;
        by_column.insert(col.name.as_str(), param);
    }

    for (name, linkage) in &request.data.relationships {
        let rel = table.relationship(name).ok_or_else(|| {
            StoreError::validation(format!(
                "Unknown relationship '{}' for {}",
                name, table.collection_name
            ))
        })?;
        if !rel.is_to_one() {
            return Err(StoreError::validation(format!(
                "To-many relationship '{}' cannot be set from {}",
                name, table.collection_name
            )));
        }
        let col = table.column(&rel.foreign_key).ok_or_else(|| {
            StoreError::validation(format!("Missing foreign key column '{}'", rel.foreign_key))
        })?;

        let param = match &linkage.data {
            Some(identifier) => {
                if identifier.resource_type != rel.target {
                    return Err(StoreError::validation(format!(
                        "Relationship '{}' expects type '{}', got '{}'",
                        name, rel.target, identifier.resource_type
                    )));
                }
                SqlValue::Integer(Some(parse_id(&identifier.id)?))
            }
            None if !col.nullable => {
                return Err(StoreError::validation(format!(
                    "Relationship '{}' cannot be empty",
                    name
                )));
            }
            None => SqlValue::null(&col.column_type),
        };

        if by_column.insert(col.name.as_str(), param).is_some() {
            return Err(StoreError::validation(format!(
                "'{}' is set both as an attribute and through relationship '{}'",
                col.name, name
            )));
        }
    }

    Ok(table
        .columns
        .iter()
        .filter_map(|col| by_column.remove(col.name.as_str()).map(|v| (col, v)))
        .collect())
}

fn select_columns(table: &TableSchema) -> String {
    table
        .columns
        .iter()
        .map(|c| quote_identifier(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn entity_columns<E: Entity>() -> String {
    E::COLUMNS
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn foreign_key_value(resource: &Resource, rel: &Relationship) -> Option<i64> {
    resource
        .attributes
        .get(&rel.foreign_key)
        .and_then(|v| v.as_i64())
}

/// Map a database error, logging constraint violations
fn db_error(err: sqlx::Error) -> StoreError {
    let mapped = StoreError::from_db(err);
    if matches!(mapped, StoreError::Conflict(_) | StoreError::Validation(_)) {
        warn!(error = %mapped, "constraint violation");
    }
    mapped
}

fn extract_column_value(row: &PgRow, col: &ColumnDefinition) -> Result<serde_json::Value> {
    let name = col.name.as_str();
    Ok(match &col.column_type {
        ColumnType::Integer => row
            .try_get::<Option<i64>, _>(name)?
            .map(serde_json::Value::from)
            .unwrap_or(serde_json::Value::Null),
        ColumnType::Float => row
            .try_get::<Option<f64>, _>(name)?
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ColumnType::String { .. } => row
            .try_get::<Option<String>, _>(name)?
            .map(serde_json::Value::String)
            .unwrap_or(serde_json::Value::Null),
        ColumnType::DateTime => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)?
            .map(|v| serde_json::Value::String(v.to_rfc3339()))
            .unwrap_or(serde_json::Value::Null),
    })
}
