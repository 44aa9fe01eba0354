//! JSON:API document model and request parameters
//!
//! Includes resource objects, top-level documents, error documents, request
//! bodies, and the query parameters (`page`, `sort`, `include`, `filter`)
//! accepted by collection endpoints.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::schema::TableSchema;
use crate::sql::condition::{CompareOp, Condition};

/// JSON:API media type
pub const JSONAPI_MEDIA_TYPE: &str = "application/vnd.api+json";

// ============================================================================
// Resource objects
// ============================================================================

/// `{ "type": ..., "id": ... }`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
}

impl ResourceIdentifier {
    pub fn new(resource_type: impl Into<String>, id: i64) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.to_string(),
        }
    }
}

/// Link set used at every level of a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Links {
    #[serde(rename = "self", skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,
}

impl Links {
    pub fn to_self(href: impl Into<String>) -> Self {
        Self {
            self_link: Some(href.into()),
            ..Self::default()
        }
    }
}

/// Resource linkage: to-one (possibly null) or to-many
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Linkage {
    Many(Vec<ResourceIdentifier>),
    One(Option<ResourceIdentifier>),
}

/// Relationship entry inside a resource object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Linkage>,
    pub links: Links,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

/// A row rendered as a JSON:API resource object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
    pub attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, RelationshipObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
}

impl Resource {
    /// Render a row of `table`
    ///
    /// To-one relationships carry linkage derived from the foreign-key
    /// attribute; to-many relationships carry links only until populated.
    pub fn from_row(
        table: &TableSchema,
        config: &StoreConfig,
        id: i64,
        attributes: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let self_path = format!("/{}/{}", table.collection_name, id);

        let relationships = table
            .relationships
            .iter()
            .map(|rel| {
                let data = rel.is_to_one().then(|| {
                    Linkage::One(
                        attributes
                            .get(&rel.foreign_key)
                            .and_then(|v| v.as_i64())
                            .map(|fk| ResourceIdentifier::new(rel.target.clone(), fk)),
                    )
                });
                let object = RelationshipObject {
                    data,
                    links: Links {
                        self_link: Some(
                            config.link(&format!("{}/relationships/{}", self_path, rel.name)),
                        ),
                        related: Some(config.link(&format!("{}/{}", self_path, rel.name))),
                        ..Links::default()
                    },
                    meta: None,
                };
                (rel.name.clone(), object)
            })
            .collect();

        Self {
            resource_type: table.collection_name.clone(),
            id: id.to_string(),
            attributes,
            relationships,
            links: Some(Links::to_self(config.link(&self_path))),
        }
    }

    pub fn identifier(&self) -> ResourceIdentifier {
        ResourceIdentifier {
            resource_type: self.resource_type.clone(),
            id: self.id.clone(),
        }
    }

    /// Numeric primary key
    pub fn id_value(&self) -> Result<i64> {
        parse_id(&self.id)
    }

    /// Replace the linkage of a relationship (used when it is included)
    ///
    /// To-many linkage also records its size in `meta.count`.
    pub fn set_linkage(&mut self, relationship: &str, linkage: Linkage) {
        if let Some(rel) = self.relationships.get_mut(relationship) {
            if let Linkage::Many(ids) = &linkage {
                rel.meta = Some(serde_json::json!({ "count": ids.len() }));
            }
            rel.data = Some(linkage);
        }
    }
}

/// Parse a resource id from a URL segment or document
pub fn parse_id(raw: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| StoreError::validation(format!("Invalid resource id '{}'", raw)))
}

// ============================================================================
// Top-level documents
// ============================================================================

/// Primary data of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryData {
    Collection(Vec<Resource>),
    Single(Box<Resource>),
    Linkage(Linkage),
    Null(Option<()>),
}

/// Top-level success document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub data: PrimaryData,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<Resource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
}

impl Document {
    pub fn single(resource: Resource) -> Self {
        let links = resource.links.clone();
        Self {
            data: PrimaryData::Single(Box::new(resource)),
            included: Vec::new(),
            meta: None,
            links,
        }
    }

    pub fn optional(resource: Option<Resource>, self_link: String) -> Self {
        match resource {
            Some(resource) => Self::single(resource).with_self_link(self_link),
            None => Self {
                data: PrimaryData::Null(None),
                included: Vec::new(),
                meta: None,
                links: Some(Links::to_self(self_link)),
            },
        }
    }

    /// Collection document with `meta.count` and pagination links
    pub fn collection(resources: Vec<Resource>, total: i64, links: Links) -> Self {
        Self {
            data: PrimaryData::Collection(resources),
            included: Vec::new(),
            meta: Some(serde_json::json!({ "count": total })),
            links: Some(links),
        }
    }

    pub fn linkage(linkage: Linkage, self_link: String, related: String) -> Self {
        Self {
            data: PrimaryData::Linkage(linkage),
            included: Vec::new(),
            meta: None,
            links: Some(Links {
                self_link: Some(self_link),
                related: Some(related),
                ..Links::default()
            }),
        }
    }

    pub fn with_included(mut self, included: Vec<Resource>) -> Self {
        self.included = included;
        self
    }

    fn with_self_link(mut self, self_link: String) -> Self {
        let mut links = self.links.take().unwrap_or_default();
        links.self_link = Some(self_link);
        self.links = Some(links);
        self
    }
}

/// A single JSON:API error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub status: String,
    pub title: String,
    pub detail: String,
}

/// Top-level error document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDocument {
    pub errors: Vec<ErrorObject>,
}

impl From<&StoreError> for ErrorDocument {
    fn from(err: &StoreError) -> Self {
        Self {
            errors: vec![ErrorObject {
                status: err.status_code().to_string(),
                title: err.title().to_string(),
                detail: err.to_string(),
            }],
        }
    }
}

// ============================================================================
// Request bodies
// ============================================================================

/// Relationship linkage supplied in a create/update body (to-one only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRequest {
    pub data: Option<ResourceIdentifier>,
}

/// `data` member of a create/update body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceData {
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Client-supplied id; a string per JSON:API, numbers are accepted too
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, RelationshipRequest>,
}

/// Body of POST and PATCH requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub data: ResourceData,
}

impl ResourceRequest {
    pub fn new(
        resource_type: impl Into<String>,
        attributes: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            data: ResourceData {
                resource_type: resource_type.into(),
                id: None,
                attributes,
                relationships: BTreeMap::new(),
            },
        }
    }

    /// Build a request from a JSON object of attributes
    ///
    /// Non-object values produce an empty attribute set.
    pub fn from_json(resource_type: impl Into<String>, attributes: serde_json::Value) -> Self {
        match attributes {
            serde_json::Value::Object(map) => Self::new(resource_type, map),
            _ => Self::new(resource_type, serde_json::Map::new()),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.data.id = Some(serde_json::Value::String(id.to_string()));
        self
    }

    /// Link a to-one relationship
    pub fn with_relationship(
        mut self,
        name: impl Into<String>,
        target: Option<ResourceIdentifier>,
    ) -> Self {
        self.data
            .relationships
            .insert(name.into(), RelationshipRequest { data: target });
        self
    }

    /// The client-supplied id, if any
    pub fn id(&self) -> Result<Option<i64>> {
        match &self.data.id {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::String(s)) => parse_id(s).map(Some),
            Some(serde_json::Value::Number(n)) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| StoreError::validation(format!("Invalid resource id '{}'", n))),
            Some(other) => Err(StoreError::validation(format!(
                "Invalid resource id '{}'",
                other
            ))),
        }
    }
}

// ============================================================================
// Query parameters
// ============================================================================

/// Parsed collection query: pagination, sorting, includes and filters
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParams {
    pub offset: i64,
    pub limit: i64,
    pub sort: Option<String>,
    pub include: Vec<String>,
    pub filters: Vec<Condition>,
}

impl QueryParams {
    /// Defaults from configuration, no filters
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            offset: 0,
            limit: config.default_page_limit,
            sort: None,
            include: Vec::new(),
            filters: Vec::new(),
        }
    }

    /// Parse decoded query-string pairs
    ///
    /// Recognised keys: `page[offset]`, `page[limit]`, `sort`, `include`,
    /// `filter[field]` and `filter[field][op]`. Unknown keys are rejected.
    /// In `filter[field]=a,b` a comma means IN; the literal `null` matches NULL.
    pub fn from_pairs<K, V>(
        pairs: impl IntoIterator<Item = (K, V)>,
        config: &StoreConfig,
    ) -> Result<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut params = Self::new(config);

        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "page[offset]" => {
                    params.offset = parse_page_number(key, value)?;
                }
                "page[limit]" => {
                    let limit = parse_page_number(key, value)?;
                    if limit == 0 {
                        return Err(StoreError::invalid_query("page[limit] must be at least 1"));
                    }
                    params.limit = limit.min(config.max_page_limit);
                }
                "sort" => {
                    params.sort = Some(value.to_string()).filter(|s| !s.trim().is_empty());
                }
                "include" => {
                    params.include.extend(
                        value
                            .split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(str::to_string),
                    );
                }
                _ => {
                    let Some(path) = key.strip_prefix("filter[") else {
                        return Err(StoreError::invalid_query(format!(
                            "Unsupported query parameter '{}'",
                            key
                        )));
                    };
                    params.filters.push(parse_filter(key, path, value)?);
                }
            }
        }

        Ok(params)
    }

    pub fn with_pagination(mut self, offset: i64, limit: i64) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    pub fn with_sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn with_filter(mut self, condition: Condition) -> Self {
        self.filters.push(condition);
        self
    }


    /// All filters combined with AND
    pub fn condition(&self) -> Option<Condition> {
        match self.filters.as_slice() {
            [] => None,
            [single] => Some(single.clone()),
            many => Some(Condition::and(many.to_vec())),
        }
    }

    /// First/prev/next/last links for a collection at `path`
    pub fn pagination_links(&self, config: &StoreConfig, path: &str, total: i64) -> Links {
        let href = |offset: i64| {
            config.link(&format!(
                "{}?page[offset]={}&page[limit]={}",
                path, offset, self.limit
            ))
        };
        let last_offset = if total > 0 {
            ((total - 1) / self.limit) * self.limit
        } else {
            0
        };

        Links {
            self_link: Some(href(self.offset)),
            related: None,
            first: Some(href(0)),
            prev: (self.offset > 0).then(|| href((self.offset - self.limit).max(0))),
            next: self
                .offset
                .checked_add(self.limit)
                .filter(|next| *next < total)
                .map(href),
            last: Some(href(last_offset)),
        }
    }
}

fn parse_page_number(key: &str, value: &str) -> Result<i64> {
    value
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|n| *n >= 0)
        .ok_or_else(|| {
            StoreError::invalid_query(format!("{} must be a non-negative integer", key))
        })
}

fn parse_filter(key: &str, path: &str, value: &str) -> Result<Condition> {
    let malformed = || StoreError::invalid_query(format!("Malformed filter parameter '{}'", key));

    let (field, op) = match path.split_once("][") {
        Some((field, rest)) => {
            let op = rest.strip_suffix(']').ok_or_else(malformed)?;
            (field, Some(op))
        }
        None => (path.strip_suffix(']').ok_or_else(malformed)?, None),
    };
    if field.is_empty() {
        return Err(malformed());
    }

    let scalar = |raw: &str| {
        if raw == "null" {
            serde_json::Value::Null
        } else {
            serde_json::Value::String(raw.to_string())
        }
    };

    match op {
        None if value.contains(',') => Ok(Condition::is_in(
            field,
            value.split(',').map(|v| scalar(v.trim())).collect(),
        )),
        None => Ok(Condition::eq(field, scalar(value))),
        Some("in") => Ok(Condition::is_in(
            field,
            value.split(',').map(|v| scalar(v.trim())).collect(),
        )),
        Some(op) => {
            let cmp = CompareOp::parse(op).ok_or_else(|| {
                StoreError::invalid_query(format!("Unknown filter operator '{}'", op))
            })?;
            Ok(Condition::compare(field, cmp, scalar(value)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use serde_json::json;

    fn config() -> StoreConfig {
        StoreConfig::builder("postgres://localhost/test").build()
    }

    fn order_attributes(customer_id: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        json!({
            "customer_id": customer_id,
            "amount_total": 120.0,
            "date_shipped": null,
            "notes": "rush"
        })
        .as_object()
        .unwrap()
        .clone()
    }

    // ==================== Resource objects ====================

    #[test]
    fn test_resource_from_row() {
        let catalog = Catalog::retail();
        let table = catalog.table("Order").unwrap();
        let resource = Resource::from_row(table, &config(), 7, order_attributes(json!(3)));

        let json = serde_json::to_value(&resource).unwrap();
        assert_eq!(json["type"], "Order");
        assert_eq!(json["id"], "7");
        assert_eq!(json["attributes"]["notes"], "rush");
        assert_eq!(json["links"]["self"], "/api/Order/7");
        assert_eq!(
            json["relationships"]["customer"]["data"],
            json!({"type": "Customer", "id": "3"})
        );
        assert_eq!(
            json["relationships"]["customer"]["links"]["related"],
            "/api/Order/7/customer"
        );
        assert_eq!(
            json["relationships"]["ItemList"]["links"]["self"],
            "/api/Order/7/relationships/ItemList"
        );
        assert!(json["relationships"]["ItemList"].get("data").is_none());
    }

    #[test]
    fn test_to_one_linkage_null_when_foreign_key_missing() {
        let catalog = Catalog::retail();
        let table = catalog.table("Order").unwrap();
        let resource = Resource::from_row(table, &config(), 7, order_attributes(json!(null)));
        let json = serde_json::to_value(&resource).unwrap();
        assert!(json["relationships"]["customer"]["data"].is_null());
        assert!(json["relationships"]["customer"].get("data").is_some());
    }

    #[test]
    fn test_set_linkage_populates_to_many() {
        let catalog = Catalog::retail();
        let table = catalog.table("Order").unwrap();
        let mut resource = Resource::from_row(table, &config(), 7, order_attributes(json!(3)));
        resource.set_linkage("ItemList", Linkage::Many(vec![ResourceIdentifier::new("Item", 1)]));

        let json = serde_json::to_value(&resource).unwrap();
        assert_eq!(json["relationships"]["ItemList"]["data"][0]["id"], "1");
        assert_eq!(json["relationships"]["ItemList"]["meta"]["count"], 1);
    }

    // ==================== Documents ====================

    #[test]
    fn test_collection_document() {
        let doc = Document::collection(Vec::new(), 0, Links::to_self("/api/Customer"));
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["data"], json!([]));
        assert_eq!(json["meta"]["count"], 0);
        assert!(json.get("included").is_none());
    }

    #[test]
    fn test_optional_document_null_data() {
        let doc = Document::optional(None, "/api/Order/1/customer".to_string());
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json["data"].is_null());
        assert_eq!(json["links"]["self"], "/api/Order/1/customer");
    }

    #[test]
    fn test_error_document() {
        let doc = ErrorDocument::from(&StoreError::not_found("Customer", 9));
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["errors"][0]["status"], "404");
        assert_eq!(json["errors"][0]["title"], "Resource not found");
        assert_eq!(json["errors"][0]["detail"], "Resource not found: Customer/9");
    }

    // ==================== Request bodies ====================

    #[test]
    fn test_resource_request_parsing() {
        let body = json!({
            "data": {
                "type": "Order",
                "id": 12,
                "attributes": {"amount_total": 5.0},
                "relationships": {
                    "customer": {"data": {"type": "Customer", "id": "1"}}
                }
            }
        });
        let request: ResourceRequest = serde_json::from_value(body).unwrap();
        assert_eq!(request.id().unwrap(), Some(12));
        assert_eq!(
            request.data.relationships["customer"].data,
            Some(ResourceIdentifier::new("Customer", 1))
        );
    }

    #[test]
    fn test_resource_request_id_forms() {
        let request = ResourceRequest::from_json("Customer", json!({})).with_id(4);
        assert_eq!(request.id().unwrap(), Some(4));

        let mut bad = ResourceRequest::from_json("Customer", json!({}));
        bad.data.id = Some(json!("four"));
        assert!(bad.id().is_err());

        let none = ResourceRequest::from_json("Customer", json!({}));
        assert_eq!(none.id().unwrap(), None);
    }

    // ==================== Query parameters ====================

    #[test]
    fn test_query_defaults() {
        let params = QueryParams::from_pairs(Vec::<(&str, &str)>::new(), &config()).unwrap();
        assert_eq!(params.offset, 0);
        assert_eq!(params.limit, 10);
        assert!(params.condition().is_none());
    }

    #[test]
    fn test_query_pagination_sort_include() {
        let params = QueryParams::from_pairs(
            vec![
                ("page[offset]", "20"),
                ("page[limit]", "1000"),
                ("sort", "-amount_total"),
                ("include", "customer, ItemList"),
            ],
            &config(),
        )
        .unwrap();
        assert_eq!(params.offset, 20);
        assert_eq!(params.limit, 250);
        assert_eq!(params.sort.as_deref(), Some("-amount_total"));
        assert_eq!(params.include, vec!["customer", "ItemList"]);
    }

    #[test]
    fn test_query_rejects_bad_pagination() {
        assert!(QueryParams::from_pairs(vec![("page[limit]", "0")], &config()).is_err());
        assert!(QueryParams::from_pairs(vec![("page[offset]", "-1")], &config()).is_err());
        assert!(QueryParams::from_pairs(vec![("page[offset]", "x")], &config()).is_err());
        assert!(QueryParams::from_pairs(vec![("pagesize", "5")], &config()).is_err());
    }

    #[test]
    fn test_query_filters() {
        let params = QueryParams::from_pairs(
            vec![
                ("filter[customer_id]", "3"),
                ("filter[id]", "1,2"),
                ("filter[amount_total][gte]", "100"),
                ("filter[date_shipped]", "null"),
            ],
            &config(),
        )
        .unwrap();

        assert_eq!(params.filters[0], Condition::eq("customer_id", json!("3")));
        assert_eq!(params.filters[1], Condition::is_in("id", vec![json!("1"), json!("2")]));
        assert_eq!(
            params.filters[2],
            Condition::compare("amount_total", CompareOp::Gte, json!("100"))
        );
        assert_eq!(params.filters[3], Condition::eq("date_shipped", json!(null)));
        assert!(matches!(params.condition(), Some(Condition::And { .. })));
    }

    #[test]
    fn test_query_malformed_filters() {
        assert!(QueryParams::from_pairs(vec![("filter[]", "1")], &config()).is_err());
        assert!(QueryParams::from_pairs(vec![("filter[name", "1")], &config()).is_err());
        assert!(QueryParams::from_pairs(vec![("filter[name][near]", "1")], &config()).is_err());
    }

    #[test]
    fn test_pagination_links() {
        let params = QueryParams::new(&config()).with_pagination(10, 10);
        let links = params.pagination_links(&config(), "/Customer", 35);

        assert_eq!(links.first.unwrap(), "/api/Customer?page[offset]=0&page[limit]=10");
        assert_eq!(links.prev.unwrap(), "/api/Customer?page[offset]=0&page[limit]=10");
        assert_eq!(links.next.unwrap(), "/api/Customer?page[offset]=20&page[limit]=10");
        assert_eq!(links.last.unwrap(), "/api/Customer?page[offset]=30&page[limit]=10");
    }

    #[test]
    fn test_pagination_links_offset_at_i64_max() {
        let params = QueryParams::from_pairs(
            vec![("page[offset]", "9223372036854775807")],
            &config(),
        )
        .unwrap();
        let links = params.pagination_links(&config(), "/Customer", 5);

        assert!(links.next.is_none());
        assert_eq!(
            links.prev.unwrap(),
            "/api/Customer?page[offset]=9223372036854775797&page[limit]=10"
        );
        assert_eq!(links.last.unwrap(), "/api/Customer?page[offset]=0&page[limit]=10");
    }

    #[test]
    fn test_pagination_links_single_page() {
        let params = QueryParams::new(&config());
        let links = params.pagination_links(&config(), "/Category", 3);
        assert!(links.prev.is_none());
        assert!(links.next.is_none());
        assert_eq!(links.last.unwrap(), "/api/Category?page[offset]=0&page[limit]=10");
    }
}
