//! JSON:API HTTP surface
//!
//! Every catalog collection is served under the configured prefix:
//!
//! - `GET /{Collection}` and `POST /{Collection}`
//! - `GET|PATCH|DELETE /{Collection}/{id}`
//! - `GET /{Collection}/{id}/{relationship}`
//! - `GET /{Collection}/{id}/relationships/{relationship}`
//!
//! `GET /` describes the available collections.

use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tracing::{debug, error};

use crate::error::StoreError;
use crate::resource::{
    Document, ErrorDocument, JSONAPI_MEDIA_TYPE, QueryParams, ResourceRequest, parse_id,
};
use crate::store::{Related, ResourceStore};

/// Shared application state.
pub type AppState = Arc<ResourceStore>;

/// Build the JSON:API router, mounted under the configured prefix.
pub fn router(state: AppState) -> Router {
    let prefix = state.config().api_prefix.clone();
    let routes = api_routes();

    let router = if prefix.is_empty() {
        Router::new().merge(routes)
    } else {
        Router::new().nest(&prefix, routes)
    };

    router.fallback(unknown_route).with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(api_root))
        .route("/{collection}", get(list_resources).post(create_resource))
        .route(
            "/{collection}/{id}",
            get(get_resource)
                .patch(update_resource)
                .delete(delete_resource),
        )
        .route("/{collection}/{id}/{relationship}", get(get_related))
        .route(
            "/{collection}/{id}/relationships/{relationship}",
            get(get_relationship),
        )
}

// ============================================================================
// Responses
// ============================================================================

/// A JSON:API document with its status code.
pub struct JsonApi<T>(pub StatusCode, pub T);

impl<T: Serialize> IntoResponse for JsonApi<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.1) {
            Ok(body) => (self.0, [(header::CONTENT_TYPE, JSONAPI_MEDIA_TYPE)], body).into_response(),
            Err(e) => ApiError::from(StoreError::from(e)).into_response(),
        }
    }
}

/// Error rendered as a JSON:API error document.
#[derive(Debug)]
pub struct ApiError(pub StoreError);

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        } else {
            debug!(error = %self.0, status = status.as_u16(), "request rejected");
        }

        let body = serde_json::to_vec(&ErrorDocument::from(&self.0)).unwrap_or_default();
        (status, [(header::CONTENT_TYPE, JSONAPI_MEDIA_TYPE)], body).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn query_params(store: &ResourceStore, uri: &Uri) -> Result<QueryParams, StoreError> {
    let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(uri)
        .map_err(|e| StoreError::invalid_query(e.body_text()))?;
    QueryParams::from_pairs(pairs, store.config())
}

fn parse_body(body: &Bytes) -> Result<ResourceRequest, StoreError> {
    Ok(serde_json::from_slice(body)?)
}

// ============================================================================
// Handlers
// ============================================================================

async fn api_root(State(store): State<AppState>) -> JsonApi<serde_json::Value> {
    let config = store.config();
    let mut links = serde_json::Map::new();
    links.insert("self".to_string(), config.link("/").into());

    let collections: Vec<serde_json::Value> = store
        .catalog()
        .tables()
        .iter()
        .map(|table| {
            let href = config.link(&format!("/{}", table.collection_name));
            links.insert(table.collection_name.clone(), href.clone().into());
            serde_json::json!({
                "name": table.collection_name,
                "description": table.description,
                "href": href,
                "relationships": table
                    .relationships
                    .iter()
                    .map(|r| &r.name)
                    .collect::<Vec<_>>(),
            })
        })
        .collect();

    JsonApi(
        StatusCode::OK,
        serde_json::json!({
            "meta": { "collections": collections },
            "links": links,
        }),
    )
}

async fn list_resources(
    State(store): State<AppState>,
    Path(collection): Path<String>,
    uri: Uri,
) -> ApiResult<JsonApi<Document>> {
    let params = query_params(&store, &uri)?;
    let (mut resources, total) = store.list(&collection, &params).await?;
    let included = store
        .included(&collection, &mut resources, &params.include)
        .await?;

    let links = params.pagination_links(store.config(), &format!("/{}", collection), total);
    Ok(JsonApi(
        StatusCode::OK,
        Document::collection(resources, total, links).with_included(included),
    ))
}

async fn create_resource(
    State(store): State<AppState>,
    Path(collection): Path<String>,
    body: Bytes,
) -> ApiResult<Response> {
    let request = parse_body(&body)?;
    let resource = store.create(&collection, request).await?;

    let location = resource
        .links
        .as_ref()
        .and_then(|l| l.self_link.clone())
        .unwrap_or_default();
    let document = JsonApi(StatusCode::CREATED, Document::single(resource));
    Ok(([(header::LOCATION, location)], document).into_response())
}

async fn get_resource(
    State(store): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    uri: Uri,
) -> ApiResult<JsonApi<Document>> {
    let id = parse_id(&id)?;
    let params = query_params(&store, &uri)?;
    let resource = store
        .get(&collection, id)
        .await?
        .ok_or_else(|| StoreError::not_found(&collection, id))?;

    let mut resources = [resource];
    let included = store
        .included(&collection, &mut resources, &params.include)
        .await?;
    let [resource] = resources;

    Ok(JsonApi(
        StatusCode::OK,
        Document::single(resource).with_included(included),
    ))
}

async fn update_resource(
    State(store): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<JsonApi<Document>> {
    let id = parse_id(&id)?;
    let request = parse_body(&body)?;
    let resource = store.update(&collection, id, request).await?;
    Ok(JsonApi(StatusCode::OK, Document::single(resource)))
}

async fn delete_resource(
    State(store): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    store.delete(&collection, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_related(
    State(store): State<AppState>,
    Path((collection, id, relationship)): Path<(String, String, String)>,
    uri: Uri,
) -> ApiResult<JsonApi<Document>> {
    let id = parse_id(&id)?;
    let params = query_params(&store, &uri)?;
    let path = format!("/{}/{}/{}", collection, id, relationship);

    let document = match store.related(&collection, id, &relationship, &params).await? {
        Related::One(resource) => Document::optional(resource, store.config().link(&path)),
        Related::Many(resources, total) => {
            let links = params.pagination_links(store.config(), &path, total);
            Document::collection(resources, total, links)
        }
    };
    Ok(JsonApi(StatusCode::OK, document))
}

async fn get_relationship(
    State(store): State<AppState>,
    Path((collection, id, relationship)): Path<(String, String, String)>,
) -> ApiResult<JsonApi<Document>> {
    let id = parse_id(&id)?;
    let linkage = store.linkage(&collection, id, &relationship).await?;

    let config = store.config();
    Ok(JsonApi(
        StatusCode::OK,
        Document::linkage(
            linkage,
            config.link(&format!("/{}/{}/relationships/{}", collection, id, relationship)),
            config.link(&format!("/{}/{}/{}", collection, id, relationship)),
        ),
    ))
}

async fn unknown_route(uri: Uri) -> ApiError {
    ApiError(StoreError::ResourceNotFound(uri.path().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use axum::body::Body;
    use axum::http::Request;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let config = StoreConfig::builder("postgres://localhost/retail_test").build();
        let pool = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        router(Arc::new(ResourceStore::from_pool(pool, config)))
    }

    async fn api_call(
        router: &Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, JSONAPI_MEDIA_TYPE);
        let body = match body {
            Some(v) => Body::from(serde_json::to_string(&v).unwrap()),
            None => Body::empty(),
        };
        let resp = router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            JSONAPI_MEDIA_TYPE
        );
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_api_root_lists_collections() {
        let router = test_router();
        let (status, json) = api_call(&router, "GET", "/api", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["meta"]["collections"].as_array().unwrap().len(), 12);
        assert_eq!(json["links"]["Customer"], "/api/Customer");
        assert_eq!(json["links"]["self"], "/api/");
    }

    #[tokio::test]
    async fn test_unknown_collection_is_404() {
        let router = test_router();
        let (status, json) = api_call(&router, "GET", "/api/Widget", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["errors"][0]["status"], "404");
        assert_eq!(json["errors"][0]["title"], "Unknown collection");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let router = test_router();
        let (status, json) = api_call(&router, "GET", "/elsewhere", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["errors"][0]["detail"]
            .as_str()
            .unwrap()
            .contains("/elsewhere"));
    }

    #[tokio::test]
    async fn test_invalid_page_limit_is_400() {
        let router = test_router();
        let (status, json) =
            api_call(&router, "GET", "/api/Customer?page%5Blimit%5D=0", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errors"][0]["title"], "Invalid query");
    }

    #[tokio::test]
    async fn test_unknown_filter_field_is_400() {
        let router = test_router();
        let (status, json) =
            api_call(&router, "GET", "/api/Customer?filter%5Bcolour%5D=red", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["errors"][0]["detail"]
            .as_str()
            .unwrap()
            .contains("Unknown filter field"));
    }

    #[tokio::test]
    async fn test_invalid_id_is_400() {
        let router = test_router();
        let (status, _) = api_call(&router, "GET", "/api/Customer/abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_relationship_is_404() {
        let router = test_router();
        let (status, json) = api_call(&router, "GET", "/api/Customer/1/friends", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["errors"][0]["title"], "Unknown relationship");
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let router = test_router();
        let (status, json) = api_call(
            &router,
            "POST",
            "/api/Category",
            Some(serde_json::json!({"name": "no data member"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errors"][0]["title"], "Malformed JSON");
    }

    #[tokio::test]
    async fn test_type_mismatch_is_409() {
        let router = test_router();
        let (status, _) = api_call(
            &router,
            "POST",
            "/api/Category",
            Some(serde_json::json!({"data": {"type": "Product", "attributes": {"name": "x"}}})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_missing_required_attribute_is_400() {
        let router = test_router();
        let (status, json) = api_call(
            &router,
            "POST",
            "/api/Customer",
            Some(serde_json::json!({"data": {"type": "Customer", "attributes": {"name": "Acme"}}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["errors"][0]["detail"]
            .as_str()
            .unwrap()
            .contains("credit_limit"));
    }

    #[tokio::test]
    async fn test_patch_id_mismatch_is_409() {
        let router = test_router();
        let (status, _) = api_call(
            &router,
            "PATCH",
            "/api/Category/1",
            Some(serde_json::json!({"data": {"type": "Category", "id": "2", "attributes": {}}})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
