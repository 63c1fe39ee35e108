//! Milvus vector store over the REST v2 API
//!
//! Endpoints used:
//! - `POST /v2/vectordb/entities/query`
//! - `POST /v2/vectordb/entities/insert`
//! - `POST /v2/vectordb/collections/has`
//! - `POST /v2/vectordb/collections/create`

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{CollectionSchema, IndexParams, Row, StoreError, VectorStore};
use crate::config::StoreConfig;
use crate::embedding::EmbeddingBackend;
use crate::types::Embedding;

/// Upper bound on rows returned by one query
const QUERY_LIMIT: usize = 16_384;

/// Envelope shared by every v2 response
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Milvus-backed [`VectorStore`]
pub struct MilvusStore {
    http: reqwest::Client,
    base_url: String,
    database: Option<String>,
    embedder: Arc<dyn EmbeddingBackend>,
    provisioned: Mutex<HashSet<String>>,
}

impl MilvusStore {
    pub fn new(config: &StoreConfig, embedder: Arc<dyn EmbeddingBackend>) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| StoreError::Config(format!("Invalid token format: {}", e)))?,
            );
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| StoreError::Config(format!("Failed to build HTTP client: {}", e)))?;

        info!(uri = %config.uri, embedder = embedder.name(), "Milvus store configured");

        Ok(Self {
            http,
            base_url: config.uri.trim_end_matches('/').to_string(),
            database: config.database.clone(),
            embedder,
            provisioned: Mutex::new(HashSet::new()),
        })
    }

    /// POST `body` to a v2 endpoint and return the `data` member
    async fn call(&self, endpoint: &str, mut body: Value) -> Result<Value, StoreError> {
        if let (Some(db), Some(obj)) = (&self.database, body.as_object_mut()) {
            obj.insert("dbName".to_string(), Value::String(db.clone()));
        }

        let url = format!("{}/v2/vectordb/{}", self.base_url, endpoint);
        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StoreError::Api {
                code: i64::from(status.as_u16()),
                message: text,
            });
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        if envelope.code != 0 {
            return Err(StoreError::Api {
                code: envelope.code,
                message: envelope.message.unwrap_or_default(),
            });
        }
        Ok(envelope.data)
    }

    /// Create `destination` with the article schema unless it already exists.
    /// Successful checks are cached per destination.
    async fn ensure_collection(
        &self,
        destination: &str,
        schema: &CollectionSchema,
        index: &IndexParams,
    ) -> Result<(), StoreError> {
        if self.provisioned.lock().contains(destination) {
            return Ok(());
        }

        let has = self
            .call("collections/has", json!({ "collectionName": destination }))
            .await?;
        let exists = has.get("has").and_then(Value::as_bool).unwrap_or(false);

        if !exists {
            info!(collection = destination, "creating collection");
            self.call(
                "collections/create",
                json!({
                    "collectionName": destination,
                    "schema": schema.to_milvus_json(),
                    "indexParams": index.to_milvus_json(),
                }),
            )
            .await?;
        }

        self.provisioned.lock().insert(destination.to_string());
        Ok(())
    }
}

#[async_trait]
impl VectorStore for MilvusStore {
    async fn query(
        &self,
        destination: &str,
        filter: &str,
        output_fields: &[&str],
    ) -> Result<Vec<Row>, StoreError> {
        let data = self
            .call(
                "entities/query",
                json!({
                    "collectionName": destination,
                    "filter": filter,
                    "outputFields": output_fields,
                    "limit": QUERY_LIMIT,
                }),
            )
            .await?;

        let rows = match data {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect(),
            Value::Null => Vec::new(),
            other => return Err(StoreError::Decode(format!("unexpected query data: {}", other))),
        };
        debug!(collection = destination, rows = rows.len(), "query complete");
        Ok(rows)
    }

    async fn store(
        &self,
        destination: &str,
        schema: &CollectionSchema,
        index: &IndexParams,
        rows: Vec<Value>,
    ) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        self.ensure_collection(destination, schema, index).await?;

        let count = rows.len();
        let data = self
            .call(
                "entities/insert",
                json!({ "collectionName": destination, "data": rows }),
            )
            .await?;
        let inserted = data.get("insertCount").and_then(Value::as_u64);
        debug!(collection = destination, sent = count, inserted = ?inserted, "insert complete");
        match inserted {
            Some(n) if (n as usize) < count => Err(StoreError::Api {
                code: 0,
                message: format!("short insert into {}: {} of {} rows", destination, n, count),
            }),
            _ => Ok(()),
        }
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>, StoreError> {
        Ok(self.embedder.embed_batch(texts).await?)
    }

    fn dimensions(&self) -> usize {
        self.embedder.dimensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingResult;
    use crate::store::url_in_filter;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug)]
    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingBackend for FixedEmbedder {
        async fn embed(&self, _text: &str) -> EmbeddingResult<Embedding> {
            Ok(vec![1.0, 0.0])
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn store_for(server: &MockServer) -> MilvusStore {
        let config = StoreConfig {
            uri: server.uri(),
            token: Some("root:Milvus".to_string()),
            ..StoreConfig::default()
        };
        MilvusStore::new(&config, Arc::new(FixedEmbedder)).unwrap()
    }

    fn ok(data: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "code": 0, "data": data }))
    }

    #[tokio::test]
    async fn test_query_sends_filter_and_returns_rows() {
        let server = MockServer::start().await;
        let filter = url_in_filter(&["https://a.com/1"]);
        Mock::given(method("POST"))
            .and(path("/v2/vectordb/entities/query"))
            .and(header("authorization", "Bearer root:Milvus"))
            .and(body_partial_json(json!({
                "collectionName": "deepresearch_tech",
                "filter": filter,
                "outputFields": ["url"]
            })))
            .respond_with(ok(json!([{ "url": "https://a.com/1" }])))
            .expect(1)
            .mount(&server)
            .await;

        let rows = store_for(&server)
            .query("deepresearch_tech", &filter, &["url"])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["url"], "https://a.com/1");
    }

    #[tokio::test]
    async fn test_error_code_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "code": 100, "message": "collection not found" })),
            )
            .mount(&server)
            .await;

        let err = store_for(&server).query("x", "", &["url"]).await.unwrap_err();
        assert!(matches!(err, StoreError::Api { code: 100, .. }));
        assert!(err.to_string().contains("collection not found"));
    }

    #[tokio::test]
    async fn test_store_creates_collection_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/vectordb/collections/has"))
            .respond_with(ok(json!({ "has": false })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2/vectordb/collections/create"))
            .and(body_partial_json(json!({ "collectionName": "deepresearch_tech" })))
            .respond_with(ok(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2/vectordb/entities/insert"))
            .respond_with(ok(json!({ "insertCount": 1, "insertIds": ["a"] })))
            .expect(2)
            .mount(&server)
            .await;

        let store = store_for(&server);
        let schema = CollectionSchema::article(2);
        let index = IndexParams::article();
        let row = json!({ "id": "a", "url": "u", "title": "t", "content": "c", "content_emb": [1.0, 0.0], "create_time": 1 });
        store
            .store("deepresearch_tech", &schema, &index, vec![row.clone()])
            .await
            .unwrap();
        store
            .store("deepresearch_tech", &schema, &index, vec![row])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_short_insert_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/vectordb/collections/has"))
            .respond_with(ok(json!({ "has": true })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2/vectordb/entities/insert"))
            .respond_with(ok(json!({ "insertCount": 1, "insertIds": ["a"] })))
            .mount(&server)
            .await;

        let schema = CollectionSchema::article(2);
        let index = IndexParams::article();
        let rows = vec![json!({ "id": "a" }), json!({ "id": "b" })];
        let err = store_for(&server)
            .store("deepresearch_tech", &schema, &index, rows)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Api { .. }));
        assert!(err.to_string().contains("1 of 2"));
    }

    #[tokio::test]
    async fn test_embed_delegates_to_backend() {
        let server = MockServer::start().await;
        let store = store_for(&server);
        let out = store.embed(&["a".to_string(), "b".to_string()]).await.unwrap();
        assert_eq!(out, vec![vec![1.0, 0.0], vec![1.0, 0.0]]);
        assert_eq!(store.dimensions(), 2);
    }
}
