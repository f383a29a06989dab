//! OpenSearch engine implementation.

use crate::{
    config::OpenSearchConfig,
    engine::{
        CreateIndexRequest, DocumentAddress, IndexDocumentRequest, PutPipelineRequest,
        SearchEngine, SearchRequest,
    },
    error::{OdmError, Result},
};
use async_trait::async_trait;
use opensearch::{
    OpenSearch,
    http::{
        StatusCode,
        response::Response,
        transport::{SingleNodeConnectionPool, TransportBuilder},
    },
};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info};

/// [`SearchEngine`] backed by the OpenSearch REST API.
///
/// OpenSearch has no mapping types: the wire type name only selects the index
/// and the pipeline, and type-keyed mappings are unwrapped on index creation.
#[derive(Clone)]
pub struct OpenSearchEngine {
    client: Arc<OpenSearch>,
    config: Arc<OpenSearchConfig>,
}

impl OpenSearchEngine {
    /// Create a new OpenSearch engine.
    pub fn new(config: OpenSearchConfig) -> Result<Self> {
        info!(urls = ?config.urls, "Initializing OpenSearch engine");

        let url = config
            .urls
            .first()
            .ok_or_else(|| OdmError::Validation("No URLs provided".to_string()))?;

        let url = opensearch::http::Url::parse(url)
            .map_err(|e| OdmError::Validation(format!("Invalid URL: {}", e)))?;

        let conn_pool = SingleNodeConnectionPool::new(url);
        let mut builder = TransportBuilder::new(conn_pool)
            .timeout(config.request_timeout)
            .disable_proxy();

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.auth(opensearch::auth::Credentials::Basic(
                user.clone(),
                pass.clone(),
            ));
        }

        let transport = builder
            .build()
            .map_err(|e| OdmError::Connection(e.to_string()))?;

        debug!("OpenSearch engine initialized");

        Ok(Self {
            client: Arc::new(OpenSearch::new(transport)),
            config: Arc::new(config),
        })
    }

    /// Get the underlying OpenSearch client.
    pub fn inner(&self) -> &OpenSearch {
        &self.client
    }

    /// Get the configuration.
    pub fn config(&self) -> &OpenSearchConfig {
        &self.config
    }
}

/// Extract the engine's failure reason from an error body.
fn reason(body: &Value) -> String {
    body.get("error")
        .and_then(|e| e.get("reason").or(Some(e)))
        .and_then(|r| r.as_str())
        .unwrap_or("Unknown error")
        .to_string()
}

/// Read a JSON body, turning non-success statuses into engine errors.
async fn into_json(response: Response) -> Result<Value> {
    let status = response.status_code();
    let body: Value = response.json().await?;

    if !status.is_success() {
        return Err(OdmError::Engine(format!("{}: {}", status, reason(&body))));
    }

    Ok(body)
}

#[async_trait]
impl SearchEngine for OpenSearchEngine {
    async fn put_pipeline(&self, request: PutPipelineRequest) -> Result<()> {
        debug!(pipeline = %request.id, "Putting ingest pipeline");

        let response = self
            .client
            .ingest()
            .put_pipeline(opensearch::ingest::IngestPutPipelineParts::Id(&request.id))
            .body(request.body)
            .send()
            .await?;

        into_json(response).await.map(|_| ())
    }

    async fn delete_pipeline(&self, id: &str) -> Result<()> {
        debug!(pipeline = %id, "Deleting ingest pipeline");

        let response = self
            .client
            .ingest()
            .delete_pipeline(opensearch::ingest::IngestDeletePipelineParts::Id(id))
            .send()
            .await?;

        into_json(response).await.map(|_| ())
    }

    async fn create_index(&self, request: CreateIndexRequest) -> Result<()> {
        info!(index = %request.index, "Creating index");

        let response = self
            .client
            .indices()
            .create(opensearch::indices::IndicesCreateParts::Index(&request.index))
            .body(request.typeless_body())
            .send()
            .await?;

        into_json(response).await.map(|_| ())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        info!(index = %index, "Deleting index");

        let response = self
            .client
            .indices()
            .delete(opensearch::indices::IndicesDeleteParts::Index(&[index]))
            .send()
            .await?;

        into_json(response).await.map(|_| ())
    }

    async fn index_document(&self, request: IndexDocumentRequest) -> Result<()> {
        let address = &request.address;
        debug!(index = %address.index, id = %address.id, "Indexing document");

        let mut call = self
            .client
            .index(opensearch::IndexParts::IndexId(&address.index, &address.id));
        if let Some(pipeline) = &request.pipeline {
            call = call.pipeline(pipeline);
        }

        let response = call.body(request.body).send().await?;

        into_json(response).await.map(|_| ())
    }

    async fn get_document(&self, address: &DocumentAddress) -> Result<Value> {
        debug!(index = %address.index, id = %address.id, "Getting document");

        let response = self
            .client
            .get(opensearch::GetParts::IndexId(&address.index, &address.id))
            .send()
            .await?;

        if response.status_code() == StatusCode::NOT_FOUND {
            return Ok(json!({
                "_index": address.index,
                "_id": address.id,
                "found": false,
            }));
        }

        into_json(response).await
    }

    async fn delete_document(&self, address: &DocumentAddress) -> Result<()> {
        debug!(index = %address.index, id = %address.id, "Deleting document");

        let response = self
            .client
            .delete(opensearch::DeleteParts::IndexId(&address.index, &address.id))
            .send()
            .await?;

        into_json(response).await.map(|_| ())
    }

    async fn search(&self, request: SearchRequest) -> Result<Value> {
        debug!(index = %request.index, "Searching");

        let response = self
            .client
            .search(opensearch::SearchParts::Index(&[request.index.as_str()]))
            .body(request.body)
            .send()
            .await?;

        into_json(response).await
    }

    async fn count(&self, request: SearchRequest) -> Result<u64> {
        debug!(index = %request.index, "Counting");

        let response = self
            .client
            .count(opensearch::CountParts::Index(&[request.index.as_str()]))
            .body(request.body)
            .send()
            .await?;

        let body = into_json(response).await?;
        body["count"]
            .as_u64()
            .ok_or_else(|| OdmError::Engine("Count response without count".to_string()))
    }
}

impl std::fmt::Debug for OpenSearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenSearchEngine")
            .field("urls", &self.config.urls)
            .finish()
    }
}
