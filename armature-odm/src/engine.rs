//! Search engine seam.
//!
//! The manager talks to the engine only through [`SearchEngine`], using the
//! logical request shapes defined here. [`OpenSearchEngine`](crate::OpenSearchEngine)
//! maps them onto the OpenSearch REST API.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

/// Address of a single document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentAddress {
    /// Index name.
    pub index: String,
    /// Wire type name.
    pub doc_type: String,
    /// Document ID.
    pub id: String,
}

/// Index creation request.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndexRequest {
    /// Index name.
    pub index: String,
    /// Wire type name the mapping belongs to.
    pub doc_type: String,
    /// Mapping definition.
    pub mapping: Value,
    /// Index settings.
    pub settings: Option<Value>,
}

impl CreateIndexRequest {
    /// Request body with the mapping keyed by wire type name.
    pub fn body(&self) -> Value {
        let mut mappings = serde_json::Map::new();
        mappings.insert(self.doc_type.clone(), self.mapping.clone());
        let mut body = json!({ "mappings": mappings });
        if let Some(settings) = &self.settings {
            body["settings"] = settings.clone();
        }
        body
    }

    /// Request body for engines without mapping types.
    pub fn typeless_body(&self) -> Value {
        let mut body = json!({ "mappings": self.mapping.clone() });
        if let Some(settings) = &self.settings {
            body["settings"] = settings.clone();
        }
        body
    }
}

/// Ingest pipeline creation request.
#[derive(Debug, Clone, PartialEq)]
pub struct PutPipelineRequest {
    /// Pipeline ID.
    pub id: String,
    /// Pipeline body: `{description, processors}`.
    pub body: Value,
}

/// Document write request.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocumentRequest {
    /// Target document.
    pub address: DocumentAddress,
    /// Stored field map.
    pub body: Value,
    /// Ingest pipeline to run on write.
    pub pipeline: Option<String>,
}

/// Search or count request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Index name.
    pub index: String,
    /// Wire type name.
    pub doc_type: String,
    /// Request body.
    pub body: Value,
}

/// Operations the manager needs from a search engine.
///
/// Implementations report failures as errors; the manager decides which
/// failures are retried, swallowed or propagated.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Create or replace an ingest pipeline.
    async fn put_pipeline(&self, request: PutPipelineRequest) -> Result<()>;

    /// Delete an ingest pipeline.
    async fn delete_pipeline(&self, id: &str) -> Result<()>;

    /// Create an index.
    async fn create_index(&self, request: CreateIndexRequest) -> Result<()>;

    /// Delete an index.
    async fn delete_index(&self, index: &str) -> Result<()>;

    /// Write a document.
    async fn index_document(&self, request: IndexDocumentRequest) -> Result<()>;

    /// Get a document envelope (`_id`, `_source`, ...).
    async fn get_document(&self, address: &DocumentAddress) -> Result<Value>;

    /// Delete a document.
    async fn delete_document(&self, address: &DocumentAddress) -> Result<()>;

    /// Run a search and return the raw response.
    async fn search(&self, request: SearchRequest) -> Result<Value>;

    /// Count matching documents.
    async fn count(&self, request: SearchRequest) -> Result<u64>;
}

#[async_trait]
impl<E: SearchEngine + ?Sized> SearchEngine for Arc<E> {
    async fn put_pipeline(&self, request: PutPipelineRequest) -> Result<()> {
        (**self).put_pipeline(request).await
    }

    async fn delete_pipeline(&self, id: &str) -> Result<()> {
        (**self).delete_pipeline(id).await
    }

    async fn create_index(&self, request: CreateIndexRequest) -> Result<()> {
        (**self).create_index(request).await
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        (**self).delete_index(index).await
    }

    async fn index_document(&self, request: IndexDocumentRequest) -> Result<()> {
        (**self).index_document(request).await
    }

    async fn get_document(&self, address: &DocumentAddress) -> Result<Value> {
        (**self).get_document(address).await
    }

    async fn delete_document(&self, address: &DocumentAddress) -> Result<()> {
        (**self).delete_document(address).await
    }

    async fn search(&self, request: SearchRequest) -> Result<Value> {
        (**self).search(request).await
    }

    async fn count(&self, request: SearchRequest) -> Result<u64> {
        (**self).count(request).await
    }
}
