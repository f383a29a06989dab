//! Document mapping for OpenSearch in the Armature framework.
//!
//! This crate maps typed documents onto search engine indices:
//! - Type registry with per-type wire names, mappings, settings and pipelines
//! - Identity map guaranteeing one live instance per type and id
//! - Document manager for index lifecycle, writes, reads and searches
//! - Fetching with quadratic backoff on engine failures
//! - Typed repositories over a shared manager
//!
//! # Example
//!
//! ```rust,no_run
//! use armature_odm::{
//!     Document, DocumentManager, ManagerConfig, OpenSearchConfig, Result, Search, Source,
//!     document, shared,
//! };
//! use serde::{Deserialize, Serialize};
//! use serde_json::json;
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! struct Article {
//!     #[serde(skip)]
//!     id: String,
//!     title: String,
//! }
//!
//! impl Document for Article {
//!     fn blank() -> Self {
//!         Self::default()
//!     }
//!
//!     fn id(&self) -> &str {
//!         &self.id
//!     }
//!
//!     fn rebuild(&mut self, id: &str, source: Source) -> Result<()> {
//!         *self = document::from_source(source)?;
//!         self.id = id.to_string();
//!         Ok(())
//!     }
//!
//!     fn to_storable(&self) -> Result<Source> {
//!         document::to_source(self)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut manager = DocumentManager::connect(
//!         ManagerConfig::new("catalog"),
//!         OpenSearchConfig::new("http://localhost:9200"),
//!     )?;
//!
//!     // Index "catalog__article"
//!     manager.register_mapping::<Article>(json!({
//!         "properties": { "title": { "type": "text" } }
//!     }));
//!     manager.create_index().await?;
//!
//!     let article = shared(Article {
//!         id: "1".to_string(),
//!         title: "Hello OpenSearch".to_string(),
//!     });
//!     manager.save(&article, false).await?;
//!
//!     // Served from the identity map
//!     let loaded = manager.document::<Article>("1").await?;
//!     assert!(std::sync::Arc::ptr_eq(&loaded, &article));
//!
//!     let hits = manager
//!         .documents::<Article>(&Search::term("title", "hello"))
//!         .await?;
//!     println!("{} hits", hits.len());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod client;
mod config;
pub mod document;
mod engine;
mod error;
mod identity;
mod manager;
pub mod mock;
mod registry;
mod repository;
mod retry;
mod search;

pub use client::OpenSearchEngine;
pub use config::{ManagerConfig, OpenSearchConfig};
pub use document::{Document, DocumentRef, Source, shared};
pub use engine::{
    CreateIndexRequest, DocumentAddress, IndexDocumentRequest, PutPipelineRequest, SearchEngine,
    SearchRequest,
};
pub use error::{OdmError, Result};
pub use identity::IdentityMap;
pub use manager::DocumentManager;
pub use registry::{Pipeline, TypeRegistry};
pub use repository::Repository;
pub use retry::RetryPolicy;
pub use search::{DEFAULT_SIZE, Search, SearchCriteria, SortOrder, count_body, search_body};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        Document, DocumentManager, DocumentRef, ManagerConfig, OdmError, OpenSearchConfig,
        Repository, Result, Search, SearchCriteria, Source, shared,
    };
}
