//! Document manager: identity map, type registry and engine orchestration.

use crate::{
    client::OpenSearchEngine,
    config::{ManagerConfig, OpenSearchConfig},
    document::{Document, DocumentRef, Source, shared},
    engine::{
        CreateIndexRequest, DocumentAddress, IndexDocumentRequest, PutPipelineRequest,
        SearchEngine, SearchRequest,
    },
    error::{OdmError, Result},
    identity::IdentityMap,
    registry::{Pipeline, TypeRegistry},
    retry::RetryPolicy,
    search::{SearchCriteria, count_body, search_body, total_hits},
};
use serde_json::Value;
use std::any::TypeId;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Maps typed documents onto engine indices and tracks loaded instances.
///
/// Operations that touch the identity map take `&mut self`. To share one
/// manager between tasks, wrap it with [`DocumentManager::into_shared`].
pub struct DocumentManager<E = OpenSearchEngine> {
    engine: E,
    registry: TypeRegistry,
    identity: IdentityMap,
    retry: RetryPolicy,
}

impl DocumentManager<OpenSearchEngine> {
    /// Create a manager backed by an OpenSearch cluster.
    pub fn connect(config: ManagerConfig, opensearch: OpenSearchConfig) -> Result<Self> {
        Ok(Self::new(config, OpenSearchEngine::new(opensearch)?))
    }
}

impl<E: SearchEngine> DocumentManager<E> {
    /// Create a manager over an engine.
    pub fn new(config: ManagerConfig, engine: E) -> Self {
        info!(index = %config.index, "Creating document manager");

        Self {
            engine,
            registry: TypeRegistry::new(config.index),
            identity: IdentityMap::new(),
            retry: config.retry,
        }
    }

    /// Wrap the manager for shared use across tasks.
    pub fn into_shared(self) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(self))
    }

    /// Get the underlying engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Get the type registry.
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Get the identity map.
    pub fn identity_map(&self) -> &IdentityMap {
        &self.identity
    }

    /// Default fetch retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    // =========================================================================
    // Type Registration
    // =========================================================================

    /// Override the wire type name of a document type.
    pub fn register_type<D: Document>(&mut self, wire_type_name: impl Into<String>) {
        self.registry.register_type::<D>(wire_type_name);
    }

    /// Register the mapping of a document type.
    pub fn register_mapping<D: Document>(&mut self, mapping: Value) {
        self.registry.register_mapping::<D>(mapping);
    }

    /// Register index settings of a document type.
    pub fn register_settings<D: Document>(&mut self, settings: Value) {
        self.registry.register_settings::<D>(settings);
    }

    /// Register an ingest pipeline of a document type.
    pub fn register_pipeline<D: Document>(&mut self, pipeline: Pipeline) {
        self.registry.register_pipeline::<D>(pipeline);
    }

    /// Wire type name of a document type.
    pub fn wire_type_name<D: Document>(&self) -> String {
        self.registry.wire_type_name::<D>()
    }

    /// Index name of a document type.
    pub fn index_name<D: Document>(&self) -> String {
        self.registry.index_name::<D>()
    }

    fn address<D: Document>(&self, id: &str) -> DocumentAddress {
        DocumentAddress {
            index: self.index_name::<D>(),
            doc_type: self.wire_type_name::<D>(),
            id: id.to_string(),
        }
    }

    // =========================================================================
    // Index Lifecycle
    // =========================================================================

    /// Create the indices (and pipelines) of every mapped document type.
    pub async fn create_index(&self) -> Result<()> {
        self.create_indices(None).await
    }

    /// Create the index (and pipeline) of one document type.
    pub async fn create_index_for<D: Document>(&self) -> Result<()> {
        self.create_indices(Some(TypeId::of::<D>())).await
    }

    async fn create_indices(&self, only: Option<TypeId>) -> Result<()> {
        for mapped in self.registry.mapped_types(only) {
            if let Some(pipeline) = &mapped.pipeline {
                debug!(pipeline = %mapped.wire_name, "Creating ingest pipeline");
                self.engine
                    .put_pipeline(PutPipelineRequest {
                        id: mapped.wire_name.clone(),
                        body: pipeline.to_json(),
                    })
                    .await?;
            }

            info!(index = %mapped.index, doc_type = %mapped.wire_name, "Creating index");
            self.engine
                .create_index(CreateIndexRequest {
                    index: mapped.index,
                    doc_type: mapped.wire_name,
                    mapping: mapped.mapping,
                    settings: mapped.settings,
                })
                .await?;
        }

        Ok(())
    }

    /// Drop the indices (and pipelines) of every mapped document type.
    pub async fn drop_index(&self) -> Result<()> {
        self.drop_indices(None).await
    }

    /// Drop the index (and pipeline) of one document type.
    pub async fn drop_index_for<D: Document>(&self) -> Result<()> {
        self.drop_indices(Some(TypeId::of::<D>())).await
    }

    async fn drop_indices(&self, only: Option<TypeId>) -> Result<()> {
        for mapped in self.registry.mapped_types(only) {
            // A pipeline that is missing or still referenced must not block the index drop.
            if mapped.pipeline.is_some()
                && let Err(error) = self.engine.delete_pipeline(&mapped.wire_name).await
            {
                debug!(pipeline = %mapped.wire_name, %error, "Ignoring failed pipeline deletion");
            }

            info!(index = %mapped.index, "Dropping index");
            self.engine.delete_index(&mapped.index).await?;
        }

        Ok(())
    }

    // =========================================================================
    // Identity Map
    // =========================================================================

    /// Register a document in the identity map.
    ///
    /// Fails with [`OdmError::Conflict`] when a different instance is already
    /// registered under the same id, unless `replace` is set.
    pub fn register<D: Document>(&mut self, doc: &DocumentRef<D>, replace: bool) -> Result<()> {
        self.identity.register(doc, replace)
    }

    /// Forget every loaded document.
    pub fn detach_all(&mut self) {
        self.identity.detach_all();
    }

    /// Forget every loaded document of one type.
    pub fn detach_type<D: Document>(&mut self) {
        self.identity.detach_type::<D>();
    }

    /// Forget one loaded document.
    pub fn detach<D: Document>(&mut self, id: &str) {
        self.identity.detach::<D>(id);
    }

    /// Whether a document is loaded.
    pub fn is_registered<D: Document>(&self, id: &str) -> bool {
        self.identity.contains::<D>(id)
    }

    /// Number of loaded documents.
    pub fn registered_count(&self) -> usize {
        self.identity.len()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Register and write a document.
    pub async fn save<D: Document>(&mut self, doc: &DocumentRef<D>, replace: bool) -> Result<()> {
        self.identity.register(doc, replace)?;

        let (id, source) = {
            let doc = doc.read();
            (doc.id().to_string(), doc.to_storable()?)
        };

        let pipeline = self
            .registry
            .pipeline::<D>()
            .map(|_| self.wire_type_name::<D>());

        self.write(self.address::<D>(&id), source, pipeline).await
    }

    /// Write every loaded document.
    ///
    /// Stops at the first failure; documents written before it stay written.
    pub async fn save_all(&self) -> Result<()> {
        for snapshot in self.identity.snapshot() {
            let (wire_name, index) = self
                .registry
                .names_of(snapshot.type_id, snapshot.short_name);
            let pipeline = self
                .registry
                .has_pipeline(snapshot.type_id)
                .then(|| wire_name.clone());

            for doc in snapshot.documents {
                let address = DocumentAddress {
                    index: index.clone(),
                    doc_type: wire_name.clone(),
                    id: doc.document_id(),
                };
                self.write(address, doc.storable()?, pipeline.clone()).await?;
            }
        }

        Ok(())
    }

    async fn write(
        &self,
        address: DocumentAddress,
        source: Source,
        pipeline: Option<String>,
    ) -> Result<()> {
        debug!(index = %address.index, id = %address.id, "Saving document");

        self.engine
            .index_document(IndexDocumentRequest {
                address,
                body: Value::Object(source),
                pipeline,
            })
            .await
    }

    /// Delete a document remotely and forget it locally.
    ///
    /// Remote failures (including "already gone") are ignored.
    pub async fn delete<D: Document>(&mut self, id: &str) {
        let address = self.address::<D>(id);

        if let Err(error) = self.engine.delete_document(&address).await {
            debug!(index = %address.index, id = %id, %error, "Ignoring failed document deletion");
        }

        self.identity.detach::<D>(id);
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Load a document, using the default retry count on engine failures.
    pub async fn document<D: Document>(&mut self, id: &str) -> Result<DocumentRef<D>> {
        self.document_with_retries::<D>(id, self.retry.retries).await
    }

    /// Load a document.
    ///
    /// Returns the loaded instance when there is one, without asking the
    /// engine. Otherwise fetches and builds it. Every failure is reported as
    /// [`OdmError::NotFound`] with the underlying error as its source.
    pub async fn document_with_retries<D: Document>(
        &mut self,
        id: &str,
        retries: u32,
    ) -> Result<DocumentRef<D>> {
        if let Some(doc) = self.identity.get::<D>(id) {
            return Ok(doc);
        }

        let loaded = match self.fetch_document::<D>(id, retries).await {
            Ok(envelope) => self.build_document::<D>(id, envelope),
            Err(error) => Err(error),
        };

        loaded.map_err(|error| self.not_found::<D>(id, error))
    }

    /// Reload a loaded document in place, using the default retry count.
    pub async fn refresh_document<D: Document>(&mut self, doc: &DocumentRef<D>) -> Result<()> {
        self.refresh_document_with_retries(doc, self.retry.retries)
            .await
    }

    /// Reload a loaded document in place.
    ///
    /// Fails with [`OdmError::Conflict`] when another instance is registered
    /// under the document's id. Every other failure is reported as
    /// [`OdmError::NotFound`].
    pub async fn refresh_document_with_retries<D: Document>(
        &mut self,
        doc: &DocumentRef<D>,
        retries: u32,
    ) -> Result<()> {
        let id = doc.read().id().to_string();

        let registered = self
            .identity
            .retrieve::<D>(&id)
            .map_err(|error| self.not_found::<D>(&id, error))?;
        if !Arc::ptr_eq(&registered, doc) {
            return Err(OdmError::Conflict(format!(
                "{} {} is not managed by this document manager",
                self.wire_type_name::<D>(),
                id
            )));
        }

        let refreshed = match self.fetch_document::<D>(&id, retries).await {
            Ok(envelope) => self.build_document::<D>(&id, envelope).map(|_| ()),
            Err(error) => Err(error),
        };

        refreshed.map_err(|error| self.not_found::<D>(&id, error))
    }

    /// Search documents of one type.
    ///
    /// Hits that cannot be built are skipped.
    pub async fn documents<D: Document>(
        &mut self,
        search: &dyn SearchCriteria,
    ) -> Result<Vec<DocumentRef<D>>> {
        let doc_type = self.wire_type_name::<D>();
        let request = SearchRequest {
            index: self.index_name::<D>(),
            doc_type: doc_type.clone(),
            body: search_body(search),
        };

        let mut response = self.engine.search(request).await?;
        if total_hits(&response) == Some(0) {
            return Ok(Vec::new());
        }

        let hits = match response.pointer_mut("/hits/hits").map(Value::take) {
            Some(Value::Array(hits)) => hits,
            _ => Vec::new(),
        };

        let mut documents = Vec::with_capacity(hits.len());
        for hit in hits {
            let Some(id) = hit.get("_id").and_then(Value::as_str).map(str::to_string) else {
                warn!(doc_type = %doc_type, "Skipping search hit without _id");
                continue;
            };

            match self.build_document::<D>(&id, hit) {
                Ok(doc) => documents.push(doc),
                Err(error) => {
                    warn!(doc_type = %doc_type, id = %id, %error, "Skipping unbuildable search hit");
                }
            }
        }

        Ok(documents)
    }

    /// Count documents of one type.
    pub async fn count<D: Document>(&self, search: &dyn SearchCriteria) -> Result<u64> {
        self.engine
            .count(SearchRequest {
                index: self.index_name::<D>(),
                doc_type: self.wire_type_name::<D>(),
                body: count_body(search),
            })
            .await
    }

    /// Fetch a raw document envelope, retrying engine failures.
    ///
    /// Makes up to `retries + 1` attempts, sleeping according to the
    /// manager's [`RetryPolicy`] after each failure. Fails with
    /// [`OdmError::Unavailable`] once every attempt has failed.
    pub async fn fetch_document<D: Document>(&self, id: &str, retries: u32) -> Result<Value> {
        let policy = self.retry.with_retries(retries);
        let address = self.address::<D>(id);
        let mut last_error = None;

        for attempt in 0..policy.attempts() {
            match self.engine.get_document(&address).await {
                Ok(envelope) => return Ok(envelope),
                Err(error) => {
                    let delay = policy.delay_for_attempt(attempt);
                    warn!(
                        index = %address.index,
                        id = %id,
                        attempt = attempt + 1,
                        ?delay,
                        %error,
                        "Document fetch failed"
                    );
                    last_error = Some(error);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(OdmError::Unavailable {
            attempts: policy.attempts(),
            source: Box::new(
                last_error.unwrap_or_else(|| OdmError::Engine("no fetch attempted".to_string())),
            ),
        })
    }

    /// Build a document from an engine envelope.
    ///
    /// A loaded instance is rebuilt in place; otherwise a blank instance is
    /// rebuilt and registered. Fails with [`OdmError::NotFound`] when the
    /// envelope has no `_source`, and with [`OdmError::Build`] when the
    /// document rejects the payload.
    pub fn build_document<D: Document>(
        &mut self,
        id: &str,
        envelope: Value,
    ) -> Result<DocumentRef<D>> {
        let source = match envelope {
            Value::Object(mut envelope) => envelope.remove("_source"),
            _ => None,
        };
        let source = match source {
            Some(Value::Object(source)) => source,
            Some(other) => {
                return Err(self.build_error::<D>(
                    id,
                    OdmError::InvalidSource(format!("_source is not an object: {}", other)),
                ));
            }
            None => {
                return Err(OdmError::not_found(self.wire_type_name::<D>(), id));
            }
        };

        if let Some(existing) = self.identity.get::<D>(id) {
            let rebuilt = existing.write().rebuild(id, source);
            rebuilt.map_err(|error| self.build_error::<D>(id, error))?;
            return Ok(existing);
        }

        let mut document = D::blank();
        document
            .rebuild(id, source)
            .map_err(|error| self.build_error::<D>(id, error))?;

        let document = shared(document);
        self.identity
            .register(&document, false)
            .map_err(|error| self.build_error::<D>(id, error))?;

        Ok(document)
    }

    fn not_found<D: Document>(&self, id: &str, cause: OdmError) -> OdmError {
        OdmError::NotFound {
            doc_type: self.wire_type_name::<D>(),
            id: id.to_string(),
            source: Some(Box::new(cause)),
        }
    }

    fn build_error<D: Document>(&self, id: &str, cause: OdmError) -> OdmError {
        OdmError::Build {
            doc_type: self.wire_type_name::<D>(),
            id: id.to_string(),
            source: Box::new(cause),
        }
    }
}

impl<E> std::fmt::Debug for DocumentManager<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentManager")
            .field("index", &self.registry.base_index())
            .field("documents", &self.identity)
            .field("retry", &self.retry)
            .finish()
    }
}
