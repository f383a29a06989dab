//! In-memory engine for tests.
//!
//! [`MockEngine`] stores written documents per index, records every request
//! and can be told to fail specific operations.

use crate::engine::{
    CreateIndexRequest, DocumentAddress, IndexDocumentRequest, PutPipelineRequest, SearchEngine,
    SearchRequest,
};
use crate::error::{OdmError, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

/// Engine operations, used to target failures and inspect calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `put_pipeline`
    PutPipeline,
    /// `delete_pipeline`
    DeletePipeline,
    /// `create_index`
    CreateIndex,
    /// `delete_index`
    DeleteIndex,
    /// `index_document`
    IndexDocument,
    /// `get_document`
    GetDocument,
    /// `delete_document`
    DeleteDocument,
    /// `search`
    Search,
    /// `count`
    Count,
}

/// A recorded engine request.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    /// Pipeline creation.
    PutPipeline(PutPipelineRequest),
    /// Pipeline deletion.
    DeletePipeline(String),
    /// Index creation.
    CreateIndex(CreateIndexRequest),
    /// Index deletion.
    DeleteIndex(String),
    /// Document write.
    IndexDocument(IndexDocumentRequest),
    /// Document read.
    GetDocument(DocumentAddress),
    /// Document deletion.
    DeleteDocument(DocumentAddress),
    /// Search.
    Search(SearchRequest),
    /// Count.
    Count(SearchRequest),
}

impl EngineCall {
    /// Operation of this call.
    pub fn operation(&self) -> Operation {
        match self {
            EngineCall::PutPipeline(_) => Operation::PutPipeline,
            EngineCall::DeletePipeline(_) => Operation::DeletePipeline,
            EngineCall::CreateIndex(_) => Operation::CreateIndex,
            EngineCall::DeleteIndex(_) => Operation::DeleteIndex,
            EngineCall::IndexDocument(_) => Operation::IndexDocument,
            EngineCall::GetDocument(_) => Operation::GetDocument,
            EngineCall::DeleteDocument(_) => Operation::DeleteDocument,
            EngineCall::Search(_) => Operation::Search,
            EngineCall::Count(_) => Operation::Count,
        }
    }
}

#[derive(Default)]
struct State {
    indices: HashMap<String, IndexMap<String, Value>>,
    calls: Vec<EngineCall>,
    failures: HashMap<Operation, usize>,
    search_response: Option<Value>,
}

/// In-memory [`SearchEngine`].
#[derive(Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<State>>,
}

impl MockEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` calls of an operation.
    pub fn fail_next(&self, operation: Operation, times: usize) {
        self.state.lock().failures.insert(operation, times);
    }

    /// Fail every call of an operation.
    pub fn fail_always(&self, operation: Operation) {
        self.fail_next(operation, usize::MAX);
    }

    /// Stop injecting failures.
    pub fn heal(&self) {
        self.state.lock().failures.clear();
    }

    /// Answer every search with a fixed response.
    pub fn set_search_response(&self, response: Value) {
        self.state.lock().search_response = Some(response);
    }

    /// Store a document directly, bypassing the call log.
    pub fn insert(&self, index: &str, id: &str, source: Value) {
        self.state
            .lock()
            .indices
            .entry(index.to_string())
            .or_default()
            .insert(id.to_string(), source);
    }

    /// Stored source of a document.
    pub fn stored(&self, index: &str, id: &str) -> Option<Value> {
        self.state
            .lock()
            .indices
            .get(index)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    /// All recorded calls, oldest first.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    /// Number of recorded calls of an operation.
    pub fn call_count(&self, operation: Operation) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Record a call and consume a pending failure for its operation.
    fn record(&self, call: EngineCall) -> Result<()> {
        let mut state = self.state.lock();
        let operation = call.operation();
        state.calls.push(call);

        match state.failures.get_mut(&operation) {
            Some(remaining) if *remaining > 0 => {
                if *remaining != usize::MAX {
                    *remaining -= 1;
                }
                Err(OdmError::Engine(format!("injected {:?} failure", operation)))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl SearchEngine for MockEngine {
    async fn put_pipeline(&self, request: PutPipelineRequest) -> Result<()> {
        self.record(EngineCall::PutPipeline(request))
    }

    async fn delete_pipeline(&self, id: &str) -> Result<()> {
        self.record(EngineCall::DeletePipeline(id.to_string()))
    }

    async fn create_index(&self, request: CreateIndexRequest) -> Result<()> {
        let index = request.index.clone();
        self.record(EngineCall::CreateIndex(request))?;

        let mut state = self.state.lock();
        if state.indices.contains_key(&index) {
            return Err(OdmError::Engine(format!("index {} already exists", index)));
        }
        state.indices.insert(index, IndexMap::new());
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        self.record(EngineCall::DeleteIndex(index.to_string()))?;

        match self.state.lock().indices.remove(index) {
            Some(_) => Ok(()),
            None => Err(OdmError::Engine(format!("no such index {}", index))),
        }
    }

    async fn index_document(&self, request: IndexDocumentRequest) -> Result<()> {
        let address = request.address.clone();
        let body = request.body.clone();
        self.record(EngineCall::IndexDocument(request))?;

        self.insert(&address.index, &address.id, body);
        Ok(())
    }

    async fn get_document(&self, address: &DocumentAddress) -> Result<Value> {
        self.record(EngineCall::GetDocument(address.clone()))?;

        Ok(match self.stored(&address.index, &address.id) {
            Some(source) => json!({
                "_index": address.index,
                "_id": address.id,
                "found": true,
                "_source": source,
            }),
            None => json!({
                "_index": address.index,
                "_id": address.id,
                "found": false,
            }),
        })
    }

    async fn delete_document(&self, address: &DocumentAddress) -> Result<()> {
        self.record(EngineCall::DeleteDocument(address.clone()))?;

        let removed = self
            .state
            .lock()
            .indices
            .get_mut(&address.index)
            .and_then(|docs| docs.shift_remove(&address.id));

        match removed {
            Some(_) => Ok(()),
            None => Err(OdmError::Engine(format!(
                "{}/{} not found",
                address.index, address.id
            ))),
        }
    }

    async fn search(&self, request: SearchRequest) -> Result<Value> {
        let index = request.index.clone();
        self.record(EngineCall::Search(request))?;

        let state = self.state.lock();
        if let Some(response) = &state.search_response {
            return Ok(response.clone());
        }

        let hits: Vec<Value> = state
            .indices
            .get(&index)
            .map(|docs| {
                docs.iter()
                    .map(|(id, source)| json!({ "_index": index, "_id": id, "_source": source }))
                    .collect()
            })
            .unwrap_or_default();

        Ok(json!({
            "hits": {
                "total": { "value": hits.len(), "relation": "eq" },
                "hits": hits,
            }
        }))
    }

    async fn count(&self, request: SearchRequest) -> Result<u64> {
        let index = request.index.clone();
        self.record(EngineCall::Count(request))?;

        Ok(self
            .state
            .lock()
            .indices
            .get(&index)
            .map_or(0, |docs| docs.len() as u64))
    }
}

impl std::fmt::Debug for MockEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockEngine")
            .field("indices", &state.indices.len())
            .field("calls", &state.calls.len())
            .finish()
    }
}
