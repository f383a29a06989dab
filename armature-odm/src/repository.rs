//! Typed repositories over a shared document manager.

use crate::{
    client::OpenSearchEngine,
    document::{Document, DocumentRef},
    engine::SearchEngine,
    error::Result,
    manager::DocumentManager,
    search::SearchCriteria,
};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Repository for one document type.
///
/// Repositories of different types can share one manager, and therefore one
/// identity map.
///
/// ```rust,no_run
/// # use armature_odm::prelude::*;
/// # async fn run<D: Document>(manager: DocumentManager) -> Result<()> {
/// let repository = Repository::<D>::new(manager.into_shared());
/// let doc = repository.find("42").await?;
/// repository.save(&doc).await?;
/// # Ok(())
/// # }
/// ```
pub struct Repository<D, E = OpenSearchEngine> {
    manager: Arc<Mutex<DocumentManager<E>>>,
    _document: PhantomData<fn() -> D>,
}

impl<D: Document, E: SearchEngine> Repository<D, E> {
    /// Create a repository over a shared manager.
    pub fn new(manager: Arc<Mutex<DocumentManager<E>>>) -> Self {
        Self {
            manager,
            _document: PhantomData,
        }
    }

    /// Shared manager behind this repository.
    pub fn manager(&self) -> &Arc<Mutex<DocumentManager<E>>> {
        &self.manager
    }

    /// Load a document by id.
    pub async fn find(&self, id: &str) -> Result<DocumentRef<D>> {
        self.manager.lock().await.document::<D>(id).await
    }

    /// Search documents.
    pub async fn find_by(&self, search: &dyn SearchCriteria) -> Result<Vec<DocumentRef<D>>> {
        self.manager.lock().await.documents::<D>(search).await
    }

    /// Count documents.
    pub async fn count_by(&self, search: &dyn SearchCriteria) -> Result<u64> {
        self.manager.lock().await.count::<D>(search).await
    }

    /// Write a document, registering it if needed.
    pub async fn save(&self, doc: &DocumentRef<D>) -> Result<()> {
        self.manager.lock().await.save(doc, false).await
    }

    /// Reload a document in place.
    pub async fn refresh(&self, doc: &DocumentRef<D>) -> Result<()> {
        self.manager.lock().await.refresh_document(doc).await
    }

    /// Delete a document and forget it.
    pub async fn remove(&self, id: &str) {
        self.manager.lock().await.delete::<D>(id).await;
    }
}

impl<D, E> Clone for Repository<D, E> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            _document: PhantomData,
        }
    }
}

impl<D, E> std::fmt::Debug for Repository<D, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("document", &std::any::type_name::<D>())
            .finish()
    }
}
