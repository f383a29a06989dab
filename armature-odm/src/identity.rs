//! Identity map: at most one live instance per document type and id.

use crate::document::{Document, DocumentRef, Source};
use crate::error::{OdmError, Result};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::sync::Arc;

/// Type-erased view of a managed document.
pub(crate) trait ManagedDocument: Send + Sync {
    fn document_id(&self) -> String;
    fn storable(&self) -> Result<Source>;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<D: Document> ManagedDocument for RwLock<D> {
    fn document_id(&self) -> String {
        self.read().id().to_string()
    }

    fn storable(&self) -> Result<Source> {
        self.read().to_storable()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

struct Bucket {
    short_name: &'static str,
    documents: IndexMap<String, Arc<dyn ManagedDocument>>,
}

/// Documents of one type, in registration order.
pub(crate) struct TypeSnapshot {
    pub(crate) type_id: TypeId,
    pub(crate) short_name: &'static str,
    pub(crate) documents: Vec<Arc<dyn ManagedDocument>>,
}

/// In-memory table of loaded documents keyed by type and id.
///
/// The map has no internal locking; callers that share it across tasks must
/// serialize access themselves.
#[derive(Default)]
pub struct IdentityMap {
    buckets: IndexMap<TypeId, Bucket>,
}

fn downcast<D: Document>(entry: &Arc<dyn ManagedDocument>) -> Option<DocumentRef<D>> {
    entry.clone().into_any().downcast::<RwLock<D>>().ok()
}

impl IdentityMap {
    /// Create an empty identity map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document.
    ///
    /// Fails with [`OdmError::Conflict`] when another instance is already
    /// bound to the same id. With `replace`, the previous instance is evicted
    /// first. Registering the same instance again is a no-op.
    pub fn register<D: Document>(&mut self, doc: &DocumentRef<D>, replace: bool) -> Result<()> {
        let id = doc.read().id().to_string();

        if replace {
            self.detach::<D>(&id);
        }

        let bucket = self
            .buckets
            .entry(TypeId::of::<D>())
            .or_insert_with(|| Bucket {
                short_name: D::short_type_name(),
                documents: IndexMap::new(),
            });

        if let Some(existing) = bucket.documents.get(&id) {
            let same = downcast::<D>(existing).is_some_and(|existing| Arc::ptr_eq(&existing, doc));
            if !same {
                return Err(OdmError::Conflict(format!(
                    "{} {} is already registered with a different instance",
                    D::short_type_name(),
                    id
                )));
            }
        }

        let entry: Arc<dyn ManagedDocument> = doc.clone();
        bucket.documents.insert(id, entry);
        Ok(())
    }

    /// Forget every document.
    pub fn detach_all(&mut self) {
        self.buckets.clear();
    }

    /// Forget every document of one type.
    pub fn detach_type<D: Document>(&mut self) {
        self.buckets.shift_remove(&TypeId::of::<D>());
    }

    /// Forget a single document. Unknown ids are ignored.
    pub fn detach<D: Document>(&mut self, id: &str) {
        if let Some(bucket) = self.buckets.get_mut(&TypeId::of::<D>()) {
            bucket.documents.shift_remove(id);
        }
    }

    /// Look up a registered document.
    pub fn retrieve<D: Document>(&self, id: &str) -> Result<DocumentRef<D>> {
        self.get::<D>(id)
            .ok_or_else(|| OdmError::not_found(D::short_type_name(), id))
    }

    /// Look up a registered document without producing an error.
    pub fn get<D: Document>(&self, id: &str) -> Option<DocumentRef<D>> {
        self.buckets
            .get(&TypeId::of::<D>())
            .and_then(|bucket| bucket.documents.get(id))
            .and_then(downcast::<D>)
    }

    /// Whether a document is registered.
    pub fn contains<D: Document>(&self, id: &str) -> bool {
        self.buckets
            .get(&TypeId::of::<D>())
            .is_some_and(|bucket| bucket.documents.contains_key(id))
    }

    /// Number of registered documents across all types.
    pub fn len(&self) -> usize {
        self.buckets.values().map(|bucket| bucket.documents.len()).sum()
    }

    /// Whether no document is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all registered documents, grouped by type.
    pub(crate) fn snapshot(&self) -> Vec<TypeSnapshot> {
        self.buckets
            .iter()
            .map(|(type_id, bucket)| TypeSnapshot {
                type_id: *type_id,
                short_name: bucket.short_name,
                documents: bucket.documents.values().cloned().collect(),
            })
            .collect()
    }
}

impl std::fmt::Debug for IdentityMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for bucket in self.buckets.values() {
            map.entry(&bucket.short_name, &bucket.documents.len());
        }
        map.finish()
    }
}
