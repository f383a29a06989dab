//! Per-type metadata: wire type names, mappings, settings and ingest pipelines.

use crate::document::Document;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::any::TypeId;
use std::collections::HashMap;
use tracing::warn;

/// Ingest pipeline definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Human readable description.
    pub description: String,
    /// Processor definitions, applied in order.
    pub processors: Vec<Value>,
}

impl Pipeline {
    /// Create a pipeline with no processors.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            processors: Vec::new(),
        }
    }

    /// Append a processor.
    pub fn processor(mut self, processor: Value) -> Self {
        self.processors.push(processor);
        self
    }

    /// Request body for putting this pipeline.
    pub fn to_json(&self) -> Value {
        json!({
            "description": self.description,
            "processors": self.processors,
        })
    }
}

/// Registered metadata for one document type.
#[derive(Debug, Clone)]
pub(crate) struct TypeMeta {
    pub(crate) short_name: &'static str,
    pub(crate) settings: Option<Value>,
    pub(crate) pipeline: Option<Pipeline>,
}

impl TypeMeta {
    fn new(short_name: &'static str) -> Self {
        Self {
            short_name,
            settings: None,
            pipeline: None,
        }
    }
}

/// Resolved names and metadata of a mapped type, as used by index lifecycle.
#[derive(Debug, Clone)]
pub(crate) struct MappedType {
    pub(crate) wire_name: String,
    pub(crate) index: String,
    pub(crate) mapping: Value,
    pub(crate) settings: Option<Value>,
    pub(crate) pipeline: Option<Pipeline>,
}

/// Type registry keyed by document type.
///
/// Wire type names default to the lower-first short type name and are
/// memoized on first resolution. Once resolved, a name never changes for the
/// lifetime of the registry, even if [`TypeRegistry::register_type`] is called
/// again afterwards.
#[derive(Debug)]
pub struct TypeRegistry {
    base_index: String,
    types: IndexMap<TypeId, TypeMeta>,
    mappings: IndexMap<TypeId, Value>,
    explicit_names: HashMap<TypeId, String>,
    resolved_names: RwLock<HashMap<TypeId, String>>,
}

impl TypeRegistry {
    /// Create a registry for the given base index name.
    pub fn new(base_index: impl Into<String>) -> Self {
        Self {
            base_index: base_index.into(),
            types: IndexMap::new(),
            mappings: IndexMap::new(),
            explicit_names: HashMap::new(),
            resolved_names: RwLock::new(HashMap::new()),
        }
    }

    /// Base index shared by all types.
    pub fn base_index(&self) -> &str {
        &self.base_index
    }

    fn meta_mut<D: Document>(&mut self) -> &mut TypeMeta {
        self.types
            .entry(TypeId::of::<D>())
            .or_insert_with(|| TypeMeta::new(D::short_type_name()))
    }

    fn meta<D: Document>(&self) -> Option<&TypeMeta> {
        self.types.get(&TypeId::of::<D>())
    }

    /// Override the wire type name of a document type.
    pub fn register_type<D: Document>(&mut self, wire_type_name: impl Into<String>) {
        let wire_type_name = wire_type_name.into();
        let type_id = TypeId::of::<D>();

        if let Some(resolved) = self.resolved_names.read().get(&type_id)
            && *resolved != wire_type_name
        {
            warn!(
                document = D::short_type_name(),
                resolved = %resolved,
                requested = %wire_type_name,
                "Wire type name already resolved; keeping the existing name"
            );
        }

        self.meta_mut::<D>();
        self.explicit_names.insert(type_id, wire_type_name);
    }

    /// Register the mapping passed to the engine at index creation.
    ///
    /// Index lifecycle walks types in the order their mapping was first
    /// registered.
    pub fn register_mapping<D: Document>(&mut self, mapping: Value) {
        self.meta_mut::<D>();
        self.mappings.insert(TypeId::of::<D>(), mapping);
    }

    /// Register index settings passed to the engine at index creation.
    pub fn register_settings<D: Document>(&mut self, settings: Value) {
        self.meta_mut::<D>().settings = Some(settings);
    }

    /// Register an ingest pipeline applied to every write of this type.
    pub fn register_pipeline<D: Document>(&mut self, pipeline: Pipeline) {
        self.meta_mut::<D>().pipeline = Some(pipeline);
    }

    /// Wire type name of a document type.
    pub fn wire_type_name<D: Document>(&self) -> String {
        self.resolve(TypeId::of::<D>(), D::short_type_name())
    }

    /// Full index name of a document type.
    pub fn index_name<D: Document>(&self) -> String {
        self.index_for(&self.wire_type_name::<D>())
    }

    /// Registered pipeline of a document type, if any.
    pub fn pipeline<D: Document>(&self) -> Option<&Pipeline> {
        self.meta::<D>().and_then(|meta| meta.pipeline.as_ref())
    }

    fn index_for(&self, wire_name: &str) -> String {
        format!("{}__{}", self.base_index, wire_name.to_lowercase())
    }

    fn resolve(&self, type_id: TypeId, short_name: &'static str) -> String {
        if let Some(name) = self.resolved_names.read().get(&type_id) {
            return name.clone();
        }

        let name = self
            .explicit_names
            .get(&type_id)
            .cloned()
            .unwrap_or_else(|| lower_first(short_name));

        self.resolved_names
            .write()
            .entry(type_id)
            .or_insert(name)
            .clone()
    }

    /// Wire type name and index name of a type known only by its id.
    pub(crate) fn names_of(&self, type_id: TypeId, short_name: &'static str) -> (String, String) {
        let wire_name = self.resolve(type_id, short_name);
        let index = self.index_for(&wire_name);
        (wire_name, index)
    }

    /// Whether a pipeline is registered for a type known only by its id.
    pub(crate) fn has_pipeline(&self, type_id: TypeId) -> bool {
        self.types
            .get(&type_id)
            .is_some_and(|meta| meta.pipeline.is_some())
    }

    /// Types with a registered mapping, in mapping registration order, optionally
    /// restricted to one type.
    pub(crate) fn mapped_types(&self, only: Option<TypeId>) -> Vec<MappedType> {
        self.mappings
            .iter()
            .filter(|(type_id, _)| only.is_none_or(|only| only == **type_id))
            .filter_map(|(type_id, mapping)| {
                let meta = self.types.get(type_id)?;
                let wire_name = self.resolve(*type_id, meta.short_name);
                Some(MappedType {
                    index: self.index_for(&wire_name),
                    wire_name,
                    mapping: mapping.clone(),
                    settings: meta.settings.clone(),
                    pipeline: meta.pipeline.clone(),
                })
            })
            .collect()
    }
}

/// Lower-case the first character, leaving the rest untouched.
pub(crate) fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
