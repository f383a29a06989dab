//! Document trait and helpers.

use crate::error::{OdmError, Result};
use parking_lot::RwLock;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Stored field map of a document.
pub type Source = Map<String, Value>;

/// Shared handle to a managed document.
///
/// The identity map tracks instances by pointer identity, so two handles refer
/// to the same document only if they were cloned from each other.
pub type DocumentRef<D> = Arc<RwLock<D>>;

/// Wrap a document in a shared handle.
pub fn shared<D: Document>(doc: D) -> DocumentRef<D> {
    Arc::new(RwLock::new(doc))
}

/// Trait for documents managed by a [`DocumentManager`](crate::DocumentManager).
///
/// # Example
///
/// ```rust
/// use armature_odm::{Document, Result, Source, document};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, Serialize, Deserialize)]
/// struct Article {
///     #[serde(skip)]
///     id: String,
///     title: String,
/// }
///
/// impl Document for Article {
///     fn blank() -> Self {
///         Self::default()
///     }
///
///     fn id(&self) -> &str {
///         &self.id
///     }
///
///     fn rebuild(&mut self, id: &str, source: Source) -> Result<()> {
///         *self = document::from_source(source)?;
///         self.id = id.to_string();
///         Ok(())
///     }
///
///     fn to_storable(&self) -> Result<Source> {
///         document::to_source(self)
///     }
/// }
/// ```
pub trait Document: Send + Sync + 'static {
    /// Create an uninitialized instance for the rebuild path.
    ///
    /// Only the manager calls this, immediately followed by [`Document::rebuild`],
    /// which must establish all state from the source payload.
    fn blank() -> Self
    where
        Self: Sized;

    /// Document identity within its type.
    fn id(&self) -> &str;

    /// Rebuild the document in place from a stored source payload.
    fn rebuild(&mut self, id: &str, source: Source) -> Result<()>;

    /// Serialize the document to its stored field map.
    fn to_storable(&self) -> Result<Source>;

    /// Unqualified type name used to derive the default wire type name.
    fn short_type_name() -> &'static str
    where
        Self: Sized,
    {
        short_name(std::any::type_name::<Self>())
    }
}

/// Strip module path and generic arguments from a fully qualified type name.
pub(crate) fn short_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Serialize a value into a source map.
///
/// Fails with [`OdmError::InvalidSource`] when the value does not serialize to
/// a JSON object.
pub fn to_source<T: Serialize>(value: &T) -> Result<Source> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(OdmError::InvalidSource(format!(
            "expected an object, got {}",
            json_kind(&other)
        ))),
    }
}

/// Deserialize a value from a source map.
pub fn from_source<T: DeserializeOwned>(source: Source) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(source))?)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Store nested objects as opaque strings in `keyword` fields.
///
/// Useful for values that should round-trip through the engine untouched
/// without being analyzed or mapped field by field.
pub mod keyword {
    use crate::error::Result;
    use serde::{Serialize, de::DeserializeOwned};

    /// Encode an object as a keyword string.
    pub fn encode<T: Serialize>(object: &T) -> Result<String> {
        Ok(serde_json::to_string(object)?)
    }

    /// Decode an object from a keyword string.
    pub fn decode<T: DeserializeOwned>(encoded: &str) -> Result<T> {
        Ok(serde_json::from_str(encoded)?)
    }

    /// Encode a collection of objects as a single keyword string.
    pub fn encode_collection<T: Serialize>(objects: &[T]) -> Result<String> {
        Ok(serde_json::to_string(objects)?)
    }

    /// Decode a collection of objects from a keyword string.
    pub fn decode_collection<T: DeserializeOwned>(encoded: &str) -> Result<Vec<T>> {
        Ok(serde_json::from_str(encoded)?)
    }
}
