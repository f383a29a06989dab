//! Error types for document manager operations.

use thiserror::Error;

/// Document manager error type.
#[derive(Error, Debug)]
pub enum OdmError {
    /// A different instance is already bound to the same document id, or the
    /// instance is not the one tracked by the manager.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Document could not be found locally or remotely.
    #[error("{doc_type} {id} not found")]
    NotFound {
        /// Wire type name of the document.
        doc_type: String,
        /// Document ID.
        id: String,
        /// Failure that caused the lookup to give up, if any.
        #[source]
        source: Option<Box<OdmError>>,
    },

    /// The engine did not answer within the retry budget.
    #[error("Search engine is currently unavailable (gave up after {attempts} attempts)")]
    Unavailable {
        /// Number of attempts made.
        attempts: u32,
        /// Last engine error.
        #[source]
        source: Box<OdmError>,
    },

    /// A document could not be built from its source payload.
    #[error("Failed to build {doc_type} {id}: {source}")]
    Build {
        /// Wire type name of the document.
        doc_type: String,
        /// Document ID.
        id: String,
        /// Underlying failure.
        #[source]
        source: Box<OdmError>,
    },

    /// A source payload did not have the shape a document expects.
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Error reported by the engine.
    #[error("Engine error: {0}")]
    Engine(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Client error from opensearch crate.
    #[error("Client error: {0}")]
    Client(#[from] opensearch::Error),
}

impl OdmError {
    /// Create a not found error without a cause.
    pub fn not_found(doc_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            doc_type: doc_type.into(),
            id: id.into(),
            source: None,
        }
    }

    /// Returns true for [`OdmError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true for [`OdmError::Conflict`].
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns true for [`OdmError::Unavailable`].
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Result type alias for document manager operations.
pub type Result<T> = std::result::Result<T, OdmError>;
