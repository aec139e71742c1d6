use thiserror::Error;

/// Errors surfaced by the question-answering pipeline.
///
/// Every variant carries a message that is safe to show to the user. None of
/// them is retried; callers either report them or propagate them upward.
#[derive(Debug, Error)]
pub enum RagError {
    /// A PDF could not be read or its text could not be extracted.
    #[error("Failed to extract text from {file}: {message}")]
    Extraction { file: String, message: String },

    /// The hosted embedding model rejected or failed a request.
    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    /// The hosted completion model rejected or failed a request.
    #[error("Generation service error: {0}")]
    GenerationService(String),

    /// Missing secret or malformed setting.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The vector index could not be built, stored or searched.
    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// No persisted index exists yet.
    #[error("No vector index found at {0}. Process some PDF files first.")]
    IndexNotFound(String),
}

pub type Result<T> = std::result::Result<T, RagError>;
