use crate::error::{RagError, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Default chunk size in characters
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;
/// Default overlap between consecutive chunks in characters
pub const DEFAULT_CHUNK_OVERLAP: usize = 1_000;
/// Number of chunks retrieved per question
pub const DEFAULT_TOP_K: usize = 4;
/// Directory the stateless variant persists its index into
pub const DEFAULT_INDEX_DIR: &str = "vector_index";

/// Pipeline settings shared by both entry points
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RagConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub index_dir: PathBuf,
}

impl Default for RagConfig {
    fn default() -> Self {
        RagConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            top_k: DEFAULT_TOP_K,
            index_dir: PathBuf::from(DEFAULT_INDEX_DIR),
        }
    }
}

impl RagConfig {
    /// Create a new configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let defaults = RagConfig::default();

        let config = RagConfig {
            chunk_size: parse_var("RAG_CHUNK_SIZE")?.unwrap_or(defaults.chunk_size),
            chunk_overlap: parse_var("RAG_CHUNK_OVERLAP")?.unwrap_or(defaults.chunk_overlap),
            top_k: parse_var("RAG_TOP_K")?.unwrap_or(defaults.top_k),
            index_dir: env::var("RAG_INDEX_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.index_dir),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the chunker and retriever cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Configuration(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap > self.chunk_size {
            return Err(RagError::Configuration(format!(
                "chunk overlap ({}) is larger than chunk size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::Configuration(
                "top_k must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read an optional environment variable and parse it
pub(crate) fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            RagError::Configuration(format!("{} has an invalid value: {}", name, raw))
        }),
        Err(_) => Ok(None),
    }
}
