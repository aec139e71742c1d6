pub mod chunking;
pub mod config;
pub mod database;
pub mod document;
pub mod embeddings;
pub mod error;
pub mod gemini;
pub mod index;
pub mod prompt;
pub mod rag;
pub mod session;

pub use error::{RagError, Result};
