use crate::chunking::TextChunk;
use crate::error::{RagError, Result};
use crate::gemini::{GeminiClient, TaskType};

pub use crate::gemini::Embedding;

/// Maps texts to fixed-dimension vectors
#[allow(async_fn_in_trait)]
pub trait Embedder {
    /// Embed texts that will be stored in the index, one vector per text
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Embed a question for retrieval
    async fn embed_query(&self, text: &str) -> Result<Embedding>;
}

impl Embedder for GeminiClient {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.batch_embed_contents(texts, TaskType::RetrievalDocument)
            .await
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        self.embed_content(text, TaskType::RetrievalQuery).await
    }
}

/// Represents an embedding with its associated chunk
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: TextChunk,
    pub embedding: Embedding,
}

/// Embed every chunk, pairing each chunk with its vector
pub async fn embed_chunks<E: Embedder>(
    embedder: &E,
    chunks: Vec<TextChunk>,
) -> Result<Vec<EmbeddedChunk>> {
    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
    let embeddings = embedder.embed_documents(&texts).await?;

    if embeddings.len() != chunks.len() {
        return Err(RagError::EmbeddingService(format!(
            "Expected {} embeddings, received {}",
            chunks.len(),
            embeddings.len()
        )));
    }

    Ok(chunks
        .into_iter()
        .zip(embeddings)
        .map(|(chunk, embedding)| EmbeddedChunk { chunk, embedding })
        .collect())
}
