use crate::chunking::{TextChunk, TextSplitter};
use crate::config::RagConfig;
use crate::database::IndexStore;
use crate::embeddings::{embed_chunks, Embedder};
use crate::error::Result;
use crate::index::{ScoredChunk, VectorIndex};
use crate::prompt::{join_context, AnswerGenerator};
use log::{debug, info};

/// RAG (Retrieval-Augmented Generation) engine
///
/// Owns the splitter and the two hosted collaborators. Every method runs to
/// completion before the next user action is handled.
pub struct RagEngine<E, G> {
    embedder: E,
    generator: G,
    splitter: TextSplitter,
    top_k: usize,
}

impl<E: Embedder, G: AnswerGenerator> RagEngine<E, G> {
    /// Create a new RAG engine
    pub fn new(embedder: E, generator: G, config: &RagConfig) -> Result<Self> {
        config.validate()?;
        Ok(RagEngine {
            embedder,
            generator,
            splitter: TextSplitter::from_config(config)?,
            top_k: config.top_k,
        })
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Split extracted text into chunks
    pub fn chunk_text(&self, text: &str) -> Vec<TextChunk> {
        let chunks = self.splitter.split_into_chunks(text);
        info!("Split into {} chunks", chunks.len());
        chunks
    }

    /// Embed chunks and build an index from them
    pub async fn build_index(&self, chunks: Vec<TextChunk>) -> Result<VectorIndex> {
        info!("Generating embeddings for {} chunks...", chunks.len());
        let embedded = embed_chunks(&self.embedder, chunks).await?;
        let index = VectorIndex::build(embedded)?;
        info!(
            "Built index with {} chunks of dimension {}",
            index.len(),
            index.dimension()
        );
        Ok(index)
    }

    /// Chunk, embed and index text in one step
    pub async fn index_text(&self, text: &str) -> Result<VectorIndex> {
        let chunks = self.chunk_text(text);
        self.build_index(chunks).await
    }

    /// Retrieve the chunks closest to the question from an in-memory index
    pub async fn search_index(
        &self,
        index: &VectorIndex,
        question: &str,
    ) -> Result<Vec<ScoredChunk>> {
        let query = self.embedder.embed_query(question).await?;
        let chunks = index.search(&query, self.top_k)?;
        debug!("Retrieved {} chunks", chunks.len());
        Ok(chunks)
    }

    /// Retrieve the chunks closest to the question from a persisted index
    pub async fn search_store<S: IndexStore>(
        &self,
        store: &S,
        question: &str,
    ) -> Result<Vec<ScoredChunk>> {
        let query = self.embedder.embed_query(question).await?;
        let chunks = store.search(&query, self.top_k).await?;
        debug!("Retrieved {} chunks from {}", chunks.len(), store.location());
        Ok(chunks)
    }

    /// Generate an answer from retrieved chunks
    pub async fn answer(&self, chunks: &[ScoredChunk], question: &str) -> Result<String> {
        let context = join_context(chunks);
        self.generator.generate_answer(&context, question).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Deterministic stand-ins for the hosted models.

    use crate::embeddings::{Embedder, Embedding};
    use crate::error::{RagError, Result};
    use crate::prompt::AnswerGenerator;
    use crate::rag::RagEngine;
    use std::cell::{Cell, RefCell};

    /// Embeds text as counts of a few keywords, so similar texts share vectors
    #[derive(Default)]
    pub struct KeywordEmbedder {
        pub document_calls: Cell<usize>,
        pub query_calls: Cell<usize>,
        pub fail: Cell<bool>,
    }

    const KEYWORDS: [&str; 4] = ["rust", "python", "memory", "garbage"];

    fn keyword_vector(text: &str) -> Embedding {
        let lower = text.to_lowercase();
        let mut values: Vec<f32> = KEYWORDS
            .iter()
            .map(|k| lower.matches(k).count() as f32)
            .collect();
        // Bias term keeps every vector non-zero
        values.push(0.01);
        Embedding { values }
    }

    impl Embedder for KeywordEmbedder {
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>> {
            self.document_calls.set(self.document_calls.get() + 1);
            if self.fail.get() {
                return Err(RagError::EmbeddingService("quota exceeded".to_string()));
            }
            Ok(texts.iter().map(|t| keyword_vector(t)).collect())
        }

        async fn embed_query(&self, text: &str) -> Result<Embedding> {
            self.query_calls.set(self.query_calls.get() + 1);
            if self.fail.get() {
                return Err(RagError::EmbeddingService("quota exceeded".to_string()));
            }
            Ok(keyword_vector(text))
        }
    }

    impl RagEngine<KeywordEmbedder, EchoGenerator> {
        pub fn embedder_document_calls(&self) -> usize {
            self.embedder.document_calls.get()
        }

        pub fn embedder_query_calls(&self) -> usize {
            self.embedder.query_calls.get()
        }

        pub fn embedder_fail(&self, fail: bool) {
            self.embedder.fail.set(fail);
        }

        pub fn generator_calls(&self) -> usize {
            self.generator.calls.borrow().len()
        }
    }

    /// Echoes the context it was given and records every call
    #[derive(Default)]
    pub struct EchoGenerator {
        pub calls: RefCell<Vec<(String, String)>>,
    }

    impl AnswerGenerator for EchoGenerator {
        async fn generate_answer(&self, context: &str, question: &str) -> Result<String> {
            self.calls
                .borrow_mut()
                .push((context.to_string(), question.to_string()));
            Ok(format!("answer from: {}", context))
        }
    }
}
