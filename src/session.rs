//! Request handlers for the two front ends.
//!
//! [`StatelessQuery`] answers every question on its own against the index
//! persisted by the last `process` run. [`ChatSession`] keeps the index and
//! the turn log in memory for the lifetime of one interactive session. Each
//! handler method corresponds to exactly one user action.

use crate::database::IndexStore;
use crate::document::{extract_text, PageFilter, PdfUpload};
use crate::embeddings::Embedder;
use crate::error::Result;
use crate::index::VectorIndex;
use crate::prompt::AnswerGenerator;
use crate::rag::RagEngine;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const NO_FILES_WARNING: &str = "Please upload at least one PDF file.";
pub const NO_TEXT_WARNING: &str =
    "Could not extract any text from the PDF(s). Please check the documents.";
pub const PROCESSING_COMPLETE: &str = "Processing complete! You can now ask questions.";
pub const NO_INDEX_WARNING: &str =
    "Please upload and process your PDF documents first using :process <file.pdf>.";
pub const NO_RELEVANT_INFO: &str =
    "I couldn't find any relevant information in the documents to answer your question.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message in the chat history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Turn {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Turn {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-session state: the current index and the ordered turn log
#[derive(Debug, Default)]
pub struct SessionContext {
    pub index: Option<VectorIndex>,
    pub history: Vec<Turn>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoIndex,
    IndexReady,
}

/// Result of a processing request that did not fail outright
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// A new index replaced the old one
    Ready { chunks: usize },
    /// Nothing was uploaded; the session is unchanged
    NoFiles,
    /// The uploads held no text; the session is unchanged
    NoText,
}

impl ProcessOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            ProcessOutcome::Ready { .. } => PROCESSING_COMPLETE,
            ProcessOutcome::NoFiles => NO_FILES_WARNING,
            ProcessOutcome::NoText => NO_TEXT_WARNING,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Answer,
    Warning,
    Error,
}

/// What the assistant said in response to one question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub kind: ReplyKind,
    pub content: String,
}

/// Interactive session holding the index and history in memory
pub struct ChatSession<E, G> {
    engine: RagEngine<E, G>,
    context: SessionContext,
}

impl<E: Embedder, G: AnswerGenerator> ChatSession<E, G> {
    pub fn new(engine: RagEngine<E, G>) -> Self {
        ChatSession {
            engine,
            context: SessionContext::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        match self.context.index {
            Some(_) => SessionState::IndexReady,
            None => SessionState::NoIndex,
        }
    }

    pub fn history(&self) -> &[Turn] {
        &self.context.history
    }

    pub fn index(&self) -> Option<&VectorIndex> {
        self.context.index.as_ref()
    }

    /// Extract, chunk and index uploads, replacing the current index on success
    pub async fn process(&mut self, uploads: &[PdfUpload]) -> Result<ProcessOutcome> {
        if uploads.is_empty() {
            warn!("{}", NO_FILES_WARNING);
            return Ok(ProcessOutcome::NoFiles);
        }

        let text = extract_text(uploads, PageFilter::SkipEmpty)?;
        self.process_text(&text).await
    }

    /// Index already extracted text
    pub async fn process_text(&mut self, text: &str) -> Result<ProcessOutcome> {
        let chunks = self.engine.chunk_text(text);
        if chunks.is_empty() {
            warn!("{}", NO_TEXT_WARNING);
            return Ok(ProcessOutcome::NoText);
        }

        let index = self.engine.build_index(chunks).await.map_err(|e| {
            error!("Error creating vector store: {}", e);
            e
        })?;

        // Swap in the finished index and start a fresh conversation
        let chunk_count = index.len();
        self.context.index = Some(index);
        self.context.history.clear();
        info!("Session index ready with {} chunks", chunk_count);

        Ok(ProcessOutcome::Ready {
            chunks: chunk_count,
        })
    }

    /// Answer a question, recording both sides of the exchange
    pub async fn ask(&mut self, question: &str) -> Reply {
        self.context.history.push(Turn::user(question));

        let reply = match &self.context.index {
            None => Reply {
                kind: ReplyKind::Warning,
                content: NO_INDEX_WARNING.to_string(),
            },
            Some(index) => match self.answer(index, question).await {
                Ok(content) => Reply {
                    kind: ReplyKind::Answer,
                    content,
                },
                Err(e) => {
                    error!("Query failed: {}", e);
                    Reply {
                        kind: ReplyKind::Error,
                        content: format!("An error occurred: {}", e),
                    }
                }
            },
        };

        self.context
            .history
            .push(Turn::assistant(reply.content.clone()));
        reply
    }

    async fn answer(&self, index: &VectorIndex, question: &str) -> Result<String> {
        let chunks = self.engine.search_index(index, question).await?;
        if chunks.is_empty() {
            return Ok(NO_RELEVANT_INFO.to_string());
        }
        self.engine.answer(&chunks, question).await
    }
}

/// One-shot handler: every question reloads the persisted index
pub struct StatelessQuery<E, G, S> {
    engine: RagEngine<E, G>,
    store: S,
}

impl<E: Embedder, G: AnswerGenerator, S: IndexStore> StatelessQuery<E, G, S> {
    pub fn new(engine: RagEngine<E, G>, store: S) -> Self {
        StatelessQuery { engine, store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Build an index from the uploads and persist it, returning the chunk count
    pub async fn process(&self, uploads: &[PdfUpload]) -> Result<usize> {
        let text = extract_text(uploads, PageFilter::KeepAll)?;
        self.process_text(&text).await
    }

    pub async fn process_text(&self, text: &str) -> Result<usize> {
        let index = self.engine.index_text(text).await?;
        self.store.replace(&index).await?;
        Ok(index.len())
    }

    /// Answer a question against the persisted index
    pub async fn ask(&self, question: &str) -> Result<String> {
        let chunks = self.engine.search_store(&self.store, question).await?;
        self.engine.answer(&chunks, question).await
    }
}
