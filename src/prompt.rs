use crate::error::Result;
use crate::gemini::GeminiClient;
use crate::index::ScoredChunk;

/// Phrase the model is told to use when the context lacks the answer
pub const NOT_IN_CONTEXT: &str = "The answer is not available in the context.";

/// Fill the question-answering template
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "Answer the question as detailed as possible from the provided context. \
Make sure to provide all the details. If the answer is not in the provided context, \
just say, \"{}\" Do not provide a wrong answer.\n\nContext:\n{}\n\nQuestion:\n{}\n\nAnswer:\n",
        NOT_IN_CONTEXT, context, question
    )
}

/// Join retrieved chunks into one context block
pub fn join_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<&str>>()
        .join("\n\n")
}

/// Produces an answer from retrieved context and a question
#[allow(async_fn_in_trait)]
pub trait AnswerGenerator {
    async fn generate_answer(&self, context: &str, question: &str) -> Result<String>;
}

impl AnswerGenerator for GeminiClient {
    async fn generate_answer(&self, context: &str, question: &str) -> Result<String> {
        let prompt = build_prompt(context, question);
        self.generate_text(&prompt).await
    }
}
