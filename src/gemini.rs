use crate::config::parse_var;
use crate::error::{RagError, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::env;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_EMBEDDING_MODEL: &str = "models/embedding-001";
pub const DEFAULT_CHAT_MODEL: &str = "models/gemini-pro";
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// The API caps `batchEmbedContents` at 100 requests per call
const MAX_EMBED_BATCH: usize = 100;

/// Configuration for Gemini API
#[derive(Clone, Debug)]
pub struct GeminiConfig {
    /// Absent keys are only reported when a request is made
    pub api_key: Option<String>,
    pub base_url: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub temperature: f32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        GeminiConfig {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl GeminiConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = GeminiConfig::default();
        let api_key = env::var("GOOGLE_API_KEY")
            .or_else(|_| env::var("GEMINI_API_KEY"))
            .ok()
            .filter(|key| !key.trim().is_empty());

        Ok(GeminiConfig {
            api_key,
            base_url: env::var("GEMINI_BASE_URL").unwrap_or(defaults.base_url),
            embedding_model: env::var("GEMINI_EMBEDDING_MODEL")
                .map(|m| model_path(&m))
                .unwrap_or(defaults.embedding_model),
            chat_model: env::var("GEMINI_CHAT_MODEL")
                .map(|m| model_path(&m))
                .unwrap_or(defaults.chat_model),
            temperature: parse_var("GEMINI_TEMPERATURE")?.unwrap_or(defaults.temperature),
        })
    }

    /// Return the API key or a configuration error naming the variable to set
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            RagError::Configuration(
                "Google API key not found. Set GOOGLE_API_KEY in the environment or .env file."
                    .to_string(),
            )
        })
    }
}

/// Accept both "embedding-001" and "models/embedding-001"
fn model_path(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

/// Client for interacting with Gemini API
#[derive(Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(config: GeminiConfig) -> Self {
        let client = reqwest::Client::new();
        GeminiClient { config, client }
    }

    /// Get the client configuration
    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!(
            "{}/{}:{}",
            self.config.base_url.trim_end_matches('/'),
            model,
            method
        )
    }

    /// Embed a single text
    pub async fn embed_content(&self, text: &str, task_type: TaskType) -> Result<Embedding> {
        let api_key = self.config.require_api_key()?;
        let request = EmbedContentRequest {
            model: &self.config.embedding_model,
            content: Content::new(text),
            task_type,
        };

        let url = self.endpoint(&self.config.embedding_model, "embedContent");
        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::EmbeddingService(e.to_string()))?;

        let response = check_status(response).await.map_err(RagError::EmbeddingService)?;
        let response_data: EmbedContentResponse = response
            .json()
            .await
            .map_err(|e| RagError::EmbeddingService(format!("Invalid response: {}", e)))?;

        Ok(Embedding {
            values: response_data.embedding.values,
        })
    }

    /// Embed many texts, one `batchEmbedContents` call per 100 texts
    pub async fn batch_embed_contents(
        &self,
        texts: &[String],
        task_type: TaskType,
    ) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let api_key = self.config.require_api_key()?;
        let url = self.endpoint(&self.config.embedding_model, "batchEmbedContents");

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_EMBED_BATCH) {
            debug!("Embedding batch of {} texts", batch.len());
            let request = BatchEmbedRequest {
                requests: batch
                    .iter()
                    .map(|text| EmbedContentRequest {
                        model: &self.config.embedding_model,
                        content: Content::new(text),
                        task_type,
                    })
                    .collect(),
            };

            let response = self
                .client
                .post(&url)
                .query(&[("key", api_key)])
                .json(&request)
                .send()
                .await
                .map_err(|e| RagError::EmbeddingService(e.to_string()))?;

            let response = check_status(response).await.map_err(RagError::EmbeddingService)?;
            let response_data: BatchEmbedResponse = response
                .json()
                .await
                .map_err(|e| RagError::EmbeddingService(format!("Invalid response: {}", e)))?;

            if response_data.embeddings.len() != batch.len() {
                return Err(RagError::EmbeddingService(format!(
                    "Expected {} embeddings, received {}",
                    batch.len(),
                    response_data.embeddings.len()
                )));
            }

            embeddings.extend(
                response_data
                    .embeddings
                    .into_iter()
                    .map(|e| Embedding { values: e.values }),
            );
        }

        Ok(embeddings)
    }

    /// Generate text using the configured chat model
    pub async fn generate_text(&self, prompt: &str) -> Result<String> {
        let api_key = self.config.require_api_key()?;
        let request = GenerateRequest {
            contents: vec![Content::new_with_role(prompt, "user")],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
            },
        };

        let url = self.endpoint(&self.config.chat_model, "generateContent");
        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::GenerationService(e.to_string()))?;

        let response = check_status(response)
            .await
            .map_err(RagError::GenerationService)?;
        let response_data: GenerateResponse = response
            .json()
            .await
            .map_err(|e| RagError::GenerationService(format!("Invalid response: {}", e)))?;

        // Extract the generated text from the first candidate
        let text = response_data
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .filter(|text| !text.is_empty());

        match text {
            Some(text) => Ok(text),
            None => {
                let reason = response_data
                    .prompt_feedback
                    .and_then(|f| f.block_reason)
                    .map(|r| format!(" (blocked: {})", r))
                    .unwrap_or_default();
                Err(RagError::GenerationService(format!(
                    "No response generated{}",
                    reason
                )))
            }
        }
    }
}

/// Turn a non-success response into its status and body text
async fn check_status(
    response: reqwest::Response,
) -> std::result::Result<reqwest::Response, String> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    error!("Gemini API request failed: {}", status);
    Err(format!("API request failed: {} {}", status, error_text))
}

/// Representation of a vector embedding
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

/// Tells the embedding model which side of retrieval a text is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

// Shared request/response structures for the Gemini API

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: TaskType,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Deserialize, Debug)]
struct EmbedContentResponse {
    embedding: EmbeddingData,
}

#[derive(Deserialize, Debug)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingData>,
}

#[derive(Deserialize, Debug)]
struct EmbeddingData {
    values: Vec<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
}

impl<'a> Content<'a> {
    fn new(text: &'a str) -> Self {
        Content {
            parts: vec![Part { text }],
            role: None,
        }
    }

    fn new_with_role(text: &'a str, role: &'static str) -> Self {
        Content {
            parts: vec![Part { text }],
            role: Some(role),
        }
    }
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize, Debug)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}
