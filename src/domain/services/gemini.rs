use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::configuration::GeminiSettings;
use crate::domain::entities::point::Embeddings;
use crate::domain::services::providers::{
    EmbeddingError, EmbeddingProvider, GenerationError, GenerationProvider,
};

/// Client for the Google Generative Language REST API, serving both as our
/// embedding provider (`text-embedding-004`, 768 dimensions) and our text
/// generation provider (`gemini-2.5-flash`).
/// Authentication header expected by the Generative Language API. Keeping the
/// key here rather than in the URL keeps it out of error messages.
const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiClient {
    client: Client,
    settings: GeminiSettings,
}

impl GeminiClient {
    pub fn new(settings: GeminiSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }
}

#[derive(Debug, Serialize)]
struct ContentPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
struct EmbedContentRequest {
    model: String,
    content: Content,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl EmbeddingProvider for GeminiClient {
    #[tracing::instrument(name = "Generating embedding", skip(self, text))]
    async fn embed(&self, text: &str) -> Result<Embeddings, EmbeddingError> {
        let request = EmbedContentRequest {
            model: format!("models/{}", self.settings.embedding_model),
            content: Content {
                parts: vec![ContentPart {
                    text: text.to_string(),
                }],
            },
        };

        let response = self
            .client
            .post(self.settings.embed_content_url())
            .header(API_KEY_HEADER, self.settings.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Provider(format!(
                "embedContent returned {}: {}",
                status, body
            )));
        }

        let response: EmbedContentResponse = response.json().await?;
        debug!(
            embedding_size = response.embedding.values.len(),
            "Generated embedding"
        );

        Ok(response.embedding.values)
    }
}

#[async_trait]
impl GenerationProvider for GeminiClient {
    #[tracing::instrument(name = "Generating response", skip(self, prompt))]
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![ContentPart {
                    text: prompt.to_string(),
                }],
            }],
        };

        let response = self
            .client
            .post(self.settings.generate_content_url())
            .header(API_KEY_HEADER, self.settings.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Provider(format!(
                "generateContent returned {}: {}",
                status, body
            )));
        }

        let response: GenerateContentResponse = response.json().await?;

        let text = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .ok_or_else(|| {
                GenerationError::Provider("generateContent returned no candidates".into())
            })?;

        Ok(text)
    }
}
