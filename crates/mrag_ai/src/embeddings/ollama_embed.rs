use mrag_core::error::AppError;
use serde::{Deserialize, Serialize};

use super::Embedder;
use crate::ollama::OllamaClient;

/// Inputs longer than this many characters are truncated before embedding.
pub const MAX_EMBED_INPUT_CHARS: usize = 8_000;

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: OllamaClient,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

fn truncate_chars(input: &str, max_chars: usize) -> &str {
    match input.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &input[..byte_idx],
        None => input,
    }
}

impl Embedder for OllamaEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn embed(&self, input: &str) -> Result<Vec<f32>, AppError> {
        let prompt = truncate_chars(input, MAX_EMBED_INPUT_CHARS);
        let req = EmbeddingsRequest {
            model: &self.model,
            prompt,
        };

        let resp = self
            .client
            .agent()
            .post(&self.client.url("/api/embeddings"))
            .send_json(req);

        match resp {
            Ok(r) if r.status() == 200 => {
                let v: EmbeddingsResponse = r.into_json().map_err(|e| {
                    AppError::embedding_unavailable("Failed to decode embeddings response")
                        .with_details(e.to_string())
                        .with_retryable(false)
                })?;
                if v.embedding.is_empty() {
                    return Err(AppError::embedding_unavailable("Embeddings response was empty")
                        .with_details(format!("model={}", self.model))
                        .with_retryable(false));
                }
                Ok(v.embedding)
            }
            Ok(r) => Err(AppError::embedding_unavailable("Embeddings request failed")
                .with_details(format!("model={}; status={}", self.model, r.status()))),
            Err(ureq::Error::Status(status, _)) => {
                Err(AppError::embedding_unavailable("Embedding model could not be loaded")
                    .with_details(format!("model={}; status={status}", self.model)))
            }
            Err(e) => Err(AppError::embedding_unavailable("Failed to call embeddings endpoint")
                .with_details(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("鏡像修改器", 2), "鏡像");
        assert_eq!(truncate_chars("mirror", 10), "mirror");
        assert_eq!(truncate_chars("", 3), "");
    }
}
