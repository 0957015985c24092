use std::io::{BufRead, BufReader, Read};

use mrag_core::error::AppError;
use serde::{Deserialize, Serialize};

use super::{GenerationClient, TokenStream};
use crate::ollama::OllamaClient;

#[derive(Debug, Clone)]
pub struct OllamaLlm {
    client: OllamaClient,
    model: String,
    context_length: u32,
}

impl OllamaLlm {
    pub fn new(client: OllamaClient, model: impl Into<String>, context_length: u32) -> Self {
        Self {
            client,
            model: model.into(),
            context_length,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct GenerateOptions {
    num_ctx: u32,
}

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

/// One NDJSON line of a streamed `/api/generate` response.
#[derive(Debug, Clone, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

impl GenerationClient for OllamaLlm {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn generate_stream(&self, prompt: &str) -> Result<TokenStream, AppError> {
        let req = GenerateRequest {
            model: &self.model,
            prompt,
            stream: true,
            options: GenerateOptions {
                num_ctx: self.context_length,
            },
        };

        let resp = self
            .client
            .agent()
            .post(&self.client.url("/api/generate"))
            .send_json(req);

        match resp {
            Ok(r) if r.status() == 200 => Ok(Box::new(NdjsonTokens::new(r.into_reader()))),
            Ok(r) => Err(AppError::upstream_unavailable("Generation request failed")
                .with_details(format!("model={}; status={}", self.model, r.status()))),
            Err(ureq::Error::Status(status, r)) => {
                let body = r.into_string().unwrap_or_default();
                Err(AppError::upstream_unavailable("Generation request failed")
                    .with_details(format!("model={}; status={status}; body={}", self.model, body.trim())))
            }
            Err(e) => Err(AppError::upstream_unavailable("Failed to call generation endpoint")
                .with_details(e.to_string())),
        }
    }

    fn health_check(&self) -> Result<(), AppError> {
        self.client.health_check()
    }
}

/// Reads `{"response": "...", "done": bool}` lines until `done`.
/// End of input before `done` is reported as an upstream failure.
pub(crate) struct NdjsonTokens<R> {
    lines: std::io::Lines<BufReader<R>>,
    finished: bool,
}

impl<R: Read> NdjsonTokens<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            finished: false,
        }
    }

    fn fail(&mut self, err: AppError) -> Option<Result<String, AppError>> {
        self.finished = true;
        Some(Err(err))
    }
}

impl<R: Read> Iterator for NdjsonTokens<R> {
    type Item = Result<String, AppError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    return self.fail(
                        AppError::upstream_unavailable("Generation stream interrupted")
                            .with_details(e.to_string()),
                    )
                }
                None => {
                    return self.fail(AppError::upstream_unavailable(
                        "Generation stream ended before completion",
                    ))
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let chunk: GenerateChunk = match serde_json::from_str(&line) {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping undecodable generation line");
                    continue;
                }
            };
            if let Some(error) = chunk.error {
                return self.fail(
                    AppError::upstream_unavailable("Generation failed upstream").with_details(error),
                );
            }
            if chunk.done {
                self.finished = true;
            }
            if !chunk.response.is_empty() {
                return Some(Ok(chunk.response));
            }
        }
        None
    }
}
