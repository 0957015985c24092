//! Query orchestration.
//!
//! `RECEIVED → EMBEDDING_QUERY → RETRIEVING → PROMPT_ASSEMBLY → GENERATING → COMPLETE | FAILED`
//!
//! Everything up to opening the generation stream happens inside
//! [`Orchestrator::answer`]; failures there are returned as errors. Once
//! generating, the [`AnswerStream`] reports the outcome as its final event.

use std::sync::Arc;

use mrag_core::config::{RagConfig, TargetScript};
use mrag_core::error::{codes, AppError};

use crate::embeddings::Embedder;
use crate::index::VectorIndex;
use crate::llm::GenerationClient;

pub mod prompts;
pub mod session;

pub use prompts::{build_answer_prompt, PromptSettings};
pub use session::{AnswerEvent, AnswerStream, QuerySession, QueryState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySettings {
    pub top_k: usize,
    pub target_script: TargetScript,
    pub prompt: PromptSettings,
}

impl QuerySettings {
    pub fn from_config(config: &RagConfig) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            target_script: config.output.target_script,
            prompt: PromptSettings {
                product_name: config.output.product_name.clone(),
                answer_language: config.output.answer_language.clone(),
                max_context_chars: config.retrieval.max_context_chars,
            },
        }
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn GenerationClient>,
    settings: QuerySettings,
}

impl Orchestrator {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn GenerationClient>,
        settings: QuerySettings,
    ) -> Self {
        Self {
            embedder,
            generator,
            settings,
        }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn generator(&self) -> &Arc<dyn GenerationClient> {
        &self.generator
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// Answers one question against `index`, the snapshot taken when the
    /// request arrived. A later index swap does not affect this request.
    pub fn answer(
        &self,
        index: Option<Arc<dyn VectorIndex>>,
        question: &str,
    ) -> Result<AnswerStream, AppError> {
        let mut session = QuerySession::new(question);

        let question = question.trim();
        if question.is_empty() {
            return Err(session.fail(AppError::invalid_query("Question must not be empty")));
        }

        session.advance(QueryState::EmbeddingQuery);
        session.query_vector = match self.embedder.embed(question) {
            Ok(v) => v,
            Err(e) => {
                return Err(session.fail(
                    AppError::upstream_unavailable("Failed to embed the question")
                        .with_details(e.to_string()),
                ))
            }
        };

        session.advance(QueryState::Retrieving);
        let Some(index) = index else {
            return Err(session.fail(AppError::index_not_ready(
                "No validated index has been published",
            )));
        };
        let manifest = index.manifest();
        if manifest.embedding_model != self.embedder.model_id() {
            return Err(session.fail(
                AppError::new(
                    codes::MODEL_MISMATCH,
                    "Index was built with a different embedding model",
                )
                .with_details(format!(
                    "index_model={}; query_model={}",
                    manifest.embedding_model,
                    self.embedder.model_id()
                )),
            ));
        }
        if session.query_vector.len() != manifest.dims {
            return Err(session.fail(
                AppError::new(
                    codes::MODEL_MISMATCH,
                    "Question embedding dimension does not match the index",
                )
                .with_details(format!(
                    "index_dims={}; query_dims={}",
                    manifest.dims,
                    session.query_vector.len()
                )),
            ));
        }
        session.index = Some(manifest.clone());
        session.hits = index.search(&session.query_vector, self.settings.top_k);

        session.advance(QueryState::PromptAssembly);
        session.prompt = build_answer_prompt(question, &session.hits, &self.settings.prompt);

        let tokens = match self.generator.generate_stream(&session.prompt) {
            Ok(tokens) => tokens,
            Err(e) => {
                let e = if e.is(codes::UPSTREAM_UNAVAILABLE) {
                    e
                } else {
                    AppError::upstream_unavailable("Generation failed to start")
                        .with_details(e.to_string())
                };
                return Err(session.fail(e));
            }
        };
        Ok(AnswerStream::new(session, tokens, self.settings.target_script))
    }
}
