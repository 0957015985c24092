use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use mrag_core::config::TargetScript;
use mrag_core::error::{codes, AppError};
use mrag_core::script::ScriptConverter;
use serde::{Deserialize, Serialize};

use crate::index::{IndexManifest, SearchHit};
use crate::llm::TokenStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    Received,
    EmbeddingQuery,
    Retrieving,
    PromptAssembly,
    Generating,
    Complete,
    Failed,
}

impl QueryState {
    pub fn is_terminal(self) -> bool {
        matches!(self, QueryState::Complete | QueryState::Failed)
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryState::Received => "RECEIVED",
            QueryState::EmbeddingQuery => "EMBEDDING_QUERY",
            QueryState::Retrieving => "RETRIEVING",
            QueryState::PromptAssembly => "PROMPT_ASSEMBLY",
            QueryState::Generating => "GENERATING",
            QueryState::Complete => "COMPLETE",
            QueryState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Per-request state. Lives exactly as long as its answer stream.
#[derive(Debug, Clone)]
pub struct QuerySession {
    pub id: u64,
    pub question: String,
    pub query_vector: Vec<f32>,
    /// Manifest of the index snapshot this request searched.
    pub index: Option<IndexManifest>,
    pub hits: Vec<SearchHit>,
    pub prompt: String,
    pub answer: String,
    pub state: QueryState,
    pub partial: bool,
}

impl QuerySession {
    pub(crate) fn new(question: &str) -> Self {
        let session = Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            question: question.to_string(),
            query_vector: Vec::new(),
            index: None,
            hits: Vec::new(),
            prompt: String::new(),
            answer: String::new(),
            state: QueryState::Received,
            partial: false,
        };
        tracing::debug!(session = session.id, state = %session.state, "query received");
        session
    }

    pub(crate) fn advance(&mut self, next: QueryState) {
        tracing::debug!(session = self.id, from = %self.state, to = %next, "query state");
        self.state = next;
    }

    /// Moves to FAILED and hands back the error for the caller to return.
    pub(crate) fn fail(&mut self, err: AppError) -> AppError {
        tracing::warn!(session = self.id, at = %self.state, code = %err.code, error = %err.message, "query failed");
        self.state = QueryState::Failed;
        err
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnswerEvent {
    Fragment(String),
    Complete { partial: bool },
    Failed(AppError),
}

/// Streams answer fragments for one session, then exactly one terminal event.
///
/// Dropping the stream drops the upstream token stream, which closes the
/// connection to the generation endpoint.
pub struct AnswerStream {
    session: QuerySession,
    tokens: Option<TokenStream>,
    converter: ScriptConverter,
    /// Upstream fragments received, including text the converter still holds.
    fragments: usize,
    /// Terminal event queued behind the last flushed fragment.
    deferred: Option<AnswerEvent>,
}

impl AnswerStream {
    pub(crate) fn new(mut session: QuerySession, tokens: TokenStream, target_script: TargetScript) -> Self {
        session.advance(QueryState::Generating);
        Self {
            session,
            tokens: Some(tokens),
            converter: ScriptConverter::new(target_script),
            fragments: 0,
            deferred: None,
        }
    }

    pub fn session(&self) -> &QuerySession {
        &self.session
    }

    pub fn state(&self) -> QueryState {
        self.session.state
    }

    pub fn hits(&self) -> &[SearchHit] {
        &self.session.hits
    }

    /// Converted answer text emitted so far.
    pub fn answer(&self) -> &str {
        &self.session.answer
    }

    fn finish(&mut self, state: QueryState) {
        self.tokens = None;
        self.session.advance(state);
    }

    fn emit(&mut self, text: String) -> AnswerEvent {
        self.session.answer.push_str(&text);
        AnswerEvent::Fragment(text)
    }

    /// Emits held-back text first, if any, and queues `terminal` behind it.
    fn flush_then(&mut self, terminal: AnswerEvent) -> AnswerEvent {
        match self.converter.finish() {
            Some(text) => {
                self.deferred = Some(terminal);
                self.emit(text)
            }
            None => terminal,
        }
    }
}

impl Iterator for AnswerStream {
    type Item = AnswerEvent;

    fn next(&mut self) -> Option<AnswerEvent> {
        if let Some(event) = self.deferred.take() {
            return Some(event);
        }
        if self.session.state.is_terminal() {
            return None;
        }

        loop {
            let tokens = self.tokens.as_mut()?;
            match tokens.next() {
                Some(Ok(fragment)) => {
                    self.fragments += 1;
                    if let Some(text) = self.converter.push(&fragment) {
                        return Some(self.emit(text));
                    }
                }
                Some(Err(err)) if self.fragments > 0 => {
                    tracing::warn!(
                        session = self.session.id,
                        fragments = self.fragments,
                        error = %err,
                        "generation stopped early; answer is partial"
                    );
                    self.session.partial = true;
                    self.finish(QueryState::Complete);
                    return Some(self.flush_then(AnswerEvent::Complete { partial: true }));
                }
                Some(Err(err)) => {
                    let err = if err.is(codes::UPSTREAM_UNAVAILABLE) {
                        err
                    } else {
                        AppError::upstream_unavailable("Generation failed").with_details(err.to_string())
                    };
                    self.tokens = None;
                    let err = self.session.fail(err);
                    return Some(AnswerEvent::Failed(err));
                }
                None => {
                    self.finish(QueryState::Complete);
                    return Some(self.flush_then(AnswerEvent::Complete { partial: false }));
                }
            }
        }
    }
}

impl fmt::Debug for AnswerStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnswerStream")
            .field("session", &self.session.id)
            .field("state", &self.session.state)
            .field("fragments", &self.fragments)
            .finish()
    }
}
