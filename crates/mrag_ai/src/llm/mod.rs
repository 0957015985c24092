use mrag_core::error::AppError;

/// Lazily produced answer fragments. Finite and not restartable; dropping it
/// releases the upstream connection.
pub type TokenStream = Box<dyn Iterator<Item = Result<String, AppError>> + Send>;

pub trait GenerationClient: Send + Sync {
    fn model_id(&self) -> &str;

    /// Starts generation for `prompt`. Fails with `RAG_UPSTREAM_UNAVAILABLE`
    /// when the endpoint cannot be reached or refuses the request.
    fn generate_stream(&self, prompt: &str) -> Result<TokenStream, AppError>;

    fn health_check(&self) -> Result<(), AppError>;
}

pub mod ollama_llm;
