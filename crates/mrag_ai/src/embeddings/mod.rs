use mrag_core::error::AppError;

/// Text → fixed-dimension vector. One instance embeds with exactly one model.
pub trait Embedder: Send + Sync {
    /// Identity recorded in the index manifest; an index only serves queries
    /// embedded by the same model.
    fn model_id(&self) -> &str;

    fn embed(&self, input: &str) -> Result<Vec<f32>, AppError>;

    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, AppError> {
        inputs.iter().map(|input| self.embed(input)).collect()
    }
}

pub mod ollama_embed;
