pub mod embeddings;
pub mod index;
pub mod llm;
pub mod ollama;
pub mod pipeline;
pub mod rag;
pub mod service;
pub mod similarity;
pub mod validate;
