//! Vector index over embedded chunks.

use mrag_core::domain::{CharSpan, Chunk};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub mod flat;
pub mod store;

pub use flat::FlatIndex;
pub use store::IndexLayout;

pub const INDEX_FORMAT_VERSION: u32 = 1;

/// Everything the query path needs to know about a stored chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMeta {
    pub chunk_id: String,
    pub source_id: String,
    pub title: String,
    pub ordinal: u32,
    pub text: String,
    pub span: CharSpan,
    pub text_sha256: String,
}

impl ChunkMeta {
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            chunk_id: chunk.chunk_id.clone(),
            source_id: chunk.source_id.clone(),
            title: chunk.title.clone(),
            ordinal: chunk.ordinal,
            text: chunk.text.clone(),
            span: chunk.span,
            text_sha256: sha256_hex(&chunk.text),
        }
    }
}

pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// A vector and the chunk it was computed from; always added and removed together.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndexEntry {
    pub vector: Vec<f32>,
    pub meta: ChunkMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexManifest {
    pub format_version: u32,
    pub embedding_model: String,
    pub dims: usize,
    pub count: usize,
    /// RFC 3339, UTC.
    pub built_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub meta: ChunkMeta,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

/// Read-only similarity search. Implementations must be safe to query from many threads.
pub trait VectorIndex: Send + Sync {
    fn manifest(&self) -> &IndexManifest;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Metadata of the row at `position` (insertion order).
    fn meta(&self, position: usize) -> Option<&ChunkMeta>;

    /// Up to `k` hits, most similar first; equal scores keep insertion order.
    fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit>;
}
