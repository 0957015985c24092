use std::cmp::Ordering;

use mrag_core::error::{codes, AppError};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::{ChunkMeta, IndexManifest, SearchHit, VectorIndex, VectorIndexEntry, INDEX_FORMAT_VERSION};
use crate::similarity::{dot, normalize_in_place};

/// Exact, brute-force cosine index. Rows are stored unit-length in one
/// contiguous row-major buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    manifest: IndexManifest,
    vectors: Vec<f32>,
    metas: Vec<ChunkMeta>,
}

impl FlatIndex {
    pub fn build(embedding_model: &str, entries: Vec<VectorIndexEntry>) -> Result<Self, AppError> {
        let built_at = OffsetDateTime::now_utc().format(&Rfc3339).map_err(|e| {
            AppError::index_io("Failed to format build time").with_details(e.to_string())
        })?;
        Self::build_at(embedding_model, entries, built_at)
    }

    pub fn build_at(
        embedding_model: &str,
        entries: Vec<VectorIndexEntry>,
        built_at: String,
    ) -> Result<Self, AppError> {
        let dims = match entries.first() {
            Some(first) => first.vector.len(),
            None => {
                return Err(AppError::new(
                    codes::EMPTY_CORPUS,
                    "Cannot build an index without chunks",
                ))
            }
        };
        if dims == 0 {
            return Err(AppError::corrupt_index("Embedding vectors have zero dimensions"));
        }

        let mut vectors = Vec::with_capacity(entries.len() * dims);
        let mut metas = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.vector.len() != dims {
                return Err(AppError::corrupt_index("Embedding dimension mismatch across chunks")
                    .with_details(format!(
                        "expected={dims}; got={}; chunk_id={}",
                        entry.vector.len(),
                        entry.meta.chunk_id
                    )));
            }
            let mut v = entry.vector;
            normalize_in_place(&mut v);
            vectors.extend_from_slice(&v);
            metas.push(entry.meta);
        }

        let manifest = IndexManifest {
            format_version: INDEX_FORMAT_VERSION,
            embedding_model: embedding_model.to_string(),
            dims,
            count: metas.len(),
            built_at,
        };
        Ok(Self {
            manifest,
            vectors,
            metas,
        })
    }

    /// Reassembles an index from already-normalized rows, as written by `persist`.
    pub(crate) fn from_parts(
        manifest: IndexManifest,
        vectors: Vec<f32>,
        metas: Vec<ChunkMeta>,
    ) -> Result<Self, AppError> {
        let floats = manifest.count.checked_mul(manifest.dims);
        if manifest.dims == 0
            || manifest.count == 0
            || floats != Some(vectors.len())
            || metas.len() != manifest.count
        {
            return Err(AppError::corrupt_index("Index parts disagree with manifest").with_details(
                format!(
                    "dims={}; count={}; floats={}; chunks={}",
                    manifest.dims,
                    manifest.count,
                    vectors.len(),
                    metas.len()
                ),
            ));
        }
        Ok(Self {
            manifest,
            vectors,
            metas,
        })
    }

    pub fn dims(&self) -> usize {
        self.manifest.dims
    }

    pub(crate) fn raw_vectors(&self) -> &[f32] {
        &self.vectors
    }

    pub(crate) fn metas(&self) -> &[ChunkMeta] {
        &self.metas
    }

    fn row(&self, position: usize) -> &[f32] {
        let dims = self.manifest.dims;
        &self.vectors[position * dims..(position + 1) * dims]
    }
}

impl VectorIndex for FlatIndex {
    fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    fn len(&self) -> usize {
        self.metas.len()
    }

    fn meta(&self, position: usize) -> Option<&ChunkMeta> {
        self.metas.get(position)
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        if query.len() != self.manifest.dims {
            tracing::warn!(
                expected = self.manifest.dims,
                got = query.len(),
                "query dimension does not match index"
            );
            return Vec::new();
        }
        if k == 0 {
            return Vec::new();
        }

        let mut q = query.to_vec();
        normalize_in_place(&mut q);

        let mut scored: Vec<(usize, f32)> = (0..self.metas.len())
            .map(|i| (i, dot(&q, self.row(i))))
            .collect();
        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(i, score)| SearchHit {
                meta: self.metas[i].clone(),
                score,
            })
            .collect()
    }
}
