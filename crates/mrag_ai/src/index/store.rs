//! On-disk index layout.
//!
//! An index directory holds `manifest.json`, `vectors.f32` (`count × dims`
//! little-endian `f32`, row-major) and `chunks.json` (row metadata in the same
//! order). Builds are written to `staging/` and promoted into `active/`; the
//! previously active index is kept as `previous/`.

use std::fs;
use std::path::{Path, PathBuf};

use mrag_core::error::AppError;

use super::{sha256_hex, ChunkMeta, FlatIndex, IndexManifest, VectorIndex, INDEX_FORMAT_VERSION};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const VECTORS_FILE: &str = "vectors.f32";
pub const CHUNKS_FILE: &str = "chunks.json";

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), AppError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|e| {
        AppError::index_io("Failed to write index file")
            .with_details(format!("path={}; err={}", tmp.display(), e))
    })?;
    fs::rename(&tmp, path).map_err(|e| {
        AppError::index_io("Failed to finalize index file write").with_details(format!(
            "tmp={}; dest={}; err={}",
            tmp.display(),
            path.display(),
            e
        ))
    })
}

/// Writes the index into `dir`. The manifest goes last, so a directory
/// without one never looks like a finished index.
pub fn persist(index: &FlatIndex, dir: &Path) -> Result<(), AppError> {
    fs::create_dir_all(dir).map_err(|e| {
        AppError::index_io("Failed to create index directory")
            .with_details(format!("path={}; err={}", dir.display(), e))
    })?;

    let mut raw = Vec::with_capacity(index.raw_vectors().len() * 4);
    for x in index.raw_vectors() {
        raw.extend_from_slice(&x.to_le_bytes());
    }
    write_atomic(&dir.join(VECTORS_FILE), &raw)?;

    let chunks = serde_json::to_vec(index.metas()).map_err(|e| {
        AppError::index_io("Failed to encode chunk metadata").with_details(e.to_string())
    })?;
    write_atomic(&dir.join(CHUNKS_FILE), &chunks)?;

    let manifest = serde_json::to_vec_pretty(index.manifest()).map_err(|e| {
        AppError::index_io("Failed to encode index manifest").with_details(e.to_string())
    })?;
    write_atomic(&dir.join(MANIFEST_FILE), &manifest)?;

    tracing::info!(
        dir = %dir.display(),
        count = index.manifest().count,
        dims = index.manifest().dims,
        "index persisted"
    );
    Ok(())
}

/// Loads and verifies an index directory. Every disagreement between the
/// manifest, the vector file and the chunk metadata is `RAG_CORRUPT_INDEX`.
pub fn load(dir: &Path, expected_dims: Option<usize>) -> Result<FlatIndex, AppError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    if !manifest_path.exists() {
        return Err(AppError::index_not_ready("No index has been built")
            .with_details(format!("dir={}", dir.display())));
    }
    let corrupt = |message: &str, details: String| {
        AppError::corrupt_index(message.to_string())
            .with_details(format!("dir={}; {details}", dir.display()))
    };

    let manifest_bytes = read(&manifest_path)?;
    let manifest: IndexManifest = serde_json::from_slice(&manifest_bytes)
        .map_err(|e| corrupt("Index manifest is unreadable", e.to_string()))?;
    if manifest.format_version != INDEX_FORMAT_VERSION {
        return Err(corrupt(
            "Unsupported index format version",
            format!("found={}; supported={INDEX_FORMAT_VERSION}", manifest.format_version),
        ));
    }
    if manifest.count == 0 || manifest.dims == 0 {
        return Err(corrupt(
            "Index manifest describes an empty index",
            format!("count={}; dims={}", manifest.count, manifest.dims),
        ));
    }
    if let Some(expected) = expected_dims {
        if manifest.dims != expected {
            return Err(corrupt(
                "Index dimension does not match configuration",
                format!("expected={expected}; manifest={}", manifest.dims),
            ));
        }
    }

    let raw = read(&dir.join(VECTORS_FILE))?;
    let expected_len = manifest
        .count
        .checked_mul(manifest.dims)
        .and_then(|floats| floats.checked_mul(4))
        .ok_or_else(|| {
            corrupt(
                "Index manifest sizes overflow",
                format!("count={}; dims={}", manifest.count, manifest.dims),
            )
        })?;
    if raw.len() != expected_len {
        return Err(corrupt(
            "Vector file size does not match manifest",
            format!("expected_bytes={expected_len}; actual_bytes={}", raw.len()),
        ));
    }
    let vectors: Vec<f32> = raw
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    let chunk_bytes = read(&dir.join(CHUNKS_FILE))?;
    let metas: Vec<ChunkMeta> = serde_json::from_slice(&chunk_bytes)
        .map_err(|e| corrupt("Chunk metadata is unreadable", e.to_string()))?;
    if metas.len() != manifest.count {
        return Err(corrupt(
            "Chunk count does not match manifest",
            format!("manifest={}; chunks={}", manifest.count, metas.len()),
        ));
    }
    if let Some(bad) = metas.iter().find(|m| sha256_hex(&m.text) != m.text_sha256) {
        return Err(corrupt(
            "Chunk text does not match its hash",
            format!("chunk_id={}", bad.chunk_id),
        ));
    }

    let index = FlatIndex::from_parts(manifest, vectors, metas)?;
    tracing::info!(
        dir = %dir.display(),
        count = index.len(),
        model = %index.manifest().embedding_model,
        "index loaded"
    );
    Ok(index)
}

fn read(path: &Path) -> Result<Vec<u8>, AppError> {
    fs::read(path).map_err(|e| {
        AppError::corrupt_index("Index file is missing or unreadable")
            .with_details(format!("path={}; err={}", path.display(), e))
    })
}

/// `staging/`, `active/` and `previous/` under one index root.
#[derive(Debug, Clone)]
pub struct IndexLayout {
    root: PathBuf,
}

impl IndexLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join("staging")
    }

    pub fn active_dir(&self) -> PathBuf {
        self.root.join("active")
    }

    pub fn previous_dir(&self) -> PathBuf {
        self.root.join("previous")
    }

    /// Persists `index` into a fresh staging directory.
    pub fn write_staging(&self, index: &FlatIndex) -> Result<(), AppError> {
        self.discard_staging()?;
        persist(index, &self.staging_dir())
    }

    pub fn discard_staging(&self) -> Result<(), AppError> {
        remove_dir_if_exists(&self.staging_dir())
    }

    /// `active → previous`, then `staging → active`. A crash between the two
    /// renames leaves no `active/`; `load_active` then serves `previous/`.
    pub fn promote_staging(&self) -> Result<(), AppError> {
        let staging = self.staging_dir();
        if !staging.join(MANIFEST_FILE).exists() {
            return Err(AppError::index_io("No staged index to promote")
                .with_details(format!("dir={}", staging.display())));
        }
        let active = self.active_dir();
        let previous = self.previous_dir();

        remove_dir_if_exists(&previous)?;
        if active.exists() {
            rename_dir(&active, &previous)?;
        }
        rename_dir(&staging, &active)?;
        tracing::info!(dir = %active.display(), "staged index promoted");
        Ok(())
    }

    pub fn load_active(&self, expected_dims: Option<usize>) -> Result<FlatIndex, AppError> {
        let active = self.active_dir();
        let previous = self.previous_dir();
        if !active.join(MANIFEST_FILE).exists() && previous.join(MANIFEST_FILE).exists() {
            tracing::warn!(
                dir = %previous.display(),
                "no active index; loading the previous one (interrupted promotion?)"
            );
            return load(&previous, expected_dims);
        }
        load(&active, expected_dims)
    }
}

fn remove_dir_if_exists(dir: &Path) -> Result<(), AppError> {
    if !dir.exists() {
        return Ok(());
    }
    fs::remove_dir_all(dir).map_err(|e| {
        AppError::index_io("Failed to remove index directory")
            .with_details(format!("path={}; err={}", dir.display(), e))
    })
}

fn rename_dir(from: &Path, to: &Path) -> Result<(), AppError> {
    fs::rename(from, to).map_err(|e| {
        AppError::index_io("Failed to move index directory").with_details(format!(
            "from={}; to={}; err={}",
            from.display(),
            to.display(),
            e
        ))
    })
}
