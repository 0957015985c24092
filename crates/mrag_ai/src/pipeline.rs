//! Offline build: ingest → embed → index → stage → validate → promote.

use std::time::Instant;

use mrag_core::chunking::Chunker;
use mrag_core::config::RagConfig;
use mrag_core::domain::{Chunk, RawDocument};
use mrag_core::error::{codes, AppError};
use mrag_core::ingest::{ingest_documents, IngestReport};
use mrag_core::normalize::Normalizer;
use serde::{Deserialize, Serialize};

use crate::embeddings::Embedder;
use crate::index::{store, ChunkMeta, FlatIndex, IndexLayout, IndexManifest, VectorIndex, VectorIndexEntry};
use crate::validate::{IndexValidator, ValidationReport};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildOutcome {
    pub ingest: IngestReport,
    pub manifest: IndexManifest,
    pub validation: ValidationReport,
    /// True when the new index replaced the active one.
    pub promoted: bool,
    pub embed_ms: u64,
}

#[derive(Debug)]
pub struct PipelineRun {
    pub outcome: BuildOutcome,
    /// The promoted index, as reloaded from disk. `None` when validation failed.
    pub index: Option<FlatIndex>,
}

#[derive(Debug, Clone)]
pub struct IndexPipeline {
    normalizer: Normalizer,
    chunker: Chunker,
    embed_batch_size: usize,
    expected_dims: Option<usize>,
    validator: IndexValidator,
    layout: IndexLayout,
}

impl IndexPipeline {
    pub fn from_config(config: &RagConfig) -> Result<Self, AppError> {
        config.validate()?;
        Ok(Self {
            normalizer: Normalizer::new(config.ingest.default_language.clone()),
            chunker: Chunker::new(&config.chunking)?,
            embed_batch_size: config.index.embed_batch_size,
            expected_dims: config.index.expected_dims,
            validator: IndexValidator::new(&config.validation),
            layout: IndexLayout::new(config.index.dir.clone()),
        })
    }

    pub fn layout(&self) -> &IndexLayout {
        &self.layout
    }

    pub fn validator(&self) -> &IndexValidator {
        &self.validator
    }

    pub fn expected_dims(&self) -> Option<usize> {
        self.expected_dims
    }

    /// Embeds chunks in batches, serially. Any embedding failure aborts the build.
    pub fn embed_chunks(
        &self,
        chunks: &[Chunk],
        embedder: &dyn Embedder,
    ) -> Result<Vec<VectorIndexEntry>, AppError> {
        let mut entries = Vec::with_capacity(chunks.len());
        for (batch_no, batch) in chunks.chunks(self.embed_batch_size).enumerate() {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let vectors = embedder.embed_batch(&texts)?;
            if vectors.len() != batch.len() {
                return Err(AppError::embedding_unavailable(
                    "Embedder returned the wrong number of vectors",
                )
                .with_details(format!("inputs={}; vectors={}", batch.len(), vectors.len()))
                .with_retryable(false));
            }
            entries.extend(batch.iter().zip(vectors).map(|(chunk, vector)| VectorIndexEntry {
                vector,
                meta: ChunkMeta::from_chunk(chunk),
            }));
            tracing::debug!(batch = batch_no, embedded = entries.len(), total = chunks.len(), "embedded batch");
        }
        Ok(entries)
    }

    /// Writes `built` to staging and validates what was read back from disk.
    fn stage_and_validate(
        &self,
        built: &FlatIndex,
        embedder: &dyn Embedder,
    ) -> Result<(FlatIndex, ValidationReport), AppError> {
        self.layout.write_staging(built)?;
        let staged = store::load(&self.layout.staging_dir(), self.expected_dims)?;
        let report = self.validator.validate(&staged, embedder)?;
        Ok((staged, report))
    }

    /// Runs a full build. The active index on disk is only replaced when the
    /// new one validates healthy; otherwise the staging directory is removed.
    pub fn run(&self, raw: &[RawDocument], embedder: &dyn Embedder) -> Result<PipelineRun, AppError> {
        let ingested = ingest_documents(raw, &self.normalizer, &self.chunker);
        if ingested.chunks.is_empty() {
            return Err(AppError::new(codes::EMPTY_CORPUS, "No readable documents to index")
                .with_details(format!(
                    "documents_seen={}; skipped={}",
                    ingested.report.documents_seen,
                    ingested.report.skipped.len()
                )));
        }

        let started = Instant::now();
        let entries = self.embed_chunks(&ingested.chunks, embedder)?;
        let embed_ms = started.elapsed().as_millis() as u64;

        let built = FlatIndex::build(embedder.model_id(), entries)?;
        if let Some(expected) = self.expected_dims {
            if built.dims() != expected {
                return Err(AppError::invalid_config(
                    "Embedding dimension does not match index.expected_dims",
                )
                .with_details(format!("expected={expected}; embedder={}", built.dims())));
            }
        }
        tracing::info!(
            model = %embedder.model_id(),
            count = built.len(),
            dims = built.dims(),
            embed_ms,
            "index built"
        );

        let (staged, validation) = match self.stage_and_validate(&built, embedder) {
            Ok(checked) => checked,
            Err(e) => {
                self.layout.discard_staging()?;
                return Err(e);
            }
        };

        let manifest = staged.manifest().clone();
        let index = if validation.healthy {
            self.layout.promote_staging()?;
            Some(staged)
        } else {
            tracing::warn!(
                probe_pass_ratio = validation.probe_pass_ratio,
                "new index failed validation; keeping the previous index"
            );
            self.layout.discard_staging()?;
            None
        };

        Ok(PipelineRun {
            outcome: BuildOutcome {
                ingest: ingested.report,
                manifest,
                validation,
                promoted: index.is_some(),
                embed_ms,
            },
            index,
        })
    }
}
