//! Parallel normalize + chunk over a batch of raw pages.

use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::chunking::Chunker;
use crate::domain::{Chunk, RawDocument};
use crate::error::AppError;
use crate::normalize::Normalizer;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedDocument {
    pub source_id: String,
    pub error: AppError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestReport {
    pub documents_seen: usize,
    pub documents_ok: usize,
    pub skipped: Vec<SkippedDocument>,
    /// Pages cut short by `chunking.max_chunks_per_document`.
    #[serde(default)]
    pub truncated: Vec<String>,
    pub chunk_count: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub struct IngestOutput {
    /// Chunks grouped by document, in input order; ordinals ascend within each document.
    pub chunks: Vec<Chunk>,
    pub report: IngestReport,
}

/// Normalizes and chunks every page. A malformed page is skipped and reported;
/// it never aborts the batch.
pub fn ingest_documents(
    raw: &[RawDocument],
    normalizer: &Normalizer,
    chunker: &Chunker,
) -> IngestOutput {
    let started = Instant::now();

    let per_doc: Vec<Result<(Vec<Chunk>, bool), SkippedDocument>> = raw
        .par_iter()
        .map(|doc| {
            normalizer
                .normalize(doc)
                .map(|normalized| {
                    let chunks = chunker.chunk(&normalized);
                    let total = normalized.body.chars().count();
                    let truncated = chunks.last().is_some_and(|c| c.span.end < total);
                    (chunks, truncated)
                })
                .map_err(|error| SkippedDocument {
                    source_id: doc.source_id.clone(),
                    error,
                })
        })
        .collect();

    let mut chunks = Vec::new();
    let mut skipped = Vec::new();
    let mut truncated = Vec::new();
    let mut documents_ok = 0usize;
    for (doc, result) in raw.iter().zip(per_doc) {
        match result {
            Ok((doc_chunks, cut)) => {
                documents_ok += 1;
                if cut {
                    truncated.push(doc.source_id.clone());
                }
                chunks.extend(doc_chunks);
            }
            Err(skip) => {
                tracing::warn!(
                    source_id = %skip.source_id,
                    code = %skip.error.code,
                    error = %skip.error.message,
                    "skipping document"
                );
                skipped.push(skip);
            }
        }
    }

    let report = IngestReport {
        documents_seen: raw.len(),
        documents_ok,
        skipped,
        truncated,
        chunk_count: chunks.len(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    tracing::info!(
        documents_seen = report.documents_seen,
        documents_ok = report.documents_ok,
        skipped = report.skipped.len(),
        chunk_count = report.chunk_count,
        elapsed_ms = report.elapsed_ms,
        "ingest finished"
    );

    IngestOutput { chunks, report }
}
