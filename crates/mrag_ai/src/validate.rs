//! Sanity checks a built index answers known questions before it is published.

use std::time::Instant;

use mrag_core::config::{ProbeConfig, ValidationConfig};
use mrag_core::error::AppError;
use serde::{Deserialize, Serialize};

use crate::embeddings::Embedder;
use crate::index::VectorIndex;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeResult {
    pub question: String,
    pub passed: bool,
    pub matched_keyword: Option<String>,
    pub top_chunk_id: Option<String>,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelfCheckResult {
    pub chunk_id: String,
    pub rank1_chunk_id: Option<String>,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationReport {
    pub probes: Vec<ProbeResult>,
    pub probe_pass_ratio: f64,
    pub self_checks: Vec<SelfCheckResult>,
    pub avg_probe_latency_ms: f64,
    pub healthy: bool,
}

impl ValidationReport {
    pub fn failed_probes(&self) -> impl Iterator<Item = &ProbeResult> {
        self.probes.iter().filter(|p| !p.passed)
    }
}

#[derive(Debug, Clone)]
pub struct IndexValidator {
    probes: Vec<ProbeConfig>,
    top_k: usize,
    min_pass_ratio: f64,
    self_check_samples: usize,
}

impl IndexValidator {
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            probes: config.probes.clone(),
            top_k: config.top_k.max(1),
            min_pass_ratio: config.min_pass_ratio,
            self_check_samples: config.self_check_samples,
        }
    }

    /// Runs every probe and the self-retrieval sample. Embedding failures
    /// abort validation; a failed probe only lowers the verdict.
    pub fn validate(
        &self,
        index: &dyn VectorIndex,
        embedder: &dyn Embedder,
    ) -> Result<ValidationReport, AppError> {
        let mut probes = Vec::with_capacity(self.probes.len());
        for probe in &self.probes {
            probes.push(self.run_probe(probe, index, embedder)?);
        }

        let passed = probes.iter().filter(|p| p.passed).count();
        let probe_pass_ratio = if probes.is_empty() {
            1.0
        } else {
            passed as f64 / probes.len() as f64
        };
        let avg_probe_latency_ms = if probes.is_empty() {
            0.0
        } else {
            probes.iter().map(|p| p.latency_ms).sum::<f64>() / probes.len() as f64
        };

        let mut self_checks = Vec::new();
        for position in sample_positions(index.len(), self.self_check_samples) {
            let Some(meta) = index.meta(position) else {
                continue;
            };
            let vector = embedder.embed(&meta.text)?;
            let top = index.search(&vector, 1).into_iter().next();
            // A duplicate chunk with identical text is an equally valid rank-1 hit.
            let passed = top.as_ref().is_some_and(|hit| {
                hit.meta.chunk_id == meta.chunk_id || hit.meta.text_sha256 == meta.text_sha256
            });
            self_checks.push(SelfCheckResult {
                chunk_id: meta.chunk_id.clone(),
                rank1_chunk_id: top.map(|hit| hit.meta.chunk_id),
                passed,
            });
        }

        let healthy =
            probe_pass_ratio >= self.min_pass_ratio && self_checks.iter().all(|c| c.passed);
        let report = ValidationReport {
            probes,
            probe_pass_ratio,
            self_checks,
            avg_probe_latency_ms,
            healthy,
        };

        for failed in report.failed_probes() {
            tracing::warn!(question = %failed.question, "validation probe found no expected keyword");
        }
        tracing::info!(
            healthy = report.healthy,
            probe_pass_ratio = report.probe_pass_ratio,
            self_checks = report.self_checks.len(),
            avg_probe_latency_ms = report.avg_probe_latency_ms,
            "index validation finished"
        );
        Ok(report)
    }

    fn run_probe(
        &self,
        probe: &ProbeConfig,
        index: &dyn VectorIndex,
        embedder: &dyn Embedder,
    ) -> Result<ProbeResult, AppError> {
        let started = Instant::now();
        let vector = embedder.embed(&probe.question)?;
        let hits = index.search(&vector, self.top_k);
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let keywords: Vec<String> = probe
            .expected_keywords
            .iter()
            .map(|k| k.to_lowercase())
            .collect();
        let matched_keyword = hits.iter().find_map(|hit| {
            let text = hit.meta.text.to_lowercase();
            keywords.iter().find(|k| text.contains(k.as_str())).cloned()
        });
        let passed = if keywords.is_empty() {
            !hits.is_empty()
        } else {
            matched_keyword.is_some()
        };

        Ok(ProbeResult {
            question: probe.question.clone(),
            passed,
            matched_keyword,
            top_chunk_id: hits.first().map(|h| h.meta.chunk_id.clone()),
            latency_ms,
        })
    }
}

/// Evenly spaced, deterministic sample of row positions.
fn sample_positions(len: usize, samples: usize) -> Vec<usize> {
    let take = samples.min(len);
    (0..take).map(|i| i * len / take).collect()
}
