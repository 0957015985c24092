//! Serving facade: holds the published index and answers queries against it.

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwapOption;
use mrag_core::config::RagConfig;
use mrag_core::domain::RawDocument;
use mrag_core::error::{codes, AppError};

use crate::embeddings::Embedder;
use crate::index::{FlatIndex, IndexManifest, VectorIndex};
use crate::llm::GenerationClient;
use crate::pipeline::{BuildOutcome, IndexPipeline};
use crate::rag::{AnswerStream, Orchestrator, QuerySettings};
use crate::validate::ValidationReport;

/// The published index is swapped as a whole; a query keeps the snapshot it
/// started with and never observes a partially built index.
pub struct RagService {
    current: ArcSwapOption<FlatIndex>,
    orchestrator: Orchestrator,
    pipeline: IndexPipeline,
    /// Builds share one staging directory, so they run one at a time.
    build_lock: Mutex<()>,
}

impl RagService {
    pub fn new(
        config: &RagConfig,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn GenerationClient>,
    ) -> Result<Self, AppError> {
        let pipeline = IndexPipeline::from_config(config)?;
        Ok(Self {
            current: ArcSwapOption::new(None),
            orchestrator: Orchestrator::new(embedder, generator, QuerySettings::from_config(config)),
            pipeline,
            build_lock: Mutex::new(()),
        })
    }

    pub fn pipeline(&self) -> &IndexPipeline {
        &self.pipeline
    }

    /// Manifest of the index currently serving queries.
    pub fn current_manifest(&self) -> Option<IndexManifest> {
        self.current.load_full().map(|index| index.manifest().clone())
    }

    /// Publishes `index` for new queries. Refuses an index built with another embedding model.
    pub fn publish(&self, index: FlatIndex) -> Result<(), AppError> {
        let model = self.orchestrator.embedder().model_id();
        if index.manifest().embedding_model != model {
            return Err(AppError::new(
                codes::MODEL_MISMATCH,
                "Index was built with a different embedding model",
            )
            .with_details(format!(
                "index_model={}; embedder_model={model}",
                index.manifest().embedding_model
            )));
        }
        tracing::info!(
            count = index.len(),
            model = %index.manifest().embedding_model,
            built_at = %index.manifest().built_at,
            "index published"
        );
        self.current.store(Some(Arc::new(index)));
        Ok(())
    }

    /// Loads and publishes the on-disk active index.
    pub fn load_active(&self) -> Result<IndexManifest, AppError> {
        let index = self
            .pipeline
            .layout()
            .load_active(self.pipeline.expected_dims())?;
        let manifest = index.manifest().clone();
        self.publish(index)?;
        Ok(manifest)
    }

    /// Builds, validates and, when healthy, promotes and publishes a new index.
    /// A failed validation leaves the current index serving.
    pub fn rebuild(&self, raw: &[RawDocument]) -> Result<BuildOutcome, AppError> {
        let _guard = self
            .build_lock
            .lock()
            .map_err(|_| AppError::index_io("Index build lock poisoned"))?;
        let run = self
            .pipeline
            .run(raw, self.orchestrator.embedder().as_ref())?;
        if let Some(index) = run.index {
            self.publish(index)?;
        }
        Ok(run.outcome)
    }

    /// Re-runs the validator against the published index.
    pub fn validate_current(&self) -> Result<ValidationReport, AppError> {
        let index = self
            .current
            .load_full()
            .ok_or_else(|| AppError::index_not_ready("No validated index has been published"))?;
        self.pipeline
            .validator()
            .validate(&*index, self.orchestrator.embedder().as_ref())
    }

    /// True when a validated index is published and the generation endpoint answers.
    pub fn readiness(&self) -> bool {
        if self.current.load().is_none() {
            return false;
        }
        match self.orchestrator.generator().health_check() {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "generation endpoint not ready");
                false
            }
        }
    }

    pub fn query(&self, question: &str) -> Result<AnswerStream, AppError> {
        let snapshot: Option<Arc<dyn VectorIndex>> = self
            .current
            .load_full()
            .map(|index| index as Arc<dyn VectorIndex>);
        self.orchestrator.answer(snapshot, question)
    }
}
