//! Layered configuration.
//!
//! Sources are merged in this order (later sources override earlier):
//! 1. `RagConfig::default()`
//! 2. a TOML file (explicit path, or `manualrag.toml` in the working directory)
//! 3. environment variables prefixed `MRAG_`, with `__` separating nested keys
//!    (e.g. `MRAG_RETRIEVAL__TOP_K=8`)

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const CONFIG_ENV_PREFIX: &str = "MRAG_";
pub const DEFAULT_CONFIG_FILENAME: &str = "manualrag.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    pub ollama: OllamaConfig,
    pub ingest: IngestConfig,
    pub chunking: ChunkingConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub validation: ValidationConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    /// Hosts the client may talk to. Models must stay on the local machine or the local container network.
    pub allowed_hosts: Vec<String>,
    pub embedding_model: String,
    pub generation_model: String,
    pub context_length: u32,
    pub connect_timeout_ms: u64,
    /// Per-read timeout; bounds the gap between two streamed tokens, not the whole answer.
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    pub default_language: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chunk_size: usize,
    pub overlap_size: usize,
    /// How far back from the hard cut the chunker may look for a sentence/paragraph boundary.
    pub boundary_window: Option<usize>,
    /// Caps the chunks taken from one page; text past the cap is not indexed.
    /// `None` indexes every page in full.
    pub max_chunks_per_document: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexConfig {
    pub dir: PathBuf,
    pub expected_dims: Option<usize>,
    pub embed_batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub max_context_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeConfig {
    pub question: String,
    #[serde(default)]
    pub expected_keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    pub probes: Vec<ProbeConfig>,
    pub top_k: usize,
    pub min_pass_ratio: f64,
    pub self_check_samples: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetScript {
    None,
    Traditional,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub target_script: TargetScript,
    /// Language the model is asked to answer in, written the way the prompt names it.
    pub answer_language: String,
    /// Product the manual documents; the assistant declines unrelated questions.
    pub product_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            ollama: OllamaConfig::default(),
            ingest: IngestConfig::default(),
            chunking: ChunkingConfig::default(),
            index: IndexConfig::default(),
            retrieval: RetrievalConfig::default(),
            validation: ValidationConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            allowed_hosts: vec![
                "127.0.0.1".to_string(),
                "localhost".to_string(),
                "ollama".to_string(),
            ],
            embedding_model: "paraphrase-multilingual".to_string(),
            generation_model: "gemma3:4b-it-q8_0".to_string(),
            context_length: 16_384,
            connect_timeout_ms: 2_000,
            read_timeout_ms: 120_000,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            default_language: "en".to_string(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 500,
            overlap_size: 50,
            boundary_window: None,
            max_chunks_per_document: None,
        }
    }
}

impl ChunkingConfig {
    /// Boundary window actually used by the chunker: defaults to a fifth of the
    /// chunk size and never reaches into the overlap, so every window advances.
    pub fn effective_boundary_window(&self) -> usize {
        let requested = self.boundary_window.unwrap_or(self.max_chunk_size / 5);
        let ceiling = self
            .max_chunk_size
            .saturating_sub(self.overlap_size)
            .saturating_sub(1);
        requested.min(ceiling)
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/index"),
            expected_dims: None,
            embed_batch_size: 32,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 6,
            max_context_chars: 4_500,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        let probe = |q: &str, kws: &[&str]| ProbeConfig {
            question: q.to_string(),
            expected_keywords: kws.iter().map(|k| k.to_string()).collect(),
        };
        Self {
            probes: vec![
                probe("如何在Blender中使用鏡像修改器？", &["mirror"]),
                probe("如何匯出模型成GLTF格式？", &["gltf"]),
                probe("How to use modifiers in Blender?", &["modifier"]),
                probe("材質節點的基本使用方法？", &["node"]),
                probe("如何進行UV展開？", &["uv", "unwrap"]),
                probe("Rigging and bone setup", &["bone", "armature", "rig"]),
            ],
            top_k: 10,
            min_pass_ratio: 1.0,
            self_check_samples: 8,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            target_script: TargetScript::Traditional,
            answer_language: "繁體中文".to_string(),
            product_name: "Blender".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl RagConfig {
    /// Loads the layered configuration. A missing explicit file is an error;
    /// a missing default file is not.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut figment = Figment::new().merge(Serialized::defaults(RagConfig::default()));

        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(AppError::invalid_config("Configuration file not found")
                        .with_details(format!("path={}", p.display())));
                }
                figment = figment.merge(Toml::file(p));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILENAME);
                if default_path.exists() {
                    figment = figment.merge(Toml::file(default_path));
                }
            }
        }

        figment = figment.merge(Env::prefixed(CONFIG_ENV_PREFIX).split("__"));

        let config: RagConfig = figment.extract().map_err(|e| {
            AppError::invalid_config("Failed to extract configuration").with_details(e.to_string())
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let c = &self.chunking;
        if c.max_chunk_size == 0 {
            return Err(AppError::invalid_config("chunking.max_chunk_size must be > 0"));
        }
        if c.overlap_size >= c.max_chunk_size {
            return Err(AppError::invalid_config(
                "chunking.overlap_size must be smaller than chunking.max_chunk_size",
            )
            .with_details(format!(
                "max_chunk_size={}; overlap_size={}",
                c.max_chunk_size, c.overlap_size
            )));
        }
        if c.max_chunks_per_document == Some(0) {
            return Err(AppError::invalid_config(
                "chunking.max_chunks_per_document must be >= 1 when set",
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(AppError::invalid_config("retrieval.top_k must be >= 1"));
        }
        if self.validation.top_k == 0 {
            return Err(AppError::invalid_config("validation.top_k must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.validation.min_pass_ratio) {
            return Err(AppError::invalid_config(
                "validation.min_pass_ratio must be within [0, 1]",
            )
            .with_details(format!("min_pass_ratio={}", self.validation.min_pass_ratio)));
        }
        if self.index.embed_batch_size == 0 {
            return Err(AppError::invalid_config("index.embed_batch_size must be >= 1"));
        }
        if self.ollama.embedding_model.trim().is_empty()
            || self.ollama.generation_model.trim().is_empty()
        {
            return Err(AppError::invalid_config("ollama model names must not be empty"));
        }
        Ok(())
    }
}
