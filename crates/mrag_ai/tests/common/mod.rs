#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mrag_ai::embeddings::Embedder;
use mrag_ai::index::{ChunkMeta, FlatIndex, VectorIndexEntry};
use mrag_ai::llm::{GenerationClient, TokenStream};
use mrag_core::chunking::Chunker;
use mrag_core::config::{ChunkingConfig, ProbeConfig, RagConfig, TargetScript};
use mrag_core::domain::RawDocument;
use mrag_core::error::AppError;
use mrag_core::ingest::ingest_documents;
use mrag_core::normalize::Normalizer;

pub const MODEL: &str = "mock-multilingual";

/// Concept terms across languages; each concept is one vector dimension.
const CONCEPTS: &[&[&str]] = &[
    &["mirror", "鏡像", "镜像"],
    &["subdivision", "細分", "smooth"],
    &["modifier", "修改器"],
    &["gltf"],
    &["node", "節點"],
    &["bone", "armature", "骨架"],
];
const HASH_BUCKETS: usize = 64;
const HASH_WEIGHT: f32 = 0.1;

/// Deterministic cross-lingual stand-in for a multilingual embedding model:
/// shared concept counts plus a light hashed bag of words so distinct texts
/// get distinct vectors.
pub struct ConceptEmbedder {
    model: String,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl ConceptEmbedder {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

fn fnv1a(word: &str) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in word.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

impl Embedder for ConceptEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn embed(&self, input: &str) -> Result<Vec<f32>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::embedding_unavailable("mock embedder is down"));
        }
        let lower = input.to_lowercase();
        let mut v = vec![0.0f32; CONCEPTS.len() + HASH_BUCKETS];
        for (i, terms) in CONCEPTS.iter().enumerate() {
            v[i] = terms.iter().map(|t| lower.matches(t).count()).sum::<usize>() as f32;
        }
        for word in lower.split_whitespace() {
            v[CONCEPTS.len() + (fnv1a(word) as usize % HASH_BUCKETS)] += HASH_WEIGHT;
        }
        Ok(v)
    }
}

/// Token iterator that records when it is dropped.
pub struct TrackedTokens {
    inner: std::vec::IntoIter<Result<String, AppError>>,
    dropped: Arc<AtomicUsize>,
}

impl Iterator for TrackedTokens {
    type Item = Result<String, AppError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl Drop for TrackedTokens {
    fn drop(&mut self) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

/// Generation client that replays a fixed script of fragments.
pub struct ScriptedGenerator {
    script: Mutex<Vec<Result<String, AppError>>>,
    healthy: AtomicBool,
    refuse: AtomicBool,
    pub prompts: Mutex<Vec<String>>,
    pub dropped: Arc<AtomicUsize>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Result<String, AppError>>) -> Self {
        Self {
            script: Mutex::new(script),
            healthy: AtomicBool::new(true),
            refuse: AtomicBool::new(false),
            prompts: Mutex::new(Vec::new()),
            dropped: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fragments(parts: &[&str]) -> Self {
        Self::new(parts.iter().map(|p| Ok(p.to_string())).collect())
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().expect("prompts").len()
    }

    pub fn dropped_streams(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }
}

impl GenerationClient for ScriptedGenerator {
    fn model_id(&self) -> &str {
        "mock-llm"
    }

    fn generate_stream(&self, prompt: &str) -> Result<TokenStream, AppError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(AppError::upstream_unavailable("mock generator refused"));
        }
        self.prompts.lock().expect("prompts").push(prompt.to_string());
        let items = self.script.lock().expect("script").clone();
        Ok(Box::new(TrackedTokens {
            inner: items.into_iter(),
            dropped: Arc::clone(&self.dropped),
        }))
    }

    fn health_check(&self) -> Result<(), AppError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::upstream_unavailable("mock generator unhealthy"))
        }
    }
}

fn page(title: &str, paragraphs: &[String]) -> String {
    let body: String = paragraphs.iter().map(|p| format!("<p>{p}</p>\n")).collect();
    format!(
        "<html lang=\"en\"><head><title>{title} — Blender Manual</title></head>\
         <body><nav>Prev | Next</nav><main><h1>{title}</h1>{body}</main></body></html>"
    )
}

/// About 3000 characters about the Mirror modifier.
pub fn mirror_page() -> String {
    let paragraphs: Vec<String> = (0..6)
        .map(|i| {
            (0..10)
                .map(|j| format!("Mirror modifier duplicates geometry across an axis {i}{j}."))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();
    page("Mirror Modifier", &paragraphs)
}

/// Under 500 characters about subdivision surfaces.
pub fn subdivision_page() -> String {
    let text = vec!["Subdivision surface smooths mesh topology."; 10].join(" ");
    page("Subdivision Surface", &[text])
}

pub fn armature_page() -> String {
    let text = vec!["An armature holds the bones used to rig a character."; 6].join(" ");
    page("Armatures", &[text])
}

pub fn manual_pages() -> Vec<RawDocument> {
    vec![
        RawDocument::new("modeling/modifiers/generate/mirror.html", mirror_page()),
        RawDocument::new(
            "modeling/modifiers/generate/subdivision_surface.html",
            subdivision_page(),
        ),
    ]
}

pub fn probe(question: &str, keywords: &[&str]) -> ProbeConfig {
    ProbeConfig {
        question: question.to_string(),
        expected_keywords: keywords.iter().map(|k| k.to_string()).collect(),
    }
}

/// Config for the two-page manual: 800/100 chunking, index under `dir`.
pub fn test_config(dir: &Path) -> RagConfig {
    let mut config = RagConfig::default();
    config.chunking = ChunkingConfig {
        max_chunk_size: 800,
        overlap_size: 100,
        boundary_window: None,
        max_chunks_per_document: None,
    };
    config.index.dir = dir.join("index");
    config.index.embed_batch_size = 3;
    config.retrieval.top_k = 3;
    config.output.target_script = TargetScript::Traditional;
    config.validation.probes = vec![
        probe("如何鏡像物件", &["mirror"]),
        probe("How does subdivision smooth a mesh?", &["subdivision"]),
    ];
    config.validation.min_pass_ratio = 1.0;
    config.validation.self_check_samples = 8;
    config
}

/// Builds an in-memory index of `pages` without touching disk.
pub fn build_index(pages: &[RawDocument], embedder: &dyn Embedder) -> FlatIndex {
    let chunker = Chunker::new(&ChunkingConfig {
        max_chunk_size: 800,
        overlap_size: 100,
        boundary_window: None,
        max_chunks_per_document: None,
    })
    .expect("chunker");
    let out = ingest_documents(pages, &Normalizer::new("en"), &chunker);
    let entries = out
        .chunks
        .iter()
        .map(|chunk| VectorIndexEntry {
            vector: embedder.embed(&chunk.text).expect("embed"),
            meta: ChunkMeta::from_chunk(chunk),
        })
        .collect();
    FlatIndex::build(embedder.model_id(), entries).expect("build index")
}
