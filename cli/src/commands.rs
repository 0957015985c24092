use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use mrag_ai::embeddings::ollama_embed::OllamaEmbedder;
use mrag_ai::llm::ollama_llm::OllamaLlm;
use mrag_ai::ollama::OllamaClient;
use mrag_ai::rag::AnswerEvent;
use mrag_ai::service::RagService;
use mrag_core::config::RagConfig;
use mrag_core::error::{codes, AppError};
use serde::Serialize;

use crate::corpus::load_html_dir;

fn open_service(config: &RagConfig) -> Result<RagService, AppError> {
    let client = OllamaClient::from_config(&config.ollama)?;
    let embedder = OllamaEmbedder::new(client.clone(), config.ollama.embedding_model.clone());
    let generator = OllamaLlm::new(
        client,
        config.ollama.generation_model.clone(),
        config.ollama.context_length,
    );
    RagService::new(config, Arc::new(embedder), Arc::new(generator))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| {
        AppError::index_io("Failed to encode output").with_details(e.to_string())
    })?;
    println!("{text}");
    Ok(())
}

pub fn build(config: &RagConfig, docs: &Path) -> Result<(), AppError> {
    let pages = load_html_dir(docs)?;
    let service = open_service(config)?;
    let outcome = service.rebuild(&pages)?;
    print_json(&outcome)?;

    if !outcome.promoted {
        let failed: Vec<&str> = outcome
            .validation
            .failed_probes()
            .map(|p| p.question.as_str())
            .collect();
        return Err(AppError::new(
            codes::VALIDATION_FAILED,
            "New index failed validation; the previous index is still active",
        )
        .with_details(format!("failed_probes={failed:?}")));
    }
    Ok(())
}

pub fn query(config: &RagConfig, question: &str, show_sources: bool) -> Result<(), AppError> {
    let service = open_service(config)?;
    service.load_active()?;

    let mut stream = service.query(question)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let write_err =
        |e: std::io::Error| AppError::index_io("Failed to write answer").with_details(e.to_string());

    for event in stream.by_ref() {
        match event {
            AnswerEvent::Fragment(text) => {
                out.write_all(text.as_bytes()).map_err(write_err)?;
                out.flush().map_err(write_err)?;
            }
            AnswerEvent::Complete { partial } => {
                writeln!(out).map_err(write_err)?;
                if partial {
                    eprintln!("(answer is incomplete: the generation stream stopped early)");
                }
            }
            AnswerEvent::Failed(err) => return Err(err),
        }
    }

    if show_sources {
        for (i, hit) in stream.hits().iter().enumerate() {
            eprintln!("[{}] {:.3} {} ({})", i + 1, hit.score, hit.meta.source_id, hit.meta.title);
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct StatusReport {
    index_dir: String,
    active: Option<mrag_ai::index::IndexManifest>,
    error: Option<AppError>,
    ready: bool,
}

pub fn status(config: &RagConfig) -> Result<(), AppError> {
    let service = open_service(config)?;
    let (active, error) = match service.load_active() {
        Ok(manifest) => (Some(manifest), None),
        Err(e) => (None, Some(e)),
    };
    print_json(&StatusReport {
        index_dir: config.index.dir.display().to_string(),
        active,
        error,
        ready: service.readiness(),
    })
}

pub fn validate(config: &RagConfig) -> Result<(), AppError> {
    let service = open_service(config)?;
    service.load_active()?;
    let report = service.validate_current()?;
    print_json(&report)?;
    if !report.healthy {
        return Err(AppError::new(
            codes::VALIDATION_FAILED,
            "Active index failed validation",
        )
        .with_details(format!("probe_pass_ratio={}", report.probe_pass_ratio)));
    }
    Ok(())
}
