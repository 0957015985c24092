use std::fs;
use std::path::Path;

use mrag_core::domain::RawDocument;
use mrag_core::error::AppError;
use walkdir::WalkDir;

/// Reads every `.html`/`.htm` file under `root`. Source ids are paths relative
/// to `root` with `/` separators, so they are stable across machines.
pub fn load_html_dir(root: &Path) -> Result<Vec<RawDocument>, AppError> {
    if !root.is_dir() {
        return Err(AppError::invalid_config("Manual directory does not exist")
            .with_details(format!("path={}", root.display())));
    }

    let mut docs = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !matches!(extension.to_ascii_lowercase().as_str(), "html" | "htm") {
            continue;
        }

        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let source_id = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        match fs::read(path) {
            Ok(bytes) => docs.push(RawDocument::new(source_id, bytes)),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable page"),
        }
    }

    tracing::info!(root = %root.display(), pages = docs.len(), "manual pages discovered");
    Ok(docs)
}
