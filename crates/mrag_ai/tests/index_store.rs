mod common;

use std::fs;

use common::{build_index, manual_pages, ConceptEmbedder, MODEL};
use mrag_ai::embeddings::Embedder;
use mrag_ai::index::store::{self, CHUNKS_FILE, MANIFEST_FILE, VECTORS_FILE};
use mrag_ai::index::{ChunkMeta, IndexLayout, VectorIndex};
use mrag_core::error::codes;
use pretty_assertions::assert_eq;

#[test]
fn persisted_index_loads_with_identical_search_results() {
    let dir = tempfile::tempdir().expect("tempdir");
    let embedder = ConceptEmbedder::new(MODEL);
    let index = build_index(&manual_pages(), &embedder);

    store::persist(&index, dir.path()).expect("persist");
    let loaded = store::load(dir.path(), Some(index.manifest().dims)).expect("load");

    assert_eq!(loaded.manifest(), index.manifest());
    for question in ["如何鏡像物件", "subdivision smooth", "gltf export", "modifier"] {
        let q = embedder.embed(question).expect("embed");
        assert_eq!(loaded.search(&q, 5), index.search(&q, 5), "{question}");
    }
}

#[test]
fn missing_index_is_not_ready() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = store::load(&dir.path().join("nothing"), None).expect_err("missing");
    assert!(err.is(codes::INDEX_NOT_READY));
}

fn persisted() -> (tempfile::TempDir, usize) {
    let dir = tempfile::tempdir().expect("tempdir");
    let index = build_index(&manual_pages(), &ConceptEmbedder::new(MODEL));
    store::persist(&index, dir.path()).expect("persist");
    (dir, index.manifest().dims)
}

#[test]
fn configured_dims_must_match_manifest() {
    let (dir, dims) = persisted();
    let err = store::load(dir.path(), Some(dims + 1)).expect_err("dims");
    assert!(err.is(codes::CORRUPT_INDEX));
    assert!(store::load(dir.path(), None).is_ok());
}

#[test]
fn truncated_vector_file_is_corrupt() {
    let (dir, dims) = persisted();
    let path = dir.path().join(VECTORS_FILE);
    let bytes = fs::read(&path).expect("read");
    fs::write(&path, &bytes[..bytes.len() - 4]).expect("truncate");

    let err = store::load(dir.path(), Some(dims)).expect_err("truncated");
    assert!(err.is(codes::CORRUPT_INDEX));
    assert!(err.message.contains("Vector file size"));
}

#[test]
fn edited_chunk_text_is_corrupt() {
    let (dir, dims) = persisted();
    let path = dir.path().join(CHUNKS_FILE);
    let mut metas: Vec<ChunkMeta> =
        serde_json::from_slice(&fs::read(&path).expect("read")).expect("decode");
    metas[0].text.push_str(" tampered");
    fs::write(&path, serde_json::to_vec(&metas).expect("encode")).expect("write");

    let err = store::load(dir.path(), Some(dims)).expect_err("tampered");
    assert!(err.is(codes::CORRUPT_INDEX));
    assert_eq!(
        err.details.as_deref().map(|d| d.ends_with(&format!("chunk_id={}", metas[0].chunk_id))),
        Some(true)
    );
}

#[test]
fn chunk_count_must_match_manifest() {
    let (dir, dims) = persisted();
    let path = dir.path().join(CHUNKS_FILE);
    let mut metas: Vec<ChunkMeta> =
        serde_json::from_slice(&fs::read(&path).expect("read")).expect("decode");
    metas.pop();
    fs::write(&path, serde_json::to_vec(&metas).expect("encode")).expect("write");

    let err = store::load(dir.path(), Some(dims)).expect_err("count");
    assert!(err.is(codes::CORRUPT_INDEX));
}

#[test]
fn unreadable_manifest_is_corrupt() {
    let (dir, _) = persisted();
    fs::write(dir.path().join(MANIFEST_FILE), b"{ not json").expect("write");
    let err = store::load(dir.path(), None).expect_err("manifest");
    assert!(err.is(codes::CORRUPT_INDEX));
}

#[test]
fn promotion_keeps_the_previous_index_aside() {
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = IndexLayout::new(dir.path());
    let embedder = ConceptEmbedder::new(MODEL);

    let first = build_index(&manual_pages(), &embedder);
    layout.write_staging(&first).expect("stage first");
    layout.promote_staging().expect("promote first");
    assert!(!layout.staging_dir().exists());
    assert!(layout.active_dir().join(MANIFEST_FILE).exists());

    let second = build_index(&manual_pages()[..1], &embedder);
    layout.write_staging(&second).expect("stage second");
    layout.promote_staging().expect("promote second");

    let active = layout.load_active(None).expect("active");
    assert_eq!(active.len(), second.len());
    let previous = store::load(&layout.previous_dir(), None).expect("previous");
    assert_eq!(previous.len(), first.len());

    let err = layout.promote_staging().expect_err("nothing staged");
    assert!(err.is(codes::INDEX_IO_FAILED));
}

fn rewrite_manifest(dir: &std::path::Path, edit: impl FnOnce(&mut serde_json::Value)) {
    let path = dir.join(MANIFEST_FILE);
    let mut manifest: serde_json::Value =
        serde_json::from_slice(&fs::read(&path).expect("read")).expect("decode");
    edit(&mut manifest);
    fs::write(&path, serde_json::to_vec(&manifest).expect("encode")).expect("write");
}

#[test]
fn oversized_manifest_counts_are_corrupt_not_a_crash() {
    let (dir, _) = persisted();
    rewrite_manifest(dir.path(), |m| m["count"] = serde_json::json!(usize::MAX / 2));

    let err = store::load(dir.path(), None).expect_err("overflow");
    assert!(err.is(codes::CORRUPT_INDEX));
    assert_eq!(err.message, "Index manifest sizes overflow");
}

#[test]
fn empty_index_on_disk_is_corrupt() {
    let (dir, _) = persisted();
    rewrite_manifest(dir.path(), |m| m["count"] = serde_json::json!(0));
    fs::write(dir.path().join(VECTORS_FILE), b"").expect("vectors");
    fs::write(dir.path().join(CHUNKS_FILE), b"[]").expect("chunks");

    let err = store::load(dir.path(), None).expect_err("empty");
    assert!(err.is(codes::CORRUPT_INDEX));
}

#[test]
fn interrupted_promotion_falls_back_to_previous() {
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = IndexLayout::new(dir.path());
    let embedder = ConceptEmbedder::new(MODEL);

    let first = build_index(&manual_pages(), &embedder);
    layout.write_staging(&first).expect("stage");
    layout.promote_staging().expect("promote");

    // State after `active → previous` but before `staging → active`.
    fs::rename(layout.active_dir(), layout.previous_dir()).expect("rename");

    let loaded = layout.load_active(None).expect("previous serves");
    assert_eq!(loaded.manifest(), first.manifest());

    fs::remove_dir_all(layout.previous_dir()).expect("remove");
    let err = layout.load_active(None).expect_err("nothing left");
    assert!(err.is(codes::INDEX_NOT_READY));
}
