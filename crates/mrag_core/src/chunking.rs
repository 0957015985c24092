//! Sliding-window chunking with boundary snapping.
//!
//! Chunk ends snap back to the nearest paragraph break, line break or sentence
//! terminator inside the boundary window; when none exists the window is cut
//! hard at `max_chunk_size`. The next window always starts exactly
//! `overlap_size` characters before the previous end, so the trailing overlap
//! of one chunk is the literal prefix of the next. All offsets count `char`s.

use crate::config::ChunkingConfig;
use crate::domain::{chunk_id, CharSpan, Chunk, Document};
use crate::error::AppError;

const ASCII_TERMINATORS: &[char] = &['.', '!', '?', ';'];
const CJK_TERMINATORS: &[char] = &['。', '！', '？', '；'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    max_chunk_size: usize,
    overlap_size: usize,
    boundary_window: usize,
    max_chunks: Option<usize>,
}

impl Chunker {
    pub fn new(config: &ChunkingConfig) -> Result<Self, AppError> {
        if config.max_chunk_size == 0 {
            return Err(AppError::invalid_config("max_chunk_size must be > 0"));
        }
        if config.overlap_size >= config.max_chunk_size {
            return Err(AppError::invalid_config(
                "overlap_size must be smaller than max_chunk_size",
            )
            .with_details(format!(
                "max_chunk_size={}; overlap_size={}",
                config.max_chunk_size, config.overlap_size
            )));
        }
        Ok(Self {
            max_chunk_size: config.max_chunk_size,
            overlap_size: config.overlap_size,
            boundary_window: config.effective_boundary_window(),
            max_chunks: config.max_chunks_per_document,
        })
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    pub fn overlap_size(&self) -> usize {
        self.overlap_size
    }

    pub fn chunk(&self, doc: &Document) -> Vec<Chunk> {
        let chars: Vec<char> = doc.body.chars().collect();
        let n = chars.len();
        let mut out = Vec::new();
        if n == 0 {
            return out;
        }

        let mut start = 0usize;
        loop {
            let hard_end = start + self.max_chunk_size;
            let end = if hard_end >= n {
                n
            } else {
                self.snap_end(&chars, start, hard_end)
            };

            let ordinal = out.len() as u32;
            out.push(Chunk {
                chunk_id: chunk_id(&doc.source_id, ordinal),
                source_id: doc.source_id.clone(),
                title: doc.title.clone(),
                ordinal,
                text: chars[start..end].iter().collect(),
                span: CharSpan { start, end },
            });

            if end == n {
                break;
            }
            if self.max_chunks.is_some_and(|cap| out.len() >= cap) {
                tracing::warn!(
                    source_id = %doc.source_id,
                    cap = out.len(),
                    indexed_chars = end,
                    total_chars = n,
                    "chunk cap reached; rest of the page is not indexed"
                );
                break;
            }
            start = end - self.overlap_size;
        }
        out
    }

    /// Picks the cut position in `[hard_end - boundary_window, hard_end]`.
    /// The lower bound stays above `start + overlap_size`, which keeps the window moving.
    fn snap_end(&self, chars: &[char], start: usize, hard_end: usize) -> usize {
        let lo = hard_end
            .saturating_sub(self.boundary_window)
            .max(start + self.overlap_size + 1);

        let candidates = || (lo..=hard_end).rev();
        let paragraph = |c: usize| c >= 2 && chars[c - 1] == '\n' && chars[c - 2] == '\n';
        let line = |c: usize| chars[c - 1] == '\n';
        let sentence = |c: usize| {
            let prev = chars[c - 1];
            if CJK_TERMINATORS.contains(&prev) {
                return true;
            }
            ASCII_TERMINATORS.contains(&prev)
                && chars.get(c).map_or(true, |next| next.is_whitespace())
        };

        candidates()
            .find(|&c| paragraph(c))
            .or_else(|| candidates().find(|&c| line(c)))
            .or_else(|| candidates().find(|&c| sentence(c)))
            .unwrap_or(hard_end)
    }
}

/// Rebuilds the document body from its chunks by dropping each chunk's leading overlap.
pub fn reassemble(chunks: &[Chunk], overlap_size: usize) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            out.push_str(&chunk.text);
        } else {
            out.extend(chunk.text.chars().skip(overlap_size));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn doc(body: &str) -> Document {
        Document {
            source_id: "modeling/mirror.html".to_string(),
            title: "Mirror".to_string(),
            body: body.to_string(),
            language: "en".to_string(),
        }
    }

    fn chunker(max: usize, overlap: usize) -> Chunker {
        Chunker::new(&ChunkingConfig {
            max_chunk_size: max,
            overlap_size: overlap,
            boundary_window: None,
            max_chunks_per_document: None,
        })
        .expect("chunker")
    }

    fn sentences(count: usize) -> String {
        (0..count)
            .map(|i| format!("Sentence number {i} explains one option of the modifier."))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn short_document_yields_single_chunk() {
        let chunks = chunker(800, 100).chunk(&doc("Subdivision surface smooths mesh topology."));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, "modeling/mirror.html#0");
        assert_eq!(chunks[0].span, CharSpan { start: 0, end: 42 });
    }

    #[test]
    fn exactly_max_sized_document_is_one_chunk() {
        let chunks = chunker(10, 3).chunk(&doc(&"x".repeat(10)));
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn chunks_cover_text_bounded_and_overlap_exactly() {
        let body = sentences(60);
        let c = chunker(300, 40);
        let chunks = c.chunk(&doc(&body));
        assert!(chunks.len() > 3);

        for chunk in &chunks {
            let len = chunk.text.chars().count();
            assert!(len > 0 && len <= 300, "len={len}");
            assert_eq!(len, chunk.span.len());
        }
        for pair in chunks.windows(2) {
            let tail: String = {
                let chars: Vec<char> = pair[0].text.chars().collect();
                chars[chars.len() - 40..].iter().collect()
            };
            assert!(pair[1].text.starts_with(&tail));
            assert_eq!(pair[1].span.start, pair[0].span.end - 40);
        }
        assert_eq!(reassemble(&chunks, 40), body);
    }

    #[test]
    fn snaps_to_sentence_boundary_inside_window() {
        let body = sentences(30);
        let chunks = chunker(300, 40).chunk(&doc(&body));
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.text.ends_with('.'), "{:?}", chunk.text);
        }
    }

    #[test]
    fn prefers_paragraph_break_over_sentence_end() {
        let first = "A".repeat(150) + ". More words here. ";
        let body = format!("{}\n\n{}", first.trim_end(), "B".repeat(400));
        let chunks = chunker(200, 20).chunk(&doc(&body));
        assert!(chunks[0].text.ends_with("\n\n"), "{:?}", chunks[0].text);
    }

    #[test]
    fn hard_cuts_when_no_boundary_exists() {
        let body = "a".repeat(2500);
        let chunks = chunker(800, 100).chunk(&doc(&body));
        let lens: Vec<usize> = chunks.iter().map(|c| c.text.len()).collect();
        assert_eq!(lens, vec![800, 800, 800, 400]);
        assert_eq!(reassemble(&chunks, 100), body);
    }

    #[test]
    fn counts_characters_not_bytes_for_cjk() {
        let body = "鏡像修改器沿著物件的局部軸鏡像網格。".repeat(40);
        let chunks = chunker(100, 10).chunk(&doc(&body));
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 100);
        }
        assert!(chunks[..chunks.len() - 1].iter().all(|c| c.text.ends_with('。')));
        assert_eq!(reassemble(&chunks, 10), body);
    }

    #[test]
    fn chunk_cap_stops_a_long_page_early() {
        let capped = Chunker::new(&ChunkingConfig {
            max_chunk_size: 100,
            overlap_size: 10,
            boundary_window: None,
            max_chunks_per_document: Some(3),
        })
        .expect("chunker");
        let body = sentences(40);

        let full = chunker(100, 10).chunk(&doc(&body));
        let chunks = capped.chunk(&doc(&body));
        assert!(full.len() > 3);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[..], full[..3]);
    }

    #[test]
    fn rejects_overlap_not_smaller_than_max() {
        let err = Chunker::new(&ChunkingConfig {
            max_chunk_size: 100,
            overlap_size: 100,
            boundary_window: None,
            max_chunks_per_document: None,
        })
        .expect_err("invalid");
        assert!(err.is(crate::error::codes::CONFIG_INVALID));
    }

    #[test]
    fn largest_overlap_still_advances() {
        let body = "b".repeat(50);
        let chunks = chunker(10, 9).chunk(&doc(&body));
        assert_eq!(chunks.len(), 41);
        assert_eq!(reassemble(&chunks, 9), body);
    }
}
