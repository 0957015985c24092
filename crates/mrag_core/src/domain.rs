use serde::{Deserialize, Serialize};

/// One page as handed over by the acquisition step, before any parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    /// Stable identifier, e.g. the page path relative to the manual root.
    pub source_id: String,
    pub bytes: Vec<u8>,
}

impl RawDocument {
    pub fn new(source_id: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            source_id: source_id.into(),
            bytes: bytes.into(),
        }
    }
}

/// A normalized manual page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub source_id: String,
    pub title: String,
    /// Readable text; blocks are separated by blank lines.
    pub body: String,
    pub language: String,
}

/// Half-open range `[start, end)` counted in `char`s of the document body.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CharSpan {
    pub start: usize,
    pub end: usize,
}

impl CharSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// `{source_id}#{ordinal}`
    pub chunk_id: String,
    pub source_id: String,
    pub title: String,
    pub ordinal: u32,
    pub text: String,
    pub span: CharSpan,
}

pub fn chunk_id(source_id: &str, ordinal: u32) -> String {
    format!("{source_id}#{ordinal}")
}
