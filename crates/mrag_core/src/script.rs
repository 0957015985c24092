//! Simplified → Traditional Chinese post-processing for streamed answers.
//!
//! Conversion is phrase-aware (`zhconv`), so a phrase split across two
//! streamed fragments must be converted as one piece. `ScriptConverter`
//! holds text back until a boundary no phrase crosses (whitespace, ASCII,
//! CJK punctuation) and converts whole segments.

use zhconv::{zhconv, Variant};

use crate::config::TargetScript;

/// Pending text without any boundary is flushed once it grows past this many chars.
pub const MAX_PENDING_CHARS: usize = 24;
/// Chars kept back on a forced flush, so a phrase at the tail can still complete.
const HOLD_BACK_CHARS: usize = 4;

pub fn to_traditional(text: &str) -> String {
    zhconv(text, Variant::ZhHant)
}

/// Converts one complete piece of text to the configured output script.
pub fn convert(text: &str, target: TargetScript) -> String {
    match target {
        TargetScript::None => text.to_string(),
        TargetScript::Traditional => to_traditional(text),
    }
}

fn is_boundary(c: char) -> bool {
    c.is_whitespace()
        || c.is_ascii()
        || matches!(
            c,
            '，' | '。' | '！' | '？' | '、' | '：' | '；' | '「' | '」' | '『' | '』' | '（' | '）'
                | '《' | '》' | '…' | '．'
        )
}

/// Incremental converter for a stream of answer fragments.
///
/// Concatenating everything returned by `push` and `finish` gives the
/// converted answer.
#[derive(Debug, Clone)]
pub struct ScriptConverter {
    target: TargetScript,
    pending: String,
}

impl ScriptConverter {
    pub fn new(target: TargetScript) -> Self {
        Self {
            target,
            pending: String::new(),
        }
    }

    /// Feeds one fragment; returns converted text that is ready to emit, if any.
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        if self.target == TargetScript::None {
            return (!fragment.is_empty()).then(|| fragment.to_string());
        }
        self.pending.push_str(fragment);

        let split = match self.pending.char_indices().rev().find(|(_, c)| is_boundary(*c)) {
            Some((idx, c)) => idx + c.len_utf8(),
            None => {
                let len = self.pending.chars().count();
                if len <= MAX_PENDING_CHARS {
                    return None;
                }
                self.pending
                    .char_indices()
                    .nth(len - HOLD_BACK_CHARS)
                    .map(|(idx, _)| idx)
                    .unwrap_or(self.pending.len())
            }
        };

        let ready: String = self.pending.drain(..split).collect();
        (!ready.is_empty()).then(|| convert(&ready, self.target))
    }

    /// Converts whatever is still held back. Call once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(convert(&rest, self.target))
    }
}
