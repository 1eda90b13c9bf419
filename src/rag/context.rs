//! Context assembly for avatar responses.

use crate::chunking::floor_char_boundary;
use crate::config::ContextSettings;
use crate::normalize::estimate_token_count;
use crate::vector_store::RankedChunk;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const SEPARATOR: &str = "\n\n---\n\n";

/// Partial chunks shorter than this are dropped rather than included.
const MIN_PARTIAL_CHARS: usize = 80;

/// Prompt-ready context built from ranked chunks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    pub text: String,
    /// Included chunk IDs, best match first.
    pub included_chunk_ids: Vec<Uuid>,
    /// Whether any ranked chunk was cut or dropped to fit the budget.
    pub truncated: bool,
    pub estimated_tokens: usize,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.included_chunk_ids.is_empty()
    }
}

/// Packs ranked chunks into a bounded context block.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    max_tokens: usize,
    include_source_labels: bool,
}

impl ContextAssembler {
    pub fn new(settings: &ContextSettings) -> Self {
        Self {
            max_tokens: settings.max_tokens,
            include_source_labels: settings.include_source_labels,
        }
    }

    /// Set the token budget.
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Assemble context from chunks already sorted best-first.
    ///
    /// Chunks are taken in order until the budget runs out. The chunk that
    /// overflows is cut to fit, and everything ranked below it is dropped.
    pub fn assemble(&self, chunks: &[RankedChunk]) -> AssembledContext {
        let budget = self.max_tokens.saturating_mul(4);
        let mut text = String::new();
        let mut included_chunk_ids = Vec::new();
        let mut truncated = false;

        for (i, ranked) in chunks.iter().enumerate() {
            let header = if self.include_source_labels {
                format!("[{}] {}\n", i + 1, ranked.source.label)
            } else {
                String::new()
            };
            let separator = if text.is_empty() { "" } else { SEPARATOR };
            let remaining = budget.saturating_sub(text.len() + separator.len() + header.len());
            let body = ranked.chunk.text.trim();

            if body.len() <= remaining {
                text.push_str(separator);
                text.push_str(&header);
                text.push_str(body);
                included_chunk_ids.push(ranked.chunk.id);
                continue;
            }

            truncated = true;
            let partial = cut_at_word(body, remaining);
            if partial.chars().count() >= MIN_PARTIAL_CHARS {
                text.push_str(separator);
                text.push_str(&header);
                text.push_str(partial);
                included_chunk_ids.push(ranked.chunk.id);
            }
            break;
        }

        AssembledContext {
            estimated_tokens: estimate_token_count(&text),
            text,
            included_chunk_ids,
            truncated,
        }
    }
}

/// Longest prefix of `text` within `max_bytes`, ending on a word boundary when possible.
fn cut_at_word(text: &str, max_bytes: usize) -> &str {
    let end = floor_char_boundary(text, max_bytes);
    let prefix = &text[..end];
    if end == text.len() {
        return prefix;
    }
    match prefix.rfind(char::is_whitespace) {
        Some(pos) if pos > end / 2 => prefix[..pos].trim_end(),
        _ => prefix,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceType;
    use crate::vector_store::tests::stored_chunk;
    use crate::vector_store::ContentSource;

    fn ranked(label: &str, text: &str, similarity: f32) -> RankedChunk {
        let source = ContentSource::new("owner", SourceType::YoutubeVideo, "vid", label);
        let mut chunk = stored_chunk(&source, 0, vec![1.0]);
        chunk.text = text.to_string();
        RankedChunk {
            chunk,
            source,
            similarity,
        }
    }

    fn assembler(max_tokens: usize) -> ContextAssembler {
        ContextAssembler::new(&ContextSettings::default()).with_max_tokens(max_tokens)
    }

    #[test]
    fn test_empty_input_gives_empty_context() {
        let context = assembler(4000).assemble(&[]);
        assert!(context.is_empty());
        assert_eq!(context.text, "");
        assert_eq!(context.estimated_tokens, 0);
        assert!(!context.truncated);
    }

    #[test]
    fn test_labels_and_order() {
        let chunks = vec![
            ranked("Morning routine", "I wake up at five.", 0.9),
            ranked("Gear review", "These shoes last 800km.", 0.8),
        ];
        let context = assembler(4000).assemble(&chunks);

        assert_eq!(
            context.text,
            "[1] Morning routine\nI wake up at five.\n\n---\n\n[2] Gear review\nThese shoes last 800km."
        );
        assert_eq!(context.included_chunk_ids, vec![chunks[0].chunk.id, chunks[1].chunk.id]);
        assert!(!context.truncated);
    }

    #[test]
    fn test_without_labels() {
        let settings = ContextSettings {
            include_source_labels: false,
            ..ContextSettings::default()
        };
        let context = ContextAssembler::new(&settings).assemble(&[ranked("Label", "Just the text.", 0.9)]);
        assert_eq!(context.text, "Just the text.");
    }

    #[test]
    fn test_budget_drops_lowest_ranked_first() {
        let long = "word ".repeat(200);
        let chunks = vec![
            ranked("First", long.trim(), 0.95),
            ranked("Second", long.trim(), 0.90),
            ranked("Third", long.trim(), 0.85),
        ];

        let context = assembler(300).assemble(&chunks);
        assert!(context.truncated);
        assert!(context.estimated_tokens <= 300);
        assert!(context.text.len() <= 1200);
        assert_eq!(context.included_chunk_ids[0], chunks[0].chunk.id);
        assert_eq!(context.included_chunk_ids.len(), 2);
        assert!(context.text.contains("[2] Second"));
        assert!(!context.text.contains("[3] Third"));
        // The cut lands on a word boundary.
        assert!(context.text.ends_with("word"));
    }

    #[test]
    fn test_tiny_remainder_is_dropped() {
        let chunks = vec![ranked("Only", &"x".repeat(1000), 0.9)];
        let context = assembler(10).assemble(&chunks);
        assert!(context.is_empty());
        assert!(context.truncated);
    }

    #[test]
    fn test_budget_respects_char_boundaries() {
        let chunks = vec![ranked("Emoji", &"🏃 run ".repeat(100), 0.9)];
        let context = assembler(60).assemble(&chunks);
        assert!(context.text.len() <= 240);
        assert!(!context.is_empty());
    }
}
