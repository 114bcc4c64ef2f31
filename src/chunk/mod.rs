// Chunk Production
//
// *Le Découpage* (The Chunking) - Span producers keyed by processing tier

mod ast;
mod bracket;
mod line;
mod markdown;
mod markup;
mod semantic;
mod source;

pub use ast::AstChunker;
pub use bracket::BracketChunker;
pub use line::LineChunker;
pub use markdown::MarkdownChunker;
pub use markup::MarkupChunker;
pub use semantic::SemanticChunker;
pub use source::SourceText;

use crate::parse::SyntaxTree;
use crate::selector::ProcessingTier;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Tag carried by the last-resort chunk covering the whole input
pub const EMERGENCY_TAG: &str = "emergency-single-chunk";

/// Tag carried by chunks produced on the fallback path
pub const FALLBACK_TAG: &str = "fallback";

/// A byte range proposed by a producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Start byte (inclusive)
    pub start_byte: usize,
    /// End byte (exclusive)
    pub end_byte: usize,
    /// First line, 1-based
    pub start_line: usize,
    /// Last line, 1-based, inclusive
    pub end_line: usize,
    /// What the span holds (function, section, lines)
    pub kind: String,
}

impl Span {
    /// Length in bytes
    pub fn len(&self) -> usize {
        self.end_byte.saturating_sub(self.start_byte)
    }

    /// Whether the span is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A finished chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk text
    pub content: String,
    /// Start byte (inclusive)
    pub start_byte: usize,
    /// End byte (exclusive)
    pub end_byte: usize,
    /// First line, 1-based
    pub start_line: usize,
    /// Last line, 1-based, inclusive
    pub end_line: usize,
    /// What the chunk holds
    pub kind: String,
    /// Tier that produced it; absent for the emergency chunk
    pub tier: Option<ProcessingTier>,
    /// Detected language
    pub language: Option<String>,
    /// blake3 of the chunk text
    pub content_hash: String,
    /// Free-form tags
    pub tags: Vec<String>,
}

impl Chunk {
    /// Materialize a span over `content`; `None` when the span is out of range
    /// or not on char boundaries
    pub fn from_span(
        span: &Span,
        content: &str,
        tier: ProcessingTier,
        language: Option<&str>,
    ) -> Option<Self> {
        let text = content.get(span.start_byte..span.end_byte)?;
        Some(Self {
            content: text.to_string(),
            start_byte: span.start_byte,
            end_byte: span.end_byte,
            start_line: span.start_line,
            end_line: span.end_line,
            kind: span.kind.clone(),
            tier: Some(tier),
            language: language.map(str::to_string),
            content_hash: blake3::hash(text.as_bytes()).to_hex().to_string(),
            tags: vec![tier.as_str().to_string()],
        })
    }

    /// One chunk spanning the whole raw input, tagged [`EMERGENCY_TAG`]
    pub fn emergency(source: &SourceText, language: Option<&str>) -> Self {
        let content = source.as_str();
        let index = LineIndex::new(content);
        Self {
            content: content.to_string(),
            start_byte: 0,
            end_byte: source.raw_len(),
            start_line: 1,
            end_line: index.line_count(),
            kind: "document".to_string(),
            tier: None,
            language: language.map(str::to_string),
            content_hash: blake3::hash(content.as_bytes()).to_hex().to_string(),
            tags: vec![EMERGENCY_TAG.to_string()],
        }
    }

    /// Whether a tag is present
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Byte offset to line number lookup.
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    /// Index the line starts of `content`
    pub fn new(content: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(content.match_indices('\n').map(|(i, _)| i + 1));
        if starts.len() > 1 && starts.last() == Some(&content.len()) {
            starts.pop();
        }
        Self { starts }
    }

    /// 1-based line containing `byte`
    pub fn line_of(&self, byte: usize) -> usize {
        self.starts.partition_point(|&start| start <= byte).max(1)
    }

    /// Number of lines (at least 1)
    pub fn line_count(&self) -> usize {
        self.starts.len()
    }

    /// Byte offset where a 1-based line starts
    pub fn line_start(&self, line: usize) -> Option<usize> {
        self.starts.get(line.checked_sub(1)?).copied()
    }

    /// Build a span for `start..end`
    pub fn span(&self, start_byte: usize, end_byte: usize, kind: &str) -> Span {
        let last = end_byte.saturating_sub(1).max(start_byte);
        Span {
            start_byte,
            end_byte,
            start_line: self.line_of(start_byte),
            end_line: self.line_of(last),
            kind: kind.to_string(),
        }
    }
}

/// Widen byte ranges to whole lines and merge ranges that share a line.
///
/// Keeps the first kind of a merged group. Line-aligned output never trips
/// the tracker's line-overlap check between siblings.
pub fn align_to_lines(content: &str, mut ranges: Vec<(usize, usize, String)>) -> Vec<Span> {
    let index = LineIndex::new(content);
    ranges.sort_by_key(|(start, end, _)| (*start, *end));

    let mut spans: Vec<Span> = Vec::with_capacity(ranges.len());
    for (start, end, kind) in ranges {
        let start_line = index.line_of(start);
        let end_line = index.line_of(end.saturating_sub(1).max(start));
        let start_byte = index.line_start(start_line).unwrap_or(start);
        let end_byte = index.line_start(end_line + 1).unwrap_or(content.len());

        if let Some(last) = spans.last_mut() {
            if start_byte < last.end_byte {
                last.end_byte = last.end_byte.max(end_byte);
                last.end_line = last.end_line.max(end_line);
                continue;
            }
        }
        spans.push(Span {
            start_byte,
            end_byte,
            start_line,
            end_line,
            kind,
        });
    }
    spans
}

/// Turns content into spans for one processing tier.
pub trait ChunkProducer: Send + Sync {
    /// Producer name for logs
    fn name(&self) -> &str;

    /// Propose spans over `content`; `tree` is present only for the AST tier
    fn produce(
        &self,
        content: &str,
        language: Option<&str>,
        tree: Option<&SyntaxTree>,
    ) -> anyhow::Result<Vec<Span>>;
}

/// Producers keyed by tier.
#[derive(Clone, Default)]
pub struct ProducerRegistry {
    producers: HashMap<ProcessingTier, Arc<dyn ChunkProducer>>,
}

impl ProducerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a default producer for every tier
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ProcessingTier::Ast, Arc::new(AstChunker::default()));
        registry.register(ProcessingTier::BracketBalanced, Arc::new(BracketChunker));
        registry.register(ProcessingTier::SemanticCoarse, Arc::new(SemanticChunker::coarse()));
        registry.register(ProcessingTier::SemanticFine, Arc::new(SemanticChunker::fine()));
        registry.register(ProcessingTier::LineBased, Arc::new(LineChunker::default()));
        registry.register(ProcessingTier::Markdown, Arc::new(MarkdownChunker));
        registry.register(ProcessingTier::Markup, Arc::new(MarkupChunker));
        registry
    }

    /// Register or replace the producer for a tier
    pub fn register(&mut self, tier: ProcessingTier, producer: Arc<dyn ChunkProducer>) {
        self.producers.insert(tier, producer);
    }

    /// Producer for a tier
    pub fn get(&self, tier: ProcessingTier) -> Option<Arc<dyn ChunkProducer>> {
        self.producers.get(&tier).cloned()
    }

    /// Tiers with a registered producer
    pub fn tiers(&self) -> Vec<ProcessingTier> {
        self.producers.keys().copied().collect()
    }
}

impl std::fmt::Debug for ProducerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerRegistry")
            .field("tiers", &self.tiers())
            .finish()
    }
}
