use super::{ChunkProducer, LineIndex, Span};
use crate::parse::SyntaxTree;

/// Fixed windows of lines. Never fails, so it anchors the fallback cascade.
#[derive(Debug, Clone, Copy)]
pub struct LineChunker {
    /// Lines per window
    pub lines_per_chunk: usize,
}

impl Default for LineChunker {
    fn default() -> Self {
        Self { lines_per_chunk: 40 }
    }
}

impl LineChunker {
    /// Create a chunker with a custom window
    pub fn new(lines_per_chunk: usize) -> Self {
        Self {
            lines_per_chunk: lines_per_chunk.max(1),
        }
    }
}

impl ChunkProducer for LineChunker {
    fn name(&self) -> &str {
        "lines"
    }

    fn produce(
        &self,
        content: &str,
        _language: Option<&str>,
        _tree: Option<&SyntaxTree>,
    ) -> anyhow::Result<Vec<Span>> {
        if content.is_empty() {
            return Ok(Vec::new());
        }

        let index = LineIndex::new(content);
        let total = index.line_count();
        let window = self.lines_per_chunk.max(1);

        let mut spans = Vec::with_capacity(total / window + 1);
        let mut line = 1;
        while line <= total {
            let last = (line + window - 1).min(total);
            let start_byte = index.line_start(line).unwrap_or(content.len());
            let end_byte = index.line_start(last + 1).unwrap_or(content.len());
            spans.push(Span {
                start_byte,
                end_byte,
                start_line: line,
                end_line: last,
                kind: "lines".to_string(),
            });
            line = last + 1;
        }
        Ok(spans)
    }
}
