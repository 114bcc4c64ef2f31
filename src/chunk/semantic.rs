use super::{ChunkProducer, LineIndex, Span};
use crate::parse::SyntaxTree;

/// Groups blank-line separated paragraphs up to a target size.
#[derive(Debug, Clone)]
pub struct SemanticChunker {
    target_bytes: usize,
    kind: &'static str,
}

impl SemanticChunker {
    /// Large sections, for big or unstructured inputs
    pub fn coarse() -> Self {
        Self {
            target_bytes: 4096,
            kind: "section",
        }
    }

    /// Small blocks, for moderately structured code
    pub fn fine() -> Self {
        Self {
            target_bytes: 1024,
            kind: "block",
        }
    }

    /// Target group size in bytes
    pub fn target_bytes(&self) -> usize {
        self.target_bytes
    }
}

impl ChunkProducer for SemanticChunker {
    fn name(&self) -> &str {
        self.kind
    }

    fn produce(
        &self,
        content: &str,
        _language: Option<&str>,
        _tree: Option<&SyntaxTree>,
    ) -> anyhow::Result<Vec<Span>> {
        let index = LineIndex::new(content);
        let mut spans = Vec::new();
        let mut group: Option<(usize, usize)> = None;

        for (start, end) in paragraphs(content) {
            group = match group {
                None => Some((start, end)),
                Some((group_start, _)) if end - group_start <= self.target_bytes => {
                    Some((group_start, end))
                }
                Some((group_start, group_end)) => {
                    spans.push(index.span(group_start, group_end, self.kind));
                    Some((start, end))
                }
            };
        }
        if let Some((start, end)) = group {
            spans.push(index.span(start, end, self.kind));
        }
        Ok(spans)
    }
}

/// Byte ranges of runs of non-blank lines, trailing newline included
fn paragraphs(content: &str) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut current: Option<usize> = None;
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        if line.trim().is_empty() {
            if let Some(start) = current.take() {
                out.push((start, line_start));
            }
        } else {
            current.get_or_insert(line_start);
        }
    }
    if let Some(start) = current {
        out.push((start, content.len()));
    }
    out
}
