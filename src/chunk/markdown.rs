use super::{ChunkProducer, LineIndex, Span};
use crate::parse::SyntaxTree;

/// One section per ATX heading; text before the first heading is its own
/// section. Headings inside fenced code are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownChunker;

impl ChunkProducer for MarkdownChunker {
    fn name(&self) -> &str {
        "markdown"
    }

    fn produce(
        &self,
        content: &str,
        _language: Option<&str>,
        _tree: Option<&SyntaxTree>,
    ) -> anyhow::Result<Vec<Span>> {
        let index = LineIndex::new(content);
        let mut spans = Vec::new();
        let mut section_start = 0;
        let mut section_kind = "preamble";
        let mut fence: Option<&str> = None;
        let mut offset = 0;

        for line in content.split_inclusive('\n') {
            let line_start = offset;
            offset += line.len();
            let trimmed = line.trim_start();

            if let Some(marker) = fence {
                if trimmed.starts_with(marker) {
                    fence = None;
                }
                continue;
            }
            if trimmed.starts_with("```") {
                fence = Some("```");
                continue;
            }
            if trimmed.starts_with("~~~") {
                fence = Some("~~~");
                continue;
            }

            if is_heading(line) {
                push_section(&mut spans, &index, content, section_start, line_start, section_kind);
                section_start = line_start;
                section_kind = "section";
            }
        }
        push_section(&mut spans, &index, content, section_start, content.len(), section_kind);
        Ok(spans)
    }
}

fn push_section(
    spans: &mut Vec<Span>,
    index: &LineIndex,
    content: &str,
    start: usize,
    end: usize,
    kind: &str,
) {
    if content[start..end].trim().is_empty() {
        return;
    }
    spans.push(index.span(start, end, kind));
}

/// `#` through `######` followed by a space or end of line
fn is_heading(line: &str) -> bool {
    let hashes = line.bytes().take_while(|&b| b == b'#').count();
    if !(1..=6).contains(&hashes) {
        return false;
    }
    matches!(line.as_bytes().get(hashes), None | Some(b' ' | b'\t' | b'\n' | b'\r'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_by_heading() {
        let doc = "intro text\n\n# One\nbody\n\n## Two\nmore\n";
        let spans = MarkdownChunker.produce(doc, None, None).unwrap();

        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].kind, "preamble");
        assert_eq!(&doc[spans[1].start_byte..spans[1].end_byte], "# One\nbody\n\n");
        assert_eq!(spans[2].start_line, 6);
        assert_eq!(spans[2].end_byte, doc.len());
    }

    #[test]
    fn test_headings_in_fences_are_ignored() {
        let doc = "# Title\n```sh\n# not a heading\n```\ntext\n";
        let spans = MarkdownChunker.produce(doc, None, None).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].kind, "section");
    }

    #[test]
    fn test_heading_rules() {
        assert!(is_heading("# a\n"));
        assert!(is_heading("###"));
        assert!(!is_heading("#hashtag"));
        assert!(!is_heading("####### seven"));
        assert!(!is_heading("text # a"));
    }

    #[test]
    fn test_blank_preamble_is_skipped() {
        let spans = MarkdownChunker.produce("\n\n# A\nb\n", None, None).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start_line, 3);
    }
}
