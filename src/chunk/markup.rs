use super::{align_to_lines, ChunkProducer, Span};
use crate::parse::SyntaxTree;
use anyhow::bail;
use once_cell::sync::Lazy;
use regex::Regex;

static TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(/?)([A-Za-z][A-Za-z0-9:_.-]*)[^<>]*?(/?)>").expect("valid regex")
});

static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Deepest level considered when looking for siblings
const MAX_DEPTH: usize = 3;

/// Splits HTML/XML at the shallowest nesting level holding more than one
/// element.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupChunker;

#[derive(Debug, Clone, Copy)]
struct Element {
    depth: usize,
    start: usize,
    end: usize,
}

impl ChunkProducer for MarkupChunker {
    fn name(&self) -> &str {
        "markup"
    }

    fn produce(
        &self,
        content: &str,
        _language: Option<&str>,
        _tree: Option<&SyntaxTree>,
    ) -> anyhow::Result<Vec<Span>> {
        let elements = scan(content);
        if elements.is_empty() {
            bail!("no markup elements found");
        }

        let level = (0..=MAX_DEPTH)
            .find(|&depth| elements.iter().filter(|e| e.depth == depth).count() > 1)
            .or_else(|| elements.iter().map(|e| e.depth).min())
            .unwrap_or(0);

        let ranges = elements
            .iter()
            .filter(|e| e.depth == level)
            .map(|e| (e.start, e.end, "element".to_string()))
            .collect();
        Ok(align_to_lines(content, ranges))
    }
}

/// Closed elements with their nesting depth. Comments are blanked first so
/// commented-out tags do not count.
fn scan(content: &str) -> Vec<Element> {
    let blanked = COMMENT.replace_all(content, |caps: &regex::Captures<'_>| " ".repeat(caps[0].len()));

    let mut stack: Vec<(String, usize)> = Vec::new();
    let mut elements = Vec::new();

    for caps in TAG.captures_iter(&blanked) {
        let Some(whole) = caps.get(0) else { continue };
        let closing = &caps[1] == "/";
        let self_closing = &caps[3] == "/";
        let name = caps[2].to_ascii_lowercase();

        if closing {
            // Unclosed children of a closed element are dropped with it
            if let Some(pos) = stack.iter().rposition(|(open, _)| *open == name) {
                let start = stack[pos].1;
                stack.truncate(pos);
                elements.push(Element {
                    depth: pos,
                    start,
                    end: whole.end(),
                });
            }
        } else if self_closing || VOID_ELEMENTS.contains(&name.as_str()) {
            elements.push(Element {
                depth: stack.len(),
                start: whole.start(),
                end: whole.end(),
            });
        } else {
            stack.push((name, whole.start()));
        }
    }
    elements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_body_children() {
        let html = "<html>\n<head>\n<title>t</title>\n</head>\n<body>\n<p>a</p>\n</body>\n</html>\n";
        let spans = MarkupChunker.produce(html, Some("html"), None).unwrap();

        assert_eq!(spans.len(), 2);
        assert_eq!((spans[0].start_line, spans[0].end_line), (2, 4));
        assert_eq!((spans[1].start_line, spans[1].end_line), (5, 7));
    }

    #[test]
    fn test_siblings_on_one_line_merge() {
        let xml = "<root>\n<a/><b/>\n<c></c>\n</root>";
        let spans = MarkupChunker.produce(xml, Some("xml"), None).unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].start_line, 2);
        assert_eq!(spans[1].start_line, 3);
    }

    #[test]
    fn test_single_root_is_one_chunk() {
        let spans = MarkupChunker.produce("<note>hi</note>", Some("xml"), None).unwrap();
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn test_comments_and_void_elements() {
        let elements = scan("<!-- <x></x> --><br><img src=\"a\"><p></p>");
        assert_eq!(elements.len(), 3);
        assert!(elements.iter().all(|e| e.depth == 0));
    }

    #[test]
    fn test_plain_text_is_an_error() {
        assert!(MarkupChunker.produce("no tags here", None, None).is_err());
    }
}
