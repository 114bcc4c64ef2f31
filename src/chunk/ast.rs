use super::{align_to_lines, ChunkProducer, Span};
use crate::parse::{SyntaxNode, SyntaxTree};
use anyhow::{anyhow, bail};

/// One chunk per top-level syntax node.
///
/// Leading comments attach to the node that follows them. Nodes larger than
/// `max_node_bytes` are split into their members when the node has a body.
#[derive(Debug, Clone, Copy)]
pub struct AstChunker {
    /// Size above which a node is split into members
    pub max_node_bytes: usize,
}

impl Default for AstChunker {
    fn default() -> Self {
        Self {
            max_node_bytes: 4096,
        }
    }
}

impl ChunkProducer for AstChunker {
    fn name(&self) -> &str {
        "ast"
    }

    fn produce(
        &self,
        content: &str,
        _language: Option<&str>,
        tree: Option<&SyntaxTree>,
    ) -> anyhow::Result<Vec<Span>> {
        let tree = tree.ok_or_else(|| anyhow!("AST chunking needs a parse tree"))?;
        if tree.has_errors {
            bail!("{} source has syntax errors", tree.language);
        }

        let mut ranges: Vec<(usize, usize, String)> = Vec::new();
        let mut pending_comment: Option<(usize, usize)> = None;

        for node in tree.top_level() {
            if node.kind.contains("comment") {
                let start = pending_comment.map_or(node.start_byte, |(start, _)| start);
                pending_comment = Some((start, node.end_byte));
                continue;
            }
            let start = pending_comment.take().map_or(node.start_byte, |(start, _)| start);

            match members(node) {
                Some(body) if node.end_byte - node.start_byte > self.max_node_bytes => {
                    let header = content
                        .get(start..body[0].start_byte)
                        .map_or(0, |text| text.trim_end().len());
                    if header > 0 {
                        ranges.push((start, start + header, format!("{}_header", node.kind)));
                    }
                    for member in body {
                        ranges.push((member.start_byte, member.end_byte, member.kind.clone()));
                    }
                }
                _ => ranges.push((start, node.end_byte, node.kind.clone())),
            }
        }
        if let Some((start, end)) = pending_comment {
            ranges.push((start, end, "comment".to_string()));
        }

        ranges.retain(|(start, end, _)| end > start && *end <= content.len());
        if ranges.is_empty() {
            bail!("no top-level syntax nodes");
        }
        Ok(align_to_lines(content, ranges))
    }
}

/// Members of the node's body: the child with the most children, when it
/// has at least two
fn members(node: &SyntaxNode) -> Option<&[SyntaxNode]> {
    let body = node.children.iter().max_by_key(|child| child.children.len())?;
    (body.children.len() >= 2).then_some(body.children.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::LineIndex;

    fn node(content: &str, kind: &str, text: &str, children: Vec<SyntaxNode>) -> SyntaxNode {
        let start = content.find(text).unwrap();
        let end = start + text.len();
        let index = LineIndex::new(content);
        SyntaxNode {
            kind: kind.to_string(),
            start_byte: start,
            end_byte: end,
            start_line: index.line_of(start),
            end_line: index.line_of(end - 1),
            children,
        }
    }

    fn tree(content: &str, top: Vec<SyntaxNode>, has_errors: bool) -> SyntaxTree {
        SyntaxTree {
            language: "rust".to_string(),
            root: SyntaxNode {
                kind: "source_file".to_string(),
                start_byte: 0,
                end_byte: content.len(),
                start_line: 1,
                end_line: LineIndex::new(content).line_count(),
                children: top,
            },
            has_errors,
        }
    }

    #[test]
    fn test_comment_attaches_to_next_node() {
        let src = "// doc\nfn a() {}\n\nfn b() {}\n";
        let t = tree(
            src,
            vec![
                node(src, "line_comment", "// doc", vec![]),
                node(src, "function_item", "fn a() {}", vec![]),
                node(src, "function_item", "fn b() {}", vec![]),
            ],
            false,
        );
        let spans = AstChunker::default().produce(src, Some("rust"), Some(&t)).unwrap();

        assert_eq!(spans.len(), 2);
        assert_eq!(&src[spans[0].start_byte..spans[0].end_byte], "// doc\nfn a() {}\n");
        assert_eq!(spans[0].kind, "function_item");
        assert_eq!(spans[1].start_line, 4);
    }

    #[test]
    fn test_large_node_splits_into_members() {
        let src = "impl A {\n    fn one() {}\n    fn two() {}\n}\n";
        let body = node(
            src,
            "declaration_list",
            "{\n    fn one() {}\n    fn two() {}\n}",
            vec![
                node(src, "function_item", "fn one() {}", vec![]),
                node(src, "function_item", "fn two() {}", vec![]),
            ],
        );
        let imp = node(
            src,
            "impl_item",
            src.trim_end(),
            vec![node(src, "type_identifier", "A", vec![]), body],
        );
        let t = tree(src, vec![imp], false);

        let spans = AstChunker { max_node_bytes: 16 }
            .produce(src, Some("rust"), Some(&t))
            .unwrap();
        let kinds: Vec<&str> = spans.iter().map(|s| s.kind.as_str()).collect();
        assert_eq!(kinds, vec!["impl_item_header", "function_item", "function_item"]);
        assert_eq!((spans[2].start_line, spans[2].end_line), (3, 3));

        let whole = AstChunker::default().produce(src, Some("rust"), Some(&t)).unwrap();
        assert_eq!(whole.len(), 1);
    }

    #[test]
    fn test_errors_and_missing_tree() {
        let src = "fn a() {";
        let t = tree(src, vec![node(src, "ERROR", "fn a() {", vec![])], true);
        assert!(AstChunker::default().produce(src, Some("rust"), Some(&t)).is_err());
        assert!(AstChunker::default().produce(src, Some("rust"), None).is_err());
    }

    #[cfg(feature = "parse")]
    #[test]
    fn test_with_tree_sitter() {
        use crate::parse::{SourceParser, TreeSitterParser};

        let src = "use std::fmt;\n\n/// Greets\nfn greet() {}\n\nstruct S;\n";
        let t = TreeSitterParser::new(4).parse(src, "rust").unwrap();
        let spans = AstChunker::default().produce(src, Some("rust"), Some(&t)).unwrap();

        assert_eq!(spans.len(), 3);
        assert_eq!(spans[1].start_line, 3);
        assert_eq!(spans[1].kind, "function_item");
    }
}
