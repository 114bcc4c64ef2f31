use super::{ChunkProducer, LineIndex, Span};
use crate::parse::SyntaxTree;
use anyhow::bail;

/// Splits at top-level balanced bracket blocks.
///
/// Lines outside any block are grouped until a blank line or the next block
/// closes. Unbalanced input is an error so the cascade can move on.
#[derive(Debug, Clone, Copy, Default)]
pub struct BracketChunker;

impl ChunkProducer for BracketChunker {
    fn name(&self) -> &str {
        "bracket-balanced"
    }

    fn produce(
        &self,
        content: &str,
        _language: Option<&str>,
        _tree: Option<&SyntaxTree>,
    ) -> anyhow::Result<Vec<Span>> {
        let index = LineIndex::new(content);
        let mut spans = Vec::new();
        let mut depth: i64 = 0;
        let mut chunk_start: Option<usize> = None;
        let mut opened = false;
        let mut offset = 0;

        for (line_no, line) in content.split_inclusive('\n').enumerate() {
            let line_start = offset;
            offset += line.len();

            if depth == 0 && line.trim().is_empty() {
                if let Some(start) = chunk_start.take() {
                    let kind = if opened { "block" } else { "statements" };
                    spans.push(index.span(start, line_start, kind));
                }
                opened = false;
                continue;
            }
            chunk_start.get_or_insert(line_start);

            for delta in bracket_deltas(line) {
                depth += delta;
                if delta > 0 {
                    opened = true;
                }
                if depth < 0 {
                    bail!("unbalanced closing bracket on line {}", line_no + 1);
                }
            }

            if depth == 0 && opened {
                if let Some(start) = chunk_start.take() {
                    spans.push(index.span(start, offset, "block"));
                }
                opened = false;
            }
        }

        if depth != 0 {
            bail!("{depth} bracket(s) left open at end of input");
        }
        if let Some(start) = chunk_start {
            let kind = if opened { "block" } else { "statements" };
            spans.push(index.span(start, content.len(), kind));
        }
        Ok(spans)
    }
}

/// +1 / -1 per bracket outside strings, char literals and `//` comments
fn bracket_deltas(line: &str) -> Vec<i64> {
    let chars: Vec<char> = line.chars().collect();
    let mut deltas = Vec::new();
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            match c {
                '\\' => i += 1,
                '"' => in_string = false,
                _ => {}
            }
        } else {
            match c {
                '"' => in_string = true,
                '/' if chars.get(i + 1) == Some(&'/') => break,
                '\'' if chars.get(i + 2) == Some(&'\'') => i += 2,
                '\'' if chars.get(i + 1) == Some(&'\\') && chars.get(i + 3) == Some(&'\'') => i += 3,
                '{' | '(' | '[' => deltas.push(1),
                '}' | ')' | ']' => deltas.push(-1),
                _ => {}
            }
        }
        i += 1;
    }
    deltas
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_level_blocks() {
        let source = "use std::io;\n\nfn a() {\n    b();\n}\n\nfn c() {\n}\n";
        let spans = BracketChunker.produce(source, None, None).unwrap();

        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].kind, "statements");
        assert_eq!(&source[spans[0].start_byte..spans[0].end_byte], "use std::io;\n");
        assert_eq!(spans[1].kind, "block");
        assert_eq!((spans[1].start_line, spans[1].end_line), (3, 5));
        assert_eq!((spans[2].start_line, spans[2].end_line), (7, 8));
        assert_eq!(spans[2].end_byte, source.len());
    }

    #[test]
    fn test_blank_lines_inside_block_do_not_split() {
        let source = "fn a() {\n\n    x();\n}\n";
        let spans = BracketChunker.produce(source, None, None).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!((spans[0].start_line, spans[0].end_line), (1, 4));
    }

    #[test]
    fn test_brackets_in_strings_and_comments_are_ignored() {
        let source = "fn a() {\n    let s = \"}\"; // }\n    let c = '{';\n}\n";
        let spans = BracketChunker.produce(source, None, None).unwrap();
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn test_unbalanced_input_is_an_error() {
        assert!(BracketChunker.produce("fn a() {\n", None, None).is_err());
        assert!(BracketChunker.produce("}\n", None, None).is_err());
    }
}
