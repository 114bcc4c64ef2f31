// Parsing
//
// *L'Analyse* (The Parse) - Syntax trees handed to the AST chunk producer

#[cfg(feature = "parse")]
mod grammar;
#[cfg(feature = "parse")]
mod treesitter;

#[cfg(feature = "parse")]
pub use grammar::{GrammarCache, GLOBAL_GRAMMAR_CACHE, SUPPORTED_LANGUAGES};
#[cfg(feature = "parse")]
pub use treesitter::TreeSitterParser;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Depth of the owned tree kept per parse: top-level items, their bodies and
/// the members inside those bodies.
pub const TREE_DEPTH: usize = 3;

/// One named node of a parsed tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxNode {
    /// Grammar node kind
    pub kind: String,
    /// Start byte (inclusive)
    pub start_byte: usize,
    /// End byte (exclusive)
    pub end_byte: usize,
    /// First line, 1-based
    pub start_line: usize,
    /// Last line, 1-based
    pub end_line: usize,
    /// Named children, up to [`TREE_DEPTH`]
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    /// Number of nodes in this subtree
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(SyntaxNode::node_count).sum::<usize>()
    }
}

/// Owned, depth-limited syntax tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxTree {
    /// Language the tree was parsed as
    pub language: String,
    /// Root node
    pub root: SyntaxNode,
    /// Whether the parser had to recover from syntax errors
    pub has_errors: bool,
}

impl SyntaxTree {
    /// Top-level named nodes
    pub fn top_level(&self) -> &[SyntaxNode] {
        &self.root.children
    }

    /// Approximate heap footprint
    pub fn approx_bytes(&self) -> u64 {
        let nodes = self.root.node_count();
        (nodes * (std::mem::size_of::<SyntaxNode>() + 24)) as u64
    }
}

/// Turns source text into a [`SyntaxTree`].
pub trait SourceParser: Send + Sync {
    /// Whether a language can be parsed
    fn supports(&self, language: &str) -> bool;

    /// All parseable languages
    fn supported_languages(&self) -> Vec<String>;

    /// Parse content as the given language
    fn parse(&self, content: &str, language: &str) -> anyhow::Result<Arc<SyntaxTree>>;
}

/// Parser that supports nothing; used when the `parse` feature is off.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullParser;

impl SourceParser for NullParser {
    fn supports(&self, _language: &str) -> bool {
        false
    }

    fn supported_languages(&self) -> Vec<String> {
        Vec::new()
    }

    fn parse(&self, _content: &str, language: &str) -> anyhow::Result<Arc<SyntaxTree>> {
        anyhow::bail!("no parser available for {language}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(kind: &str) -> SyntaxNode {
        SyntaxNode {
            kind: kind.to_string(),
            start_byte: 0,
            end_byte: 1,
            start_line: 1,
            end_line: 1,
            children: Vec::new(),
        }
    }

    #[test]
    fn test_node_count() {
        let mut root = leaf("source_file");
        let mut item = leaf("impl_item");
        item.children.push(leaf("function_item"));
        root.children.push(item);
        root.children.push(leaf("function_item"));
        assert_eq!(root.node_count(), 4);

        let tree = SyntaxTree {
            language: "rust".into(),
            root,
            has_errors: false,
        };
        assert_eq!(tree.top_level().len(), 2);
        assert!(tree.approx_bytes() > 0);
    }

    #[test]
    fn test_null_parser_rejects() {
        let parser = NullParser;
        assert!(!parser.supports("rust"));
        assert!(parser.supported_languages().is_empty());
        assert!(parser.parse("fn a() {}", "rust").is_err());
    }
}
