use super::grammar::{GLOBAL_GRAMMAR_CACHE, SUPPORTED_LANGUAGES};
use super::{SourceParser, SyntaxNode, SyntaxTree, TREE_DEPTH};
use crate::cache::{cache_key, ContentCache};
use std::sync::Arc;
use tracing::debug;
use tree_sitter::{Node, Parser};

/// Tree-sitter backed parser with a content-addressed parse cache.
#[derive(Debug)]
pub struct TreeSitterParser {
    cache: Arc<ContentCache<Arc<SyntaxTree>>>,
}

impl TreeSitterParser {
    /// Create a parser caching up to `cache_size` trees
    pub fn new(cache_size: usize) -> Self {
        Self {
            cache: Arc::new(ContentCache::new("parse-trees", cache_size)),
        }
    }

    /// Shared handle to the parse cache, for cleanup registration
    pub fn cache(&self) -> Arc<ContentCache<Arc<SyntaxTree>>> {
        self.cache.clone()
    }
}

impl SourceParser for TreeSitterParser {
    fn supports(&self, language: &str) -> bool {
        SUPPORTED_LANGUAGES.contains(&language)
    }

    fn supported_languages(&self) -> Vec<String> {
        SUPPORTED_LANGUAGES.iter().map(|l| l.to_string()).collect()
    }

    fn parse(&self, content: &str, language: &str) -> anyhow::Result<Arc<SyntaxTree>> {
        let key = cache_key(&[language.as_bytes(), content.as_bytes()]);
        if let Some(tree) = self.cache.get(&key) {
            debug!(language, "Parse cache hit");
            return Ok(tree);
        }

        let grammar = GLOBAL_GRAMMAR_CACHE.get(language)?;
        let mut parser = Parser::new();
        parser
            .set_language(&grammar)
            .map_err(|e| anyhow::anyhow!("Failed to set language {language}: {e}"))?;
        let tree = parser
            .parse(content, None)
            .ok_or_else(|| anyhow::anyhow!("tree-sitter produced no tree for {language}"))?;

        let root = tree.root_node();
        let owned = Arc::new(SyntaxTree {
            language: language.to_string(),
            root: convert(root, 0),
            has_errors: root.has_error(),
        });

        self.cache.put(key, owned.clone(), owned.approx_bytes());
        Ok(owned)
    }
}

fn convert(node: Node<'_>, depth: usize) -> SyntaxNode {
    let children = if depth < TREE_DEPTH {
        let mut cursor = node.walk();
        node.named_children(&mut cursor)
            .map(|child| convert(child, depth + 1))
            .collect()
    } else {
        Vec::new()
    };

    SyntaxNode {
        kind: node.kind().to_string(),
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        children,
    }
}
