// Lazy-loaded grammar cache
//
// Grammars are loaded on first use and reused for the lifetime of the program.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::RwLock;
use tree_sitter::Language;

/// Languages with a bundled grammar
pub const SUPPORTED_LANGUAGES: &[&str] = &[
    "python",
    "javascript",
    "typescript",
    "go",
    "rust",
    "java",
    "cpp",
    "csharp",
    "ruby",
    "php",
    "c",
    "bash",
    "lua",
    "scala",
];

/// Thread-safe grammar cache keyed by language name
#[derive(Debug, Default)]
pub struct GrammarCache {
    grammars: RwLock<HashMap<String, Language>>,
}

impl GrammarCache {
    /// Create a new empty grammar cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a grammar, loading it on first access
    pub fn get(&self, language: &str) -> anyhow::Result<Language> {
        {
            let read_guard = self
                .grammars
                .read()
                .map_err(|e| anyhow::anyhow!("Grammar cache lock poisoned: {e}"))?;
            if let Some(grammar) = read_guard.get(language) {
                return Ok(grammar.clone());
            }
        }

        let mut write_guard = self
            .grammars
            .write()
            .map_err(|e| anyhow::anyhow!("Grammar cache lock poisoned: {e}"))?;

        // Another thread might have loaded it while we waited
        if let Some(grammar) = write_guard.get(language) {
            return Ok(grammar.clone());
        }

        let grammar = load(language)
            .ok_or_else(|| anyhow::anyhow!("no grammar bundled for {language}"))?;
        write_guard.insert(language.to_string(), grammar.clone());
        Ok(grammar)
    }

    /// Number of loaded grammars
    pub fn len(&self) -> usize {
        self.grammars.read().map(|g| g.len()).unwrap_or(0)
    }

    /// Whether no grammar has been loaded yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Global grammar cache instance
pub static GLOBAL_GRAMMAR_CACHE: Lazy<GrammarCache> = Lazy::new(GrammarCache::new);

fn load(language: &str) -> Option<Language> {
    let grammar: Language = match language {
        "python" => tree_sitter_python::LANGUAGE.into(),
        "javascript" => tree_sitter_javascript::LANGUAGE.into(),
        "typescript" => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        "go" => tree_sitter_go::LANGUAGE.into(),
        "rust" => tree_sitter_rust::LANGUAGE.into(),
        "java" => tree_sitter_java::LANGUAGE.into(),
        "cpp" => tree_sitter_cpp::LANGUAGE.into(),
        "csharp" => tree_sitter_c_sharp::LANGUAGE.into(),
        "ruby" => tree_sitter_ruby::LANGUAGE.into(),
        "php" => tree_sitter_php::LANGUAGE_PHP.into(),
        "c" => tree_sitter_c::LANGUAGE.into(),
        "bash" => tree_sitter_bash::LANGUAGE.into(),
        "lua" => tree_sitter_lua::LANGUAGE.into(),
        "scala" => tree_sitter_scala::LANGUAGE.into(),
        _ => return None,
    };
    Some(grammar)
}
