// Strategy Selection
//
// *Le Sélecteur* (The Selector) - Pure decision from detection and file features to a processing tier

use crate::config::SelectorConfig;
use crate::detect::{is_backup_path, DetectionResult, FileType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// How a unit is turned into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingTier {
    /// Syntax-tree nodes from a real parser
    Ast,
    /// Top-level balanced bracket blocks
    BracketBalanced,
    /// Large blank-line separated sections
    SemanticCoarse,
    /// Small blank-line separated blocks
    SemanticFine,
    /// Fixed windows of lines
    LineBased,
    /// Heading-delimited markdown sections
    Markdown,
    /// Top-level markup elements
    Markup,
}

impl ProcessingTier {
    /// Stable name used in logs and tags
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingTier::Ast => "ast",
            ProcessingTier::BracketBalanced => "bracket_balanced",
            ProcessingTier::SemanticCoarse => "semantic_coarse",
            ProcessingTier::SemanticFine => "semantic_fine",
            ProcessingTier::LineBased => "line_based",
            ProcessingTier::Markdown => "markdown",
            ProcessingTier::Markup => "markup",
        }
    }
}

impl fmt::Display for ProcessingTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selected tier and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyDecision {
    /// Chosen tier
    pub tier: ProcessingTier,

    /// Human-readable reason
    pub rationale: String,
}

impl StrategyDecision {
    fn new(tier: ProcessingTier, rationale: impl Into<String>) -> Self {
        Self {
            tier,
            rationale: rationale.into(),
        }
    }
}

/// Structural profile of one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileFeatures {
    /// Content length in bytes
    pub size_bytes: usize,

    /// Number of lines
    pub line_count: usize,

    /// Backup or derivative copy (`.bak`, `.orig`, `~`)
    pub is_backup: bool,

    /// Fraction of non-blank lines carrying structural punctuation or indentation
    pub structure_score: f64,

    /// Every bracket kind opens and closes the same number of times
    pub brackets_balanced: bool,

    /// Brackets present and balanced, or indentation-structured
    pub is_structured: bool,

    /// Structured with a high structure score
    pub is_highly_structured: bool,

    /// Structure score in the moderate band or above
    pub is_moderately_structured: bool,

    /// Reads like source code (statement terminators, keywords)
    pub is_code_like: bool,
}

const HIGH_STRUCTURE: f64 = 0.6;
const MODERATE_STRUCTURE: f64 = 0.3;

const CODE_KEYWORDS: &[&str] = &[
    "fn ", "def ", "function ", "class ", "struct ", "impl ", "return ", "import ", "package ",
    "let ", "const ", "var ", "pub ", "func ", "#include",
];

impl FileFeatures {
    /// Derive the profile from a path and its text
    pub fn analyze(path: &Path, content: &str) -> Self {
        let mut brackets = [0i64; 3];
        for c in content.chars() {
            match c {
                '{' => brackets[0] += 1,
                '}' => brackets[0] -= 1,
                '(' => brackets[1] += 1,
                ')' => brackets[1] -= 1,
                '[' => brackets[2] += 1,
                ']' => brackets[2] -= 1,
                _ => {}
            }
        }
        let has_brackets = content.contains(['{', '(', '[']);
        let brackets_balanced = brackets.iter().all(|&depth| depth == 0);

        let non_blank: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        let structural = non_blank
            .iter()
            .filter(|line| {
                let indented = line.starts_with(' ') || line.starts_with('\t');
                indented || line.contains(['{', '}', '(', ')', ';', ':'])
            })
            .count();
        let indented = non_blank
            .iter()
            .filter(|line| line.starts_with(' ') || line.starts_with('\t'))
            .count();
        let structure_score = if non_blank.is_empty() {
            0.0
        } else {
            structural as f64 / non_blank.len() as f64
        };

        let indentation_structured = !non_blank.is_empty() && indented * 5 >= non_blank.len();
        let is_structured = (has_brackets && brackets_balanced) || indentation_structured;

        let keyword_hits = non_blank
            .iter()
            .filter(|line| {
                let line = line.trim_start();
                CODE_KEYWORDS.iter().any(|kw| line.starts_with(kw))
            })
            .count();
        let terminated = non_blank
            .iter()
            .filter(|line| line.trim_end().ends_with([';', '{', '}', ':']))
            .count();
        let is_code_like = keyword_hits > 0 || (!non_blank.is_empty() && terminated * 4 >= non_blank.len());

        Self {
            size_bytes: content.len(),
            line_count: content.lines().count(),
            is_backup: is_backup_path(path),
            structure_score,
            brackets_balanced,
            is_structured,
            is_highly_structured: is_structured && structure_score >= HIGH_STRUCTURE,
            is_moderately_structured: structure_score >= MODERATE_STRUCTURE,
            is_code_like,
        }
    }
}

/// Chooses a processing tier from detection and features.
#[derive(Debug, Clone)]
pub struct StrategySelector {
    config: SelectorConfig,
    ast_languages: HashSet<String>,
}

impl StrategySelector {
    /// Create a selector; `ast_languages` lists languages with AST-tier support
    pub fn new<I, S>(config: SelectorConfig, ast_languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            config,
            ast_languages: ast_languages.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the AST tier is available for a language
    pub fn supports_ast(&self, language: Option<&str>) -> bool {
        language.is_some_and(|language| self.ast_languages.contains(language))
    }

    /// Apply the selection rules in priority order
    pub fn decide(&self, detection: &DetectionResult, features: &FileFeatures) -> StrategyDecision {
        use ProcessingTier::*;

        if detection.confidence < self.config.min_confidence {
            return StrategyDecision::new(
                LineBased,
                format!(
                    "detection confidence {:.2} below {:.2}",
                    detection.confidence, self.config.min_confidence
                ),
            );
        }
        if features.is_backup {
            return StrategyDecision::new(BracketBalanced, "backup or derivative file");
        }
        if features.size_bytes < self.config.small_file_bytes {
            return StrategyDecision::new(
                LineBased,
                format!("{} bytes is below the small-file floor", features.size_bytes),
            );
        }
        if features.size_bytes > self.config.large_file_bytes {
            return StrategyDecision::new(
                SemanticCoarse,
                format!("{} bytes is above the large-file ceiling", features.size_bytes),
            );
        }

        // Brackets in prose say nothing about code structure
        let structured = features.is_structured && !detection.file_type.is_document();
        let ast = self.supports_ast(detection.language.as_deref());

        if structured && features.is_highly_structured && ast {
            return StrategyDecision::new(Ast, "highly structured with parser support");
        }
        if structured && !ast {
            return StrategyDecision::new(BracketBalanced, "structured without parser support");
        }
        if features.is_moderately_structured && features.is_code_like && !detection.file_type.is_document() {
            return StrategyDecision::new(SemanticFine, "moderately structured code");
        }
        match detection.file_type {
            FileType::Markdown => StrategyDecision::new(Markdown, "markdown document"),
            FileType::Markup => StrategyDecision::new(Markup, "markup document"),
            _ => StrategyDecision::new(SemanticCoarse, "default"),
        }
    }
}
