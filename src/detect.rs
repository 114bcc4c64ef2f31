// Language Detection
//
// *La Détection* (The Detection) - Language and file-type detection for one unit

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Bytes inspected for NUL bytes and shebangs
pub const SNIFF_BYTES: usize = 8 * 1024;

/// Suffixes marking backup or derivative copies
pub const BACKUP_SUFFIXES: &[&str] = &["bak", "orig", "old", "swp", "tmp", "rej"];

/// How a detection result was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// File extension lookup
    Extension,
    /// `#!` interpreter line
    Shebang,
    /// Content heuristics
    ContentSniff,
    /// Nothing matched
    Fallback,
}

/// Broad category of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    /// Programming language source
    Code,
    /// Markdown document
    Markdown,
    /// HTML/XML style markup
    Markup,
    /// Structured data (JSON, YAML, TOML)
    Data,
    /// Plain text
    Text,
}

impl FileType {
    /// Prose-like documents whose brackets say nothing about code structure
    pub fn is_document(self) -> bool {
        matches!(self, FileType::Markdown | FileType::Markup | FileType::Text)
    }
}

/// Result of detecting one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Detected language, when known
    pub language: Option<String>,

    /// Confidence in `[0, 1]`
    pub confidence: f64,

    /// How the result was obtained
    pub method: DetectionMethod,

    /// Broad category
    pub file_type: FileType,
}

impl DetectionResult {
    /// Create a result, clamping confidence into `[0, 1]`
    pub fn new(
        language: Option<&str>,
        confidence: f64,
        method: DetectionMethod,
        file_type: FileType,
    ) -> Self {
        Self {
            language: language.map(str::to_string),
            confidence: confidence.clamp(0.0, 1.0),
            method,
            file_type,
        }
    }

    /// Result used when nothing is known about the content
    pub fn unknown() -> Self {
        Self::new(None, 0.1, DetectionMethod::Fallback, FileType::Text)
    }
}

/// Detects the language and file type of a unit.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Inspect a path and its content
    async fn detect(&self, path: &Path, content: &[u8]) -> anyhow::Result<DetectionResult>;
}

/// Extension, shebang and content-sniff detector.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtensionDetector;

impl ExtensionDetector {
    /// Create a new detector
    pub fn new() -> Self {
        Self
    }

    /// Detect without the async wrapper
    pub fn detect_sync(&self, path: &Path, content: &[u8]) -> anyhow::Result<DetectionResult> {
        let head = &content[..content.len().min(SNIFF_BYTES)];
        if head.contains(&0) {
            anyhow::bail!("binary content in {}", path.display());
        }

        if let Some((language, file_type)) = effective_extension(path).and_then(|ext| by_extension(&ext)) {
            return Ok(DetectionResult::new(
                language,
                0.95,
                DetectionMethod::Extension,
                file_type,
            ));
        }

        let text = String::from_utf8_lossy(head);
        if let Some(language) = by_shebang(&text) {
            return Ok(DetectionResult::new(
                Some(language),
                0.8,
                DetectionMethod::Shebang,
                FileType::Code,
            ));
        }

        if let Some(file_type) = sniff(&text) {
            return Ok(DetectionResult::new(
                None,
                0.3,
                DetectionMethod::ContentSniff,
                file_type,
            ));
        }

        Ok(DetectionResult::unknown())
    }
}

#[async_trait]
impl Detector for ExtensionDetector {
    async fn detect(&self, path: &Path, content: &[u8]) -> anyhow::Result<DetectionResult> {
        self.detect_sync(path, content)
    }
}

/// Whether the path names a backup or derivative copy
pub fn is_backup_path(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if name.ends_with('~') {
        return true;
    }
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| BACKUP_SUFFIXES.contains(&ext.as_str()))
}

/// Extension of the file, looking through backup suffixes (`a.rs.bak` is `rs`)
fn effective_extension(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy().to_string();
    let name = name.trim_end_matches('~');
    let mut parts: Vec<&str> = name.split('.').skip(1).collect();
    while parts
        .last()
        .is_some_and(|ext| BACKUP_SUFFIXES.contains(&ext.to_ascii_lowercase().as_str()))
    {
        parts.pop();
    }
    parts.last().map(|ext| ext.to_ascii_lowercase())
}

fn by_extension(ext: &str) -> Option<(Option<&'static str>, FileType)> {
    let code = |language| Some((Some(language), FileType::Code));
    match ext {
        "rs" => code("rust"),
        "py" | "pyi" => code("python"),
        "js" | "mjs" | "cjs" | "jsx" => code("javascript"),
        "ts" | "tsx" | "mts" | "cts" => code("typescript"),
        "go" => code("go"),
        "java" => code("java"),
        "c" | "h" => code("c"),
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => code("cpp"),
        "cs" => code("csharp"),
        "rb" => code("ruby"),
        "php" => code("php"),
        "sh" | "bash" | "zsh" => code("bash"),
        "lua" => code("lua"),
        "scala" | "sc" => code("scala"),
        "kt" | "kts" => code("kotlin"),
        "swift" => code("swift"),
        "md" | "markdown" => Some((Some("markdown"), FileType::Markdown)),
        "html" | "htm" | "vue" | "svelte" => Some((Some("html"), FileType::Markup)),
        "xml" | "svg" | "xhtml" => Some((Some("xml"), FileType::Markup)),
        "json" => Some((Some("json"), FileType::Data)),
        "yaml" | "yml" => Some((Some("yaml"), FileType::Data)),
        "toml" => Some((Some("toml"), FileType::Data)),
        "txt" | "text" | "rst" => Some((None, FileType::Text)),
        _ => None,
    }
}

fn by_shebang(text: &str) -> Option<&'static str> {
    let first = text.lines().next()?.strip_prefix("#!")?;
    let mut words = first.split_whitespace();
    let program = words.next()?;
    let program = if program.ends_with("/env") {
        words.find(|w| !w.starts_with('-'))?
    } else {
        program
    };
    let name = program.rsplit('/').next().unwrap_or(program);
    let name = name.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.');

    match name {
        "python" => Some("python"),
        "sh" | "bash" | "zsh" | "dash" => Some("bash"),
        "node" | "deno" => Some("javascript"),
        "ruby" => Some("ruby"),
        "php" => Some("php"),
        "lua" | "luajit" => Some("lua"),
        _ => None,
    }
}

fn sniff(text: &str) -> Option<FileType> {
    let trimmed = text.trim_start();
    let lower: String = trimmed.chars().take(64).collect::<String>().to_ascii_lowercase();
    if lower.starts_with("<?xml") || lower.starts_with("<!doctype html") || lower.starts_with("<html") {
        return Some(FileType::Markup);
    }
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Some(FileType::Data);
    }
    if text.lines().any(|line| line.starts_with("# ") || line.starts_with("## ")) {
        return Some(FileType::Markdown);
    }

    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return None;
    }
    let code_lines = lines
        .iter()
        .filter(|l| {
            let l = l.trim_end();
            l.ends_with(';') || l.ends_with('{') || l.ends_with('}') || l.ends_with(':')
        })
        .count();
    (code_lines * 4 >= lines.len()).then_some(FileType::Code)
}
