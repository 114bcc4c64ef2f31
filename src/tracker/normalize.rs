// Text normalization before content hashing
//
// Each step is a pure `&str -> String` transform. `normalize` applies them in
// the order of `TRANSFORMS`.

use once_cell::sync::Lazy;
use regex::Regex;

/// Spaces substituted for one tab
pub const TAB_WIDTH: usize = 4;

/// Line comment markers stripped before hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommentSyntax {
    /// `//` comments, whole-line and trailing
    pub slashes: bool,
    /// `#` followed by whitespace or end of line
    pub hash: bool,
    /// `--` comments
    pub dashes: bool,
}

impl CommentSyntax {
    /// Every marker, for content of unknown language
    pub const ANY: Self = Self {
        slashes: true,
        hash: true,
        dashes: true,
    };

    /// No markers. Headings and rules in prose are content.
    pub const NONE: Self = Self {
        slashes: false,
        hash: false,
        dashes: false,
    };

    /// Markers used by a detected language
    pub fn for_language(language: Option<&str>) -> Self {
        let Some(language) = language else {
            return Self::ANY;
        };
        let (slashes, hash, dashes) = match language {
            "markdown" | "html" | "xml" | "json" => return Self::NONE,
            "python" | "ruby" | "bash" | "yaml" | "toml" => (false, true, false),
            "php" => (true, true, false),
            "lua" => (false, false, true),
            _ => (true, false, false),
        };
        Self {
            slashes,
            hash,
            dashes,
        }
    }
}

/// A named normalization step.
pub type Transform = (&'static str, fn(&str, CommentSyntax) -> String);

/// The normalization pipeline, in application order.
pub const TRANSFORMS: &[Transform] = &[
    ("strip_trailing_whitespace", |text: &str, _: CommentSyntax| strip_trailing_whitespace(text)),
    ("unify_tabs", |text: &str, _: CommentSyntax| unify_tabs(text)),
    ("collapse_blank_lines", |text: &str, _: CommentSyntax| collapse_blank_lines(text)),
    ("strip_line_comments", strip_line_comments),
    ("unify_quotes", |text: &str, _: CommentSyntax| unify_quotes(text)),
    ("collapse_whitespace", |text: &str, _: CommentSyntax| collapse_whitespace(text)),
];

static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").expect("valid regex"));

static SLASH_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*//[^\n]*$").expect("valid regex"));

// `#` needs whitespace or end of line after it so `#include` survives
static HASH_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*#(?:[ \t][^\n]*)?$").expect("valid regex"));

static DASH_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*--[^\n]*$").expect("valid regex"));

// Trailing `//` comments need leading whitespace so `http://` survives
static TRAILING_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)[ \t]+//[^\n]*$").expect("valid regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Remove whitespace at the end of every line
pub fn strip_trailing_whitespace(text: &str) -> String {
    text.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace tabs with spaces
pub fn unify_tabs(text: &str) -> String {
    text.replace('\t', &" ".repeat(TAB_WIDTH))
}

/// Remove empty lines
pub fn collapse_blank_lines(text: &str) -> String {
    BLANK_LINES.replace_all(text, "\n").into_owned()
}

/// Remove single-line comments of the given syntax
pub fn strip_line_comments(text: &str, syntax: CommentSyntax) -> String {
    let mut text = text.to_string();
    if syntax.slashes {
        text = SLASH_LINE.replace_all(&text, "").into_owned();
        text = TRAILING_COMMENT.replace_all(&text, "").into_owned();
    }
    if syntax.hash {
        text = HASH_LINE.replace_all(&text, "").into_owned();
    }
    if syntax.dashes {
        text = DASH_LINE.replace_all(&text, "").into_owned();
    }
    text
}

/// Map single quotes and backticks to double quotes
pub fn unify_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\'' | '`' => '"',
            other => other,
        })
        .collect()
}

/// Collapse runs of whitespace to one space and trim the ends
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Apply every transform in order
pub fn normalize(text: &str, syntax: CommentSyntax) -> String {
    TRANSFORMS
        .iter()
        .fold(text.to_string(), |acc, (_, transform)| transform(&acc, syntax))
}
