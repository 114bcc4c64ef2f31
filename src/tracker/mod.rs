// Node Tracking
//
// *Le Pisteur* (The Tracker) - Content-addressed dedup of chunk spans within one pass

mod normalize;
mod similarity;

pub use normalize::{normalize, CommentSyntax, Transform, TRANSFORMS};
pub use similarity::{levenshtein_distance, similarity_ratio, similarity_upper_bound};

use crate::chunk::Span;
use crate::config::TrackerConfig;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

/// Normalized texts longer than this are only matched by exact hash.
pub const MAX_FUZZY_CHARS: usize = 4_096;

/// Width of one similarity group in normalized chars.
pub const SIMILARITY_BUCKET_CHARS: usize = 64;

/// A span identified by its normalized content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedNode {
    /// blake3 of content hash, kind and byte range
    pub id: String,

    /// Syntactic kind (function, section, block)
    pub kind: String,

    /// Start byte offset (inclusive)
    pub start_byte: usize,

    /// End byte offset (exclusive)
    pub end_byte: usize,

    /// First line (1-based)
    pub start_line: usize,

    /// Last line (1-based, inclusive)
    pub end_line: usize,

    /// blake3 of the normalized text
    pub content_hash: String,

    /// Kind plus normalized-length bucket
    pub similarity_group: String,

    #[serde(skip)]
    normalized: Arc<str>,
    #[serde(skip)]
    normalized_chars: usize,
}

impl TrackedNode {
    /// Build a node from a span over `content`.
    ///
    /// Out-of-range or non-boundary offsets hash as empty text.
    pub fn from_span(span: &Span, content: &str, comments: CommentSyntax) -> Self {
        let text = content.get(span.start_byte..span.end_byte).unwrap_or_default();
        Self::with_comments(
            &span.kind,
            (span.start_byte, span.end_byte),
            (span.start_line, span.end_line),
            text,
            comments,
        )
    }

    /// Build a node from raw text and its location, stripping every comment style
    pub fn new(
        kind: &str,
        start_byte: usize,
        end_byte: usize,
        start_line: usize,
        end_line: usize,
        text: &str,
    ) -> Self {
        Self::with_comments(
            kind,
            (start_byte, end_byte),
            (start_line, end_line),
            text,
            CommentSyntax::ANY,
        )
    }

    fn with_comments(
        kind: &str,
        (start_byte, end_byte): (usize, usize),
        (start_line, end_line): (usize, usize),
        text: &str,
        comments: CommentSyntax,
    ) -> Self {
        let normalized: Arc<str> = Arc::from(normalize(text, comments));
        let normalized_chars = normalized.chars().count();
        let content_hash = blake3::hash(normalized.as_bytes()).to_hex().to_string();

        let mut hasher = blake3::Hasher::new();
        hasher.update(content_hash.as_bytes());
        hasher.update(kind.as_bytes());
        hasher.update(&(start_byte as u64).to_le_bytes());
        hasher.update(&(end_byte as u64).to_le_bytes());
        let id = hasher.finalize().to_hex().to_string();

        Self {
            id,
            kind: kind.to_string(),
            start_byte,
            end_byte,
            start_line,
            end_line,
            similarity_group: similarity_group(kind, normalized_chars / SIMILARITY_BUCKET_CHARS),
            content_hash,
            normalized,
            normalized_chars,
        }
    }

    /// Normalized text used for hashing and fuzzy matching
    pub fn normalized_text(&self) -> &str {
        &self.normalized
    }

    /// Whether byte or line ranges intersect
    pub fn overlaps(&self, other: &TrackedNode) -> bool {
        let bytes = self.start_byte < other.end_byte && other.start_byte < self.end_byte;
        let lines = self.start_line <= other.end_line && other.start_line <= self.end_line;
        bytes || lines
    }
}

fn similarity_group(kind: &str, bucket: usize) -> String {
    format!("{kind}:{bucket}")
}

/// Counters exposed by the tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerStats {
    /// Distinct nodes ever marked
    pub total_tracked: u64,
    /// Nodes currently marked and resident
    pub used_count: usize,
    /// Repeated marks of an already-marked node
    pub reuse_count: u64,
    /// `is_used` answers decided by fuzzy matching
    pub similarity_hits: u64,
    /// Marks landing in a non-empty content-hash bucket
    pub hash_collisions: u64,
    /// Nodes dropped by the LRU bound
    pub evictions: u64,
}

/// Verdict of [`NodeTracker::claim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The span was new and is now marked
    Accepted,
    /// Same or near-same content was already claimed
    Duplicate,
    /// The range intersects an already-claimed span
    Overlap,
}

#[derive(Debug)]
struct Entry {
    node: TrackedNode,
    reuse: u32,
}

/// Bounded dedup index over the spans claimed in one chunking pass.
///
/// The LRU store and the hash and similarity-group indices are always updated
/// together, so an evicted node leaves no index entry behind.
#[derive(Debug)]
pub struct NodeTracker {
    similarity_threshold: f64,
    entries: LruCache<String, Entry>,
    by_hash: HashMap<String, HashSet<String>>,
    by_group: HashMap<String, HashSet<String>>,
    stats: TrackerStats,
}

impl NodeTracker {
    /// Create a tracker from configuration
    pub fn new(config: &TrackerConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            similarity_threshold: config.similarity_threshold,
            entries: LruCache::new(capacity),
            by_hash: HashMap::new(),
            by_group: HashMap::new(),
            stats: TrackerStats::default(),
        }
    }

    /// Mark a node as used.
    ///
    /// Returns false when the node was already marked, in which case only the
    /// reuse counter moves.
    pub fn mark_used(&mut self, node: &TrackedNode) -> bool {
        if let Some(entry) = self.entries.get_mut(&node.id) {
            entry.reuse += 1;
            self.stats.reuse_count += 1;
            return false;
        }

        let bucket = self.by_hash.entry(node.content_hash.clone()).or_default();
        if !bucket.is_empty() {
            self.stats.hash_collisions += 1;
        }
        bucket.insert(node.id.clone());
        self.by_group
            .entry(node.similarity_group.clone())
            .or_default()
            .insert(node.id.clone());

        let entry = Entry {
            node: node.clone(),
            reuse: 0,
        };
        if let Some((evicted_id, evicted)) = self.entries.push(node.id.clone(), entry) {
            if evicted_id != node.id {
                self.unindex(&evicted.node);
                self.stats.evictions += 1;
                debug!(id = %evicted_id, "Evicted tracked node");
            }
        }

        self.stats.total_tracked += 1;
        true
    }

    /// Whether this node, or one with near-identical normalized content, is marked
    pub fn is_used(&mut self, node: &TrackedNode) -> bool {
        if self.entries.contains(&node.id) {
            return true;
        }

        if self
            .by_hash
            .get(&node.content_hash)
            .is_some_and(|bucket| !bucket.is_empty())
        {
            self.stats.similarity_hits += 1;
            return true;
        }

        if self.fuzzy_match(node) {
            self.stats.similarity_hits += 1;
            return true;
        }
        false
    }

    /// Compare against every group whose lengths can reach the threshold
    fn fuzzy_match(&self, node: &TrackedNode) -> bool {
        let len = node.normalized_chars;
        if len > MAX_FUZZY_CHARS {
            return false;
        }

        let threshold = self.similarity_threshold;
        let shortest = (len as f64 * threshold).floor() as usize;
        let longest = if threshold > 0.0 {
            ((len as f64 / threshold).ceil() as usize).min(MAX_FUZZY_CHARS)
        } else {
            MAX_FUZZY_CHARS
        };

        (shortest / SIMILARITY_BUCKET_CHARS..=longest / SIMILARITY_BUCKET_CHARS)
            .filter_map(|bucket| self.by_group.get(&similarity_group(&node.kind, bucket)))
            .flatten()
            .filter_map(|id| self.entries.peek(id))
            .any(|entry| {
                let other_len = entry.node.normalized_chars;
                other_len <= MAX_FUZZY_CHARS
                    && similarity_upper_bound(len, other_len) >= threshold
                    && similarity_ratio(node.normalized_text(), entry.node.normalized_text())
                        >= threshold
            })
    }

    /// Whether the node's byte or line range intersects a marked node
    pub fn has_overlap(&self, node: &TrackedNode) -> bool {
        self.entries
            .iter()
            .any(|(id, entry)| *id != node.id && entry.node.overlaps(node))
    }

    /// Check and mark in one step
    pub fn claim(&mut self, node: &TrackedNode) -> Claim {
        if self.is_used(node) {
            if self.entries.contains(&node.id) {
                self.mark_used(node);
            }
            return Claim::Duplicate;
        }
        if self.has_overlap(node) {
            return Claim::Overlap;
        }
        self.mark_used(node);
        Claim::Accepted
    }

    /// Reuse count of a marked node
    pub fn reuse_count(&self, id: &str) -> Option<u32> {
        self.entries.peek(id).map(|entry| entry.reuse)
    }

    /// Current counters
    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            used_count: self.entries.len(),
            ..self.stats.clone()
        }
    }

    /// Number of resident nodes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is marked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every node and counter
    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_hash.clear();
        self.by_group.clear();
        self.stats = TrackerStats::default();
    }

    fn unindex(&mut self, node: &TrackedNode) {
        if let Some(bucket) = self.by_hash.get_mut(&node.content_hash) {
            bucket.remove(&node.id);
            if bucket.is_empty() {
                self.by_hash.remove(&node.content_hash);
            }
        }
        if let Some(group) = self.by_group.get_mut(&node.similarity_group) {
            group.remove(&node.id);
            if group.is_empty() {
                self.by_group.remove(&node.similarity_group);
            }
        }
    }

    #[cfg(test)]
    fn index_sizes(&self) -> (usize, usize) {
        (
            self.by_hash.values().map(HashSet::len).sum(),
            self.by_group.values().map(HashSet::len).sum(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tracker(max_entries: usize) -> NodeTracker {
        NodeTracker::new(&TrackerConfig {
            max_entries,
            similarity_threshold: 0.95,
        })
    }

    fn node(text: &str, start_byte: usize, line: usize) -> TrackedNode {
        TrackedNode::new("function", start_byte, start_byte + text.len(), line, line, text)
    }

    #[test]
    fn test_mark_used_is_idempotent() {
        let mut tracker = tracker(16);
        let n = node("fn a() {}", 0, 1);

        assert!(tracker.mark_used(&n));
        assert!(!tracker.mark_used(&n));

        let stats = tracker.stats();
        assert_eq!(stats.total_tracked, 1);
        assert_eq!(stats.reuse_count, 1);
        assert_eq!(stats.used_count, 1);
        assert_eq!(tracker.reuse_count(&n.id), Some(1));
    }

    #[test]
    fn test_id_is_stable() {
        let a = node("fn a() {}", 10, 2);
        let b = node("fn a() {}", 10, 2);
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, node("fn a() {}", 11, 2).id);
    }

    #[test]
    fn test_identical_normalized_content_is_duplicate() {
        let mut tracker = tracker(16);
        let original = node("fn a() {\n\tlet x = 'y';\n}", 0, 1);
        let reformatted = node("fn a() {\n    let x = \"y\";   \n}", 500, 40);

        tracker.mark_used(&original);
        assert!(tracker.is_used(&reformatted));
        assert_eq!(tracker.stats().similarity_hits, 1);
    }

    #[test]
    fn test_near_identical_content_is_fuzzy_duplicate() {
        let mut tracker = tracker(16);
        let body = "x".repeat(100);
        let a = node(&format!("fn alpha() {{ {body} }}"), 0, 1);
        let b = node(&format!("fn alphb() {{ {body} }}"), 400, 30);
        let unrelated = node(&format!("struct Q {{ {} }}", "y".repeat(100)), 800, 60);

        tracker.mark_used(&a);
        assert!(tracker.is_used(&b));
        assert!(!tracker.is_used(&unrelated));
    }

    #[test]
    fn test_fuzzy_match_crosses_length_buckets() {
        let mut tracker = tracker(16);
        let shorter = node(&"x".repeat(63), 0, 1);
        let longer = node(&format!("{}y", "x".repeat(63)), 100, 10);
        assert_ne!(shorter.similarity_group, longer.similarity_group);

        tracker.mark_used(&shorter);
        assert!(tracker.is_used(&longer));

        let mut tracker = self::tracker(16);
        tracker.mark_used(&longer);
        assert!(tracker.is_used(&shorter));
        assert!(!tracker.is_used(&node(&"x".repeat(50), 300, 20)));
    }

    #[test]
    fn test_comment_syntax_decides_what_is_duplicate() {
        let content = "# Install\nRun it.\n# Usage\nRun it.\n";
        let index = crate::chunk::LineIndex::new(content);
        let install = index.span(0, 18, "section");
        let usage = index.span(18, content.len(), "section");

        let mut tracker = tracker(16);
        let prose = CommentSyntax::for_language(Some("markdown"));
        assert_eq!(tracker.claim(&TrackedNode::from_span(&install, content, prose)), Claim::Accepted);
        assert_eq!(tracker.claim(&TrackedNode::from_span(&usage, content, prose)), Claim::Accepted);

        let mut tracker = self::tracker(16);
        assert_eq!(
            tracker.claim(&TrackedNode::from_span(&install, content, CommentSyntax::ANY)),
            Claim::Accepted
        );
        assert_eq!(
            tracker.claim(&TrackedNode::from_span(&usage, content, CommentSyntax::ANY)),
            Claim::Duplicate
        );
    }

    #[test]
    fn test_overlap_by_bytes_and_lines() {
        let mut tracker = tracker(16);
        tracker.mark_used(&TrackedNode::new("block", 0, 100, 1, 5, "alpha"));

        assert!(tracker.has_overlap(&TrackedNode::new("block", 50, 150, 6, 9, "beta")));
        assert!(tracker.has_overlap(&TrackedNode::new("block", 100, 150, 5, 9, "gamma")));
        assert!(!tracker.has_overlap(&TrackedNode::new("block", 100, 150, 6, 9, "delta")));
    }

    #[test]
    fn test_claim_verdicts() {
        let mut tracker = tracker(16);
        let first = TrackedNode::new("block", 0, 10, 1, 1, "alpha beta");
        assert_eq!(tracker.claim(&first), Claim::Accepted);
        assert_eq!(tracker.claim(&first), Claim::Duplicate);
        assert_eq!(
            tracker.claim(&TrackedNode::new("block", 5, 20, 1, 2, "something else")),
            Claim::Overlap
        );
        assert_eq!(
            tracker.claim(&TrackedNode::new("block", 20, 30, 3, 3, "third block")),
            Claim::Accepted
        );
        assert_eq!(tracker.stats().reuse_count, 1);
    }

    #[test]
    fn test_eviction_clears_indices() {
        let mut tracker = tracker(2);
        let a = node("aaa", 0, 1);
        let b = node("bbb", 10, 2);
        let c = node("ccc", 20, 3);
        tracker.mark_used(&a);
        tracker.mark_used(&b);
        tracker.mark_used(&c);

        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.stats().evictions, 1);
        assert!(!tracker.is_used(&a));
        assert_eq!(tracker.index_sizes(), (2, 2));
    }

    #[test]
    fn test_hash_collisions_counted() {
        let mut tracker = tracker(16);
        tracker.mark_used(&node("same", 0, 1));
        tracker.mark_used(&node("same", 10, 2));
        assert_eq!(tracker.stats().hash_collisions, 1);
    }

    #[test]
    fn test_clear() {
        let mut tracker = tracker(16);
        tracker.mark_used(&node("x", 0, 1));
        tracker.clear();
        assert!(tracker.is_empty());
        assert_eq!(tracker.stats(), TrackerStats::default());
    }

    proptest! {
        #[test]
        fn prop_indices_never_reference_evicted(capacity in 1usize..8, count in 0usize..32) {
            let mut tracker = tracker(capacity);
            for i in 0..count {
                tracker.mark_used(&node(&format!("node-{i}"), i * 100, i + 1));
                prop_assert!(tracker.len() <= capacity);
                let (hashed, grouped) = tracker.index_sizes();
                prop_assert_eq!(hashed, tracker.len());
                prop_assert_eq!(grouped, tracker.len());
            }
        }
    }
}
