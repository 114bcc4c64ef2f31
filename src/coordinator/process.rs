use super::types::{FallbackReason, FallbackTrigger, ProcessingResult};
use super::GuardCoordinator;
use crate::cache::cache_key;
use crate::chunk::{Chunk, ChunkProducer, SourceText, FALLBACK_TAG};
use crate::cleanup::{CleanupContext, CleanupMode, CleanupTrigger};
use crate::config::TrackerConfig;
use crate::detect::DetectionResult;
use crate::errors::GuardError;
use crate::parse::SourceParser;
use crate::selector::{FileFeatures, ProcessingTier};
use crate::tracker::{Claim, CommentSyntax, NodeTracker, TrackedNode};
use anyhow::{anyhow, bail};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

impl GuardCoordinator {
    /// Turn one unit into chunks. Never fails.
    ///
    /// Runs preflight, detection, selection and execution. Any failure is
    /// counted against the error threshold and routed to the fallback
    /// cascade; when that fails too the result is one chunk spanning the
    /// whole input.
    ///
    /// Empty input is the one case with no chunks: it returns at once with
    /// `success = true`. Chunk byte offsets always index the raw `content`,
    /// also when it is not valid UTF-8.
    pub async fn process_unit(&self, path: impl AsRef<Path>, content: &[u8]) -> ProcessingResult {
        let started = Instant::now();
        let path = path.as_ref();
        let source = SourceText::decode(content);

        let mut result = match AssertUnwindSafe(self.run_pipeline(path, content, &source))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(path = %path.display(), "Unit processing panicked: {message}");
                self.errors.record_error(&message, "process_unit");
                emergency(path, &source, None, FallbackReason::new(FallbackTrigger::Panic { message }))
            }
        };

        result.duration_ms = started.elapsed().as_millis() as u64;
        result
    }

    async fn run_pipeline(&self, path: &Path, content: &[u8], source: &SourceText) -> ProcessingResult {
        if content.is_empty() {
            return ProcessingResult {
                path: path.to_path_buf(),
                chunks: Vec::new(),
                tier_used: None,
                fallback_reason: None,
                duration_ms: 0,
                success: true,
            };
        }

        if let Some(trigger) = self.preflight().await {
            info!(path = %path.display(), "Preflight routed unit to fallback: {trigger}");
            let cached = self.detection_cache.get(&detection_key(path, content));
            return self.fallback(path, content, source, cached, trigger, false).await;
        }

        let detection = match self.detect(path, content).await {
            Ok(detection) => detection,
            Err(err) => {
                self.errors.record_error(&err, "detection");
                let trigger = FallbackTrigger::DetectionFailed {
                    message: err.to_string(),
                };
                return self.fallback(path, content, source, None, trigger, true).await;
            }
        };

        let features = FileFeatures::analyze(path, source.as_str());
        let decision = self.selector.decide(&detection, &features);
        debug!(
            path = %path.display(),
            tier = %decision.tier,
            rationale = %decision.rationale,
            "Selected processing tier"
        );

        match self.execute(decision.tier, source, &detection).await {
            Ok(chunks) => ProcessingResult {
                path: path.to_path_buf(),
                chunks,
                tier_used: Some(decision.tier),
                fallback_reason: None,
                duration_ms: 0,
                success: true,
            },
            Err(err) => {
                self.errors.record_error(&err, decision.tier.as_str());
                let trigger = FallbackTrigger::ExecutionFailed {
                    tier: decision.tier,
                    message: err.to_string(),
                };
                self.fallback(path, content, source, Some(detection), trigger, false).await
            }
        }
    }

    /// Memory and circuit checks; `Some` routes straight to fallback
    async fn preflight(&self) -> Option<FallbackTrigger> {
        if let Some(limit_bytes) = self.monitor.memory_limit_bytes() {
            match self.monitor.peek_usage() {
                Ok(status) if !status.is_within_limit => {
                    let ctx = CleanupContext::new(CleanupMode::Deep, CleanupTrigger::LimitExceeded)
                        .with_status(status.clone());
                    self.registry.perform_cleanup(&ctx).await;
                    self.monitor.force_gc();

                    let after = self.monitor.peek_usage().unwrap_or_else(|_| status.clone());
                    if !after.is_within_limit {
                        self.degrade("memory over limit at preflight", Some(after.clone()));
                    }
                    return Some(FallbackTrigger::MemoryLimit {
                        heap_used: status.heap_used,
                        limit_bytes,
                    });
                }
                Ok(_) => {}
                Err(err) => debug!("Preflight memory check skipped: {err}"),
            }
        }

        let window = self.errors.snapshot();
        if window.should_fallback() {
            return Some(FallbackTrigger::CircuitOpen {
                errors: window.count,
                max_errors: window.max_errors,
            });
        }
        None
    }

    async fn detect(&self, path: &Path, content: &[u8]) -> Result<DetectionResult, GuardError> {
        let key = detection_key(path, content);
        if let Some(hit) = self.detection_cache.get(&key) {
            return Ok(hit);
        }

        let deadline = self.config.processing.detection_timeout();
        let guarded = AssertUnwindSafe(self.detector.detect(path, content)).catch_unwind();
        let detection = match timeout(deadline, guarded).await {
            Ok(Ok(Ok(detection))) => detection,
            Ok(Ok(Err(err))) => return Err(GuardError::Detection(format!("{err:#}"))),
            Ok(Err(payload)) => {
                return Err(GuardError::Detection(format!(
                    "detector panicked: {}",
                    panic_message(payload.as_ref())
                )))
            }
            Err(_) => {
                return Err(GuardError::timeout(
                    "detection",
                    self.config.processing.detection_timeout_ms,
                ))
            }
        };

        let weight = detection.language.as_ref().map_or(0, String::len) as u64 + 64;
        self.detection_cache.put(key, detection.clone(), weight);
        Ok(detection)
    }

    /// Run one tier on a blocking thread under the execution deadline
    async fn execute(
        &self,
        tier: ProcessingTier,
        source: &SourceText,
        detection: &DetectionResult,
    ) -> Result<Vec<Chunk>, GuardError> {
        let producer = self
            .producers
            .get(tier)
            .ok_or_else(|| GuardError::Execution(format!("no producer registered for {tier}")))?;
        let parser = self.parser.clone();
        let source = source.clone();
        let language = detection.language.clone();
        let tracker_config = self.config.tracker.clone();

        let task = tokio::task::spawn_blocking(move || {
            produce_chunks(
                tier,
                producer.as_ref(),
                parser.as_ref(),
                &source,
                language.as_deref(),
                &tracker_config,
            )
        });

        match timeout(self.config.processing.execution_timeout(), task).await {
            Ok(Ok(Ok(chunks))) => Ok(chunks),
            Ok(Ok(Err(err))) => Err(GuardError::Execution(format!("{err:#}"))),
            Ok(Err(join)) if join.is_panic() => Err(GuardError::Execution(format!(
                "{tier} producer panicked: {}",
                panic_message(join.into_panic().as_ref())
            ))),
            Ok(Err(join)) => Err(GuardError::Execution(join.to_string())),
            Err(_) => Err(GuardError::timeout(
                format!("{tier} chunking"),
                self.config.processing.execution_timeout_ms,
            )),
        }
    }

    /// Degraded path: configured fallback tiers in order under one deadline,
    /// then the emergency chunk.
    async fn fallback(
        &self,
        path: &Path,
        content: &[u8],
        source: &SourceText,
        detection: Option<DetectionResult>,
        trigger: FallbackTrigger,
        retry_detection: bool,
    ) -> ProcessingResult {
        let known_language = detection.as_ref().and_then(|d| d.language.clone());

        let cascade = async {
            let detection = match detection {
                Some(detection) => detection,
                None if retry_detection => self.detect(path, content).await.unwrap_or_else(|err| {
                    debug!("Detection retry failed: {err}");
                    DetectionResult::unknown()
                }),
                None => DetectionResult::unknown(),
            };

            let mut failures = Vec::new();
            for &tier in &self.config.processing.fallback_tiers {
                match self.execute(tier, source, &detection).await {
                    Ok(chunks) => return Ok((tier, chunks)),
                    Err(err) => {
                        warn!(path = %path.display(), %tier, "Fallback tier failed: {err}");
                        failures.push(format!("{tier}: {err}"));
                    }
                }
            }
            if failures.is_empty() {
                failures.push("no fallback tiers configured".to_string());
            }
            Err((detection.language, failures.join("; ")))
        };

        let mut reason = FallbackReason::new(trigger);
        match timeout(self.config.processing.fallback_timeout(), cascade).await {
            Ok(Ok((tier, mut chunks))) => {
                for chunk in &mut chunks {
                    chunk.tags.push(FALLBACK_TAG.to_string());
                }
                ProcessingResult {
                    path: path.to_path_buf(),
                    chunks,
                    tier_used: Some(tier),
                    fallback_reason: Some(reason),
                    duration_ms: 0,
                    success: false,
                }
            }
            Ok(Err((language, message))) => {
                reason.fallback_error = Some(message);
                emergency(path, source, language.or(known_language), reason)
            }
            Err(_) => {
                reason.fallback_error = Some(
                    GuardError::timeout(
                        "fallback cascade",
                        self.config.processing.fallback_timeout_ms,
                    )
                    .to_string(),
                );
                emergency(path, source, known_language, reason)
            }
        }
    }
}

fn emergency(
    path: &Path,
    source: &SourceText,
    language: Option<String>,
    reason: FallbackReason,
) -> ProcessingResult {
    error!(path = %path.display(), "Emitting emergency single chunk: {reason}");
    ProcessingResult {
        path: path.to_path_buf(),
        chunks: vec![Chunk::emergency(source, language.as_deref())],
        tier_used: None,
        fallback_reason: Some(reason),
        duration_ms: 0,
        success: false,
    }
}

fn detection_key(path: &Path, content: &[u8]) -> crate::cache::CacheKey {
    cache_key(&[path.to_string_lossy().as_bytes(), content])
}

/// Parse when needed, produce spans and keep the ones the tracker accepts.
///
/// Producers see decoded text; chunk offsets are mapped back to the raw input.
fn produce_chunks(
    tier: ProcessingTier,
    producer: &dyn ChunkProducer,
    parser: &dyn SourceParser,
    source: &SourceText,
    language: Option<&str>,
    tracker_config: &TrackerConfig,
) -> anyhow::Result<Vec<Chunk>> {
    let text = source.as_str();
    let tree = if tier == ProcessingTier::Ast {
        let language = language.ok_or_else(|| anyhow!("AST tier needs a detected language"))?;
        Some(parser.parse(text, language)?)
    } else {
        None
    };

    let comments = match tier {
        ProcessingTier::Markdown | ProcessingTier::Markup => CommentSyntax::NONE,
        _ => CommentSyntax::for_language(language),
    };
    let spans = producer.produce(text, language, tree.as_deref())?;
    let mut tracker = NodeTracker::new(tracker_config);
    let mut chunks = Vec::with_capacity(spans.len());

    for span in &spans {
        let Some(mut chunk) = Chunk::from_span(span, text, tier, language) else {
            debug!(start = span.start_byte, end = span.end_byte, "Dropping span outside content");
            continue;
        };
        match tracker.claim(&TrackedNode::from_span(span, text, comments)) {
            Claim::Accepted => {
                chunk.start_byte = source.to_raw(chunk.start_byte);
                chunk.end_byte = source.to_raw(chunk.end_byte);
                chunks.push(chunk);
            }
            rejected => debug!(kind = %span.kind, ?rejected, "Span rejected by tracker"),
        }
    }

    if chunks.is_empty() {
        bail!("{} produced no chunks", producer.name());
    }
    debug!(%tier, produced = spans.len(), kept = chunks.len(), "Chunking finished");
    Ok(chunks)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::parse::NullParser;

    struct Repeating;

    impl ChunkProducer for Repeating {
        fn name(&self) -> &str {
            "repeating"
        }

        fn produce(
            &self,
            content: &str,
            _language: Option<&str>,
            _tree: Option<&crate::parse::SyntaxTree>,
        ) -> anyhow::Result<Vec<crate::chunk::Span>> {
            let index = crate::chunk::LineIndex::new(content);
            Ok(vec![
                index.span(0, 4, "a"),
                index.span(0, 4, "a"),
                index.span(2, 6, "b"),
                index.span(0, 999, "c"),
            ])
        }
    }

    #[test]
    fn test_tracker_filters_duplicates_and_overlaps() {
        let chunks = produce_chunks(
            ProcessingTier::LineBased,
            &Repeating,
            &NullParser,
            &SourceText::decode(b"abc\ndef\n"),
            None,
            &TrackerConfig::default(),
        )
        .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "abc\n");
    }

    #[test]
    fn test_ast_tier_without_language_fails() {
        let result = produce_chunks(
            ProcessingTier::Ast,
            &crate::chunk::AstChunker::default(),
            &NullParser,
            &SourceText::decode(b"fn a() {}"),
            None,
            &TrackerConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_chunk_offsets_refer_to_raw_bytes() {
        let raw = b"caf\xe9 one\ncaf\xe9 two\n";
        let chunks = produce_chunks(
            ProcessingTier::LineBased,
            &crate::chunk::LineChunker::new(1),
            &NullParser,
            &SourceText::decode(raw),
            None,
            &TrackerConfig::default(),
        )
        .unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!((chunks[0].start_byte, chunks[0].end_byte), (0, 9));
        assert_eq!((chunks[1].start_byte, chunks[1].end_byte), (9, raw.len()));
        assert_eq!(chunks[1].content, "caf\u{fffd} two\n");
    }

    #[test]
    fn test_markdown_sections_sharing_a_body_are_kept() {
        let chunks = produce_chunks(
            ProcessingTier::Markdown,
            &crate::chunk::MarkdownChunker,
            &NullParser,
            &SourceText::decode(b"# Install\nRun it.\n# Usage\nRun it.\n"),
            Some("markdown"),
            &TrackerConfig::default(),
        )
        .unwrap();

        let headings: Vec<&str> = chunks.iter().filter_map(|c| c.content.lines().next()).collect();
        assert_eq!(headings, vec!["# Install", "# Usage"]);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
