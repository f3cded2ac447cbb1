//! Workflow tests driven by scripted map/reduce steps.
//!
//! No network, no API keys: the orchestrator only sees the `MapStep`,
//! `ReduceStep` and `DocumentSizer` traits, so these tests script each step
//! and assert on call counts, routing decisions, and the data the reduce
//! step finally receives.

use async_trait::async_trait;
use pdf2cards::pipeline::chain::{MapStep, ReduceStep};
use pdf2cards::pipeline::graph::MapReduceGraph;
use pdf2cards::tokens::DocumentSizer;
use pdf2cards::{
    FlashcardError, FlashcardSet, GenerationConfig, GenerationProgressCallback,
    OversizedSummaryPolicy, ReduceOutput,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Counts whitespace-separated words. Keeps the budget arithmetic in tests
/// readable: a ten-word summary is ten tokens.
struct WordSizer;

impl DocumentSizer for WordSizer {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// Scripted map step: prefixes the input's first word with `s-` and pads the
/// summary to a fixed word count. A collapse call over merged summaries
/// therefore produces a `s-s-…` marker, which lets tests tell fan-out
/// summaries from collapse products.
struct ScriptedMap {
    summary_words: usize,
    calls: AtomicUsize,
    inputs: Mutex<Vec<String>>,
    fail_on: Option<&'static str>,
}

impl ScriptedMap {
    fn new(summary_words: usize) -> Self {
        Self {
            summary_words,
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
            fail_on: None,
        }
    }

    fn failing_on(needle: &'static str, summary_words: usize) -> Self {
        Self {
            fail_on: Some(needle),
            ..Self::new(summary_words)
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MapStep for ScriptedMap {
    async fn summarize(&self, docs: &str) -> Result<String, FlashcardError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(docs.to_string());

        if let Some(needle) = self.fail_on {
            if docs.contains(needle) {
                return Err(FlashcardError::ModelCallFailed {
                    step: "map",
                    retries: 2,
                    detail: "scripted failure".into(),
                });
            }
        }

        let first = docs.split_whitespace().next().unwrap_or("empty");
        let mut words = vec![format!("s-{first}")];
        words.extend(std::iter::repeat("pad".to_string()).take(self.summary_words - 1));
        Ok(words.join(" "))
    }
}

/// Scripted reduce step: records the docs it receives and returns a canned
/// flashcard set (or a scripted error).
struct ScriptedReduce {
    calls: AtomicUsize,
    received: Mutex<Option<String>>,
    fail: bool,
}

impl ScriptedReduce {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            received: Mutex::new(None),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn received(&self) -> String {
        self.received.lock().unwrap().clone().unwrap_or_default()
    }

    fn cards() -> FlashcardSet {
        let mut map = BTreeMap::new();
        map.insert("What is a token?".to_string(), "A unit of text.".to_string());
        map.insert("What is a chunk?".to_string(), "A span of pages.".to_string());
        FlashcardSet(map)
    }
}

#[async_trait]
impl ReduceStep for ScriptedReduce {
    async fn distill(&self, docs: &str) -> Result<ReduceOutput, FlashcardError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.received.lock().unwrap() = Some(docs.to_string());

        if self.fail {
            return Err(FlashcardError::OutputParseFailed {
                detail: "expected a JSON object".into(),
                snippet: "I could not produce flashcards".into(),
            });
        }
        Ok(ReduceOutput::Flashcards(Self::cards()))
    }
}

/// Five ten-word chunks named c1..c5.
fn five_chunks() -> Vec<String> {
    (1..=5)
        .map(|i| {
            let mut words = vec![format!("c{i}")];
            words.extend(std::iter::repeat("body".to_string()).take(9));
            words.join(" ")
        })
        .collect()
}

#[tokio::test]
async fn every_chunk_is_summarized_before_reduce() {
    let map = ScriptedMap::new(10);
    let reduce = ScriptedReduce::new();
    let sizer = WordSizer;

    let graph = MapReduceGraph::new(&map, &reduce, &sizer, 1000, 4, Default::default());
    let run = graph.run(five_chunks()).await.unwrap();

    assert_eq!(run.summary_count, 5);
    assert_eq!(run.collapse_passes, 0);
    assert_eq!(map.calls(), 5);
    assert_eq!(reduce.calls(), 1);
}

#[tokio::test]
async fn single_chunk_needs_one_map_and_one_reduce() {
    let map = ScriptedMap::new(10);
    let reduce = ScriptedReduce::new();
    let sizer = WordSizer;

    let graph = MapReduceGraph::new(&map, &reduce, &sizer, 1000, 4, Default::default());
    let run = graph
        .run(vec!["only chunk in this document".to_string()])
        .await
        .unwrap();

    assert_eq!(run.summary_count, 1);
    assert_eq!(map.calls(), 1);
    assert_eq!(reduce.calls(), 1);
    assert!(matches!(run.result, ReduceOutput::Flashcards(_)));
}

#[tokio::test]
async fn over_ceiling_batch_collapses_once_then_reduces() {
    // Five 10-token summaries total 50 against a ceiling of 45. The greedy
    // packing yields a 4-doc group plus a singleton; one merge call brings
    // the batch to 2 docs / 20 tokens, which fits.
    let map = ScriptedMap::new(10);
    let reduce = ScriptedReduce::new();
    let sizer = WordSizer;

    let graph = MapReduceGraph::new(&map, &reduce, &sizer, 45, 4, Default::default());
    let run = graph.run(five_chunks()).await.unwrap();

    assert_eq!(run.collapse_passes, 1);
    assert_eq!(map.calls(), 6, "5 fan-out calls + 1 merge call");
    assert_eq!(reduce.calls(), 1);
}

#[tokio::test]
async fn reduce_sees_the_flat_summaries_not_the_collapsed_batch() {
    // Same collapse scenario as above; the reduce input must still be the
    // five fan-out summaries, never a collapse product.
    let map = ScriptedMap::new(10);
    let reduce = ScriptedReduce::new();
    let sizer = WordSizer;

    let graph = MapReduceGraph::new(&map, &reduce, &sizer, 45, 4, Default::default());
    graph.run(five_chunks()).await.unwrap();

    let received = reduce.received();
    for i in 1..=5 {
        assert!(
            received.contains(&format!("s-c{i}")),
            "summary for chunk {i} missing from reduce input"
        );
    }
    assert!(
        !received.contains("s-s-"),
        "collapse product leaked into the reduce input"
    );
}

#[tokio::test]
async fn repeated_collapse_passes_until_batch_fits() {
    // Ceiling of 25: five 10-token summaries pack into groups of 2,2,1 per
    // pass. Pass one yields 3 docs (30 tokens, still over); pass two yields
    // 2 docs (20 tokens) and the workflow reduces.
    let map = ScriptedMap::new(10);
    let reduce = ScriptedReduce::new();
    let sizer = WordSizer;

    let graph = MapReduceGraph::new(&map, &reduce, &sizer, 25, 4, Default::default());
    let run = graph.run(five_chunks()).await.unwrap();

    assert_eq!(run.collapse_passes, 2);
    assert_eq!(reduce.calls(), 1);
}

#[tokio::test]
async fn oversized_summary_fails_fast_by_default() {
    // 30-token summaries against a 25-token ceiling: no grouping can help,
    // and the default policy aborts instead of looping.
    let map = ScriptedMap::new(30);
    let reduce = ScriptedReduce::new();
    let sizer = WordSizer;

    let graph = MapReduceGraph::new(
        &map,
        &reduce,
        &sizer,
        25,
        4,
        OversizedSummaryPolicy::FailFast,
    );
    let err = graph.run(five_chunks()).await.unwrap_err();

    assert!(matches!(err, FlashcardError::SummaryOverBudget { .. }));
    assert_eq!(reduce.calls(), 0);
}

#[tokio::test]
async fn pass_through_policy_terminates_on_unshrinkable_batch() {
    // Same oversized scenario with PassThrough: every group is a singleton,
    // the pass cannot shrink the batch, and the workflow proceeds to reduce
    // instead of spinning.
    let map = ScriptedMap::new(30);
    let reduce = ScriptedReduce::new();
    let sizer = WordSizer;

    let graph = MapReduceGraph::new(
        &map,
        &reduce,
        &sizer,
        25,
        4,
        OversizedSummaryPolicy::PassThrough,
    );
    let run = graph.run(five_chunks()).await.unwrap();

    assert_eq!(run.collapse_passes, 1);
    assert_eq!(map.calls(), 5, "singleton groups must not trigger merge calls");
    assert_eq!(reduce.calls(), 1);
}

#[tokio::test]
async fn map_failure_aborts_the_run() {
    let map = ScriptedMap::failing_on("c3", 10);
    let reduce = ScriptedReduce::new();
    let sizer = WordSizer;

    let graph = MapReduceGraph::new(&map, &reduce, &sizer, 1000, 4, Default::default());
    let err = graph.run(five_chunks()).await.unwrap_err();

    match err {
        FlashcardError::ModelCallFailed { step, .. } => assert_eq!(step, "fan-out"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(reduce.calls(), 0);
}

#[tokio::test]
async fn reduce_parse_failure_propagates() {
    let map = ScriptedMap::new(10);
    let reduce = ScriptedReduce::failing();
    let sizer = WordSizer;

    let graph = MapReduceGraph::new(&map, &reduce, &sizer, 1000, 4, Default::default());
    let err = graph.run(five_chunks()).await.unwrap_err();

    assert!(matches!(err, FlashcardError::OutputParseFailed { .. }));
}

#[tokio::test]
async fn zero_chunks_is_rejected() {
    let map = ScriptedMap::new(10);
    let reduce = ScriptedReduce::new();
    let sizer = WordSizer;

    let graph = MapReduceGraph::new(&map, &reduce, &sizer, 1000, 4, Default::default());
    let err = graph.run(Vec::new()).await.unwrap_err();
    assert!(matches!(err, FlashcardError::Internal(_)));
}

// ── Progress callback events ─────────────────────────────────────────────

#[derive(Default)]
struct RecordingProgress {
    started_with: AtomicUsize,
    chunks_done: AtomicUsize,
    collapse_passes: AtomicUsize,
    completed_with: Mutex<Option<Option<usize>>>,
}

impl GenerationProgressCallback for RecordingProgress {
    fn on_generation_start(&self, total_chunks: usize) {
        self.started_with.store(total_chunks, Ordering::SeqCst);
    }

    fn on_chunk_summarized(&self, _chunk_num: usize, _total: usize, _summary_len: usize) {
        self.chunks_done.fetch_add(1, Ordering::SeqCst);
    }

    fn on_collapse_pass(&self, _pass: usize, _before: usize, _after: usize) {
        self.collapse_passes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_generation_complete(&self, card_count: Option<usize>) {
        *self.completed_with.lock().unwrap() = Some(card_count);
    }
}

#[tokio::test]
async fn progress_events_trace_the_workflow() {
    let map = ScriptedMap::new(10);
    let reduce = ScriptedReduce::new();
    let sizer = WordSizer;
    let recorder = Arc::new(RecordingProgress::default());
    let callback: Arc<dyn GenerationProgressCallback> = recorder.clone();

    let graph = MapReduceGraph::new(&map, &reduce, &sizer, 45, 4, Default::default())
        .with_progress(&callback);
    graph.run(five_chunks()).await.unwrap();

    assert_eq!(recorder.started_with.load(Ordering::SeqCst), 5);
    assert_eq!(recorder.chunks_done.load(Ordering::SeqCst), 5);
    assert_eq!(recorder.collapse_passes.load(Ordering::SeqCst), 1);
    assert_eq!(
        *recorder.completed_with.lock().unwrap(),
        Some(Some(ScriptedReduce::cards().len()))
    );
}

// ── Driver-level failures that never reach a model ───────────────────────

#[tokio::test]
async fn missing_input_fails_before_any_model_work() {
    let config = GenerationConfig::default();
    let err = pdf2cards::generate("/no/such/file.pdf", &config)
        .await
        .unwrap_err();
    assert!(matches!(err, FlashcardError::FileNotFound { .. }));
}
