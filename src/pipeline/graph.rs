//! The map-reduce workflow: fan out per-chunk summaries, collapse them under
//! a token ceiling, then distill the final result.
//!
//! The topology is fixed and small, so it is written as an explicit state
//! machine — a [`Phase`] enum with an exhaustive `match` in
//! [`MapReduceGraph::run`] — rather than a generic graph-building
//! abstraction. Every transition is visible in one screen of code:
//!
//! ```text
//! FanOut ──▶ Collect ──▶ Decide ──▶ Reduce (terminal)
//!                          │  ▲
//!                          ▼  │
//!                        Collapse
//! ```
//!
//! The Decide/Collapse loop terminates because a collapse pass merges every
//! group of 2+ documents into one, strictly shrinking the list; a pass that
//! fails to shrink it (all groups are singletons, which only happens when
//! individual summaries brush the ceiling) short-circuits to Reduce instead
//! of spinning. A single summary over the ceiling is governed by
//! [`OversizedSummaryPolicy`].

use crate::config::OversizedSummaryPolicy;
use crate::error::FlashcardError;
use crate::output::ReduceOutput;
use crate::pipeline::chain::{MapStep, ReduceStep};
use crate::progress::ProgressCallback;
use crate::tokens::DocumentSizer;
use futures::stream::{self, StreamExt};
use std::ops::Range;
use tracing::{debug, info, warn};

/// A wrapped summary, carrying its token count so the budget arithmetic in
/// Decide and Collapse never re-tokenizes unchanged text.
#[derive(Debug, Clone)]
pub struct IntermediateDoc {
    pub content: String,
    pub tokens: usize,
}

impl IntermediateDoc {
    pub fn new(content: String, sizer: &dyn DocumentSizer) -> Self {
        let tokens = sizer.count(&content);
        Self { content, tokens }
    }
}

/// Workflow states. One enum variant per state in the design; `run` holds
/// the exhaustive transition function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Summarise every chunk concurrently.
    FanOut,
    /// Wrap the accumulated summaries into intermediate documents.
    Collect,
    /// Compare the batch against the ceiling: Collapse or Reduce.
    Decide,
    /// Merge groups of documents via the map step, then re-Decide.
    Collapse,
    /// Final distillation over the flat summaries. Terminal.
    Reduce,
}

/// Mutable record threaded through one workflow invocation.
///
/// Created per run, owned exclusively by the orchestrator, discarded after.
struct WorkflowState {
    /// Original chunk contents, untouched after construction.
    contents: Vec<String>,
    /// Append-only summary accumulator; arrival order, order-insensitive.
    summaries: Vec<String>,
    /// Current collapsible batch.
    collapsed: Vec<IntermediateDoc>,
    /// Collapse passes executed so far.
    collapse_passes: usize,
}

/// What a completed workflow run produced.
#[derive(Debug)]
pub struct GraphRun {
    /// The reduce step's result.
    pub result: ReduceOutput,
    /// Number of per-chunk summaries accumulated during fan-out.
    pub summary_count: usize,
    /// Collapse passes needed before the batch fit under the ceiling.
    pub collapse_passes: usize,
}

/// The map-reduce orchestrator.
///
/// Everything it calls out to arrives through the constructor — map step,
/// reduce step, token sizer, limits. No global client, no environment
/// lookups.
pub struct MapReduceGraph<'a> {
    map: &'a dyn MapStep,
    reduce: &'a dyn ReduceStep,
    sizer: &'a dyn DocumentSizer,
    token_max: usize,
    concurrency: usize,
    oversized_policy: OversizedSummaryPolicy,
    progress: Option<&'a ProgressCallback>,
}

impl<'a> MapReduceGraph<'a> {
    pub fn new(
        map: &'a dyn MapStep,
        reduce: &'a dyn ReduceStep,
        sizer: &'a dyn DocumentSizer,
        token_max: usize,
        concurrency: usize,
        oversized_policy: OversizedSummaryPolicy,
    ) -> Self {
        Self {
            map,
            reduce,
            sizer,
            token_max,
            concurrency: concurrency.max(1),
            oversized_policy,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: &'a ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Drive the workflow over `contents` to completion.
    pub async fn run(&self, contents: Vec<String>) -> Result<GraphRun, FlashcardError> {
        if contents.is_empty() {
            return Err(FlashcardError::Internal(
                "workflow invoked with zero chunks".into(),
            ));
        }

        let mut state = WorkflowState {
            contents,
            summaries: Vec::new(),
            collapsed: Vec::new(),
            collapse_passes: 0,
        };

        let mut phase = Phase::FanOut;
        loop {
            phase = match phase {
                Phase::FanOut => {
                    self.fan_out(&mut state).await?;
                    Phase::Collect
                }
                Phase::Collect => {
                    self.collect(&mut state);
                    Phase::Decide
                }
                Phase::Decide => self.decide(&state)?,
                Phase::Collapse => self.collapse(&mut state).await?,
                Phase::Reduce => {
                    let result = self.reduce_final(&state).await?;
                    return Ok(GraphRun {
                        result,
                        summary_count: state.summaries.len(),
                        collapse_passes: state.collapse_passes,
                    });
                }
            };
        }
    }

    /// Fan-out: one concurrent map call per chunk. All must complete before
    /// Collect; the first failure aborts the run.
    async fn fan_out(&self, state: &mut WorkflowState) -> Result<(), FlashcardError> {
        let total = state.contents.len();
        if let Some(cb) = self.progress {
            cb.on_generation_start(total);
        }
        info!("Fan-out: summarising {total} chunks (concurrency {})", self.concurrency);

        let results: Vec<Result<String, FlashcardError>> =
            stream::iter(state.contents.iter().enumerate().map(|(idx, content)| {
                let chunk_num = idx + 1;
                async move {
                    if let Some(cb) = self.progress {
                        cb.on_chunk_start(chunk_num, total);
                    }
                    let result = self.map.summarize(content).await;
                    if let (Some(cb), Ok(summary)) = (self.progress, &result) {
                        cb.on_chunk_summarized(chunk_num, total, summary.len());
                    }
                    result
                }
            }))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for result in results {
            state.summaries.push(result.map_err(|e| relabel(e, "fan-out"))?);
        }
        debug_assert_eq!(state.summaries.len(), state.contents.len());
        Ok(())
    }

    /// Collect: wrap each summary into an intermediate document.
    fn collect(&self, state: &mut WorkflowState) {
        state.collapsed = state
            .summaries
            .iter()
            .map(|s| IntermediateDoc::new(s.clone(), self.sizer))
            .collect();
    }

    /// Decide: collapse when the batch is over the ceiling, reduce otherwise.
    fn decide(&self, state: &WorkflowState) -> Result<Phase, FlashcardError> {
        let total: usize = state.collapsed.iter().map(|d| d.tokens).sum();
        debug!(
            "Decide: {} docs, {} tokens (ceiling {})",
            state.collapsed.len(),
            total,
            self.token_max
        );

        if total <= self.token_max {
            return Ok(Phase::Reduce);
        }

        if self.oversized_policy == OversizedSummaryPolicy::FailFast {
            if let Some(doc) = state.collapsed.iter().find(|d| d.tokens > self.token_max) {
                return Err(FlashcardError::SummaryOverBudget {
                    tokens: doc.tokens,
                    token_max: self.token_max,
                });
            }
        }

        Ok(Phase::Collapse)
    }

    /// Collapse: greedily pack the batch into under-ceiling groups and merge
    /// each multi-document group with one map call. Groups run concurrently;
    /// the pass completes before the next Decide. Singleton groups (a
    /// document brushing or exceeding the ceiling on its own) pass through
    /// untouched — re-summarising them cannot shrink the count, and the
    /// pass-through policy explicitly tolerates them.
    async fn collapse(&self, state: &mut WorkflowState) -> Result<Phase, FlashcardError> {
        let before = state.collapsed.len();
        let groups = split_by_budget(&state.collapsed, self.token_max);
        debug!("Collapse pass {}: {} docs into {} groups", state.collapse_passes + 1, before, groups.len());

        let merged: Vec<Result<(usize, IntermediateDoc), FlashcardError>> =
            stream::iter(groups.iter().enumerate().map(|(group_idx, range)| {
                let docs = &state.collapsed[range.clone()];
                async move {
                    if docs.len() == 1 {
                        // Intentional departure from re-mapping every group:
                        // re-summarising a lone document cannot shrink the
                        // batch, so it is forwarded untouched.
                        return Ok((group_idx, docs[0].clone()));
                    }
                    let joined = docs
                        .iter()
                        .map(|d| d.content.as_str())
                        .collect::<Vec<_>>()
                        .join("\n\n");
                    let summary = self
                        .map
                        .summarize(&joined)
                        .await
                        .map_err(|e| relabel(e, "collapse"))?;
                    Ok((group_idx, IntermediateDoc::new(summary, self.sizer)))
                }
            }))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut replacement: Vec<(usize, IntermediateDoc)> = Vec::with_capacity(groups.len());
        for item in merged {
            replacement.push(item?);
        }
        replacement.sort_by_key(|(group_idx, _)| *group_idx);
        state.collapsed = replacement.into_iter().map(|(_, doc)| doc).collect();
        state.collapse_passes += 1;

        let after = state.collapsed.len();
        if let Some(cb) = self.progress {
            cb.on_collapse_pass(state.collapse_passes, before, after);
        }

        if after >= before {
            // Every group was a singleton; another pass cannot shrink the
            // list. Proceed to Reduce rather than loop.
            warn!(
                "Collapse pass {} did not shrink the batch ({before} docs); proceeding to reduce",
                state.collapse_passes
            );
            return Ok(Phase::Reduce);
        }
        Ok(Phase::Decide)
    }

    /// Reduce: one call over the flat accumulated summaries — not the
    /// collapsed batch. The collapsed batch only gates this transition.
    async fn reduce_final(&self, state: &WorkflowState) -> Result<ReduceOutput, FlashcardError> {
        if let Some(cb) = self.progress {
            cb.on_reduce_start();
        }
        info!("Reduce: distilling {} summaries", state.summaries.len());

        let joined = state.summaries.join("\n\n");
        let result = self
            .reduce
            .distill(&joined)
            .await
            .map_err(|e| relabel(e, "reduce"))?;

        if let Some(cb) = self.progress {
            let cards = match &result {
                ReduceOutput::Flashcards(set) => Some(set.len()),
                ReduceOutput::Raw(_) => None,
            };
            cb.on_generation_complete(cards);
        }
        Ok(result)
    }
}

/// Greedy left-to-right packing of documents into contiguous groups whose
/// token totals stay at or under `token_max`.
///
/// A document is added to the current group unless doing so would push the
/// group over the ceiling, in which case a new group starts. A document
/// alone over the ceiling necessarily forms a singleton group; the caller's
/// policy decides what happens to it.
pub fn split_by_budget(docs: &[IntermediateDoc], token_max: usize) -> Vec<Range<usize>> {
    let mut groups = Vec::new();
    let mut start = 0;
    let mut acc = 0usize;

    for (idx, doc) in docs.iter().enumerate() {
        if idx > start && acc + doc.tokens > token_max {
            groups.push(start..idx);
            start = idx;
            acc = 0;
        }
        acc += doc.tokens;
    }
    if start < docs.len() {
        groups.push(start..docs.len());
    }
    groups
}

fn relabel(err: FlashcardError, step: &'static str) -> FlashcardError {
    match err {
        FlashcardError::ModelCallFailed {
            retries, detail, ..
        } => FlashcardError::ModelCallFailed {
            step,
            retries,
            detail,
        },
        other => other,
    }
}
