//! Progress-callback trait for workflow events.
//!
//! Inject an [`Arc<dyn GenerationProgressCallback>`] via
//! [`crate::config::GenerationConfigBuilder::progress_callback`] to receive
//! real-time events as the workflow fans out, collapses, and reduces.
//!
//! Callbacks rather than channels: the library stays ignorant of how the host
//! application communicates — forward events to a terminal progress bar, a
//! WebSocket, or a log sink as you see fit. The trait is `Send + Sync`
//! because chunk summaries complete concurrently and out of order.

use std::sync::Arc;

/// Called by the workflow as it processes a document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `on_chunk_start` / `on_chunk_summarized` may fire
/// concurrently from different tasks; protect shared mutable state
/// accordingly.
pub trait GenerationProgressCallback: Send + Sync {
    /// Called once after loading, before any model call.
    fn on_generation_start(&self, total_chunks: usize) {
        let _ = total_chunks;
    }

    /// Called just before the map request is sent for a chunk (1-indexed).
    fn on_chunk_start(&self, chunk_num: usize, total_chunks: usize) {
        let _ = (chunk_num, total_chunks);
    }

    /// Called when a chunk's summary arrives.
    fn on_chunk_summarized(&self, chunk_num: usize, total_chunks: usize, summary_len: usize) {
        let _ = (chunk_num, total_chunks, summary_len);
    }

    /// Called after each collapse pass with the document counts before and
    /// after the pass.
    fn on_collapse_pass(&self, pass: usize, docs_before: usize, docs_after: usize) {
        let _ = (pass, docs_before, docs_after);
    }

    /// Called just before the final reduce request is sent.
    fn on_reduce_start(&self) {}

    /// Called once when the workflow finishes successfully.
    ///
    /// `card_count` is `None` when the reduce step was configured for raw
    /// text output.
    fn on_generation_complete(&self, card_count: Option<usize>) {
        let _ = card_count;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl GenerationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in
/// [`crate::config::GenerationConfig`].
pub type ProgressCallback = Arc<dyn GenerationProgressCallback>;
