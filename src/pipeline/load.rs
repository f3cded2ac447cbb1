//! Document loading: PDF text extraction and token-aware chunking.
//!
//! Extraction runs in `spawn_blocking` because `pdf_extract` is CPU-bound and
//! would stall the async executor on large documents. Splitting is
//! token-aware via `text_splitter` with the same tiktoken BPE the budget
//! checks use, so a chunk sized at 1000 tokens here really is 1000 tokens to
//! the model.
//!
//! Chunks never cross page boundaries: each page is split independently and
//! overlap repeats tokens only between consecutive chunks of the same page.
//! That keeps the page number in each chunk's metadata honest.

use crate::error::FlashcardError;
use std::path::Path;
use text_splitter::{ChunkConfig, TextSplitter};
use tiktoken_rs::CoreBPE;
use tracing::{debug, info};

/// A contiguous span of document text plus source metadata.
///
/// Produced once by the loader; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The chunk text, at most `chunk_size` tokens.
    pub content: String,
    /// 1-indexed page the chunk came from.
    pub page: usize,
    /// Byte offset of the chunk within its page's text.
    pub offset: usize,
}

/// Load a PDF and split it into token-bounded chunks.
///
/// Fails with [`FlashcardError::ExtractionFailed`] when the document cannot
/// be parsed and [`FlashcardError::EmptyDocument`] when it parses but yields
/// no text (e.g. a scanned image-only PDF).
pub async fn load_chunks(
    path: &Path,
    chunk_size: usize,
    chunk_overlap: usize,
    bpe: CoreBPE,
) -> Result<Vec<Chunk>, FlashcardError> {
    let owned = path.to_path_buf();
    let pages = tokio::task::spawn_blocking(move || pdf_extract::extract_text_by_pages(&owned))
        .await
        .map_err(|e| FlashcardError::ExtractionFailed {
            path: path.to_path_buf(),
            detail: format!("extraction task panicked: {e}"),
        })?
        .map_err(|e| FlashcardError::ExtractionFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    debug!("Extracted {} pages from {}", pages.len(), path.display());

    let chunks = chunk_pages(&pages, chunk_size, chunk_overlap, &bpe)?;
    if chunks.is_empty() {
        return Err(FlashcardError::EmptyDocument {
            path: path.to_path_buf(),
        });
    }

    info!(
        "Split {} into {} chunks (chunk_size={} tokens, overlap={})",
        path.display(),
        chunks.len(),
        chunk_size,
        chunk_overlap
    );
    Ok(chunks)
}

/// Split per-page text into token-bounded chunks with overlap.
///
/// Pure with respect to the file system, so tests can feed synthetic pages.
pub fn chunk_pages(
    pages: &[String],
    chunk_size: usize,
    chunk_overlap: usize,
    bpe: &CoreBPE,
) -> Result<Vec<Chunk>, FlashcardError> {
    let config = ChunkConfig::new(chunk_size)
        .with_sizer(bpe.clone())
        .with_overlap(chunk_overlap)
        .map_err(|e| FlashcardError::InvalidConfig(format!("chunk overlap: {e}")))?;
    let splitter = TextSplitter::new(config);

    let mut chunks = Vec::new();
    for (page_idx, page_text) in pages.iter().enumerate() {
        if page_text.trim().is_empty() {
            continue;
        }
        for (offset, piece) in splitter.chunk_indices(page_text) {
            if piece.trim().is_empty() {
                continue;
            }
            chunks.push(Chunk {
                content: piece.to_string(),
                page: page_idx + 1,
                offset,
            });
        }
    }
    Ok(chunks)
}
