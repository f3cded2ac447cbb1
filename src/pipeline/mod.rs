//! The flashcard pipeline, stage by stage:
//!
//! 1. [`input`] — resolve a path or URL to a local PDF file.
//! 2. [`load`] — extract text per page and split into token-bounded chunks.
//! 3. [`chain`] — prompt | provider | parser chains for the map and reduce
//!    model calls.
//! 4. [`graph`] — the map-reduce state machine that drives the chains:
//!    summarise every chunk, collapse summaries until they fit the token
//!    ceiling, then distill flashcards.

pub mod chain;
pub mod graph;
pub mod input;
pub mod load;
