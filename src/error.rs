//! Typed error taxonomy for the engine (spec §7).
//!
//! Non-fatal conditions (`FieldParse`, `EventIdMismatch`) never reach this
//! type — they are logged at the point of occurrence and the affected row
//! or merge is skipped/accepted in place. Everything here is fatal: it
//! aborts ingestion or the algebraic operation that raised it.

use std::path::PathBuf;

use crate::types::SeqId;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("could not open {path}: {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed header: {reason}")]
    HeaderMalformed { reason: String },

    #[error("unsupported column count {n} (expected 5, 6, or 7)")]
    ColumnCountUnsupported { n: usize },

    #[error("line too long on thread {thread} at line {line_no} (exceeds block size)")]
    LineTooLong { thread: usize, line_no: u64 },

    #[error(
        "no free synthetic slot for Noncat collision at seq_id {seq_id} (thousand-block exhausted)"
    )]
    NoncatSlotOverflow { seq_id: SeqId },

    #[error("iteration count mismatch: self has {self_num_iter}, other has {other_num_iter}")]
    IterCountMismatch { self_num_iter: i64, other_num_iter: i64 },
}
