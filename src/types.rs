//! Shared identifiers used across the engine.
//!
//! Distinct domain identifiers are distinct types, not aliases of the same
//! primitive, so a `SeqId` can never be passed where an `IterId` is
//! expected without an explicit unwrap — the same newtype-per-id idiom
//! `samthorold-rins/src/types.rs` uses for `InsuredId`/`SubmissionId`/etc.

use serde::Serialize;

/// Identifier for one Monte-Carlo iteration ("virtual year"). Signed and
/// 64-bit because `ignore_ordering` synthesises ids via
/// `((old_iter_id + 1) << 32) | seq_id`, which overflows 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct IterId(pub i64);

/// Event sequence id, unique within a [`crate::year::Year`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SeqId(pub i32);

/// Source event identifier as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EventId(pub i32);

impl std::fmt::Display for IterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for SeqId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl IterId {
    /// The `ignore_ordering` iteration-key synthesis from spec §4.6:
    /// `((old_iter_id + 1) << 32) | seq_id`.
    pub fn pack_with_seq(self, seq_id: SeqId) -> IterId {
        IterId(((self.0 + 1) << 32) | seq_id.0 as i64)
    }
}

impl SeqId {
    /// The start of this id's thousand-block, per the Noncat collision
    /// slot search in spec §4.2 (`seq_id - seq_id mod 1000`).
    pub fn block_base(self) -> SeqId {
        SeqId(self.0 - self.0.rem_euclid(1000))
    }

    /// Offsets this id by `delta` within its block.
    pub fn offset(self, delta: i32) -> SeqId {
        SeqId(self.0 + delta)
    }
}
