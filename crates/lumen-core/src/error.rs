// SPDX-License-Identifier: Apache-2.0
//! Crate-level error taxonomy for programmer/host misuse.
//!
//! [`LumenError`] covers conditions that are not patch-authoring mistakes —
//! calling the executor against a program that failed to compile, driving a
//! `RuntimeState` built for a different `stateLayout`, or exhausting the
//! buffer pool. Patch-authoring problems are [`crate::diagnostics::Diagnostic`]s
//! instead, which accumulate rather than abort (§7). This split mirrors the
//! teacher's `EngineError` (thiserror, `Result`-based, process bugs) against
//! its `TickReceiptRejection` (accumulated, per-rewrite, surfaced as data).
use thiserror::Error;

use crate::ident::ValueSlot;

/// Errors returned by crate-level APIs that are not part of the accumulated
/// compile-diagnostics channel.
#[derive(Debug, Error)]
pub enum LumenError {
    /// The executor was asked to run a frame with no compiled program loaded.
    #[error("no compiled program is loaded")]
    NoProgram,

    /// A `RuntimeState` was driven against a `CompiledProgram` whose
    /// `stateLayout` fingerprint does not match the state it was built for.
    #[error("runtime state layout fingerprint {found:?} does not match program fingerprint {expected:?}")]
    StateLayoutMismatch {
        /// Fingerprint the `RuntimeState` was built against.
        found: [u8; 32],
        /// Fingerprint required by the program being executed.
        expected: [u8; 32],
    },

    /// The field materializer's buffer pool could not satisfy an allocation
    /// request (pool exhaustion, §7 runtime anomaly).
    #[error("buffer pool exhausted requesting {requested} elements")]
    PoolExhausted {
        /// Number of elements requested.
        requested: usize,
    },

    /// A value slot was read before any step in the current frame wrote it
    /// and it has no `initialSlotValues` entry.
    #[error("value slot {0} was read before being written this frame")]
    UninitializedSlot(ValueSlot),

    /// Debug-mode single-writer invariant violation (§4.8, §8 S6): two steps
    /// wrote the same slot in the same frame.
    #[error("value slot {slot} was written by both step {first_writer} and step {second_writer} in the same frame")]
    MultipleWriters {
        /// The slot that was written twice.
        slot: ValueSlot,
        /// Index of the schedule step that wrote it first.
        first_writer: usize,
        /// Index of the schedule step that wrote it again.
        second_writer: usize,
    },
}
