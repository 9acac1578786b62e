// SPDX-License-Identifier: Apache-2.0
//! Schedule step kinds: the ordered list executed exactly once per frame
//! (§4.8).
use crate::ident::{FieldExprId, SigExprId, SinkId, ValueSlot};

/// One step in the compiled schedule.
///
/// Ordering is a topological sort of inter-step data dependencies with tie-
/// break `(sigExprId ascending, then fieldExprId ascending, then sinkId
/// ascending)`; the sort is stable across recompiles of equivalent graphs
/// (§4.8), so `Vec<StepIR>` order alone fully determines execution order —
/// no separate dependency graph is retained at runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum StepIR {
    /// Writes `tAbsMs, tModelMs, phase01, wrapEvent` to their reserved
    /// slots. Always the first step in a non-empty schedule.
    TimeDerive {
        /// Slot receiving absolute wall time.
        t_abs_slot: ValueSlot,
        /// Slot receiving model time.
        t_model_slot: ValueSlot,
        /// Slot receiving wrapped phase.
        phase01_slot: ValueSlot,
        /// Slot receiving the wrap-event boolean.
        wrap_event_slot: ValueSlot,
    },
    /// Evaluates a signal expression and writes its result.
    SignalEval {
        /// Expression to evaluate.
        expr: SigExprId,
        /// Slot the result is written to.
        out_slot: ValueSlot,
    },
    /// Walks a field recipe, writing a pooled typed buffer and its length.
    Materialize {
        /// Field recipe to materialize.
        expr: FieldExprId,
        /// Slot holding the element domain this field is evaluated over.
        domain_slot: ValueSlot,
        /// Slot the materialized buffer handle is written to.
        buffer_slot: ValueSlot,
        /// Slot the materialized element count is written to.
        element_count_slot: ValueSlot,
    },
    /// Assembles a render-frame fragment from input slots and writes it.
    RenderAssemble {
        /// Sink this step assembles for.
        sink: SinkId,
        /// Input slots read while assembling.
        inputs: Vec<ValueSlot>,
        /// Slot the assembled frame fragment is written to.
        out_frame_slot: ValueSlot,
    },
}

impl StepIR {
    /// Returns the slot this step writes, for single-writer bookkeeping.
    #[must_use]
    pub fn primary_output_slot(&self) -> ValueSlot {
        match self {
            Self::TimeDerive { t_abs_slot, .. } => *t_abs_slot,
            Self::SignalEval { out_slot, .. } => *out_slot,
            Self::Materialize { buffer_slot, .. } => *buffer_slot,
            Self::RenderAssemble { out_frame_slot, .. } => *out_frame_slot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_eval_reports_its_output_slot() {
        let step = StepIR::SignalEval {
            expr: SigExprId(0),
            out_slot: ValueSlot(3),
        };
        assert_eq!(step.primary_output_slot(), ValueSlot(3));
    }
}
