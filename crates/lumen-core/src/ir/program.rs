// SPDX-License-Identifier: Apache-2.0
//! `CompiledProgram`: the complete, immutable output of the lowering
//! pipeline (§3).
use crate::bus::CombineMode;
use crate::ident::{BusIndex, FieldExprId, SigExprId, StateCellId, ValueSlot};
use crate::ir::field::FieldExprIR;
use crate::ir::render::RenderSinkIR;
use crate::ir::schedule::StepIR;
use crate::ir::signal::SignalExprIR;
use crate::types::TypeDesc;
use crate::value::{StorageClass, Value};

/// Declared time topology, derived solely from the patch's single
/// `TimeRoot` (§4.1). No graph property may change this after compile.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TimeModel {
    /// Model time is clamped to `[0, duration_ms]` and produces a completion
    /// signal at the bound.
    Finite {
        /// Duration in milliseconds.
        duration_ms: f64,
    },
    /// Model time advances monotonically without wrapping.
    Infinite,
}

/// A reference to a value produced elsewhere in the program: either a pool
/// constant or an already-scheduled slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueRef {
    /// A constant-pool entry.
    Const(crate::ident::ConstId),
    /// A scheduled value slot.
    Slot(ValueSlot),
}

/// Metadata recorded for every value slot (§3 `slotMeta`).
#[derive(Debug, Clone, PartialEq)]
pub struct SlotMeta {
    /// Backing storage class.
    pub storage: StorageClass,
    /// Canonical type descriptor.
    pub ty: TypeDesc,
    /// Optional debug-only label; never behavior-relevant.
    pub debug_name: Option<String>,
}

/// One entry in the persistent-state layout (§3 `stateLayout`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateLayoutEntry {
    /// The cell's dense id.
    pub cell_id: StateCellId,
    /// Backing storage class.
    pub storage: StorageClass,
    /// Number of scalar elements the cell holds (1 for scalar, N for
    /// vectors and ring buffers).
    pub element_count: u32,
    /// Stable cross-recompile identity, derived via
    /// [`crate::ident::transform_state_identity`] or
    /// [`crate::ident::operator_state_identity`]. Used by hot-swap (§4.9
    /// step 3) to match cells pairwise when the layout fingerprint changes.
    pub identity: crate::ident::Hash,
}

/// Typed constant pool: one array per storage class plus a json-encoded
/// object array, per §3.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    /// All constant values, indexed by `ConstId`.
    pub values: Vec<Value>,
}

impl ConstantPool {
    /// Interns a value, returning its `ConstId`. No deduplication is
    /// performed — lowering passes that want deduplication do so themselves
    /// before calling this, since identical-looking constants from
    /// different authoring sites may need independent identity for
    /// debug-index purposes.
    pub fn push(&mut self, value: Value) -> crate::ident::ConstId {
        let id = crate::ident::ConstId(u32::try_from(self.values.len()).unwrap_or(u32::MAX));
        self.values.push(value);
        id
    }
}

/// Runtime combine plan for one signal-world bus: its locked combine mode
/// plus the deterministically-ordered operand list bus lowering resolved
/// (§4.7). Publisher order depends only on authored sort keys and stable
/// hashes, so it is fixed once here rather than recomputed every frame;
/// the executor only samples each operand and folds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusCombineSpec {
    /// Combine mode this bus was declared (or locked, for reserved buses) with.
    pub combine: CombineMode,
    /// Publisher signal expressions, already in `(sortKey, stableHash)` order.
    pub operands: Vec<SigExprId>,
}

/// Runtime combine plan for one field-world bus: its locked combine mode
/// plus the deterministically-ordered operand recipes bus lowering
/// resolved (§4.7). Each operand is the publisher's backing field
/// expression rather than its output slot, since a `Field`-world slot only
/// holds a `DomainRef` handle, not per-element data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBusCombineSpec {
    /// Combine mode this bus was declared (or locked, for reserved buses) with.
    pub combine: CombineMode,
    /// Publisher field expressions, already in `(sortKey, stableHash)` order.
    pub operands: Vec<FieldExprId>,
}

/// The complete, immutable compiled program: every field is read-only after
/// compile (§3 `CompiledProgram`).
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    /// Declared time topology.
    pub time_model: TimeModel,
    /// Canonical type descriptors, indexed for debug/provenance use.
    pub types: Vec<TypeDesc>,
    /// Ordered signal-expression nodes.
    pub signal_exprs: Vec<SignalExprIR>,
    /// Ordered field-expression nodes.
    pub field_exprs: Vec<FieldExprIR>,
    /// Typed constant pool.
    pub constants: ConstantPool,
    /// Persistent-state layout.
    pub state_layout: Vec<StateLayoutEntry>,
    /// Default source for every input port whose wire is absent, keyed by
    /// the `ValueSlot` that would otherwise be written by a wire.
    pub default_sources: std::collections::BTreeMap<ValueSlot, ValueRef>,
    /// Metadata for every value slot.
    pub slot_meta: Vec<SlotMeta>,
    /// Render sink declarations.
    pub sinks: Vec<RenderSinkIR>,
    /// Ordered schedule steps.
    pub schedule: Vec<StepIR>,
    /// Constants written once at program-load time, before the first frame.
    pub initial_slot_values: std::collections::BTreeMap<ValueSlot, Value>,
    /// Bus root metadata, for debugging and future optimization (§4.7).
    pub bus_roots: std::collections::BTreeMap<BusIndex, ValueRef>,
    /// Runtime combine plan for every bus with at least one publisher.
    pub bus_combines: std::collections::BTreeMap<BusIndex, BusCombineSpec>,
    /// Runtime combine plan for every `Field`-world bus with at least one publisher.
    pub field_bus_combines: std::collections::BTreeMap<BusIndex, FieldBusCombineSpec>,
    /// Compiled wire transform chains, indexed by `TransformChainId`.
    pub transform_chains: Vec<Vec<crate::transform::TransformStepSpec>>,
    /// State cell assigned to each stateful step of each transform chain,
    /// parallel to `transform_chains` (same outer index, same step index).
    pub transform_state_cells: Vec<Vec<Option<StateCellId>>>,
    /// Content-addressed fingerprint over everything that affects
    /// `stateLayout` shape, used by hot-swap to decide soft vs. hard swap
    /// (§4.9).
    pub state_layout_fingerprint: crate::ident::Hash,
    /// Content-addressed fingerprint over the full compile input, used as
    /// the compile-result cache key (§4.9).
    pub fingerprint: crate::ident::Hash,
    /// String labels for every block, port, bus, and slot allocated during
    /// this compile, for host-side debugging and UI identity. Dense indices
    /// themselves are never stable across recompiles; a host that needs to
    /// track an entity across edits resolves it through this table instead.
    pub debug_index: crate::ident::DebugIndex,
}

impl CompiledProgram {
    /// Number of value slots this program addresses.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slot_meta.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_pool_assigns_increasing_ids() {
        let mut pool = ConstantPool::default();
        let a = pool.push(Value::F64(1.0));
        let b = pool.push(Value::F64(2.0));
        assert_eq!(a.index() + 1, b.index());
    }
}
