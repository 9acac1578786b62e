// SPDX-License-Identifier: Apache-2.0
//! `IrBuilder`: the mutable accumulator block lowerers write into while
//! emitting IR nodes, transforms, state cells, and sinks (§2 "IR builder").
use std::collections::BTreeMap;

use crate::ident::{
    BusIndex, ConstId, DebugIndex, FieldExprId, SigExprId, SinkId, StateCellId, TransformChainId,
    ValueSlot,
};
use crate::ir::field::FieldExprIR;
use crate::ir::program::{BusCombineSpec, ConstantPool, FieldBusCombineSpec, SlotMeta, StateLayoutEntry, ValueRef};
use crate::ir::render::RenderSinkIR;
use crate::ir::schedule::StepIR;
use crate::ir::signal::SignalExprIR;
use crate::transform::TransformStepSpec;
use crate::types::TypeDesc;
use crate::value::{StorageClass, Value};

/// Accumulates every table a [`crate::ir::program::CompiledProgram`] needs,
/// written to by block lowerers during pass 6 (`block_lowering`) and by bus
/// lowering during pass 7.
#[derive(Debug, Default)]
pub struct IrBuilder {
    /// Ordered signal-expression nodes.
    pub signal_exprs: Vec<SignalExprIR>,
    /// Ordered field-expression nodes.
    pub field_exprs: Vec<FieldExprIR>,
    /// Typed constant pool.
    pub constants: ConstantPool,
    /// Persistent-state layout entries emitted so far.
    pub state_layout: Vec<StateLayoutEntry>,
    /// Metadata for every allocated value slot.
    pub slot_meta: Vec<SlotMeta>,
    /// Render sink declarations.
    pub sinks: Vec<RenderSinkIR>,
    /// Schedule steps emitted so far, in emission order. Passes 6-7 walk
    /// the unified block/bus order from [`crate::lowering::graph::build_order`],
    /// so emission order already is topological order; pass 8 assembles the
    /// final program from this `Vec` as-is, with no further re-sort.
    pub schedule: Vec<StepIR>,
    /// Constants written once at program-load time.
    pub initial_slot_values: BTreeMap<ValueSlot, Value>,
    /// Default source for each input slot lacking a wire.
    pub default_sources: BTreeMap<ValueSlot, ValueRef>,
    /// Bus root metadata registered by bus lowering.
    pub bus_roots: BTreeMap<BusIndex, ValueRef>,
    /// Runtime combine plan for every bus with at least one publisher,
    /// registered by bus lowering (pass 7).
    pub bus_combines: BTreeMap<BusIndex, BusCombineSpec>,
    /// Runtime combine plan for every `Field`-world bus with at least one
    /// publisher, registered by bus lowering (pass 7).
    pub field_bus_combines: BTreeMap<BusIndex, FieldBusCombineSpec>,
    /// Compiled transform chains, indexed by `TransformChainId`.
    pub transform_chains: Vec<Vec<TransformStepSpec>>,
    /// State cell assigned to each stateful step of each transform chain,
    /// parallel to `transform_chains` (same outer index, same step index).
    pub transform_state_cells: Vec<Vec<Option<StateCellId>>>,
    /// Debug-index labels accumulated while lowering.
    pub debug_index: DebugIndex,
    /// Next un-allocated dense index for each entity kind, tracked
    /// separately from the `Vec` lengths above so lowering can reserve an id
    /// before its backing storage exists (e.g. a forward-referenced slot).
    next_slot: u32,
}

impl IrBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh value slot with the given metadata.
    pub fn alloc_slot(&mut self, ty: TypeDesc, storage: StorageClass, debug_name: Option<String>) -> ValueSlot {
        let slot = ValueSlot(self.next_slot);
        self.next_slot += 1;
        self.slot_meta.push(SlotMeta {
            storage,
            ty,
            debug_name,
        });
        slot
    }

    /// Interns a constant into the pool.
    pub fn push_const(&mut self, value: Value) -> ConstId {
        self.constants.push(value)
    }

    /// Appends a signal-expression node, returning its id.
    pub fn push_signal_expr(&mut self, node: SignalExprIR) -> SigExprId {
        let id = SigExprId(u32::try_from(self.signal_exprs.len()).unwrap_or(u32::MAX));
        self.signal_exprs.push(node);
        id
    }

    /// Appends a field-expression node, returning its id.
    pub fn push_field_expr(&mut self, node: FieldExprIR) -> FieldExprId {
        let id = FieldExprId(u32::try_from(self.field_exprs.len()).unwrap_or(u32::MAX));
        self.field_exprs.push(node);
        id
    }

    /// Reserves a new persistent scalar state cell, recording it in the
    /// layout under the given stable cross-recompile `identity` (see
    /// [`crate::ident::transform_state_identity`] and
    /// [`crate::ident::operator_state_identity`]).
    pub fn reserve_scalar_state_cell(&mut self, identity: crate::ident::Hash) -> StateCellId {
        let id = StateCellId(u32::try_from(self.state_layout.len()).unwrap_or(u32::MAX));
        self.state_layout.push(StateLayoutEntry {
            cell_id: id,
            storage: StorageClass::F64,
            element_count: 1,
            identity,
        });
        id
    }

    /// Registers a compiled transform chain plus the state cell (if any)
    /// reserved for each of its steps, returning the chain's id. `cells` must
    /// be the same length as `chain`, with `None` at stateless step indices.
    pub fn push_transform_chain(
        &mut self,
        chain: Vec<TransformStepSpec>,
        cells: Vec<Option<StateCellId>>,
    ) -> TransformChainId {
        debug_assert_eq!(chain.len(), cells.len());
        let id = TransformChainId(u32::try_from(self.transform_chains.len()).unwrap_or(u32::MAX));
        self.transform_chains.push(chain);
        self.transform_state_cells.push(cells);
        id
    }

    /// Registers a render sink, returning its id.
    pub fn register_sink(&mut self, kind: impl Into<String>, inputs: Vec<ValueSlot>, out_frame_slot: ValueSlot) -> SinkId {
        let id = SinkId(u32::try_from(self.sinks.len()).unwrap_or(u32::MAX));
        self.sinks.push(RenderSinkIR {
            id,
            kind: kind.into(),
            inputs,
            out_frame_slot,
        });
        id
    }

    /// Registers a bus root value reference, for debugging and future
    /// optimization (§4.7).
    pub fn register_bus_root(&mut self, bus: BusIndex, value: ValueRef) {
        self.bus_roots.insert(bus, value);
    }

    /// Registers the resolved combine plan for a bus.
    pub fn register_bus_combine(&mut self, bus: BusIndex, spec: BusCombineSpec) {
        self.bus_combines.insert(bus, spec);
    }

    /// Registers the resolved combine plan for a `Field`-world bus.
    pub fn register_field_bus_combine(&mut self, bus: BusIndex, spec: FieldBusCombineSpec) {
        self.field_bus_combines.insert(bus, spec);
    }

    /// Records a default source for an input slot.
    pub fn set_default_source(&mut self, slot: ValueSlot, value: ValueRef) {
        self.default_sources.insert(slot, value);
    }

    /// Records a constant written once at program-load time.
    pub fn set_initial_value(&mut self, slot: ValueSlot, value: Value) {
        self.initial_slot_values.insert(slot, value);
    }

    /// Appends a schedule step in emission order.
    pub fn push_step(&mut self, step: StepIR) {
        self.schedule.push(step);
    }

    /// Pushes a signal node and immediately allocates a slot plus a
    /// `SignalEval` step for it, forcing the new slot's dense index to equal
    /// the node's `SigExprId`.
    ///
    /// `FieldExprIR::SampleSignal` nodes reference a `SigExprId` whose
    /// sampled value the field materializer reads back out of a `ValueSlot`
    /// by reusing the same numeric index (see
    /// `runtime::field_materializer::broadcast_signal_slot`), rather than
    /// carrying a second id. Keeping the two dense index spaces in lockstep
    /// here is what makes that convention hold; callers that feed a signal
    /// into `SampleSignal` must allocate it through this method rather than
    /// `push_signal_expr`/`alloc_slot` separately.
    pub fn push_time_linked_signal(
        &mut self,
        node: SignalExprIR,
        ty: TypeDesc,
        storage: StorageClass,
        debug_name: Option<String>,
    ) -> (SigExprId, ValueSlot) {
        while self.signal_exprs.len() < self.next_slot as usize {
            self.signal_exprs.push(SignalExprIR::TimeAbs);
        }
        let expr = self.push_signal_expr(node);
        let slot = self.alloc_slot(ty, storage, debug_name);
        debug_assert_eq!(expr.index(), slot.index());
        self.push_step(StepIR::SignalEval { expr, out_slot: slot });
        (expr, slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TypeDesc, ValueDomain, World};

    #[test]
    fn alloc_slot_assigns_increasing_indices() {
        let mut builder = IrBuilder::new();
        let a = builder.alloc_slot(TypeDesc::core(World::Signal, ValueDomain::Number), StorageClass::F64, None);
        let b = builder.alloc_slot(TypeDesc::core(World::Signal, ValueDomain::Number), StorageClass::F64, None);
        assert_eq!(a.index() + 1, b.index());
        assert_eq!(builder.slot_meta.len(), 2);
    }

    #[test]
    fn reserve_scalar_state_cell_grows_layout() {
        let mut builder = IrBuilder::new();
        let cell = builder.reserve_scalar_state_cell([7; 32]);
        assert_eq!(builder.state_layout.len(), 1);
        assert_eq!(builder.state_layout[0].cell_id, cell);
        assert_eq!(builder.state_layout[0].identity, [7; 32]);
    }
}
