// SPDX-License-Identifier: Apache-2.0
//! Block lowering (§4.3 pass 6): resolves each block instance's declared
//! inputs against wires, bus listens, and default sources, then hands off to
//! the block registry's `lower` function to emit IR.
use std::collections::BTreeMap;

use crate::builder::IrBuilder;
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink};
use crate::ident::{transform_state_identity, BlockId, BlockIndex, PortIndex, ValueSlot};
use crate::ir::field::FieldExprIR;
use crate::ir::schedule::StepIR;
use crate::ir::signal::SignalExprIR;
use crate::patch::{DefaultSourceSpec, Patch};
use crate::registry::block::{BlockLowerCtx, BlockLowerResult, PortSpec, ResolvedInput};
use crate::registry::Registry;
use crate::types::World;
use crate::value::Value;

/// Mutable bookkeeping threaded across every block-lowering call, carried
/// separately from [`IrBuilder`] so block lowering's own bookkeeping doesn't
/// need to borrow through it.
#[derive(Debug, Default)]
pub struct BlockLoweringState {
    /// Dense index assigned to every authored block, in `BlockId` order.
    pub block_index: BTreeMap<BlockId, BlockIndex>,
    /// Output slots produced by each already-lowered block, in declared port order.
    pub block_outputs: BTreeMap<BlockId, Vec<ValueSlot>>,
    /// For a `Field`-world output slot, which domain slot it was materialized
    /// over; consulted when a wire transform chain forces re-materialization
    /// or a bus combines field publishers.
    pub field_domain_of: BTreeMap<ValueSlot, ValueSlot>,
    /// For a `Field`-world output slot, the field-expression recipe backing
    /// it. A bus combining field publishers resolves their recipes through
    /// this instead of re-reading their output slot, which holds a
    /// `DomainRef` handle rather than per-element data.
    pub field_expr_of: BTreeMap<ValueSlot, crate::ident::FieldExprId>,
}

impl BlockLoweringState {
    /// Assigns dense `BlockIndex` values to every authored block, in
    /// authored-id order (the `BTreeMap` is already sorted).
    #[must_use]
    pub fn new(patch: &Patch) -> Self {
        let block_index = patch
            .blocks
            .keys()
            .enumerate()
            .map(|(i, id)| (id.clone(), BlockIndex(u32::try_from(i).unwrap_or(u32::MAX))))
            .collect();
        Self {
            block_index,
            ..Self::default()
        }
    }
}

fn resolve_input(
    registry: &Registry,
    patch: &Patch,
    builder: &mut IrBuilder,
    diags: &mut DiagnosticSink,
    state: &mut BlockLoweringState,
    bus_roots: &BTreeMap<String, ValueSlot>,
    block_id: &BlockId,
    block_index: BlockIndex,
    port_index: PortIndex,
    port_slot: crate::ident::PortSlot,
    port_spec: &PortSpec,
) -> ResolvedInput {
    if let Some(wire) = patch
        .wires
        .iter()
        .find(|w| w.to_block == *block_id && w.to_slot == port_slot)
    {
        let Some(upstream_slots) = state.block_outputs.get(&wire.from_block) else {
            diags.push(
                Diagnostic::error(
                    DiagnosticCode::InternalLoweringInvariant,
                    format!("wire source block '{}' was not lowered before its target", wire.from_block),
                )
                .at_block(block_index),
            );
            return ResolvedInput::Const(Value::F64(0.0));
        };
        let Some(&upstream_slot) = upstream_slots.get(wire.from_slot.0 as usize) else {
            diags.push(
                Diagnostic::error(
                    DiagnosticCode::InternalLoweringInvariant,
                    format!("wire source port {}.{} produced no output slot", wire.from_block, wire.from_slot.0),
                )
                .at_block(block_index),
            );
            return ResolvedInput::Const(Value::F64(0.0));
        };

        let has_enabled_transform = wire.transforms.iter().any(|s| s.enabled);
        if !has_enabled_transform {
            return ResolvedInput::Slot(upstream_slot);
        }

        let upstream_world = builder
            .slot_meta
            .get(upstream_slot.index())
            .map_or(World::Signal, |m| m.ty.world);
        let cells: Vec<Option<crate::ident::StateCellId>> = wire
            .transforms
            .iter()
            .enumerate()
            .map(|(step_index, step)| {
                let stateful = step.enabled
                    && registry
                        .transforms
                        .get(&step.id)
                        .is_some_and(|d| d.stateful);
                if stateful {
                    let identity = transform_state_identity(block_index, port_index, u32::try_from(step_index).unwrap_or(u32::MAX));
                    Some(builder.reserve_scalar_state_cell(identity))
                } else {
                    None
                }
            })
            .collect();
        let chain_id = builder.push_transform_chain(wire.transforms.clone(), cells);

        match upstream_world {
            World::Field => {
                let input_field = builder.push_field_expr(FieldExprIR::InputSlot(upstream_slot));
                let transformed = builder.push_field_expr(FieldExprIR::Transform {
                    chain: chain_id,
                    input: input_field,
                });
                let domain_slot = state
                    .field_domain_of
                    .get(&upstream_slot)
                    .copied()
                    .unwrap_or(upstream_slot);
                let buffer_slot = builder.alloc_slot(port_spec.ty, crate::value::StorageClass::for_domain(port_spec.ty.domain), None);
                let element_count_slot = builder.alloc_slot(
                    crate::types::TypeDesc::internal(World::Special, crate::types::ValueDomain::Number),
                    crate::value::StorageClass::U32,
                    None,
                );
                builder.push_step(StepIR::Materialize {
                    expr: transformed,
                    domain_slot,
                    buffer_slot,
                    element_count_slot,
                });
                state.field_domain_of.insert(buffer_slot, domain_slot);
                ResolvedInput::Slot(buffer_slot)
            }
            _ => {
                let input_expr = builder.push_signal_expr(SignalExprIR::InputSlot(upstream_slot));
                let transformed = builder.push_signal_expr(SignalExprIR::Transform {
                    chain: chain_id,
                    input: input_expr,
                });
                let slot = builder.alloc_slot(port_spec.ty, crate::value::StorageClass::for_domain(port_spec.ty.domain), None);
                builder.push_step(StepIR::SignalEval { expr: transformed, out_slot: slot });
                ResolvedInput::Slot(slot)
            }
        }
    } else if let Some(listen) = patch
        .bus_listens
        .iter()
        .find(|l| l.block == *block_id && l.slot == port_slot)
    {
        match bus_roots.get(&listen.bus) {
            Some(&slot) => ResolvedInput::Slot(slot),
            None => default_or_unresolved(patch, diags, block_id, block_index, port_slot, port_spec, bus_roots),
        }
    } else {
        default_or_unresolved(patch, diags, block_id, block_index, port_slot, port_spec, bus_roots)
    }
}

fn default_or_unresolved(
    patch: &Patch,
    diags: &mut DiagnosticSink,
    block_id: &BlockId,
    block_index: BlockIndex,
    port_slot: crate::ident::PortSlot,
    port_spec: &PortSpec,
    bus_roots: &BTreeMap<String, ValueSlot>,
) -> ResolvedInput {
    match patch.default_sources.get(&(block_id.clone(), port_slot)) {
        Some(DefaultSourceSpec::Constant(value)) => ResolvedInput::Const(value.clone()),
        Some(DefaultSourceSpec::Bus(name)) => match bus_roots.get(name) {
            Some(&slot) => ResolvedInput::Slot(slot),
            None => ResolvedInput::Const(Value::safe_default(crate::value::StorageClass::for_domain(port_spec.ty.domain))),
        },
        None => {
            if port_spec.required {
                diags.push(
                    Diagnostic::error(
                        DiagnosticCode::UnresolvedInput,
                        format!("required input '{}' on block '{}' has neither a wire nor a default source", port_spec.name, block_id),
                    )
                    .at_block(block_index),
                );
            }
            ResolvedInput::Const(Value::safe_default(crate::value::StorageClass::for_domain(port_spec.ty.domain)))
        }
    }
}

/// Lowers one block instance, resolving its declared inputs and recording
/// its output slots for downstream wires and bus publishers to reference.
pub fn lower_block(
    registry: &Registry,
    patch: &Patch,
    builder: &mut IrBuilder,
    diags: &mut DiagnosticSink,
    state: &mut BlockLoweringState,
    bus_roots: &BTreeMap<String, ValueSlot>,
    block_id: &BlockId,
) {
    let Some(block) = patch.blocks.get(block_id) else {
        return;
    };
    let block_index = state.block_index[block_id];
    builder.debug_index.record_block(block_index, block_id.0.clone());

    let Some(descriptor) = registry.blocks.get(&block.block_type) else {
        // Already diagnosed during type checking; record empty outputs so
        // downstream wires fail with UnresolvedInput rather than panicking.
        state.block_outputs.insert(block_id.clone(), Vec::new());
        return;
    };

    let resolved_inputs: Vec<ResolvedInput> = descriptor
        .inputs
        .iter()
        .enumerate()
        .map(|(port_num, port_spec)| {
            let port_index = PortIndex(u32::try_from(port_num).unwrap_or(u32::MAX));
            let port_slot = crate::ident::PortSlot(u16::try_from(port_num).unwrap_or(u16::MAX));
            resolve_input(
                registry, patch, builder, diags, state, bus_roots, block_id, block_index, port_index, port_slot, port_spec,
            )
        })
        .collect();

    let mut lower_ctx = BlockLowerCtx {
        inputs: &resolved_inputs,
        params: &block.params,
        builder,
    };
    let BlockLowerResult {
        output_slots,
        output_field_exprs,
        output_domain_slots,
        diagnostics,
    } = (descriptor.lower)(&mut lower_ctx);
    for d in diagnostics {
        diags.push(d);
    }
    for (port_num, &slot) in output_slots.iter().enumerate() {
        let label = descriptor
            .outputs
            .get(port_num)
            .map_or_else(|| format!("out{port_num}"), |p| p.name.clone());
        builder.debug_index.record_slot(slot, format!("{block_id}.{label}"));
        builder
            .debug_index
            .record_port(block_index, PortIndex(u32::try_from(port_num).unwrap_or(u32::MAX)), label);
        if let Some(Some(field_expr)) = output_field_exprs.get(port_num) {
            state.field_expr_of.insert(slot, *field_expr);
        }
        if let Some(Some(domain_slot)) = output_domain_slots.get(port_num) {
            state.field_domain_of.insert(slot, *domain_slot);
        }
    }
    state.block_outputs.insert(block_id.clone(), output_slots);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    #[test]
    fn unresolved_required_input_is_diagnosed() {
        let registry = Registry::with_builtins();
        let mut patch = Patch::new(0);
        patch.insert_block(
            BlockId("grid".to_string()),
            crate::patch::Block {
                block_type: "PositionMapGrid".to_string(),
                params: Map::new(),
                inputs: vec![],
                outputs: vec![],
            },
        );
        let mut builder = IrBuilder::new();
        let mut diags = DiagnosticSink::new();
        let mut state = BlockLoweringState::new(&patch);
        let bus_roots = BTreeMap::new();
        lower_block(&registry, &patch, &mut builder, &mut diags, &mut state, &bus_roots, &BlockId("grid".to_string()));
        assert!(diags.has_errors());
        assert_eq!(state.block_outputs[&BlockId("grid".to_string())].len(), 1);
    }

    #[test]
    fn direct_wire_resolves_to_upstream_slot() {
        let registry = Registry::with_builtins();
        let mut patch = Patch::new(0);
        patch.insert_block(
            BlockId("domain".to_string()),
            crate::patch::Block {
                block_type: "GridDomain".to_string(),
                params: Map::from([("rows".to_string(), Value::F64(2.0)), ("cols".to_string(), Value::F64(2.0))]),
                inputs: vec![],
                outputs: vec![],
            },
        );
        patch.insert_block(
            BlockId("grid".to_string()),
            crate::patch::Block {
                block_type: "PositionMapGrid".to_string(),
                params: Map::new(),
                inputs: vec![],
                outputs: vec![],
            },
        );
        patch.add_wire(crate::patch::Wire {
            from_block: BlockId("domain".to_string()),
            from_slot: crate::ident::PortSlot(0),
            to_block: BlockId("grid".to_string()),
            to_slot: crate::ident::PortSlot(0),
            transforms: vec![],
        });
        let mut builder = IrBuilder::new();
        let mut diags = DiagnosticSink::new();
        let mut state = BlockLoweringState::new(&patch);
        let bus_roots = BTreeMap::new();
        lower_block(&registry, &patch, &mut builder, &mut diags, &mut state, &bus_roots, &BlockId("domain".to_string()));
        lower_block(&registry, &patch, &mut builder, &mut diags, &mut state, &bus_roots, &BlockId("grid".to_string()));
        assert!(!diags.has_errors());
        assert_eq!(state.block_outputs[&BlockId("grid".to_string())].len(), 1);
    }
}
