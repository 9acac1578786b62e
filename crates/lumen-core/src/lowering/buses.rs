// SPDX-License-Identifier: Apache-2.0
//! Bus lowering (§4.7, pass 7): resolves each declared bus's publisher set
//! into a deterministic combine plan and a root value slot listeners read.
use std::collections::{BTreeMap, BTreeSet};

use crate::bus::{self, CombineMode};
use crate::builder::IrBuilder;
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink};
use crate::ident::{BlockId, BusIndex, PortSlot, SigExprId, ValueSlot};
use crate::ir::program::{BusCombineSpec, ValueRef};
use crate::ir::schedule::StepIR;
use crate::ir::signal::SignalExprIR;
use crate::lowering::blocks::BlockLoweringState;
use crate::patch::Patch;
use crate::types::World;
use crate::value::{StorageClass, Value};

/// Dense `BusIndex` assignment for every declared bus, stable within one
/// compile and independent of authoring order.
#[derive(Debug, Default)]
pub struct BusLoweringState {
    /// Dense index assigned to every declared bus, by name.
    pub bus_index: BTreeMap<String, BusIndex>,
}

impl BusLoweringState {
    /// Assigns dense `BusIndex` values in lexicographic name order.
    #[must_use]
    pub fn new(patch: &Patch) -> Self {
        let names: BTreeSet<String> = patch.buses.iter().map(|b| b.name.clone()).collect();
        let bus_index = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name, BusIndex(u32::try_from(i).unwrap_or(u32::MAX))))
            .collect();
        Self { bus_index }
    }
}

/// Lowers one declared bus: gathers its publishers' already-lowered output
/// slots, validates reserved-bus and combine-mode legality, and emits a
/// `BusCombine` node plus the root slot listeners will read.
///
/// A bus with no resolved publishers contributes no root slot; any listener
/// reading it falls back to its own default source during block lowering,
/// with an [`DiagnosticCode::EmptyBusNoDefault`] warning if it has listeners.
pub fn lower_bus(
    patch: &Patch,
    builder: &mut IrBuilder,
    diags: &mut DiagnosticSink,
    block_state: &BlockLoweringState,
    bus_state: &BusLoweringState,
    bus_roots: &mut BTreeMap<String, ValueSlot>,
    bus_name: &str,
) {
    let Some(decl) = patch.buses.iter().find(|b| b.name == bus_name) else {
        return;
    };
    let Some(&bus_index) = bus_state.bus_index.get(bus_name) else {
        return;
    };
    builder.debug_index.record_bus(bus_index, bus_name.to_string());

    let reserved = bus::reserved_bus(bus_name);
    let mut combine = decl.combine;
    if let Some(r) = reserved {
        if r.combine != decl.combine {
            diags.push(
                Diagnostic::error(
                    DiagnosticCode::ReservedBusMisuse,
                    format!("reserved bus '{bus_name}' declares combine {:?}, locked to {:?}", decl.combine, r.combine),
                )
                .at_bus(bus_index),
            );
        }
        combine = r.combine;
    }

    let mut resolved: Vec<(BlockId, PortSlot, (u32, u32, u32), ValueSlot)> = Vec::new();
    for publish in patch.bus_publishes.iter().filter(|p| p.bus == bus_name) {
        let Some(slots) = block_state.block_outputs.get(&publish.block) else {
            continue;
        };
        let Some(&slot) = slots.get(publish.slot.0 as usize) else {
            continue;
        };
        resolved.push((publish.block.clone(), publish.slot, publish.sort_key, slot));
    }

    if resolved.is_empty() {
        let has_listener = patch.bus_listens.iter().any(|l| l.bus == bus_name);
        if has_listener {
            diags.push(
                Diagnostic::warning(
                    DiagnosticCode::EmptyBusNoDefault,
                    format!("bus '{bus_name}' has listeners but no publishers and no covering default"),
                )
                .at_bus(bus_index),
            );
        }
        return;
    }

    let Some(ty) = resolved
        .first()
        .and_then(|(_, _, _, slot)| builder.slot_meta.get(slot.index()))
        .map(|m| m.ty)
    else {
        return;
    };

    if let Some(r) = reserved {
        if ty.domain != r.domain || ty.world != r.world {
            diags.push(
                Diagnostic::error(
                    DiagnosticCode::ReservedBusMisuse,
                    format!("reserved bus '{bus_name}' publisher type does not match its locked shape"),
                )
                .at_bus(bus_index),
            );
        }
    }

    if !ty.is_numeric_combinable() && !combine.legal_for_non_numeric() {
        diags.push(
            Diagnostic::error(
                DiagnosticCode::BusCombineInvalid,
                format!("bus '{bus_name}' combine mode {combine:?} is not legal for its non-numeric type"),
            )
            .at_bus(bus_index),
        );
        combine = CombineMode::Last;
    }

    let publishers: Vec<bus::Publisher> = resolved
        .iter()
        .map(|(block, slot, sort_key, _)| bus::Publisher {
            sort_key: *sort_key,
            block: block.clone(),
            slot: *slot,
            value: Value::F64(0.0),
        })
        .collect();
    let slot_by_key: BTreeMap<(BlockId, PortSlot), ValueSlot> = resolved
        .iter()
        .map(|(block, slot, _, value_slot)| ((block.clone(), *slot), *value_slot))
        .collect();
    let sorted = bus::sorted_publishers(publishers);

    if ty.world == World::Field {
        let domain_slot = sorted
            .iter()
            .find_map(|p| {
                let value_slot = slot_by_key[&(p.block.clone(), p.slot)];
                block_state.field_domain_of.get(&value_slot).copied()
            });
        let Some(domain_slot) = domain_slot else {
            diags.push(
                Diagnostic::error(
                    DiagnosticCode::InternalLoweringInvariant,
                    format!("bus '{bus_name}' has field-world publishers with no resolved domain"),
                )
                .at_bus(bus_index),
            );
            return;
        };
        let operands: Vec<crate::ident::FieldExprId> = sorted
            .iter()
            .filter_map(|p| {
                let value_slot = slot_by_key[&(p.block.clone(), p.slot)];
                block_state.field_expr_of.get(&value_slot).copied()
            })
            .collect();
        if operands.len() != sorted.len() {
            diags.push(
                Diagnostic::error(
                    DiagnosticCode::InternalLoweringInvariant,
                    format!("bus '{bus_name}' has a field-world publisher with no resolved field expression"),
                )
                .at_bus(bus_index),
            );
            return;
        }

        builder.register_field_bus_combine(bus_index, crate::ir::program::FieldBusCombineSpec { combine, operands });

        let combine_expr = builder.push_field_expr(crate::ir::field::FieldExprIR::BusCombine(bus_index));
        let root_slot = builder.alloc_slot(ty, StorageClass::for_domain(ty.domain), Some(format!("bus.{bus_name}.combined")));
        let element_count_slot = builder.alloc_slot(
            crate::types::TypeDesc::internal(crate::types::World::Special, crate::types::ValueDomain::Number),
            StorageClass::U32,
            None,
        );
        builder.push_step(StepIR::Materialize {
            expr: combine_expr,
            domain_slot,
            buffer_slot: root_slot,
            element_count_slot,
        });
        builder.register_bus_root(bus_index, ValueRef::Slot(root_slot));
        bus_roots.insert(bus_name.to_string(), root_slot);
        return;
    }

    let operands: Vec<SigExprId> = sorted
        .iter()
        .map(|p| {
            let value_slot = slot_by_key[&(p.block.clone(), p.slot)];
            builder.push_signal_expr(SignalExprIR::InputSlot(value_slot))
        })
        .collect();

    builder.register_bus_combine(bus_index, BusCombineSpec { combine, operands });

    let combine_expr = builder.push_signal_expr(SignalExprIR::BusCombine(bus_index));
    let root_slot = builder.alloc_slot(ty, StorageClass::for_domain(ty.domain), Some(format!("bus.{bus_name}.combined")));
    builder.push_step(StepIR::SignalEval {
        expr: combine_expr,
        out_slot: root_slot,
    });
    builder.register_bus_root(bus_index, ValueRef::Slot(root_slot));
    bus_roots.insert(bus_name.to_string(), root_slot);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::{Block, BusDecl, BusPublish};
    use crate::registry::Registry;
    use std::collections::BTreeMap as Map;

    #[test]
    fn bus_with_one_publisher_resolves_a_root_slot() {
        let registry = Registry::with_builtins();
        let mut patch = Patch::new(0);
        patch.insert_block(
            BlockId("osc".to_string()),
            Block {
                block_type: "Osc.sine".to_string(),
                params: Map::new(),
                inputs: vec![],
                outputs: vec![],
            },
        );
        patch.add_bus(BusDecl {
            name: "energy".to_string(),
            combine: CombineMode::Sum,
        });
        patch.bus_publishes.push(BusPublish {
            bus: "energy".to_string(),
            block: BlockId("osc".to_string()),
            slot: PortSlot(0),
            sort_key: (0, 0, 0),
        });

        let mut builder = IrBuilder::new();
        let mut diags = DiagnosticSink::new();
        let mut block_state = BlockLoweringState::new(&patch);
        let bus_state = BusLoweringState::new(&patch);
        let mut bus_roots = BTreeMap::new();
        crate::lowering::blocks::lower_block(
            &registry,
            &patch,
            &mut builder,
            &mut diags,
            &mut block_state,
            &bus_roots,
            &BlockId("osc".to_string()),
        );
        lower_bus(&patch, &mut builder, &mut diags, &block_state, &bus_state, &mut bus_roots, "energy");
        assert!(!diags.has_errors());
        assert!(bus_roots.contains_key("energy"));
    }

    #[test]
    fn reserved_bus_combine_mismatch_is_diagnosed() {
        let mut patch = Patch::new(0);
        patch.insert_block(
            BlockId("osc".to_string()),
            Block {
                block_type: "Osc.sine".to_string(),
                params: Map::new(),
                inputs: vec![],
                outputs: vec![],
            },
        );
        patch.add_bus(BusDecl {
            name: "time".to_string(),
            combine: CombineMode::Sum,
        });
        patch.bus_publishes.push(BusPublish {
            bus: "time".to_string(),
            block: BlockId("osc".to_string()),
            slot: PortSlot(0),
            sort_key: (0, 0, 0),
        });

        let registry = Registry::with_builtins();
        let mut builder = IrBuilder::new();
        let mut diags = DiagnosticSink::new();
        let mut block_state = BlockLoweringState::new(&patch);
        let bus_state = BusLoweringState::new(&patch);
        let mut bus_roots = BTreeMap::new();
        crate::lowering::blocks::lower_block(
            &registry,
            &patch,
            &mut builder,
            &mut diags,
            &mut block_state,
            &bus_roots,
            &BlockId("osc".to_string()),
        );
        lower_bus(&patch, &mut builder, &mut diags, &block_state, &bus_state, &mut bus_roots, "time");
        assert!(diags.has_errors());
    }

    #[test]
    fn bus_with_listener_and_no_publisher_warns() {
        let mut patch = Patch::new(0);
        patch.add_bus(BusDecl {
            name: "myBus".to_string(),
            combine: CombineMode::Last,
        });
        patch.bus_listens.push(crate::patch::BusListen {
            bus: "myBus".to_string(),
            block: BlockId("listener".to_string()),
            slot: PortSlot(0),
        });
        let mut builder = IrBuilder::new();
        let mut diags = DiagnosticSink::new();
        let block_state = BlockLoweringState::new(&patch);
        let bus_state = BusLoweringState::new(&patch);
        let mut bus_roots = BTreeMap::new();
        lower_bus(&patch, &mut builder, &mut diags, &block_state, &bus_state, &mut bus_roots, "myBus");
        assert!(!diags.has_errors());
        assert!(!bus_roots.contains_key("myBus"));
    }
}
