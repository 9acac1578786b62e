// SPDX-License-Identifier: Apache-2.0
//! Wire type checking (§4.3 pass 2). Validates every authored wire against
//! the block registry's declared port types before any IR is emitted, so a
//! malformed patch is fully diagnosed rather than partially lowered.
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink};
use crate::patch::Patch;
use crate::registry::Registry;
use crate::transform::TransformStepSpec;
use crate::types::ValueDomain;

/// Transform ids treated as explicit cross-world converters (§4.6): their
/// presence on a wire's chain is trusted to reconcile an otherwise
/// incompatible `(world, domain)` pair, rather than lowering re-deriving
/// each transform's output type.
const WORLD_CONVERTERS: &[&str] = &["constToSignal", "broadcastScalarToField"];

fn chain_has_converter(transforms: &[TransformStepSpec]) -> bool {
    transforms
        .iter()
        .any(|t| t.enabled && WORLD_CONVERTERS.contains(&t.id.as_str()))
}

/// Checks whether a wire's transform chain contains a converter appropriate
/// to the declared same-world domain change (§4.6). `toColor` is the only
/// built-in transform that changes domain rather than rescaling a value
/// within it, so it is the only chain member that can satisfy a domain
/// mismatch; an unrelated transform (e.g. `slewLimit`) never does, even if
/// enabled.
fn chain_has_domain_converter(transforms: &[TransformStepSpec], target: ValueDomain) -> bool {
    match target {
        ValueDomain::Color => transforms.iter().any(|t| t.enabled && t.id == "toColor"),
        _ => false,
    }
}

/// Checks every wire's endpoint types, recording a diagnostic per violation.
/// Returns without panicking on dangling block/port references; those are
/// reported as [`DiagnosticCode::UnknownBlockType`] or folded into a type
/// mismatch message rather than crashing the pipeline.
pub fn check_wires(registry: &Registry, patch: &Patch, diags: &mut DiagnosticSink) {
    for wire in &patch.wires {
        let Some(from_block) = patch.blocks.get(&wire.from_block) else {
            diags.push(Diagnostic::error(
                DiagnosticCode::TypeMismatch,
                format!("wire references unknown block '{}'", wire.from_block),
            ));
            continue;
        };
        let Some(to_block) = patch.blocks.get(&wire.to_block) else {
            diags.push(Diagnostic::error(
                DiagnosticCode::TypeMismatch,
                format!("wire references unknown block '{}'", wire.to_block),
            ));
            continue;
        };
        let Some(from_descriptor) = registry.blocks.get(&from_block.block_type) else {
            diags.push(Diagnostic::error(
                DiagnosticCode::UnknownBlockType,
                format!("block '{}' has unknown type '{}'", wire.from_block, from_block.block_type),
            ));
            continue;
        };
        let Some(to_descriptor) = registry.blocks.get(&to_block.block_type) else {
            diags.push(Diagnostic::error(
                DiagnosticCode::UnknownBlockType,
                format!("block '{}' has unknown type '{}'", wire.to_block, to_block.block_type),
            ));
            continue;
        };
        let Some(out_port) = from_descriptor.outputs.get(wire.from_slot.0 as usize) else {
            diags.push(Diagnostic::error(
                DiagnosticCode::TypeMismatch,
                format!("block '{}' has no output port #{}", wire.from_block, wire.from_slot.0),
            ));
            continue;
        };
        let Some(in_port) = to_descriptor.inputs.get(wire.to_slot.0 as usize) else {
            diags.push(Diagnostic::error(
                DiagnosticCode::TypeMismatch,
                format!("block '{}' has no input port #{}", wire.to_block, wire.to_slot.0),
            ));
            continue;
        };

        if out_port.ty.compatible(&in_port.ty) {
            continue;
        }
        if out_port.ty.world != in_port.ty.world {
            if chain_has_converter(&wire.transforms) {
                continue;
            }
            diags.push(Diagnostic::error(
                DiagnosticCode::WorldMismatch,
                format!(
                    "wire {}.{} -> {}.{} crosses worlds ({:?} -> {:?}) with no converter transform",
                    wire.from_block, wire.from_slot.0, wire.to_block, wire.to_slot.0, out_port.ty.world, in_port.ty.world
                ),
            ));
            continue;
        }
        if chain_has_domain_converter(&wire.transforms, in_port.ty.domain) {
            continue;
        }
        diags.push(Diagnostic::error(
            DiagnosticCode::TypeMismatch,
            format!(
                "wire {}.{} -> {}.{} has incompatible domains ({:?} -> {:?})",
                wire.from_block, wire.from_slot.0, wire.to_block, wire.to_slot.0, out_port.ty.domain, in_port.ty.domain
            ),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::{BlockId, PortSlot};
    use crate::patch::{Block, Wire};
    use crate::value::Value;
    use std::collections::BTreeMap;

    fn osc(id: &str) -> (BlockId, Block) {
        (
            BlockId(id.to_string()),
            Block {
                block_type: "Osc.sine".to_string(),
                params: BTreeMap::new(),
                inputs: vec![],
                outputs: vec![],
            },
        )
    }

    #[test]
    fn compatible_signal_to_signal_wire_is_silent() {
        let registry = Registry::with_builtins();
        let mut patch = Patch::new(0);
        let (id_a, block_a) = osc("a");
        patch.insert_block(id_a.clone(), block_a);
        patch.insert_block(
            BlockId("domain".to_string()),
            Block {
                block_type: "GridDomain".to_string(),
                params: BTreeMap::new(),
                inputs: vec![],
                outputs: vec![],
            },
        );
        patch.insert_block(
            BlockId("bc".to_string()),
            Block {
                block_type: "BroadcastPhaseToField".to_string(),
                params: BTreeMap::new(),
                inputs: vec![],
                outputs: vec![],
            },
        );
        patch.add_wire(Wire {
            from_block: BlockId("domain".to_string()),
            from_slot: PortSlot(0),
            to_block: BlockId("bc".to_string()),
            to_slot: PortSlot(0),
            transforms: vec![],
        });
        let mut diags = DiagnosticSink::new();
        check_wires(&registry, &patch, &mut diags);
        assert!(!diags.has_errors());
    }

    #[test]
    fn world_mismatch_without_converter_is_rejected() {
        let registry = Registry::with_builtins();
        let mut patch = Patch::new(0);
        let (id_a, block_a) = osc("osc");
        patch.insert_block(id_a.clone(), block_a);
        patch.insert_block(
            BlockId("render".to_string()),
            Block {
                block_type: "RenderInstances2D".to_string(),
                params: BTreeMap::new(),
                inputs: vec![],
                outputs: vec![],
            },
        );
        patch.add_wire(Wire {
            from_block: id_a,
            from_slot: PortSlot(0),
            to_block: BlockId("render".to_string()),
            to_slot: PortSlot(0),
            transforms: vec![],
        });
        let mut diags = DiagnosticSink::new();
        check_wires(&registry, &patch, &mut diags);
        assert!(diags.has_errors());
    }

    #[test]
    fn world_mismatch_with_converter_transform_is_accepted() {
        let registry = Registry::with_builtins();
        let mut patch = Patch::new(0);
        let (id_a, block_a) = osc("osc");
        patch.insert_block(id_a.clone(), block_a);
        patch.insert_block(
            BlockId("render".to_string()),
            Block {
                block_type: "RenderInstances2D".to_string(),
                params: BTreeMap::new(),
                inputs: vec![],
                outputs: vec![],
            },
        );
        patch.add_wire(Wire {
            from_block: id_a,
            from_slot: PortSlot(0),
            to_block: BlockId("render".to_string()),
            to_slot: PortSlot(0),
            transforms: vec![TransformStepSpec {
                id: "broadcastScalarToField".to_string(),
                enabled: true,
                params: BTreeMap::new(),
            }],
        });
        let mut diags = DiagnosticSink::new();
        check_wires(&registry, &patch, &mut diags);
        assert!(!diags.has_errors());
    }

    fn grid_to_render_colors_patch(transforms: Vec<TransformStepSpec>) -> Patch {
        let mut patch = Patch::new(0);
        patch.insert_block(
            BlockId("grid".to_string()),
            Block {
                block_type: "PositionMapGrid".to_string(),
                params: BTreeMap::new(),
                inputs: vec![],
                outputs: vec![],
            },
        );
        patch.insert_block(
            BlockId("render".to_string()),
            Block {
                block_type: "RenderInstances2D".to_string(),
                params: BTreeMap::new(),
                inputs: vec![],
                outputs: vec![],
            },
        );
        patch.add_wire(Wire {
            from_block: BlockId("grid".to_string()),
            from_slot: PortSlot(0),
            to_block: BlockId("render".to_string()),
            to_slot: PortSlot(1),
            transforms,
        });
        patch
    }

    #[test]
    fn same_world_domain_mismatch_with_unrelated_transform_is_rejected() {
        let registry = Registry::with_builtins();
        let patch = grid_to_render_colors_patch(vec![TransformStepSpec {
            id: "slewLimit".to_string(),
            enabled: true,
            params: BTreeMap::from([("rate".to_string(), Value::F64(10.0))]),
        }]);
        let mut diags = DiagnosticSink::new();
        check_wires(&registry, &patch, &mut diags);
        assert!(diags.has_errors());
    }

    #[test]
    fn same_world_domain_mismatch_with_matching_converter_is_accepted() {
        let registry = Registry::with_builtins();
        let patch = grid_to_render_colors_patch(vec![TransformStepSpec {
            id: "toColor".to_string(),
            enabled: true,
            params: BTreeMap::new(),
        }]);
        let mut diags = DiagnosticSink::new();
        check_wires(&registry, &patch, &mut diags);
        assert!(!diags.has_errors());
    }
}
