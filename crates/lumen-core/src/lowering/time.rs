// SPDX-License-Identifier: Apache-2.0
//! Time topology (§4.1, pass 3): locates the patch's single `TimeRoot`
//! block and derives the declared [`TimeModel`] plus the four reserved time
//! slots every frame's `TimeDerive` step writes.
use crate::builder::IrBuilder;
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink};
use crate::ident::{BlockId, ValueSlot};
use crate::ir::program::TimeModel;
use crate::ir::schedule::StepIR;
use crate::patch::Patch;
use crate::registry::block::TimeModelKind;
use crate::registry::Registry;
use crate::types::{TypeDesc, ValueDomain, World};
use crate::value::StorageClass;

/// The four slots every frame's `TimeDerive` step writes, plus the block
/// that declared the time root (needed later so block lowering can route
/// its declared output directly to `t_model_slot` without re-emitting a
/// second, orphaned value).
pub struct TimeTopology {
    /// The declared time model.
    pub model: TimeModel,
    /// The single `TimeRoot` block instance, if resolution succeeded.
    pub root_block: Option<BlockId>,
    /// Absolute wall-time slot.
    pub t_abs_slot: ValueSlot,
    /// Model-time slot.
    pub t_model_slot: ValueSlot,
    /// Wrapped-phase slot.
    pub phase01_slot: ValueSlot,
    /// Wrap-event slot.
    pub wrap_event_slot: ValueSlot,
}

fn param_f64(block: &crate::patch::Block, name: &str, default: f64) -> f64 {
    block.params.get(name).and_then(crate::value::Value::as_f64).unwrap_or(default)
}

/// Resolves the patch's time topology (invariant 1: exactly one `TimeRoot`).
///
/// Always allocates the four reserved slots and emits the `TimeDerive` step
/// first in the schedule, even when resolution fails, so later passes have
/// a stable time model to evaluate against (falling back to `Infinite`) and
/// the diagnostic set stays complete rather than cascading into unrelated
/// `UnresolvedInput` noise.
pub fn resolve(registry: &Registry, patch: &Patch, builder: &mut IrBuilder, diags: &mut DiagnosticSink) -> TimeTopology {
    let time_roots: Vec<&BlockId> = patch
        .blocks
        .iter()
        .filter(|(_, block)| registry.blocks.get(&block.block_type).is_some_and(|d| d.is_time_root))
        .map(|(id, _)| id)
        .collect();

    let (model, root_block) = match time_roots.as_slice() {
        [] => {
            diags.push(Diagnostic::error(DiagnosticCode::MissingTimeRoot, "patch declares no TimeRoot block"));
            (TimeModel::Infinite, None)
        }
        [only] => {
            let block = &patch.blocks[*only];
            let descriptor = registry.blocks.get(&block.block_type);
            let kind = descriptor.and_then(|d| d.time_model_kind);
            let model = match kind {
                Some(TimeModelKind::Finite) => TimeModel::Finite {
                    duration_ms: param_f64(block, "durationMs", 1000.0),
                },
                _ => TimeModel::Infinite,
            };
            (model, Some((*only).clone()))
        }
        many => {
            let ids: Vec<String> = many.iter().map(|id| id.0.clone()).collect();
            diags.push(Diagnostic::error(
                DiagnosticCode::MultipleTimeRoots,
                format!("patch declares {} TimeRoot blocks: {}", many.len(), ids.join(", ")),
            ));
            (TimeModel::Infinite, None)
        }
    };

    let t_abs_slot = builder.alloc_slot(
        TypeDesc::core(World::Signal, ValueDomain::TimeMs),
        StorageClass::F64,
        Some("time.tAbsMs".to_string()),
    );
    let t_model_slot = builder.alloc_slot(
        TypeDesc::core(World::Signal, ValueDomain::TimeMs),
        StorageClass::F64,
        Some("time.tModelMs".to_string()),
    );
    let phase01_slot = builder.alloc_slot(
        TypeDesc::core(World::Signal, ValueDomain::Phase01),
        StorageClass::F64,
        Some("time.phase01".to_string()),
    );
    let wrap_event_slot = builder.alloc_slot(
        TypeDesc::internal(World::Event, ValueDomain::Boolean),
        StorageClass::I32,
        Some("time.wrapEvent".to_string()),
    );
    builder.push_step(StepIR::TimeDerive {
        t_abs_slot,
        t_model_slot,
        phase01_slot,
        wrap_event_slot,
    });

    TimeTopology {
        model,
        root_block,
        t_abs_slot,
        t_model_slot,
        phase01_slot,
        wrap_event_slot,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn missing_time_root_is_an_error() {
        let registry = Registry::with_builtins();
        let patch = Patch::new(0);
        let mut builder = IrBuilder::new();
        let mut diags = DiagnosticSink::new();
        let topo = resolve(&registry, &patch, &mut builder, &mut diags);
        assert!(diags.has_errors());
        assert!(topo.root_block.is_none());
    }

    #[test]
    fn single_finite_time_root_resolves_its_duration() {
        let registry = Registry::with_builtins();
        let mut patch = Patch::new(0);
        patch.insert_block(
            BlockId("clock".to_string()),
            crate::patch::Block {
                block_type: "TimeRoot.finite".to_string(),
                params: BTreeMap::from([("durationMs".to_string(), crate::value::Value::F64(4000.0))]),
                inputs: vec![],
                outputs: vec![],
            },
        );
        let mut builder = IrBuilder::new();
        let mut diags = DiagnosticSink::new();
        let topo = resolve(&registry, &patch, &mut builder, &mut diags);
        assert!(!diags.has_errors());
        assert_eq!(topo.model, TimeModel::Finite { duration_ms: 4000.0 });
        assert_eq!(topo.root_block, Some(BlockId("clock".to_string())));
    }

    #[test]
    fn two_time_roots_is_an_error() {
        let registry = Registry::with_builtins();
        let mut patch = Patch::new(0);
        for id in ["a", "b"] {
            patch.insert_block(
                BlockId(id.to_string()),
                crate::patch::Block {
                    block_type: "TimeRoot.infinite".to_string(),
                    params: BTreeMap::new(),
                    inputs: vec![],
                    outputs: vec![],
                },
            );
        }
        let mut builder = IrBuilder::new();
        let mut diags = DiagnosticSink::new();
        resolve(&registry, &patch, &mut builder, &mut diags);
        assert!(diags.has_errors());
    }
}
