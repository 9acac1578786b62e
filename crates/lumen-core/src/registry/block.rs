// SPDX-License-Identifier: Apache-2.0
//! Block type registry (§6 "Block registry: for each block type, a
//! description `(inputs, outputs, paramSchema, lower(builder, context))`").
//!
//! The built-in set registered by [`BlockRegistry::with_builtins`] is
//! intentionally small: enough to exercise every IR node kind and every
//! invariant in the test suite, since the full block palette is out of
//! scope (§1). It is grounded on the teacher's pattern of bundling a named,
//! constant-identified demo rule set alongside the core crate for
//! integration tests and examples.
use std::collections::BTreeMap;

use crate::builder::IrBuilder;
use crate::diagnostics::Diagnostic;
use crate::ident::ValueSlot;
use crate::ir::field::FieldExprIR;
use crate::ir::signal::SignalExprIR;
use crate::registry::transform::ParamType;
use crate::types::{TypeDesc, ValueDomain, World};
use crate::value::{StorageClass, Value};

/// A declared input or output port on a block type.
#[derive(Debug, Clone)]
pub struct PortSpec {
    /// Authored port name.
    pub name: String,
    /// Canonical type descriptor.
    pub ty: TypeDesc,
    /// Whether this input port is required to resolve (wire or default)
    /// during lowering; always `true` for output ports.
    pub required: bool,
}

impl PortSpec {
    /// Builds a required input port spec.
    #[must_use]
    pub fn required(name: impl Into<String>, ty: TypeDesc) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
        }
    }

    /// Builds an output port spec (always considered "required" in the
    /// sense that it always produces a value).
    #[must_use]
    pub fn output(name: impl Into<String>, ty: TypeDesc) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
        }
    }
}

/// The resolved value reference feeding one input port, after link
/// resolution has matched wires and default sources.
#[derive(Debug, Clone, Copy)]
pub enum ResolvedInput {
    /// The value lives in an already-allocated slot.
    Slot(ValueSlot),
    /// The value is a compile-time constant.
    Const(Value),
}

/// Context passed to a block's `lower` function: its resolved inputs and
/// authored parameters, plus the shared builder to emit into.
pub struct BlockLowerCtx<'a> {
    /// Resolved inputs, in declared port order.
    pub inputs: &'a [ResolvedInput],
    /// Authored parameter values.
    pub params: &'a BTreeMap<String, Value>,
    /// Shared IR accumulator.
    pub builder: &'a mut IrBuilder,
}

/// Result of lowering one block instance: the slots backing its declared
/// outputs, in port order, plus any diagnostics raised along the way.
#[derive(Debug, Default)]
pub struct BlockLowerResult {
    /// Output value slots, in declared port order.
    pub output_slots: Vec<ValueSlot>,
    /// For each output slot that is `World::Field`, the field-expression
    /// recipe backing it (`None` for signal/special outputs, or at indices
    /// beyond what a block populates). A bus combining field publishers
    /// resolves their recipes through this instead of re-reading their
    /// output slot, which holds a `DomainRef` handle, not per-element data.
    pub output_field_exprs: Vec<Option<crate::ident::FieldExprId>>,
    /// For each `Field`-world output slot, the domain slot it was
    /// materialized over, parallel to `output_field_exprs`.
    pub output_domain_slots: Vec<Option<ValueSlot>>,
    /// Diagnostics raised while lowering this block.
    pub diagnostics: Vec<Diagnostic>,
}

/// Function pointer lowering one block instance into IR.
pub type LowerFn = fn(&mut BlockLowerCtx<'_>) -> BlockLowerResult;

/// Descriptor for one block type.
#[derive(Clone)]
pub struct BlockDescriptor {
    /// Declared input ports, in order.
    pub inputs: Vec<PortSpec>,
    /// Declared output ports, in order.
    pub outputs: Vec<PortSpec>,
    /// Declared parameter schema.
    pub param_schema: BTreeMap<String, ParamType>,
    /// Whether this block type is a `TimeRoot` variant (exactly one such
    /// block instance must exist per patch, invariant 1).
    pub is_time_root: bool,
    /// If this block is a `TimeRoot` variant, the kind of time model it
    /// declares; the finite duration itself comes from the instance's
    /// authored `durationMs` parameter.
    pub time_model_kind: Option<TimeModelKind>,
    /// Lowers one instance of this block type.
    pub lower: LowerFn,
}

/// Which `TimeModel` shape a `TimeRoot` block variant declares (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeModelKind {
    /// Model time is clamped to `[0, durationMs]`.
    Finite,
    /// Model time advances monotonically without wrapping.
    Infinite,
}

impl std::fmt::Debug for BlockDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockDescriptor")
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .field("is_time_root", &self.is_time_root)
            .finish()
    }
}

fn param_f64(params: &BTreeMap<String, Value>, name: &str, default: f64) -> f64 {
    params.get(name).and_then(Value::as_f64).unwrap_or(default)
}

fn lower_const_number(ctx: &mut BlockLowerCtx<'_>) -> BlockLowerResult {
    let value = param_f64(ctx.params, "value", 0.0);
    let const_id = ctx.builder.push_const(Value::F64(value));
    let expr = ctx.builder.push_signal_expr(SignalExprIR::Const(const_id));
    let slot = ctx.builder.alloc_slot(
        TypeDesc::core(World::Signal, ValueDomain::Number),
        StorageClass::F64,
        Some("const.out".to_string()),
    );
    ctx.builder.push_step(crate::ir::schedule::StepIR::SignalEval { expr, out_slot: slot });
    BlockLowerResult {
        output_slots: vec![slot],
        diagnostics: Vec::new(),
        ..BlockLowerResult::default()
    }
}

fn lower_time_root_finite(ctx: &mut BlockLowerCtx<'_>) -> BlockLowerResult {
    let duration_ms = param_f64(ctx.params, "durationMs", 1000.0);
    let const_id = ctx.builder.push_const(Value::F64(duration_ms));
    let expr = ctx.builder.push_signal_expr(SignalExprIR::Const(const_id));
    let slot = ctx.builder.alloc_slot(
        TypeDesc::core(World::Signal, ValueDomain::TimeMs),
        StorageClass::F64,
        Some("timeRoot.durationMs".to_string()),
    );
    ctx.builder.push_step(crate::ir::schedule::StepIR::SignalEval { expr, out_slot: slot });
    BlockLowerResult {
        output_slots: vec![slot],
        diagnostics: Vec::new(),
        ..BlockLowerResult::default()
    }
}

fn lower_time_root_infinite(ctx: &mut BlockLowerCtx<'_>) -> BlockLowerResult {
    let expr = ctx.builder.push_signal_expr(SignalExprIR::TimeModel);
    let slot = ctx.builder.alloc_slot(
        TypeDesc::core(World::Signal, ValueDomain::TimeMs),
        StorageClass::F64,
        Some("timeRoot.infinite".to_string()),
    );
    ctx.builder.push_step(crate::ir::schedule::StepIR::SignalEval { expr, out_slot: slot });
    BlockLowerResult {
        output_slots: vec![slot],
        diagnostics: Vec::new(),
        ..BlockLowerResult::default()
    }
}

fn lower_grid_domain(ctx: &mut BlockLowerCtx<'_>) -> BlockLowerResult {
    let rows = param_f64(ctx.params, "rows", 1.0).max(1.0) as u32;
    let cols = param_f64(ctx.params, "cols", 1.0).max(1.0) as u32;
    let element_count = rows * cols;
    let slot = ctx.builder.alloc_slot(
        TypeDesc::internal(World::Special, ValueDomain::DomainRef),
        StorageClass::Object,
        Some("gridDomain.domain".to_string()),
    );
    ctx.builder.set_initial_value(
        slot,
        Value::Object(crate::value::ObjectValue::DomainRef {
            element_count,
            domain_version: 0,
        }),
    );
    BlockLowerResult {
        output_slots: vec![slot],
        diagnostics: Vec::new(),
        ..BlockLowerResult::default()
    }
}

fn lower_position_map_grid(ctx: &mut BlockLowerCtx<'_>) -> BlockLowerResult {
    let spacing = param_f64(ctx.params, "spacing", 1.0);
    let rows = param_f64(ctx.params, "rows", 1.0).max(1.0) as u32;
    let cols = param_f64(ctx.params, "cols", 1.0).max(1.0) as u32;
    let field = ctx.builder.push_field_expr(FieldExprIR::GridPositions { rows, cols, spacing });
    let domain_slot = match ctx.inputs.first() {
        Some(ResolvedInput::Slot(slot)) => *slot,
        _ => ctx.builder.alloc_slot(
            TypeDesc::internal(World::Special, ValueDomain::DomainRef),
            StorageClass::Object,
            None,
        ),
    };
    let positions_slot = ctx.builder.alloc_slot(
        TypeDesc::core(World::Field, ValueDomain::Vec2),
        StorageClass::Object,
        Some("positionMapGrid.positions".to_string()),
    );
    let element_count_slot = ctx.builder.alloc_slot(
        TypeDesc::internal(World::Special, ValueDomain::Number),
        StorageClass::U32,
        Some("positionMapGrid.elementCount".to_string()),
    );
    ctx.builder.push_step(crate::ir::schedule::StepIR::Materialize {
        expr: field,
        domain_slot,
        buffer_slot: positions_slot,
        element_count_slot,
    });
    BlockLowerResult {
        output_slots: vec![positions_slot],
        output_field_exprs: vec![Some(field)],
        output_domain_slots: vec![Some(domain_slot)],
        diagnostics: Vec::new(),
    }
}

fn lower_broadcast_phase_to_field(ctx: &mut BlockLowerCtx<'_>) -> BlockLowerResult {
    let (phase_expr, _phase_slot) = ctx.builder.push_time_linked_signal(
        SignalExprIR::Phase01,
        TypeDesc::core(World::Signal, ValueDomain::Phase01),
        StorageClass::F64,
        Some("broadcastPhaseToField.phase01".to_string()),
    );
    let field = ctx.builder.push_field_expr(FieldExprIR::SampleSignal(phase_expr));
    let domain_slot = match ctx.inputs.first() {
        Some(ResolvedInput::Slot(slot)) => *slot,
        _ => ctx.builder.alloc_slot(
            TypeDesc::internal(World::Special, ValueDomain::DomainRef),
            StorageClass::Object,
            None,
        ),
    };
    let slot = ctx.builder.alloc_slot(
        TypeDesc::core(World::Field, ValueDomain::Number),
        StorageClass::Object,
        Some("broadcastPhaseToField.out".to_string()),
    );
    let element_count_slot = ctx.builder.alloc_slot(
        TypeDesc::internal(World::Special, ValueDomain::Number),
        StorageClass::U32,
        Some("broadcastPhaseToField.elementCount".to_string()),
    );
    ctx.builder.push_step(crate::ir::schedule::StepIR::Materialize {
        expr: field,
        domain_slot,
        buffer_slot: slot,
        element_count_slot,
    });
    BlockLowerResult {
        output_slots: vec![slot],
        output_field_exprs: vec![Some(field)],
        output_domain_slots: vec![Some(domain_slot)],
        diagnostics: Vec::new(),
    }
}

/// Materializes a constant-resolved input into a fresh slot written once at
/// program-load time, rather than aliasing slot 0.
fn materialize_const_input(builder: &mut IrBuilder, value: Value) -> ValueSlot {
    let ty = match &value {
        Value::Object(crate::value::ObjectValue::Vec2(_)) => TypeDesc::core(World::Field, ValueDomain::Vec2),
        Value::Object(crate::value::ObjectValue::Color(_)) => TypeDesc::core(World::Signal, ValueDomain::Color),
        _ => TypeDesc::core(World::Signal, ValueDomain::Number),
    };
    let storage = StorageClass::for_domain(ty.domain);
    let slot = builder.alloc_slot(ty, storage, Some("const.materialized".to_string()));
    builder.set_initial_value(slot, value);
    slot
}

fn lower_render_instances_2d(ctx: &mut BlockLowerCtx<'_>) -> BlockLowerResult {
    let inputs: Vec<ValueSlot> = ctx
        .inputs
        .iter()
        .map(|i| match i {
            ResolvedInput::Slot(slot) => *slot,
            ResolvedInput::Const(value) => materialize_const_input(ctx.builder, value.clone()),
        })
        .collect();
    let out_slot = ctx.builder.alloc_slot(
        TypeDesc::internal(World::Special, ValueDomain::RenderFrame),
        StorageClass::Object,
        Some("renderInstances2D.frame".to_string()),
    );
    let sink = ctx.builder.register_sink("instances2D", inputs.clone(), out_slot);
    ctx.builder.push_step(crate::ir::schedule::StepIR::RenderAssemble {
        sink,
        inputs,
        out_frame_slot: out_slot,
    });
    BlockLowerResult {
        output_slots: vec![out_slot],
        diagnostics: Vec::new(),
        ..BlockLowerResult::default()
    }
}

fn lower_osc_sine(ctx: &mut BlockLowerCtx<'_>) -> BlockLowerResult {
    let freq = param_f64(ctx.params, "freqHz", 1.0);
    let freq_const = ctx.builder.push_const(Value::F64(freq));
    let freq_expr = ctx.builder.push_signal_expr(SignalExprIR::Const(freq_const));
    let time_expr = ctx.builder.push_signal_expr(SignalExprIR::TimeModel);
    let scaled = ctx.builder.push_signal_expr(SignalExprIR::Zip {
        opcode: "mul".to_string(),
        inputs: [time_expr, freq_expr],
    });
    let sine = ctx.builder.push_signal_expr(SignalExprIR::Map {
        opcode: "sin".to_string(),
        inputs: vec![scaled],
    });
    let slot = ctx.builder.alloc_slot(
        TypeDesc::core(World::Signal, ValueDomain::Number),
        StorageClass::F64,
        Some("osc.sine.out".to_string()),
    );
    ctx.builder.push_step(crate::ir::schedule::StepIR::SignalEval { expr: sine, out_slot: slot });
    BlockLowerResult {
        output_slots: vec![slot],
        diagnostics: Vec::new(),
        ..BlockLowerResult::default()
    }
}

/// Block type registry.
#[derive(Debug, Clone, Default)]
pub struct BlockRegistry {
    descriptors: BTreeMap<String, BlockDescriptor>,
}

impl BlockRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor under the given type id.
    pub fn register(&mut self, id: impl Into<String>, descriptor: BlockDescriptor) {
        self.descriptors.insert(id.into(), descriptor);
    }

    /// Looks up a descriptor by type id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&BlockDescriptor> {
        self.descriptors.get(id)
    }

    /// Builds the built-in block set: two `TimeRoot` variants, a grid
    /// domain authoring block, a position-mapping block, a phase broadcast,
    /// a 2D instance render sink, and a simple oscillator — enough to
    /// exercise scenarios S1-S6 (§8).
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(
            "TimeRoot.finite",
            BlockDescriptor {
                inputs: vec![],
                outputs: vec![PortSpec::output("durationMs", TypeDesc::core(World::Signal, ValueDomain::TimeMs))],
                param_schema: BTreeMap::from([("durationMs".to_string(), ParamType::Number)]),
                is_time_root: true,
                time_model_kind: Some(TimeModelKind::Finite),
                lower: lower_time_root_finite,
            },
        );
        registry.register(
            "TimeRoot.infinite",
            BlockDescriptor {
                inputs: vec![],
                outputs: vec![PortSpec::output("tModelMs", TypeDesc::core(World::Signal, ValueDomain::TimeMs))],
                param_schema: BTreeMap::new(),
                is_time_root: true,
                time_model_kind: Some(TimeModelKind::Infinite),
                lower: lower_time_root_infinite,
            },
        );
        registry.register(
            "GridDomain",
            BlockDescriptor {
                inputs: vec![],
                outputs: vec![PortSpec::output("domain", TypeDesc::internal(World::Special, ValueDomain::DomainRef))],
                param_schema: BTreeMap::from([
                    ("rows".to_string(), ParamType::Number),
                    ("cols".to_string(), ParamType::Number),
                ]),
                is_time_root: false,
                time_model_kind: None,
                lower: lower_grid_domain,
            },
        );
        registry.register(
            "PositionMapGrid",
            BlockDescriptor {
                inputs: vec![PortSpec::required("domain", TypeDesc::internal(World::Special, ValueDomain::DomainRef))],
                outputs: vec![PortSpec::output("positions", TypeDesc::core(World::Field, ValueDomain::Vec2))],
                param_schema: BTreeMap::from([
                    ("spacing".to_string(), ParamType::Number),
                    ("rows".to_string(), ParamType::Number),
                    ("cols".to_string(), ParamType::Number),
                ]),
                is_time_root: false,
                time_model_kind: None,
                lower: lower_position_map_grid,
            },
        );
        registry.register(
            "BroadcastPhaseToField",
            BlockDescriptor {
                inputs: vec![PortSpec::required("domain", TypeDesc::internal(World::Special, ValueDomain::DomainRef))],
                outputs: vec![PortSpec::output("out", TypeDesc::core(World::Field, ValueDomain::Number))],
                param_schema: BTreeMap::new(),
                is_time_root: false,
                time_model_kind: None,
                lower: lower_broadcast_phase_to_field,
            },
        );
        registry.register(
            "RenderInstances2D",
            BlockDescriptor {
                inputs: vec![
                    PortSpec::required("positions", TypeDesc::core(World::Field, ValueDomain::Vec2)),
                    PortSpec::required("colors", TypeDesc::core(World::Field, ValueDomain::Color)),
                    PortSpec::required("radii", TypeDesc::core(World::Field, ValueDomain::Number)),
                ],
                outputs: vec![PortSpec::output("frame", TypeDesc::internal(World::Special, ValueDomain::RenderFrame))],
                param_schema: BTreeMap::new(),
                is_time_root: false,
                time_model_kind: None,
                lower: lower_render_instances_2d,
            },
        );
        registry.register(
            "Const",
            BlockDescriptor {
                inputs: vec![],
                outputs: vec![PortSpec::output("out", TypeDesc::core(World::Signal, ValueDomain::Number))],
                param_schema: BTreeMap::from([("value".to_string(), ParamType::Number)]),
                is_time_root: false,
                time_model_kind: None,
                lower: lower_const_number,
            },
        );
        registry.register(
            "Osc.sine",
            BlockDescriptor {
                inputs: vec![],
                outputs: vec![PortSpec::output("out", TypeDesc::core(World::Signal, ValueDomain::Number))],
                param_schema: BTreeMap::from([("freqHz".to_string(), ParamType::Number)]),
                is_time_root: false,
                time_model_kind: None,
                lower: lower_osc_sine,
            },
        );
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_contains_exactly_one_time_root_family() {
        let registry = BlockRegistry::with_builtins();
        let time_roots: Vec<_> = registry
            .descriptors
            .values()
            .filter(|d| d.is_time_root)
            .collect();
        assert_eq!(time_roots.len(), 2);
    }

    #[test]
    fn unknown_block_type_is_absent() {
        let registry = BlockRegistry::with_builtins();
        assert!(registry.get("NotARealBlock").is_none());
    }

    #[test]
    fn position_map_grid_emits_a_grid_positions_field_node() {
        let registry = BlockRegistry::with_builtins();
        let descriptor = registry.get("PositionMapGrid").unwrap();
        let mut builder = IrBuilder::new();
        let params = BTreeMap::from([
            ("spacing".to_string(), Value::F64(10.0)),
            ("rows".to_string(), Value::F64(2.0)),
            ("cols".to_string(), Value::F64(2.0)),
        ]);
        let domain_slot = builder.alloc_slot(
            TypeDesc::internal(World::Special, ValueDomain::DomainRef),
            StorageClass::Object,
            None,
        );
        let inputs = vec![ResolvedInput::Slot(domain_slot)];
        let mut ctx = BlockLowerCtx {
            inputs: &inputs,
            params: &params,
            builder: &mut builder,
        };
        let result = (descriptor.lower)(&mut ctx);
        assert_eq!(result.output_slots.len(), 1);
        assert_eq!(
            builder.field_exprs,
            vec![FieldExprIR::GridPositions {
                rows: 2,
                cols: 2,
                spacing: 10.0
            }]
        );
    }
}
