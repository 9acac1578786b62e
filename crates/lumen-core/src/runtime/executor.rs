// SPDX-License-Identifier: Apache-2.0
//! Per-frame schedule execution: `TimeDerive -> SignalEval -> Materialize ->
//! RenderAssemble`, in the order the compiled schedule lists them (§4.8).
//!
//! Step order alone determines execution order; no dependency graph is
//! retained at runtime. Each step writes exactly one primary output slot,
//! checked against [`ValueStore`]'s debug-mode single-writer invariant.
use rustc_hash::FxHashMap;

use crate::error::LumenError;
use crate::ident::{SigExprId, ValueSlot};
use crate::ir::field::ElementDomain;
use crate::ir::program::{CompiledProgram, TimeModel};
use crate::ir::render::{RenderFrame, RenderPass, RenderSinkIR};
use crate::ir::schedule::StepIR;
use crate::ir::signal::{eval_node, SignalExprIR};
use crate::registry::opcode::OpcodeRegistry;
use crate::registry::transform::TransformRegistry;
use crate::runtime::field_materializer::{self, BufferPool, MaterializeCache, MaterializeKey};
use crate::runtime::state_buffer::StateBuffer;
use crate::runtime::value_store::ValueStore;
use crate::transform::TransformStepSpec;
use crate::value::Value;

/// Drives one compiled program's schedule, frame by frame.
///
/// Holds the pieces of runtime state that live across frames but are not
/// part of `RuntimeState`'s persisted identity: the signal-eval memo is
/// frame-scoped and rebuilt every `run_frame`, while the buffer pool and
/// materialization cache amortize allocation and recomputation across
/// frames (cleared wholesale on hot-swap, §4.9 step 4).
#[derive(Debug)]
pub struct Executor {
    registry: OpcodeRegistry,
    transforms: TransformRegistry,
    pool: BufferPool,
    materialize_cache: MaterializeCache,
    /// Derived model time written by the previous frame's `TimeDerive` step,
    /// used to compute `dt_ms` for the next frame. `None` before the first
    /// frame and immediately after a hot-swap, where an elapsed delta has no
    /// meaning yet and is reported as zero.
    last_t_model_ms: Option<f64>,
}

impl Executor {
    /// Builds an executor against the given opcode and transform registries.
    #[must_use]
    pub fn new(registry: OpcodeRegistry, transforms: TransformRegistry) -> Self {
        Self {
            registry,
            transforms,
            pool: BufferPool::new(),
            materialize_cache: MaterializeCache::new(),
            last_t_model_ms: None,
        }
    }

    /// Drops cached materializations and pooled buffers, called once after a
    /// hot-swap before the first frame against the new program (§4.9 step 4).
    pub fn reset_caches(&mut self) {
        self.materialize_cache.clear();
        self.pool = BufferPool::new();
        self.last_t_model_ms = None;
    }

    /// Runs exactly one frame of `program`'s schedule, producing the
    /// assembled render frame.
    ///
    /// # Errors
    /// Propagates [`LumenError::UninitializedSlot`] and, in debug builds,
    /// [`LumenError::MultipleWriters`] from the underlying value store.
    pub fn run_frame(
        &mut self,
        program: &CompiledProgram,
        values: &mut ValueStore,
        state: &mut StateBuffer,
        t_abs_ms: f64,
        t_model_ms: f64,
    ) -> Result<RenderFrame, LumenError> {
        values.begin_frame();
        let mut signal_memo: FxHashMap<SigExprId, Value> = FxHashMap::default();
        // Milliseconds of model time elapsed since the previous frame, used
        // by time-integrating opcodes and transforms (`integrate`,
        // `slewLimit`, ...). Zero until a `TimeDerive` step has run at least
        // once, since there is no prior frame to measure a delta against.
        let mut dt_ms = 0.0;
        let mut frame = RenderFrame::empty();

        for (step_index, step) in program.schedule.iter().enumerate() {
            match step {
                StepIR::TimeDerive {
                    t_abs_slot,
                    t_model_slot,
                    phase01_slot,
                    wrap_event_slot,
                } => {
                    let (model_ms, phase01, wrapped) = derive_time(program.time_model, t_model_ms);
                    dt_ms = (model_ms - self.last_t_model_ms.unwrap_or(model_ms)).max(0.0);
                    self.last_t_model_ms = Some(model_ms);
                    values.write(*t_abs_slot, step_index, Value::F64(t_abs_ms))?;
                    values.write(*t_model_slot, step_index, Value::F64(model_ms))?;
                    values.write(*phase01_slot, step_index, Value::F64(phase01))?;
                    values.write(*wrap_event_slot, step_index, bool_value(wrapped))?;
                }
                StepIR::SignalEval { expr, out_slot } => {
                    let value = sample_signal(
                        *expr,
                        &program.signal_exprs,
                        values,
                        &self.registry,
                        &self.transforms,
                        &program.constants.values,
                        state,
                        &mut signal_memo,
                        dt_ms,
                        &program.bus_combines,
                        &program.transform_chains,
                        &program.transform_state_cells,
                    )?;
                    values.write(*out_slot, step_index, value)?;
                }
                StepIR::Materialize {
                    expr,
                    domain_slot,
                    buffer_slot,
                    element_count_slot,
                } => {
                    let domain = element_domain_from_slot(values, *domain_slot)?;
                    let key = MaterializeKey {
                        expr: *expr,
                        domain_version: domain.version,
                        upstream_version: 0,
                    };
                    let buffer = field_materializer::materialize(
                        key,
                        &program.field_exprs,
                        &domain,
                        values,
                        &self.registry,
                        &self.transforms,
                        &program.constants.values,
                        state,
                        &mut self.pool,
                        &mut self.materialize_cache,
                        dt_ms,
                        &program.transform_chains,
                        &program.transform_state_cells,
                        &program.field_bus_combines,
                    )?;
                    let element_count = u32::try_from(buffer.len()).unwrap_or(u32::MAX);
                    values.write(
                        *buffer_slot,
                        step_index,
                        Value::Object(crate::value::ObjectValue::DomainRef {
                            element_count,
                            domain_version: domain.version,
                        }),
                    )?;
                    values.write(*element_count_slot, step_index, Value::U32(element_count))?;
                }
                StepIR::RenderAssemble {
                    sink,
                    inputs,
                    out_frame_slot,
                } => {
                    let Some(sink_ir) = program.sinks.iter().find(|s| s.id == *sink) else {
                        continue;
                    };
                    assemble_pass(sink_ir, inputs, values, &mut frame)?;
                    // The assembled fragment is recorded as present by writing
                    // a sentinel; the actual `RenderPass` already landed in
                    // `frame.passes` above. `out_frame_slot` exists so a host
                    // inspecting the schedule can tell which slot a sink's
                    // assembly step claims, per §4.8's per-step single-writer
                    // bookkeeping.
                    values.write(*out_frame_slot, step_index, Value::F64(0.0))?;
                }
            }
        }

        Ok(frame)
    }
}

fn bool_value(b: bool) -> Value {
    Value::I32(i32::from(b))
}

/// Derives `(modelTimeMs, phase01, wrapEvent)` from the declared time
/// topology (§4.1). `Finite` clamps and reports a one-shot wrap at the
/// bound; `Infinite` never wraps.
fn derive_time(model: TimeModel, raw_model_ms: f64) -> (f64, f64, bool) {
    match model {
        TimeModel::Infinite => {
            let phase = raw_model_ms.rem_euclid(1000.0) / 1000.0;
            (raw_model_ms, phase, false)
        }
        TimeModel::Finite { duration_ms } => {
            if duration_ms <= 0.0 {
                return (0.0, 0.0, true);
            }
            let wrapped = raw_model_ms >= duration_ms;
            let clamped = raw_model_ms.clamp(0.0, duration_ms);
            let phase = clamped / duration_ms;
            (clamped, phase, wrapped)
        }
    }
}

fn element_domain_from_slot(values: &ValueStore, slot: ValueSlot) -> Result<ElementDomain, LumenError> {
    match values.read(slot)? {
        Value::Object(crate::value::ObjectValue::DomainRef {
            element_count,
            domain_version,
        }) => Ok(ElementDomain {
            element_count: *element_count,
            version: *domain_version,
        }),
        _ => Ok(ElementDomain::new(0)),
    }
}

#[allow(clippy::too_many_arguments)]
fn sample_signal(
    expr: SigExprId,
    exprs: &[SignalExprIR],
    values: &ValueStore,
    registry: &OpcodeRegistry,
    transforms: &TransformRegistry,
    const_pool: &[Value],
    state: &mut StateBuffer,
    memo: &mut FxHashMap<SigExprId, Value>,
    dt_ms: f64,
    bus_combines: &std::collections::BTreeMap<crate::ident::BusIndex, crate::ir::program::BusCombineSpec>,
    transform_chains: &[Vec<TransformStepSpec>],
    transform_state_cells: &[Vec<Option<crate::ident::StateCellId>>],
) -> Result<Value, LumenError> {
    if let Some(cached) = memo.get(&expr) {
        return Ok(cached.clone());
    }
    let Some(node) = exprs.get(expr.index()) else {
        return Ok(Value::F64(0.0));
    };

    if let SignalExprIR::BusCombine(bus) = node {
        let result = match bus_combines.get(bus) {
            Some(spec) => {
                let operand_values = spec
                    .operands
                    .iter()
                    .map(|id| {
                        sample_signal(
                            *id,
                            exprs,
                            values,
                            registry,
                            transforms,
                            const_pool,
                            state,
                            memo,
                            dt_ms,
                            bus_combines,
                            transform_chains,
                            transform_state_cells,
                        )
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                crate::bus::fold_values(spec.combine, &operand_values).unwrap_or(Value::F64(0.0))
            }
            None => Value::F64(0.0),
        };
        memo.insert(expr, result.clone());
        return Ok(result);
    }

    if let SignalExprIR::Transform { chain, input } = node {
        let base = sample_signal(
            *input,
            exprs,
            values,
            registry,
            transforms,
            const_pool,
            state,
            memo,
            dt_ms,
            bus_combines,
            transform_chains,
            transform_state_cells,
        )?;
        let empty_chain = Vec::new();
        let empty_cells = Vec::new();
        let steps = transform_chains.get(chain.index()).unwrap_or(&empty_chain);
        let cells = transform_state_cells.get(chain.index()).unwrap_or(&empty_cells);
        let result = crate::transform::apply_transforms(transforms, base.clone(), steps, cells, state, dt_ms)
            .unwrap_or(base);
        memo.insert(expr, result.clone());
        return Ok(result);
    }

    let operands = match node {
        SignalExprIR::Const(_) | SignalExprIR::TimeAbs | SignalExprIR::TimeModel | SignalExprIR::Phase01 => {
            Vec::new()
        }
        SignalExprIR::InputSlot(slot) => vec![values.read(*slot)?.clone()],
        SignalExprIR::Map { inputs, .. } | SignalExprIR::Stateful { inputs, .. } => inputs
            .iter()
            .map(|id| {
                sample_signal(
                    *id,
                    exprs,
                    values,
                    registry,
                    transforms,
                    const_pool,
                    state,
                    memo,
                    dt_ms,
                    bus_combines,
                    transform_chains,
                    transform_state_cells,
                )
            })
            .collect::<Result<Vec<_>, _>>()?,
        SignalExprIR::Zip { inputs, .. } => vec![
            sample_signal(
                inputs[0],
                exprs,
                values,
                registry,
                transforms,
                const_pool,
                state,
                memo,
                dt_ms,
                bus_combines,
                transform_chains,
                transform_state_cells,
            )?,
            sample_signal(
                inputs[1],
                exprs,
                values,
                registry,
                transforms,
                const_pool,
                state,
                memo,
                dt_ms,
                bus_combines,
                transform_chains,
                transform_state_cells,
            )?,
        ],
        SignalExprIR::Select { condition, a, b } => {
            let cond = sample_signal(
                *condition,
                exprs,
                values,
                registry,
                transforms,
                const_pool,
                state,
                memo,
                dt_ms,
                bus_combines,
                transform_chains,
                transform_state_cells,
            )?;
            let va = sample_signal(
                *a,
                exprs,
                values,
                registry,
                transforms,
                const_pool,
                state,
                memo,
                dt_ms,
                bus_combines,
                transform_chains,
                transform_state_cells,
            )?;
            let vb = sample_signal(
                *b,
                exprs,
                values,
                registry,
                transforms,
                const_pool,
                state,
                memo,
                dt_ms,
                bus_combines,
                transform_chains,
                transform_state_cells,
            )?;
            vec![cond, va, vb]
        }
        // Transform and BusCombine are handled and returned above; these arms
        // are unreachable but kept exhaustive rather than matching a
        // wildcard so a future `SignalExprIR` variant addition fails to
        // compile here instead of silently falling through.
        SignalExprIR::Transform { .. } | SignalExprIR::BusCombine(_) => Vec::new(),
    };

    let result = eval_node(node, &operands, registry, const_pool, state, dt_ms);
    memo.insert(expr, result.clone());
    Ok(result)
}

/// Builds a `RenderPass` for a sink from its already-validated input slots
/// and appends it to `frame`, in schedule order (§6). The input-slot order
/// for each sink kind follows the declaration order of that `RenderPass`
/// variant's fields; sink kinds this build does not recognize, or whose
/// input count is short, contribute no pass rather than erroring, since an
/// unrecognized sink kind is a lowering-time diagnostic, not a runtime fault.
fn assemble_pass(
    sink: &RenderSinkIR,
    inputs: &[ValueSlot],
    values: &ValueStore,
    frame: &mut RenderFrame,
) -> Result<(), LumenError> {
    for slot in inputs {
        values.read(*slot)?;
    }
    let pass = match sink.kind.as_str() {
        "instances2D" if inputs.len() >= 3 => Some(RenderPass::Instances2D {
            positions: inputs[0],
            colors: inputs[1],
            radii: inputs[2],
        }),
        "paths2D" if inputs.len() >= 2 => Some(RenderPass::Paths2D {
            geometry: inputs[0],
            colors: inputs[1],
        }),
        _ => None,
    };
    if let Some(pass) = pass {
        frame.passes.push(pass);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::program::{ConstantPool, SlotMeta};
    use crate::types::{TypeDesc, ValueDomain, World};
    use crate::value::StorageClass;
    use std::collections::BTreeMap;

    fn program_with(schedule: Vec<StepIR>, signal_exprs: Vec<SignalExprIR>, slot_count: usize) -> CompiledProgram {
        CompiledProgram {
            time_model: TimeModel::Infinite,
            types: Vec::new(),
            signal_exprs,
            field_exprs: Vec::new(),
            constants: ConstantPool::default(),
            state_layout: Vec::new(),
            default_sources: BTreeMap::new(),
            slot_meta: vec![
                SlotMeta {
                    storage: StorageClass::F64,
                    ty: TypeDesc::core(World::Signal, ValueDomain::Number),
                    debug_name: None,
                };
                slot_count
            ],
            sinks: Vec::new(),
            schedule,
            initial_slot_values: BTreeMap::new(),
            bus_roots: BTreeMap::new(),
            bus_combines: BTreeMap::new(),
            transform_chains: Vec::new(),
            transform_state_cells: Vec::new(),
            state_layout_fingerprint: [0; 32],
            fingerprint: [0; 32],
        }
    }

    #[test]
    fn time_derive_writes_all_four_reserved_slots() {
        let program = program_with(
            vec![StepIR::TimeDerive {
                t_abs_slot: ValueSlot(0),
                t_model_slot: ValueSlot(1),
                phase01_slot: ValueSlot(2),
                wrap_event_slot: ValueSlot(3),
            }],
            Vec::new(),
            4,
        );
        let mut executor = Executor::new(OpcodeRegistry::with_builtins(), TransformRegistry::with_builtins());
        let mut values = ValueStore::new(4);
        let mut state = StateBuffer::new();
        executor.run_frame(&program, &mut values, &mut state, 16.0, 16.0).unwrap();
        assert_eq!(values.read(ValueSlot(0)).unwrap().as_f64(), Some(16.0));
    }

    #[test]
    fn finite_time_model_clamps_and_reports_wrap() {
        let (model_ms, phase, wrapped) = derive_time(TimeModel::Finite { duration_ms: 1000.0 }, 1500.0);
        assert_eq!(model_ms, 1000.0);
        assert_eq!(phase, 1.0);
        assert!(wrapped);
    }

    #[test]
    fn signal_eval_step_writes_evaluated_result() {
        let mut pool = ConstantPool::default();
        let c = pool.push(Value::F64(7.0));
        let mut program = program_with(
            vec![StepIR::SignalEval {
                expr: SigExprId(0),
                out_slot: ValueSlot(0),
            }],
            vec![SignalExprIR::Const(c)],
            1,
        );
        program.constants = pool;
        let mut executor = Executor::new(OpcodeRegistry::with_builtins(), TransformRegistry::with_builtins());
        let mut values = ValueStore::new(1);
        let mut state = StateBuffer::new();
        executor.run_frame(&program, &mut values, &mut state, 0.0, 0.0).unwrap();
        assert_eq!(values.read(ValueSlot(0)).unwrap().as_f64(), Some(7.0));
    }

    #[test]
    fn shared_subexpression_is_sampled_once_per_frame() {
        let mut pool = ConstantPool::default();
        let c = pool.push(Value::F64(2.0));
        let exprs = vec![
            SignalExprIR::Const(c),
            SignalExprIR::Zip {
                opcode: "add".to_string(),
                inputs: [SigExprId(0), SigExprId(0)],
            },
        ];
        let mut program = program_with(
            vec![StepIR::SignalEval {
                expr: SigExprId(1),
                out_slot: ValueSlot(0),
            }],
            exprs,
            1,
        );
        program.constants = pool;
        let mut executor = Executor::new(OpcodeRegistry::with_builtins(), TransformRegistry::with_builtins());
        let mut values = ValueStore::new(1);
        let mut state = StateBuffer::new();
        executor.run_frame(&program, &mut values, &mut state, 0.0, 0.0).unwrap();
        assert_eq!(values.read(ValueSlot(0)).unwrap().as_f64(), Some(4.0));
    }

    #[test]
    fn transform_node_applies_its_chain_to_the_sampled_input() {
        use crate::transform::TransformStepSpec;

        let mut pool = ConstantPool::default();
        let c = pool.push(Value::F64(3.0));
        let exprs = vec![
            SignalExprIR::Const(c),
            SignalExprIR::Transform {
                chain: crate::ident::TransformChainId(0),
                input: SigExprId(0),
            },
        ];
        let mut program = program_with(
            vec![StepIR::SignalEval {
                expr: SigExprId(1),
                out_slot: ValueSlot(0),
            }],
            exprs,
            1,
        );
        program.constants = pool;
        program.transform_chains = vec![vec![TransformStepSpec {
            id: "scale".to_string(),
            enabled: true,
            params: BTreeMap::from([("factor".to_string(), Value::F64(2.0))]),
        }]];
        program.transform_state_cells = vec![vec![None]];
        let mut executor = Executor::new(OpcodeRegistry::with_builtins(), TransformRegistry::with_builtins());
        let mut values = ValueStore::new(1);
        let mut state = StateBuffer::new();
        executor.run_frame(&program, &mut values, &mut state, 0.0, 0.0).unwrap();
        assert_eq!(values.read(ValueSlot(0)).unwrap().as_f64(), Some(6.0));
    }
}
