// SPDX-License-Identifier: Apache-2.0
//! Signal-expression IR: a DAG of nodes sharing storage by index (§4.2).
use crate::ident::{BusIndex, ConstId, SigExprId, StateCellId, TransformChainId, ValueSlot};
use crate::registry::opcode::OpcodeRegistry;
use crate::runtime::state_buffer::StateBuffer;
use crate::value::Value;

/// One node in the signal-expression DAG.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalExprIR {
    /// A pool constant.
    Const(ConstId),
    /// The canonical absolute wall-time slot.
    TimeAbs,
    /// The canonical model-time slot.
    TimeModel,
    /// The canonical wrapped-phase slot.
    Phase01,
    /// Reads a previously written value slot.
    InputSlot(ValueSlot),
    /// Applies a stateless opcode to one or more sampled inputs.
    Map {
        /// Registry opcode id.
        opcode: String,
        /// Input expression ids, sampled in order.
        inputs: Vec<SigExprId>,
    },
    /// Alias for `Map` with a fixed arity-2 shape, kept distinct in the IR so
    /// lowering can special-case two-input fusion opportunities.
    Zip {
        /// Registry opcode id.
        opcode: String,
        /// Exactly two input expression ids.
        inputs: [SigExprId; 2],
    },
    /// Ternary selection: `condition` is nonzero selects `a`, else `b`.
    Select {
        /// Condition expression.
        condition: SigExprId,
        /// Value when the condition holds.
        a: SigExprId,
        /// Value when the condition does not hold.
        b: SigExprId,
    },
    /// Applies a compiled residual transform chain to an input.
    Transform {
        /// Transform chain id.
        chain: TransformChainId,
        /// Input expression.
        input: SigExprId,
    },
    /// Reads the combined value of a bus.
    BusCombine(BusIndex),
    /// Applies a stateful opcode, reading and writing a dedicated state
    /// cell.
    Stateful {
        /// Registry opcode id.
        opcode: String,
        /// Input expression ids.
        inputs: Vec<SigExprId>,
        /// The cell this opcode instance owns.
        state_cell: StateCellId,
    },
}

/// Runtime context passed to opcode evaluators: access to this node's state
/// cell (if stateful) and the elapsed time since the previous frame.
pub struct EvalCtx<'a> {
    state: &'a mut StateBuffer,
    cell: Option<StateCellId>,
    /// Milliseconds elapsed since the previous frame, used by time-integrating
    /// opcodes (`integrate`, `slewLimit`).
    pub dt_ms: f64,
}

impl<'a> EvalCtx<'a> {
    /// Builds an evaluation context for one opcode invocation.
    #[must_use]
    pub fn new(state: &'a mut StateBuffer, cell: Option<StateCellId>, dt_ms: f64) -> Self {
        Self { state, cell, dt_ms }
    }

    /// Reads this node's scalar state cell, if one is assigned.
    #[must_use]
    pub fn read_scalar_cell(&self) -> Option<f64> {
        self.cell.and_then(|id| self.state.read_scalar(id))
    }

    /// Writes this node's scalar state cell, if one is assigned.
    pub fn write_scalar_cell(&mut self, value: f64) {
        if let Some(id) = self.cell {
            self.state.write_scalar(id, value);
        }
    }
}

/// Evaluates one signal expression node given its already-sampled operand
/// values and access to the constant pool and opcode registry.
///
/// This is the `sample(exprId, env) -> value` contract of §4.2; the caller
/// (the executor's `signalEval` step, or field materialization's
/// `sampleSignal`) is responsible for recursively sampling operands and
/// memoizing results in the per-frame cache — this function evaluates
/// exactly one node.
pub fn eval_node(
    node: &SignalExprIR,
    operands: &[Value],
    registry: &OpcodeRegistry,
    const_pool: &[Value],
    state: &mut StateBuffer,
    dt_ms: f64,
) -> Value {
    match node {
        SignalExprIR::Const(id) => const_pool.get(id.index()).cloned().unwrap_or(Value::F64(0.0)),
        SignalExprIR::TimeAbs | SignalExprIR::TimeModel | SignalExprIR::Phase01 => {
            operands.first().cloned().unwrap_or(Value::F64(0.0))
        }
        SignalExprIR::InputSlot(_) => operands.first().cloned().unwrap_or(Value::F64(0.0)),
        SignalExprIR::Map { opcode, .. } | SignalExprIR::Zip { opcode, .. } => {
            let mut ctx = EvalCtx::new(state, None, dt_ms);
            registry
                .get(opcode)
                .map_or(Value::F64(0.0), |d| (d.evaluator)(operands, &mut ctx))
        }
        SignalExprIR::Select { .. } => {
            let cond = operands.first().and_then(Value::as_bool).unwrap_or(false);
            if cond {
                operands.get(1).cloned().unwrap_or(Value::F64(0.0))
            } else {
                operands.get(2).cloned().unwrap_or(Value::F64(0.0))
            }
        }
        SignalExprIR::Transform { .. } => operands.first().cloned().unwrap_or(Value::F64(0.0)),
        SignalExprIR::BusCombine(_) => operands.first().cloned().unwrap_or(Value::F64(0.0)),
        SignalExprIR::Stateful { opcode, state_cell, .. } => {
            let mut ctx = EvalCtx::new(state, Some(*state_cell), dt_ms);
            registry
                .get(opcode)
                .map_or(Value::F64(0.0), |d| (d.evaluator)(operands, &mut ctx))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn const_node_reads_from_pool() {
        let registry = OpcodeRegistry::with_builtins();
        let pool = vec![Value::F64(42.0)];
        let mut state = StateBuffer::new();
        let node = SignalExprIR::Const(ConstId(0));
        let result = eval_node(&node, &[], &registry, &pool, &mut state, 16.0);
        assert_eq!(result.as_f64(), Some(42.0));
    }

    #[test]
    fn stateful_node_threads_state_cell() {
        let registry = OpcodeRegistry::with_builtins();
        let mut state = StateBuffer::new();
        let cell = state.reserve_scalar_cell();
        let node = SignalExprIR::Stateful {
            opcode: "integrate".to_string(),
            inputs: vec![],
            state_cell: cell,
        };
        let r1 = eval_node(&node, &[Value::F64(1.0)], &registry, &[], &mut state, 1000.0);
        assert_eq!(r1.as_f64(), Some(1.0));
        let r2 = eval_node(&node, &[Value::F64(1.0)], &registry, &[], &mut state, 1000.0);
        assert_eq!(r2.as_f64(), Some(2.0));
    }
}
