// SPDX-License-Identifier: Apache-2.0
//! Signal/field opcode registry (§4.2). Unknown opcodes are a compile
//! error, never a runtime fallback.
use std::collections::BTreeMap;

use crate::ir::signal::EvalCtx;
use crate::types::{TypeDesc, ValueDomain, World};
use crate::value::Value;

/// Function pointer evaluating one opcode given its input values.
pub type EvaluatorFn = fn(&[Value], &mut EvalCtx<'_>) -> Value;

/// Descriptor for one opcode, grounded on the teacher's `RewriteRule`
/// function-pointer shape: `arity`/`input_types`/`output_type` are plain
/// data, `evaluator` is a bare `fn` registered once at startup.
#[derive(Debug, Clone)]
pub struct OpcodeDescriptor {
    /// Number of inputs this opcode consumes.
    pub arity: usize,
    /// Expected input domains, checked during type-graph lowering.
    pub input_types: Vec<ValueDomain>,
    /// Output domain produced by this opcode.
    pub output_type: ValueDomain,
    /// Whether this opcode reads/writes a `StateCell`.
    pub stateful: bool,
    /// Evaluates this opcode given its already-sampled inputs.
    pub evaluator: EvaluatorFn,
}

fn unary(inputs: &[Value], f: impl Fn(f64) -> f64) -> Value {
    Value::F64(f(inputs[0].as_f64().unwrap_or(0.0)))
}

fn binary(inputs: &[Value], f: impl Fn(f64, f64) -> f64) -> Value {
    Value::F64(f(
        inputs[0].as_f64().unwrap_or(0.0),
        inputs[1].as_f64().unwrap_or(0.0),
    ))
}

fn eval_add(inputs: &[Value], _ctx: &mut EvalCtx<'_>) -> Value {
    binary(inputs, |a, b| a + b)
}

fn eval_sub(inputs: &[Value], _ctx: &mut EvalCtx<'_>) -> Value {
    binary(inputs, |a, b| a - b)
}

fn eval_mul(inputs: &[Value], _ctx: &mut EvalCtx<'_>) -> Value {
    binary(inputs, |a, b| a * b)
}

fn eval_div(inputs: &[Value], _ctx: &mut EvalCtx<'_>) -> Value {
    binary(inputs, |a, b| a / b)
}

fn eval_neg(inputs: &[Value], _ctx: &mut EvalCtx<'_>) -> Value {
    unary(inputs, |a| -a)
}

fn eval_sin(inputs: &[Value], _ctx: &mut EvalCtx<'_>) -> Value {
    unary(inputs, libm::sin)
}

fn eval_cos(inputs: &[Value], _ctx: &mut EvalCtx<'_>) -> Value {
    unary(inputs, libm::cos)
}

fn eval_clamp(inputs: &[Value], _ctx: &mut EvalCtx<'_>) -> Value {
    let v = inputs[0].as_f64().unwrap_or(0.0);
    let lo = inputs[1].as_f64().unwrap_or(0.0);
    let hi = inputs[2].as_f64().unwrap_or(1.0);
    Value::F64(v.clamp(lo.min(hi), lo.max(hi)))
}

fn eval_map_range(inputs: &[Value], _ctx: &mut EvalCtx<'_>) -> Value {
    let v = inputs[0].as_f64().unwrap_or(0.0);
    let in_lo = inputs[1].as_f64().unwrap_or(0.0);
    let in_hi = inputs[2].as_f64().unwrap_or(1.0);
    let out_lo = inputs[3].as_f64().unwrap_or(0.0);
    let out_hi = inputs[4].as_f64().unwrap_or(1.0);
    let span = in_hi - in_lo;
    let t = if span.abs() < f64::EPSILON { 0.0 } else { (v - in_lo) / span };
    Value::F64(out_lo + t * (out_hi - out_lo))
}

fn eval_ease_in_out_quad(inputs: &[Value], _ctx: &mut EvalCtx<'_>) -> Value {
    let t = inputs[0].as_f64().unwrap_or(0.0).clamp(0.0, 1.0);
    let eased = if t < 0.5 {
        2.0 * t * t
    } else {
        let u = -2.0f64.mul_add(t, 2.0);
        1.0 - u * u / 2.0
    };
    Value::F64(eased)
}

fn eval_integrate(inputs: &[Value], ctx: &mut EvalCtx<'_>) -> Value {
    let rate = inputs[0].as_f64().unwrap_or(0.0);
    let dt_ms = ctx.dt_ms;
    let prev = ctx.read_scalar_cell().unwrap_or(0.0);
    let next = rate.mul_add(dt_ms / 1000.0, prev);
    ctx.write_scalar_cell(next);
    Value::F64(next)
}

fn eval_delay_ms(inputs: &[Value], ctx: &mut EvalCtx<'_>) -> Value {
    let input = inputs[0].as_f64().unwrap_or(0.0);
    let prev = ctx.read_scalar_cell().unwrap_or(0.0);
    ctx.write_scalar_cell(input);
    Value::F64(prev)
}

fn eval_sample_hold(inputs: &[Value], ctx: &mut EvalCtx<'_>) -> Value {
    let input = inputs[0].as_f64().unwrap_or(0.0);
    let trigger = inputs[1].as_bool().unwrap_or(false);
    let prev = ctx.read_scalar_cell().unwrap_or(0.0);
    let held = if trigger { input } else { prev };
    ctx.write_scalar_cell(held);
    Value::F64(held)
}

fn eval_slew_limit(inputs: &[Value], ctx: &mut EvalCtx<'_>) -> Value {
    let target = inputs[0].as_f64().unwrap_or(0.0);
    let rate = inputs[1].as_f64().unwrap_or(f64::INFINITY).abs();
    let prev = ctx.read_scalar_cell().unwrap_or(0.0);
    let max_step = rate * (ctx.dt_ms / 1000.0);
    let delta = (target - prev).clamp(-max_step, max_step);
    let next = prev + delta;
    ctx.write_scalar_cell(next);
    Value::F64(next)
}

fn eval_hue_shift(inputs: &[Value], _ctx: &mut EvalCtx<'_>) -> Value {
    let hue = inputs[0].as_f64().unwrap_or(0.0);
    let shift = inputs[1].as_f64().unwrap_or(0.0);
    Value::F64((hue + shift).rem_euclid(1.0))
}

fn eval_to_color(inputs: &[Value], _ctx: &mut EvalCtx<'_>) -> Value {
    let gray = inputs[0].as_f64().unwrap_or(0.0).clamp(0.0, 1.0);
    Value::Object(crate::value::ObjectValue::Color([gray, gray, gray, 1.0]))
}

fn eval_mix(inputs: &[Value], _ctx: &mut EvalCtx<'_>) -> Value {
    let a = inputs[0].as_f64().unwrap_or(0.0);
    let b = inputs[1].as_f64().unwrap_or(0.0);
    let t = inputs[2].as_f64().unwrap_or(0.5).clamp(0.0, 1.0);
    Value::F64(a + (b - a) * t)
}

fn eval_scalar_to_signal(inputs: &[Value], _ctx: &mut EvalCtx<'_>) -> Value {
    inputs[0].clone()
}

fn eval_const_to_signal(inputs: &[Value], _ctx: &mut EvalCtx<'_>) -> Value {
    inputs[0].clone()
}

/// Opcode id registry.
#[derive(Debug, Clone)]
pub struct OpcodeRegistry {
    descriptors: BTreeMap<String, OpcodeDescriptor>,
}

impl OpcodeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptors: BTreeMap::new(),
        }
    }

    /// Registers a descriptor under the given id, replacing any prior entry.
    pub fn register(&mut self, id: impl Into<String>, descriptor: OpcodeDescriptor) {
        self.descriptors.insert(id.into(), descriptor);
    }

    /// Looks up a descriptor by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&OpcodeDescriptor> {
        self.descriptors.get(id)
    }

    /// Builds the representative built-in opcode set named in §4.2.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let number = ValueDomain::Number;
        registry.register(
            "add",
            OpcodeDescriptor {
                arity: 2,
                input_types: vec![number, number],
                output_type: number,
                stateful: false,
                evaluator: eval_add,
            },
        );
        registry.register(
            "sub",
            OpcodeDescriptor {
                arity: 2,
                input_types: vec![number, number],
                output_type: number,
                stateful: false,
                evaluator: eval_sub,
            },
        );
        registry.register(
            "mul",
            OpcodeDescriptor {
                arity: 2,
                input_types: vec![number, number],
                output_type: number,
                stateful: false,
                evaluator: eval_mul,
            },
        );
        registry.register(
            "div",
            OpcodeDescriptor {
                arity: 2,
                input_types: vec![number, number],
                output_type: number,
                stateful: false,
                evaluator: eval_div,
            },
        );
        registry.register(
            "neg",
            OpcodeDescriptor {
                arity: 1,
                input_types: vec![number],
                output_type: number,
                stateful: false,
                evaluator: eval_neg,
            },
        );
        registry.register(
            "sin",
            OpcodeDescriptor {
                arity: 1,
                input_types: vec![number],
                output_type: number,
                stateful: false,
                evaluator: eval_sin,
            },
        );
        registry.register(
            "cos",
            OpcodeDescriptor {
                arity: 1,
                input_types: vec![number],
                output_type: number,
                stateful: false,
                evaluator: eval_cos,
            },
        );
        registry.register(
            "clamp",
            OpcodeDescriptor {
                arity: 3,
                input_types: vec![number, number, number],
                output_type: number,
                stateful: false,
                evaluator: eval_clamp,
            },
        );
        registry.register(
            "mapRange",
            OpcodeDescriptor {
                arity: 5,
                input_types: vec![number, number, number, number, number],
                output_type: number,
                stateful: false,
                evaluator: eval_map_range,
            },
        );
        registry.register(
            "easeInOutQuad",
            OpcodeDescriptor {
                arity: 1,
                input_types: vec![number],
                output_type: number,
                stateful: false,
                evaluator: eval_ease_in_out_quad,
            },
        );
        registry.register(
            "integrate",
            OpcodeDescriptor {
                arity: 1,
                input_types: vec![number],
                output_type: number,
                stateful: true,
                evaluator: eval_integrate,
            },
        );
        registry.register(
            "delayMs",
            OpcodeDescriptor {
                arity: 1,
                input_types: vec![number],
                output_type: number,
                stateful: true,
                evaluator: eval_delay_ms,
            },
        );
        registry.register(
            "sampleHold",
            OpcodeDescriptor {
                arity: 2,
                input_types: vec![number, ValueDomain::Boolean],
                output_type: number,
                stateful: true,
                evaluator: eval_sample_hold,
            },
        );
        registry.register(
            "slewLimit",
            OpcodeDescriptor {
                arity: 2,
                input_types: vec![number, number],
                output_type: number,
                stateful: true,
                evaluator: eval_slew_limit,
            },
        );
        registry.register(
            "hueShift",
            OpcodeDescriptor {
                arity: 2,
                input_types: vec![number, number],
                output_type: number,
                stateful: false,
                evaluator: eval_hue_shift,
            },
        );
        registry.register(
            "toColor",
            OpcodeDescriptor {
                arity: 1,
                input_types: vec![number],
                output_type: ValueDomain::Color,
                stateful: false,
                evaluator: eval_to_color,
            },
        );
        registry.register(
            "mix",
            OpcodeDescriptor {
                arity: 3,
                input_types: vec![number, number, number],
                output_type: number,
                stateful: false,
                evaluator: eval_mix,
            },
        );
        registry.register(
            "scalarToSignal",
            OpcodeDescriptor {
                arity: 1,
                input_types: vec![number],
                output_type: number,
                stateful: false,
                evaluator: eval_scalar_to_signal,
            },
        );
        registry.register(
            "constToSignal",
            OpcodeDescriptor {
                arity: 1,
                input_types: vec![number],
                output_type: number,
                stateful: false,
                evaluator: eval_const_to_signal,
            },
        );
        registry
    }
}

impl Default for OpcodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience constructor for the canonical numeric-signal type used by
/// most built-in opcodes.
#[must_use]
pub fn signal_number() -> TypeDesc {
    TypeDesc::core(World::Signal, ValueDomain::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::signal::EvalCtx;
    use crate::ident::StateCellId;
    use crate::runtime::state_buffer::StateBuffer;

    #[test]
    fn add_opcode_sums_inputs() {
        let registry = OpcodeRegistry::with_builtins();
        let descriptor = registry.get("add").unwrap();
        let mut state = StateBuffer::new();
        let mut ctx = EvalCtx::new(&mut state, None, 16.0);
        let result = (descriptor.evaluator)(&[Value::F64(2.0), Value::F64(3.0)], &mut ctx);
        assert_eq!(result.as_f64(), Some(5.0));
    }

    #[test]
    fn integrate_accumulates_across_calls() {
        let registry = OpcodeRegistry::with_builtins();
        let descriptor = registry.get("integrate").unwrap();
        let mut state = StateBuffer::new();
        let cell = state.reserve_scalar_cell();
        let mut ctx = EvalCtx::new(&mut state, Some(cell), 1000.0);
        let first = (descriptor.evaluator)(&[Value::F64(1.0)], &mut ctx);
        assert_eq!(first.as_f64(), Some(1.0));
        let mut ctx2 = EvalCtx::new(&mut state, Some(cell), 1000.0);
        let second = (descriptor.evaluator)(&[Value::F64(1.0)], &mut ctx2);
        assert_eq!(second.as_f64(), Some(2.0));
    }

    #[test]
    fn unknown_opcode_is_absent() {
        let registry = OpcodeRegistry::with_builtins();
        assert!(registry.get("notAnOpcode").is_none());
    }

    #[allow(dead_code)]
    fn _unused_cell_type_reference(_: StateCellId) {}
}
