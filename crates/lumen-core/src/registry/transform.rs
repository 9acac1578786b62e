// SPDX-License-Identifier: Apache-2.0
//! Transform id registry: one descriptor per wire-transform kind (§4.4).
use std::collections::BTreeMap;

use crate::transform::TransformCtx;
use crate::value::Value;

/// Declared parameter shape for a transform id, validated by the builder at
/// lowering time (§9: "replace duck-typed transform params with typed
/// `ParamSchema`").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// A plain real number.
    Number,
    /// A boolean flag.
    Boolean,
}

/// Function pointer applying one transform step to a value.
pub type ApplyFn = fn(Value, &BTreeMap<String, Value>, &mut TransformCtx<'_>) -> Value;

/// Descriptor for one transform id, analogous in shape to the teacher's
/// `RewriteRule { matcher, executor, compute_footprint, .. }`: plain `fn`
/// items rather than trait objects.
#[derive(Debug, Clone)]
pub struct TransformDescriptor {
    /// Declared parameter names and types, checked at lowering time.
    pub param_schema: BTreeMap<String, ParamType>,
    /// Whether this transform hosts persistent state in the destination
    /// block's state namespace (§4.4); if true, lowering must reserve a
    /// state cell for every step using this id or fail to compile.
    pub stateful: bool,
    /// Applies this step to a value.
    pub apply: ApplyFn,
}

fn param_f64(params: &BTreeMap<String, Value>, name: &str, default: f64) -> f64 {
    params.get(name).and_then(Value::as_f64).unwrap_or(default)
}

fn apply_scale(value: Value, params: &BTreeMap<String, Value>, _ctx: &mut TransformCtx<'_>) -> Value {
    let factor = param_f64(params, "factor", 1.0);
    match value.as_f64() {
        Some(v) => Value::F64(v * factor),
        None => value,
    }
}

fn apply_offset(value: Value, params: &BTreeMap<String, Value>, _ctx: &mut TransformCtx<'_>) -> Value {
    let amount = param_f64(params, "amount", 0.0);
    match value.as_f64() {
        Some(v) => Value::F64(v + amount),
        None => value,
    }
}

fn apply_clamp(value: Value, params: &BTreeMap<String, Value>, _ctx: &mut TransformCtx<'_>) -> Value {
    let lo = param_f64(params, "min", 0.0);
    let hi = param_f64(params, "max", 1.0);
    match value.as_f64() {
        Some(v) => Value::F64(v.clamp(lo.min(hi), lo.max(hi))),
        None => value,
    }
}

fn apply_map_range(value: Value, params: &BTreeMap<String, Value>, _ctx: &mut TransformCtx<'_>) -> Value {
    let in_lo = param_f64(params, "inMin", 0.0);
    let in_hi = param_f64(params, "inMax", 1.0);
    let out_lo = param_f64(params, "outMin", 0.0);
    let out_hi = param_f64(params, "outMax", 1.0);
    match value.as_f64() {
        Some(v) => {
            let span = in_hi - in_lo;
            let t = if span.abs() < f64::EPSILON { 0.0 } else { (v - in_lo) / span };
            Value::F64(out_lo + t * (out_hi - out_lo))
        }
        None => value,
    }
}

fn apply_quantize(value: Value, params: &BTreeMap<String, Value>, _ctx: &mut TransformCtx<'_>) -> Value {
    let steps = param_f64(params, "steps", 1.0).max(1.0);
    match value.as_f64() {
        Some(v) => Value::F64((v * steps).round() / steps),
        None => value,
    }
}

fn apply_polarity(value: Value, params: &BTreeMap<String, Value>, _ctx: &mut TransformCtx<'_>) -> Value {
    let invert = params.get("invert").and_then(Value::as_bool).unwrap_or(false);
    match value.as_f64() {
        Some(v) => Value::F64(if invert { -v } else { v }),
        None => value,
    }
}

fn apply_deadzone(value: Value, params: &BTreeMap<String, Value>, _ctx: &mut TransformCtx<'_>) -> Value {
    let threshold = param_f64(params, "threshold", 0.0).abs();
    match value.as_f64() {
        Some(v) if v.abs() < threshold => Value::F64(0.0),
        Some(v) => Value::F64(v),
        None => value,
    }
}

fn apply_ease(value: Value, params: &BTreeMap<String, Value>, _ctx: &mut TransformCtx<'_>) -> Value {
    let t = value.as_f64().unwrap_or(0.0).clamp(0.0, 1.0);
    let power = param_f64(params, "power", 2.0);
    Value::F64(libm::pow(t, power))
}

fn apply_const_to_signal(value: Value, _params: &BTreeMap<String, Value>, _ctx: &mut TransformCtx<'_>) -> Value {
    value
}

fn apply_broadcast_scalar_to_field(
    value: Value,
    _params: &BTreeMap<String, Value>,
    _ctx: &mut TransformCtx<'_>,
) -> Value {
    value
}

fn apply_to_color(value: Value, params: &BTreeMap<String, Value>, _ctx: &mut TransformCtx<'_>) -> Value {
    let gray = value.as_f64().unwrap_or(0.0).clamp(0.0, 1.0);
    let alpha = param_f64(params, "alpha", 1.0).clamp(0.0, 1.0);
    Value::Object(crate::value::ObjectValue::Color([gray, gray, gray, alpha]))
}

/// Caps the rate of change of a numeric value per unit time, using the
/// destination wire's reserved state cell to remember the previous output
/// (§4.4 stateful lens transforms). Mirrors `eval_slew_limit` in the opcode
/// registry, but hosted on a wire rather than a signal-IR node.
fn apply_slew_limit(value: Value, params: &BTreeMap<String, Value>, ctx: &mut TransformCtx<'_>) -> Value {
    let target = value.as_f64().unwrap_or(0.0);
    let rate = param_f64(params, "rate", f64::INFINITY).abs();
    let prev = ctx
        .state_cell
        .and_then(|cell| ctx.state.read_scalar(cell))
        .unwrap_or(target);
    let max_step = rate * (ctx.dt_ms / 1000.0);
    let next = prev + (target - prev).clamp(-max_step, max_step);
    if let Some(cell) = ctx.state_cell {
        ctx.state.write_scalar(cell, next);
    }
    Value::F64(next)
}

/// Transform id registry.
#[derive(Debug, Clone)]
pub struct TransformRegistry {
    descriptors: BTreeMap<String, TransformDescriptor>,
}

impl TransformRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptors: BTreeMap::new(),
        }
    }

    /// Registers a descriptor under the given id, replacing any prior entry.
    pub fn register(&mut self, id: impl Into<String>, descriptor: TransformDescriptor) {
        self.descriptors.insert(id.into(), descriptor);
    }

    /// Looks up a descriptor by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&TransformDescriptor> {
        self.descriptors.get(id)
    }

    /// Builds the built-in transform set named in §4.4.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let stateless_numeric = |apply: ApplyFn| TransformDescriptor {
            param_schema: BTreeMap::new(),
            stateful: false,
            apply,
        };
        registry.register("scale", stateless_numeric(apply_scale));
        registry.register("offset", stateless_numeric(apply_offset));
        registry.register("clamp", stateless_numeric(apply_clamp));
        registry.register("mapRange", stateless_numeric(apply_map_range));
        registry.register("quantize", stateless_numeric(apply_quantize));
        registry.register("polarity", stateless_numeric(apply_polarity));
        registry.register("deadzone", stateless_numeric(apply_deadzone));
        registry.register("ease", stateless_numeric(apply_ease));
        registry.register("constToSignal", stateless_numeric(apply_const_to_signal));
        registry.register(
            "broadcastScalarToField",
            stateless_numeric(apply_broadcast_scalar_to_field),
        );
        registry.register("toColor", stateless_numeric(apply_to_color));
        registry.register(
            "slewLimit",
            TransformDescriptor {
                param_schema: BTreeMap::from([("rate".to_string(), ParamType::Number)]),
                stateful: true,
                apply: apply_slew_limit,
            },
        );
        registry
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::state_buffer::StateBuffer;

    #[test]
    fn scale_descriptor_multiplies_by_factor() {
        let registry = TransformRegistry::with_builtins();
        let descriptor = registry.get("scale").unwrap();
        let mut state = StateBuffer::new();
        let mut ctx = TransformCtx {
            state_cell: None,
            state: &mut state,
            dt_ms: 16.0,
        };
        let params = BTreeMap::from([("factor".to_string(), Value::F64(3.0))]);
        let result = (descriptor.apply)(Value::F64(2.0), &params, &mut ctx);
        assert_eq!(result.as_f64(), Some(6.0));
    }

    #[test]
    fn clamp_respects_bounds() {
        let registry = TransformRegistry::with_builtins();
        let descriptor = registry.get("clamp").unwrap();
        let mut state = StateBuffer::new();
        let mut ctx = TransformCtx {
            state_cell: None,
            state: &mut state,
            dt_ms: 16.0,
        };
        let params = BTreeMap::from([
            ("min".to_string(), Value::F64(0.0)),
            ("max".to_string(), Value::F64(1.0)),
        ]);
        let result = (descriptor.apply)(Value::F64(5.0), &params, &mut ctx);
        assert_eq!(result.as_f64(), Some(1.0));
    }

    #[test]
    fn slew_limit_descriptor_is_stateful_and_caps_rate() {
        let registry = TransformRegistry::with_builtins();
        let descriptor = registry.get("slewLimit").unwrap();
        assert!(descriptor.stateful);
        let mut state = StateBuffer::new();
        let cell = state.reserve_scalar_cell();
        let mut ctx = TransformCtx {
            state_cell: Some(cell),
            state: &mut state,
            dt_ms: 1000.0,
        };
        let params = BTreeMap::from([("rate".to_string(), Value::F64(10.0))]);
        let result = (descriptor.apply)(Value::F64(100.0), &params, &mut ctx);
        assert_eq!(result.as_f64(), Some(10.0));
    }
}
