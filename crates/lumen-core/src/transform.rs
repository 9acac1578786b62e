// SPDX-License-Identifier: Apache-2.0
//! Wire transform chains: a unified apply/compile dispatcher for both
//! adapter and lens transform steps (§4.4).
//!
//! Both lowering (folding a step into IR when possible) and the runtime
//! (applying residual steps that could not be compiled away) go through the
//! same `applyTransforms` entry point, backed by one registry keyed by
//! transform id — directly mirroring the function-pointer
//! `RewriteRule { matcher, executor, compute_footprint, .. }` shape the
//! teacher uses for its rewrite rules rather than `dyn Trait` objects.
use std::collections::BTreeMap;

use crate::ident::StateCellId;
use crate::registry::transform::{TransformDescriptor, TransformRegistry};
use crate::value::Value;

/// One authored transform step on a wire.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransformStepSpec {
    /// Registry id naming this step's transform kind (e.g. `"clamp"`).
    pub id: String,
    /// Whether this step is active; disabled steps are skipped but still
    /// occupy a `stepIndex`, so state-cell addressing stays stable across
    /// toggling a step on and off.
    pub enabled: bool,
    /// Authored parameter values, by parameter name.
    pub params: BTreeMap<String, Value>,
}

/// Runtime context passed to transform evaluators: access to this step's
/// persistent state cell (if the transform is stateful) and its declared
/// identity coordinates.
pub struct TransformCtx<'a> {
    /// State cell id for this step, present only for stateful transforms.
    pub state_cell: Option<StateCellId>,
    /// Mutable access to the runtime state buffer, for stateful steps to
    /// read and write their cell.
    pub state: &'a mut crate::runtime::state_buffer::StateBuffer,
    /// Milliseconds elapsed since the previous frame, for rate-based
    /// stateful steps such as `slewLimit`.
    pub dt_ms: f64,
}

/// Errors produced while resolving or applying a transform chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// No registry entry for the given transform id.
    UnknownTransform(String),
    /// A stateful transform step was applied with no reserved state cell.
    MissingStateCell(String),
}

/// Applies an ordered chain of transform steps to a value, skipping
/// disabled steps. This is the single entry point used by both the runtime
/// (residual steps) and by lowering (folding steps into IR), per §4.4.
pub fn apply_transforms(
    registry: &TransformRegistry,
    mut value: Value,
    chain: &[TransformStepSpec],
    cells: &[Option<StateCellId>],
    ctx_state: &mut crate::runtime::state_buffer::StateBuffer,
    dt_ms: f64,
) -> Result<Value, TransformError> {
    for (step_index, step) in chain.iter().enumerate() {
        if !step.enabled {
            continue;
        }
        let descriptor = registry
            .get(&step.id)
            .ok_or_else(|| TransformError::UnknownTransform(step.id.clone()))?;
        let state_cell = cells.get(step_index).copied().flatten();
        if descriptor.stateful && state_cell.is_none() {
            return Err(TransformError::MissingStateCell(step.id.clone()));
        }
        let mut ctx = TransformCtx {
            state_cell,
            state: ctx_state,
            dt_ms,
        };
        value = (descriptor.apply)(value, &step.params, &mut ctx);
    }
    Ok(value)
}

/// Returns true if any enabled step in the chain is stateful, per the
/// registry's descriptor — used by lowering to decide whether state cells
/// must be reserved for this wire.
#[must_use]
pub fn chain_has_stateful_step(registry: &TransformRegistry, chain: &[TransformStepSpec]) -> bool {
    chain
        .iter()
        .filter(|s| s.enabled)
        .filter_map(|s| registry.get(&s.id))
        .any(|d: &TransformDescriptor| d.stateful)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::transform::TransformRegistry;
    use crate::runtime::state_buffer::StateBuffer;

    #[test]
    fn disabled_step_is_skipped() {
        let registry = TransformRegistry::with_builtins();
        let mut state = StateBuffer::new();
        let chain = vec![TransformStepSpec {
            id: "scale".to_string(),
            enabled: false,
            params: BTreeMap::from([("factor".to_string(), Value::F64(2.0))]),
        }];
        let result =
            apply_transforms(&registry, Value::F64(3.0), &chain, &[None], &mut state, 16.0).unwrap();
        assert_eq!(result.as_f64(), Some(3.0));
    }

    #[test]
    fn unknown_transform_id_is_an_error() {
        let registry = TransformRegistry::with_builtins();
        let mut state = StateBuffer::new();
        let chain = vec![TransformStepSpec {
            id: "not-a-real-transform".to_string(),
            enabled: true,
            params: BTreeMap::new(),
        }];
        let result = apply_transforms(&registry, Value::F64(1.0), &chain, &[None], &mut state, 16.0);
        assert!(matches!(result, Err(TransformError::UnknownTransform(_))));
    }

    #[test]
    fn slew_limit_caps_the_rate_of_change() {
        let registry = TransformRegistry::with_builtins();
        let mut state = StateBuffer::new();
        let cell = state.reserve_scalar_cell();
        let chain = vec![TransformStepSpec {
            id: "slewLimit".to_string(),
            enabled: true,
            params: BTreeMap::from([("rate".to_string(), Value::F64(10.0))]),
        }];
        let result = apply_transforms(&registry, Value::F64(100.0), &chain, &[Some(cell)], &mut state, 1000.0)
            .unwrap();
        assert_eq!(result.as_f64(), Some(10.0));
    }
}
