// SPDX-License-Identifier: Apache-2.0
//! Field-expression IR: lazy per-element recipes materialized at render
//! sinks or signal-reducing opcodes (§4.3).
use crate::ident::{BusIndex, FieldExprId, SigExprId, TransformChainId, ValueSlot};

/// One node in a field recipe. Evaluating a `FieldExprIR` never happens
/// eagerly — only [`crate::runtime::field_materializer`] walks the recipe
/// into a typed buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldExprIR {
    /// A per-element constant (same value broadcast to every element).
    Const(crate::value::Value),
    /// Reads a field-typed value slot.
    InputSlot(ValueSlot),
    /// Applies a stateless opcode element-wise across operand fields.
    Map {
        /// Registry opcode id.
        opcode: String,
        /// Operand field expression ids.
        inputs: Vec<FieldExprId>,
    },
    /// Applies a stateless binary opcode element-wise.
    Zip {
        /// Registry opcode id.
        opcode: String,
        /// Exactly two operand field expression ids.
        inputs: [FieldExprId; 2],
    },
    /// Per-element selection between two fields.
    Select {
        /// Condition field.
        condition: FieldExprId,
        /// Value when the condition holds.
        a: FieldExprId,
        /// Value when the condition does not hold.
        b: FieldExprId,
    },
    /// Applies a compiled residual transform chain element-wise.
    Transform {
        /// Transform chain id.
        chain: TransformChainId,
        /// Input field expression.
        input: FieldExprId,
    },
    /// Broadcasts a signal's scalar value to every element of the domain
    /// (§4.6 `sampleSignal`).
    SampleSignal(SigExprId),
    /// Materializes a bus's publishers onto this field's domain.
    BusCombine(BusIndex),
    /// Generates a centered, row-major grid of `vec2` positions: element
    /// `r * cols + c` sits at `((c - (cols-1)/2) * spacing, (r - (rows-1)/2)
    /// * spacing)`. Grid shape and spacing are authored block parameters
    /// rather than upstream values, so this node carries them directly
    /// instead of referencing operand expressions.
    GridPositions {
        /// Row count.
        rows: u32,
        /// Column count.
        cols: u32,
        /// Distance between adjacent grid cells.
        spacing: f64,
    },
}

/// A typed set of element indices generated by a domain-authoring block
/// (e.g. a grid or a point cloud), over which field expressions are
/// evaluated.
///
/// This is distinct from [`crate::types::ValueDomain`] (the semantic-kind
/// field inside `TypeDesc`). A `ValueDomain::DomainRef` value is the
/// value-world *handle* flowing through a wire that points at one of these
/// element domains; `ElementDomain` itself never appears as a wire value.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDomain {
    /// Number of elements in this domain.
    pub element_count: u32,
    /// Monotonic version, bumped whenever `element_count` or the per-element
    /// identity seeds change; used as part of the materialization cache key
    /// (§4.3).
    pub version: u64,
}

impl ElementDomain {
    /// Builds a domain with an initial version of zero.
    #[must_use]
    pub fn new(element_count: u32) -> Self {
        Self {
            element_count,
            version: 0,
        }
    }

    /// Bumps the version, invalidating any cached materialization keyed on
    /// the previous version.
    pub fn bump_version(&mut self) {
        self.version = self.version.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_version_changes_cache_key_component() {
        let mut domain = ElementDomain::new(4);
        let v0 = domain.version;
        domain.bump_version();
        assert_ne!(domain.version, v0);
    }

    #[test]
    fn zero_element_domain_is_representable() {
        let domain = ElementDomain::new(0);
        assert_eq!(domain.element_count, 0);
    }
}
