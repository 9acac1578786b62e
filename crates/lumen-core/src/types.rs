// SPDX-License-Identifier: Apache-2.0
//! Canonical type descriptors: evaluation world, semantic kind, visibility
//! category, and bus eligibility.
//!
//! Types are compared structurally. Two types are *compatible* iff their
//! worlds match and their domains match; a mismatched world requires an
//! explicit cross-world operator (§4.6), never implicit conversion.

/// Evaluation cadence of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum World {
    /// Time-indexed scalar-world value, evaluated once per frame per sampling.
    Signal,
    /// Per-element value world, lazily materialized at render sinks.
    Field,
    /// A compile-time scalar constant with no per-frame evaluation.
    Scalar,
    /// A discrete occurrence world (e.g. `wrapEvent`, quantized pulses).
    Event,
    /// Engine-internal values not addressable by authored wires (e.g. render
    /// frames, domains).
    Special,
}

/// Semantic element kind carried by a value.
///
/// This is deliberately distinct from [`crate::ir::field::ElementDomain`],
/// which is the *other* sense of "domain" used by field evaluation (a typed
/// set of element indices). `ValueDomain::DomainRef` is the value-world
/// handle to one such element domain flowing through a wire; it is not the
/// element domain itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueDomain {
    /// A plain real number.
    Number,
    /// A boolean flag (stored in the `I32` storage lane as 0/1).
    Boolean,
    /// A wrapped phase in `[0, 1)`.
    Phase01,
    /// Milliseconds, either absolute (`tAbsMs`) or model time (`tModelMs`).
    TimeMs,
    /// A 2-component vector.
    Vec2,
    /// A 3-component vector.
    Vec3,
    /// Linear RGBA color in `[0, 1]`.
    Color,
    /// A handle to an element domain (see module doc).
    DomainRef,
    /// The assembled per-frame render tree (§6).
    RenderFrame,
}

/// User-visibility classification for a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Category {
    /// Visible on authored block ports.
    Core,
    /// Engine-internal only; never exposed on a port.
    Internal,
}

/// Canonical type descriptor: `(world, domain, category, busEligible)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TypeDesc {
    /// Evaluation cadence.
    pub world: World,
    /// Semantic element kind.
    pub domain: ValueDomain,
    /// User-visibility classification.
    pub category: Category,
    /// Whether this type may flow through a bus.
    pub bus_eligible: bool,
}

impl TypeDesc {
    /// Constructs a core (user-visible), non-bus-eligible type descriptor.
    #[must_use]
    pub const fn core(world: World, domain: ValueDomain) -> Self {
        Self {
            world,
            domain,
            category: Category::Core,
            bus_eligible: false,
        }
    }

    /// Constructs a bus-eligible core type descriptor.
    #[must_use]
    pub const fn bus_eligible(world: World, domain: ValueDomain) -> Self {
        Self {
            world,
            domain,
            category: Category::Core,
            bus_eligible: true,
        }
    }

    /// Constructs an internal, non-port-visible type descriptor.
    #[must_use]
    pub const fn internal(world: World, domain: ValueDomain) -> Self {
        Self {
            world,
            domain,
            category: Category::Internal,
            bus_eligible: false,
        }
    }

    /// Structural compatibility: worlds and domains both match.
    ///
    /// This does not account for explicit cross-world converters (§4.6); a
    /// wire whose endpoints are incompatible under this check but bridged by
    /// an explicit converter operator is still valid — the converter itself
    /// produces a value whose `TypeDesc` is compatible with the target port.
    #[must_use]
    pub fn compatible(&self, other: &Self) -> bool {
        self.world == other.world && self.domain == other.domain
    }

    /// Returns true if this type is numeric and therefore eligible for the
    /// arithmetic bus combine modes (`sum`, `average`, `min`, `max`, `product`).
    #[must_use]
    pub fn is_numeric_combinable(&self) -> bool {
        matches!(
            self.domain,
            ValueDomain::Number | ValueDomain::Boolean | ValueDomain::Phase01 | ValueDomain::TimeMs
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatible_requires_world_and_domain_match() {
        let a = TypeDesc::core(World::Signal, ValueDomain::Number);
        let b = TypeDesc::core(World::Signal, ValueDomain::Number);
        let c = TypeDesc::core(World::Field, ValueDomain::Number);
        assert!(a.compatible(&b));
        assert!(!a.compatible(&c));
    }

    #[test]
    fn vector_and_color_are_not_numeric_combinable() {
        let vec2 = TypeDesc::bus_eligible(World::Signal, ValueDomain::Vec2);
        let color = TypeDesc::bus_eligible(World::Signal, ValueDomain::Color);
        assert!(!vec2.is_numeric_combinable());
        assert!(!color.is_numeric_combinable());
    }
}
