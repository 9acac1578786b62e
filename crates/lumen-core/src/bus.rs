// SPDX-License-Identifier: Apache-2.0
//! Bus combine semantics: deterministic, ordered-publisher accumulation
//! over a single combine mode (§4.7).
//!
//! The accumulator shape — publishers collected keyed by their sort key,
//! then folded in key order — is grounded on the teacher's
//! `MaterializationBus`, whose `pending: BTreeMap<ChannelId, BTreeMap<EmitKey, Vec<u8>>>`
//! plus `finalize()` gives deterministic combine regardless of publisher
//! insertion order for a sibling problem (channel emission policies). Here
//! the payload is a typed [`crate::value::Value`] and the policies are
//! numeric combine modes rather than opaque byte blobs.
use crate::ident::{BlockId, PortSlot};
use crate::value::Value;

/// Combine mode for a bus's publisher set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CombineMode {
    /// The last publisher in sort order wins.
    Last,
    /// Arithmetic sum of all publishers.
    Sum,
    /// Arithmetic mean of all publishers.
    Average,
    /// Minimum across all publishers.
    Min,
    /// Maximum across all publishers.
    Max,
    /// Product of all publishers.
    Product,
}

impl CombineMode {
    /// Returns true if this mode is legal for a non-numeric (`vec2`, `vec3`,
    /// `color`) bus type. Per the spec's open question, only `last` is ever
    /// legal there; everything else is `E_BUS_COMBINE_INVALID`.
    #[must_use]
    pub const fn legal_for_non_numeric(self) -> bool {
        matches!(self, Self::Last)
    }
}

/// A single ordered publisher contribution.
#[derive(Debug, Clone)]
pub struct Publisher {
    /// Authored sort key (invariant 4): publishers are folded in ascending
    /// `(sort_key, stable_hash)` order.
    pub sort_key: (u32, u32, u32),
    /// Publishing block, used to derive the stable-hash tie-break.
    pub block: BlockId,
    /// Publishing output slot, used to derive the stable-hash tie-break.
    pub slot: PortSlot,
    /// The value this publisher contributed this frame.
    pub value: Value,
}

/// Sorts publishers by `(sort_key ascending, publisher stable-hash
/// lexicographic)` (invariant 4), a total order independent of authoring
/// insertion order.
pub fn sorted_publishers(mut publishers: Vec<Publisher>) -> Vec<Publisher> {
    publishers.sort_by(|a, b| {
        a.sort_key
            .cmp(&b.sort_key)
            .then_with(|| {
                let ha = crate::ident::publisher_stable_hash(&a.block, a.slot);
                let hb = crate::ident::publisher_stable_hash(&b.block, b.slot);
                ha.cmp(&hb)
            })
    });
    publishers
}

/// Folds an already-sorted publisher list under a combine mode. Returns
/// `None` for an empty publisher list (callers fall back to the bus's
/// default source, if any).
#[must_use]
pub fn combine(mode: CombineMode, sorted: &[Publisher]) -> Option<Value> {
    let values: Vec<Value> = sorted.iter().map(|p| p.value.clone()).collect();
    fold_values(mode, &values)
}

/// Folds a list of values, already in deterministic publisher order, under a
/// combine mode. This is the runtime half of bus combine: the publisher
/// ordering itself (invariant 4) is fixed at compile time since it depends
/// only on authored sort keys and stable hashes, never on per-frame data, so
/// the schedule only needs to carry the already-sorted operand list and fold
/// the values it samples each frame.
#[must_use]
pub fn fold_values(mode: CombineMode, sorted: &[Value]) -> Option<Value> {
    let last = sorted.last()?;
    match mode {
        CombineMode::Last => Some(last.clone()),
        CombineMode::Sum => numeric_fold(sorted, 0.0, |acc, v| acc + v),
        CombineMode::Average => {
            let sum = numeric_fold(sorted, 0.0, |acc, v| acc + v)?;
            #[allow(clippy::cast_precision_loss)]
            let count = sorted.len() as f64;
            Some(Value::F64(sum.as_f64().unwrap_or(0.0) / count))
        }
        CombineMode::Min => numeric_fold(sorted, f64::INFINITY, f64::min),
        CombineMode::Max => numeric_fold(sorted, f64::NEG_INFINITY, f64::max),
        CombineMode::Product => numeric_fold(sorted, 1.0, |acc, v| acc * v),
    }
}

fn numeric_fold(sorted: &[Value], init: f64, fold: impl Fn(f64, f64) -> f64) -> Option<Value> {
    let mut acc = init;
    for v in sorted {
        acc = fold(acc, v.as_f64()?);
    }
    Some(Value::F64(acc))
}

/// Metadata for one of the six reserved buses (§4.7): name, locked type
/// domain, and locked combine mode. Authored bus declarations that target a
/// reserved name must match this shape exactly; mismatches are
/// `E_RESERVED_BUS_MISUSE`.
#[derive(Debug, Clone, Copy)]
pub struct ReservedBus {
    /// The reserved bus's contractual name.
    pub name: &'static str,
    /// Locked semantic domain.
    pub domain: crate::types::ValueDomain,
    /// Locked world.
    pub world: crate::types::World,
    /// Locked combine mode.
    pub combine: CombineMode,
}

/// The six reserved buses (§4.7), in authoring-contract order.
pub const RESERVED_BUSES: &[ReservedBus] = &[
    ReservedBus {
        name: "time",
        domain: crate::types::ValueDomain::TimeMs,
        world: crate::types::World::Signal,
        combine: CombineMode::Last,
    },
    ReservedBus {
        name: "phaseA",
        domain: crate::types::ValueDomain::Phase01,
        world: crate::types::World::Signal,
        combine: CombineMode::Last,
    },
    ReservedBus {
        name: "phaseB",
        domain: crate::types::ValueDomain::Phase01,
        world: crate::types::World::Signal,
        combine: CombineMode::Last,
    },
    ReservedBus {
        name: "pulse",
        domain: crate::types::ValueDomain::Boolean,
        world: crate::types::World::Event,
        combine: CombineMode::Last,
    },
    ReservedBus {
        name: "energy",
        domain: crate::types::ValueDomain::Number,
        world: crate::types::World::Signal,
        combine: CombineMode::Sum,
    },
    ReservedBus {
        name: "palette",
        domain: crate::types::ValueDomain::Color,
        world: crate::types::World::Signal,
        combine: CombineMode::Last,
    },
];

/// Looks up reserved-bus metadata by name.
#[must_use]
pub fn reserved_bus(name: &str) -> Option<&'static ReservedBus> {
    RESERVED_BUSES.iter().find(|b| b.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publisher(sort_key: (u32, u32, u32), block: &str, slot: u16, value: f64) -> Publisher {
        Publisher {
            sort_key,
            block: BlockId(block.to_string()),
            slot: PortSlot(slot),
            value: Value::F64(value),
        }
    }

    #[test]
    fn last_combine_is_order_independent_under_resort() {
        let a = publisher((0, 0, 1), "pubA", 0, 2.0);
        let b = publisher((0, 0, 1), "pubB", 0, 3.0);
        let c = publisher((0, 0, 1), "pubC", 0, 5.0);

        let forward = sorted_publishers(vec![a.clone(), b.clone(), c.clone()]);
        let reversed = sorted_publishers(vec![c, b, a]);

        let r1 = combine(CombineMode::Last, &forward).unwrap();
        let r2 = combine(CombineMode::Last, &reversed).unwrap();
        assert_eq!(r1.as_f64(), r2.as_f64());
    }

    #[test]
    fn sum_combine_is_permutation_invariant() {
        let pubs = vec![
            publisher((0, 0, 0), "a", 0, 1.0),
            publisher((0, 0, 1), "b", 0, 2.0),
            publisher((1, 0, 0), "c", 0, 4.0),
        ];
        let sorted = sorted_publishers(pubs);
        let result = combine(CombineMode::Sum, &sorted).unwrap();
        assert_eq!(result.as_f64(), Some(7.0));
    }

    #[test]
    fn empty_publisher_list_combines_to_none() {
        assert!(combine(CombineMode::Sum, &[]).is_none());
    }

    #[test]
    fn reserved_buses_cover_the_fixed_family() {
        for name in ["time", "phaseA", "phaseB", "pulse", "energy", "palette"] {
            assert!(reserved_bus(name).is_some(), "missing reserved bus {name}");
        }
        assert!(reserved_bus("notReserved").is_none());
    }
}
