// SPDX-License-Identifier: Apache-2.0
//! Fixture patches exercising the named testable-property scenarios (§8),
//! shared between this crate's integration tests and `lumen-cli`.
//!
//! S6 (single-writer invariant) is not a fixture here: it requires a
//! schedule with two steps writing the same slot, which cannot be authored
//! through the ordinary block registry. It is exercised directly against
//! [`crate::lowering::compile`]'s own duplicate-writer check instead.
use std::collections::BTreeMap;

use crate::bus::CombineMode;
use crate::ident::{BlockId, PortSlot};
use crate::patch::{Block, BusDecl, BusPublish, DefaultSourceSpec, Patch, PortDecl, Wire};
use crate::transform::TransformStepSpec;
use crate::value::{ObjectValue, Value};

fn block(block_type: &str, params: BTreeMap<String, Value>, inputs: &[&str], outputs: &[&str]) -> Block {
    Block {
        block_type: block_type.to_string(),
        params,
        inputs: decls(inputs),
        outputs: decls(outputs),
    }
}

fn decls(names: &[&str]) -> Vec<PortDecl> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| PortDecl {
            slot: PortSlot(u16::try_from(i).unwrap_or(u16::MAX)),
            name: (*name).to_string(),
        })
        .collect()
}

fn id(name: &str) -> BlockId {
    BlockId(name.to_string())
}

fn params(entries: &[(&str, Value)]) -> BTreeMap<String, Value> {
    entries.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
}

fn wire(from_block: &str, from_slot: u16, to_block: &str, to_slot: u16) -> Wire {
    Wire {
        from_block: id(from_block),
        from_slot: PortSlot(from_slot),
        to_block: id(to_block),
        to_slot: PortSlot(to_slot),
        transforms: Vec::new(),
    }
}

/// S1: one-cycle breathing grid. A finite 2000ms clock drives a 2x2 grid
/// whose per-element phase broadcasts into `RenderInstances2D`'s `radii`
/// input; `colors` has no emitting block in the built-in palette, so it is
/// supplied through a default source instead of a wire.
#[must_use]
pub fn s1_breathing_grid() -> Patch {
    let mut patch = Patch::new(1);
    patch.insert_block(
        id("clock"),
        block(
            "TimeRoot.finite",
            params(&[("durationMs", Value::F64(2000.0))]),
            &[],
            &["durationMs"],
        ),
    );
    patch.insert_block(
        id("domain"),
        block(
            "GridDomain",
            params(&[("rows", Value::F64(2.0)), ("cols", Value::F64(2.0))]),
            &[],
            &["domain"],
        ),
    );
    patch.insert_block(
        id("grid"),
        block(
            "PositionMapGrid",
            params(&[
                ("spacing", Value::F64(10.0)),
                ("rows", Value::F64(2.0)),
                ("cols", Value::F64(2.0)),
            ]),
            &["domain"],
            &["positions"],
        ),
    );
    patch.insert_block(
        id("bcast"),
        block("BroadcastPhaseToField", BTreeMap::new(), &["domain"], &["out"]),
    );
    patch.insert_block(
        id("render"),
        block(
            "RenderInstances2D",
            BTreeMap::new(),
            &["positions", "colors", "radii"],
            &["frame"],
        ),
    );

    patch.add_wire(wire("domain", 0, "grid", 0));
    patch.add_wire(wire("domain", 0, "bcast", 0));
    patch.add_wire(wire("grid", 0, "render", 0));
    patch.add_wire(wire("bcast", 0, "render", 2));

    patch.default_sources.insert(
        (id("render"), PortSlot(1)),
        DefaultSourceSpec::Constant(Value::Object(ObjectValue::Color([1.0, 1.0, 1.0, 1.0]))),
    );

    patch
}

/// S2: bus combine determinism. Three `Const` publishers feed a
/// user-declared `Last`-combine signal bus `x` sharing one sort key; the
/// fixture is built with publishers already in a different order than
/// their authored ids, so a correct compile must still resolve the last
/// publisher by `(sortKey, stableHash)` rather than authoring order.
#[must_use]
pub fn s2_bus_combine_last() -> Patch {
    let mut patch = Patch::new(2);
    patch.insert_block(
        id("clock"),
        block("TimeRoot.infinite", BTreeMap::new(), &[], &["tModelMs"]),
    );
    patch.insert_block(id("pubC"), block("Const", params(&[("value", Value::F64(5.0))]), &[], &["out"]));
    patch.insert_block(id("pubA"), block("Const", params(&[("value", Value::F64(2.0))]), &[], &["out"]));
    patch.insert_block(id("pubB"), block("Const", params(&[("value", Value::F64(3.0))]), &[], &["out"]));

    patch.add_bus(BusDecl {
        name: "x".to_string(),
        combine: CombineMode::Last,
    });
    // Pushed out of alphabetical order on purpose: publisher resolution
    // order must come from `(sortKey, stableHash)`, not authoring order.
    for (block_name, sort_key) in [("pubC", (0, 0, 1)), ("pubA", (0, 0, 1)), ("pubB", (0, 0, 1))] {
        patch.bus_publishes.push(BusPublish {
            bus: "x".to_string(),
            block: id(block_name),
            slot: PortSlot(0),
            sort_key,
        });
    }

    patch
}

/// S3: world-crossing rejection. A `Signal<number>` output wired directly
/// into a `Field<number>` input with no transform; compiling this patch
/// must fail typecheck with no program emitted.
#[must_use]
pub fn s3_world_mismatch() -> Patch {
    let mut patch = Patch::new(3);
    patch.insert_block(
        id("clock"),
        block("TimeRoot.infinite", BTreeMap::new(), &[], &["tModelMs"]),
    );
    patch.insert_block(id("domain"), block("GridDomain", params(&[("rows", Value::F64(1.0)), ("cols", Value::F64(1.0))]), &[], &["domain"]));
    patch.insert_block(id("osc"), block("Osc.sine", params(&[("freqHz", Value::F64(1.0))]), &[], &["out"]));
    patch.insert_block(
        id("render"),
        block(
            "RenderInstances2D",
            BTreeMap::new(),
            &["positions", "colors", "radii"],
            &["frame"],
        ),
    );

    // osc.out is Signal<number>; render.radii is Field<number>. No transform.
    patch.add_wire(wire("osc", 0, "render", 2));
    patch.default_sources.insert(
        (id("render"), PortSlot(0)),
        DefaultSourceSpec::Constant(Value::Object(ObjectValue::Vec2([0.0, 0.0]))),
    );
    patch.default_sources.insert(
        (id("render"), PortSlot(1)),
        DefaultSourceSpec::Constant(Value::Object(ObjectValue::Color([1.0, 1.0, 1.0, 1.0]))),
    );

    patch
}

/// S4: stateful slew across hot-swap. A `slewLimit` step sits on the wire
/// feeding `render`'s `radii` input. Two variants are returned: a base
/// patch and a second patch differing only in the `colors` default (render
/// color), so a caller can compile both and assert the slew's state cell
/// carries over by stable identity (invariant in §4.9).
#[must_use]
pub fn s4_slew_across_hot_swap() -> (Patch, Patch) {
    fn base(seed: u64, color: [f64; 4]) -> Patch {
        let mut patch = Patch::new(seed);
        patch.insert_block(
            id("clock"),
            block("TimeRoot.infinite", BTreeMap::new(), &[], &["tModelMs"]),
        );
        patch.insert_block(
            id("domain"),
            block("GridDomain", params(&[("rows", Value::F64(1.0)), ("cols", Value::F64(1.0))]), &[], &["domain"]),
        );
        patch.insert_block(
            id("grid"),
            block(
                "PositionMapGrid",
                params(&[("spacing", Value::F64(1.0)), ("rows", Value::F64(1.0)), ("cols", Value::F64(1.0))]),
                &["domain"],
                &["positions"],
            ),
        );
        patch.insert_block(
            id("bcast"),
            block("BroadcastPhaseToField", BTreeMap::new(), &["domain"], &["out"]),
        );
        patch.insert_block(
            id("render"),
            block(
                "RenderInstances2D",
                BTreeMap::new(),
                &["positions", "colors", "radii"],
                &["frame"],
            ),
        );

        patch.add_wire(wire("domain", 0, "grid", 0));
        patch.add_wire(wire("domain", 0, "bcast", 0));
        patch.add_wire(wire("grid", 0, "render", 0));
        patch.wires.push(Wire {
            from_block: id("bcast"),
            from_slot: PortSlot(0),
            to_block: id("render"),
            to_slot: PortSlot(2),
            transforms: vec![TransformStepSpec {
                id: "slewLimit".to_string(),
                enabled: true,
                params: params(&[("rate", Value::F64(10.0))]),
            }],
        });
        patch.default_sources.insert(
            (id("render"), PortSlot(1)),
            DefaultSourceSpec::Constant(Value::Object(ObjectValue::Color(color))),
        );
        patch
    }

    (base(4, [1.0, 1.0, 1.0, 1.0]), base(4, [1.0, 0.0, 0.0, 1.0]))
}

/// S5: reserved-bus type lock. A publisher writes `Signal<color>` into the
/// reserved `pulse` bus, which is locked to `Event<boolean>`; compiling
/// must fail with the reserved-bus-misuse diagnostic.
#[must_use]
pub fn s5_reserved_bus_misuse() -> Patch {
    let mut patch = Patch::new(5);
    patch.insert_block(
        id("clock"),
        block("TimeRoot.infinite", BTreeMap::new(), &[], &["tModelMs"]),
    );
    patch.insert_block(
        id("swatch"),
        Block {
            block_type: "Const".to_string(),
            params: params(&[("value", Value::F64(1.0))]),
            inputs: Vec::new(),
            outputs: vec![PortDecl {
                slot: PortSlot(0),
                name: "out".to_string(),
            }],
        },
    );
    // A reserved bus must still be declared to take part in lowering;
    // authoring it with its own (correct) locked combine mode isolates the
    // failure to the publisher's type, not the declaration's combine mode.
    patch.add_bus(BusDecl {
        name: "pulse".to_string(),
        combine: CombineMode::Last,
    });
    // `swatch` publishes `Const`'s `Signal<number>` output into `pulse`,
    // which is locked to `Event<boolean>`; the reserved-bus check compares
    // the bus's locked shape against the publishing port's declared type.
    patch.bus_publishes.push(BusPublish {
        bus: "pulse".to_string(),
        block: id("swatch"),
        slot: PortSlot(0),
        sort_key: (0, 0, 0),
    });
    patch
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_has_five_blocks_and_four_wires() {
        let patch = s1_breathing_grid();
        assert_eq!(patch.blocks.len(), 5);
        assert_eq!(patch.wires.len(), 4);
        assert!(patch.default_sources.contains_key(&(id("render"), PortSlot(1))));
    }

    #[test]
    fn s2_has_three_publishers_sharing_a_sort_key() {
        let patch = s2_bus_combine_last();
        assert_eq!(patch.bus_publishes.len(), 3);
        assert!(patch.bus_publishes.iter().all(|p| p.sort_key == (0, 0, 1)));
    }

    #[test]
    fn s4_variants_share_seed_and_differ_only_in_render_color() {
        let (first, second) = s4_slew_across_hot_swap();
        assert_eq!(first.seed, second.seed);
        assert_ne!(
            first.default_sources[&(id("render"), PortSlot(1))],
            second.default_sources[&(id("render"), PortSlot(1))]
        );
    }

    #[test]
    fn s5_publishes_into_the_reserved_pulse_bus() {
        let patch = s5_reserved_bus_misuse();
        assert_eq!(patch.bus_publishes.len(), 1);
        assert_eq!(patch.bus_publishes[0].bus, "pulse");
    }
}
