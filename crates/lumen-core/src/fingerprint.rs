// SPDX-License-Identifier: Apache-2.0
//! Canonical, deterministic fingerprinting for patches and state layouts
//! (§4.9: "programs are cached by a fingerprint over: block set, port
//! wiring, transform chains, default sources, bus configuration, seed").
//!
//! Grounded on the teacher's `echo-graph::RenderGraph::to_canonical_bytes`:
//! a private `Canon` view, sorted into a stable order, serialized through
//! ciborium's deterministic CBOR encoder and hashed with BLAKE3. `Value`
//! does not itself derive `Serialize` (the `serde` feature only adds
//! derives to the *public* `Patch`/`CompiledProgram`/`Diagnostic` types), so
//! this module mirrors it with a local `CanonValue` that does.
use serde::Serialize;

use crate::ident::Hash;
use crate::ir::program::StateLayoutEntry;
use crate::patch::{BusDecl, BusListen, BusPublish, DefaultSourceSpec, Patch, Wire};
use crate::value::{ObjectValue, Value};

#[derive(Serialize)]
enum CanonValue {
    F64(u64),
    F32(u32),
    I32(i32),
    U32(u32),
    Object(CanonObject),
}

#[derive(Serialize)]
enum CanonObject {
    Vec2([u64; 2]),
    Vec3([u64; 3]),
    Color([u64; 4]),
    DomainRef { element_count: u32, domain_version: u64 },
    Json(Vec<u8>),
}

impl From<&Value> for CanonValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::F64(v) => Self::F64(v.to_bits()),
            Value::F32(v) => Self::F32(v.to_bits()),
            Value::I32(v) => Self::I32(*v),
            Value::U32(v) => Self::U32(*v),
            Value::Object(obj) => Self::Object(match obj {
                ObjectValue::Vec2(v) => CanonObject::Vec2(v.map(f64::to_bits)),
                ObjectValue::Vec3(v) => CanonObject::Vec3(v.map(f64::to_bits)),
                ObjectValue::Color(v) => CanonObject::Color(v.map(f64::to_bits)),
                ObjectValue::DomainRef {
                    element_count,
                    domain_version,
                } => CanonObject::DomainRef {
                    element_count: *element_count,
                    domain_version: *domain_version,
                },
                ObjectValue::Json(bytes) => CanonObject::Json(bytes.clone()),
            }),
        }
    }
}

#[derive(Serialize)]
struct CanonTransformStep {
    id: String,
    enabled: bool,
    params: Vec<(String, CanonValue)>,
}

impl From<&crate::transform::TransformStepSpec> for CanonTransformStep {
    fn from(step: &crate::transform::TransformStepSpec) -> Self {
        Self {
            id: step.id.clone(),
            enabled: step.enabled,
            params: step.params.iter().map(|(k, v)| (k.clone(), v.into())).collect(),
        }
    }
}

#[derive(Serialize)]
struct CanonBlock<'a> {
    id: &'a str,
    block_type: &'a str,
    params: Vec<(&'a str, CanonValue)>,
}

#[derive(Serialize)]
struct CanonWire<'a> {
    from_block: &'a str,
    from_slot: u16,
    to_block: &'a str,
    to_slot: u16,
    transforms: Vec<CanonTransformStep>,
}

impl<'a> From<&'a Wire> for CanonWire<'a> {
    fn from(wire: &'a Wire) -> Self {
        Self {
            from_block: wire.from_block.0.as_str(),
            from_slot: wire.from_slot.0,
            to_block: wire.to_block.0.as_str(),
            to_slot: wire.to_slot.0,
            transforms: wire.transforms.iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize)]
struct CanonBus<'a> {
    name: &'a str,
    combine: u8,
}

#[derive(Serialize)]
struct CanonPublish<'a> {
    bus: &'a str,
    block: &'a str,
    slot: u16,
    sort_key: (u32, u32, u32),
}

#[derive(Serialize)]
struct CanonListen<'a> {
    bus: &'a str,
    block: &'a str,
    slot: u16,
}

#[derive(Serialize)]
enum CanonDefaultSource<'a> {
    Constant(CanonValue),
    Bus(&'a str),
}

impl<'a> From<&'a DefaultSourceSpec> for CanonDefaultSource<'a> {
    fn from(spec: &'a DefaultSourceSpec) -> Self {
        match spec {
            DefaultSourceSpec::Constant(v) => Self::Constant(v.into()),
            DefaultSourceSpec::Bus(name) => Self::Bus(name.as_str()),
        }
    }
}

#[derive(Serialize)]
struct CanonDefault<'a> {
    block: &'a str,
    slot: u16,
    source: CanonDefaultSource<'a>,
}

#[derive(Serialize)]
struct CanonPatch<'a> {
    blocks: Vec<CanonBlock<'a>>,
    wires: Vec<CanonWire<'a>>,
    buses: Vec<CanonBus<'a>>,
    bus_publishes: Vec<CanonPublish<'a>>,
    bus_listens: Vec<CanonListen<'a>>,
    default_sources: Vec<CanonDefault<'a>>,
    seed: u64,
}

fn combine_discriminant(mode: crate::bus::CombineMode) -> u8 {
    use crate::bus::CombineMode;
    match mode {
        CombineMode::Last => 0,
        CombineMode::Sum => 1,
        CombineMode::Average => 2,
        CombineMode::Min => 3,
        CombineMode::Max => 4,
        CombineMode::Product => 5,
    }
}

fn build_canon(patch: &Patch) -> CanonPatch<'_> {
    let blocks = patch
        .blocks
        .iter()
        .map(|(id, block)| CanonBlock {
            id: id.0.as_str(),
            block_type: block.block_type.as_str(),
            params: block.params.iter().map(|(k, v)| (k.as_str(), v.into())).collect(),
        })
        .collect();

    let mut wires: Vec<CanonWire<'_>> = patch.wires.iter().map(Into::into).collect();
    wires.sort_by(|a, b| {
        (a.from_block, a.from_slot, a.to_block, a.to_slot).cmp(&(b.from_block, b.from_slot, b.to_block, b.to_slot))
    });

    let buses: Vec<CanonBus<'_>> = sorted_by_key(&patch.buses, |b: &BusDecl| b.name.clone())
        .into_iter()
        .map(|b| CanonBus {
            name: b.name.as_str(),
            combine: combine_discriminant(b.combine),
        })
        .collect();

    let bus_publishes: Vec<CanonPublish<'_>> = sorted_by_key(&patch.bus_publishes, |p: &BusPublish| {
        (p.bus.clone(), p.block.0.clone(), p.slot.0)
    })
    .into_iter()
    .map(|p| CanonPublish {
        bus: p.bus.as_str(),
        block: p.block.0.as_str(),
        slot: p.slot.0,
        sort_key: p.sort_key,
    })
    .collect();

    let bus_listens: Vec<CanonListen<'_>> = sorted_by_key(&patch.bus_listens, |l: &BusListen| {
        (l.bus.clone(), l.block.0.clone(), l.slot.0)
    })
    .into_iter()
    .map(|l| CanonListen {
        bus: l.bus.as_str(),
        block: l.block.0.as_str(),
        slot: l.slot.0,
    })
    .collect();

    let default_sources: Vec<CanonDefault<'_>> = {
        let mut entries: Vec<_> = patch.default_sources.iter().collect();
        entries.sort_by(|a, b| (a.0 .0 .0.as_str(), a.0 .1 .0).cmp(&(b.0 .0 .0.as_str(), b.0 .1 .0)));
        entries
            .into_iter()
            .map(|((block, slot), spec)| CanonDefault {
                block: block.0.as_str(),
                slot: slot.0,
                source: spec.into(),
            })
            .collect()
    };

    CanonPatch {
        blocks,
        wires,
        buses,
        bus_publishes,
        bus_listens,
        default_sources,
        seed: patch.seed,
    }
}

/// Returns a sorted clone of `items` ordered by `key`, since several of the
/// patch's collections (`Vec<BusDecl>`, `Vec<BusPublish>`, `Vec<BusListen>`)
/// carry no inherent canonical order of their own.
fn sorted_by_key<T: Clone, K: Ord>(items: &[T], key: impl Fn(&T) -> K) -> Vec<T> {
    let mut cloned: Vec<T> = items.to_vec();
    cloned.sort_by_key(&key);
    cloned
}

/// Computes the content-addressed fingerprint over everything that affects
/// compile output: block set, port wiring, transform chains, default
/// sources, bus configuration, and seed (§4.9). Two patches with identical
/// fingerprints are guaranteed to compile to identical `CompiledProgram`
/// values up to debug-index labels (§8).
#[must_use]
pub fn patch_fingerprint(patch: &Patch) -> Hash {
    let canon = build_canon(patch);
    let mut bytes = Vec::new();
    // `into_writer` only fails on a writer I/O error or a type that cannot
    // be represented in CBOR; `CanonPatch` is built entirely from owned
    // primitives and strings, so encoding into a `Vec<u8>` cannot fail.
    #[allow(clippy::unwrap_used)]
    ciborium::ser::into_writer(&canon, &mut bytes).unwrap();
    blake3::hash(&bytes).into()
}

/// Computes the fingerprint over a program's `stateLayout` shape, used by
/// hot-swap to decide whether to carry `StateBuffer` contents forward
/// verbatim (§4.9 step 2) or remap them pairwise (§4.9 step 3).
#[must_use]
pub fn state_layout_fingerprint(entries: &[StateLayoutEntry]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"lumen:state_layout:v1\0");
    for entry in entries {
        hasher.update(&entry.cell_id.0.to_le_bytes());
        hasher.update(&[storage_discriminant(entry.storage)]);
        hasher.update(&entry.element_count.to_le_bytes());
    }
    hasher.finalize().into()
}

fn storage_discriminant(storage: crate::value::StorageClass) -> u8 {
    use crate::value::StorageClass;
    match storage {
        StorageClass::F64 => 0,
        StorageClass::F32 => 1,
        StorageClass::I32 => 2,
        StorageClass::U32 => 3,
        StorageClass::Object => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::BlockId;
    use crate::patch::{Block, PortDecl};
    use std::collections::BTreeMap;

    fn sample_patch() -> Patch {
        let mut patch = Patch::new(7);
        patch.insert_block(
            BlockId("a".to_string()),
            Block {
                block_type: "Osc.sine".to_string(),
                params: BTreeMap::from([("freqHz".to_string(), Value::F64(2.0))]),
                inputs: vec![],
                outputs: vec![PortDecl {
                    slot: crate::ident::PortSlot(0),
                    name: "out".to_string(),
                }],
            },
        );
        patch
    }

    #[test]
    fn identical_patches_fingerprint_identically() {
        let a = sample_patch();
        let b = sample_patch();
        assert_eq!(patch_fingerprint(&a), patch_fingerprint(&b));
    }

    #[test]
    fn changing_a_param_changes_the_fingerprint() {
        let a = sample_patch();
        let mut b = sample_patch();
        b.blocks
            .get_mut(&BlockId("a".to_string()))
            .unwrap()
            .params
            .insert("freqHz".to_string(), Value::F64(3.0));
        assert_ne!(patch_fingerprint(&a), patch_fingerprint(&b));
    }

    #[test]
    fn state_layout_fingerprint_is_order_sensitive_on_shape() {
        let entries_a = vec![StateLayoutEntry {
            cell_id: crate::ident::StateCellId(0),
            storage: crate::value::StorageClass::F64,
            element_count: 1,
            identity: [0; 32],
        }];
        let entries_b = vec![StateLayoutEntry {
            cell_id: crate::ident::StateCellId(0),
            storage: crate::value::StorageClass::F64,
            element_count: 2,
            identity: [0; 32],
        }];
        assert_ne!(state_layout_fingerprint(&entries_a), state_layout_fingerprint(&entries_b));
    }
}
