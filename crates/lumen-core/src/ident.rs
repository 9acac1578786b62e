// SPDX-License-Identifier: Apache-2.0
//! Identifier types: authored ids, dense runtime indices, and the debug index
//! that maps between them.
//!
//! Every entity that appears at runtime is addressed by a small integer index
//! allocated during lowering (`BlockIndex`, `PortIndex`, `BusIndex`, `ValueSlot`,
//! `SigExprId`, `FieldExprId`, `ConstId`, `StateCellId`, `TransformChainId`,
//! `SinkId`). Indices are stable within one compile but are never stable across
//! recompiles; any identity a host needs to preserve across edits must be
//! resolved through the [`DebugIndex`].
use std::collections::BTreeMap;
use std::fmt;

use blake3::Hasher;

/// Canonical 256-bit content hash used for fingerprinting patches, state
/// layouts, and stable-identity derivation.
pub type Hash = [u8; 32];

macro_rules! dense_index {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[repr(transparent)]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name(pub u32);

        impl $name {
            /// Returns the raw dense index value.
            #[must_use]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

dense_index!(BlockIndex, "Dense index of a block within a compiled program.");
dense_index!(PortIndex, "Dense index of a port within its owning block.");
dense_index!(BusIndex, "Dense index of a bus within a compiled program.");
dense_index!(ValueSlot, "Dense index of a scheduled value slot.");
dense_index!(SigExprId, "Dense index of a `SignalExprIR` node.");
dense_index!(FieldExprId, "Dense index of a `FieldExprIR` node.");
dense_index!(ConstId, "Dense index into the typed constant pool.");
dense_index!(StateCellId, "Dense index of a persistent operator state cell.");
dense_index!(
    TransformChainId,
    "Dense index of a compiled wire transform chain."
);
dense_index!(SinkId, "Dense index of a render sink.");

/// Authored, user-facing identifier for a block instance in a patch.
///
/// Unlike [`BlockIndex`], `BlockId` is stable across edits and recompiles; it
/// is how wires, default sources, and bus declarations reference blocks in
/// the authoring document.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockId(pub String);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Local slot identifier for a declared input or output port on a block.
///
/// Ports are ordered as declared by the block's registry descriptor;
/// `PortSlot` is that declaration order, not a dense runtime index.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortSlot(pub u16);

/// Stable reference to an authored port: the owning block plus its slot.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortRef {
    /// Owning block.
    pub block: BlockId,
    /// Declared port slot on that block.
    pub slot: PortSlot,
}

/// Computes a domain-separated BLAKE3 digest over `prefix || bytes`.
fn domain_hash(prefix: &[u8], bytes: &[u8]) -> Hash {
    let mut hasher = Hasher::new();
    hasher.update(prefix);
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Stable hash of a [`BlockId`] used for the `(sortKey, stableHash)` tie-break
/// (invariant 3) when ordering blocks deterministically.
#[must_use]
pub fn block_stable_hash(id: &BlockId) -> Hash {
    domain_hash(b"lumen:block:v1\0", id.0.as_bytes())
}

/// Stable hash of a bus publisher used for the publisher ordering tie-break
/// (invariant 4): `(sortKey ascending, publisher stable-hash lexicographic)`.
#[must_use]
pub fn publisher_stable_hash(block: &BlockId, slot: PortSlot) -> Hash {
    let mut bytes = Vec::with_capacity(block.0.len() + 2);
    bytes.extend_from_slice(block.0.as_bytes());
    bytes.extend_from_slice(&slot.0.to_le_bytes());
    domain_hash(b"lumen:publisher:v1\0", &bytes)
}

/// Derives the stable [`StateCellId`]-backing identity for a stateful
/// transform step hosted in a destination block's state namespace.
///
/// Identity is `(blockIndex, inputPortIndex, stepIndex)`, domain-separated so
/// that two lowerings of a structurally identical wire derive the same cell
/// identity without a side table, giving hot-swap continuity (§4.9) "for
/// free" for transform-owned state.
#[must_use]
pub fn transform_state_identity(block: BlockIndex, input_port: PortIndex, step_index: u32) -> Hash {
    let mut bytes = Vec::with_capacity(12);
    bytes.extend_from_slice(&block.0.to_le_bytes());
    bytes.extend_from_slice(&input_port.0.to_le_bytes());
    bytes.extend_from_slice(&step_index.to_le_bytes());
    domain_hash(b"lumen:transform_state:v1\0", &bytes)
}

/// Derives the stable identity for an operator's state cell: `operator type x
/// stable hash of upstream path`. Used by hot-swap (§4.9 step 3) to match
/// state cells pairwise across recompiles when the state-layout fingerprint
/// has changed.
#[must_use]
pub fn operator_state_identity(operator_type: &str, upstream_path: &str) -> Hash {
    let mut bytes = Vec::with_capacity(operator_type.len() + upstream_path.len() + 1);
    bytes.extend_from_slice(operator_type.as_bytes());
    bytes.push(0);
    bytes.extend_from_slice(upstream_path.as_bytes());
    domain_hash(b"lumen:state_identity:v1\0", &bytes)
}

/// Bidirectional string-to-dense-index table retained only as a debugging and
/// provenance aid.
///
/// Indices allocated during lowering are not stable across recompiles; any
/// identity a UI needs to preserve across edits must be resolved through this
/// table rather than by caching raw indices.
#[derive(Debug, Clone, Default)]
pub struct DebugIndex {
    block_names: BTreeMap<BlockIndex, String>,
    port_names: BTreeMap<(BlockIndex, PortIndex), String>,
    bus_names: BTreeMap<BusIndex, String>,
    slot_names: BTreeMap<ValueSlot, String>,
}

impl DebugIndex {
    /// Creates an empty debug index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the authored label for a block index.
    pub fn record_block(&mut self, index: BlockIndex, label: impl Into<String>) {
        self.block_names.insert(index, label.into());
    }

    /// Records the authored label for a port index on a block.
    pub fn record_port(&mut self, block: BlockIndex, port: PortIndex, label: impl Into<String>) {
        self.port_names.insert((block, port), label.into());
    }

    /// Records the authored label for a bus index.
    pub fn record_bus(&mut self, index: BusIndex, label: impl Into<String>) {
        self.bus_names.insert(index, label.into());
    }

    /// Records a debug label for a value slot.
    pub fn record_slot(&mut self, slot: ValueSlot, label: impl Into<String>) {
        self.slot_names.insert(slot, label.into());
    }

    /// Returns the recorded block label, if any.
    #[must_use]
    pub fn block_label(&self, index: BlockIndex) -> Option<&str> {
        self.block_names.get(&index).map(String::as_str)
    }

    /// Returns the recorded bus label, if any.
    #[must_use]
    pub fn bus_label(&self, index: BusIndex) -> Option<&str> {
        self.bus_names.get(&index).map(String::as_str)
    }

    /// Returns the recorded value slot label, if any.
    #[must_use]
    pub fn slot_label(&self, slot: ValueSlot) -> Option<&str> {
        self.slot_names.get(&slot).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_separation_prevents_cross_kind_collisions() {
        let a = domain_hash(b"lumen:block:v1\0", b"x");
        let b = domain_hash(b"lumen:publisher:v1\0", b"x");
        assert_ne!(a, b);
    }

    #[test]
    fn transform_state_identity_is_stable_across_calls() {
        let a = transform_state_identity(BlockIndex(3), PortIndex(1), 0);
        let b = transform_state_identity(BlockIndex(3), PortIndex(1), 0);
        assert_eq!(a, b);
        let c = transform_state_identity(BlockIndex(3), PortIndex(1), 1);
        assert_ne!(a, c);
    }

    #[test]
    fn debug_index_round_trips_labels() {
        let mut idx = DebugIndex::new();
        idx.record_block(BlockIndex(0), "osc1");
        assert_eq!(idx.block_label(BlockIndex(0)), Some("osc1"));
        assert_eq!(idx.block_label(BlockIndex(1)), None);
    }
}
