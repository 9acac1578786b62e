// SPDX-License-Identifier: Apache-2.0
//! The authoring document: a `Patch` is a mapping of blocks plus wires, bus
//! declarations, and per-port default sources (§3).
//!
//! `Patch` is the only input the lowering pipeline accepts. It carries no
//! layout, selection, or view state — that belongs to the editor, out of
//! scope here (§1).
use std::collections::BTreeMap;

use crate::ident::{BlockId, PortSlot};
use crate::transform::TransformStepSpec;
use crate::value::Value;

/// A typed constant or bus reference used as a port's default source (§4.5).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DefaultSourceSpec {
    /// A literal constant value, lowered into the constant pool.
    Constant(Value),
    /// A reference to a published bus by name.
    Bus(String),
}

/// One authored input or output port on a block.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortDecl {
    /// Declaration-order slot.
    pub slot: PortSlot,
    /// Authored name, used only for debug-index labeling.
    pub name: String,
}

/// An authored block instance: a type id, parameter values, and declared
/// ports. Port shape and lowering behavior come from the block registry
/// entry matching `block_type`; the patch only records instance data.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Block {
    /// Registry id naming this block's type (e.g. `"TimeRoot.finite"`).
    pub block_type: String,
    /// Authored parameter values, by parameter name.
    pub params: BTreeMap<String, Value>,
    /// Declared input ports, in registry order.
    pub inputs: Vec<PortDecl>,
    /// Declared output ports, in registry order.
    pub outputs: Vec<PortDecl>,
}

/// An authored edge: a source port feeding a target port, with an optional
/// transform chain applied in-flight (§4.4).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Wire {
    /// Source block.
    pub from_block: BlockId,
    /// Source output slot.
    pub from_slot: PortSlot,
    /// Target block.
    pub to_block: BlockId,
    /// Target input slot.
    pub to_slot: PortSlot,
    /// Ordered transform steps applied to values flowing along this wire.
    pub transforms: Vec<TransformStepSpec>,
}

/// Declares one bus: its combine mode and whether it is one of the reserved,
/// contractually-locked buses (§4.7).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusDecl {
    /// Authored bus name (e.g. `"time"`, or a user-defined name).
    pub name: String,
    /// Combine mode for this bus's publisher set.
    pub combine: crate::bus::CombineMode,
}

/// An authored publish edge: a block output feeding a named bus.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusPublish {
    /// Target bus name.
    pub bus: String,
    /// Publishing block.
    pub block: BlockId,
    /// Publishing output slot.
    pub slot: PortSlot,
    /// Authoring-order sort key; the primary bus publisher ordering key (§4.7).
    pub sort_key: (u32, u32, u32),
}

/// An authored listen edge: an input port reading a named bus instead of a
/// direct wire.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusListen {
    /// Source bus name.
    pub bus: String,
    /// Listening block.
    pub block: BlockId,
    /// Listening input slot.
    pub slot: PortSlot,
}

/// The full authoring document consumed by the lowering pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Patch {
    /// All block instances, keyed by their authored id.
    pub blocks: BTreeMap<BlockId, Block>,
    /// All authored wires.
    pub wires: Vec<Wire>,
    /// All declared buses, including any reserved-bus overrides (rejected
    /// unless they match the locked reserved shape — enforced during
    /// lowering, not here).
    pub buses: Vec<BusDecl>,
    /// All bus publish edges.
    pub bus_publishes: Vec<BusPublish>,
    /// All bus listen edges.
    pub bus_listens: Vec<BusListen>,
    /// Default source for every input port that may lack a wire.
    pub default_sources: BTreeMap<(BlockId, PortSlot), DefaultSourceSpec>,
    /// Seed for all compile-time stochastic element variation (invariant 5).
    pub seed: u64,
}

impl Patch {
    /// Creates an empty patch with the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Inserts a block, returning the previous block at that id, if any.
    pub fn insert_block(&mut self, id: BlockId, block: Block) -> Option<Block> {
        self.blocks.insert(id, block)
    }

    /// Adds a wire.
    pub fn add_wire(&mut self, wire: Wire) {
        self.wires.push(wire);
    }

    /// Adds a bus declaration.
    pub fn add_bus(&mut self, bus: BusDecl) {
        self.buses.push(bus);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_patch_has_no_blocks_or_wires() {
        let patch = Patch::new(42);
        assert!(patch.blocks.is_empty());
        assert!(patch.wires.is_empty());
        assert_eq!(patch.seed, 42);
    }

    #[test]
    fn insert_block_replaces_existing_entry() {
        let mut patch = Patch::new(0);
        let block = Block {
            block_type: "Osc.sine".to_string(),
            params: BTreeMap::new(),
            inputs: vec![],
            outputs: vec![PortDecl {
                slot: PortSlot(0),
                name: "out".to_string(),
            }],
        };
        let prev = patch.insert_block(BlockId("osc1".to_string()), block.clone());
        assert!(prev.is_none());
        let prev2 = patch.insert_block(BlockId("osc1".to_string()), block);
        assert!(prev2.is_some());
    }
}
