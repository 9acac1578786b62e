// SPDX-License-Identifier: Apache-2.0
//! Dependency graph construction, topological ordering, and cycle detection
//! (§4.3 passes 4-5).
//!
//! Blocks and buses share one ordering problem: a bus's combined value can
//! only be computed once every publishing block has been lowered, and a
//! block that listens to a bus can only be lowered once that bus's combine
//! node exists. Rather than running block lowering and bus lowering as two
//! strictly sequential passes, both participate as nodes in a single graph,
//! so one topological sort produces a schedule that interleaves them
//! correctly.
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink};
use crate::ident::BlockId;
use crate::patch::Patch;
use crate::registry::transform::TransformRegistry;
use crate::transform::chain_has_stateful_step;

/// One node in the unified block/bus dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Node {
    /// A block instance, by its authored id.
    Block(BlockId),
    /// A declared bus, by its authored name.
    Bus(String),
}

/// Builds the dependency graph's adjacency (`from -> to`) and in-degree
/// tables, returns a deterministic topological order, and records a
/// [`crate::diagnostics::DiagnosticCode::CycleThroughNonStateful`]
/// diagnostic for any remaining unordered nodes.
///
/// Direct wires contribute a `fromBlock -> toBlock` edge; bus traffic
/// contributes `publisherBlock -> Bus(name)` and `Bus(name) -> listenerBlock`
/// edges. An edge carries a compiled transform chain with at least one
/// stateful step is exempt from the "stateless cycle" check (invariant: a
/// cycle is only legal if mediated by persistent state), since a stateful
/// step breaks the same-frame data dependency by reading the *previous*
/// frame's value.
pub fn build_order(patch: &Patch, transforms: &TransformRegistry, diags: &mut DiagnosticSink) -> Vec<Node> {
    let mut nodes: BTreeSet<Node> = BTreeSet::new();
    for id in patch.blocks.keys() {
        nodes.insert(Node::Block(id.clone()));
    }
    for bus in &patch.buses {
        nodes.insert(Node::Bus(bus.name.clone()));
    }

    let mut edges: BTreeMap<Node, BTreeSet<Node>> = BTreeMap::new();
    let mut stateful_edge: BTreeSet<(Node, Node)> = BTreeSet::new();
    let mut add_edge = |edges: &mut BTreeMap<Node, BTreeSet<Node>>, from: Node, to: Node| {
        edges.entry(from).or_default().insert(to);
    };

    for wire in &patch.wires {
        let from = Node::Block(wire.from_block.clone());
        let to = Node::Block(wire.to_block.clone());
        if chain_has_stateful_step(transforms, &wire.transforms) {
            stateful_edge.insert((from.clone(), to.clone()));
        }
        add_edge(&mut edges, from, to);
    }
    for publish in &patch.bus_publishes {
        add_edge(
            &mut edges,
            Node::Block(publish.block.clone()),
            Node::Bus(publish.bus.clone()),
        );
    }
    for listen in &patch.bus_listens {
        add_edge(
            &mut edges,
            Node::Bus(listen.bus.clone()),
            Node::Block(listen.block.clone()),
        );
    }

    let mut in_degree: BTreeMap<Node, usize> = nodes.iter().map(|n| (n.clone(), 0)).collect();
    for targets in edges.values() {
        for target in targets {
            *in_degree.entry(target.clone()).or_insert(0) += 1;
        }
    }

    let mut ready: VecDeque<Node> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(n, _)| n.clone())
        .collect::<Vec<_>>()
        .into_iter()
        .collect();
    // Deterministic: process the ready set in sorted order every round.
    let mut order = Vec::with_capacity(nodes.len());
    let mut remaining = in_degree.clone();

    loop {
        let mut batch: Vec<Node> = ready.drain(..).collect();
        batch.sort();
        if batch.is_empty() {
            break;
        }
        for node in batch {
            order.push(node.clone());
            remaining.remove(&node);
            if let Some(targets) = edges.get(&node) {
                let mut next_targets: Vec<Node> = targets.iter().cloned().collect();
                next_targets.sort();
                for target in next_targets {
                    if let Some(deg) = remaining.get_mut(&target) {
                        *deg -= 1;
                        if *deg == 0 {
                            ready.push_back(target);
                        }
                    }
                }
            }
        }
    }

    if !remaining.is_empty() {
        let mut cyclic: Vec<Node> = remaining.keys().cloned().collect();
        cyclic.sort();
        let all_mediated = cyclic.iter().all(|n| {
            edges
                .iter()
                .filter(|(_, targets)| targets.contains(n))
                .all(|(from, _)| stateful_edge.contains(&(from.clone(), n.clone())))
        });
        if !all_mediated {
            let names: Vec<String> = cyclic
                .iter()
                .map(|n| match n {
                    Node::Block(id) => id.0.clone(),
                    Node::Bus(name) => format!("bus:{name}"),
                })
                .collect();
            diags.push(Diagnostic::error(
                DiagnosticCode::CycleThroughNonStateful,
                format!("graph cycle with no stateful mediation: {}", names.join(" -> ")),
            ));
        }
        // Append the cyclic remainder in deterministic order so lowering can
        // still proceed best-effort and report further diagnostics.
        order.extend(cyclic);
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::PortSlot;
    use crate::patch::{Block, BusDecl, BusListen, BusPublish, Wire};
    use std::collections::BTreeMap;

    fn block(block_type: &str) -> Block {
        Block {
            block_type: block_type.to_string(),
            params: BTreeMap::new(),
            inputs: vec![],
            outputs: vec![],
        }
    }

    #[test]
    fn acyclic_wires_sort_upstream_before_downstream() {
        let mut patch = Patch::new(0);
        patch.insert_block(BlockId("a".to_string()), block("x"));
        patch.insert_block(BlockId("b".to_string()), block("x"));
        patch.add_wire(Wire {
            from_block: BlockId("a".to_string()),
            from_slot: PortSlot(0),
            to_block: BlockId("b".to_string()),
            to_slot: PortSlot(0),
            transforms: vec![],
        });
        let transforms = TransformRegistry::with_builtins();
        let mut diags = DiagnosticSink::new();
        let order = build_order(&patch, &transforms, &mut diags);
        let pos_a = order.iter().position(|n| *n == Node::Block(BlockId("a".to_string()))).unwrap();
        let pos_b = order.iter().position(|n| *n == Node::Block(BlockId("b".to_string()))).unwrap();
        assert!(pos_a < pos_b);
        assert!(!diags.has_errors());
    }

    #[test]
    fn stateless_cycle_is_rejected() {
        let mut patch = Patch::new(0);
        patch.insert_block(BlockId("a".to_string()), block("x"));
        patch.insert_block(BlockId("b".to_string()), block("x"));
        patch.add_wire(Wire {
            from_block: BlockId("a".to_string()),
            from_slot: PortSlot(0),
            to_block: BlockId("b".to_string()),
            to_slot: PortSlot(0),
            transforms: vec![],
        });
        patch.add_wire(Wire {
            from_block: BlockId("b".to_string()),
            from_slot: PortSlot(0),
            to_block: BlockId("a".to_string()),
            to_slot: PortSlot(0),
            transforms: vec![],
        });
        let transforms = TransformRegistry::with_builtins();
        let mut diags = DiagnosticSink::new();
        let _ = build_order(&patch, &transforms, &mut diags);
        assert!(diags.has_errors());
    }

    #[test]
    fn bus_edges_order_publisher_before_listener() {
        let mut patch = Patch::new(0);
        patch.insert_block(BlockId("pub".to_string()), block("x"));
        patch.insert_block(BlockId("sub".to_string()), block("x"));
        patch.add_bus(BusDecl {
            name: "myBus".to_string(),
            combine: crate::bus::CombineMode::Last,
        });
        patch.bus_publishes.push(BusPublish {
            bus: "myBus".to_string(),
            block: BlockId("pub".to_string()),
            slot: PortSlot(0),
            sort_key: (0, 0, 0),
        });
        patch.bus_listens.push(BusListen {
            bus: "myBus".to_string(),
            block: BlockId("sub".to_string()),
            slot: PortSlot(0),
        });
        let transforms = TransformRegistry::with_builtins();
        let mut diags = DiagnosticSink::new();
        let order = build_order(&patch, &transforms, &mut diags);
        let pos_pub = order.iter().position(|n| *n == Node::Block(BlockId("pub".to_string()))).unwrap();
        let pos_bus = order.iter().position(|n| *n == Node::Bus("myBus".to_string())).unwrap();
        let pos_sub = order.iter().position(|n| *n == Node::Block(BlockId("sub".to_string()))).unwrap();
        assert!(pos_pub < pos_bus);
        assert!(pos_bus < pos_sub);
        assert!(!diags.has_errors());
    }
}
