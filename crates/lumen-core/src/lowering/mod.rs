// SPDX-License-Identifier: Apache-2.0
//! Lowering pipeline: turns an authored [`Patch`] into a [`CompiledProgram`]
//! through the 8 passes described in the module docs of each sub-pass (§4).
//!
//! Passes 1 (dense indexing) and 6-7 (block/bus lowering) are not run as
//! strictly separate stages: dense indices are assigned by
//! [`blocks::BlockLoweringState::new`] and [`buses::BusLoweringState::new`]
//! up front, then blocks and buses are lowered together, node by node, in
//! the single order [`graph::build_order`] produces.
pub mod blocks;
pub mod buses;
pub mod graph;
pub mod time;
pub mod typecheck;

use std::collections::BTreeMap;

use crate::builder::IrBuilder;
use crate::diagnostics::{CompileResult, Diagnostic, DiagnosticCode, DiagnosticSink};
use crate::fingerprint::{patch_fingerprint, state_layout_fingerprint};
use crate::ident::ValueSlot;
use crate::ir::program::CompiledProgram;
use crate::patch::Patch;
use crate::registry::Registry;

use self::blocks::BlockLoweringState;
use self::buses::BusLoweringState;
use self::graph::Node;

/// Compiles a patch into a [`CompileResult`].
///
/// Runs wire type checking, time topology resolution, and unified block/bus
/// dependency ordering, then lowers every node in that order, and finally
/// assembles the [`CompiledProgram`] (pass 8): computes slot types, checks
/// for duplicate writers, and stamps both fingerprints. `program` is absent
/// whenever any error-severity diagnostic fired, even if assembly otherwise
/// succeeded, per [`crate::diagnostics::CompileResult::is_success`].
#[must_use]
pub fn compile(registry: &Registry, patch: &Patch) -> CompileResult {
    let mut diags = DiagnosticSink::new();

    typecheck::check_wires(registry, patch, &mut diags);

    let mut builder = IrBuilder::new();
    let topology = time::resolve(registry, patch, &mut builder, &mut diags);

    let order = graph::build_order(patch, &registry.transforms, &mut diags);

    let mut block_state = BlockLoweringState::new(patch);
    let bus_state = BusLoweringState::new(patch);
    let mut bus_roots: BTreeMap<String, ValueSlot> = BTreeMap::new();

    for node in &order {
        match node {
            Node::Block(id) => {
                blocks::lower_block(registry, patch, &mut builder, &mut diags, &mut block_state, &bus_roots, id);
            }
            Node::Bus(name) => {
                buses::lower_bus(patch, &mut builder, &mut diags, &block_state, &bus_state, &mut bus_roots, name);
            }
        }
    }

    check_single_writer(&builder, &mut diags);

    if diags.has_errors() {
        return CompileResult {
            program: None,
            diagnostics: diags.into_vec(),
        };
    }

    let types = builder.slot_meta.iter().map(|meta| meta.ty).collect();
    let state_layout_fp = state_layout_fingerprint(&builder.state_layout);
    let patch_fp = patch_fingerprint(patch);

    let program = CompiledProgram {
        time_model: topology.model,
        types,
        signal_exprs: builder.signal_exprs,
        field_exprs: builder.field_exprs,
        constants: builder.constants,
        state_layout: builder.state_layout,
        default_sources: builder.default_sources,
        slot_meta: builder.slot_meta,
        sinks: builder.sinks,
        schedule: builder.schedule,
        initial_slot_values: builder.initial_slot_values,
        bus_roots: builder.bus_roots,
        bus_combines: builder.bus_combines,
        field_bus_combines: builder.field_bus_combines,
        transform_chains: builder.transform_chains,
        transform_state_cells: builder.transform_state_cells,
        state_layout_fingerprint: state_layout_fp,
        fingerprint: patch_fp,
        debug_index: builder.debug_index,
    };

    CompileResult {
        program: Some(program),
        diagnostics: diags.into_vec(),
    }
}

/// Link resolution's static single-writer check (§4.9 invariant): no two
/// schedule steps may write the same slot, since the executor's pooled
/// buffers assume each slot is written exactly once per frame.
fn check_single_writer(builder: &IrBuilder, diags: &mut DiagnosticSink) {
    let mut first_writer: BTreeMap<ValueSlot, usize> = BTreeMap::new();
    for (step_index, step) in builder.schedule.iter().enumerate() {
        let slot = step.primary_output_slot();
        if let Some(&first) = first_writer.get(&slot) {
            diags.push(
                Diagnostic::error(
                    DiagnosticCode::MultipleWriters,
                    format!("slot {slot} is written by schedule steps #{first} and #{step_index}"),
                )
                .at_slot(slot),
            );
        } else {
            first_writer.insert(slot, step_index);
        }
    }
}
