// SPDX-License-Identifier: Apache-2.0
//! Fingerprint-keyed compile cache and hot-swap bridging (§4.9).
//!
//! Grounded on the teacher's `echo-graph` recompile-on-commit flow: a commit
//! either matches the cached fingerprint and is a no-op, or triggers a fresh
//! lowering pass whose result replaces the cached program. The state-bridge
//! decision (soft vs. hard swap) is this module's own addition, expressed in
//! terms of [`crate::runtime::state_buffer::StateBuffer`]'s two constructors.
use std::collections::BTreeMap;
use std::time::Instant;

use crate::diagnostics::{CompileResult, CompileStatus, SwapMode};
use crate::ident::{Hash, StateCellId};
use crate::ir::program::CompiledProgram;
use crate::patch::Patch;
use crate::registry::Registry;
use crate::runtime::state_buffer::StateBuffer;
use crate::{lowering, telemetry};

/// Disposition reported alongside a [`CompileCache::commit`] that produced a
/// usable program, describing how a host should bridge its `StateBuffer`
/// across the swap (§4.9 steps 2-3).
#[derive(Debug, Clone)]
pub struct HotSwapOutcome {
    /// Whether state was carried forward verbatim or remapped pairwise.
    pub swap_mode: SwapMode,
    /// Pairwise `(oldCellId, newCellId)` mapping for cells whose stable
    /// identity survived the swap. Empty under [`SwapMode::Soft`], where
    /// every old index maps to itself.
    pub mapping: Vec<(StateCellId, StateCellId)>,
}

impl HotSwapOutcome {
    /// Applies this outcome to a previous frame's `StateBuffer`, producing
    /// one sized and populated for the new program's `stateLayout`.
    #[must_use]
    pub fn apply(&self, previous: StateBuffer, new_len: usize) -> StateBuffer {
        match self.swap_mode {
            SwapMode::Soft => StateBuffer::carry_forward_verbatim(previous, new_len),
            SwapMode::Hard => StateBuffer::remap(&previous, new_len, &self.mapping),
        }
    }
}

fn cell_mapping(previous: &CompiledProgram, new_program: &CompiledProgram) -> Vec<(StateCellId, StateCellId)> {
    let mut by_identity: BTreeMap<Hash, StateCellId> =
        previous.state_layout.iter().map(|entry| (entry.identity, entry.cell_id)).collect();
    new_program
        .state_layout
        .iter()
        .filter_map(|entry| by_identity.remove(&entry.identity).map(|old_id| (old_id, entry.cell_id)))
        .collect()
}

/// Caches the most recently compiled program by patch fingerprint and
/// bridges `StateBuffer` contents across recompiles (§4.9).
#[derive(Debug)]
pub struct CompileCache {
    registry: Registry,
    current: Option<CompiledProgram>,
}

impl CompileCache {
    /// Builds an empty cache against the given block/opcode/transform registry.
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self { registry, current: None }
    }

    /// Returns the currently cached program, if any compile has succeeded.
    #[must_use]
    pub fn current(&self) -> Option<&CompiledProgram> {
        self.current.as_ref()
    }

    /// Commits a patch: skips recompilation if its fingerprint matches the
    /// cached program's, otherwise lowers it fresh and replaces the cache.
    ///
    /// Returns the [`CompileResult`] plus, when a new usable program
    /// replaced a previous one, a [`HotSwapOutcome`] describing how to
    /// bridge `StateBuffer` contents forward. `None` on the very first
    /// successful compile (there is nothing to bridge from) and on a failed
    /// compile (the cache keeps its previous program untouched).
    pub fn commit(&mut self, patch: &Patch) -> (CompileResult, Option<HotSwapOutcome>) {
        let fingerprint = crate::fingerprint::patch_fingerprint(patch);
        if let Some(cached) = &self.current {
            if cached.fingerprint == fingerprint {
                return (
                    CompileResult {
                        program: Some(cached.clone()),
                        diagnostics: Vec::new(),
                    },
                    None,
                );
            }
        }

        telemetry::compile_started(&fingerprint);
        let started = Instant::now();
        let result = lowering::compile(&self.registry, patch);
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        telemetry::compile_finished(
            if result.is_success() { CompileStatus::Success } else { CompileStatus::Failed },
            duration_ms,
        );

        let Some(new_program) = result.program.as_ref() else {
            return (result, None);
        };

        let outcome = self.current.as_ref().map(|previous| {
            let swap_mode = if previous.state_layout_fingerprint == new_program.state_layout_fingerprint {
                SwapMode::Soft
            } else {
                SwapMode::Hard
            };
            let mapping = if swap_mode == SwapMode::Hard {
                cell_mapping(previous, new_program)
            } else {
                Vec::new()
            };
            HotSwapOutcome { swap_mode, mapping }
        });
        if let Some(outcome) = &outcome {
            telemetry::program_swapped(outcome.swap_mode);
        }

        self.current = result.program.clone();
        (result, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::BlockId;
    use crate::patch::Block;
    use std::collections::BTreeMap as Map;

    fn time_root_patch(seed: u64) -> Patch {
        let mut patch = Patch::new(seed);
        patch.insert_block(
            BlockId("clock".to_string()),
            Block {
                block_type: "TimeRoot.infinite".to_string(),
                params: Map::new(),
                inputs: vec![],
                outputs: vec![],
            },
        );
        patch
    }

    #[test]
    fn identical_fingerprint_skips_recompile_and_reports_no_swap() {
        let mut cache = CompileCache::new(Registry::with_builtins());
        let patch = time_root_patch(0);
        let (first, swap) = cache.commit(&patch);
        assert!(first.is_success());
        assert!(swap.is_none());

        let (second, swap) = cache.commit(&patch);
        assert!(second.is_success());
        assert!(swap.is_none());
        assert!(second.diagnostics.is_empty());
    }

    #[test]
    fn changed_patch_reports_a_hot_swap_outcome() {
        let mut cache = CompileCache::new(Registry::with_builtins());
        let (first, swap) = cache.commit(&time_root_patch(0));
        assert!(first.is_success());
        assert!(swap.is_none());

        let (second, swap) = cache.commit(&time_root_patch(1));
        assert!(second.is_success());
        assert!(swap.is_some());
    }
}
