// SPDX-License-Identifier: Apache-2.0
//! Dense typed-array storage for every scheduled `ValueSlot`, with a
//! debug-mode single-writer-per-frame invariant (§3 `RuntimeState.values`,
//! §4.8, §8 S6).
//!
//! The single-writer check uses a generation-stamped set directly grounded
//! on the teacher's `scheduler::GenSet`: a `gen: u32` counter plus an
//! `FxHashMap<K, u32>`, `mark`/`contains` in O(1), reset between frames by
//! bumping the generation instead of clearing the map.
use rustc_hash::FxHashMap;

use crate::error::LumenError;
use crate::ident::ValueSlot;
use crate::value::Value;

/// Generation-stamped membership set, grounded on `warp-core::scheduler::GenSet`.
#[derive(Debug, Default)]
struct GenSet {
    gen: u32,
    seen: FxHashMap<ValueSlot, u32>,
}

impl GenSet {
    fn new() -> Self {
        Self {
            gen: 1,
            seen: FxHashMap::default(),
        }
    }

    #[inline]
    fn contains(&self, key: ValueSlot) -> bool {
        matches!(self.seen.get(&key), Some(&g) if g == self.gen)
    }

    #[inline]
    fn mark(&mut self, key: ValueSlot) {
        self.seen.insert(key, self.gen);
    }

    #[inline]
    fn reset(&mut self) {
        self.gen = self.gen.wrapping_add(1);
        if self.gen == 0 {
            // Wrapped back to the sentinel; clear so stale entries at gen 0
            // can never be mistaken for the current generation.
            self.seen.clear();
            self.gen = 1;
        }
    }
}

/// Which schedule step (by index) wrote a slot this frame, recorded only in
/// debug mode so a `MultipleWriters` violation can name both writers.
#[derive(Debug, Default)]
struct WriterLog {
    writers: FxHashMap<ValueSlot, usize>,
}

/// Dense, typed-array-backed storage for every `ValueSlot` in a compiled
/// program (§3 `ValueStore`).
///
/// Writes are tracked per frame; in debug builds, writing an already-written
/// slot within the same frame returns [`LumenError::MultipleWriters`] instead
/// of silently overwriting, matching the teacher's `footprint_guard`
/// fail-fast posture for programmer-error conditions. Release builds keep
/// the first write and leave recording the runtime diagnostic to the caller
/// (§7, §8 S6).
#[derive(Debug)]
pub struct ValueStore {
    slots: Vec<Value>,
    written: GenSet,
    #[cfg(debug_assertions)]
    writer_log: WriterLog,
}

impl ValueStore {
    /// Builds a store sized to `slot_count` slots, all initialized to
    /// `Value::F64(0.0)` until overwritten.
    #[must_use]
    pub fn new(slot_count: usize) -> Self {
        Self {
            slots: vec![Value::F64(0.0); slot_count],
            written: GenSet::new(),
            #[cfg(debug_assertions)]
            writer_log: WriterLog::default(),
        }
    }

    /// Number of slots this store addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if this store addresses no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Reads a slot's current value.
    ///
    /// # Errors
    /// Returns [`LumenError::UninitializedSlot`] if `slot` is out of range.
    pub fn read(&self, slot: ValueSlot) -> Result<&Value, LumenError> {
        self.slots
            .get(slot.index())
            .ok_or(LumenError::UninitializedSlot(slot))
    }

    /// Writes a slot's value for the current frame, identifying the writing
    /// step by index for diagnostic purposes.
    ///
    /// # Errors
    /// In debug builds, returns [`LumenError::MultipleWriters`] if `slot` was
    /// already written earlier this frame (invariant 2, §4.8, §8 S6).
    /// Release builds never return this error; the first write wins.
    pub fn write(&mut self, slot: ValueSlot, step_index: usize, value: Value) -> Result<(), LumenError> {
        #[cfg(debug_assertions)]
        {
            if self.written.contains(slot) {
                let first_writer = *self.writer_log.writers.get(&slot).unwrap_or(&usize::MAX);
                return Err(LumenError::MultipleWriters {
                    slot,
                    first_writer,
                    second_writer: step_index,
                });
            }
            self.writer_log.writers.insert(slot, step_index);
        }
        self.written.mark(slot);
        if let Some(existing) = self.slots.get_mut(slot.index()) {
            *existing = value;
        }
        Ok(())
    }

    /// Writes a slot unconditionally, bypassing the single-writer check.
    /// Used only for `initialSlotValues` at program load, before any frame
    /// has started.
    pub fn write_initial(&mut self, slot: ValueSlot, value: Value) {
        if let Some(existing) = self.slots.get_mut(slot.index()) {
            *existing = value;
        }
    }

    /// Clears per-frame writer bookkeeping, called once per frame after the
    /// final `renderAssemble` step (§4.8 step 4). Slot contents themselves
    /// are left untouched; only the single-writer tracking resets.
    pub fn begin_frame(&mut self) {
        self.written.reset();
        #[cfg(debug_assertions)]
        self.writer_log.writers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut store = ValueStore::new(4);
        store.write(ValueSlot(1), 0, Value::F64(3.5)).unwrap();
        assert_eq!(store.read(ValueSlot(1)).unwrap().as_f64(), Some(3.5));
    }

    #[test]
    fn second_write_in_same_frame_is_rejected_in_debug() {
        let mut store = ValueStore::new(2);
        store.write(ValueSlot(0), 1, Value::F64(1.0)).unwrap();
        let result = store.write(ValueSlot(0), 2, Value::F64(2.0));
        if cfg!(debug_assertions) {
            assert!(matches!(result, Err(LumenError::MultipleWriters { first_writer: 1, second_writer: 2, .. })));
        } else {
            assert!(result.is_ok());
        }
    }

    #[test]
    fn begin_frame_allows_rewriting_same_slot_next_frame() {
        let mut store = ValueStore::new(2);
        store.write(ValueSlot(0), 0, Value::F64(1.0)).unwrap();
        store.begin_frame();
        let result = store.write(ValueSlot(0), 0, Value::F64(2.0));
        assert!(result.is_ok());
        assert_eq!(store.read(ValueSlot(0)).unwrap().as_f64(), Some(2.0));
    }

    #[test]
    fn read_out_of_range_slot_is_an_error() {
        let store = ValueStore::new(1);
        assert!(store.read(ValueSlot(5)).is_err());
    }
}
