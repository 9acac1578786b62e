// SPDX-License-Identifier: Apache-2.0
//! Persistent per-operator state cells, surviving across frames and across
//! hot-swaps when the owning program's `stateLayout` fingerprint matches
//! (§3 `RuntimeState.state`, §4.9).
use crate::ident::StateCellId;

/// Backing storage for one persistent state cell, per §4.2's
/// `{scalar-f64, vec2-f64, vecN-f64, ring-buffer-f64}` storage classes.
#[derive(Debug, Clone, PartialEq)]
pub enum StateCell {
    /// A single persistent scalar (`integrate`, `delayMs`, `sampleHold`,
    /// `slewLimit`).
    ScalarF64(f64),
    /// A persistent 2-component vector.
    Vec2F64([f64; 2]),
    /// A persistent fixed-length vector.
    VecNF64(Vec<f64>),
    /// A fixed-capacity ring buffer of scalars, with a write cursor.
    RingBufferF64 {
        /// Backing storage, fixed length.
        buffer: Vec<f64>,
        /// Next write index, wrapping modulo `buffer.len()`.
        cursor: usize,
    },
}

impl StateCell {
    /// Returns the scalar value if this cell is a `ScalarF64`.
    #[must_use]
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::ScalarF64(v) => Some(*v),
            _ => None,
        }
    }
}

/// Holds every state cell addressed by a program's `stateLayout`.
///
/// Cells are indexed densely by [`StateCellId`]; `reserve_*` methods append a
/// new cell and return its id, used both by lowering (to size the layout)
/// and directly by tests exercising opcodes outside a full compiled program.
#[derive(Debug, Clone, Default)]
pub struct StateBuffer {
    cells: Vec<StateCell>,
}

impl StateBuffer {
    /// Creates an empty state buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a state buffer pre-sized to hold `len` zero-initialized
    /// scalar cells, used when loading a freshly compiled program with no
    /// prior state to carry over.
    #[must_use]
    pub fn with_zeroed_scalars(len: usize) -> Self {
        Self {
            cells: vec![StateCell::ScalarF64(0.0); len],
        }
    }

    /// Reserves a new zero-initialized scalar cell, returning its id.
    pub fn reserve_scalar_cell(&mut self) -> StateCellId {
        let id = StateCellId(u32::try_from(self.cells.len()).unwrap_or(u32::MAX));
        self.cells.push(StateCell::ScalarF64(0.0));
        id
    }

    /// Reserves a new zero-initialized ring buffer cell of the given
    /// capacity, returning its id.
    pub fn reserve_ring_buffer_cell(&mut self, capacity: usize) -> StateCellId {
        let id = StateCellId(u32::try_from(self.cells.len()).unwrap_or(u32::MAX));
        self.cells.push(StateCell::RingBufferF64 {
            buffer: vec![0.0; capacity],
            cursor: 0,
        });
        id
    }

    /// Reads a cell's scalar value, if it exists and is a scalar cell.
    #[must_use]
    pub fn read_scalar(&self, id: StateCellId) -> Option<f64> {
        self.cells.get(id.index()).and_then(StateCell::as_scalar)
    }

    /// Writes a cell's scalar value in place.
    pub fn write_scalar(&mut self, id: StateCellId, value: f64) {
        if let Some(cell) = self.cells.get_mut(id.index()) {
            *cell = StateCell::ScalarF64(value);
        }
    }

    /// Pushes a value into a ring buffer cell, advancing its cursor.
    pub fn push_ring_buffer(&mut self, id: StateCellId, value: f64) {
        if let Some(StateCell::RingBufferF64 { buffer, cursor }) = self.cells.get_mut(id.index()) {
            if !buffer.is_empty() {
                buffer[*cursor] = value;
                *cursor = (*cursor + 1) % buffer.len();
            }
        }
    }

    /// Number of cells currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns true if no cells are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Carries cell contents forward from a previous buffer into a freshly
    /// sized one, by direct index, used on a soft hot-swap where the
    /// `stateLayout` fingerprint matched exactly (§4.9 step 2).
    #[must_use]
    pub fn carry_forward_verbatim(previous: Self, new_len: usize) -> Self {
        let mut cells = previous.cells;
        cells.resize(new_len, StateCell::ScalarF64(0.0));
        Self { cells }
    }

    /// Builds a new buffer of `new_len` zero-initialized cells, copying over
    /// cells whose old index maps to a new index via `mapping`, used on a
    /// hard hot-swap where cells are matched pairwise by stable identity
    /// (§4.9 step 3).
    #[must_use]
    pub fn remap(previous: &Self, new_len: usize, mapping: &[(StateCellId, StateCellId)]) -> Self {
        let mut cells = vec![StateCell::ScalarF64(0.0); new_len];
        for (old_id, new_id) in mapping {
            if let Some(cell) = previous.cells.get(old_id.index()) {
                if let Some(slot) = cells.get_mut(new_id.index()) {
                    *slot = cell.clone();
                }
            }
        }
        Self { cells }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_and_write_scalar_cell_round_trips() {
        let mut buffer = StateBuffer::new();
        let id = buffer.reserve_scalar_cell();
        assert_eq!(buffer.read_scalar(id), Some(0.0));
        buffer.write_scalar(id, 7.5);
        assert_eq!(buffer.read_scalar(id), Some(7.5));
    }

    #[test]
    fn carry_forward_verbatim_preserves_existing_contents() {
        let mut buffer = StateBuffer::new();
        let id = buffer.reserve_scalar_cell();
        buffer.write_scalar(id, 3.0);
        let carried = StateBuffer::carry_forward_verbatim(buffer, 2);
        assert_eq!(carried.read_scalar(id), Some(3.0));
        assert_eq!(carried.len(), 2);
    }

    #[test]
    fn remap_drops_unmapped_cells_and_zero_inits_new_ones() {
        let mut previous = StateBuffer::new();
        let old_id = previous.reserve_scalar_cell();
        previous.write_scalar(old_id, 9.0);
        let new_id = StateCellId(0);
        let remapped = StateBuffer::remap(&previous, 1, &[(old_id, new_id)]);
        assert_eq!(remapped.read_scalar(new_id), Some(9.0));
    }
}
