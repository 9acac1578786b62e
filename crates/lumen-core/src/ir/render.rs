// SPDX-License-Identifier: Apache-2.0
//! Render-frame wire format: the tree of passes produced by the executor
//! and consumed by an external rasterizer sink (§6).
use crate::ident::{SinkId, ValueSlot};

/// A clear operation applied before any passes render.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClearSpec {
    /// Clears to a flat linear RGBA color in `[0, 1]`.
    Solid {
        /// Linear RGBA color.
        color: [f64; 4],
    },
    /// Leaves the previous frame's contents (no clear).
    None,
}

/// One render pass. Instance and path passes reference buffer slots rather
/// than embedding buffer contents; the sink reads buffers from the
/// `ValueStore` view it is handed alongside the frame.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RenderPass {
    /// A batch of 2D instanced shapes.
    Instances2D {
        /// Slot holding the per-instance position buffer.
        positions: ValueSlot,
        /// Slot holding the per-instance color buffer.
        colors: ValueSlot,
        /// Slot holding the per-instance radius buffer.
        radii: ValueSlot,
    },
    /// A batch of 2D vector paths.
    Paths2D {
        /// Slot holding path geometry data.
        geometry: ValueSlot,
        /// Slot holding per-path color data.
        colors: ValueSlot,
    },
    /// A clip region wrapping a nested pass list.
    ClipGroup {
        /// Nested passes rendered within the clip region.
        child: Vec<RenderPass>,
    },
    /// A post-processing effect wrapping a nested pass list.
    PostFx {
        /// Registry id naming the effect.
        effect: String,
        /// Nested passes the effect is applied to.
        child: Vec<RenderPass>,
    },
}

/// The per-frame render-tree value produced by `renderAssemble` steps and
/// handed to the external sink (§6).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RenderFrame {
    /// Wire-format schema version.
    pub version: u32,
    /// Clear operation applied before any passes render.
    pub clear: ClearSpec,
    /// Ordered pass list.
    pub passes: Vec<RenderPass>,
}

impl RenderFrame {
    /// The empty frame returned on a first-compile failure with no previous
    /// program (§7): solid black clear, no passes.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            version: 1,
            clear: ClearSpec::Solid {
                color: [0.0, 0.0, 0.0, 1.0],
            },
            passes: Vec::new(),
        }
    }
}

/// One render sink declaration in the compiled program's schedule: the
/// input slots it reads and the sink-type discriminant it assembles into.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSinkIR {
    /// Dense sink id.
    pub id: SinkId,
    /// Sink type discriminant (e.g. `"instances2D"`, `"paths2D"`).
    pub kind: String,
    /// Input slots this sink reads when assembling its pass.
    pub inputs: Vec<ValueSlot>,
    /// Slot the assembled frame fragment is written to.
    pub out_frame_slot: ValueSlot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_frame_is_solid_black_with_no_passes() {
        let frame = RenderFrame::empty();
        assert!(frame.passes.is_empty());
        assert_eq!(frame.clear, ClearSpec::Solid { color: [0.0, 0.0, 0.0, 1.0] });
    }
}
