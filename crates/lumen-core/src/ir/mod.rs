// SPDX-License-Identifier: Apache-2.0
//! The compiled intermediate representation: the typed, dense, read-only
//! program produced by lowering and consumed by the executor (§3
//! `CompiledProgram`).
pub mod field;
pub mod program;
pub mod render;
pub mod schedule;
pub mod signal;

pub use program::CompiledProgram;
pub use render::{RenderFrame, RenderSinkIR};
pub use schedule::StepIR;
