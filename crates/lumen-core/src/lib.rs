// SPDX-License-Identifier: Apache-2.0
//! lumen-core: deterministic compiler and scheduled runtime for the Lumen
//! visual-instrument engine.
//!
//! An authored [`patch::Patch`] is lowered by [`lowering::compile`] into a
//! typed, dense [`ir::CompiledProgram`], which a [`runtime::Executor`] drives
//! frame-by-frame under a single declared time authority
//! ([`ir::program::TimeModel`]). See `SPEC_FULL.md` at the workspace root for
//! the full contract this crate implements; this crate covers only the
//! lowering pipeline and the scheduled runtime core (§1) — the node-graph
//! editor, rasterizer backends, and block palette are external
//! collaborators.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::redundant_pub_crate,
    clippy::many_single_char_names,
    clippy::module_name_repetitions,
    clippy::use_self,
    clippy::doc_markdown,
    clippy::too_many_lines,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::similar_names
)]

pub mod builder;
pub mod bus;
pub mod cache;
pub mod diagnostics;
pub mod error;
pub mod fingerprint;
pub mod ident;
pub mod ir;
pub mod lowering;
pub mod patch;
pub mod registry;
pub mod runtime;
pub mod telemetry;
pub mod transform;
pub mod types;
pub mod value;

/// Fixture patches exercising the end-to-end scenarios named in the
/// system's testable-properties section (S1-S6), shared between this
/// crate's integration tests and `lumen-cli`.
pub mod fixtures;

pub use cache::{CompileCache, HotSwapOutcome};
pub use diagnostics::{CompileResult, CompileStatus, Diagnostic, DiagnosticCode, Event, Severity, SwapMode};
pub use error::LumenError;
pub use ir::CompiledProgram;
pub use lowering::compile;
pub use patch::Patch;
pub use registry::Registry;
pub use runtime::{Executor, Player};
