// SPDX-License-Identifier: Apache-2.0
//! Lumen CLI.
//!
//! Compiles one of the built-in fixture patches, prints its diagnostics, and
//! optionally runs it for a fixed number of frames against a null render
//! sink — a counted summary of each frame's render-pass tree, not an actual
//! rasterizer. Patch authoring and a real render backend are external
//! collaborators (`lumen-core`'s own scope note).
#![deny(rust_2018_idioms)]
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
    clippy::dbg_macro
)]
// A CLI's job is to print to stdout/stderr.
#![allow(clippy::print_stdout, clippy::print_stderr)]

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lumen_core::ir::RenderFrame;
use lumen_core::runtime::state_buffer::StateBuffer;
use lumen_core::runtime::value_store::ValueStore;
use lumen_core::{fixtures, CompiledProgram, Executor, Registry};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a fixture patch and print its diagnostics.
    Compile {
        #[clap(value_enum)]
        fixture: Fixture,
    },
    /// Compile a fixture patch and run it for a fixed number of frames.
    Run {
        #[clap(value_enum)]
        fixture: Fixture,
        /// Number of frames to run.
        #[clap(long, default_value_t = 10)]
        frames: u32,
        /// Milliseconds of model time advanced per frame.
        #[clap(long, default_value_t = 16.667)]
        frame_ms: f64,
    },
}

/// Which of the named testable-property fixtures to compile.
///
/// `S3` and `S5` are deliberately invalid patches (a world-mismatch wire and
/// a reserved-bus-type violation, respectively): compiling them is expected
/// to fail, and `run` refuses to execute a program that never compiled.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Fixture {
    S1,
    S2,
    S3,
    S4,
    S5,
}

fn main() -> Result<()> {
    let args = Args::parse();
    match args.cmd {
        Command::Compile { fixture } => compile_and_report(fixture).map(|_| ()),
        Command::Run { fixture, frames, frame_ms } => run(fixture, frames, frame_ms),
    }
}

fn compile_and_report(fixture: Fixture) -> Result<CompiledProgram> {
    let registry = Registry::with_builtins();
    let patch = patch_for(fixture);
    let result = lumen_core::compile(&registry, &patch);

    for diag in &result.diagnostics {
        println!("[{:?}] {}: {}", diag.severity, diag.code.as_str(), diag.message);
    }

    match result.program {
        Some(program) => {
            println!("compiled ok: {} schedule steps, {} slots", program.schedule.len(), program.slot_meta.len());
            Ok(program)
        }
        None => bail!("compile failed for fixture {fixture:?} (see diagnostics above)"),
    }
}

fn run(fixture: Fixture, frames: u32, frame_ms: f64) -> Result<()> {
    let program = compile_and_report(fixture)?;
    let registry = Registry::with_builtins();
    let mut executor = Executor::new(registry.opcodes, registry.transforms);
    let mut values = ValueStore::new(program.slot_meta.len());
    let mut state = StateBuffer::with_zeroed_scalars(program.state_layout.len());

    for frame_index in 0..frames {
        let t_model_ms = f64::from(frame_index) * frame_ms;
        let frame = executor.run_frame(&program, &mut values, &mut state, t_model_ms, t_model_ms)?;
        report_frame(frame_index, t_model_ms, &frame);
    }
    Ok(())
}

fn report_frame(frame_index: u32, t_model_ms: f64, frame: &RenderFrame) {
    println!(
        "frame {frame_index}: tModelMs={t_model_ms:.3} passes={}",
        frame.passes.len()
    );
}

fn patch_for(fixture: Fixture) -> lumen_core::Patch {
    match fixture {
        Fixture::S1 => fixtures::s1_breathing_grid(),
        Fixture::S2 => fixtures::s2_bus_combine_last(),
        Fixture::S3 => fixtures::s3_world_mismatch(),
        Fixture::S4 => fixtures::s4_slew_across_hot_swap().0,
        Fixture::S5 => fixtures::s5_reserved_bus_misuse(),
    }
}
