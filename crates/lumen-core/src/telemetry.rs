// SPDX-License-Identifier: Apache-2.0
//! Feature-gated JSONL telemetry for the four lifecycle events named in §6:
//! `CompileStarted, CompileFinished, ProgramSwapped, FrameProduced`.
//!
//! Manually formats JSON rather than pulling in `serde_json`, matching the
//! teacher's `telemetry` module: emitting must stay deterministic and
//! allocation-light, and the event shape here is fixed and small enough that
//! a general-purpose serializer buys nothing. Off by default; every function
//! is compiled out entirely unless the `telemetry` feature is enabled, so a
//! host that never opts in pays no cost, not even a branch.
use crate::diagnostics::{CompileStatus, SwapMode};
use crate::ident::Hash;

#[cfg(feature = "telemetry")]
fn short_hash(h: &Hash) -> String {
    hex::encode(&h[0..8])
}

#[cfg(feature = "telemetry")]
fn ts_micros() -> u128 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros()
}

#[cfg(feature = "telemetry")]
fn emit_line(line: &str) {
    use std::io::Write as _;
    let mut out = std::io::stdout().lock();
    let _ = out.write_all(line.as_bytes());
    let _ = out.write_all(b"\n");
}

/// Emits a `CompileStarted` line naming the patch fingerprint being compiled.
///
/// No-op unless the `telemetry` feature is enabled.
#[cfg(feature = "telemetry")]
pub fn compile_started(fingerprint: &Hash) {
    emit_line(&format!(
        r#"{{"timestampMicros":{},"event":"CompileStarted","fingerprint":"{}"}}"#,
        ts_micros(),
        short_hash(fingerprint)
    ));
}

/// Emits a `CompileStarted` line; compiled out entirely without the
/// `telemetry` feature.
#[cfg(not(feature = "telemetry"))]
pub fn compile_started(_fingerprint: &Hash) {}

/// Emits a `CompileFinished` line with the compile's status and duration.
#[cfg(feature = "telemetry")]
pub fn compile_finished(status: CompileStatus, duration_ms: f64) {
    let status_str = match status {
        CompileStatus::Success => "success",
        CompileStatus::Failed => "failed",
        CompileStatus::Cancelled => "cancelled",
    };
    emit_line(&format!(
        r#"{{"timestampMicros":{},"event":"CompileFinished","status":"{status_str}","durationMs":{duration_ms}}}"#,
        ts_micros()
    ));
}

/// Emits a `CompileFinished` line; compiled out entirely without the
/// `telemetry` feature.
#[cfg(not(feature = "telemetry"))]
pub fn compile_finished(_status: CompileStatus, _duration_ms: f64) {}

/// Emits a `ProgramSwapped` line naming whether state was carried forward
/// verbatim or remapped.
#[cfg(feature = "telemetry")]
pub fn program_swapped(swap_mode: SwapMode) {
    let mode_str = match swap_mode {
        SwapMode::Soft => "soft",
        SwapMode::Hard => "hard",
    };
    emit_line(&format!(
        r#"{{"timestampMicros":{},"event":"ProgramSwapped","swapMode":"{mode_str}"}}"#,
        ts_micros()
    ));
}

/// Emits a `ProgramSwapped` line; compiled out entirely without the
/// `telemetry` feature.
#[cfg(not(feature = "telemetry"))]
pub fn program_swapped(_swap_mode: SwapMode) {}

/// Emits a `FrameProduced` line with the frame counter and model time.
#[cfg(feature = "telemetry")]
pub fn frame_produced(frame_index: u64, t_model_ms: f64) {
    emit_line(&format!(
        r#"{{"timestampMicros":{},"event":"FrameProduced","frameIndex":{frame_index},"tModelMs":{t_model_ms}}}"#,
        ts_micros()
    ));
}

/// Emits a `FrameProduced` line; compiled out entirely without the
/// `telemetry` feature.
#[cfg(not(feature = "telemetry"))]
pub fn frame_produced(_frame_index: u64, _t_model_ms: f64) {}
