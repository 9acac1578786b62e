// SPDX-License-Identifier: Apache-2.0
//! Accumulated compile diagnostics and lifecycle events (§6, §7).
//!
//! Lowering passes accumulate [`Diagnostic`]s instead of aborting on the
//! first error, up to [`MAX_DIAGNOSTICS`], so a host UI can display the full
//! error set. This mirrors the teacher's `TickReceipt`/`TickReceiptRejection`
//! split between accumulated, per-item outcomes and a hard `EngineError`.
use crate::ident::{BlockIndex, BusIndex, ValueSlot};

/// Hard cap on accumulated diagnostics per compile; passes stop recording new
/// diagnostics (but continue analysis) once reached, to bound compiler memory
/// on pathological patches.
pub const MAX_DIAGNOSTICS: usize = 4096;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    /// The patch cannot produce a program; `CompileResult.program` is absent.
    Error,
    /// Non-fatal anomaly; returned alongside a valid program.
    Warning,
}

/// Required diagnostic codes (§6) plus two internal-only additions used by
/// the lowering pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DiagnosticCode {
    /// No `TimeRoot` block present in the patch.
    MissingTimeRoot,
    /// More than one `TimeRoot` block present in the patch.
    MultipleTimeRoots,
    /// A wire connects ports in incompatible worlds with no explicit converter.
    WorldMismatch,
    /// A wire connects ports whose `TypeDesc` domains do not match.
    TypeMismatch,
    /// A graph cycle passes only through stateless nodes.
    CycleThroughNonStateful,
    /// A required input port has neither a wire nor a default source.
    UnresolvedInput,
    /// A non-numeric type was routed through a bus with no defined combine semantics.
    BusUnsupportedIrType,
    /// An opcode id has no registry entry.
    UnknownOpcode,
    /// A transform id has no registry entry.
    UnknownTransform,
    /// A bus combine mode is not legal for the bus's declared type.
    BusCombineInvalid,
    /// A publisher attempted to write a type incompatible with a reserved bus's locked type.
    ReservedBusMisuse,
    /// Link resolution found two schedule steps writing the same slot.
    MultipleWriters,
    /// A lowering pass invariant was violated; this indicates a compiler bug,
    /// not a patch-authoring mistake, and should never be user-visible.
    InternalLoweringInvariant,
    /// A bus has publishers but no listener reads it and no default exists
    /// for any of its apparent listeners — informational only.
    EmptyBusNoDefault,
    /// A block instance names a type with no registry entry.
    UnknownBlockType,
}

impl DiagnosticCode {
    /// Returns the stable string code used in external reporting (`E_*`/`W_*`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingTimeRoot => "E_MISSING_TIMEROOT",
            Self::MultipleTimeRoots => "E_MULTIPLE_TIMEROOTS",
            Self::WorldMismatch => "E_WORLD_MISMATCH",
            Self::TypeMismatch => "E_TYPE_MISMATCH",
            Self::CycleThroughNonStateful => "E_CYCLE_THROUGH_NON_STATEFUL",
            Self::UnresolvedInput => "E_UNRESOLVED_INPUT",
            Self::BusUnsupportedIrType => "E_BUS_UNSUPPORTED_IR_TYPE",
            Self::UnknownOpcode => "E_UNKNOWN_OPCODE",
            Self::UnknownTransform => "E_UNKNOWN_TRANSFORM",
            Self::BusCombineInvalid => "E_BUS_COMBINE_INVALID",
            Self::ReservedBusMisuse => "E_RESERVED_BUS_MISUSE",
            Self::MultipleWriters => "E_MULTIPLE_WRITERS",
            Self::InternalLoweringInvariant => "E_INTERNAL_LOWERING_INVARIANT",
            Self::EmptyBusNoDefault => "W_EMPTY_BUS_DEFAULT",
            Self::UnknownBlockType => "E_UNKNOWN_BLOCK_TYPE",
        }
    }

    /// Severity implied by the code itself (a handful of codes are always
    /// warnings; everything else is always an error).
    #[must_use]
    pub const fn default_severity(self) -> Severity {
        match self {
            Self::EmptyBusNoDefault => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// Location a diagnostic is attributed to, for host-side highlighting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiagLocation {
    /// Offending block, if any.
    pub block: Option<BlockIndex>,
    /// Offending value slot, if any.
    pub slot: Option<ValueSlot>,
    /// Offending bus, if any.
    pub bus: Option<BusIndex>,
}

/// A single accumulated diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Diagnostic {
    /// Stable diagnostic code.
    pub code: DiagnosticCode,
    /// Human-readable message.
    pub message: String,
    /// Where this diagnostic was attributed.
    pub where_: DiagLocation,
    /// Severity.
    pub severity: Severity,
}

impl Diagnostic {
    /// Builds an error-severity diagnostic with no location.
    #[must_use]
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            where_: DiagLocation::default(),
            severity: Severity::Error,
        }
    }

    /// Builds a warning-severity diagnostic with no location.
    #[must_use]
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            where_: DiagLocation::default(),
            severity: Severity::Warning,
        }
    }

    /// Attaches a block location to this diagnostic.
    #[must_use]
    pub fn at_block(mut self, block: BlockIndex) -> Self {
        self.where_.block = Some(block);
        self
    }

    /// Attaches a value slot location to this diagnostic.
    #[must_use]
    pub fn at_slot(mut self, slot: ValueSlot) -> Self {
        self.where_.slot = Some(slot);
        self
    }

    /// Attaches a bus location to this diagnostic.
    #[must_use]
    pub fn at_bus(mut self, bus: BusIndex) -> Self {
        self.where_.bus = Some(bus);
        self
    }
}

/// Accumulates diagnostics across lowering passes, capped at
/// [`MAX_DIAGNOSTICS`].
#[derive(Debug, Clone, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a diagnostic if under the cap. Returns `false` if the cap was
    /// already reached (the caller should continue analysis regardless).
    pub fn push(&mut self, diagnostic: Diagnostic) -> bool {
        if self.diagnostics.len() >= MAX_DIAGNOSTICS {
            return false;
        }
        self.diagnostics.push(diagnostic);
        true
    }

    /// Returns true if any accumulated diagnostic has error severity.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    /// Consumes the sink, returning the accumulated diagnostics.
    #[must_use]
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

/// Outcome of a compile: either a usable program plus any warnings, or no
/// program plus the full diagnostic set explaining why.
#[derive(Debug, Clone)]
pub struct CompileResult {
    /// The compiled program, absent if any error-severity diagnostic fired.
    pub program: Option<crate::ir::program::CompiledProgram>,
    /// All diagnostics accumulated during lowering.
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileResult {
    /// Returns true if compilation produced a usable program.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.program.is_some()
    }
}

/// Disposition reported by [`crate::cache::CompileCache`] on a hot-swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SwapMode {
    /// New and previous `stateLayout` fingerprints matched exactly; state was
    /// carried forward verbatim.
    Soft,
    /// Fingerprints differed; state cells were matched pairwise by stable
    /// identity, new cells zero-initialized, removed cells discarded.
    Hard,
}

/// Lifecycle events emitted synchronously after state commits (§6).
#[derive(Debug, Clone)]
pub enum Event {
    /// A compile was started for a given patch fingerprint.
    CompileStarted {
        /// Fingerprint of the patch being compiled.
        fingerprint: [u8; 32],
    },
    /// A compile finished, successfully or not.
    CompileFinished {
        /// Whether the compile produced a usable program.
        status: CompileStatus,
        /// Wall-clock duration of the compile, in milliseconds.
        duration_ms: f64,
    },
    /// A new program was swapped in to replace the previously running one.
    ProgramSwapped {
        /// Whether the swap carried state forward verbatim or remapped it.
        swap_mode: SwapMode,
    },
    /// A frame was produced by the executor.
    FrameProduced {
        /// Monotonically increasing frame counter since program load.
        frame_index: u64,
        /// Model time at which the frame was produced.
        t_model_ms: f64,
    },
}

/// Outcome of a compile, for [`Event::CompileFinished`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileStatus {
    /// The compile succeeded (possibly with warnings).
    Success,
    /// The compile failed with at least one error diagnostic.
    Failed,
    /// The compile was cancelled by a subsequent commit before completing.
    Cancelled,
}
