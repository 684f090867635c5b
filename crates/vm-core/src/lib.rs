//! Mask-decoded 16-bit bytecode VM core.
//!
//! An [`Architecture`] contributes machine state and a list of
//! [`Operation`]s, each described by an [`OpMask`]. The [`Vm`] builds an
//! [`OpTable`] from them, decodes words through a [`DecodeCache`], and runs a
//! fetch-decode-execute loop with jump compensation, timers, host events,
//! and snapshots. The [`chip8`] module is the reference profile.

/// Fault taxonomy for mask construction, loading, and execution.
pub mod fault;
pub use fault::{FaultClass, LoaderError, MaskError, VmError};

/// Bit-field masks that select and decode an instruction form.
pub mod mask;
pub use mask::{BitField, OpMask, MAX_OPERANDS, WORD_BITS};

/// Instruction forms: opcode, mask, semantics, and disassembly template.
pub mod operation;
pub use operation::{
    compiled, CompileFn, CompiledFn, ExecuteFn, OperandTag, Operands, Operation,
};

/// Bucketed operation lookup by discriminator bits.
pub mod table;
pub use table::OpTable;

/// Decoded instruction records and the word-keyed cache.
pub mod decode;
pub use decode::{DecodeCache, Decoded, Executable};

/// Program sources and the loaded image.
pub mod program;
pub use program::{
    parse_hex, read_u16_be, Program, ProgramSource, INSTRUCTION_WIDTH, MAX_IMAGE_LEN,
};

/// Bounded return-address stack.
pub mod stack;
pub use stack::{ProgramStack, DEFAULT_STACK_CAPACITY};

/// Clock dividers for fixed-rate peripherals.
pub mod timing;
pub use timing::{ClockDivider, DEFAULT_CLOCK_SPEED_HZ, TIMER_HZ};

/// Host events, awaits, and the outbound queue.
pub mod event;
pub use event::{AwaitCallback, Event, EventChannel, OUTBOX_CAPACITY};

/// Control block and the per-instruction execution context.
pub mod context;
pub use context::{Context, Control, Phase};

/// Engine configuration.
pub mod config;
pub use config::VmConfig;

/// Versioned, architecture-tagged snapshots.
pub mod snapshot;
pub use snapshot::{Snapshot, SnapshotVersion};

/// The contract every hardware profile implements.
pub mod arch;
pub use arch::Architecture;

/// The execution engine.
pub mod vm;
pub use vm::{RunOutcome, RunState, StepOutcome, Vm};

/// Table-driven disassembly.
pub mod disasm;
pub use disasm::{disassemble_memory, disassemble_range, disassemble_word, DisassemblyRow};

pub mod chip8;

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
#[cfg(test)]
use serde_json as _;
