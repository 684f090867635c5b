//! Contract between the engine and a concrete hardware profile.

use crate::event::{AwaitCallback, Event};
use crate::fault::{LoaderError, MaskError, VmError};
use crate::operation::Operation;
use crate::program::ProgramSource;

/// A hardware profile the engine can drive: register file, timers, I/O
/// latches, its instruction set, and its loader.
pub trait Architecture: Sized + 'static {
    /// Architecture tag stored in snapshots.
    const NAME: &'static str;

    /// Prefix used when disassembling register operands.
    const REGISTER_PREFIX: &'static str = "R";

    /// Architecture state carried in a [`crate::Snapshot`].
    type State: Clone;

    /// Registers the instruction set.
    ///
    /// # Errors
    ///
    /// Returns a [`MaskError`] when an operation is malformed.
    fn operations() -> Result<Vec<Operation<Self>>, MaskError>;

    /// Turns a program source into an image and prepares hardware for it.
    ///
    /// The default accepts raw bytes only.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Unsupported`] for other sources, or whatever
    /// size check the profile applies.
    fn load(&mut self, source: &ProgramSource<'_>) -> Result<Vec<u8>, LoaderError> {
        match source {
            ProgramSource::Bytes(bytes) if bytes.is_empty() => Err(LoaderError::Empty),
            ProgramSource::Bytes(bytes) => Ok(bytes.to_vec()),
            other => Err(LoaderError::Unsupported {
                architecture: Self::NAME,
                kind: other.kind(),
            }),
        }
    }

    /// Hardware reset. The loaded image is kept.
    fn reset(&mut self);

    /// Called once per engine step, awaiting or not.
    fn tick(&mut self, clock_speed_hz: u32);

    /// Reads or sets a named debug option. Returns the current value, or
    /// `None` when the name is unknown.
    fn debug_option(&mut self, name: &str, value: Option<bool>) -> Option<bool>;

    /// Input latch hook, called for every host-emitted event before any
    /// await interceptor.
    fn on_event(&mut self, event: &Event) {
        let _ = event;
    }

    /// Captures state for a snapshot.
    fn save_state(&self) -> Self::State;

    /// Builds a machine from saved state, leaving `self` untouched.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::MalformedSnapshot`] when the state is inconsistent.
    fn restore_state(&self, state: &Self::State) -> Result<Self, VmError>;

    /// Rebuilds a pending await from restored state.
    fn rearm_await(&self) -> Option<(&'static str, AwaitCallback<Self>)> {
        None
    }
}
