//! Execution context handed to every instruction.
//!
//! [`Control`] is the engine-owned control block: program counter, step
//! phase, and event channel. [`Context`] borrows it next to the
//! architecture state and the program image, and exposes the small control
//! surface an instruction is allowed to use.

use crate::event::{AwaitCallback, Event, EventChannel};
use crate::fault::VmError;
use crate::program::INSTRUCTION_WIDTH;

/// Where the engine is within a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Phase {
    /// Between steps.
    #[default]
    Idle,
    /// Fetching and decoding the word at PC.
    Fetching,
    /// Running an instruction's procedure.
    Executing,
}

/// Program counter, step phase, and event channel.
pub struct Control<A> {
    pc: u16,
    phase: Phase,
    redirected: bool,
    events: EventChannel<A>,
}

impl<A> Default for Control<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> std::fmt::Debug for Control<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Control")
            .field("pc", &format_args!("{:#06X}", self.pc))
            .field("phase", &self.phase)
            .field("redirected", &self.redirected)
            .field("events", &self.events)
            .finish()
    }
}

impl<A> Control<A> {
    /// Control block at PC 0, idle, with an empty channel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pc: 0,
            phase: Phase::Idle,
            redirected: false,
            events: EventChannel::new(),
        }
    }

    /// Current program counter.
    #[must_use]
    pub const fn pc(&self) -> u16 {
        self.pc
    }

    /// Sets the program counter with no compensation.
    pub fn set_pc(&mut self, pc: u16) {
        self.pc = pc;
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Moves to `phase`.
    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    /// Redirects control flow to `address`.
    ///
    /// While an instruction executes, the step will still advance PC by one
    /// instruction afterwards, so the stored PC is one width short of the
    /// target. Outside a step the target is stored as is.
    pub fn jump(&mut self, address: u16) {
        if self.phase == Phase::Executing {
            self.pc = address.wrapping_sub(INSTRUCTION_WIDTH);
            self.redirected = true;
        } else {
            self.pc = address;
        }
    }

    /// Returns whether the running instruction redirected control flow, and
    /// clears the flag. A redirected PC may sit one width below zero.
    pub fn take_redirect(&mut self) -> bool {
        std::mem::take(&mut self.redirected)
    }

    /// Jumps `n` instructions forward of the current PC.
    pub fn hop_forwards(&mut self, n: u16) {
        self.jump(self.pc.wrapping_add(n.wrapping_mul(INSTRUCTION_WIDTH)));
    }

    /// Jumps `n` instructions back from the current PC.
    pub fn hop_backwards(&mut self, n: u16) {
        self.jump(self.pc.wrapping_sub(n.wrapping_mul(INSTRUCTION_WIDTH)));
    }

    /// Event channel.
    #[must_use]
    pub const fn events(&self) -> &EventChannel<A> {
        &self.events
    }

    /// Mutable event channel.
    pub fn events_mut(&mut self) -> &mut EventChannel<A> {
        &mut self.events
    }

    /// Back to PC 0, idle, with no pending await and an empty outbox.
    pub fn reset(&mut self) {
        self.pc = 0;
        self.phase = Phase::Idle;
        self.redirected = false;
        self.events.clear();
    }
}

/// What an executing instruction sees: architecture state, program memory,
/// and the engine's control surface.
pub struct Context<'vm, A> {
    /// Architecture state.
    pub arch: &'vm mut A,
    /// Program image, readable and writable by instructions.
    pub memory: &'vm mut [u8],
    control: &'vm mut Control<A>,
}

impl<'vm, A> Context<'vm, A> {
    /// Borrows the pieces an instruction needs.
    pub fn new(arch: &'vm mut A, memory: &'vm mut [u8], control: &'vm mut Control<A>) -> Self {
        Self {
            arch,
            memory,
            control,
        }
    }

    /// Address of the running instruction, or the current PC between steps.
    #[must_use]
    pub fn pc(&self) -> u16 {
        self.control.pc()
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.control.phase()
    }

    /// See [`Control::jump`].
    pub fn jump(&mut self, address: u16) {
        self.control.jump(address);
    }

    /// See [`Control::hop_forwards`].
    pub fn hop_forwards(&mut self, n: u16) {
        self.control.hop_forwards(n);
    }

    /// See [`Control::hop_backwards`].
    pub fn hop_backwards(&mut self, n: u16) {
        self.control.hop_backwards(n);
    }

    /// Suspends execution until the host emits `name`. Steps keep ticking
    /// timers but skip execution until then.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::AlreadyAwaiting`] when an await is pending.
    pub fn await_event<F>(&mut self, name: &'static str, callback: F) -> Result<(), VmError>
    where
        F: FnOnce(&mut A, &Event) + 'static,
    {
        let callback: AwaitCallback<A> = Box::new(callback);
        self.control.events_mut().arm(name, callback)
    }

    /// Returns true while an await is pending.
    #[must_use]
    pub fn is_awaiting(&self) -> bool {
        self.control.events().is_awaiting()
    }

    /// Queues an event for the host.
    pub fn emit(&mut self, event: Event) {
        self.control.events_mut().push(event);
    }

    /// Reads one byte of program memory.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::MemoryOutOfRange`] outside the image.
    pub fn read_byte(&self, address: usize) -> Result<u8, VmError> {
        self.memory
            .get(address)
            .copied()
            .ok_or(VmError::MemoryOutOfRange {
                address,
                len: self.memory.len(),
            })
    }

    /// Writes one byte of program memory.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::MemoryOutOfRange`] outside the image.
    pub fn write_byte(&mut self, address: usize, value: u8) -> Result<(), VmError> {
        let len = self.memory.len();
        let slot = self
            .memory
            .get_mut(address)
            .ok_or(VmError::MemoryOutOfRange { address, len })?;
        *slot = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Context, Control, Phase};
    use crate::event::Event;
    use crate::fault::VmError;

    #[test]
    fn jump_between_steps_is_exact() {
        let mut control = Control::<()>::new();
        control.jump(0x200);
        assert_eq!(control.pc(), 0x200);
    }

    #[test]
    fn jump_while_executing_compensates_for_advance() {
        let mut control = Control::<()>::new();
        control.set_phase(Phase::Executing);
        control.jump(0x200);
        assert_eq!(control.pc(), 0x1FE);
        assert_eq!(control.pc().wrapping_add(2), 0x200);
    }

    #[test]
    fn jump_to_zero_while_executing_wraps() {
        let mut control = Control::<()>::new();
        control.set_phase(Phase::Executing);
        control.jump(0);
        assert_eq!(control.pc(), 0xFFFE);
        assert_eq!(control.pc().wrapping_add(2), 0);
        assert!(control.take_redirect());
        assert!(!control.take_redirect());
    }

    #[test]
    fn jump_between_steps_is_not_a_redirect() {
        let mut control = Control::<()>::new();
        control.jump(0x300);
        assert!(!control.take_redirect());
    }

    #[test]
    fn hops_move_in_instruction_units() {
        let mut control = Control::<()>::new();
        control.set_pc(0x10);
        control.hop_forwards(3);
        assert_eq!(control.pc(), 0x16);
        control.hop_backwards(2);
        assert_eq!(control.pc(), 0x12);

        control.set_phase(Phase::Executing);
        control.hop_forwards(2);
        assert_eq!(control.pc().wrapping_add(2), 0x16);
    }

    #[test]
    fn context_memory_access_is_bounds_checked() {
        let mut arch = 0u8;
        let mut memory = [0u8; 4];
        let mut control = Control::new();
        let mut ctx = Context::new(&mut arch, &mut memory, &mut control);

        ctx.write_byte(3, 0xAB).expect("in range");
        assert_eq!(ctx.read_byte(3), Ok(0xAB));
        assert_eq!(
            ctx.read_byte(4),
            Err(VmError::MemoryOutOfRange { address: 4, len: 4 })
        );
        assert_eq!(
            ctx.write_byte(9, 0),
            Err(VmError::MemoryOutOfRange { address: 9, len: 4 })
        );
    }

    #[test]
    fn context_await_and_emit_route_through_channel() {
        let mut arch = 0u16;
        let mut memory = [0u8; 2];
        let mut control = Control::new();
        let mut ctx = Context::new(&mut arch, &mut memory, &mut control);

        ctx.await_event("go", |state: &mut u16, event| *state = event.value)
            .expect("first await");
        assert!(ctx.is_awaiting());
        assert_eq!(
            ctx.await_event("go", |_, _| {}),
            Err(VmError::AlreadyAwaiting { pending: "go" })
        );
        ctx.emit(Event::new("display", 0));
        assert_eq!(control.events().queued(), 1);
        assert_eq!(control.events().pending(), Some("go"));
    }
}
