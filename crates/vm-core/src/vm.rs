//! The execution engine.
//!
//! A [`Vm`] owns one architecture, its operation table, the decode cache,
//! the loaded program, and the control block. `step` runs one
//! fetch-decode-execute cycle:
//!
//! 1. tick the architecture's timers,
//! 2. return early while an await is pending,
//! 3. fetch, decode through the cache, execute against a [`Context`],
//! 4. advance PC by one instruction and check for overrun,
//! 5. count the tick.
//!
//! A guest fault leaves PC at the faulting instruction and latches the VM
//! until `reset`, `load`, or `restore`.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::arch::Architecture;
use crate::config::VmConfig;
use crate::context::{Context, Control, Phase};
use crate::decode::{DecodeCache, Decoded, Executable};
use crate::event::{AwaitCallback, Event};
use crate::fault::VmError;
use crate::program::{Program, ProgramSource, INSTRUCTION_WIDTH};
use crate::snapshot::{Snapshot, SnapshotVersion};
use crate::table::OpTable;

/// Engine lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum RunState {
    /// No program loaded.
    #[default]
    Idle,
    /// Program loaded and ready to step.
    Loaded,
    /// A guest fault is latched. Steps return it until reset, load, or restore.
    Faulted(VmError),
}

impl RunState {
    /// Returns the latched fault, if any.
    #[must_use]
    pub const fn latched_fault(&self) -> Option<&VmError> {
        match self {
            Self::Faulted(err) => Some(err),
            Self::Idle | Self::Loaded => None,
        }
    }
}

/// Result of one successful `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepOutcome {
    /// An instruction ran.
    Executed {
        /// Address the instruction was fetched from.
        address: u16,
        /// Instruction word.
        word: u16,
    },
    /// Timers ticked, nothing ran: an await is pending.
    Awaiting {
        /// Name of the awaited event.
        event: &'static str,
    },
}

/// Aggregated outcome of a batch of steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RunOutcome {
    /// Steps taken, awaiting steps included.
    pub steps: u32,
    /// Last step outcome observed.
    pub last: Option<StepOutcome>,
}

/// Virtual machine for architecture `A`.
pub struct Vm<A: Architecture> {
    arch: A,
    table: OpTable<A>,
    cache: DecodeCache<A>,
    program: Option<Program>,
    control: Control<A>,
    run_state: RunState,
    tick_count: u64,
    config: VmConfig,
    debug_options: BTreeMap<String, bool>,
}

impl<A: Architecture + fmt::Debug> fmt::Debug for Vm<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("architecture", &A::NAME)
            .field("arch", &self.arch)
            .field("table", &self.table)
            .field("cache", &self.cache)
            .field("program_len", &self.program.as_ref().map(Program::len))
            .field("control", &self.control)
            .field("run_state", &self.run_state)
            .field("tick_count", &self.tick_count)
            .field("config", &self.config)
            .field("debug_options", &self.debug_options)
            .finish()
    }
}

impl<A: Architecture> Vm<A> {
    /// Builds a VM with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::Construction`] when the instruction set is malformed.
    pub fn new(arch: A) -> Result<Self, VmError> {
        Self::with_config(arch, VmConfig::default())
    }

    /// Builds a VM with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::Construction`] when the instruction set is malformed.
    pub fn with_config(arch: A, config: VmConfig) -> Result<Self, VmError> {
        let table = OpTable::new(A::operations()?);
        debug!(
            architecture = A::NAME,
            operations = table.len(),
            buckets = table.bucket_count(),
            discriminator = table.discriminator(),
            "operation table built"
        );
        Ok(Self {
            arch,
            table,
            cache: DecodeCache::new(),
            program: None,
            control: Control::new(),
            run_state: RunState::Idle,
            tick_count: 0,
            config,
            debug_options: BTreeMap::new(),
        })
    }

    /// Loads a program through the architecture's loader and resets.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::Loader`] when the loader rejects the source or the
    /// image is larger than a 16-bit program counter can address. The VM is
    /// unchanged in that case.
    pub fn load(&mut self, source: ProgramSource<'_>) -> Result<(), VmError> {
        let program = Program::new(self.arch.load(&source)?)?;
        debug!(
            architecture = A::NAME,
            kind = source.kind(),
            len = program.len(),
            "program loaded"
        );
        self.program = Some(program);
        self.reset();
        Ok(())
    }

    /// Convenience for [`Vm::load`] with raw bytes.
    ///
    /// # Errors
    ///
    /// See [`Vm::load`].
    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<(), VmError> {
        self.load(ProgramSource::Bytes(bytes))
    }

    /// PC and tick count to zero, no pending await, hardware reset, debug
    /// options re-applied. The loaded image is kept as is.
    pub fn reset(&mut self) {
        self.control.reset();
        self.tick_count = 0;
        self.arch.reset();
        for (name, value) in &self.debug_options {
            self.arch.debug_option(name, Some(*value));
        }
        self.run_state = if self.program.is_some() {
            RunState::Loaded
        } else {
            RunState::Idle
        };
        debug!(architecture = A::NAME, "reset");
    }

    /// Runs one fetch-decode-execute cycle.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::ReentrantStep`] when an instruction is still in
    /// flight, [`VmError::NoProgramLoaded`] before `load`, the latched fault
    /// while faulted, or the guest fault raised by this step.
    pub fn step(&mut self) -> Result<StepOutcome, VmError> {
        if self.control.phase() != Phase::Idle {
            return Err(VmError::ReentrantStep);
        }
        match &self.run_state {
            RunState::Idle => return Err(VmError::NoProgramLoaded),
            RunState::Faulted(err) => return Err(err.clone()),
            RunState::Loaded => {}
        }

        self.arch.tick(self.config.clock_speed_hz);

        if let Some(event) = self.control.events().pending() {
            trace!(pc = self.control.pc(), event, "awaiting");
            return Ok(StepOutcome::Awaiting { event });
        }

        let address = self.control.pc();
        match self.execute_at(address) {
            Ok(word) => {
                self.tick_count += 1;
                Ok(StepOutcome::Executed { address, word })
            }
            Err(err) => {
                self.control.set_pc(address);
                self.control.set_phase(Phase::Idle);
                warn!(architecture = A::NAME, pc = address, error = %err, "guest fault latched");
                self.run_state = RunState::Faulted(err.clone());
                Err(err)
            }
        }
    }

    fn execute_at(&mut self, address: u16) -> Result<u16, VmError> {
        let program = self.program.as_mut().ok_or(VmError::NoProgramLoaded)?;

        self.control.set_phase(Phase::Fetching);
        let word = program.fetch(address)?;
        let decoded = Self::decode_with(&self.table, &mut self.cache, self.config, word)?;
        trace!(pc = address, word, mnemonic = decoded.mnemonic(), "execute");

        self.control.set_phase(Phase::Executing);
        self.control.take_redirect();
        let mut ctx = Context::new(&mut self.arch, program.image_mut(), &mut self.control);
        decoded.run(&mut ctx)?;
        self.control.set_phase(Phase::Idle);

        // A redirect stores its target one width short and may wrap below
        // zero. A plain advance never wraps.
        let pc = self.control.pc();
        let next = if self.control.take_redirect() {
            usize::from(pc.wrapping_add(INSTRUCTION_WIDTH))
        } else {
            usize::from(pc) + usize::from(INSTRUCTION_WIDTH)
        };
        let len = program.len();
        let next = u16::try_from(next)
            .ok()
            .filter(|_| next <= len)
            .ok_or(VmError::ProgramOverrun { pc: next, len })?;
        self.control.set_pc(next);
        Ok(word)
    }

    fn decode_with(
        table: &OpTable<A>,
        cache: &mut DecodeCache<A>,
        config: VmConfig,
        word: u16,
    ) -> Result<Rc<Decoded<A>>, VmError> {
        if config.decode_cache {
            if let Some(hit) = cache.get(word) {
                return Ok(hit);
            }
        }

        let (index, operation) = table.resolve(word)?;
        let operands = operation.decode(word);
        let executable = if config.compiles() {
            operation
                .compile(&operands)
                .map_or(Executable::Generic(operation.execute_fn()), Executable::Compiled)
        } else {
            Executable::Generic(operation.execute_fn())
        };
        let decoded = Decoded::new(word, index, operation.mnemonic(), operands, executable);

        Ok(if config.decode_cache {
            cache.put(decoded)
        } else {
            Rc::new(decoded)
        })
    }

    /// Decodes `word` the way `step` would, filling the cache when enabled.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::UnknownOpcode`] when no operation matches.
    pub fn decode(&mut self, word: u16) -> Result<Rc<Decoded<A>>, VmError> {
        Self::decode_with(&self.table, &mut self.cache, self.config, word)
    }

    /// Steps until `max_steps` are spent or the VM starts awaiting.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first step error.
    pub fn run(&mut self, max_steps: u32) -> Result<RunOutcome, VmError> {
        let mut outcome = RunOutcome::default();
        while outcome.steps < max_steps {
            let step = self.step()?;
            outcome.steps += 1;
            outcome.last = Some(step);
            if matches!(step, StepOutcome::Awaiting { .. }) {
                break;
            }
        }
        Ok(outcome)
    }

    /// Runs one host frame: `clock_speed_hz / frame_hz` steps, at least one.
    /// Awaiting steps are taken too, so timers keep their rate.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first step error.
    pub fn run_frame(&mut self, frame_hz: u32) -> Result<RunOutcome, VmError> {
        let budget = self
            .config
            .clock_speed_hz
            .checked_div(frame_hz)
            .unwrap_or(0)
            .max(1);
        let mut outcome = RunOutcome::default();
        for _ in 0..budget {
            outcome.last = Some(self.step()?);
            outcome.steps += 1;
        }
        Ok(outcome)
    }

    /// Sets PC between steps. No compensation applies.
    pub fn jump(&mut self, address: u16) {
        self.control.jump(address);
    }

    /// Moves PC `n` instructions forward.
    pub fn hop_forwards(&mut self, n: u16) {
        self.control.hop_forwards(n);
    }

    /// Moves PC `n` instructions back.
    pub fn hop_backwards(&mut self, n: u16) {
        self.control.hop_backwards(n);
    }

    /// Suspends stepping until the host emits `name`.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::AlreadyAwaiting`] when an await is pending.
    pub fn await_event<F>(&mut self, name: &'static str, callback: F) -> Result<(), VmError>
    where
        F: FnOnce(&mut A, &Event) + 'static,
    {
        let callback: AwaitCallback<A> = Box::new(callback);
        self.control.events_mut().arm(name, callback)?;
        debug!(event = name, "await armed");
        Ok(())
    }

    /// Delivers a host event: input latch first, then a matching await.
    pub fn emit(&mut self, event: Event) {
        self.arch.on_event(&event);
        if let Some(callback) = self.control.events_mut().take_match(&event) {
            debug!(event = event.name, value = event.value, "await satisfied");
            callback(&mut self.arch, &event);
        }
    }

    /// Takes every event the guest emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<Event> {
        self.control.events_mut().drain()
    }

    /// Returns true while an await is pending.
    #[must_use]
    pub const fn is_awaiting(&self) -> bool {
        self.control.events().is_awaiting()
    }

    /// Name of the awaited event.
    #[must_use]
    pub fn awaiting_event(&self) -> Option<&'static str> {
        self.control.events().pending()
    }

    /// Sets a debug option and remembers it across resets.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::UnknownDebugOption`] for names the architecture
    /// does not know.
    pub fn set_debug_option(&mut self, name: &str, value: bool) -> Result<(), VmError> {
        if self.arch.debug_option(name, Some(value)).is_none() {
            return Err(VmError::UnknownDebugOption {
                name: name.to_owned(),
            });
        }
        self.debug_options.insert(name.to_owned(), value);
        debug!(option = name, value, "debug option set");
        Ok(())
    }

    /// Reads a debug option.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::UnknownDebugOption`] for names the architecture
    /// does not know.
    pub fn debug_option(&mut self, name: &str) -> Result<bool, VmError> {
        self.arch
            .debug_option(name, None)
            .ok_or_else(|| VmError::UnknownDebugOption {
                name: name.to_owned(),
            })
    }

    /// Captures PC, tick count, image, and architecture state.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::NoProgramLoaded`] before `load`.
    pub fn snapshot(&self) -> Result<Snapshot<A::State>, VmError> {
        let program = self.program.as_ref().ok_or(VmError::NoProgramLoaded)?;
        let snapshot = Snapshot {
            version: SnapshotVersion::CURRENT.as_u16(),
            architecture: A::NAME.to_owned(),
            pc: self.control.pc(),
            tick_count: self.tick_count,
            image: program.image().to_vec(),
            state: self.arch.save_state(),
        };
        debug!(
            architecture = A::NAME,
            pc = snapshot.pc,
            tick = snapshot.tick_count,
            len = snapshot.image.len(),
            "snapshot taken"
        );
        Ok(snapshot)
    }

    /// Restores a snapshot. Everything is validated before anything changes.
    ///
    /// Debug options follow the restored machine: remembered options take
    /// their values from it, so a later `reset` keeps them.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::VersionMismatch`], [`VmError::ArchitectureMismatch`],
    /// or [`VmError::MalformedSnapshot`] and leaves the VM untouched.
    pub fn restore(&mut self, snapshot: &Snapshot<A::State>) -> Result<(), VmError> {
        snapshot.validate(A::NAME)?;
        let mut arch = self.arch.restore_state(&snapshot.state)?;
        let program = Program::new(snapshot.image.clone()).map_err(|_| {
            VmError::MalformedSnapshot {
                reason: "image exceeds the address space",
            }
        })?;

        for (name, value) in &mut self.debug_options {
            if let Some(restored) = arch.debug_option(name, None) {
                *value = restored;
            }
        }
        self.arch = arch;
        self.program = Some(program);
        self.control.reset();
        self.control.set_pc(snapshot.pc);
        self.tick_count = snapshot.tick_count;
        self.run_state = RunState::Loaded;
        self.cache.invalidate_all();
        if let Some((name, callback)) = self.arch.rearm_await() {
            self.control.events_mut().arm(name, callback)?;
        }
        debug!(
            architecture = A::NAME,
            pc = snapshot.pc,
            tick = snapshot.tick_count,
            "snapshot restored"
        );
        Ok(())
    }

    /// Architecture state.
    #[must_use]
    pub const fn arch(&self) -> &A {
        &self.arch
    }

    /// Mutable architecture state, for host collaborators between steps.
    pub fn arch_mut(&mut self) -> &mut A {
        &mut self.arch
    }

    /// Program counter.
    #[must_use]
    pub const fn pc(&self) -> u16 {
        self.control.pc()
    }

    /// Instructions executed since the last reset.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn run_state(&self) -> &RunState {
        &self.run_state
    }

    /// Step phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.control.phase()
    }

    /// Loaded program.
    #[must_use]
    pub const fn program(&self) -> Option<&Program> {
        self.program.as_ref()
    }

    /// Program memory, empty before `load`.
    #[must_use]
    pub fn memory(&self) -> &[u8] {
        self.program.as_ref().map_or(&[], Program::image)
    }

    /// Operation table.
    #[must_use]
    pub const fn table(&self) -> &OpTable<A> {
        &self.table
    }

    /// Decode cache.
    #[must_use]
    pub const fn cache(&self) -> &DecodeCache<A> {
        &self.cache
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Changes the instruction clock fed to the timers.
    pub fn set_clock_speed(&mut self, clock_speed_hz: u32) {
        self.config.clock_speed_hz = clock_speed_hz;
    }
}
