//! CHIP-8 hardware profile.
//!
//! The program image is the full 4 KiB address space: the ROM is copied at
//! offset 0 and the hex glyph table sits at [`FONT_OFFSET`], just below the
//! top of memory.

mod display;
mod font;
mod isa;
mod keypad;
mod quirks;
mod registers;

pub use display::{Display, DISPLAY_HEIGHT, DISPLAY_WIDTH};
pub use font::{FONT, GLYPH_HEIGHT};
pub use keypad::{Keypad, KEY_COUNT};
pub use quirks::{
    Quirks, JUMP_USES_VX, LOAD_STORE_INCREMENTS_I, LOGIC_RESETS_VF, SHIFT_USES_VY,
};
pub use registers::{Registers, FLAG_REGISTER, REGISTER_COUNT};

use crate::arch::Architecture;
use crate::event::{AwaitCallback, Event};
use crate::fault::{LoaderError, MaskError, VmError};
use crate::operation::Operation;
use crate::program::ProgramSource;
use crate::stack::{ProgramStack, DEFAULT_STACK_CAPACITY};
use crate::timing::{ClockDivider, TIMER_HZ};

/// Size of the address space and of every loaded image.
pub const MEMORY_SIZE: usize = 4096;

/// Offset of the glyph table inside the image.
pub const FONT_OFFSET: u16 = 0xFB0;

/// Largest ROM accepted by the loader.
pub const MAX_ROM_SIZE: usize = FONT_OFFSET as usize;

/// Host event: key pressed, value is the key index.
pub const KEYDOWN: &str = "keydown";
/// Host event: key released, value is the key index.
pub const KEYUP: &str = "keyup";
/// Guest event: the frame buffer changed.
pub const DISPLAY_EVENT: &str = "display";

const DEFAULT_RNG_SEED: u16 = 0xACE1;

/// Profile configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Chip8Config {
    /// Call stack depth.
    pub stack_capacity: usize,
    /// Interpreter variant switches.
    pub quirks: Quirks,
    /// Seed of the `CXNN` generator. Zero is replaced by a fixed non-zero seed.
    pub rng_seed: u16,
}

impl Default for Chip8Config {
    fn default() -> Self {
        Self {
            stack_capacity: DEFAULT_STACK_CAPACITY,
            quirks: Quirks::default(),
            rng_seed: DEFAULT_RNG_SEED,
        }
    }
}

/// CHIP-8 machine state. Snapshots carry it whole.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Chip8 {
    registers: Registers,
    delay_timer: u8,
    sound_timer: u8,
    timer_clock: ClockDivider,
    stack: ProgramStack,
    display: Display,
    keypad: Keypad,
    quirks: Quirks,
    rng_seed: u16,
    rng_state: u16,
    key_wait: Option<u8>,
}

impl Default for Chip8 {
    fn default() -> Self {
        Self::new(Chip8Config::default())
    }
}

impl Chip8 {
    /// Machine in its reset state.
    #[must_use]
    pub fn new(config: Chip8Config) -> Self {
        let rng_seed = if config.rng_seed == 0 {
            DEFAULT_RNG_SEED
        } else {
            config.rng_seed
        };
        Self {
            registers: Registers::default(),
            delay_timer: 0,
            sound_timer: 0,
            timer_clock: ClockDivider::new(TIMER_HZ),
            stack: ProgramStack::with_capacity(config.stack_capacity),
            display: Display::default(),
            keypad: Keypad::default(),
            quirks: config.quirks,
            rng_seed,
            rng_state: rng_seed,
            key_wait: None,
        }
    }

    /// Register file.
    #[must_use]
    pub const fn registers(&self) -> &Registers {
        &self.registers
    }

    /// Mutable register file.
    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    /// Delay timer.
    #[must_use]
    pub const fn delay_timer(&self) -> u8 {
        self.delay_timer
    }

    /// Sound timer. The buzzer sounds while non-zero.
    #[must_use]
    pub const fn sound_timer(&self) -> u8 {
        self.sound_timer
    }

    /// Sets the delay timer.
    pub fn set_delay_timer(&mut self, value: u8) {
        self.delay_timer = value;
    }

    /// Sets the sound timer.
    pub fn set_sound_timer(&mut self, value: u8) {
        self.sound_timer = value;
    }

    /// Call stack.
    #[must_use]
    pub const fn stack(&self) -> &ProgramStack {
        &self.stack
    }

    /// Frame buffer.
    #[must_use]
    pub const fn display(&self) -> &Display {
        &self.display
    }

    /// Input latch.
    #[must_use]
    pub const fn keypad(&self) -> &Keypad {
        &self.keypad
    }

    /// Mutable input latch.
    pub fn keypad_mut(&mut self) -> &mut Keypad {
        &mut self.keypad
    }

    /// Active quirks.
    #[must_use]
    pub const fn quirks(&self) -> Quirks {
        self.quirks
    }

    /// Register an `FX0A` is waiting to fill.
    #[must_use]
    pub const fn key_wait(&self) -> Option<u8> {
        self.key_wait
    }

    /// Next byte from the xorshift generator.
    pub(crate) fn next_random(&mut self) -> u8 {
        let mut x = self.rng_state;
        x ^= x << 7;
        x ^= x >> 9;
        x ^= x << 8;
        self.rng_state = x;
        x.to_be_bytes()[1]
    }

    pub(crate) fn begin_key_wait(&mut self, register: u8) {
        self.key_wait = Some(register & 0xF);
    }

    pub(crate) fn finish_key_wait(&mut self, register: u8, key: u16) {
        self.registers
            .set_v(usize::from(register), key.to_be_bytes()[1] & 0xF);
        self.key_wait = None;
    }

    pub(crate) fn stack_mut(&mut self) -> &mut ProgramStack {
        &mut self.stack
    }

    pub(crate) fn display_mut(&mut self) -> &mut Display {
        &mut self.display
    }
}

/// Await callback that completes a pending `FX0A` into `register`.
pub(crate) fn key_wait_callback(register: u8) -> impl FnOnce(&mut Chip8, &Event) + 'static {
    move |chip, event| chip.finish_key_wait(register, event.value)
}

fn malformed(reason: &'static str) -> VmError {
    VmError::MalformedSnapshot { reason }
}

impl Architecture for Chip8 {
    const NAME: &'static str = "chip-8";
    const REGISTER_PREFIX: &'static str = "V";

    type State = Self;

    fn operations() -> Result<Vec<Operation<Self>>, MaskError> {
        isa::operations()
    }

    fn load(&mut self, source: &ProgramSource<'_>) -> Result<Vec<u8>, LoaderError> {
        let rom = source.to_bytes()?;
        if rom.is_empty() {
            return Err(LoaderError::Empty);
        }
        if rom.len() > MAX_ROM_SIZE {
            return Err(LoaderError::TooLarge {
                len: rom.len(),
                max: MAX_ROM_SIZE,
            });
        }
        let mut image = vec![0; MEMORY_SIZE];
        image[..rom.len()].copy_from_slice(&rom);
        let font = usize::from(FONT_OFFSET);
        image[font..font + FONT.len()].copy_from_slice(&FONT);
        Ok(image)
    }

    fn reset(&mut self) {
        self.registers = Registers::default();
        self.delay_timer = 0;
        self.sound_timer = 0;
        self.timer_clock.reset();
        self.stack.clear();
        self.display.clear();
        self.keypad.release_all();
        self.rng_state = self.rng_seed;
        self.key_wait = None;
    }

    fn tick(&mut self, clock_speed_hz: u32) {
        let due = u8::try_from(self.timer_clock.advance(clock_speed_hz)).unwrap_or(u8::MAX);
        self.delay_timer = self.delay_timer.saturating_sub(due);
        self.sound_timer = self.sound_timer.saturating_sub(due);
    }

    fn debug_option(&mut self, name: &str, value: Option<bool>) -> Option<bool> {
        match value {
            Some(value) => self.quirks.set(name, value),
            None => self.quirks.get(name),
        }
    }

    fn on_event(&mut self, event: &Event) {
        let key = event.value.to_be_bytes()[1];
        match event.name {
            KEYDOWN => self.keypad.press(key),
            KEYUP => self.keypad.release(key),
            _ => {}
        }
    }

    fn save_state(&self) -> Self::State {
        self.clone()
    }

    fn restore_state(&self, state: &Self::State) -> Result<Self, VmError> {
        if !state.stack.is_well_formed() {
            return Err(malformed("stack depth exceeds capacity"));
        }
        if state.key_wait.is_some_and(|register| usize::from(register) >= REGISTER_COUNT) {
            return Err(malformed("key wait register out of range"));
        }
        Ok(state.clone())
    }

    fn rearm_await(&self) -> Option<(&'static str, AwaitCallback<Self>)> {
        let register = self.key_wait?;
        Some((KEYDOWN, Box::new(key_wait_callback(register))))
    }
}
