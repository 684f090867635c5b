//! Clock division for timers that run slower than the instruction clock.

/// Rate of the countdown timers, in hertz.
pub const TIMER_HZ: u32 = 60;

/// Default instruction clock, in steps per second.
pub const DEFAULT_CLOCK_SPEED_HZ: u32 = 500;

/// Fractional accumulator that turns instruction ticks into divided ticks.
///
/// Over `clock_hz` consecutive advances it yields exactly `rate_hz` ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ClockDivider {
    rate_hz: u32,
    accumulator: u32,
}

impl Default for ClockDivider {
    fn default() -> Self {
        Self::new(TIMER_HZ)
    }
}

impl ClockDivider {
    /// Divider producing `rate_hz` ticks per second of instruction clock.
    #[must_use]
    pub const fn new(rate_hz: u32) -> Self {
        Self {
            rate_hz,
            accumulator: 0,
        }
    }

    /// Accounts for one instruction tick and returns the whole divided ticks
    /// that became due. A zero clock never yields.
    pub fn advance(&mut self, clock_hz: u32) -> u32 {
        if clock_hz == 0 {
            return 0;
        }
        self.accumulator = self.accumulator.saturating_add(self.rate_hz);
        let due = self.accumulator / clock_hz;
        self.accumulator %= clock_hz;
        due
    }

    /// Divided rate in hertz.
    #[must_use]
    pub const fn rate_hz(&self) -> u32 {
        self.rate_hz
    }

    /// Carried fraction, in units of `1 / clock_hz`.
    #[must_use]
    pub const fn accumulator(&self) -> u32 {
        self.accumulator
    }

    /// Drops any carried fraction.
    pub fn reset(&mut self) {
        self.accumulator = 0;
    }
}
