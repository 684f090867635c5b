//! Named events between host and guest, and the one-shot await interceptor.

use std::collections::VecDeque;
use std::fmt;

use crate::fault::VmError;

/// Maximum number of guest-emitted events held until the host drains them.
pub const OUTBOX_CAPACITY: usize = 64;

/// A named event with a small payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Event {
    /// Event name, for example `keydown`.
    pub name: &'static str,
    /// Event payload, for example a key index.
    pub value: u16,
}

impl Event {
    /// Creates an event.
    #[must_use]
    pub const fn new(name: &'static str, value: u16) -> Self {
        Self { name, value }
    }
}

/// Callback run when an awaited event arrives.
pub type AwaitCallback<A> = Box<dyn FnOnce(&mut A, &Event)>;

/// Event plumbing owned by the engine.
///
/// Holds at most one pending await interceptor, and a bounded outbox of
/// events emitted by the guest. The outbox drops the oldest entry when full
/// and coalesces consecutive duplicates.
pub struct EventChannel<A> {
    interceptor: Option<(&'static str, AwaitCallback<A>)>,
    outbox: VecDeque<Event>,
}

impl<A> Default for EventChannel<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for EventChannel<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("awaiting", &self.pending())
            .field("outbox", &self.outbox)
            .finish()
    }
}

impl<A> EventChannel<A> {
    /// Empty channel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            interceptor: None,
            outbox: VecDeque::new(),
        }
    }

    /// Installs a one-shot interceptor for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::AlreadyAwaiting`] when an interceptor is pending.
    pub fn arm(&mut self, name: &'static str, callback: AwaitCallback<A>) -> Result<(), VmError> {
        if let Some((pending, _)) = &self.interceptor {
            return Err(VmError::AlreadyAwaiting { pending: *pending });
        }
        self.interceptor = Some((name, callback));
        Ok(())
    }

    /// Removes the interceptor if `event` is the one being awaited.
    pub fn take_match(&mut self, event: &Event) -> Option<AwaitCallback<A>> {
        match &self.interceptor {
            Some((name, _)) if *name == event.name => {
                self.interceptor.take().map(|(_, callback)| callback)
            }
            _ => None,
        }
    }

    /// Drops any pending interceptor.
    pub fn disarm(&mut self) {
        self.interceptor = None;
    }

    /// Returns true while an interceptor is pending.
    #[must_use]
    pub const fn is_awaiting(&self) -> bool {
        self.interceptor.is_some()
    }

    /// Name of the awaited event.
    #[must_use]
    pub fn pending(&self) -> Option<&'static str> {
        self.interceptor.as_ref().map(|(name, _)| *name)
    }

    /// Queues a guest-emitted event for the host.
    pub fn push(&mut self, event: Event) {
        if self.outbox.back() == Some(&event) {
            return;
        }
        if self.outbox.len() == OUTBOX_CAPACITY {
            self.outbox.pop_front();
        }
        self.outbox.push_back(event);
    }

    /// Takes every queued event, oldest first.
    pub fn drain(&mut self) -> Vec<Event> {
        self.outbox.drain(..).collect()
    }

    /// Number of queued events.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.outbox.len()
    }

    /// Drops the interceptor and every queued event.
    pub fn clear(&mut self) {
        self.interceptor = None;
        self.outbox.clear();
    }
}
