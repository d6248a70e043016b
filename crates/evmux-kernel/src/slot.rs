//! Single-listener slot.
//!
//! Drivers often keep "the" listener for some purpose in a field and swap it
//! out over time.  [`ListenerSlot`] makes the swap safe: the previous
//! listener is fully torn down (disarmed and unlinked) before the new one is
//! stored, so the slot never holds two registrations at once.

use crate::listener::Listener;

/// Holder for at most one [`Listener`].
#[derive(Debug, Default)]
pub struct ListenerSlot {
    current: Option<Listener>,
}

impl ListenerSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `listener`, tearing down whatever the slot held before.
    pub fn replace(&mut self, listener: Option<Listener>) {
        if let Some(old) = self.current.take() {
            old.unregister();
        }
        self.current = listener;
    }

    pub fn set(&mut self, listener: Listener) {
        self.replace(Some(listener));
    }

    /// Tear down the held listener, if any.
    pub fn clear(&mut self) {
        self.replace(None);
    }

    /// Give the held listener back to the caller without tearing it down.
    pub fn take(&mut self) -> Option<Listener> {
        self.current.take()
    }

    pub fn get(&self) -> Option<&Listener> {
        self.current.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }
}
