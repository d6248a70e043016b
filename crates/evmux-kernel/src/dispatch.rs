//! Event dispatch.
//!
//! [`EventRegistry::trigger`] is the firing path.  It is meant to be called
//! from wherever the backend notices an event, including contexts that
//! cannot sleep, so it only takes the list lock (and, for handlers that ask
//! to be dropped, the refs lock nested inside it).

use crate::listener::Action;
use crate::mask::EventMask;
use crate::registry::{EventRegistry, lock};

impl EventRegistry {
    /// Deliver `types` on `index` to every armed listener that wants any of
    /// them, in registration order.
    ///
    /// Each handler receives only the bits it asked for.  A handler that
    /// returns [`Action::Drop`] is disarmed before the next listener runs.
    /// Returns the number of handlers invoked.  An out-of-range `index` is a
    /// caller bug: it is logged and nothing is delivered.
    pub fn trigger(&self, index: usize, types: EventMask) -> usize {
        let inner = self.inner();
        if index >= inner.index_nr {
            tracing::warn!(
                index,
                index_nr = inner.index_nr,
                %types,
                "trigger on out-of-range index ignored"
            );
            return 0;
        }

        let lists = lock(&inner.lists);
        let mut delivered = 0;

        for listener in &lists[index] {
            if !listener.is_armed() {
                continue;
            }
            let fired = listener.types & types;
            if fired.is_empty() {
                continue;
            }

            delivered += 1;
            if listener.handler.handle(fired, index) == Action::Drop {
                tracing::trace!(listener_id = %listener.id, index, "listener dropped by handler");
                inner.disarm(listener);
            }
        }

        tracing::trace!(index, %types, delivered, "event triggered");
        delivered
    }
}
