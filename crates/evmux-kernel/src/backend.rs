//! Backend contract.
//!
//! The backend is whatever actually raises events (typically a hardware
//! interrupt source).  The registry drives it through three hooks:
//!
//! | Hook | When | Lock held |
//! |------|------|-----------|
//! | [`Backend::check`] | once per registration attempt, before any state change | none |
//! | [`Backend::enable`] | each 0→1 transition of an (index, type) refcount | refs lock |
//! | [`Backend::disable`] | each 1→0 transition of an (index, type) refcount | refs lock |
//!
//! `enable` and `disable` always receive a single-bit mask.  They run while
//! the refs lock is held and may additionally be reached from inside a
//! dispatch (when a handler asks to be dropped), so they must not block,
//! must not allocate in a way that can sleep, must not panic, and must not
//! call back into the registry.

use crate::error::Result;
use crate::mask::EventMask;

/// Hooks the registry invokes on reference-count transitions and admission.
///
/// Every method has a default: `enable`/`disable` do nothing and `check`
/// admits everything, so a backend only implements the hooks it needs.
pub trait Backend: Send + Sync {
    /// First armed listener for `(index, mask)` appeared.
    fn enable(&self, mask: EventMask, index: usize) {
        let _ = (mask, index);
    }

    /// Last armed listener for `(index, mask)` went away.
    fn disable(&self, mask: EventMask, index: usize) {
        let _ = (mask, index);
    }

    /// Decide whether `types` may be registered on `index` at all.
    ///
    /// Whatever error is returned reaches the caller of
    /// [`EventRegistry::register`](crate::registry::EventRegistry::register)
    /// unchanged; backends normally return
    /// [`EventError::AdmissionDenied`](crate::error::EventError::AdmissionDenied).
    fn check(&self, types: EventMask, index: usize) -> Result<()> {
        let _ = (types, index);
        Ok(())
    }
}

/// Backend with no hooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBackend;

impl Backend for NullBackend {}
