//! Integration tests for the evmux-kernel crate.
//!
//! These tests drive the registry, dispatch path, backend hooks and
//! listener slot together through the public API.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use evmux_kernel::{
    Action, Backend, EventError, EventMask, EventRegistry, ListenerSlot, RegistryConfig, Result,
};

// ═══════════════════════════════════════════════════════════════════════
//  Test backend
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Enable(u32, usize),
    Disable(u32, usize),
    Check(u32, usize),
}

/// Records every hook call and refuses a configurable (types, index) pair.
#[derive(Default)]
struct RecordingBackend {
    calls: Mutex<Vec<Call>>,
    deny: Option<(u32, usize)>,
}

impl RecordingBackend {
    fn denying(types: u32, index: usize) -> Self {
        Self {
            deny: Some((types, index)),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn transitions(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::Check(..)))
            .collect()
    }

    /// enable minus disable per (index, single-bit mask).
    fn balance(&self) -> HashMap<(usize, u32), i64> {
        let mut balance = HashMap::new();
        for call in self.calls() {
            match call {
                Call::Enable(mask, index) => *balance.entry((index, mask)).or_insert(0) += 1,
                Call::Disable(mask, index) => *balance.entry((index, mask)).or_insert(0) -= 1,
                Call::Check(..) => {}
            }
        }
        balance
    }
}

impl Backend for RecordingBackend {
    fn enable(&self, mask: EventMask, index: usize) {
        self.calls.lock().unwrap().push(Call::Enable(mask.bits(), index));
    }

    fn disable(&self, mask: EventMask, index: usize) {
        self.calls.lock().unwrap().push(Call::Disable(mask.bits(), index));
    }

    fn check(&self, types: EventMask, index: usize) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Check(types.bits(), index));
        if self.deny == Some((types.bits(), index)) {
            return Err(EventError::AdmissionDenied {
                types,
                index,
                reason: "exclusive resource in use".into(),
            });
        }
        Ok(())
    }
}

fn recorder(
    log: &Arc<Mutex<Vec<&'static str>>>,
    name: &'static str,
    action: Action,
) -> impl Fn(EventMask, usize) -> Action + Send + Sync + 'static {
    let log = Arc::clone(log);
    move |_, _| {
        log.lock().unwrap().push(name);
        action
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Reference scenario
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn two_listeners_share_one_enable() {
    let backend = Arc::new(RecordingBackend::default());
    let registry = EventRegistry::with_backend(4, 1, backend.clone()).unwrap();
    let fired = Arc::new(Mutex::new(Vec::new()));

    let a = registry
        .register(EventMask::from_bits(0b0001), 0, recorder(&fired, "A", Action::Continue))
        .unwrap();
    a.arm();
    assert_eq!(backend.transitions(), vec![Call::Enable(0b0001, 0)]);

    let b = registry
        .register(EventMask::from_bits(0b0001), 0, recorder(&fired, "B", Action::Continue))
        .unwrap();
    b.arm();
    assert_eq!(backend.transitions().len(), 1);
    assert_eq!(registry.refcount(0, 0), 2);

    assert_eq!(registry.trigger(0, EventMask::from_bits(0b0001)), 2);
    assert_eq!(*fired.lock().unwrap(), vec!["A", "B"]);

    a.disarm();
    assert_eq!(backend.transitions().len(), 1);
    assert_eq!(registry.refcount(0, 0), 1);

    b.disarm();
    assert_eq!(
        backend.transitions(),
        vec![Call::Enable(0b0001, 0), Call::Disable(0b0001, 0)]
    );
    assert_eq!(registry.refcount(0, 0), 0);
}

// ═══════════════════════════════════════════════════════════════════════
//  Admission
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn denied_admission_leaves_no_trace() {
    let backend = Arc::new(RecordingBackend::denying(0b011, 2));
    let registry = EventRegistry::with_backend(4, 3, backend.clone()).unwrap();

    let err = registry
        .register(EventMask::from_bits(0b011), 2, |_: EventMask, _: usize| {
            Action::Continue
        })
        .unwrap_err();

    assert!(matches!(
        err,
        EventError::AdmissionDenied { index: 2, ref reason, .. } if reason == "exclusive resource in use"
    ));
    assert_eq!(registry.listener_count(2), 0);
    assert!(registry.stats().is_quiescent());
    assert_eq!(backend.calls(), vec![Call::Check(0b011, 2)]);
}

#[test]
fn argument_errors_skip_admission_check() {
    let backend = Arc::new(RecordingBackend::default());
    let registry = EventRegistry::with_backend(4, 1, backend.clone()).unwrap();
    let noop = |_: EventMask, _: usize| Action::Continue;

    assert!(matches!(
        registry.register(EventMask::bit(4), 0, noop),
        Err(EventError::InvalidTypes { types_nr: 4, .. })
    ));
    assert!(matches!(
        registry.register(EventMask::bit(0), 1, noop),
        Err(EventError::InvalidIndex { index: 1, index_nr: 1 })
    ));
    assert!(backend.calls().is_empty());
}

#[test]
fn admitted_registration_checks_once() {
    let backend = Arc::new(RecordingBackend::denying(0b011, 2));
    let registry = EventRegistry::with_backend(4, 3, backend.clone()).unwrap();

    let _listener = registry
        .register(EventMask::from_bits(0b011), 1, |_: EventMask, _: usize| {
            Action::Continue
        })
        .unwrap();

    assert_eq!(backend.calls(), vec![Call::Check(0b011, 1)]);
    assert_eq!(registry.listener_count(1), 1);
}

// ═══════════════════════════════════════════════════════════════════════
//  Ordering, drop and teardown
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn firing_follows_registration_order_not_arm_order() {
    let registry = EventRegistry::new(4, 1).unwrap();
    let fired = Arc::new(Mutex::new(Vec::new()));

    let first = registry
        .register(EventMask::bit(1), 0, recorder(&fired, "first", Action::Continue))
        .unwrap();
    let second = registry
        .register(EventMask::bit(1), 0, recorder(&fired, "second", Action::Continue))
        .unwrap();
    let third = registry
        .register(EventMask::bit(1), 0, recorder(&fired, "third", Action::Continue))
        .unwrap();

    third.arm();
    first.arm();
    second.arm();
    first.disarm();
    first.arm();

    registry.trigger(0, EventMask::bit(1));
    assert_eq!(*fired.lock().unwrap(), vec!["first", "second", "third"]);
}

#[test]
fn dropped_listener_is_disarmed_until_rearmed() {
    let backend = Arc::new(RecordingBackend::default());
    let registry = EventRegistry::with_backend(4, 1, backend.clone()).unwrap();
    let fired = Arc::new(Mutex::new(Vec::new()));

    let oneshot = registry
        .register(EventMask::bit(2), 0, recorder(&fired, "oneshot", Action::Drop))
        .unwrap();
    let steady = registry
        .register(EventMask::bit(2), 0, recorder(&fired, "steady", Action::Continue))
        .unwrap();
    oneshot.arm();
    steady.arm();

    registry.trigger(0, EventMask::bit(2));
    registry.trigger(0, EventMask::bit(2));

    assert_eq!(*fired.lock().unwrap(), vec!["oneshot", "steady", "steady"]);
    assert!(!oneshot.is_armed());
    assert_eq!(registry.refcount(0, 2), 1);
    // steady still holds the type, so no disable yet.
    assert_eq!(backend.transitions(), vec![Call::Enable(0b100, 0)]);

    oneshot.arm();
    registry.trigger(0, EventMask::bit(2));
    assert_eq!(fired.lock().unwrap().len(), 5);
}

#[test]
fn last_drop_disables_from_inside_dispatch() {
    let backend = Arc::new(RecordingBackend::default());
    let registry = EventRegistry::with_backend(4, 1, backend.clone()).unwrap();

    let listener = registry
        .register(EventMask::from_bits(0b11), 0, |_: EventMask, _: usize| Action::Drop)
        .unwrap();
    listener.arm();

    registry.trigger(0, EventMask::bit(0));

    assert_eq!(
        backend.transitions(),
        vec![
            Call::Enable(0b01, 0),
            Call::Enable(0b10, 0),
            Call::Disable(0b01, 0),
            Call::Disable(0b10, 0),
        ]
    );
}

#[test]
fn no_delivery_after_unregister() {
    let registry = EventRegistry::new(4, 1).unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);

    let listener = registry
        .register(EventMask::all(4), 0, move |_: EventMask, _: usize| {
            h.fetch_add(1, Ordering::SeqCst);
            Action::Continue
        })
        .unwrap();
    listener.arm();
    registry.trigger(0, EventMask::all(4));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    listener.unregister();
    assert_eq!(registry.trigger(0, EventMask::all(4)), 0);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(registry.stats().is_quiescent());
}

#[test]
fn slot_swap_tears_down_old_registration() {
    let backend = Arc::new(RecordingBackend::default());
    let registry = EventRegistry::with_backend(4, 2, backend.clone()).unwrap();
    let mut slot = ListenerSlot::new();

    let first = registry
        .register(EventMask::bit(0), 1, |_: EventMask, _: usize| Action::Continue)
        .unwrap();
    first.arm();
    slot.set(first);

    let second = registry
        .register(EventMask::bit(1), 1, |_: EventMask, _: usize| Action::Continue)
        .unwrap();
    second.arm();
    slot.set(second);

    assert_eq!(registry.listener_count(1), 1);
    assert_eq!(
        backend.transitions(),
        vec![
            Call::Enable(0b01, 1),
            Call::Enable(0b10, 1),
            Call::Disable(0b01, 1),
        ]
    );

    slot.clear();
    assert!(registry.stats().is_quiescent());
}

#[test]
fn registry_from_toml_config() {
    let config: RegistryConfig = toml::from_str("types_nr = 8\nindex_nr = 4").unwrap();
    let registry =
        EventRegistry::from_config(&config, Arc::new(RecordingBackend::default())).unwrap();
    assert_eq!(registry.types_nr(), 8);
    assert_eq!(registry.index_nr(), 4);
}

// ═══════════════════════════════════════════════════════════════════════
//  Concurrency
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn racing_arms_enable_once() {
    let backend = Arc::new(RecordingBackend::default());
    let registry = EventRegistry::with_backend(4, 1, backend.clone()).unwrap();
    let listener = registry
        .register(EventMask::from_bits(0b1011), 0, |_: EventMask, _: usize| {
            Action::Continue
        })
        .unwrap();

    let barrier = Barrier::new(8);
    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                barrier.wait();
                listener.arm();
            });
        }
    });

    assert_eq!(backend.transitions().len(), 3);
    assert_eq!(registry.refcount(0, 0), 1);
    assert_eq!(registry.refcount(0, 1), 1);
    assert_eq!(registry.refcount(0, 3), 1);
}

#[test]
fn refcounts_balance_under_concurrent_arm_disarm() {
    let backend = Arc::new(RecordingBackend::default());
    let registry = EventRegistry::with_backend(4, 2, backend.clone()).unwrap();

    thread::scope(|s| {
        for worker in 0..6usize {
            let registry = registry.clone();
            s.spawn(move || {
                let types = EventMask::from_bits(1 + (worker as u32 % 15));
                let listener = registry
                    .register(types, worker % 2, |_: EventMask, _: usize| Action::Continue)
                    .unwrap();
                for round in 0..200 {
                    listener.arm();
                    if round % 3 == 0 {
                        registry.trigger(worker % 2, EventMask::all(4));
                    }
                    listener.disarm();
                }
            });
        }
    });

    assert!(registry.stats().is_quiescent());
    assert_eq!(registry.stats().total_listeners(), 0);
    for (key, balance) in backend.balance() {
        assert_eq!(balance, 0, "unbalanced enable/disable for {key:?}");
    }
}

#[test]
fn enable_disable_difference_never_exceeds_one() {
    let backend = Arc::new(RecordingBackend::default());
    let registry = EventRegistry::with_backend(2, 1, backend.clone()).unwrap();
    let listeners: Vec<_> = (0..4)
        .map(|_| {
            registry
                .register(EventMask::bit(0), 0, |_: EventMask, _: usize| Action::Continue)
                .unwrap()
        })
        .collect();

    thread::scope(|s| {
        for listener in &listeners {
            s.spawn(move || {
                for _ in 0..500 {
                    listener.arm();
                    listener.disarm();
                }
            });
        }
    });

    let mut running = 0i64;
    for call in backend.transitions() {
        match call {
            Call::Enable(..) => running += 1,
            Call::Disable(..) => running -= 1,
            Call::Check(..) => {}
        }
        assert!((0..=1).contains(&running), "enable/disable interleaving broke: {running}");
    }
    assert_eq!(running, 0);
}

#[test]
fn trigger_races_with_register_and_unregister() {
    let registry = EventRegistry::new(4, 1).unwrap();
    let delivered = Arc::new(AtomicUsize::new(0));

    let stable = {
        let d = Arc::clone(&delivered);
        registry
            .register(EventMask::bit(0), 0, move |_: EventMask, _: usize| {
                d.fetch_add(1, Ordering::Relaxed);
                Action::Continue
            })
            .unwrap()
    };
    stable.arm();

    thread::scope(|s| {
        let churn = registry.clone();
        s.spawn(move || {
            for _ in 0..500 {
                let l = churn
                    .register(EventMask::bit(0), 0, |_: EventMask, _: usize| Action::Drop)
                    .unwrap();
                l.arm();
                l.unregister();
            }
        });

        let firing = registry.clone();
        s.spawn(move || {
            for _ in 0..500 {
                assert!(firing.trigger(0, EventMask::bit(0)) >= 1);
            }
        });
    });

    assert_eq!(delivered.load(Ordering::Relaxed), 500);
    assert_eq!(registry.listener_count(0), 1);
    assert_eq!(registry.refcount(0, 0), 1);
}
