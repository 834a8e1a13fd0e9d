// SPDX-License-Identifier: MIT

use super::*;
use std::cell::RefCell;
use std::rc::Rc;

fn raw(bytes: &[u8]) -> Payload {
    Payload::Raw(Rc::from(bytes))
}

#[test]
fn sync_emit_delivers_inline_in_subscription_order() {
    let registry = BusRegistry::new();
    let started = registry.intern("started").expect("intern");
    let order = Rc::new(RefCell::new(Vec::new()));

    for id in 0..3 {
        let order_cb = order.clone();
        registry
            .global()
            .add_watch(Mask::bit(started.0), Box::new(move |_, _| order_cb.borrow_mut().push(id)));
    }

    registry.emit_sync(started, raw(b"x"));
    assert_eq!(*order.borrow(), vec![0, 1, 2]);
}

#[test]
fn watch_only_fires_for_subscribed_ids() {
    let registry = BusRegistry::new();
    let started = registry.intern("started").expect("intern");
    let stopped = registry.intern("stopped").expect("intern");
    let count = Rc::new(RefCell::new(0));
    let cb = count.clone();
    registry.global().add_watch(Mask::bit(started.0), Box::new(move |_, _| *cb.borrow_mut() += 1));

    registry.emit_sync(stopped, raw(b"x"));
    assert_eq!(*count.borrow(), 0);
    registry.emit_sync(started, raw(b"x"));
    assert_eq!(*count.borrow(), 1);
}

#[test]
fn async_emit_is_queued_until_drained() {
    let registry = BusRegistry::new();
    let stopped = registry.intern("stopped").expect("intern");
    let count = Rc::new(RefCell::new(0));
    let cb = count.clone();
    registry
        .named_bus("launcher")
        .add_watch(Mask::bit(stopped.0), Box::new(move |_, _| *cb.borrow_mut() += 1));

    registry.emit_async("launcher", stopped, raw(b"x"));
    assert_eq!(*count.borrow(), 0, "async emit must not deliver inline");
    assert_eq!(registry.pending_len(), 1);

    registry.drain_pending();
    assert_eq!(*count.borrow(), 1);
    assert_eq!(registry.pending_len(), 0);
}

#[test]
fn reentrant_emit_from_within_a_subscriber_is_safe() {
    // A subscriber to "tick" emits "started" itself, on the same bus,
    // before returning. Nothing here is an outer RefCell borrow still
    // held across that reentrant call, so it must not panic.
    let registry = Rc::new(BusRegistry::new());
    let tick = registry.intern("tick").expect("intern");
    let started = registry.intern("started").expect("intern");

    let inner_ran = Rc::new(RefCell::new(false));
    let inner_flag = inner_ran.clone();
    let inner_registry = registry.clone();
    registry
        .global()
        .add_watch(Mask::bit(started.0), Box::new(move |_, _| *inner_flag.borrow_mut() = true));

    let outer_registry = registry.clone();
    registry.global().add_watch(
        Mask::bit(tick.0),
        Box::new(move |_, _| {
            outer_registry.emit_sync(started, raw(b"nested"));
        }),
    );

    registry.emit_sync(tick, raw(b"x"));
    assert!(*inner_ran.borrow(), "reentrant emit must still reach its subscriber");
}

#[test]
fn unsubscribing_a_later_watch_from_an_earlier_ones_callback_is_tombstoned_not_observed() {
    let registry = Rc::new(BusRegistry::new());
    let tick = registry.intern("tick").expect("intern");
    let bus = registry.global();

    let later_ran = Rc::new(RefCell::new(false));
    let later_flag = later_ran.clone();
    let later_key = bus.add_watch(Mask::bit(tick.0), Box::new(move |_, _| *later_flag.borrow_mut() = true));

    let bus_for_closure = registry.clone();
    bus.add_watch(
        Mask::bit(tick.0),
        Box::new(move |_, _| {
            bus_for_closure.global().del_watch(later_key);
        }),
    );

    registry.emit_sync(tick, raw(b"x"));
    // This emit's own snapshot was taken before the deletion, so the
    // later watch (registered before this emit started) still runs once.
    assert!(*later_ran.borrow());
    assert!(!bus.is_live(later_key), "deletion mid-emit must still take effect once busy returns to 0");
}

#[test]
fn event_interner_returns_the_same_id_for_the_same_name() {
    let registry = BusRegistry::new();
    let a = registry.intern("started").expect("intern");
    let b = registry.intern("started").expect("intern");
    assert_eq!(a, b);
}

#[test]
fn interner_rejects_the_event_past_the_mask_width() {
    let registry = BusRegistry::new();
    for i in 0..MAX_EVENTS {
        registry.intern(&format!("event-{i}")).expect("intern under the cap");
    }
    assert!(registry.intern("one-too-many").is_err());
}
