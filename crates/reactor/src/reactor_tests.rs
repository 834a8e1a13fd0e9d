// SPDX-License-Identifier: MIT

use super::*;
use iotfw_core::FakeClock;
use std::cell::RefCell;
use std::time::Duration;

#[test]
fn timer_fires_once_the_fake_clock_reaches_its_deadline() {
    let clock = FakeClock::new();
    let mut reactor = Reactor::with_clock(clock.clone()).expect("reactor");
    let fired = Rc::new(RefCell::new(0));
    let cb = fired.clone();
    reactor.add_timer(1_000, None, Box::new(move |_| *cb.borrow_mut() += 1)).expect("add_timer");

    reactor.iterate().expect("iterate before deadline");
    assert_eq!(*fired.borrow(), 0);

    clock.advance(Duration::from_micros(1_000));
    reactor.iterate().expect("iterate at deadline");
    assert_eq!(*fired.borrow(), 1);
}

#[test]
fn deferreds_run_before_timers_in_the_same_iteration() {
    let clock = FakeClock::new();
    let mut reactor = Reactor::with_clock(clock.clone()).expect("reactor");
    let order = Rc::new(RefCell::new(Vec::new()));

    let order_timer = order.clone();
    reactor.add_timer(0, None, Box::new(move |_| order_timer.borrow_mut().push("timer"))).expect("add_timer");
    let order_defer = order.clone();
    reactor.add_deferred(true, Box::new(move |_| order_defer.borrow_mut().push("deferred")));

    reactor.iterate().expect("iterate");
    assert_eq!(*order.borrow(), vec!["deferred", "timer"]);
}

#[test]
fn emit_async_enables_the_pump_deferred_and_delivers_on_next_iteration() {
    let clock = FakeClock::new();
    let mut reactor = Reactor::with_clock(clock).expect("reactor");
    let id = reactor.bus().intern("stopped").expect("intern");
    let got = Rc::new(RefCell::new(false));
    let got_cb = got.clone();
    reactor.bus().named_bus("launcher").add_watch(
        Mask::bit(0),
        Box::new(move |_, _| *got_cb.borrow_mut() = true),
    );

    reactor.emit_async("launcher", id, Payload::Raw(Rc::from(&b"x"[..])));
    assert!(!*got.borrow(), "must not deliver until the pump runs");

    reactor.iterate().expect("iterate");
    assert!(*got.borrow());
}

#[test]
fn quit_stops_the_run_loop_and_returns_its_exit_code() {
    let clock = FakeClock::new();
    let mut reactor = Reactor::with_clock(clock).expect("reactor");
    reactor.quit(7);
    let code = reactor.run().expect("run");
    assert_eq!(code, 7);
}

#[test]
fn compute_timeout_is_zero_while_a_deferred_is_enabled() {
    let clock = FakeClock::new();
    let mut reactor = Reactor::with_clock(clock).expect("reactor");
    reactor.add_deferred(true, Box::new(|_| {}));
    assert_eq!(reactor.compute_timeout_ms(), Some(0));
}
