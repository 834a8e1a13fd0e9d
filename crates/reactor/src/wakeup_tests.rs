// SPDX-License-Identifier: MIT

use super::*;
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn fires_only_for_a_matching_reason() {
    let wakeups = WakeupTable::new();
    let count = Rc::new(RefCell::new(0));
    let cb = count.clone();
    wakeups.add(Mask::bit(WAKEUP_IO), None, None, Box::new(move |_| *cb.borrow_mut() += 1)).expect("add");

    wakeups.fire_for_reason(Mask::bit(WAKEUP_TIMER), 0);
    assert_eq!(*count.borrow(), 0, "an io-only wakeup must ignore a timer-driven reason");

    wakeups.fire_for_reason(Mask::bit(WAKEUP_IO), 0);
    assert_eq!(*count.borrow(), 1);
}

#[test]
fn with_no_lpf_every_matching_reason_fires() {
    let wakeups = WakeupTable::new();
    let count = Rc::new(RefCell::new(0));
    let cb = count.clone();
    wakeups.add(Mask::bit(WAKEUP_IO), None, None, Box::new(move |_| *cb.borrow_mut() += 1)).expect("add");

    wakeups.fire_for_reason(Mask::bit(WAKEUP_IO), 0);
    wakeups.fire_for_reason(Mask::bit(WAKEUP_IO), 1);
    wakeups.fire_for_reason(Mask::bit(WAKEUP_IO), 2);
    assert_eq!(*count.borrow(), 3);
}

#[test]
fn lpf_throttles_firings_within_the_window() {
    let wakeups = WakeupTable::new();
    let count = Rc::new(RefCell::new(0));
    let cb = count.clone();
    wakeups.add(Mask::bit(WAKEUP_IO), Some(10), None, Box::new(move |_| *cb.borrow_mut() += 1)).expect("add");

    wakeups.fire_for_reason(Mask::bit(WAKEUP_IO), 0);
    assert_eq!(*count.borrow(), 1, "first matching reason always fires");

    wakeups.fire_for_reason(Mask::bit(WAKEUP_IO), 5_000);
    assert_eq!(*count.borrow(), 1, "still inside the 10ms low-pass window");

    wakeups.fire_for_reason(Mask::bit(WAKEUP_IO), 11_000);
    assert_eq!(*count.borrow(), 2, "window elapsed, so this reason fires directly");
}

#[test]
fn a_throttled_request_coalesces_into_one_forced_firing() {
    let wakeups = WakeupTable::new();
    let count = Rc::new(RefCell::new(0));
    let cb = count.clone();
    wakeups.add(Mask::bit(WAKEUP_IO), Some(10), Some(50), Box::new(move |_| *cb.borrow_mut() += 1)).expect("add");

    wakeups.fire_for_reason(Mask::bit(WAKEUP_IO), 0);
    assert_eq!(*count.borrow(), 1);

    // Every one of these arrives inside the low-pass window, so none fires
    // directly, but the force window schedules exactly one catch-up.
    wakeups.fire_for_reason(Mask::bit(WAKEUP_IO), 5_000);
    wakeups.fire_for_reason(Mask::bit(WAKEUP_IO), 8_000);
    wakeups.fire_for_reason(Mask::bit(WAKEUP_IO), 9_000);
    assert_eq!(*count.borrow(), 1, "coalesced requests must not fire immediately");

    wakeups.fire_due(49_999);
    assert_eq!(*count.borrow(), 1, "forced deadline has not arrived yet");

    wakeups.fire_due(50_000);
    assert_eq!(*count.borrow(), 2, "the coalesced request fires exactly once at the forced deadline");
}

#[test]
fn deleting_a_wakeup_cancels_its_pending_forced_firing() {
    let wakeups = WakeupTable::new();
    let count = Rc::new(RefCell::new(0));
    let cb = count.clone();
    let key = wakeups.add(Mask::bit(WAKEUP_IO), Some(10), Some(50), Box::new(move |_| *cb.borrow_mut() += 1)).expect("add");

    wakeups.fire_for_reason(Mask::bit(WAKEUP_IO), 0);
    wakeups.fire_for_reason(Mask::bit(WAKEUP_IO), 5_000);
    wakeups.del(key);

    wakeups.fire_due(50_000);
    assert_eq!(*count.borrow(), 1, "the cancelled wakeup must not fire its forced catch-up");
    assert!(!wakeups.is_live(key));
}

#[test]
fn force_ms_less_than_lpf_ms_is_rejected() {
    let wakeups = WakeupTable::new();
    let err = wakeups.add(Mask::bit(WAKEUP_IO), Some(100), Some(10), Box::new(|_| {}));
    assert!(err.is_err());
}

#[test]
fn empty_event_mask_is_rejected() {
    let wakeups = WakeupTable::new();
    let err = wakeups.add(Mask::empty(), None, None, Box::new(|_| {}));
    assert!(err.is_err());
}

#[test]
fn a_wakeup_callback_may_delete_a_sibling_mid_notify() {
    let wakeups = WakeupTable::new();
    let ran: Rc<RefCell<Vec<u32>>> = Rc::new(RefCell::new(Vec::new()));

    let victim_key = Rc::new(RefCell::new(None));
    let victim_for_first = victim_key.clone();
    let ran_first = ran.clone();
    wakeups
        .add(
            Mask::bit(WAKEUP_IO),
            None,
            None,
            Box::new(move |table| {
                ran_first.borrow_mut().push(1);
                if let Some(key) = *victim_for_first.borrow() {
                    table.del(key);
                }
            }),
        )
        .expect("add first");

    let ran_second = ran.clone();
    let key = wakeups.add(Mask::bit(WAKEUP_IO), None, None, Box::new(move |_| ran_second.borrow_mut().push(2))).expect("add second");
    *victim_key.borrow_mut() = Some(key);

    wakeups.fire_for_reason(Mask::bit(WAKEUP_IO), 0);

    assert_eq!(*ran.borrow(), vec![1], "the deleted sibling must never run");
    assert!(!wakeups.is_live(key));
}
