// SPDX-License-Identifier: MIT

use super::*;
use crate::io::IoTable;
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn adding_a_handler_blocks_the_signal_process_wide() {
    let mut signals = SignalTable::new();
    assert!(!signals.is_blocked(Signal::SIGUSR1));
    signals.add(Signal::SIGUSR1, Box::new(|_| {})).expect("add");
    assert!(signals.is_blocked(Signal::SIGUSR1));
}

#[test]
fn raised_signal_is_delivered_through_the_signalfd() {
    let mut signals = SignalTable::new();
    let io = IoTable::new(0).expect("io table");
    let got = Rc::new(RefCell::new(None));
    let got_cb = got.clone();

    signals
        .add(Signal::SIGUSR2, Box::new(move |sig| *got_cb.borrow_mut() = Some(sig)))
        .expect("add");
    signals.attach(&io).expect("attach");

    nix::sys::signal::raise(Signal::SIGUSR2).expect("raise");
    io.dispatch(Some(0)).expect("dispatch");
    assert!(signals.take_ready());
    signals.drain().expect("drain");

    assert_eq!(*got.borrow(), Some(Signal::SIGUSR2));
}

#[test]
fn removing_the_last_handler_for_a_signal_unblocks_it() {
    let mut signals = SignalTable::new();
    let key = signals.add(Signal::SIGUSR1, Box::new(|_| {})).expect("add");
    signals.del(key).expect("del");
    assert!(!signals.is_blocked(Signal::SIGUSR1));
}

#[test]
fn two_handlers_on_the_same_signal_both_fire() {
    let mut signals = SignalTable::new();
    let io = IoTable::new(0).expect("io table");
    let count = Rc::new(RefCell::new(0));
    let a = count.clone();
    let b = count.clone();
    signals.add(Signal::SIGUSR1, Box::new(move |_| *a.borrow_mut() += 1)).expect("add a");
    signals.add(Signal::SIGUSR1, Box::new(move |_| *b.borrow_mut() += 1)).expect("add b");
    signals.attach(&io).expect("attach");

    nix::sys::signal::raise(Signal::SIGUSR1).expect("raise");
    io.dispatch(Some(0)).expect("dispatch");
    signals.drain().expect("drain");

    assert_eq!(*count.borrow(), 2);
}
