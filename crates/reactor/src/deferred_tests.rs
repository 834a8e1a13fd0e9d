// SPDX-License-Identifier: MIT

use super::*;
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn enabled_deferred_runs_once_then_disables_itself() {
    let table = DeferredTable::new();
    let count = Rc::new(RefCell::new(0));
    let cb = count.clone();
    let key = table.add(true, Box::new(move |_| *cb.borrow_mut() += 1));

    table.run_pending();
    assert_eq!(*count.borrow(), 1);
    assert!(!table.is_enabled(key));

    table.run_pending();
    assert_eq!(*count.borrow(), 1, "must not run again until re-enabled");
}

#[test]
fn disabled_deferred_does_not_run() {
    let table = DeferredTable::new();
    let count = Rc::new(RefCell::new(0));
    let cb = count.clone();
    table.add(false, Box::new(move |_| *cb.borrow_mut() += 1));

    table.run_pending();
    assert_eq!(*count.borrow(), 0);
}

#[test]
fn multiple_deferreds_run_in_insertion_order() {
    let table = DeferredTable::new();
    let order = Rc::new(RefCell::new(Vec::new()));
    for id in 0..3 {
        let order_cb = order.clone();
        table.add(true, Box::new(move |_| order_cb.borrow_mut().push(id)));
    }
    table.run_pending();
    assert_eq!(*order.borrow(), vec![0, 1, 2]);
}

#[test]
fn deleting_a_deferred_removes_it_from_future_passes() {
    let table = DeferredTable::new();
    let count = Rc::new(RefCell::new(0));
    let cb = count.clone();
    let key = table.add(true, Box::new(move |_| *cb.borrow_mut() += 1));
    table.del(key);
    table.run_pending();
    assert_eq!(*count.borrow(), 0);
    assert!(!table.is_live(key));
}

#[test]
fn disabling_before_the_pass_runs_cancels_it() {
    let table = DeferredTable::new();
    let count = Rc::new(RefCell::new(0));
    let cb = count.clone();
    let key = table.add(true, Box::new(move |_| *cb.borrow_mut() += 1));
    table.disable(key);
    table.run_pending();
    assert_eq!(*count.borrow(), 0);
}

#[test]
fn a_deferred_callback_may_delete_a_sibling_due_in_the_same_pass() {
    let table = DeferredTable::new();
    let ran: Rc<RefCell<Vec<u32>>> = Rc::new(RefCell::new(Vec::new()));

    let victim_key = Rc::new(RefCell::new(None));
    let victim_for_first = victim_key.clone();
    let ran_first = ran.clone();
    table.add(
        true,
        Box::new(move |table| {
            ran_first.borrow_mut().push(1);
            if let Some(key) = *victim_for_first.borrow() {
                table.del(key);
            }
        }),
    );

    let ran_second = ran.clone();
    let key = table.add(true, Box::new(move |_| ran_second.borrow_mut().push(2)));
    *victim_key.borrow_mut() = Some(key);

    table.run_pending();

    assert_eq!(*ran.borrow(), vec![1], "the deleted sibling must never run");
    assert!(!table.is_live(key));
}
