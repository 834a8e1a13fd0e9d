// SPDX-License-Identifier: MIT

//! In-process event bus (spec §4.1, §9).
//!
//! A bus is a list of `{event-mask, callback}` watches plus a `busy`
//! reentrancy counter: a subscriber that emits another event (on this bus
//! or another) or unsubscribes a watch while already inside an emit must
//! not observe a half-iterated collection. Every mutable field here is
//! therefore behind `RefCell`/`Cell` and every public method takes `&self`
//! — a subscriber callback is free to re-enter through a cloned `Rc<Bus>`
//! (or `Rc<BusRegistry>`) without tripping Rust's aliasing rules, because
//! no borrow is ever held across the invocation of a callback: each watch
//! entry's callback is *taken* out of its `RefCell` before being called
//! and put back afterwards (skipped if the watch was deleted in the
//! meantime). Deletions made while `busy > 0` only tombstone the watch
//! (via the arena's `mark_dead`) and are swept once `busy` returns to zero.
//!
//! One *global* bus exists for synchronous, transport-free delivery; any
//! number of additional *named* buses can be created for asynchronous,
//! queued delivery.
//!
//! The source lets synchronous emits pass a `NULL` bus to mean "the global
//! bus", which makes `emit(NULL, id, ASYNC, data)` a runtime error instead
//! of a compile error. This port splits emission into two functions
//! instead: [`BusRegistry::emit_sync`] always targets the implicit global
//! bus and never takes a bus name, while [`BusRegistry::emit_async`]
//! always requires one. There is no signature through which "asynchronous
//! and busless" can be expressed, so that combination is rejected at the
//! type level rather than checked at runtime.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use iotfw_core::{Arena, Key, Mask};

use crate::error::{ReactorError, Result};

/// Maximum distinct event names a single process may intern. Bounded by
/// [`Mask`]'s width, since a watch's subscription is a bitmask over ids.
pub const MAX_EVENTS: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(u32);

#[derive(Default)]
struct EventInterner {
    names: Vec<Rc<str>>,
    index: HashMap<Rc<str>, EventId>,
}

impl EventInterner {
    fn intern(&mut self, name: &str) -> Result<EventId> {
        if let Some(&id) = self.index.get(name) {
            return Ok(id);
        }
        if self.names.len() >= MAX_EVENTS {
            return Err(ReactorError::Resource("event-id table exhausted".into()));
        }
        let id = EventId(self.names.len() as u32);
        let rc: Rc<str> = Rc::from(name);
        self.names.push(rc.clone());
        self.index.insert(rc, id);
        Ok(id)
    }

    fn name(&self, id: EventId) -> Option<Rc<str>> {
        self.names.get(id.0 as usize).cloned()
    }
}

/// An event payload, ref-counted so the same value can be handed to many
/// subscribers (synchronously) or parked on the pending queue (for async
/// delivery) without cloning the underlying bytes/JSON.
#[derive(Debug, Clone)]
pub enum Payload {
    Raw(Rc<[u8]>),
    Json(Rc<serde_json::Value>),
}

pub type EventCallback = Box<dyn FnMut(EventId, &Payload) + 'static>;

struct Watch {
    mask: Mask,
    callback: RefCell<Option<EventCallback>>,
}

/// A single bus: a subscriber list plus reentrancy bookkeeping. All
/// interior state so every method can take `&self`.
pub struct Bus {
    watches: RefCell<Arena<Watch>>,
    busy: Cell<u32>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    pub fn new() -> Self {
        Self { watches: RefCell::new(Arena::new()), busy: Cell::new(0) }
    }

    pub fn add_watch(&self, mask: Mask, callback: EventCallback) -> Key {
        self.watches.borrow_mut().insert(Watch { mask, callback: RefCell::new(Some(callback)) })
    }

    pub fn del_watch(&self, key: Key) {
        self.watches.borrow_mut().mark_dead(key);
        if self.busy.get() == 0 {
            self.watches.borrow_mut().sweep();
        }
    }

    /// Deliver `id`/`payload` to every subscriber whose mask matches, in
    /// subscription order. Subscribers added or removed by a callback
    /// invoked during this pass are not observed by this pass.
    pub fn emit(&self, id: EventId, payload: &Payload) {
        self.busy.set(self.busy.get() + 1);

        let due: Vec<Key> = {
            let arena = self.watches.borrow();
            arena.iter_live().filter(|(_, w)| w.mask.test(id.0)).map(|(key, _)| key).collect()
        };

        for key in due {
            let taken = {
                let arena = self.watches.borrow();
                arena.get(key).and_then(|w| w.callback.borrow_mut().take())
            };
            let Some(mut callback) = taken else { continue };
            callback(id, payload);
            // Put the callback back only if the watch is still live: it
            // may have been deleted reentrantly while it ran.
            let arena = self.watches.borrow();
            if let Some(watch) = arena.get(key) {
                *watch.callback.borrow_mut() = Some(callback);
            }
        }

        self.busy.set(self.busy.get() - 1);
        if self.busy.get() == 0 {
            self.watches.borrow_mut().sweep();
        }
    }

    pub fn is_live(&self, key: Key) -> bool {
        self.watches.borrow().is_live(key)
    }

    pub fn watch_count(&self) -> usize {
        self.watches.borrow().len_live()
    }
}

struct PendingEvent {
    bus: String,
    id: EventId,
    payload: Payload,
}

/// Owns the global bus, every named bus, the process-wide event-id table,
/// and the FIFO queue that asynchronous emits land on. Every method takes
/// `&self`; hand this out as `Rc<BusRegistry>` so callbacks can re-enter it.
pub struct BusRegistry {
    interner: RefCell<EventInterner>,
    global: Bus,
    named: RefCell<HashMap<String, Rc<Bus>>>,
    pending: RefCell<VecDeque<PendingEvent>>,
}

impl Default for BusRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BusRegistry {
    pub fn new() -> Self {
        Self {
            interner: RefCell::new(EventInterner::default()),
            global: Bus::new(),
            named: RefCell::new(HashMap::new()),
            pending: RefCell::new(VecDeque::new()),
        }
    }

    pub fn intern(&self, name: &str) -> Result<EventId> {
        self.interner.borrow_mut().intern(name)
    }

    pub fn event_name(&self, id: EventId) -> Option<Rc<str>> {
        self.interner.borrow().name(id)
    }

    pub fn global(&self) -> &Bus {
        &self.global
    }

    pub fn named_bus(&self, name: &str) -> Rc<Bus> {
        self.named.borrow_mut().entry(name.to_string()).or_insert_with(|| Rc::new(Bus::new())).clone()
    }

    /// Emit on the global bus. Subscribers run inline, in subscription
    /// order, before this call returns.
    pub fn emit_sync(&self, id: EventId, payload: Payload) {
        self.global.emit(id, &payload);
    }

    /// Queue an emit on a named bus for delivery by the next
    /// [`BusRegistry::drain_pending`] call (normally driven by the
    /// reactor's pump deferred). FIFO across all buses, not per-bus.
    pub fn emit_async(&self, bus: &str, id: EventId, payload: Payload) {
        self.named_bus(bus);
        self.pending.borrow_mut().push_back(PendingEvent { bus: bus.to_string(), id, payload });
    }

    pub fn pending_len(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Deliver every currently-queued event, in FIFO order. Events queued
    /// by a subscriber during this drain are left for the next pump pass
    /// rather than delivered immediately, since the queue is snapshotted
    /// by length up front.
    pub fn drain_pending(&self) {
        let mut remaining = self.pending.borrow().len();
        while remaining > 0 {
            let Some(event) = self.pending.borrow_mut().pop_front() else { break };
            if let Some(bus) = self.named.borrow().get(&event.bus).cloned() {
                bus.emit(event.id, &event.payload);
            }
            remaining -= 1;
        }
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
