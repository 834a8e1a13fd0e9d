// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! iotfw-core: collection and allocation primitives shared by the reactor,
//! transport, manifest and launcher crates — the intrusive-list/mask and
//! pool-allocator components of spec §4.1/§4.2, plus the id and clock
//! helpers every other crate builds on.

pub mod macros;

pub mod arena;
pub mod clock;
pub mod id;
pub mod mask;
pub mod pool;

pub use arena::{Arena, Key};
pub use clock::{Clock, FakeClock, SystemClock};
pub use id::{short, IdBuf, ID_MAX_LEN};
pub use mask::Mask;
pub use pool::{Pool, PoolConfig, PoolError};
