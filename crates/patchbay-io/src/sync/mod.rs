//! Bridges callback-based hardware operations to blocking orchestration code.
//!
//! Both coordinators are built on crossbeam channels: waiting for N results
//! is receiving N times. Waits accept an optional timeout and can be
//! interrupted from another thread, which surfaces as
//! [`Error::InterruptedWait`](crate::Error::InterruptedWait).

mod latch;
mod park;

pub use latch::{Completer, LatchCoordinator, Latched};
pub use park::{ParkCoordinator, Unparker, Wakeup};
