//! Blocking wait for a single callback result.

use crate::error::{Error, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

enum Wake<T> {
    Value { generation: u64, value: T },
    Interrupt { generation: u64 },
}

struct Shared {
    parked: AtomicBool,
    generation: AtomicU64,
}

/// How a park ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wakeup<T> {
    Unparked(T),
    /// Another park was already in progress; this call did not wait.
    AlreadyParked,
    TimedOut,
}

impl<T> Wakeup<T> {
    pub fn into_value(self) -> Option<T> {
        match self {
            Wakeup::Unparked(value) => Some(value),
            _ => None,
        }
    }
}

/// Wakes the park it was created for. Unparking a finished park is inert.
pub struct Unparker<T> {
    sender: Sender<Wake<T>>,
    shared: Arc<Shared>,
    generation: u64,
}

impl<T> Clone for Unparker<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            shared: Arc::clone(&self.shared),
            generation: self.generation,
        }
    }
}

impl<T> Unparker<T> {
    pub fn unpark(&self, value: T) -> bool {
        if !self.shared.parked.load(Ordering::SeqCst)
            || self.shared.generation.load(Ordering::SeqCst) != self.generation
        {
            return false;
        }
        self.sender
            .try_send(Wake::Value {
                generation: self.generation,
                value,
            })
            .is_ok()
    }
}

/// Single-slot counterpart of [`LatchCoordinator`](super::LatchCoordinator).
pub struct ParkCoordinator<T> {
    sender: Sender<Wake<T>>,
    receiver: Receiver<Wake<T>>,
    shared: Arc<Shared>,
}

impl<T> Clone for ParkCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for ParkCoordinator<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct ParkGuard<'a>(&'a Shared);

impl Drop for ParkGuard<'_> {
    fn drop(&mut self) {
        self.0.generation.fetch_add(1, Ordering::SeqCst);
        self.0.parked.store(false, Ordering::SeqCst);
    }
}

impl<T> ParkCoordinator<T> {
    pub fn new() -> Self {
        // One value slot plus room for an interrupt.
        let (sender, receiver) = bounded(2);
        Self {
            sender,
            receiver,
            shared: Arc::new(Shared {
                parked: AtomicBool::new(false),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn is_parked(&self) -> bool {
        self.shared.parked.load(Ordering::SeqCst)
    }

    /// Blocks until [`unpark`](Self::unpark) is called.
    pub fn park(&self) -> Result<Wakeup<T>> {
        self.park_and_exec(|_| {})
    }

    pub fn park_timeout(&self, timeout: Duration) -> Result<Wakeup<T>> {
        self.park_and_exec_timeout(timeout, |_| {})
    }

    /// Arms the park, runs `launch` with an [`Unparker`], then blocks.
    ///
    /// Arming first means an unpark fired from inside `launch`, or from a
    /// thread it starts, is never lost.
    pub fn park_and_exec<F>(&self, launch: F) -> Result<Wakeup<T>>
    where
        F: FnOnce(Unparker<T>),
    {
        self.park_inner(None, launch)
    }

    pub fn park_and_exec_timeout<F>(&self, timeout: Duration, launch: F) -> Result<Wakeup<T>>
    where
        F: FnOnce(Unparker<T>),
    {
        self.park_inner(Some(Instant::now() + timeout), launch)
    }

    /// Wakes the current park. Returns false, doing nothing, when nobody is
    /// parked.
    pub fn unpark(&self, value: T) -> bool {
        self.unparker().unpark(value)
    }

    /// Makes the current park fail with `InterruptedWait`. Returns false,
    /// doing nothing, when nobody is parked.
    pub fn interrupt(&self) -> bool {
        let generation = self.shared.generation.load(Ordering::SeqCst);
        if !self.shared.parked.load(Ordering::SeqCst) {
            return false;
        }
        if self.sender.try_send(Wake::Interrupt { generation }).is_err() {
            debug!("Park interrupt already pending");
            return false;
        }
        true
    }

    fn unparker(&self) -> Unparker<T> {
        Unparker {
            sender: self.sender.clone(),
            shared: Arc::clone(&self.shared),
            generation: self.shared.generation.load(Ordering::SeqCst),
        }
    }

    fn park_inner<F>(&self, deadline: Option<Instant>, launch: F) -> Result<Wakeup<T>>
    where
        F: FnOnce(Unparker<T>),
    {
        if self
            .shared
            .parked
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(Wakeup::AlreadyParked);
        }
        let _guard = ParkGuard(&self.shared);
        let generation = self.shared.generation.load(Ordering::SeqCst);

        launch(self.unparker());

        loop {
            let wake = match deadline {
                None => self.receiver.recv().map_err(|_| Error::InterruptedWait)?,
                Some(deadline) => match self.receiver.recv_deadline(deadline) {
                    Ok(wake) => wake,
                    Err(RecvTimeoutError::Timeout) => return Ok(Wakeup::TimedOut),
                    Err(RecvTimeoutError::Disconnected) => return Err(Error::InterruptedWait),
                },
            };
            match wake {
                Wake::Interrupt { generation: g } if g == generation => {
                    return Err(Error::InterruptedWait)
                }
                Wake::Interrupt { generation: g } => {
                    debug!("Discarding stale park interrupt from generation {g}");
                }
                Wake::Value {
                    generation: g,
                    value,
                } if g == generation => return Ok(Wakeup::Unparked(value)),
                Wake::Value { generation: g, .. } => {
                    debug!("Discarding stale unpark from generation {g}");
                }
            }
        }
    }
}
