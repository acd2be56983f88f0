//! Blocking wait for N callback completions.

use crate::error::{Error, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

enum Signal<T> {
    Complete { generation: u64, result: T },
    Interrupt { generation: u64 },
}

struct Shared {
    generation: AtomicU64,
    target: AtomicUsize,
    latched: AtomicBool,
}

/// Outcome of a wait that may have timed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Latched<T> {
    /// Results in completion order.
    pub results: Vec<T>,
    /// Latches still outstanding when the wait ended.
    pub missing: usize,
}

impl<T> Latched<T> {
    pub fn is_complete(&self) -> bool {
        self.missing == 0
    }
}

/// Handed to each asynchronous operation; `complete` counts one latch down.
pub struct Completer<T> {
    sender: Sender<Signal<T>>,
    generation: u64,
}

impl<T> Clone for Completer<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            generation: self.generation,
        }
    }
}

impl<T> Completer<T> {
    pub fn complete(&self, result: T) {
        // The coordinator keeps a receiver alive, so this only fails after it
        // has been dropped, when nobody is waiting anyway.
        let _ = self.sender.send(Signal::Complete {
            generation: self.generation,
            result,
        });
    }
}

/// Turns N callback completions into one blocking call.
///
/// Every wait ends its generation, whether it completed, timed out or was
/// interrupted. Completions and interrupts from an ended generation are
/// discarded when they arrive, so stragglers from a timed-out wait never leak
/// into the next one.
pub struct LatchCoordinator<T> {
    sender: Sender<Signal<T>>,
    receiver: Receiver<Signal<T>>,
    shared: Arc<Shared>,
}

impl<T> Clone for LatchCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for LatchCoordinator<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct WaitGuard<'a>(&'a Shared);

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.0.target.store(0, Ordering::SeqCst);
        self.0.generation.fetch_add(1, Ordering::SeqCst);
        self.0.latched.store(false, Ordering::SeqCst);
    }
}

impl<T> LatchCoordinator<T> {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            shared: Arc::new(Shared {
                generation: AtomicU64::new(0),
                target: AtomicUsize::new(0),
                latched: AtomicBool::new(false),
            }),
        }
    }

    /// A completer bound to the current (or next) wait.
    pub fn completer(&self) -> Completer<T> {
        Completer {
            sender: self.sender.clone(),
            generation: self.shared.generation.load(Ordering::SeqCst),
        }
    }

    pub fn is_latched(&self) -> bool {
        self.shared.latched.load(Ordering::SeqCst)
    }

    /// Appends latches to the current wait, or to the next one if nobody is
    /// waiting. Returns the new total.
    pub fn add_latches(&self, count: usize) -> usize {
        self.shared.target.fetch_add(count, Ordering::SeqCst) + count
    }

    /// Makes the current wait fail with `InterruptedWait`. Returns false, doing
    /// nothing, when no wait is in progress.
    pub fn interrupt(&self) -> bool {
        // Generation first: if the wait ends in between, the signal is stale.
        let generation = self.shared.generation.load(Ordering::SeqCst);
        if !self.shared.latched.load(Ordering::SeqCst) {
            debug!("Latch interrupt with no wait in progress ignored");
            return false;
        }
        self.sender.send(Signal::Interrupt { generation }).is_ok()
    }

    /// Blocks until `count` completions arrive. Results are in completion order.
    pub fn request_latches(&self, count: usize) -> Result<Vec<T>> {
        self.wait(count, None).map(|latched| latched.results)
    }

    /// Like [`request_latches`](Self::request_latches), but gives up after
    /// `timeout` and returns whatever completed.
    pub fn request_latches_timeout(&self, count: usize, timeout: Duration) -> Result<Latched<T>> {
        self.wait(count, Some(Instant::now() + timeout))
    }

    fn wait(&self, count: usize, deadline: Option<Instant>) -> Result<Latched<T>> {
        if self
            .shared
            .latched
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::AlreadyLatched);
        }
        let _guard = WaitGuard(&self.shared);
        let generation = self.shared.generation.load(Ordering::SeqCst);
        self.shared.target.fetch_add(count, Ordering::SeqCst);

        let mut results = Vec::with_capacity(count);
        loop {
            let target = self.shared.target.load(Ordering::SeqCst);
            if results.len() >= target {
                return Ok(Latched {
                    results,
                    missing: 0,
                });
            }

            let signal = match deadline {
                None => self.receiver.recv().map_err(|_| Error::InterruptedWait)?,
                Some(deadline) => match self.receiver.recv_deadline(deadline) {
                    Ok(signal) => signal,
                    Err(RecvTimeoutError::Timeout) => {
                        let missing = target - results.len();
                        warn!("Latch wait timed out with {missing} of {target} outstanding");
                        return Ok(Latched { results, missing });
                    }
                    Err(RecvTimeoutError::Disconnected) => return Err(Error::InterruptedWait),
                },
            };

            match signal {
                Signal::Interrupt { generation: g } if g == generation => {
                    return Err(Error::InterruptedWait)
                }
                Signal::Interrupt { generation: g } => {
                    debug!("Discarding stale latch interrupt from generation {g}");
                }
                Signal::Complete {
                    generation: g,
                    result,
                } if g == generation => results.push(result),
                Signal::Complete { generation: g, .. } => {
                    debug!("Discarding stray latch completion from generation {g}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_zero_latches_return_immediately() {
        let latch: LatchCoordinator<u32> = LatchCoordinator::new();
        assert!(latch.request_latches(0).unwrap().is_empty());
        assert!(!latch.is_latched());
    }

    #[test]
    fn test_out_of_order_completion() {
        let latch = LatchCoordinator::new();
        let completers: Vec<_> = (0..3).map(|_| latch.completer()).collect();

        let handle = thread::spawn(move || {
            completers[2].complete(3);
            completers[0].complete(1);
            completers[1].complete(2);
        });
        let results = latch.request_latches(3).unwrap();
        handle.join().unwrap();
        assert_eq!(results, vec![3, 1, 2]);
    }

    #[test]
    fn test_completions_before_wait_are_counted() {
        let latch = LatchCoordinator::new();
        latch.completer().complete("a");
        latch.completer().complete("b");
        let mut results = latch.request_latches(2).unwrap();
        results.sort();
        assert_eq!(results, vec!["a", "b"]);
    }

    #[test]
    fn test_timeout_returns_partial_and_drops_stragglers() {
        let latch = LatchCoordinator::new();
        let first = latch.completer();
        let late = latch.completer();
        first.complete(1);

        let partial = latch
            .request_latches_timeout(2, Duration::from_millis(50))
            .unwrap();
        assert_eq!(partial.results, vec![1]);
        assert_eq!(partial.missing, 1);
        assert!(!partial.is_complete());

        // Straggler from the timed-out wait must not satisfy the next one.
        late.complete(99);
        let next = latch.completer();
        next.complete(7);
        assert_eq!(latch.request_latches(1).unwrap(), vec![7]);
    }

    #[test]
    fn test_add_latches_extends_current_wait() {
        let latch = LatchCoordinator::new();
        let waiter = latch.clone();
        let handle = thread::spawn(move || waiter.request_latches(1).unwrap());

        while !latch.is_latched() {
            thread::yield_now();
        }
        latch.add_latches(1);
        let completer = latch.completer();
        completer.complete(10);
        completer.complete(20);
        assert_eq!(handle.join().unwrap(), vec![10, 20]);
    }

    #[test]
    fn test_second_waiter_is_rejected() {
        let latch: LatchCoordinator<()> = LatchCoordinator::new();
        let waiter = latch.clone();
        let handle = thread::spawn(move || waiter.request_latches(1));

        while !latch.is_latched() {
            thread::yield_now();
        }
        assert!(matches!(
            latch.request_latches(1),
            Err(Error::AlreadyLatched)
        ));
        latch.completer().complete(());
        assert_eq!(handle.join().unwrap().unwrap().len(), 1);
    }

    #[test]
    fn test_interrupt_without_wait_does_not_poison_next_wait() {
        let latch = LatchCoordinator::new();
        assert!(!latch.interrupt());
        assert!(latch.request_latches(0).unwrap().is_empty());
        assert!(!latch.interrupt());

        latch.completer().complete(4);
        assert_eq!(latch.request_latches(1).unwrap(), vec![4]);
    }

    #[test]
    fn test_interrupt_after_wait_ends_is_stale() {
        let latch = LatchCoordinator::new();
        let sender = latch.sender.clone();
        latch.completer().complete(1);
        assert_eq!(latch.request_latches(1).unwrap(), vec![1]);

        // An interrupt aimed at the finished wait, delivered late.
        let _ = sender.send(Signal::Interrupt { generation: 0 });
        latch.completer().complete(2);
        assert_eq!(latch.request_latches(1).unwrap(), vec![2]);
    }

    #[test]
    fn test_interrupt_fails_wait() {
        let latch: LatchCoordinator<u8> = LatchCoordinator::new();
        let waiter = latch.clone();
        let handle = thread::spawn(move || waiter.request_latches(5));

        while !latch.is_latched() {
            thread::yield_now();
        }
        assert!(latch.interrupt());
        assert!(matches!(
            handle.join().unwrap(),
            Err(Error::InterruptedWait)
        ));
        assert!(!latch.is_latched());
    }
}
