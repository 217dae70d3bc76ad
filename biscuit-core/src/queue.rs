//! Cross-thread handoff into the UI thread.
//!
//! Worker threads push into a [`UiQueue`] through cloned senders; the UI
//! thread pops from it on a repeating timer and never blocks. Hosts whose
//! toolkit has no timer of its own can drive the ticks with [`PollLoop`].

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::ops::ControlFlow;
use std::time::Duration;

/// Unbounded FIFO with any number of producers and a single consumer.
pub struct UiQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Default for UiQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> UiQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    /// A producer handle that can be moved to a worker thread.
    pub fn sender(&self) -> Sender<T> {
        self.tx.clone()
    }

    /// Take the oldest item without waiting.
    pub fn pop(&self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(item) => Some(item),
            // The queue holds its own sender, so it can never disconnect.
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Drop everything queued so far. Returns how many items were discarded.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }
}

/// Repeating timer that runs a tick callback on the current thread.
///
/// Sleeps `interval` between ticks, so an idle loop never spins.
#[derive(Debug, Clone, Copy)]
pub struct PollLoop {
    interval: Duration,
}

impl PollLoop {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Call `tick` every interval until it breaks. Returns the number of
    /// ticks that ran, including the breaking one.
    pub fn run<B>(&self, mut tick: impl FnMut() -> ControlFlow<B>) -> (usize, B) {
        let mut ticks = 0;
        loop {
            ticks += 1;
            if let ControlFlow::Break(value) = tick() {
                return (ticks, value);
            }
            std::thread::sleep(self.interval);
        }
    }
}
