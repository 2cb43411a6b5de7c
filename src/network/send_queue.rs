//! Outbound flow control for one connection.
//!
//! Up to [`MAX_BURST`] lines go out immediately; after that lines queue
//! and one more line is released every [`DECAY_INTERVAL`]. This keeps the
//! bot under the usual server-side flood limits.

use std::collections::VecDeque;
use std::time::Duration;

use slirc_proto::Message;

/// Lines that may be written back to back.
pub const MAX_BURST: usize = 3;

/// How often the burst counter decays by one.
pub const DECAY_INTERVAL: Duration = Duration::from_secs(2);

/// FIFO of outbound messages with a burst counter.
#[derive(Debug)]
pub struct SendQueue {
    queue: VecDeque<Message>,
    burst: usize,
    max_burst: usize,
}

impl Default for SendQueue {
    fn default() -> Self {
        Self::new(MAX_BURST)
    }
}

impl SendQueue {
    pub fn new(max_burst: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            burst: 0,
            max_burst,
        }
    }

    /// Offer a message. Returns it back if it may be written right away.
    ///
    /// A message is never written ahead of ones already queued.
    pub fn push(&mut self, msg: Message) -> Option<Message> {
        if self.queue.is_empty() && self.burst < self.max_burst {
            self.burst += 1;
            Some(msg)
        } else {
            self.queue.push_back(msg);
            None
        }
    }

    /// One decay tick: lower the counter and release what now fits.
    pub fn decay(&mut self) -> Vec<Message> {
        self.burst = self.burst.saturating_sub(1);

        let mut ready = Vec::new();
        while self.burst < self.max_burst {
            let Some(msg) = self.queue.pop_front() else {
                break;
            };
            self.burst += 1;
            ready.push(msg);
        }
        ready
    }

    /// Take everything still queued, ignoring the limit.
    pub fn drain_all(&mut self) -> Vec<Message> {
        self.queue.drain(..).collect()
    }

    pub fn burst(&self) -> usize {
        self.burst
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}
