//! The bounded buffer between a session's receive loop and its consumer.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::record::ResultRecord;

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<ResultRecord>,
    closed: bool,
    dropped: u64,
}

/// A single-producer, single-consumer record queue.
///
/// Holds at most `capacity` records, except that [`Intake::push_evicting`]
/// never drops anything but samples and may exceed the capacity when the
/// queue holds none.
#[derive(Debug)]
pub(crate) struct Intake {
    state: Mutex<State>,
    capacity: usize,
    readable: Notify,
    writable: Notify,
}

impl Intake {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            capacity: capacity.max(1),
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    /// Appends a record if there is room, handing it back otherwise.
    ///
    /// Records pushed after closing are discarded.
    pub(crate) fn try_push(&self, record: ResultRecord) -> Result<(), ResultRecord> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Ok(());
        }
        if state.queue.len() >= self.capacity {
            return Err(record);
        }
        state.queue.push_back(record);
        drop(state);
        self.readable.notify_one();
        Ok(())
    }

    /// Appends a record, waiting for room.
    pub(crate) async fn push(&self, mut record: ResultRecord) {
        loop {
            let writable = self.writable.notified();
            match self.try_push(record) {
                Ok(()) => return,
                Err(r) => record = r,
            }
            writable.await;
        }
    }

    /// Appends a record, evicting the oldest samples to make room.
    ///
    /// Returns the number of samples evicted.
    pub(crate) fn push_evicting(&self, record: ResultRecord) -> usize {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return 0;
        }
        let mut evicted = 0;
        while state.queue.len() >= self.capacity {
            let Some(oldest) = state.queue.iter().position(ResultRecord::is_sample) else {
                break;
            };
            state.queue.remove(oldest);
            evicted += 1;
        }
        if record.is_sample() && state.queue.len() >= self.capacity {
            // Nothing left to evict; the new sample is the oldest one to lose.
            state.dropped += 1;
            return evicted + 1;
        }
        state.dropped += evicted as u64;
        state.queue.push_back(record);
        drop(state);
        self.readable.notify_one();
        evicted
    }

    /// Takes the next record, waiting for one to arrive.
    ///
    /// Returns `None` once the queue is closed and empty.
    pub(crate) async fn recv(&self) -> Option<ResultRecord> {
        loop {
            let readable = self.readable.notified();
            {
                let mut state = self.state.lock().unwrap();
                if let Some(record) = state.queue.pop_front() {
                    drop(state);
                    self.writable.notify_one();
                    return Some(record);
                }
                if state.closed {
                    return None;
                }
            }
            readable.await;
        }
    }

    /// Stops accepting records. Queued records can still be received.
    pub(crate) fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.readable.notify_one();
        self.writable.notify_one();
    }

    /// Discards queued records and closes the queue.
    pub(crate) fn abandon(&self) {
        {
            let mut state = self.state.lock().unwrap();
            state.queue.clear();
            state.closed = true;
        }
        self.readable.notify_one();
        self.writable.notify_one();
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    /// The number of samples evicted so far.
    pub(crate) fn dropped(&self) -> u64 {
        self.state.lock().unwrap().dropped
    }
}
