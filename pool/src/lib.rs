//! A pool of OS worker threads for CPU-bound calculations.
//!
//! The scheduler thread hands each request to an idle worker over that
//! worker's exclusive request channel; replies travel back over a shared
//! event channel tagged with the worker's slot. Requests and replies cross
//! the channels as opaque byte frames, so the pool knows nothing about the
//! work it runs: callers install a work function at [`WorkerPool::start`]
//! and any per-worker state (for tokenflow, the net) is cloned into the
//! workers once, at startup.
//!
//! The caller side never blocks except in [`WorkerPool::await_events`],
//! which parks the thread until a reply arrives or a timeout elapses. When
//! every channel is busy, [`WorkerPool::submit`] queues the request FIFO
//! and a freed channel picks it up on the next [`WorkerPool::poll`].

#![forbid(missing_docs)]

use std::collections::VecDeque;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;

/// Identifies the submission a reply belongs to.
///
/// Tokens are caller-chosen; tokenflow uses the handler's index in its
/// flat handler table.
pub type Token = usize;

/// A failure confined to the pool boundary.
///
/// Callers are expected to treat every variant the same way; tokenflow
/// maps them all to "no movement available".
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The work function reported an error; the message crossed the
    /// channel in the reply envelope.
    #[error("worker computation failed: {0}")]
    Failed(String),
    /// The worker's request channel is closed, typically because the
    /// worker thread is gone.
    #[error("worker channel disconnected")]
    Disconnected,
    /// The reply envelope did not decode.
    #[error("malformed worker reply: {0}")]
    Malformed(String),
}

/// A reply as delivered to the caller.
pub type Reply = Result<Vec<u8>, WorkerError>;

/// A fixed-size pool of worker threads with one duplex channel per worker.
pub struct WorkerPool {
    /// Request senders, indexed by worker slot. Cleared on drop so the
    /// workers observe EOF and exit.
    channels: Vec<Sender<Vec<u8>>>,
    /// Slots with no request in flight.
    idle: VecDeque<usize>,
    /// Token of the request each slot is serving.
    in_flight: Vec<Option<Token>>,
    /// Requests waiting for a channel, oldest first.
    pending: VecDeque<(Token, Vec<u8>)>,
    /// Replies received while parking, not yet handed to `poll`.
    stash: VecDeque<(usize, Vec<u8>)>,
    /// Requests that failed to dispatch, surfaced on the next `poll`.
    failed: VecDeque<(Token, WorkerError)>,
    events: Receiver<(usize, Vec<u8>)>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Launches `workers` threads, each running `work` once per request.
    ///
    /// The work function is cloned into every worker; whatever it captures
    /// is the worker's startup state and lives for the pool's lifetime.
    /// If spawning a thread fails the error is returned; workers already
    /// spawned exit on their own once their request channels are dropped.
    pub fn start<F>(workers: usize, work: F) -> Result<Self, std::io::Error>
    where
        F: Fn(&[u8]) -> Result<Vec<u8>, String> + Clone + Send + 'static,
    {
        assert!(workers > 0, "worker pool requires at least one worker");

        let (event_tx, events) = channel();
        let mut channels = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for slot in 0..workers {
            let (request_tx, request_rx) = channel::<Vec<u8>>();
            let event_tx = event_tx.clone();
            let work = work.clone();
            let handle = std::thread::Builder::new()
                .name(format!("tokenflow-worker-{}", slot))
                .spawn(move || worker_loop(slot, request_rx, event_tx, work))?;
            channels.push(request_tx);
            handles.push(handle);
        }

        Ok(Self {
            channels,
            idle: (0..workers).collect(),
            in_flight: vec![None; workers],
            pending: VecDeque::new(),
            stash: VecDeque::new(),
            failed: VecDeque::new(),
            events,
            workers: handles,
        })
    }

    /// The number of worker threads.
    pub fn workers(&self) -> usize {
        self.channels.len()
    }

    /// Submits a request, dispatching on an idle channel or queueing FIFO.
    ///
    /// The reply is delivered by a later [`WorkerPool::poll`], tagged with
    /// `token`. At most one request is in flight per channel.
    pub fn submit(&mut self, token: Token, frame: Vec<u8>) {
        if let Some(slot) = self.idle.pop_front() {
            self.dispatch(slot, token, frame);
        } else {
            self.pending.push_back((token, frame));
        }
    }

    /// True when no request is queued, in flight, or awaiting delivery.
    ///
    /// Once idle, only a new `submit` can produce further replies.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
            && self.stash.is_empty()
            && self.failed.is_empty()
            && self.in_flight.iter().all(Option::is_none)
    }

    /// Drains completed replies into `out` without blocking.
    ///
    /// Channels freed by a reply immediately pick up pending requests.
    pub fn poll(&mut self, out: &mut Vec<(Token, Reply)>) {
        while let Some((token, error)) = self.failed.pop_front() {
            out.push((token, Err(error)));
        }
        while let Some((slot, frame)) = self.stash.pop_front() {
            self.complete(slot, frame, out);
        }
        while let Ok((slot, frame)) = self.events.try_recv() {
            self.complete(slot, frame, out);
        }
    }

    /// Parks the calling thread until a reply arrives or `timeout` passes.
    ///
    /// With `None` the park is unbounded. Returns immediately when a reply
    /// is already waiting. The reply itself is handed out by `poll`.
    pub fn await_events(&mut self, timeout: Option<Duration>) {
        if !self.stash.is_empty() || !self.failed.is_empty() {
            return;
        }
        let received = match timeout {
            Some(duration) => self.events.recv_timeout(duration).ok(),
            None => self.events.recv().ok(),
        };
        if let Some(event) = received {
            self.stash.push_back(event);
        }
    }

    /// Closes all request channels and joins the worker threads.
    ///
    /// Safe to call with requests in flight: workers finish their current
    /// item, observe EOF, and exit; orphaned replies are discarded.
    pub fn stop(self) {}

    fn dispatch(&mut self, slot: usize, token: Token, frame: Vec<u8>) {
        if self.channels[slot].send(frame).is_ok() {
            self.in_flight[slot] = Some(token);
        } else {
            // Dead worker: the slot stays retired and the caller hears
            // about it on the next poll.
            self.failed.push_back((token, WorkerError::Disconnected));
        }
    }

    fn complete(&mut self, slot: usize, frame: Vec<u8>, out: &mut Vec<(Token, Reply)>) {
        let token = match self.in_flight[slot].take() {
            Some(token) => token,
            // A reply for a request we no longer track; nothing to do.
            None => return,
        };
        let reply = match bincode::deserialize::<Result<Vec<u8>, String>>(&frame) {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(message)) => Err(WorkerError::Failed(message)),
            Err(error) => Err(WorkerError::Malformed(error.to_string())),
        };
        out.push((token, reply));

        if let Some((token, frame)) = self.pending.pop_front() {
            self.dispatch(slot, token, frame);
        } else {
            self.idle.push_back(slot);
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.channels.clear();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

/// The body of each worker thread.
///
/// Blocks on the request channel; a closed channel is the shutdown signal.
/// Work-function errors are serialized into the reply envelope rather than
/// unwinding the thread.
fn worker_loop<F>(
    slot: usize,
    requests: Receiver<Vec<u8>>,
    events: Sender<(usize, Vec<u8>)>,
    work: F,
) where
    F: Fn(&[u8]) -> Result<Vec<u8>, String>,
{
    while let Ok(frame) = requests.recv() {
        let reply: Result<Vec<u8>, String> = work(&frame);
        let encoded = bincode::serialize(&reply).expect("reply envelope encoding");
        // A send failure means the pool is tearing down; just exit.
        if events.send((slot, encoded)).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(pool: &mut WorkerPool, expected: usize) -> Vec<(Token, Reply)> {
        let mut replies = Vec::new();
        while replies.len() < expected {
            pool.await_events(Some(Duration::from_secs(5)));
            pool.poll(&mut replies);
        }
        replies
    }

    #[test]
    fn round_trips_more_requests_than_workers() {
        let mut pool = WorkerPool::start(2, |frame: &[u8]| {
            let mut echoed = frame.to_vec();
            echoed.reverse();
            Ok(echoed)
        })
        .unwrap();

        for token in 0..5 {
            pool.submit(token, vec![token as u8, 1, 2]);
        }
        let mut replies = drain(&mut pool, 5);
        replies.sort_by_key(|(token, _)| *token);

        for (token, reply) in replies {
            let bytes = reply.unwrap();
            assert_eq!(bytes, vec![2, 1, token as u8]);
        }
        assert!(pool.is_idle());
        pool.stop();
    }

    #[test]
    fn work_errors_come_back_as_failed() {
        let mut pool = WorkerPool::start(1, |_frame: &[u8]| Err("boom".to_string())).unwrap();
        pool.submit(7, Vec::new());
        let replies = drain(&mut pool, 1);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].0, 7);
        assert!(matches!(replies[0].1, Err(WorkerError::Failed(ref m)) if m == "boom"));
    }

    #[test]
    fn stop_does_not_deadlock_with_requests_in_flight() {
        let mut pool = WorkerPool::start(2, |frame: &[u8]| {
            std::thread::sleep(Duration::from_millis(50));
            Ok(frame.to_vec())
        })
        .unwrap();
        for token in 0..4 {
            pool.submit(token, vec![0]);
        }
        // Never polled; the workers are mid-request or about to be.
        pool.stop();
    }

    #[test]
    fn await_events_times_out_when_nothing_is_outstanding() {
        let mut pool = WorkerPool::start(1, |frame: &[u8]| Ok(frame.to_vec())).unwrap();
        pool.await_events(Some(Duration::from_millis(20)));
        let mut replies = Vec::new();
        pool.poll(&mut replies);
        assert!(replies.is_empty());
        assert!(pool.is_idle());
    }
}
