use std::collections::{HashMap, VecDeque};
use std::convert::TryFrom;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use log::{debug, error};

use super::comm::{self, Communicator};

const HEADER_LEN: usize = 8;

/// Wraps a transport so that collectives cannot steal each other's messages.
/// Every outgoing message is stamped with the sequence number of the
/// collective it belongs to; the number advances on every rank when a
/// collective completes. A message stamped for a later collective that
/// arrives early is held back until this rank reaches that collective.
///
pub struct OrderedCommunicator<C: Communicator> {
    inner: C,
    sequence: AtomicU64,
    early: Mutex<HashMap<u64, VecDeque<Vec<u8>>>>,
}

impl<C: Communicator> OrderedCommunicator<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            sequence: AtomicU64::new(0),
            early: Mutex::new(HashMap::new()),
        }
    }

    /// The number of collectives this rank has completed.
    ///
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    fn advance(&self) {
        self.sequence.fetch_add(1, Ordering::SeqCst);
    }

    fn early(&self) -> MutexGuard<'_, HashMap<u64, VecDeque<Vec<u8>>>> {
        self.early.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_early(&self, sequence: u64) -> Option<Vec<u8>> {
        let mut early = self.early();
        let message = early.get_mut(&sequence).and_then(VecDeque::pop_front);

        if early.get(&sequence).map_or(false, VecDeque::is_empty) {
            early.remove(&sequence);
        }
        message
    }
}

impl<C: Communicator> Communicator for OrderedCommunicator<C> {
    fn rank(&self) -> usize {
        self.inner.rank()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn send(&self, rank: usize, message: Vec<u8>) {
        let mut envelope = Vec::with_capacity(HEADER_LEN + message.len());
        envelope.extend_from_slice(&self.sequence().to_le_bytes());
        envelope.extend(message);
        self.inner.send(rank, envelope)
    }

    fn recv(&self) -> Vec<u8> {
        let current = self.sequence();

        if let Some(message) = self.take_early(current) {
            return message;
        }
        loop {
            let mut envelope = self.inner.recv();

            let stamp = match envelope.get(..HEADER_LEN).map(<[u8; HEADER_LEN]>::try_from) {
                Some(Ok(header)) => u64::from_le_bytes(header),
                _ => crate::parallel::abort(&format!("received a {}-byte message with no sequence header", envelope.len())),
            };
            let message = envelope.split_off(HEADER_LEN);

            if stamp == current {
                return message;
            } else if stamp > current {
                debug!("rank {} holding a message for collective {} (at {})", self.rank(), stamp, current);
                self.early().entry(stamp).or_default().push_back(message);
            } else {
                error!("rank {} dropping a message for finished collective {} (at {})", self.rank(), stamp, current);
            }
        }
    }

    fn broadcast(&self, value: Option<Vec<u8>>) -> Vec<u8> {
        let result = comm::tree_broadcast(self, value);
        self.advance();
        result
    }

    fn reduce<F>(&self, f: F, value: Vec<u8>) -> Option<Vec<u8>>
    where
        F: Fn(Vec<u8>, Vec<u8>) -> Vec<u8>,
    {
        let result = comm::tree_reduce(self, f, value);
        self.advance();
        result
    }
}
