use crossbeam_channel::{Receiver, Sender};

use super::comm::Communicator;

/// A communicator connecting ranks that live in the same process (normally
/// one thread per rank), over unbounded crossbeam channels. A group of size
/// one is the serial communicator.
///
pub struct LocalCommunicator {
    rank: usize,
    peers: Vec<Sender<Vec<u8>>>,
    inbox: Receiver<Vec<u8>>,
}

impl LocalCommunicator {
    /// Create `size` connected communicators, indexed by rank.
    ///
    pub fn group(size: usize) -> Vec<Self> {
        assert!(size > 0, "a process group needs at least one rank");

        let (peers, inboxes): (Vec<_>, Vec<_>) = (0..size).map(|_| crossbeam_channel::unbounded()).unzip();

        inboxes
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| Self {
                rank,
                peers: peers.clone(),
                inbox,
            })
            .collect()
    }

    /// A group containing only this process.
    ///
    pub fn serial() -> Self {
        let (sink, inbox) = crossbeam_channel::unbounded();
        Self {
            rank: 0,
            peers: vec![sink],
            inbox,
        }
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&self, rank: usize, message: Vec<u8>) {
        // The inbox lives as long as its own communicator, so a failed send
        // means the peer thread has already finished or panicked.
        if self.peers[rank].send(message).is_err() {
            crate::parallel::abort(&format!("rank {} has left the process group", rank))
        }
    }

    fn recv(&self) -> Vec<u8> {
        match self.inbox.recv() {
            Ok(message) => message,
            Err(_) => crate::parallel::abort("every peer has left the process group"),
        }
    }
}
