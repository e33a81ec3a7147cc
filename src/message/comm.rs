use super::util;

/// Interface for a group of processes that can exchange messages over a
/// network. The underlying transport can in principle be TCP, in-process
/// channels, or a higher level abstraction like MPI.
///
/// Every collective operation provided here must be called by all ranks, in
/// the same order, or the group deadlocks. The default implementations
/// assume that a rank never receives a message belonging to a later
/// collective while it is still inside an earlier one; wrap a transport in an
/// `OrderedCommunicator` when that is not guaranteed.
///
pub trait Communicator {
    /// Must be implemented to return the rank of this process within the
    /// communicator.
    fn rank(&self) -> usize;

    /// Must be implemented to return the number of peers processes in this
    /// communicator.
    fn size(&self) -> usize;

    /// Must be implemented to send a message to a peer. This method must
    /// return immediately, in other words it is not allowed to block until a
    /// matching receive is posted.
    fn send(&self, rank: usize, message: Vec<u8>);

    /// Must be implemented to receive a message from any of the peers. This
    /// method is allowed to block until a message is ready to be received
    fn recv(&self) -> Vec<u8>;

    /// Broadcast a message from rank 0 to every rank. The message must be
    /// `Some` on rank 0 and `None` elsewhere.
    ///
    fn broadcast(&self, value: Option<Vec<u8>>) -> Vec<u8> {
        tree_broadcast(self, value)
    }

    /// Reduce a message onto rank 0, which is the only rank that gets `Some`
    /// back. See `tree_reduce`.
    ///
    fn reduce<F>(&self, f: F, value: Vec<u8>) -> Option<Vec<u8>>
    where
        F: Fn(Vec<u8>, Vec<u8>) -> Vec<u8>,
    {
        tree_reduce(self, f, value)
    }

    /// Implements an all-reduce (symmetric fold) operation over a commutative
    /// binary operator.
    ///
    fn all_reduce<F>(&self, f: F, value: Vec<u8>) -> Vec<u8>
    where
        F: Fn(Vec<u8>, Vec<u8>) -> Vec<u8>,
    {
        self.broadcast(self.reduce(f, value))
    }

    /// Block until every rank has reached this call.
    ///
    fn barrier(&self) {
        self.all_reduce(|a, _| a, Vec::new());
    }
}

/// Implements a binomial tree broadcast from the root node. The message
/// buffer must be `Some` if this is the root node, and it must be `None`
/// otherwise.
///
pub fn tree_broadcast<C: Communicator + ?Sized>(comm: &C, value: Option<Vec<u8>>) -> Vec<u8> {
    let r = comm.rank();
    let p = comm.size();

    let value = match value {
        Some(value) => value,
        None => comm.recv(),
    };
    for level in (0..util::ceil_log2(p)).rev() {
        let one = 1 << level;
        let two = 1 << (level + 1);

        if r % two == 0 && r + one < p {
            comm.send(r + one, value.clone())
        }
    }
    value
}

/// Implements a binomial tree reduce onto rank 0. All ranks return `None`
/// except for the root. Messages are received from whichever child is ready
/// first, so `f` must be commutative and associative.
///
pub fn tree_reduce<C, F>(comm: &C, f: F, mut value: Vec<u8>) -> Option<Vec<u8>>
where
    C: Communicator + ?Sized,
    F: Fn(Vec<u8>, Vec<u8>) -> Vec<u8>,
{
    let r = comm.rank();
    let p = comm.size();

    for level in 0..util::ceil_log2(p) {
        let one = 1 << level;
        let two = 1 << (level + 1);

        if r % two == 0 {
            if r + one < p {
                value = f(value, comm.recv())
            }
        } else {
            comm.send(r - one, value);
            return None;
        }
    }
    Some(value)
}
