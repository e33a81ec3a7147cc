use std::convert::TryFrom;
use std::time::Instant;

use log::{error, info};

use crate::message::comm::Communicator;
use crate::message::ordered::OrderedCommunicator;




/**
 * The process group a run executes in: a communicator plus the wall-clock
 * time at which the group was started. Every method that communicates is a
 * collective operation; the transport is wrapped so that consecutive
 * collectives cannot mix up their messages.
 */
pub struct ProcessGroup<C: Communicator> {
    comm: OrderedCommunicator<C>,
    start: Instant,
}




// ============================================================================
impl<C: Communicator> ProcessGroup<C> {

    pub fn start(comm: C) -> Self {
        info!("process group started: rank {} of {}", comm.rank(), comm.size());
        Self { comm: OrderedCommunicator::new(comm), start: Instant::now() }
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    pub fn io_processor_number(&self) -> usize {
        0
    }

    pub fn is_io_processor(&self) -> bool {
        self.rank() == self.io_processor_number()
    }

    /**
     * Seconds of wall-clock time since the group was started.
     */
    pub fn second(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn barrier(&self) {
        self.comm.barrier()
    }

    /**
     * Reduce a value to its maximum over all ranks. Only the I/O processor
     * receives the result.
     */
    pub fn reduce_real_max(&self, value: f64) -> Option<f64> {
        let max = |a: Vec<u8>, b: Vec<u8>| decode_f64(&a).max(decode_f64(&b)).to_le_bytes().to_vec();

        self.comm
            .reduce(max, value.to_le_bytes().to_vec())
            .map(|bytes| decode_f64(&bytes))
    }

    /**
     * Synchronize with the other ranks one last time and release the
     * communicator.
     */
    pub fn end(self) {
        self.barrier();
        info!("process group ended: rank {}", self.rank());
    }
}




fn decode_f64(bytes: &[u8]) -> f64 {
    match <[u8; 8]>::try_from(bytes) {
        Ok(buffer) => f64::from_le_bytes(buffer),
        Err(_) => abort(&format!("expected an 8-byte real in a reduction, got {} bytes", bytes.len())),
    }
}




/**
 * Stop the whole run. This is the only exit for fatal errors: there is no
 * partial-failure mode, so the process exits with a non-zero status and the
 * other ranks, which can no longer complete a collective operation, are
 * expected to be torn down by whoever launched the group.
 */
pub fn abort(msg: &str) -> ! {
    error!("{}", msg);
    eprintln!("amrdrive::abort(): {}", msg);
    std::process::exit(1)
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::ProcessGroup;
    use crate::message::local::LocalCommunicator;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn max_reduction_lands_on_io_processor() {
        let handles: Vec<_> = LocalCommunicator::group(4)
            .into_iter()
            .map(|comm| thread::spawn(move || {
                let group = ProcessGroup::start(comm);
                let local = [0.5, 3.25, 1.0, 2.0][group.rank()];
                let reduced = group.reduce_real_max(local);
                let io = group.is_io_processor();
                group.end();
                (io, reduced)
            }))
            .collect();

        for (n, handle) in handles.into_iter().enumerate() {
            let (io, reduced) = handle.join().unwrap();
            assert_eq!(io, n == 0);
            assert_eq!(reduced, if io { Some(3.25) } else { None });
        }
    }

    #[test]
    fn max_reduction_waits_for_a_slow_rank() {
        let handles: Vec<_> = LocalCommunicator::group(3)
            .into_iter()
            .map(|comm| thread::spawn(move || {
                let group = ProcessGroup::start(comm);
                if group.rank() == 2 {
                    thread::sleep(Duration::from_millis(300));
                }
                let reduced = group.reduce_real_max([1.0, 2.0, 9.0][group.rank()]);
                group.end();
                reduced
            }))
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results, vec![Some(9.0), None, None]);
    }

    #[test]
    fn serial_group_is_its_own_io_processor() {
        let group = ProcessGroup::start(LocalCommunicator::serial());
        assert!(group.is_io_processor());
        assert_eq!(group.reduce_real_max(-1.5), Some(-1.5));
        assert!(group.second() >= 0.0);
    }
}
