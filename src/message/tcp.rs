use std::io::{self, prelude::*};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::{collections::HashMap, thread, time::Duration};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, warn};

use super::backoff::{ExponentialBackoff, Retry};
use super::{comm::Communicator, util};

const CXN_W_TIMEOUT: Duration = Duration::from_millis(5000);
const RETRY_WAIT: Duration = Duration::from_millis(250);
const RETRY_MAX_WAIT: Duration = Duration::from_millis(5000);
const RETRY_ATTEMPTS: usize = 40;

/// A communicator whose ranks are separate processes, each listening on its
/// own address from a shared peer table. Messages are framed as a
/// little-endian length followed by the payload, and each frame is
/// acknowledged by the receiver echoing the length back.
///
/// A background thread owns the outgoing connections (opened lazily, with
/// exponential backoff, since peers start up at different times) and another
/// accepts incoming ones. Dropping the communicator flushes every queued
/// outgoing message before returning.
///
pub struct TcpCommunicator {
    rank: usize,
    num_peers: usize,
    send_sink: Option<Sender<(usize, Vec<u8>)>>,
    recv_src: Receiver<Vec<u8>>,
    send_thread: Option<thread::JoinHandle<()>>,
}

impl TcpCommunicator {
    /// Bind this rank's listening address and start the transport threads.
    ///
    pub fn connect(rank: usize, peers: Vec<SocketAddr>) -> io::Result<Self> {
        if rank >= peers.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("rank {} is not in a peer table of size {}", rank, peers.len()),
            ));
        }
        let listener = TcpListener::bind(peers[rank])?;
        info!("rank {} listening on {}", rank, peers[rank]);

        let (recv_sink, recv_src) = crossbeam_channel::unbounded();
        Self::start_listener(listener, recv_sink);

        let (send_sink, send_src) = crossbeam_channel::unbounded();
        let num_peers = peers.len();
        let send_thread = Self::start_serial_sender(peers, send_src);

        Ok(Self {
            rank,
            num_peers,
            send_sink: Some(send_sink),
            recv_src,
            send_thread: Some(send_thread),
        })
    }

    fn start_serial_sender(
        peers: Vec<SocketAddr>,
        send_src: Receiver<(usize, Vec<u8>)>,
    ) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            let mut table: HashMap<usize, TcpStream> = HashMap::new();

            for (rank, message) in send_src {
                let mut sent = false;

                for attempt in 0..2 {
                    if !table.contains_key(&rank) {
                        match Self::connect_with_retry(peers[rank]) {
                            Ok(stream) => {
                                table.insert(rank, stream);
                            }
                            Err(e) => crate::parallel::abort(&format!("could not connect to {}: {}", peers[rank], e)),
                        }
                    }
                    let client = match table.get_mut(&rank) {
                        Some(client) => client,
                        None => continue,
                    };
                    match Self::write_frame(client, &message) {
                        Ok(()) => {
                            sent = true;
                            break;
                        }
                        Err(e) => {
                            warn!("send to {} failed (attempt {}): {}", peers[rank], attempt + 1, e);
                            table.remove(&rank);
                        }
                    }
                }
                if !sent {
                    crate::parallel::abort(&format!("could not deliver message to {}", peers[rank]))
                }
            }
            debug!("sender thread finished");
        })
    }

    fn write_frame(client: &mut TcpStream, message: &[u8]) -> io::Result<()> {
        util::write_usize(client, message.len())?;
        client.write_all(message)?;
        let ack = util::read_usize(client)?;

        if ack != message.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("sent {} bytes but receiver acknowledged {}", message.len(), ack),
            ));
        }
        Ok(())
    }

    fn start_listener(listener: TcpListener, recv_sink: Sender<Vec<u8>>) {
        thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => Self::handle_connection(stream, recv_sink.clone()),
                    Err(e) => error!("failed to accept connection: {}", e),
                }
            }
        });
    }

    fn handle_connection(mut stream: TcpStream, recv_sink: Sender<Vec<u8>>) {
        let remote = stream.peer_addr().map(|a| a.to_string()).unwrap_or_else(|_| "<unknown>".to_string());
        debug!("receiving connection from {}", remote);

        thread::spawn(move || loop {
            let frame = util::read_usize(&mut stream)
                .and_then(|size| util::read_bytes_vec(&mut stream, size))
                .and_then(|bytes| {
                    let num_bytes = bytes.len();
                    recv_sink
                        .send(bytes)
                        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
                    util::write_usize(&mut stream, num_bytes)
                });

            if let Err(e) = frame {
                if e.kind() != io::ErrorKind::UnexpectedEof {
                    error!("connection from {} failed: {}", remote, e);
                }
                break;
            }
        });
    }

    fn connect_with_retry(addr: SocketAddr) -> io::Result<TcpStream> {
        let with_retries = ExponentialBackoff::new(RETRY_WAIT, RETRY_MAX_WAIT, 2).take(RETRY_ATTEMPTS);

        let result = with_retries.retry(
            || TcpStream::connect(addr),
            |e, delay| debug!("connect to {} failed ({}), retrying in {:?}", addr, e, delay),
        );
        let stream = match result {
            Some(result) => result?,
            None => return Err(io::Error::new(io::ErrorKind::Other, "no connection attempts were made")),
        };
        stream.set_write_timeout(Some(CXN_W_TIMEOUT))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

impl Communicator for TcpCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.num_peers
    }

    fn send(&self, rank: usize, message: Vec<u8>) {
        let delivered = self
            .send_sink
            .as_ref()
            .map(|sink| sink.send((rank, message)).is_ok())
            .unwrap_or(false);

        if !delivered {
            crate::parallel::abort("the TCP sender thread has stopped")
        }
    }

    fn recv(&self) -> Vec<u8> {
        match self.recv_src.recv() {
            Ok(bytes) => bytes,
            Err(_) => crate::parallel::abort("the TCP listener thread has stopped"),
        }
    }
}

impl Drop for TcpCommunicator {
    fn drop(&mut self) {
        self.send_sink.take();

        if let Some(handle) = self.send_thread.take() {
            if handle.join().is_err() {
                error!("the TCP sender thread panicked");
            }
        }
    }
}
