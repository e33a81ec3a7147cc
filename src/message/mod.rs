//! This module exports a minimal message-passing API, which is encapsulated
//! by a `Communicator` trait. Implementors only need to write `send` and
//! `recv` operations for a given transport layer (an in-process channel
//! transport and a pure-Rust TCP transport are included). The trait then
//! provides default implementations for broadcast, reduce, reduce-all and
//! barrier operations. `OrderedCommunicator` stamps messages with a
//! collective sequence number, for transports whose receives take the next
//! message from any peer.
//!

mod backoff;
pub mod comm;
pub mod local;
pub mod ordered;
pub mod tcp;
pub mod util;
