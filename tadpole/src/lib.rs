//! `tadpole` is the message layer of a CoAP implementation:
//! everything between a datagram transport and the
//! request/response semantics layered on top.
//!
//! ## What lives here
//! - **Confirmable retransmission**: CON messages are resent
//!   under binary exponential backoff until acknowledged, reset,
//!   cancelled or out of attempts ([`retry`], [`outbound`])
//! - **Deduplication**: a Message ID cache per remote endpoint
//!   recognizes retransmitted inbound messages and replays the
//!   reply we already gave, byte for byte ([`dedup`])
//! - **Congestion control**: NSTART bounds outstanding requests
//!   per server; PROBING_RATE throttles traffic toward peers that
//!   have gone quiet ([`endpoint`])
//! - **The event loop**: a strictly single-threaded driver tying
//!   the above to a pluggable [`Transport`](net::Transport) and
//!   handing [`CoreEvent`](core::CoreEvent)s to the upper layer
//!   ([`core`])
//!
//! Message encoding and the option registry live one crate down,
//! in [`tadpole_msg`].
//!
//! ## What deliberately does not live here
//! Token-based request/response pairing, resource dispatch, URI
//! handling, blockwise transfer and observe belong to the layers
//! above; DTLS and the sockets themselves to the transport below.
//! The layer carries an opaque
//! [`SecurityContext`](net::SecurityContext) so that secured and
//! plaintext peers at the same address never share state, but it
//! authenticates nothing.
//!
//! ## Time
//! All timing flows through an injected
//! [`embedded_time::Clock`]; production code uses
//! [`std::Clock`](crate::std::Clock) and tests drive a virtual
//! clock, which is how the retransmission and expiry behavior in
//! this crate is tested without sleeping.

#![doc(html_root_url = "https://docs.rs/tadpole/0.1.0")]
#![allow(clippy::unused_unit)]
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![deny(missing_copy_implementations)]
#![cfg_attr(not(test), deny(unsafe_code))]
#![cfg_attr(not(test), warn(unreachable_pub))]

#[cfg(test)]
pub(crate) mod test;

pub(crate) mod logging;

/// runtime configuration: transmission parameters & their derivations
pub mod config;

/// the event loop
pub mod core;

/// inbound deduplication cache
pub mod dedup;

/// per-remote message-layer state machine
pub mod endpoint;

/// endpoints, addressing and the transport seam
pub mod net;

/// sent-record cache & Message ID allocation
pub mod outbound;

/// binary exponential backoff
pub mod retry;

/// `std`-backed clock and transport
#[cfg(feature = "std")]
pub mod std;

/// time abstractions
pub mod time;

pub use tadpole_msg as msg;
