use no_std_net::SocketAddr;

/// The IANA-assigned default port for unsecured CoAP
/// (the "coap" URI scheme)
pub const COAP_PORT: u16 = 5683;

/// An opaque identifier for the security context a datagram
/// travelled (or should travel) under.
///
/// The message layer does not authenticate anything; it only
/// keeps traffic from different contexts from being mistaken
/// for the same peer.  `None` is plaintext.
#[derive(PartialEq, PartialOrd, Eq, Ord, Hash, Debug, Clone, Copy, Default)]
pub struct SecurityContext(pub Option<u64>);

impl SecurityContext {
  /// The plaintext (no DTLS) context
  pub const NONE: SecurityContext = SecurityContext(None);
}

/// A CoAP endpoint: the canonical identity of a participant in
/// the protocol.
///
/// Two endpoints with the same address, port and security context
/// *are* the same endpoint; congestion state, Message ID reuse
/// rules and deduplication windows all attach to this identity.
#[derive(PartialEq, PartialOrd, Eq, Ord, Hash, Debug, Clone, Copy)]
pub struct Endpoint {
  /// IP address & port of the endpoint
  pub addr: SocketAddr,
  /// See [`SecurityContext`]
  pub security: SecurityContext,
}

impl Endpoint {
  /// An endpoint reached without any transport security
  pub fn plain(addr: SocketAddr) -> Endpoint {
    Endpoint { addr,
               security: SecurityContext::NONE }
  }

  /// An endpoint reached under the security context `ctx`
  pub fn secured(addr: SocketAddr, ctx: u64) -> Endpoint {
    Endpoint { addr,
               security: SecurityContext(Some(ctx)) }
  }
}

/// Data that came from, or is destined for, an [`Endpoint`]
#[derive(PartialEq, PartialOrd, Eq, Ord, Hash, Debug, Clone, Copy)]
pub struct Addrd<T>(pub T, pub Endpoint);

impl<T> Addrd<T> {
  /// Borrow the contents of this Addressed
  pub fn as_ref(&self) -> Addrd<&T> {
    Addrd(self.data(), self.addr())
  }

  /// Map the data contained in this Addressed
  pub fn map<R>(self, f: impl FnOnce(T) -> R) -> Addrd<R> {
    Addrd(f(self.0), self.1)
  }

  /// Borrow the contents of the addressed item
  pub fn data(&self) -> &T {
    &self.0
  }

  /// Mutably borrow the contents of the addressed item
  pub fn data_mut(&mut self) -> &mut T {
    &mut self.0
  }

  /// Copy the endpoint for the data
  pub fn addr(&self) -> Endpoint {
    self.1
  }

  /// Turn the entire structure into something else
  pub fn fold<R>(self, f: impl FnOnce(T, Endpoint) -> R) -> R {
    f(self.0, self.1)
  }
}

/// The injected datagram transport the message layer drives.
///
/// Implementations are expected to be non-blocking: `poll` returns
/// `None` rather than waiting, and `send` yields
/// [`nb::Error::WouldBlock`] when the outbound buffer is full.
///
/// A send error is not raised to the caller of the event loop; it
/// resolves the sending transmission as failed.
pub trait Transport {
  /// The error yielded by transport operations
  type Error: core::fmt::Debug;

  /// Hand a datagram to the network, addressed to `dgram.addr()`
  fn send(&self, dgram: Addrd<&[u8]>) -> nb::Result<(), Self::Error>;

  /// Pull the next buffered datagram along with its source
  /// endpoint, or `None` when nothing is waiting
  fn poll(&self) -> Result<Option<Addrd<Vec<u8>>>, Self::Error>;
}
