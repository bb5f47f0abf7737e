use std::io;
use std::net::UdpSocket;

use embedded_time::rate::Fraction;

use crate::net::{Addrd, Endpoint, Transport};

/// Implement [`embedded_time::Clock`] using [`std::time`] primitives
#[derive(Debug, Clone, Copy)]
pub struct Clock(std::time::Instant);

impl Default for Clock {
  fn default() -> Self {
    Self::new()
  }
}

impl Clock {
  /// Create a new clock whose epoch is "now"
  pub fn new() -> Self {
    Self(std::time::Instant::now())
  }
}

impl embedded_time::Clock for Clock {
  type T = u64;

  // microseconds
  const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000_000);

  fn try_now(&self) -> Result<embedded_time::Instant<Self>, embedded_time::clock::Error> {
    let elapsed = std::time::Instant::now().duration_since(self.0);
    Ok(embedded_time::Instant::new(elapsed.as_micros() as u64))
  }
}

fn no_std_addr(addr: std::net::SocketAddr) -> no_std_net::SocketAddr {
  match addr {
    | std::net::SocketAddr::V4(v4) => {
      let [a, b, c, d] = v4.ip().octets();
      no_std_net::SocketAddr::V4(no_std_net::SocketAddrV4::new(no_std_net::Ipv4Addr::new(a, b, c,
                                                                                         d),
                                                               v4.port()))
    },
    | std::net::SocketAddr::V6(v6) => {
      let [a, b, c, d, e, f, g, h] = v6.ip().segments();
      no_std_net::SocketAddr::V6(no_std_net::SocketAddrV6::new(no_std_net::Ipv6Addr::new(a, b, c,
                                                                                         d, e, f,
                                                                                         g, h),
                                                               v6.port(),
                                                               v6.flowinfo(),
                                                               v6.scope_id()))
    },
  }
}

fn std_addr(addr: no_std_net::SocketAddr) -> std::net::SocketAddr {
  match addr {
    | no_std_net::SocketAddr::V4(v4) => {
      let [a, b, c, d] = v4.ip().octets();
      std::net::SocketAddr::V4(std::net::SocketAddrV4::new(std::net::Ipv4Addr::new(a, b, c, d),
                                                           v4.port()))
    },
    | no_std_net::SocketAddr::V6(v6) => {
      let [a, b, c, d, e, f, g, h] = v6.ip().segments();
      std::net::SocketAddr::V6(std::net::SocketAddrV6::new(std::net::Ipv6Addr::new(a, b, c, d, e,
                                                                                   f, g, h),
                                                           v6.port(),
                                                           v6.flowinfo(),
                                                           v6.scope_id()))
    },
  }
}

/// Plain (no DTLS) CoAP over a non-blocking [`UdpSocket`].
///
/// Bind it yourself and call
/// [`set_nonblocking(true)`](UdpSocket::set_nonblocking) before
/// handing it to the core; a blocking socket would stall the event
/// loop on every receive.
impl Transport for UdpSocket {
  type Error = io::Error;

  fn send(&self, dgram: Addrd<&[u8]>) -> nb::Result<(), io::Error> {
    match self.send_to(dgram.data(), std_addr(dgram.addr().addr)) {
      | Ok(_) => Ok(()),
      | Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(nb::Error::WouldBlock),
      | Err(e) => Err(nb::Error::Other(e)),
    }
  }

  fn poll(&self) -> Result<Option<Addrd<Vec<u8>>>, io::Error> {
    // the longest datagram a CoAP node must accept
    let mut buf = vec![0u8; 1152];

    match self.recv_from(&mut buf) {
      | Ok((n, addr)) => {
        buf.truncate(n);
        Ok(Some(Addrd(buf, Endpoint::plain(no_std_addr(addr)))))
      },
      | Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
      | Err(e) => Err(e),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn addr_conversions_round_trip() {
    let v4: std::net::SocketAddr = "192.168.0.1:5683".parse().unwrap();
    assert_eq!(std_addr(no_std_addr(v4)), v4);

    let v6: std::net::SocketAddr = "[2001:db8::1]:5683".parse().unwrap();
    assert_eq!(std_addr(no_std_addr(v6)), v6);
  }
}
