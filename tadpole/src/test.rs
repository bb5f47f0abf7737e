#![allow(dead_code)]

use ::core::cell::{Cell, RefCell};
use ::std::collections::VecDeque;
use ::std::rc::Rc;

use embedded_time::rate::Fraction;
use embedded_time::Instant;
use no_std_net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::net::{Addrd, Endpoint, Transport};

pub fn dummy_addr() -> SocketAddr {
  SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(192, 168, 0, 1), 8080))
}

pub fn dummy_addr_2() -> SocketAddr {
  SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(192, 168, 0, 2), 8080))
}

pub fn dummy_endpoint() -> Endpoint {
  Endpoint::plain(dummy_addr())
}

pub fn dummy_endpoint_2() -> Endpoint {
  Endpoint::plain(dummy_addr_2())
}

/// A clock that only moves when a test says so.
///
/// One tick is one millisecond; clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ClockMock(Rc<Cell<u64>>);

impl ClockMock {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set(&self, millis: u64) {
    self.0.set(millis);
  }

  pub fn instant(millis: u64) -> Instant<Self> {
    Instant::new(millis)
  }
}

impl embedded_time::Clock for ClockMock {
  type T = u64;

  const SCALING_FACTOR: Fraction = Fraction::new(1, 1000);

  fn try_now(&self) -> Result<Instant<Self>, embedded_time::clock::Error> {
    Ok(Instant::new(self.0.get()))
  }
}

#[derive(Debug, Default)]
struct TestTransportInner {
  inbound: RefCell<VecDeque<Addrd<Vec<u8>>>>,
  sent: RefCell<Vec<Addrd<Vec<u8>>>>,
  fail_sends: Cell<bool>,
}

/// An in-memory [`Transport`]: tests script the inbound queue and
/// inspect everything the core sent.  Clones share the same queues.
#[derive(Debug, Clone, Default)]
pub struct TestTransport(Rc<TestTransportInner>);

impl TestTransport {
  pub fn push_inbound(&self, dgram: Addrd<Vec<u8>>) {
    self.0.inbound.borrow_mut().push_back(dgram);
  }

  pub fn sent(&self) -> Vec<Addrd<Vec<u8>>> {
    self.0.sent.borrow().clone()
  }

  pub fn sent_bytes(&self) -> Vec<Vec<u8>> {
    self.0
        .sent
        .borrow()
        .iter()
        .map(|Addrd(bytes, _)| bytes.clone())
        .collect()
  }

  pub fn fail_sends(&self, fail: bool) {
    self.0.fail_sends.set(fail);
  }
}

impl Transport for TestTransport {
  type Error = &'static str;

  fn send(&self, dgram: Addrd<&[u8]>) -> nb::Result<(), Self::Error> {
    if self.0.fail_sends.get() {
      return Err(nb::Error::Other("scripted send failure"));
    }

    self.0
        .sent
        .borrow_mut()
        .push(dgram.map(|bytes| bytes.to_vec()));
    Ok(())
  }

  fn poll(&self) -> Result<Option<Addrd<Vec<u8>>>, Self::Error> {
    Ok(self.0.inbound.borrow_mut().pop_front())
  }
}
