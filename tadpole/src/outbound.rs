use std::collections::BTreeMap;
use std::rc::Rc;

use embedded_time::Instant;
use tadpole_msg::{CodeKind, Id, Message, Type};

use crate::config::Params;
use crate::net::Endpoint;
use crate::retry::{Attempts, RetryTimer};
use crate::time::{since, Clock, Millis};

/// Terminal disposition of a transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Resolution {
  /// Still outstanding; a reply may yet arrive
  Unresolved,
  /// Acknowledged, answered, or (for non-Confirmable sends)
  /// aged out without complaint
  Succeeded,
  /// Reset by the peer, rejected by the transport, or the
  /// retransmission schedule ran dry
  Failed,
}

impl Resolution {
  /// Whether this is a terminal state
  pub fn is_resolved(&self) -> bool {
    *self != Resolution::Unresolved
  }
}

/// A weak index into the sent cache handed to the upper layer.
///
/// Holding one does not keep the record alive; consulting a handle
/// after the record's lifetime has lapsed simply finds nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SendHandle {
  /// The remote the message went to
  pub endpoint: Endpoint,
  /// The Message ID the record is filed under
  pub id: Id,
}

/// Book-keeping for one message handed to the transport.
///
/// Owned exclusively by the endpoint state for its destination;
/// the message itself is reference-shared so reply caches can point
/// at the same immutable data.
#[derive(Debug)]
pub struct SendRecord<C: Clock> {
  /// The message, exactly as first transmitted
  pub msg: Rc<Message>,
  /// Its encoding, retransmitted verbatim
  pub bytes: Rc<[u8]>,
  /// When the first transmission happened
  pub first_tx: Instant<C>,
  /// Retransmission countdown; degenerate for anything but CON
  pub timer: RetryTimer<C>,
  /// Lifetime of the record after `first_tx`; the deduplication
  /// window during which the Message ID may not be reused
  pub expires_in: Millis,
  /// See [`Resolution`]
  pub resolution: Resolution,
  /// The sender asked to stop retransmitting
  pub cancelled: bool,
}

impl<C: Clock> SendRecord<C> {
  /// File a message under a new record, choosing timer and
  /// lifetime from its type and code:
  ///
  /// | shape | retransmits | record lives for |
  /// | -- | -- | -- |
  /// | CON request | yes | `exchange_lifetime` |
  /// | CON non-request | yes | `max_transmit_wait` |
  /// | NON request | no | `non_lifetime` |
  /// | NON non-request | no | `ack_timeout · ack_random_factor` |
  ///
  /// `msg` must be Confirmable or Non-confirmable.  Acks and
  /// Resets never become sent records: their Message ID belongs
  /// to the peer's allocation space, so they are cached on the
  /// received record they answer instead (see
  /// [`EndpointState`](crate::endpoint::EndpointState)).
  ///
  /// # Panics
  /// When `msg` is an Ack or Reset.
  pub fn new(msg: Rc<Message>, bytes: Rc<[u8]>, now: Instant<C>, params: &Params) -> Self {
    let request = msg.code.kind() == CodeKind::Request;

    let (timer, expires_in) = match msg.ty {
      | Type::Con => {
        let timer = RetryTimer::new(now,
                                    params.initial_timeout_range(),
                                    Attempts(1 + params.max_retransmit()),
                                    params.max_transmit_wait());
        let lifetime = if request {
          params.exchange_lifetime()
        } else {
          params.max_transmit_wait()
        };
        (timer, lifetime)
      },
      | Type::Non => {
        let lifetime = if request {
          params.non_lifetime()
        } else {
          params.spread_ack_timeout()
        };
        (RetryTimer::single_shot(now, lifetime), lifetime)
      },
      | Type::Ack | Type::Reset => {
        unreachable!("replies are cached on the received record they answer")
      },
    };

    Self { msg,
           bytes,
           first_tx: now,
           timer,
           expires_in,
           resolution: Resolution::Unresolved,
           cancelled: false }
  }

  /// Unresolved and therefore counted against NSTART
  pub fn outstanding(&self) -> bool {
    self.resolution == Resolution::Unresolved
  }

  /// Past the end of its deduplication window
  pub fn expired(&self, now: Instant<C>) -> bool {
    since(now, self.first_tx) >= self.expires_in
  }

  /// Move to a terminal state.  Returns false (and changes
  /// nothing) when already resolved.
  pub fn resolve(&mut self, outcome: Resolution) -> bool {
    if self.resolution.is_resolved() || !outcome.is_resolved() {
      false
    } else {
      self.resolution = outcome;
      self.timer.cancel();
      true
    }
  }

  /// What expiration means for this record: CON that never heard
  /// back failed; fire-and-forget shapes aged out successfully.
  pub fn expiry_outcome(&self) -> Resolution {
    match self.msg.ty {
      | Type::Con => Resolution::Failed,
      | _ => Resolution::Succeeded,
    }
  }
}

/// The per-remote cache of sent records, keyed by Message ID.
///
/// Also the Message ID allocator: fresh ids are monotonic with
/// wraparound, skipping any id whose record is still live.
#[derive(Debug)]
pub struct SentCache<C: Clock> {
  records: BTreeMap<Id, SendRecord<C>>,
  next_id: u16,
}

impl<C: Clock> Default for SentCache<C> {
  fn default() -> Self {
    Self { records: BTreeMap::new(),
           next_id: 1 }
  }
}

impl<C: Clock> SentCache<C> {
  /// Choose a Message ID that no live record holds.
  ///
  /// `Id(0)` is never produced; it is the "allocate for me"
  /// sentinel in submissions.
  pub fn alloc_id(&mut self) -> Id {
    for _ in 0..=u16::MAX as u32 {
      let id = Id(self.next_id);
      self.next_id = self.next_id.wrapping_add(1);

      if id != Id(0) && !self.records.contains_key(&id) {
        return id;
      }
    }

    // all 65536 ids live at once would need a peer answering
    // nothing for an entire exchange lifetime at wire speed
    Id(self.next_id)
  }

  /// File a record under its id
  pub fn insert(&mut self, id: Id, record: SendRecord<C>) {
    self.records.insert(id, record);
  }

  /// Look at the record for `id`
  pub fn get(&self, id: Id) -> Option<&SendRecord<C>> {
    self.records.get(&id)
  }

  /// Mutably borrow the record for `id`
  pub fn get_mut(&mut self, id: Id) -> Option<&mut SendRecord<C>> {
    self.records.get_mut(&id)
  }

  /// Drop and return every record past its window.
  ///
  /// Ascending id order, like every bulk operation on this cache.
  pub fn reap(&mut self, now: Instant<C>) -> Vec<(Id, SendRecord<C>)> {
    let expired = self.records
                      .iter()
                      .filter(|(_, r)| r.expired(now))
                      .map(|(id, _)| *id)
                      .collect::<Vec<_>>();

    expired.into_iter()
           .filter_map(|id| self.records.remove(&id).map(|r| (id, r)))
           .collect()
  }

  /// Outstanding records whose message is a request; the quantity
  /// NSTART bounds
  pub fn outstanding_requests(&self) -> usize {
    self.records
        .values()
        .filter(|r| r.outstanding() && r.msg.code.kind() == CodeKind::Request)
        .count()
  }

  /// Every record, ascending by id
  pub fn iter_mut(&mut self) -> impl Iterator<Item = (Id, &mut SendRecord<C>)> + '_ {
    self.records.iter_mut().map(|(id, r)| (*id, r))
  }

  /// Number of live records
  pub fn len(&self) -> usize {
    self.records.len()
  }

  /// Whether the cache holds no records
  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  /// Milliseconds until the soonest timer fire or record expiry,
  /// None when the cache is idle
  pub fn next_deadline(&self, now: Instant<C>) -> Option<Millis> {
    self.records
        .values()
        .map(|r| {
          let expiry = Millis::new(r.expires_in
                               .0
                               .saturating_sub(since(now, r.first_tx).0));
          if r.outstanding() {
            r.timer.next_fire(now).min(expiry)
          } else {
            expiry
          }
        })
        .min()
  }
}

#[cfg(test)]
mod tests {
  use tadpole_msg::{Code, Token};

  use super::*;
  use crate::test::ClockMock;

  fn record(ty: Type, code: Code, id: Id, now: Instant<ClockMock>) -> SendRecord<ClockMock> {
    let msg = Message::new(ty, code, id, Token::empty());
    SendRecord::new(Rc::new(msg), Rc::from(vec![0u8; 4]), now, &Params::default())
  }

  #[test]
  fn lifetimes_follow_shape() {
    let now = ClockMock::instant(0);
    assert_eq!(record(Type::Con, Code::GET, Id(1), now).expires_in,
               Millis::new(247_000));
    assert_eq!(record(Type::Con, Code::new(2, 5), Id(1), now).expires_in,
               Millis::new(93_000));
    assert_eq!(record(Type::Non, Code::GET, Id(1), now).expires_in,
               Millis::new(145_000));
    assert_eq!(record(Type::Non, Code::new(2, 5), Id(1), now).expires_in,
               Millis::new(3_000));
  }

  #[test]
  fn resolve_is_terminal() {
    let mut rec = record(Type::Con, Code::GET, Id(1), ClockMock::instant(0));
    assert!(rec.outstanding());
    assert!(rec.resolve(Resolution::Succeeded));
    assert!(!rec.resolve(Resolution::Failed));
    assert_eq!(rec.resolution, Resolution::Succeeded);
    assert!(!rec.outstanding());
  }

  #[test]
  fn alloc_skips_live_ids() {
    let now = ClockMock::instant(0);
    let mut cache = SentCache::<ClockMock>::default();

    assert_eq!(cache.alloc_id(), Id(1));
    assert_eq!(cache.alloc_id(), Id(2));

    cache.insert(Id(3), record(Type::Con, Code::GET, Id(3), now));
    assert_eq!(cache.alloc_id(), Id(4));
  }

  #[test]
  fn alloc_wraps_around_without_yielding_zero() {
    let mut cache = SentCache::<ClockMock>::default();
    cache.next_id = u16::MAX;

    assert_eq!(cache.alloc_id(), Id(u16::MAX));
    assert_eq!(cache.alloc_id(), Id(1));
    assert_eq!(cache.alloc_id(), Id(2));
  }

  #[test]
  fn reap_returns_expired() {
    let mut cache = SentCache::<ClockMock>::default();
    cache.insert(Id(1),
                 record(Type::Con, Code::GET, Id(1), ClockMock::instant(0)));
    cache.insert(Id(2),
                 record(Type::Con, Code::GET, Id(2), ClockMock::instant(100_000)));

    assert!(cache.reap(ClockMock::instant(246_999)).is_empty());

    let reaped = cache.reap(ClockMock::instant(247_000));
    assert_eq!(reaped.len(), 1);
    assert_eq!(reaped[0].0, Id(1));
    assert_eq!(cache.len(), 1);
  }

  #[test]
  fn outstanding_counts_requests_only() {
    let now = ClockMock::instant(0);
    let mut cache = SentCache::<ClockMock>::default();
    cache.insert(Id(1), record(Type::Con, Code::GET, Id(1), now));
    cache.insert(Id(2), record(Type::Non, Code::new(2, 5), Id(2), now));
    assert_eq!(cache.outstanding_requests(), 1);

    cache.get_mut(Id(1)).unwrap().resolve(Resolution::Succeeded);
    assert_eq!(cache.outstanding_requests(), 0);
  }
}
