use std::collections::BTreeMap;
use std::rc::Rc;

use embedded_time::Instant;
use tadpole_msg::Id;

use crate::time::{since, Clock, Millis};

/// What the deduplication cache knows about an inbound Message ID
#[derive(Debug, Clone)]
pub enum Dedup {
  /// First sighting inside the window; process and deliver it
  Fresh,
  /// Seen before.  If we replied last time, here are the exact
  /// bytes to put on the wire again; otherwise stay silent and
  /// let the peer retransmit.
  Duplicate(Option<Rc<[u8]>>),
}

/// Book-keeping for one message received from a peer
#[derive(Debug)]
pub struct RecvRecord<C: Clock> {
  /// When the first copy arrived
  pub received_at: Instant<C>,
  /// Window after `received_at` during which later copies are
  /// duplicates
  pub expires_in: Millis,
  /// The encoded reply we sent, if any, kept verbatim for replay
  pub reply: Option<Rc<[u8]>>,
}

impl<C: Clock> RecvRecord<C> {
  /// Past the deduplication window
  pub fn expired(&self, now: Instant<C>) -> bool {
    since(now, self.received_at) >= self.expires_in
  }
}

/// The per-remote deduplication cache, keyed by Message ID.
///
/// Only Confirmable and Non-confirmable messages go through it;
/// Acknowledgements and Resets carry the *peer's* idea of a Message
/// ID and are paired against the sent cache instead.
#[derive(Debug)]
pub struct RecvCache<C: Clock> {
  records: BTreeMap<Id, RecvRecord<C>>,
}

impl<C: Clock> Default for RecvCache<C> {
  fn default() -> Self {
    Self { records: BTreeMap::new() }
  }
}

impl<C: Clock> RecvCache<C> {
  /// Register a sighting of `id`.  Fresh ids are recorded with the
  /// window `expires_in`; duplicates return what we know.
  pub fn check(&mut self, id: Id, now: Instant<C>, expires_in: Millis) -> Dedup {
    match self.records.get(&id) {
      | Some(record) if !record.expired(now) => Dedup::Duplicate(record.reply.clone()),
      | _ => {
        self.records.insert(id,
                            RecvRecord { received_at: now,
                                         expires_in,
                                         reply: None });
        Dedup::Fresh
      },
    }
  }

  /// Remember the bytes we replied to `id` with, to be replayed
  /// verbatim when a duplicate shows up
  pub fn record_reply(&mut self, id: Id, bytes: Rc<[u8]>) {
    if let Some(record) = self.records.get_mut(&id) {
      record.reply = Some(bytes);
    }
  }

  /// Whether `id` is inside its deduplication window
  pub fn contains(&self, id: Id, now: Instant<C>) -> bool {
    self.records
        .get(&id)
        .map(|r| !r.expired(now))
        .unwrap_or(false)
  }

  /// Drop every record past its window
  pub fn reap(&mut self, now: Instant<C>) {
    self.records.retain(|_, r| !r.expired(now));
  }

  /// Number of ids being remembered
  pub fn len(&self) -> usize {
    self.records.len()
  }

  /// Whether the cache holds no records
  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  /// Milliseconds until the soonest record expiry, None when empty
  pub fn next_deadline(&self, now: Instant<C>) -> Option<Millis> {
    self.records
        .values()
        .map(|r| Millis::new(r.expires_in.0.saturating_sub(since(now, r.received_at).0)))
        .min()
  }
}
