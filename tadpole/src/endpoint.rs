use std::collections::VecDeque;
use std::rc::Rc;

use embedded_time::Instant;
use tadpole_msg::opt::Registry;
use tadpole_msg::{CodeKind, Id, Message, MessageToBytesError, TryIntoBytes, Type};

use crate::config::Params;
use crate::dedup::{Dedup, RecvCache};
use crate::logging::msg_summary;
use crate::net::Endpoint;
use crate::outbound::{Resolution, SendHandle, SendRecord, SentCache};
use crate::retry::YouShould;
use crate::time::{since, Clock, Millis};

/// Something an [`EndpointState`] wants done or known as a
/// consequence of an event it consumed.
///
/// The state machine never touches the network or the upper layer
/// itself; it hands these back to whoever is driving it.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
  /// Put these bytes on the wire toward this remote.
  ///
  /// `record` names the sent record being (re)transmitted, when
  /// there is one; replayed and reflexive replies carry `None`.
  Tx {
    /// Sent record to resolve as failed if the transport rejects
    /// the datagram
    record: Option<Id>,
    /// The datagram, verbatim
    bytes: Rc<[u8]>,
  },
  /// A fresh inbound request to hand to the upper layer
  Deliver(Rc<Message>),
  /// A fresh inbound response to hand to the upper layer,
  /// paired with the sent record it answers when the pairing is
  /// knowable at this layer
  Response {
    /// The response message
    msg: Rc<Message>,
    /// The sent record it acknowledges, if it arrived
    /// piggybacked on an Acknowledgement
    matching: Option<SendHandle>,
  },
  /// An Acknowledgement or Reset arrived for an outstanding
  /// transmission.  Always precedes the [`Event::Resolved`] it
  /// causes.
  Reply {
    /// The transmission being answered
    handle: SendHandle,
    /// The Ack/Reset itself
    msg: Rc<Message>,
  },
  /// A transmission reached a terminal state
  Resolved {
    /// The transmission
    handle: SendHandle,
    /// How it ended
    outcome: Resolution,
  },
}

/// # Per-remote message-layer state
///
/// The sole owner of everything this node knows about its
/// conversation with one remote endpoint: the sent-record cache,
/// the deduplication cache, the NSTART backlog and the
/// PROBING_RATE budget.
///
/// Drive it with [`submit`](EndpointState::submit),
/// [`recv`](EndpointState::recv) and [`tick`](EndpointState::tick);
/// each returns the [`Event`]s the caller must act on, in order.
#[derive(Debug)]
pub struct EndpointState<C: Clock> {
  remote: Endpoint,
  sent: SentCache<C>,
  recvd: RecvCache<C>,
  queue: VecDeque<(Id, Rc<Message>, Rc<[u8]>)>,
  bytes_in_window: u64,
  window_start: Instant<C>,
  responsive: bool,
  last_heard: Instant<C>,
}

impl<C: Clock> EndpointState<C> {
  /// Fresh state for a remote we have never spoken to
  pub fn new(remote: Endpoint, now: Instant<C>) -> Self {
    Self { remote,
           sent: Default::default(),
           recvd: Default::default(),
           queue: Default::default(),
           bytes_in_window: 0,
           window_start: now,
           responsive: false,
           last_heard: now }
  }

  /// The remote this state tracks
  pub fn remote(&self) -> Endpoint {
    self.remote
  }

  /// Whether the remote has answered us recently enough to relax
  /// the probing budget
  pub fn responsive(&self) -> bool {
    self.responsive
  }

  /// Unresolved request transmissions; the quantity NSTART bounds
  pub fn outstanding(&self) -> usize {
    self.sent.outstanding_requests()
  }

  /// Queued submissions waiting on NSTART or the probing budget
  pub fn backlog(&self) -> usize {
    self.queue.len()
  }

  /// Take a message the upper layer wants sent.
  ///
  /// `Id(0)` asks this layer to allocate a fresh Message ID.
  /// Requests beyond NSTART and non-reply traffic beyond the
  /// probing budget are queued and drained by later
  /// [`tick`](EndpointState::tick)s; everything else produces an
  /// [`Event::Tx`] immediately.
  pub fn submit(&mut self,
                mut msg: Message,
                now: Instant<C>,
                params: &Params)
                -> Result<(SendHandle, Vec<Event>), MessageToBytesError> {
    if msg.id == Id(0) && !msg.ty.is_reply() {
      msg.id = self.sent.alloc_id();
    }

    let id = msg.id;
    let bytes: Rc<[u8]> = Rc::from(msg.clone().try_into_bytes()?);
    let msg = Rc::new(msg);
    let handle = SendHandle { endpoint: self.remote,
                              id };

    if msg.ty.is_reply() {
      // Acks & Resets ride the deduplication cache, not the sent
      // cache; their Message ID belongs to the peer
      if self.recvd.contains(id, now) {
        self.recvd.record_reply(id, bytes.clone());
      }

      return Ok((handle,
                 vec![Event::Tx { record: None,
                                  bytes },
                      Event::Resolved { handle,
                                        outcome: Resolution::Succeeded }]));
    }

    let gated = msg.code.kind() == CodeKind::Request
                && self.sent.outstanding_requests() >= params.nstart() as usize;

    if gated || !self.may_send(bytes.len(), now, params) {
      log::debug!(target: "tadpole", "{} queued behind {} outstanding", msg_summary(&msg), self.sent.outstanding_requests());
      self.queue.push_back((id, msg, bytes));
      return Ok((handle, Vec::new()));
    }

    let tx = self.transmit(id, msg, bytes, now, params);
    Ok((handle, vec![tx]))
  }

  /// Consume a decoded, well-shaped datagram from the remote.
  pub fn recv(&mut self,
              msg: Message,
              now: Instant<C>,
              params: &Params,
              registry: &Registry)
              -> Vec<Event> {
    let mut events = Vec::new();

    match msg.ty {
      | Type::Ack | Type::Reset => self.recv_reply(msg, now, &mut events),
      | Type::Con | Type::Non => self.recv_message(msg, now, params, registry, &mut events),
    }

    events
  }

  /// The upper layer decided the fate of a transmission on its
  /// own (e.g. a response matched by token at the exchange layer).
  ///
  /// Stops the retransmission timer but keeps the record alive
  /// for its deduplication window.
  pub fn upper_resolution(&mut self,
                          id: Id,
                          outcome: Resolution,
                          now: Instant<C>)
                          -> Option<Event> {
    if !outcome.is_resolved() {
      return None;
    }

    let remote = self.remote;
    let resolved = self.sent
                       .get_mut(id)
                       .filter(|r| r.outstanding())
                       .map(|rec| {
                         rec.resolve(outcome);
                         Event::Resolved { handle: SendHandle { endpoint: remote,
                                                                id },
                                           outcome }
                       });

    if resolved.is_some() && outcome == Resolution::Succeeded {
      self.responsive = true;
      self.last_heard = now;
    }

    resolved
  }

  /// Withdraw a submission.
  ///
  /// A message still in the backlog is dropped entirely.  One that
  /// already hit the wire keeps its record (a reply may still
  /// resolve it) but will not be retransmitted again.  Returns
  /// false when there was nothing left to cancel.
  pub fn cancel(&mut self, id: Id) -> bool {
    if let Some(at) = self.queue.iter().position(|(qid, _, _)| *qid == id) {
      let _ = self.queue.remove(at);
      return true;
    }

    match self.sent.get_mut(id) {
      | Some(rec) if rec.outstanding() => {
        let stopped = rec.timer.cancel();
        rec.cancelled = rec.cancelled || stopped;
        stopped
      },
      | _ => false,
    }
  }

  /// Terminal state of a transmission, None once its record has
  /// aged out (or never existed)
  pub fn resolution(&self, id: Id) -> Option<Resolution> {
    if self.queue.iter().any(|(qid, _, _)| *qid == id) {
      return Some(Resolution::Unresolved);
    }

    self.sent.get(id).map(|r| r.resolution)
  }

  /// The transport refused a datagram belonging to `record`;
  /// resolve it as failed.
  pub fn transport_failed(&mut self, id: Id) -> Option<Event> {
    let remote = self.remote;
    self.sent
        .get_mut(id)
        .filter(|r| r.outstanding())
        .map(|rec| {
          rec.resolve(Resolution::Failed);
          Event::Resolved { handle: SendHandle { endpoint: remote,
                                                 id },
                            outcome: Resolution::Failed }
        })
  }

  /// Let time pass: fire due retransmissions (ascending Message
  /// ID order), reap expired records, reset responsiveness after
  /// a quiet spell, and drain the backlog as budget allows.
  pub fn tick(&mut self, now: Instant<C>, params: &Params) -> Vec<Event> {
    let mut events = Vec::new();
    let remote = self.remote;

    if self.responsive && since(now, self.last_heard) >= params.quiet_interval() {
      self.responsive = false;
      self.window_start = now;
      self.bytes_in_window = 0;
    }

    for (id, rec) in self.sent.iter_mut() {
      if !rec.outstanding() || rec.msg.ty != Type::Con {
        continue;
      }

      match rec.timer.what_should_i_do(now) {
        | Ok(YouShould::Retry) => {
          log::debug!(target: "tadpole", "retransmitting {} (attempt {})", msg_summary(&rec.msg), rec.timer.attempts().0);
          events.push(Event::Tx { record: Some(id),
                                  bytes: rec.bytes.clone() });
        },
        | Ok(YouShould::Cry) => {
          rec.resolve(Resolution::Failed);
          events.push(Event::Resolved { handle: SendHandle { endpoint: remote,
                                                             id },
                                        outcome: Resolution::Failed });
        },
        | Err(nb::Error::WouldBlock) => (),
        | Err(nb::Error::Other(infallible)) => match infallible {},
      }
    }

    for (id, rec) in self.sent.reap(now) {
      if rec.outstanding() {
        events.push(Event::Resolved { handle: SendHandle { endpoint: remote,
                                                           id },
                                      outcome: rec.expiry_outcome() });
      }
    }

    self.recvd.reap(now);

    while let Some((id, msg, bytes)) = self.queue.pop_front() {
      let gated = msg.code.kind() == CodeKind::Request
                  && self.sent.outstanding_requests() >= params.nstart() as usize;

      if gated || !self.may_send(bytes.len(), now, params) {
        self.queue.push_front((id, msg, bytes));
        break;
      }

      let tx = self.transmit(id, msg, bytes, now, params);
      events.push(tx);
    }

    events
  }

  /// Milliseconds until this state next needs a
  /// [`tick`](EndpointState::tick), None when fully idle
  pub fn next_deadline(&self, now: Instant<C>, params: &Params) -> Option<Millis> {
    let backlog = self.queue.front().map(|(_, _, bytes)| {
                                      if self.responsive {
                                        Millis::new(0)
                                      } else {
                                        self.probing_wait(bytes.len(), now, params)
                                      }
                                    });

    [self.sent.next_deadline(now), self.recvd.next_deadline(now), backlog].into_iter()
                                                                          .flatten()
                                                                          .min()
  }

  fn transmit(&mut self,
              id: Id,
              msg: Rc<Message>,
              bytes: Rc<[u8]>,
              now: Instant<C>,
              params: &Params)
              -> Event {
    self.account(bytes.len(), now, params);
    self.sent.insert(id, SendRecord::new(msg, bytes.clone(), now, params));
    Event::Tx { record: Some(id),
                bytes }
  }

  /// Sliding PROBING_RATE budget.  A responsive peer is exempt;
  /// toward a silent one we always allow the first datagram of a
  /// window, then hold the average at `probing_rate`.
  fn may_send(&self, len: usize, now: Instant<C>, params: &Params) -> bool {
    if self.responsive || self.bytes_in_window == 0 {
      return true;
    }

    let budget = params.probing_rate().0 as u64 * since(now, self.window_start).0 / 1_000;
    self.bytes_in_window + len as u64 <= budget
  }

  /// Milliseconds until the probing budget admits `len` more bytes
  fn probing_wait(&self, len: usize, now: Instant<C>, params: &Params) -> Millis {
    if self.may_send(len, now, params) {
      return Millis::new(0);
    }

    let needed_ms =
      (self.bytes_in_window + len as u64) * 1_000 / params.probing_rate().0 as u64;
    Millis::new(needed_ms.saturating_sub(since(now, self.window_start).0))
  }

  fn account(&mut self, len: usize, now: Instant<C>, params: &Params) {
    if since(now, self.window_start) >= params.quiet_interval() {
      self.window_start = now;
      self.bytes_in_window = 0;
    }

    self.bytes_in_window += len as u64;
  }

  fn recv_reply(&mut self, msg: Message, now: Instant<C>, events: &mut Vec<Event>) {
    let id = msg.id;
    let remote = self.remote;

    match self.sent.get_mut(id) {
      | Some(rec) if rec.outstanding() => {
        let handle = SendHandle { endpoint: remote,
                                  id };
        let outcome = match msg.ty {
          | Type::Ack => Resolution::Succeeded,
          | _ => Resolution::Failed,
        };
        let msg = Rc::new(msg);

        self.responsive = true;
        self.last_heard = now;

        events.push(Event::Reply { handle,
                                   msg: msg.clone() });

        if msg.code.kind() == CodeKind::Response {
          events.push(Event::Response { msg: msg.clone(),
                                        matching: Some(handle) });
        }

        rec.resolve(outcome);
        events.push(Event::Resolved { handle, outcome });
      },
      | Some(_) => {
        log::debug!(target: "tadpole", "late {} for already-resolved {:?}", msg_summary(&msg), id);
      },
      | None => {
        log::warn!(target: "tadpole", "dropping {} matching no outstanding transmission", msg_summary(&msg));
      },
    }
  }

  fn recv_message(&mut self,
                  msg: Message,
                  now: Instant<C>,
                  params: &Params,
                  registry: &Registry,
                  events: &mut Vec<Event>) {
    let id = msg.id;
    let window = match msg.ty {
      | Type::Con => params.exchange_lifetime(),
      | _ => params.non_lifetime(),
    };

    match self.recvd.check(id, now, window) {
      | Dedup::Duplicate(Some(bytes)) => {
        log::debug!(target: "tadpole", "duplicate {:?}, replaying earlier reply", id);
        events.push(Event::Tx { record: None,
                                bytes });
      },
      | Dedup::Duplicate(None) => {
        log::debug!(target: "tadpole", "duplicate {:?}, nothing to replay", id);
      },
      | Dedup::Fresh => self.recv_fresh(msg, now, registry, events),
    }
  }

  fn recv_fresh(&mut self,
                msg: Message,
                now: Instant<C>,
                registry: &Registry,
                events: &mut Vec<Event>) {
    let id = msg.id;

    let acceptable = match msg.validate_shape() {
      | Err(e) => {
        log::warn!(target: "tadpole", "rejecting {}: {:?}", msg_summary(&msg), e);
        false
      },
      | Ok(()) => match registry.validate(&msg) {
        | Err(e) => {
          log::warn!(target: "tadpole", "rejecting {}: {:?}", msg_summary(&msg), e);
          false
        },
        | Ok(()) => true,
      },
    };

    if !acceptable {
      // a Confirmable message the receiver cannot process gets a
      // Reset so the peer stops retransmitting
      if msg.ty == Type::Con {
        self.push_reply(id, msg.rst(), events);
      }
      return;
    }

    match (msg.ty, msg.code.kind()) {
      | (Type::Con, CodeKind::Empty) => {
        // CoAP ping; answer Reset and deliver nothing
        self.push_reply(id, msg.rst(), events);
      },
      | (Type::Non, CodeKind::Empty) => {
        log::debug!(target: "tadpole", "ignoring empty non-confirmable {:?}", id);
      },
      | (_, CodeKind::Request) => {
        events.push(Event::Deliver(Rc::new(msg)));
      },
      | (ty, _) => {
        // a response in its own exchange; pairing it with a
        // request happens by token, above this layer
        if ty == Type::Con {
          self.push_reply(id, msg.ack(), events);
        }
        events.push(Event::Response { msg: Rc::new(msg),
                                      matching: None });
      },
    }
  }

  /// Encode and emit a reply born inside the state machine (auto
  /// Ack and Reset), caching its bytes for duplicate replay.
  fn push_reply(&mut self, in_reply_to: Id, reply: Message, events: &mut Vec<Event>) {
    match reply.try_into_bytes() {
      | Ok(bytes) => {
        let bytes: Rc<[u8]> = Rc::from(bytes);
        self.recvd.record_reply(in_reply_to, bytes.clone());
        events.push(Event::Tx { record: None,
                                bytes });
      },
      | Err(e) => {
        log::error!(target: "tadpole", "could not encode reply to {:?}: {:?}", in_reply_to, e);
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use tadpole_msg::{Code, Token, TryFromBytes};

  use super::*;
  use crate::test::{dummy_endpoint, ClockMock};

  fn state(now: u64) -> EndpointState<ClockMock> {
    EndpointState::new(dummy_endpoint(), ClockMock::instant(now))
  }

  fn con_get(id: u16) -> Message {
    Message::new(Type::Con, Code::GET, Id(id), Token::empty())
  }

  fn tx_bytes(events: &[Event]) -> Vec<Rc<[u8]>> {
    events.iter()
          .filter_map(|e| match e {
            | Event::Tx { bytes, .. } => Some(bytes.clone()),
            | _ => None,
          })
          .collect()
  }

  #[test]
  fn submit_assigns_fresh_ids() {
    let mut state = state(0);
    let params = Params::default();

    let (handle, events) = state.submit(con_get(0), ClockMock::instant(0), &params)
                                .unwrap();
    assert_eq!(handle.id, Id(1));
    assert_eq!(events.len(), 1);
    assert_eq!(state.resolution(Id(1)), Some(Resolution::Unresolved));
  }

  #[test]
  fn nstart_queues_second_request() {
    let mut state = state(0);
    let params = Params::default();
    let now = ClockMock::instant(0);

    let (a, ev_a) = state.submit(con_get(0), now, &params).unwrap();
    let (b, ev_b) = state.submit(con_get(0), now, &params).unwrap();

    assert_eq!(ev_a.len(), 1);
    assert!(ev_b.is_empty());
    assert_eq!(state.backlog(), 1);

    // resolving A lets the next tick transmit B
    let rst = Message::new(Type::Reset, Code::EMPTY, a.id, Token::empty());
    state.recv(rst, now, &params, &Registry::core());

    let events = state.tick(now, &params);
    assert!(matches!(events[..], [Event::Tx { record: Some(id), .. }] if id == b.id));
    assert_eq!(state.backlog(), 0);
  }

  #[test]
  fn ack_resolves_and_reply_precedes_resolved() {
    let mut state = state(0);
    let params = Params::default();
    let now = ClockMock::instant(0);

    let (handle, _) = state.submit(con_get(0), now, &params).unwrap();

    let ack = Message::new(Type::Ack, Code::EMPTY, handle.id, Token::empty());
    let events = state.recv(ack, ClockMock::instant(500), &params, &Registry::core());

    assert!(matches!(events[0], Event::Reply { handle: h, .. } if h == handle));
    assert!(matches!(events[1],
                     Event::Resolved { handle: h, outcome: Resolution::Succeeded } if h == handle));
    assert_eq!(state.resolution(handle.id), Some(Resolution::Succeeded));
    assert!(state.responsive());
  }

  #[test]
  fn piggybacked_response_is_delivered_and_pairs() {
    let mut state = state(0);
    let params = Params::default();
    let now = ClockMock::instant(0);

    let (handle, _) = state.submit(con_get(0), now, &params).unwrap();

    let mut content = Message::new(Type::Ack, Code::new(2, 5), handle.id, Token::empty());
    content.payload = tadpole_msg::Payload(b"hi".to_vec());
    let events = state.recv(content, now, &params, &Registry::core());

    assert!(matches!(events[0], Event::Reply { .. }));
    assert!(matches!(events[1], Event::Response { matching: Some(h), .. } if h == handle));
    assert!(matches!(events[2],
                     Event::Resolved { outcome: Resolution::Succeeded, .. }));
  }

  #[test]
  fn unmatched_reply_is_dropped() {
    let mut state = state(0);
    let params = Params::default();

    let rst = Message::new(Type::Reset, Code::EMPTY, Id(999), Token::empty());
    let events = state.recv(rst, ClockMock::instant(0), &params, &Registry::core());
    assert!(events.is_empty());
  }

  #[test]
  fn inbound_request_is_delivered_once() {
    let mut state = state(0);
    let params = Params::default();
    let registry = Registry::core();

    let events = state.recv(con_get(5), ClockMock::instant(0), &params, &registry);
    assert!(matches!(events[..], [Event::Deliver(_)]));

    // same mid again before any reply was cached: silent drop
    let events = state.recv(con_get(5), ClockMock::instant(1_000), &params, &registry);
    assert!(events.is_empty());
  }

  #[test]
  fn duplicate_replays_cached_ack_verbatim() {
    let mut state = state(0);
    let params = Params::default();
    let registry = Registry::core();
    let now = ClockMock::instant(0);

    state.recv(con_get(5), now, &params, &registry);

    // upper layer acks mid 5
    let ack = Message::new(Type::Ack, Code::EMPTY, Id(5), Token::empty());
    let (_, events) = state.submit(ack.clone(), now, &params).unwrap();
    let sent = tx_bytes(&events);
    assert_eq!(sent.len(), 1);

    // duplicate of the request one second later
    let events = state.recv(con_get(5), ClockMock::instant(1_000), &params, &registry);
    let replayed = tx_bytes(&events);
    assert_eq!(replayed, sent);
    assert!(!events.iter().any(|e| matches!(e, Event::Deliver(_))));
  }

  #[test]
  fn ping_answers_reset_with_same_mid() {
    let mut state = state(0);
    let params = Params::default();

    let ping = Message::ping(Id(0x1234));
    let events = state.recv(ping, ClockMock::instant(0), &params, &Registry::core());

    let sent = tx_bytes(&events);
    assert_eq!(sent.len(), 1);
    let rst = Message::try_from_bytes(&sent[0][..]).unwrap();
    assert_eq!(rst.ty, Type::Reset);
    assert_eq!(rst.id, Id(0x1234));
    assert!(!events.iter().any(|e| matches!(e, Event::Deliver(_))));
  }

  #[test]
  fn unrecognized_critical_option_resets_con() {
    let mut state = state(0);
    let params = Params::default();

    let mut msg = con_get(7);
    msg.opts
       .insert(tadpole_msg::OptNumber(9), tadpole_msg::OptValue::empty());

    let events = state.recv(msg, ClockMock::instant(0), &params, &Registry::core());

    let sent = tx_bytes(&events);
    assert_eq!(sent.len(), 1);
    let rst = Message::try_from_bytes(&sent[0][..]).unwrap();
    assert_eq!(rst.ty, Type::Reset);
    assert_eq!(rst.id, Id(7));
    assert!(!events.iter().any(|e| matches!(e, Event::Deliver(_))));
  }

  #[test]
  fn con_response_is_acked_automatically() {
    let mut state = state(0);
    let params = Params::default();

    let response = Message::new(Type::Con, Code::new(2, 5), Id(40), Token::empty());
    let events = state.recv(response, ClockMock::instant(0), &params, &Registry::core());

    let sent = tx_bytes(&events);
    assert_eq!(sent.len(), 1);
    let ack = Message::try_from_bytes(&sent[0][..]).unwrap();
    assert_eq!(ack.ty, Type::Ack);
    assert_eq!(ack.id, Id(40));
    assert!(events.iter()
                  .any(|e| matches!(e, Event::Response { matching: None, .. })));
  }

  #[test]
  fn cancellation_before_and_after_first_tx() {
    let mut state = state(0);
    let params = Params::default();
    let now = ClockMock::instant(0);

    let (a, _) = state.submit(con_get(0), now, &params).unwrap();
    let (b, _) = state.submit(con_get(0), now, &params).unwrap();

    // b is still queued: cancelling drops it outright
    assert!(state.cancel(b.id));
    assert_eq!(state.resolution(b.id), None);

    // a hit the wire: cancelling stops retransmission but keeps
    // the record addressable
    assert!(state.cancel(a.id));
    assert!(!state.cancel(a.id));
    assert_eq!(state.resolution(a.id), Some(Resolution::Unresolved));

    let events = state.tick(ClockMock::instant(10_000), &params);
    assert!(tx_bytes(&events).is_empty());

    // a reply can still resolve the cancelled record
    let ack = Message::new(Type::Ack, Code::EMPTY, a.id, Token::empty());
    state.recv(ack, ClockMock::instant(11_000), &params, &Registry::core());
    assert_eq!(state.resolution(a.id), Some(Resolution::Succeeded));
  }

  #[test]
  fn upper_layer_resolution_cancels_retransmission_but_keeps_the_record() {
    let mut state = state(0);
    let params = Params::default();
    let now = ClockMock::instant(0);

    let (handle, _) = state.submit(con_get(0), now, &params).unwrap();

    let event = state.upper_resolution(handle.id, Resolution::Succeeded, now);
    assert!(matches!(event,
                     Some(Event::Resolved { outcome: Resolution::Succeeded, .. })));
    assert!(state.responsive());

    // nothing more ever hits the wire for it
    let events = state.tick(ClockMock::instant(10_000), &params);
    assert!(tx_bytes(&events).is_empty());

    // but the Message ID stays pinned for its window
    assert_eq!(state.resolution(handle.id), Some(Resolution::Succeeded));
  }

  #[test]
  fn probing_rate_throttles_non_responsive_peer() {
    let mut state = state(0);
    let params = Params::default();
    let now = ClockMock::instant(0);

    // non-request NONs dodge NSTART, so only the byte budget gates them
    let non = |id: u16| Message::new(Type::Non, Code::new(2, 5), Id(id), Token::empty());

    let (_, first) = state.submit(non(100), now, &params).unwrap();
    assert_eq!(tx_bytes(&first).len(), 1);

    // window open, budget spent: the second send queues
    let (_, second) = state.submit(non(101), now, &params).unwrap();
    assert!(second.is_empty());
    assert_eq!(state.backlog(), 1);

    // 4 header bytes at 1 B/s: affordable after 8 seconds
    assert!(tx_bytes(&state.tick(ClockMock::instant(2_000), &params)).is_empty());
    assert_eq!(tx_bytes(&state.tick(ClockMock::instant(8_000), &params)).len(), 1);
  }

  #[test]
  fn responsive_peer_is_not_throttled() {
    let mut state = state(0);
    let params = Params::default();
    let now = ClockMock::instant(0);

    let (handle, _) = state.submit(con_get(0), now, &params).unwrap();
    let ack = Message::new(Type::Ack, Code::EMPTY, handle.id, Token::empty());
    state.recv(ack, now, &params, &Registry::core());

    let non = |id: u16| Message::new(Type::Non, Code::new(2, 5), Id(id), Token::empty());
    for id in 200..210 {
      let (_, events) = state.submit(non(id), now, &params).unwrap();
      assert_eq!(tx_bytes(&events).len(), 1);
    }
  }

  #[test]
  fn quiet_interval_resets_responsiveness() {
    let mut state = state(0);
    let params = Params::default();
    let now = ClockMock::instant(0);

    let (handle, _) = state.submit(con_get(0), now, &params).unwrap();
    let ack = Message::new(Type::Ack, Code::EMPTY, handle.id, Token::empty());
    state.recv(ack, now, &params, &Registry::core());
    assert!(state.responsive());

    state.tick(ClockMock::instant(params.quiet_interval().0), &params);
    assert!(!state.responsive());
  }

  #[test]
  fn expiry_resolves_and_reaps() {
    let mut state = state(0);
    let params = Params::default();
    let now = ClockMock::instant(0);

    // NON response: lives ack_timeout * ack_random_factor = 3 s
    let non = Message::new(Type::Non, Code::new(2, 5), Id(0), Token::empty());
    let (handle, _) = state.submit(non, now, &params).unwrap();

    let events = state.tick(ClockMock::instant(3_000), &params);
    assert!(events.iter().any(|e| {
                            matches!(e, Event::Resolved { handle: h, outcome: Resolution::Succeeded }
                                     if *h == handle)
                          }));
    assert_eq!(state.resolution(handle.id), None);
  }
}
