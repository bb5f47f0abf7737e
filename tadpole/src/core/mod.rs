use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use embedded_time::Instant;
use tadpole_msg::opt::Registry;
use tadpole_msg::{Message, Shell, TryFromBytes, TryIntoBytes, Type};

use crate::config::{InvalidParams, Params};
use crate::endpoint::{EndpointState, Event};
use crate::net::{Addrd, Endpoint, Transport};
use crate::outbound::{Resolution, SendHandle};
use crate::time::{Clock, Millis};

/// Core errors
pub mod error;

pub use error::{Error, SubmitError};

/// What the message layer has to tell the upper layer.
///
/// Drained with [`Core::poll_event`] after each call into the
/// core; ordering is meaningful (a [`Reply`](CoreEvent::Reply)
/// always precedes the [`Resolved`](CoreEvent::Resolved) it
/// causes).
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
  /// A fresh request arrived
  InboundRequest {
    /// Who sent it
    source: Endpoint,
    /// The request
    msg: Rc<Message>,
  },
  /// A fresh response arrived
  InboundResponse {
    /// Who sent it
    source: Endpoint,
    /// The response
    msg: Rc<Message>,
    /// The transmission it acknowledges, when it rode piggyback
    /// on an Acknowledgement; separate responses pair by token
    /// above this layer
    matching: Option<SendHandle>,
  },
  /// An Acknowledgement or Reset arrived for an outstanding
  /// transmission
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

/// # The message-layer event loop
///
/// Owns the clock, the injected [`Transport`], the option
/// [`Registry`], a [`Params`] snapshot and one [`EndpointState`]
/// per remote spoken to.  Strictly single-threaded: every call
/// runs to completion and no state is observable half-updated.
///
/// The embedder's loop is three calls:
///
/// ```no_run
/// use std::net::UdpSocket;
///
/// use tadpole::core::Core;
/// use tadpole::std::Clock;
///
/// let socket = UdpSocket::bind("0.0.0.0:5683").unwrap();
/// socket.set_nonblocking(true).unwrap();
/// let mut core = Core::new(Clock::new(), socket);
///
/// loop {
///   core.poll().unwrap();
///   while let Some(event) = core.poll_event() {
///     // hand requests & responses to the application
///   }
///   // sleep for core.next_wakeup() or until the socket is readable
/// }
/// ```
#[derive(Debug)]
pub struct Core<C: Clock, T: Transport> {
  clock: C,
  transport: T,
  params: Params,
  registry: Registry,
  states: BTreeMap<Endpoint, EndpointState<C>>,
  events: VecDeque<CoreEvent>,
}

impl<C: Clock, T: Transport> Core<C, T> {
  /// A core with default [`Params`] and the base option table
  pub fn new(clock: C, transport: T) -> Self {
    Self { clock,
           transport,
           params: Params::default(),
           registry: Registry::core(),
           states: BTreeMap::new(),
           events: VecDeque::new() }
  }

  /// A core with custom parameters and registry.
  ///
  /// The parameter set is validated here; an invalid one is fatal
  /// to startup rather than a latent misbehavior.
  pub fn try_new(clock: C,
                 transport: T,
                 params: Params,
                 registry: Registry)
                 -> Result<Self, InvalidParams> {
    params.validate()?;
    Ok(Self { clock,
              transport,
              params,
              registry,
              states: BTreeMap::new(),
              events: VecDeque::new() })
  }

  /// The parameter snapshot every step runs under
  pub fn params(&self) -> &Params {
    &self.params
  }

  /// The option registry
  pub fn registry(&self) -> &Registry {
    &self.registry
  }

  /// Register extension options during startup.
  ///
  /// The registry is append-only once datagrams are flowing;
  /// changing an option's meaning mid-conversation is undefined.
  pub fn registry_mut(&mut self) -> &mut Registry {
    &mut self.registry
  }

  /// Hand a message to the layer for transmission to `dest`.
  ///
  /// `Id(0)` lets the layer allocate a Message ID that is fresh
  /// for that destination.  The returned handle is a weak index:
  /// resolution events for it arrive via
  /// [`poll_event`](Core::poll_event), and
  /// [`resolution`](Core::resolution) answers polls.
  pub fn submit(&mut self, dest: Endpoint, msg: Message) -> Result<SendHandle, SubmitError> {
    msg.validate_shape().map_err(SubmitError::Shape)?;

    let now = self.clock.try_now().map_err(SubmitError::Clock)?;
    let state = self.states
                    .entry(dest)
                    .or_insert_with(|| EndpointState::new(dest, now));

    let (handle, events) = state.submit(msg, now, &self.params)
                                .map_err(SubmitError::ToBytes)?;
    self.run_events(dest, events);
    Ok(handle)
  }

  /// Withdraw a submission; see
  /// [`EndpointState::cancel`](crate::endpoint::EndpointState::cancel)
  /// for exactly what that means at each stage of a
  /// transmission's life.
  pub fn cancel(&mut self, handle: &SendHandle) -> bool {
    self.states
        .get_mut(&handle.endpoint)
        .map(|s| s.cancel(handle.id))
        .unwrap_or(false)
  }

  /// The upper layer learned the fate of a transmission through
  /// its own means (e.g. token matching): stop retransmitting,
  /// keep the record for deduplication.
  pub fn conclude(&mut self,
                  handle: &SendHandle,
                  outcome: Resolution)
                  -> Result<(), Error<T::Error>> {
    let now = self.clock.try_now().map_err(Error::Clock)?;

    if let Some(event) = self.states
                             .get_mut(&handle.endpoint)
                             .and_then(|s| s.upper_resolution(handle.id, outcome, now))
    {
      self.run_events(handle.endpoint, vec![event]);
    }

    Ok(())
  }

  /// Terminal state of a transmission, None once its record aged
  /// out of the deduplication window
  pub fn resolution(&self, handle: &SendHandle) -> Option<Resolution> {
    self.states
        .get(&handle.endpoint)
        .and_then(|s| s.resolution(handle.id))
  }

  /// One event-loop step: drain the transport, then let every
  /// endpoint state see the time.
  ///
  /// Any record past a deadline when this is called is dealt with
  /// before it returns.
  pub fn poll(&mut self) -> Result<(), Error<T::Error>> {
    let now = self.clock.try_now().map_err(Error::Clock)?;

    while let Some(Addrd(bytes, source)) = self.transport.poll().map_err(Error::Transport)? {
      self.recv_dgram(source, bytes, now);
    }

    let endpoints = self.states.keys().copied().collect::<Vec<_>>();
    for endpoint in endpoints {
      let events = match self.states.get_mut(&endpoint) {
        | Some(state) => state.tick(now, &self.params),
        | None => continue,
      };
      self.run_events(endpoint, events);
    }

    Ok(())
  }

  /// Next event for the upper layer, if any
  pub fn poll_event(&mut self) -> Option<CoreEvent> {
    self.events.pop_front()
  }

  /// Milliseconds until some deadline (retransmission, record
  /// expiry, probing-budget refresh) needs a [`poll`](Core::poll);
  /// None when fully idle.  The embedder may always poll sooner.
  pub fn next_wakeup(&self) -> Option<Millis> {
    let now = self.clock.try_now().ok()?;

    self.states
        .values()
        .filter_map(|s| s.next_deadline(now, &self.params))
        .min()
  }

  /// Peek at the state for one remote, if we have ever spoken
  pub fn endpoint_state(&self, endpoint: &Endpoint) -> Option<&EndpointState<C>> {
    self.states.get(endpoint)
  }

  fn recv_dgram(&mut self, source: Endpoint, bytes: Vec<u8>, now: Instant<C>) {
    match Message::try_from_bytes(&bytes) {
      | Ok(msg) => {
        let state = self.states
                        .entry(source)
                        .or_insert_with(|| EndpointState::new(source, now));
        let events = state.recv(msg, now, &self.params, &self.registry);
        self.run_events(source, events);
      },
      | Err(e) => {
        log::warn!(target: "tadpole", "dropping undecodable {} byte datagram: {:?}", bytes.len(), e);

        // a garbled Confirmable still gets a Reset so the peer
        // stops retransmitting it
        match Shell::try_from_bytes(&bytes) {
          | Some(shell) if shell.ty == Type::Con => {
            if let Ok(rst) = shell.rst().try_into_bytes() {
              self.send_raw(source, None, &rst);
            }
          },
          | _ => (),
        }
      },
    }
  }

  /// Put bytes on the wire; a refusal resolves `record` as failed
  /// rather than surfacing an error.
  fn send_raw(&mut self, endpoint: Endpoint, record: Option<tadpole_msg::Id>, bytes: &[u8]) {
    match nb::block!(self.transport.send(Addrd(bytes, endpoint))) {
      | Ok(()) => (),
      | Err(e) => {
        log::warn!(target: "tadpole", "transport refused {} bytes to {:?}: {:?}", bytes.len(), endpoint, e);

        if let Some(Event::Resolved { handle, outcome }) =
          record.and_then(|id| {
                  self.states
                      .get_mut(&endpoint)
                      .and_then(|s| s.transport_failed(id))
                })
        {
          self.events.push_back(CoreEvent::Resolved { handle, outcome });
        }
      },
    }
  }

  fn run_events(&mut self, endpoint: Endpoint, events: Vec<Event>) {
    for event in events {
      match event {
        | Event::Tx { record, bytes } => self.send_raw(endpoint, record, &bytes),
        | Event::Deliver(msg) => self.events.push_back(CoreEvent::InboundRequest { source:
                                                                                     endpoint,
                                                                                   msg }),
        | Event::Response { msg, matching } => {
          self.events.push_back(CoreEvent::InboundResponse { source: endpoint,
                                                             msg,
                                                             matching })
        },
        | Event::Reply { handle, msg } => {
          self.events.push_back(CoreEvent::Reply { handle, msg })
        },
        | Event::Resolved { handle, outcome } => {
          self.events.push_back(CoreEvent::Resolved { handle, outcome })
        },
      }
    }
  }
}
