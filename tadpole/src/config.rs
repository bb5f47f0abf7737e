use core::ops::RangeInclusive;

use crate::time::Millis;

/// Bytes / Second
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BytesPerSecond(pub u16);

/// A parameter set that cannot drive the protocol
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub enum InvalidParams {
  /// `ack_random_factor` must be at least 1.0; anything lower
  /// shrinks the initial timeout below `ack_timeout`
  AckRandomFactorTooSmall(f32),
  /// `ack_timeout` of zero would retransmit in a busy loop
  ZeroAckTimeout,
  /// `nstart` of zero would never allow a request out
  ZeroNstart,
  /// `probing_rate` of zero would never allow a byte toward a
  /// non-responsive peer
  ZeroProbingRate,
  /// The retransmission schedule `((2^(1+max_retransmit)) - 1) ·
  /// ack_timeout · ack_random_factor` does not fit inside
  /// `max_transmit_wait`
  #[allow(missing_docs)]
  RetransmissionSpanTooWide { span: Millis, wait: Millis },
}

/// # Transmission parameters
///
/// The tunables of RFC7252 Section 4.8 plus the durations derived
/// from them, all in milliseconds.
///
/// A `Params` is a plain value: the event loop snapshots it at the
/// start of each step and endpoint state receives it by reference,
/// so mutation can never be observed mid-step.  All mutation goes
/// through the `with_*` methods, which re-derive the dependent
/// durations and re-validate the whole set.
///
/// ```
/// use embedded_time::fixed_point::FixedPoint;
/// use tadpole::config::Params;
/// use tadpole::time::Millis;
///
/// let params = Params::default();
/// assert_eq!(params.ack_timeout(), Millis::new(2_000));
/// assert_eq!(params.max_transmit_span(), Millis::new(45_000));
/// assert_eq!(params.max_transmit_wait(), Millis::new(93_000));
/// assert_eq!(params.exchange_lifetime(), Millis::new(247_000));
/// assert_eq!(params.non_lifetime(), Millis::new(145_000));
///
/// let quick = params.with_ack_timeout(Millis::new(1_000)).unwrap();
/// assert_eq!(quick.max_transmit_wait(), Millis::new(46_500));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Params {
  ack_timeout: Millis,
  ack_random_factor: f32,
  max_retransmit: u16,
  nstart: u8,
  default_leisure: Millis,
  probing_rate: BytesPerSecond,
  max_latency: Millis,
  processing_delay: Millis,
  max_transmit_span: Millis,
  max_transmit_wait: Millis,
  max_rtt: Millis,
  exchange_lifetime: Millis,
  non_lifetime: Millis,
  quiet_interval: Millis,
}

impl Default for Params {
  fn default() -> Self {
    let mut params = Params { ack_timeout: Millis::new(2_000),
                              ack_random_factor: 1.5,
                              max_retransmit: 4,
                              nstart: 1,
                              default_leisure: Millis::new(5_000),
                              probing_rate: BytesPerSecond(1),
                              max_latency: Millis::new(100_000),
                              processing_delay: Millis::new(2_000),
                              max_transmit_span: Millis::new(0),
                              max_transmit_wait: Millis::new(0),
                              max_rtt: Millis::new(0),
                              exchange_lifetime: Millis::new(0),
                              non_lifetime: Millis::new(0),
                              quiet_interval: Millis::new(0) };
    params.recalculate_derived();
    params
  }
}

macro_rules! getter {
  (#[doc = $doc:expr] $name:ident: $t:ty) => {
    #[doc = $doc]
    pub fn $name(&self) -> $t {
      self.$name
    }
  };
}

impl Params {
  getter!(#[doc = "Base retransmission timeout for Confirmable messages (default 2 s)"]
          ack_timeout: Millis);
  getter!(#[doc = "Random spread applied to the initial timeout (default 1.5, never below 1.0)"]
          ack_random_factor: f32);
  getter!(#[doc = "Retransmissions after the initial transmission (default 4)"]
          max_retransmit: u16);
  getter!(#[doc = "Simultaneous outstanding interactions allowed toward one server (default 1)"]
          nstart: u8);
  getter!(#[doc = "Longest a server should spread a multicast response (default 5 s)"]
          default_leisure: Millis);
  getter!(#[doc = "Average data rate tolerated toward a peer that is not answering (default 1 B/s)"]
          probing_rate: BytesPerSecond);
  getter!(#[doc = "Pessimistic one-way network latency bound (default 100 s)"]
          max_latency: Millis);
  getter!(#[doc = "Time a node is expected to take turning a request around (default = ack_timeout)"]
          processing_delay: Millis);
  getter!(#[doc = "From first transmission to last retransmission; derived unless overridden"]
          max_transmit_span: Millis);
  getter!(#[doc = "From first transmission to giving up on an acknowledgement; derived unless overridden"]
          max_transmit_wait: Millis);
  getter!(#[doc = "Round trip plus processing; derived unless overridden"]
          max_rtt: Millis);
  getter!(#[doc = "How long a Confirmable exchange pins its Message ID; derived unless overridden"]
          exchange_lifetime: Millis);
  getter!(#[doc = "How long a Non-confirmable Message ID stays fresh; derived unless overridden"]
          non_lifetime: Millis);
  getter!(#[doc = "Quiet time after which a peer stops counting as responsive (default = exchange_lifetime)"]
          quiet_interval: Millis);

  /// The range the initial Confirmable timeout is sampled from:
  /// `[ack_timeout, ack_timeout · ack_random_factor]`
  pub fn initial_timeout_range(&self) -> RangeInclusive<Millis> {
    self.ack_timeout..=self.spread_ack_timeout()
  }

  /// `ack_timeout · ack_random_factor`; also the freshness window
  /// of a Non-confirmable message that isn't a request
  pub fn spread_ack_timeout(&self) -> Millis {
    Millis::new((self.ack_timeout.0 as f64 * self.ack_random_factor as f64) as u64)
  }

  /// Recompute the derived durations from the base tunables,
  /// using the derivations of RFC7252 Section 4.8.2.
  fn recalculate_derived(&mut self) {
    let spread = |n: u64| Millis::new((n as f64 * self.ack_random_factor as f64) as u64);
    let doublings = |n: u32| (1u64 << n.min(32)) - 1;

    self.max_transmit_span = spread(self.ack_timeout.0 * doublings(self.max_retransmit as u32));
    self.max_transmit_wait =
      spread(self.ack_timeout.0 * doublings(self.max_retransmit as u32 + 1));
    self.max_rtt = Millis::new(2 * self.max_latency.0 + self.processing_delay.0);
    self.exchange_lifetime = Millis::new(self.max_transmit_span.0 + self.max_rtt.0);
    self.non_lifetime = Millis::new(self.max_transmit_span.0 + self.max_latency.0);
    self.quiet_interval = self.exchange_lifetime;
  }

  /// Check the whole set for values the protocol cannot run on.
  pub fn validate(&self) -> Result<(), InvalidParams> {
    if self.ack_random_factor < 1.0 {
      return Err(InvalidParams::AckRandomFactorTooSmall(self.ack_random_factor));
    }

    if self.ack_timeout.0 == 0 {
      return Err(InvalidParams::ZeroAckTimeout);
    }

    if self.nstart == 0 {
      return Err(InvalidParams::ZeroNstart);
    }

    if self.probing_rate.0 == 0 {
      return Err(InvalidParams::ZeroProbingRate);
    }

    let doublings = (1u64 << (self.max_retransmit as u32 + 1).min(32)) - 1;
    let span = Millis::new((doublings as f64
                       * self.ack_timeout.0 as f64
                       * self.ack_random_factor as f64) as u64);
    if span > self.max_transmit_wait {
      return Err(InvalidParams::RetransmissionSpanTooWide { span,
                                                            wait: self.max_transmit_wait });
    }

    Ok(())
  }

  fn rederive(mut self, f: impl FnOnce(&mut Self)) -> Result<Self, InvalidParams> {
    f(&mut self);
    self.recalculate_derived();
    self.validate().map(|()| self)
  }

  fn pin(mut self, f: impl FnOnce(&mut Self)) -> Result<Self, InvalidParams> {
    f(&mut self);
    self.validate().map(|()| self)
  }

  /// Set [`ack_timeout`](Params::ack_timeout), re-deriving the dependent durations
  pub fn with_ack_timeout(self, v: Millis) -> Result<Self, InvalidParams> {
    self.rederive(|p| p.ack_timeout = v)
  }

  /// Set [`ack_random_factor`](Params::ack_random_factor), re-deriving the dependent durations
  pub fn with_ack_random_factor(self, v: f32) -> Result<Self, InvalidParams> {
    self.rederive(|p| p.ack_random_factor = v)
  }

  /// Set [`max_retransmit`](Params::max_retransmit), re-deriving the dependent durations
  pub fn with_max_retransmit(self, v: u16) -> Result<Self, InvalidParams> {
    self.rederive(|p| p.max_retransmit = v)
  }

  /// Set [`nstart`](Params::nstart)
  pub fn with_nstart(self, v: u8) -> Result<Self, InvalidParams> {
    self.pin(|p| p.nstart = v)
  }

  /// Set [`default_leisure`](Params::default_leisure)
  pub fn with_default_leisure(self, v: Millis) -> Result<Self, InvalidParams> {
    self.pin(|p| p.default_leisure = v)
  }

  /// Set [`probing_rate`](Params::probing_rate)
  pub fn with_probing_rate(self, v: BytesPerSecond) -> Result<Self, InvalidParams> {
    self.pin(|p| p.probing_rate = v)
  }

  /// Set [`max_latency`](Params::max_latency), re-deriving the dependent durations
  pub fn with_max_latency(self, v: Millis) -> Result<Self, InvalidParams> {
    self.rederive(|p| p.max_latency = v)
  }

  /// Set [`processing_delay`](Params::processing_delay), re-deriving the dependent durations
  pub fn with_processing_delay(self, v: Millis) -> Result<Self, InvalidParams> {
    self.rederive(|p| p.processing_delay = v)
  }

  /// Override the derived [`max_transmit_span`](Params::max_transmit_span).
  ///
  /// Later `with_*` calls on base tunables re-derive it again.
  pub fn with_max_transmit_span(self, v: Millis) -> Result<Self, InvalidParams> {
    self.pin(|p| p.max_transmit_span = v)
  }

  /// Override the derived [`max_transmit_wait`](Params::max_transmit_wait).
  ///
  /// Later `with_*` calls on base tunables re-derive it again.
  pub fn with_max_transmit_wait(self, v: Millis) -> Result<Self, InvalidParams> {
    self.pin(|p| p.max_transmit_wait = v)
  }

  /// Override the derived [`exchange_lifetime`](Params::exchange_lifetime).
  ///
  /// Later `with_*` calls on base tunables re-derive it again.
  pub fn with_exchange_lifetime(self, v: Millis) -> Result<Self, InvalidParams> {
    self.pin(|p| p.exchange_lifetime = v)
  }

  /// Override the derived [`non_lifetime`](Params::non_lifetime).
  ///
  /// Later `with_*` calls on base tunables re-derive it again.
  pub fn with_non_lifetime(self, v: Millis) -> Result<Self, InvalidParams> {
    self.pin(|p| p.non_lifetime = v)
  }

  /// Override the responsiveness [`quiet_interval`](Params::quiet_interval).
  ///
  /// Later `with_*` calls on base tunables re-derive it again.
  pub fn with_quiet_interval(self, v: Millis) -> Result<Self, InvalidParams> {
    self.pin(|p| p.quiet_interval = v)
  }
}
