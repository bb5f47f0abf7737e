use core::ops::RangeInclusive;

use embedded_time::Instant;
use rand::{Rng, SeedableRng};

use crate::time::{since, since_epoch, Clock, Millis};

/// A number of transmissions, the initial one included
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Attempts(pub u16);

/// Result of [`RetryTimer::what_should_i_do`].
///
/// This tells you if a retransmission should be attempted or not.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum YouShould {
  /// Attempts have been exhausted, the waiting horizon has passed,
  /// and the transmission should be considered failed.
  Cry,
  /// A retransmission should be performed
  Retry,
}

/// A non-blocking binary-exponential-backoff countdown that lives
/// alongside one Confirmable transmission.
///
/// It does not _contain_ the message to retransmit; it only answers
/// "should I do anything right now?" for whoever owns both.
///
/// The schedule:
///  - an initial timeout `t` is sampled uniformly from
///    `[ack_timeout, ack_timeout · ack_random_factor]`
///  - retransmission `k` (1-based) fires once `t · (2^k - 1)` has
///    passed since the initial transmission, doubling the gap each
///    time, at most `max_attempts - 1` times
///  - after the last retransmission the timer waits out the
///    remainder of `wait_horizon`, then yields
///    [`Cry`](YouShould::Cry) exactly once per poll
///
/// ```
/// use embedded_time::fixed_point::FixedPoint;
/// use embedded_time::Clock;
/// use tadpole::retry::{Attempts, RetryTimer, YouShould};
/// use tadpole::time::Millis;
///
/// fn tx(_: &str) {}
/// # let clock = tadpole::std::Clock::new();
/// let now = || clock.try_now().unwrap();
///
/// tx("first attempt");
/// let mut retry =
///   RetryTimer::new(now(), Millis::new(2)..=Millis::new(3), Attempts(5), Millis::new(93));
///
/// loop {
///   match retry.what_should_i_do(now()) {
///     | Ok(YouShould::Retry) => tx("again!"),
///     | Ok(YouShould::Cry) => break,
///     | Err(nb::Error::WouldBlock) => continue,
///     | Err(_) => unreachable!(),
///   }
///   # break;
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryTimer<C: Clock> {
  start: Instant<C>,
  init: Millis,
  attempts: Attempts,
  max_attempts: Attempts,
  wait_horizon: Millis,
  cancelled: bool,
}

impl<C: Clock> RetryTimer<C> {
  /// Create a new countdown whose initial transmission happened at
  /// `start`.
  ///
  /// When `init_range` is wider than a point, the initial timeout
  /// is sampled from it with a cheap deterministic generator
  /// seeded by `start`.
  pub fn new(start: Instant<C>,
             init_range: RangeInclusive<Millis>,
             max_attempts: Attempts,
             wait_horizon: Millis)
             -> Self {
    let init = if init_range.start() == init_range.end() {
      *init_range.start()
    } else {
      let mut rand = rand_chacha::ChaCha8Rng::seed_from_u64(since_epoch(start).0);
      Millis::new(rand.gen_range(init_range.start().0..=init_range.end().0))
    };

    Self { start,
           init,
           attempts: Attempts(1),
           max_attempts,
           wait_horizon,
           cancelled: false }
  }

  /// A countdown that never retransmits and cries once
  /// `wait_horizon` passes; the degenerate timer carried by
  /// non-Confirmable transmissions.
  pub fn single_shot(start: Instant<C>, wait_horizon: Millis) -> Self {
    Self::new(start, Millis::new(0)..=Millis::new(0), Attempts(1), wait_horizon)
  }

  /// When the thing we keep trying hasn't been answered, invoke
  /// this to ask "what do I do now?"
  ///
  /// Returns `nb::Error::WouldBlock` when nothing is due yet.
  pub fn what_should_i_do(&mut self,
                          now: Instant<C>)
                          -> nb::Result<YouShould, core::convert::Infallible> {
    let elapsed = since(now, self.start);

    if self.cancelled || self.attempts >= self.max_attempts {
      if elapsed >= self.wait_horizon {
        Ok(YouShould::Cry)
      } else {
        Err(nb::Error::WouldBlock)
      }
    } else if elapsed >= self.due_at(self.attempts.0) {
      self.attempts.0 += 1;
      Ok(YouShould::Retry)
    } else {
      Err(nb::Error::WouldBlock)
    }
  }

  /// Stop all future retransmissions without forgetting the
  /// timer; it will still [`Cry`](YouShould::Cry) when the waiting
  /// horizon passes.
  ///
  /// Returns whether there were retransmissions left to cancel.
  pub fn cancel(&mut self) -> bool {
    let had_retries_left = !self.cancelled && self.attempts < self.max_attempts;
    self.cancelled = true;
    had_retries_left
  }

  /// Transmissions performed so far, the initial one included
  pub fn attempts(&self) -> Attempts {
    self.attempts
  }

  /// Milliseconds after `start` at which retransmission number
  /// `k` is due
  fn due_at(&self, k: u16) -> Millis {
    Millis::new(self.init.0.saturating_mul((1u64 << (k as u32).min(32)) - 1))
  }

  /// Milliseconds from `now` until this timer wants to be polled
  /// again (zero when overdue)
  pub fn next_fire(&self, now: Instant<C>) -> Millis {
    let elapsed = since(now, self.start);
    let deadline = if self.cancelled || self.attempts >= self.max_attempts {
      self.wait_horizon
    } else {
      self.due_at(self.attempts.0).min(self.wait_horizon)
    };

    Millis::new(deadline.0.saturating_sub(elapsed.0))
  }
}
