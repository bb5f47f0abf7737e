use embedded_time::Instant;

/// A duration, in milliseconds
pub type Millis = embedded_time::duration::Milliseconds<u64>;

/// Supertrait of [`embedded_time::Clock`] pinning the
/// type of "ticks" to u64
pub trait Clock: embedded_time::Clock<T = u64> {}
impl<C: embedded_time::Clock<T = u64>> Clock for C {}

/// Milliseconds elapsed from `then` to `now`, saturating at zero
/// when `then` is in the future.
pub fn since<C: Clock>(now: Instant<C>, then: Instant<C>) -> Millis {
  now.checked_duration_since(&then)
     .and_then(|d| Millis::try_from(d).ok())
     .unwrap_or(Millis::new(0))
}

/// Milliseconds from the clock's epoch to `t`.
pub fn since_epoch<C: Clock>(t: Instant<C>) -> Millis {
  Millis::try_from(t.duration_since_epoch()).unwrap_or(Millis::new(0))
}
