use std::collections::BTreeMap;

use crate::cursor::Cursor;

pub mod known;
/// Errors produced while parsing options.
pub mod parse_error;
/// Option registry describing how each option number should be parsed.
pub mod registry;

pub use known::ContentFormat;
pub use parse_error::*;
pub use registry::{OptionDescriptor, OptionFormat, OptionValidationError, Registry,
                   RegistryConflict};

/// Options cannot be longer than the longest option the protocol
/// defines (Proxy-Uri, 1034 bytes); decoding stops early rather than
/// buffer an absurd length from a hostile datagram.
pub const MAX_VALUE_LEN: usize = 1034;

pub(crate) fn parse_opt_len_or_delta<A: AsRef<[u8]>>(head: u8,
                                                     bytes: &mut Cursor<A>,
                                                     reserved_err: OptParseError)
                                                     -> Result<u16, OptParseError> {
  match head {
    | 13 => {
      let n = bytes.next().ok_or_else(OptParseError::eof)?;
      Ok((n as u16) + 13)
    },
    | 14 => match bytes.take_exact(2) {
      | Some(&[a, b]) => Ok(u16::from_be_bytes([a, b]).checked_add(269)
                                                      .ok_or(OptParseError::OptionNumberOverflow)?),
      | _ => Err(OptParseError::eof()),
    },
    | 15 => Err(reserved_err),
    | _ => Ok(head as u16),
  }
}

/// Parse the option sequence, stopping at the payload marker `0xFF`
/// or the end of the buffer.
///
/// The `bool` is whether the marker was seen (and consumed).
pub(crate) fn try_consume_opts<A: AsRef<[u8]>>(bytes: &mut Cursor<A>)
                                               -> Result<(OptionMap, bool), OptParseError> {
  let mut opts = OptionMap::default();
  let mut number = 0u16;

  loop {
    let byte1 = match bytes.peek() {
      | None => return Ok((opts, false)),
      | Some(0b11111111) => {
        bytes.next();
        return Ok((opts, true));
      },
      | Some(b) => {
        bytes.next();
        b
      },
    };

    // NOTE: Delta **MUST** be consumed before Value
    let delta = parse_opt_len_or_delta(byte1 >> 4,
                                       bytes,
                                       OptParseError::OptionDeltaReservedValue(15))?;
    number = number.checked_add(delta)
                   .ok_or(OptParseError::OptionNumberOverflow)?;

    let len = parse_opt_len_or_delta(byte1 & 0b00001111,
                                     bytes,
                                     OptParseError::ValueLengthReservedValue(15))?
              as usize;

    if len > MAX_VALUE_LEN {
      return Err(OptParseError::OptionValueTooLong { max: MAX_VALUE_LEN,
                                                     actual: len });
    }

    let value = bytes.take_exact(len).ok_or_else(OptParseError::eof)?;
    opts.push(OptNumber(number), OptValue(value.to_vec()));
  }
}

/// # Option Number
///
/// Identifies which option a value belongs to
/// (e.g. Content-Format has a Number of 12).
///
/// On the wire numbers are delta-encoded; this crate resolves the
/// deltas during parsing so that users only ever deal in absolute
/// numbers.
///
/// # Related
/// - [RFC7252#section-5.4.6 Option Numbers](https://datatracker.ietf.org/doc/html/rfc7252#section-5.4.6)
/// - [RFC7252#section-12.2 Core CoAP Option Number registry](https://datatracker.ietf.org/doc/html/rfc7252#section-12.2)
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct OptNumber(pub u16);

/// Whether an option may be ignored by a receiver that does not
/// recognize it ([RFC7252 Section 5.4.1](https://datatracker.ietf.org/doc/html/rfc7252#section-5.4.1))
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum OptionMustBeProcessed {
  /// This option must be processed,
  /// and a message that ignores it
  /// will be rejected.
  ///
  /// Corresponds to the option being "critical"
  /// in strict CoAP terms
  Yes,
  /// This option does not _need_ to
  /// be processed,
  /// and a message that ignores it
  /// will be processed anyway.
  ///
  /// Corresponds to the option being "elective"
  /// in strict CoAP terms
  No,
}

/// What a proxy should do with an option it does not recognize
/// ([RFC7252 Section 5.4.2](https://datatracker.ietf.org/doc/html/rfc7252#section-5.4.2))
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum WhenOptionUnsupportedByProxy {
  /// This option /must be/ processed & understood by proxies
  /// and may not be forwarded blindly to their destination.
  ///
  /// Corresponds to the option being "UnSafe" to forward
  /// in strict CoAP terms
  Error,
  /// This option may not be processed & understood by proxies
  /// and may be forwarded blindly to their destination.
  ///
  /// Corresponds to the option being "SafeToForward"
  /// in strict CoAP terms
  Forward,
}

/// Whether different values for an option can change a cached
/// response ([RFC7252 Section 5.4.2](https://datatracker.ietf.org/doc/html/rfc7252#section-5.4.2))
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum WhenOptionChanges {
  /// If this option is safe to forward but unknown to a proxy,
  /// it should be included in the proxy's cache key for this message.
  ///
  /// Corresponds to the option being not "NoCacheKey"
  /// in strict CoAP terms
  ResponseChanges,
  /// If this option is safe to forward but unknown to a proxy,
  /// it should not be included in the proxy's cache key,
  /// and different values for this option should yield the
  /// cached response.
  ///
  /// Corresponds to the option being "NoCacheKey"
  /// in strict CoAP terms
  ResponseDoesNotChange,
}

impl OptNumber {
  /// Whether or not this option may be ignored by a receiver
  pub fn must_be_processed(&self) -> OptionMustBeProcessed {
    match self.0 & 0b1 {
      | 1 => OptionMustBeProcessed::Yes,
      | _ => OptionMustBeProcessed::No,
    }
  }

  /// Whether or not this option may be forwarded blindly by
  /// a proxy that does not support processing it
  pub fn when_unsupported_by_proxy(&self) -> WhenOptionUnsupportedByProxy {
    match (self.0 & 0b10) >> 1 {
      | 1 => WhenOptionUnsupportedByProxy::Error,
      | _ => WhenOptionUnsupportedByProxy::Forward,
    }
  }

  /// Whether or not different values for this option should
  /// yield proxies' cached response
  ///
  /// _(when the proxy does not support processing it and
  /// the option is safe to forward)_
  pub fn when_option_changes(&self) -> WhenOptionChanges {
    match self.0 & 0b11110 {
      | 0b11100 => WhenOptionChanges::ResponseDoesNotChange,
      | _ => WhenOptionChanges::ResponseChanges,
    }
  }
}

/// # Option Value
///
/// The packed bytes of one occurrence of an option.
///
/// What the bytes *mean* (opaque bytes, minimally-encoded unsigned
/// integer, UTF-8 string, or nothing at all) is determined by the
/// option's [format](registry::OptionFormat) in the [`Registry`].
///
/// See [RFC7252 Section 3.2](https://datatracker.ietf.org/doc/html/rfc7252#section-3.2)
#[derive(Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct OptValue(pub Vec<u8>);

impl OptValue {
  /// The zero-length value carried by `empty`-format options
  /// and uint options set to zero
  pub fn empty() -> OptValue {
    OptValue(Vec::new())
  }

  /// Pack an unsigned integer in the minimum number of
  /// big-endian bytes; zero packs to zero bytes.
  ///
  /// ```
  /// use tadpole_msg::OptValue;
  ///
  /// assert_eq!(OptValue::uint(0).0, Vec::<u8>::new());
  /// assert_eq!(OptValue::uint(50).0, vec![50]);
  /// assert_eq!(OptValue::uint(1034).0, vec![0x04, 0x0A]);
  /// ```
  pub fn uint(n: u64) -> OptValue {
    let bytes = n.to_be_bytes();
    let first_nonzero = bytes.iter().position(|b| *b != 0).unwrap_or(8);
    OptValue(bytes[first_nonzero..].to_vec())
  }

  /// Length of the packed value in bytes
  pub fn len(&self) -> usize {
    self.0.len()
  }

  /// Whether the packed value is zero bytes long
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl From<&str> for OptValue {
  fn from(s: &str) -> Self {
    OptValue(s.as_bytes().to_vec())
  }
}

impl From<String> for OptValue {
  fn from(s: String) -> Self {
    OptValue(s.into_bytes())
  }
}

impl From<Vec<u8>> for OptValue {
  fn from(bytes: Vec<u8>) -> Self {
    OptValue(bytes)
  }
}

impl From<&[u8]> for OptValue {
  fn from(bytes: &[u8]) -> Self {
    OptValue(bytes.to_vec())
  }
}

/// # Options of a message
///
/// A sorted multimap from [`OptNumber`] to the values set for that
/// number.
///
/// Iteration always yields `(OptNumber, &OptValue)` pairs in
/// **canonical order**: ascending number, and insertion order among
/// repeats of the same number.  Collecting a sequence of pairs into an
/// `OptionMap` *is* the canonical stable sort, and doing it twice is
/// the same as doing it once.
///
/// ```
/// use tadpole_msg::{OptNumber, OptValue, OptionMap};
///
/// let unsorted = vec![(OptNumber(11), OptValue::from("there")),
///                     (OptNumber(3), OptValue::from("host")),
///                     (OptNumber(11), OptValue::from("hi"))];
///
/// let opts = unsorted.into_iter().collect::<OptionMap>();
/// let pairs = opts.iter().map(|(n, _)| n).collect::<Vec<_>>();
/// assert_eq!(pairs, vec![OptNumber(3), OptNumber(11), OptNumber(11)]);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OptionMap(BTreeMap<OptNumber, Vec<OptValue>>);

impl OptionMap {
  /// Create an empty map
  pub fn new() -> Self {
    Self::default()
  }

  /// Append a value for `number`, keeping earlier values
  /// for the same number ahead of it.
  pub fn push(&mut self, number: OptNumber, value: OptValue) {
    self.0.entry(number).or_default().push(value);
  }

  /// Alias of [`OptionMap::push`]; reads better at call
  /// sites that set single-occurrence options.
  pub fn insert(&mut self, number: OptNumber, value: OptValue) {
    self.push(number, value)
  }

  /// All values set for `number`, in insertion order
  pub fn get(&self, number: OptNumber) -> &[OptValue] {
    self.0.get(&number).map(|vs| vs.as_slice()).unwrap_or(&[])
  }

  /// The first value set for `number`
  pub fn first(&self, number: OptNumber) -> Option<&OptValue> {
    self.get(number).first()
  }

  /// Remove and return every value set for `number`
  pub fn remove(&mut self, number: OptNumber) -> Vec<OptValue> {
    self.0.remove(&number).unwrap_or_default()
  }

  /// Replace the values for `number` wholesale
  pub fn set(&mut self, number: OptNumber, values: Vec<OptValue>) {
    if values.is_empty() {
      self.0.remove(&number);
    } else {
      self.0.insert(number, values);
    }
  }

  /// Whether no options are set
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Total number of option occurrences (repeats counted)
  pub fn count(&self) -> usize {
    self.0.values().map(Vec::len).sum()
  }

  /// The distinct numbers set, ascending
  pub fn numbers(&self) -> impl Iterator<Item = OptNumber> + '_ {
    self.0.keys().copied()
  }

  /// Every `(number, value)` occurrence in canonical order
  pub fn iter(&self) -> impl Iterator<Item = (OptNumber, &OptValue)> + '_ {
    self.0
        .iter()
        .flat_map(|(n, vs)| vs.iter().map(move |v| (*n, v)))
  }
}

impl FromIterator<(OptNumber, OptValue)> for OptionMap {
  fn from_iter<I: IntoIterator<Item = (OptNumber, OptValue)>>(iter: I) -> Self {
    let mut map = OptionMap::default();
    for (n, v) in iter {
      map.push(n, v);
    }
    map
  }
}

impl IntoIterator for OptionMap {
  type Item = (OptNumber, OptValue);
  type IntoIter = std::vec::IntoIter<(OptNumber, OptValue)>;

  fn into_iter(self) -> Self::IntoIter {
    self.0
        .into_iter()
        .flat_map(|(n, vs)| vs.into_iter().map(move |v| (n, v)))
        .collect::<Vec<_>>()
        .into_iter()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(bytes: &[u8]) -> Result<(OptionMap, bool), OptParseError> {
    try_consume_opts(&mut Cursor::new(bytes))
  }

  #[test]
  fn parse_opt() {
    let (opts, marker) = parse(&[0b00010001, 0b00000001]).unwrap();
    assert_eq!(opts.get(OptNumber(1)), &[OptValue(vec![1])]);
    assert!(!marker);

    // delta 13 + 1 extension byte
    let (opts, _) = parse(&[0b11010001, 0b00000001, 0b00000001]).unwrap();
    assert_eq!(opts.get(OptNumber(14)), &[OptValue(vec![1])]);

    // delta 14 + 2 extension bytes
    let (opts, _) = parse(&[0b11100001, 0b00000000, 0b00000001, 0b00000001]).unwrap();
    assert_eq!(opts.get(OptNumber(270)), &[OptValue(vec![1])]);

    // repeats accumulate in insertion order
    let (opts, marker) =
      parse(&[0b00000001, 0b00000001, 0b00010001, 0b00000011, 0b11111111]).unwrap();
    assert_eq!(opts.get(OptNumber(0)), &[OptValue(vec![1])]);
    assert_eq!(opts.get(OptNumber(1)), &[OptValue(vec![3])]);
    assert!(marker);
  }

  #[test]
  fn parse_opt_rejects_reserved_nibbles() {
    assert_eq!(parse(&[0b11110001, 1]),
               Err(OptParseError::OptionDeltaReservedValue(15)));
    assert_eq!(parse(&[0b00011111, 1]),
               Err(OptParseError::ValueLengthReservedValue(15)));
  }

  #[test]
  fn parse_opt_rejects_truncation() {
    assert_eq!(parse(&[0b00000010, 1]), Err(OptParseError::eof()));
    assert_eq!(parse(&[0b11010001]), Err(OptParseError::eof()));
  }

  #[test]
  fn canonical_sort_is_idempotent() {
    let opts = vec![(OptNumber(11), OptValue::from("b")),
                    (OptNumber(11), OptValue::from("a")),
                    (OptNumber(1), OptValue::from("z"))].into_iter()
                                                        .collect::<OptionMap>();

    let once = opts.iter()
                   .map(|(n, v)| (n, v.clone()))
                   .collect::<Vec<_>>();
    let twice = once.clone()
                    .into_iter()
                    .collect::<OptionMap>()
                    .iter()
                    .map(|(n, v)| (n, v.clone()))
                    .collect::<Vec<_>>();

    assert_eq!(once, twice);
    assert_eq!(opts.get(OptNumber(11)),
               &[OptValue::from("b"), OptValue::from("a")]);
  }

  #[test]
  fn uint_packs_minimally() {
    assert_eq!(OptValue::uint(0).0, Vec::<u8>::new());
    assert_eq!(OptValue::uint(1).0, vec![1]);
    assert_eq!(OptValue::uint(256).0, vec![1, 0]);
    assert_eq!(OptValue::uint(u64::MAX).0, vec![0xFF; 8]);
    assert!(OptValue::uint(1).0[0] != 0);
  }

  #[test]
  fn opt_number_qualities() {
    // critical, safe-to-fwd, cache-key
    let if_match = OptNumber(1);

    // critical, unsafe-to-fwd, cache-key
    let uri_host = OptNumber(3);

    // elective, safe-to-fwd, cache-key
    let etag = OptNumber(4);

    // elective, safe-to-fwd, no-cache-key
    let size1 = OptNumber(60);

    assert_eq!(if_match.must_be_processed(), OptionMustBeProcessed::Yes);
    assert_eq!(uri_host.must_be_processed(), OptionMustBeProcessed::Yes);
    assert_eq!(etag.must_be_processed(), OptionMustBeProcessed::No);
    assert_eq!(size1.must_be_processed(), OptionMustBeProcessed::No);

    assert_eq!(uri_host.when_unsupported_by_proxy(),
               WhenOptionUnsupportedByProxy::Error);
    assert_eq!(etag.when_unsupported_by_proxy(),
               WhenOptionUnsupportedByProxy::Forward);

    assert_eq!(size1.when_option_changes(),
               WhenOptionChanges::ResponseDoesNotChange);
    assert_eq!(etag.when_option_changes(), WhenOptionChanges::ResponseChanges);
  }
}
