use std::collections::BTreeMap;

use super::{OptNumber, OptValue, OptionMustBeProcessed, MAX_VALUE_LEN};
use crate::msg::{CodeKind, Message};

/// The shape of the bytes packed into an option value.
///
/// Polymorphism over option values is closed: every option is one of
/// these four formats, never an open hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum OptionFormat {
  /// Always zero bytes; presence of the option is the value
  /// (e.g. If-None-Match)
  Empty,
  /// Bytes passed through as-is (e.g. ETag)
  Opaque,
  /// Unsigned integer packed in the minimum number of big-endian
  /// bytes; zero packs to zero bytes and no packing starts with a
  /// zero byte (e.g. Content-Format)
  Uint,
  /// UTF-8 text, bounded by its length in bytes (e.g. Uri-Path)
  String,
}

/// A value unpacked out of its wire bytes according to an
/// [`OptionFormat`]
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Value {
  /// Unpacked `empty`-format value
  Empty,
  /// Unpacked `opaque`-format value
  Opaque(Vec<u8>),
  /// Unpacked `uint`-format value
  Uint(u64),
  /// Unpacked `string`-format value
  String(std::string::String),
}

impl Value {
  /// Pack this value back into wire bytes
  pub fn pack(self) -> OptValue {
    match self {
      | Value::Empty => OptValue::empty(),
      | Value::Opaque(bytes) => OptValue(bytes),
      | Value::Uint(n) => OptValue::uint(n),
      | Value::String(s) => OptValue(s.into_bytes()),
    }
  }
}

impl OptionFormat {
  /// Unpack wire bytes into a typed [`Value`], or None when the
  /// bytes are outside this format's domain.
  pub fn unpack(&self, value: &OptValue) -> Option<Value> {
    match self {
      | OptionFormat::Empty if value.is_empty() => Some(Value::Empty),
      | OptionFormat::Empty => None,
      | OptionFormat::Opaque => Some(Value::Opaque(value.0.clone())),
      | OptionFormat::Uint if self.accepts(&value.0) => {
        Some(Value::Uint(value.0.iter().fold(0u64, |n, b| (n << 8) | *b as u64)))
      },
      | OptionFormat::Uint => None,
      | OptionFormat::String => core::str::from_utf8(&value.0).ok()
                                                              .map(|s| Value::String(s.into())),
    }
  }

  /// Whether `bytes` is a member of this format's domain
  pub fn accepts(&self, bytes: &[u8]) -> bool {
    match self {
      | OptionFormat::Empty => bytes.is_empty(),
      | OptionFormat::Opaque => true,
      | OptionFormat::Uint => bytes.len() <= 8 && bytes.first() != Some(&0),
      | OptionFormat::String => core::str::from_utf8(bytes).is_ok(),
    }
  }

  /// Rewrite `bytes` into the canonical member of this format's
  /// domain, or None when no rewrite is defined.
  ///
  /// The only non-identity rewrite is re-packing a uint that was
  /// sent with leading zero bytes.
  pub fn canonicalize(&self, bytes: &[u8]) -> Option<Vec<u8>> {
    match self {
      | OptionFormat::Uint if bytes.len() <= 8 => {
        let first_nonzero = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
        Some(bytes[first_nonzero..].to_vec())
      },
      | _ if self.accepts(bytes) => Some(bytes.to_vec()),
      | _ => None,
    }
  }
}

/// Everything the protocol knows about one option number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OptionDescriptor {
  /// The number this descriptor describes
  pub number: OptNumber,
  /// Human-readable option name, e.g. `"Uri-Path"`
  pub name: &'static str,
  /// See [`OptionFormat`]
  pub format: OptionFormat,
  /// Minimum packed length in bytes, inclusive
  pub min_len: u16,
  /// Maximum packed length in bytes, inclusive
  pub max_len: u16,
  /// Whether the option may occur more than once in one message
  pub repeatable: bool,
  /// Whether the option may travel in requests
  pub in_request: bool,
  /// Whether the option may travel in responses
  pub in_response: bool,
  /// Packed bytes assumed when the option is absent, if the
  /// protocol defines any (e.g. Max-Age defaults to 60 seconds)
  pub default_value: Option<&'static [u8]>,
}

impl OptionDescriptor {
  /// The permissive descriptor synthesized for numbers nobody
  /// registered: opaque, any length, repeatable, both directions.
  ///
  /// Note that *critical* unrecognized numbers still fail
  /// validation; the synthesized descriptor only governs the
  /// checks that come after recognition.
  pub fn unrecognized(number: OptNumber) -> Self {
    Self { number,
           name: "unrecognized",
           format: OptionFormat::Opaque,
           min_len: 0,
           max_len: MAX_VALUE_LEN as u16,
           repeatable: true,
           in_request: true,
           in_response: true,
           default_value: None }
  }

  /// Whether a packed length satisfies this descriptor's bounds
  pub fn length_ok(&self, len: usize) -> bool {
    self.min_len as usize <= len && len <= self.max_len as usize
  }
}

/// Attempt to register an option number that is already taken
/// by an incompatible descriptor.
///
/// Fatal to startup; options cannot change meaning at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegistryConflict {
  /// The contested number
  pub number: OptNumber,
  /// Name of the descriptor already registered
  pub existing: &'static str,
  /// Name of the descriptor that lost the race
  pub attempted: &'static str,
}

/// An option violated the registry's rules in the context of the
/// message that carried it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionValidationError {
  /// An unregistered option number with the critical bit set was
  /// present; the receiver cannot safely ignore it
  UnrecognizedCriticalOption(OptNumber),
  /// A value's packed length fell outside the descriptor's bounds
  #[allow(missing_docs)]
  OptionLength {
    number: OptNumber,
    actual: usize,
    min: u16,
    max: u16,
  },
  /// The option is not valid in this direction (e.g. Uri-Path in
  /// a response)
  InvalidOption(OptNumber),
  /// The option occurred more than once but is single-occurrence
  InvalidMultipleOption(OptNumber),
}

/// # Option registry
///
/// Flat table from [`OptNumber`] to [`OptionDescriptor`].
///
/// [`Registry::core`] carries the base table of RFC7252; extension
/// options are added with [`Registry::register`] during startup and
/// the table is append-only afterwards.
///
/// ```
/// use tadpole_msg::opt::registry::{OptionDescriptor, OptionFormat, Registry};
/// use tadpole_msg::OptNumber;
///
/// let mut registry = Registry::core();
/// registry.register(OptionDescriptor { number: OptNumber(2049),
///                                      name: "X-Fleet-Id",
///                                      format: OptionFormat::Uint,
///                                      min_len: 0,
///                                      max_len: 4,
///                                      repeatable: false,
///                                      in_request: true,
///                                      in_response: false,
///                                      default_value: None })
///         .unwrap();
///
/// assert_eq!(registry.lookup(OptNumber(2049)).name, "X-Fleet-Id");
/// assert_eq!(registry.lookup(OptNumber(1)).name, "If-Match");
/// assert_eq!(registry.lookup(OptNumber(9)).name, "unrecognized");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Registry {
  table: BTreeMap<OptNumber, OptionDescriptor>,
}

macro_rules! descriptor {
  ($n:literal $name:literal $format:ident $min:literal ..= $max:literal, repeatable: $rep:literal, req: $req:literal, resp: $resp:literal, default: $default:expr) => {
    OptionDescriptor { number: OptNumber($n),
                       name: $name,
                       format: OptionFormat::$format,
                       min_len: $min,
                       max_len: $max,
                       repeatable: $rep,
                       in_request: $req,
                       in_response: $resp,
                       default_value: $default }
  };
}

/// The base option table of RFC7252 Section 5.10
const CORE_TABLE: &[OptionDescriptor] = &[
  descriptor!(1 "If-Match" Opaque 0..=8, repeatable: true, req: true, resp: false, default: None),
  descriptor!(3 "Uri-Host" String 1..=255, repeatable: false, req: true, resp: false, default: None),
  descriptor!(4 "ETag" Opaque 1..=8, repeatable: true, req: true, resp: true, default: None),
  descriptor!(5 "If-None-Match" Empty 0..=0, repeatable: false, req: true, resp: false, default: None),
  descriptor!(7 "Uri-Port" Uint 0..=2, repeatable: false, req: true, resp: false, default: None),
  descriptor!(8 "Location-Path" String 0..=255, repeatable: true, req: false, resp: true, default: None),
  descriptor!(11 "Uri-Path" String 0..=255, repeatable: true, req: true, resp: false, default: None),
  descriptor!(12 "Content-Format" Uint 0..=2, repeatable: false, req: true, resp: true, default: None),
  descriptor!(14 "Max-Age" Uint 0..=4, repeatable: false, req: false, resp: true, default: Some(&[60])),
  descriptor!(15 "Uri-Query" String 0..=255, repeatable: true, req: true, resp: false, default: None),
  descriptor!(17 "Accept" Uint 0..=2, repeatable: false, req: true, resp: false, default: None),
  descriptor!(20 "Location-Query" String 0..=255, repeatable: true, req: false, resp: true, default: None),
  descriptor!(35 "Proxy-Uri" String 1..=1034, repeatable: false, req: true, resp: false, default: None),
  descriptor!(39 "Proxy-Scheme" String 1..=255, repeatable: false, req: true, resp: false, default: None),
  descriptor!(60 "Size1" Uint 0..=4, repeatable: false, req: true, resp: true, default: None),
];

impl Registry {
  /// A registry with no entries at all; every number resolves to
  /// the synthesized `unrecognized` descriptor
  pub fn empty() -> Self {
    Self::default()
  }

  /// The registry carrying the base table of RFC7252
  pub fn core() -> Self {
    let mut registry = Self::default();
    for d in CORE_TABLE {
      // the base table cannot conflict with itself
      let _ = registry.register(*d);
    }
    registry
  }

  /// Add a descriptor to the table.
  ///
  /// Registering a descriptor identical to the existing entry is a
  /// no-op; registering a *different* descriptor for a taken number
  /// is a [`RegistryConflict`].
  pub fn register(&mut self, descriptor: OptionDescriptor) -> Result<(), RegistryConflict> {
    match self.table.get(&descriptor.number) {
      | Some(existing) if *existing == descriptor => Ok(()),
      | Some(existing) => Err(RegistryConflict { number: descriptor.number,
                                                 existing: existing.name,
                                                 attempted: descriptor.name }),
      | None => {
        self.table.insert(descriptor.number, descriptor);
        Ok(())
      },
    }
  }

  /// The descriptor for `number`, synthesizing
  /// [`OptionDescriptor::unrecognized`] when nobody registered one
  pub fn lookup(&self, number: OptNumber) -> OptionDescriptor {
    self.table
        .get(&number)
        .copied()
        .unwrap_or_else(|| OptionDescriptor::unrecognized(number))
  }

  /// Whether `number` has a registered descriptor
  pub fn is_recognized(&self, number: OptNumber) -> bool {
    self.table.contains_key(&number)
  }

  /// Check every option in `msg` against the table: critical
  /// numbers must be recognized, lengths must be in bounds,
  /// single-occurrence options must not repeat, and each option
  /// must be valid for the direction the code implies.
  ///
  /// The first violation is returned; `Ok(())` means the message's
  /// options are acceptable as-is.
  pub fn validate(&self, msg: &Message) -> Result<(), OptionValidationError> {
    use OptionValidationError::*;

    for number in msg.opts.numbers() {
      let recognized = self.is_recognized(number);

      if !recognized && number.must_be_processed() == OptionMustBeProcessed::Yes {
        return Err(UnrecognizedCriticalOption(number));
      } else if !recognized {
        continue;
      }

      let descriptor = self.lookup(number);
      let values = msg.opts.get(number);

      for value in values {
        if !descriptor.length_ok(value.len()) {
          return Err(OptionLength { number,
                                    actual: value.len(),
                                    min: descriptor.min_len,
                                    max: descriptor.max_len });
        }
      }

      if values.len() > 1 && !descriptor.repeatable {
        return Err(InvalidMultipleOption(number));
      }

      let direction_ok = match msg.code.kind() {
        | CodeKind::Request => descriptor.in_request,
        | CodeKind::Response => descriptor.in_response,
        | CodeKind::Empty | CodeKind::Reserved => true,
      };
      if !direction_ok {
        return Err(InvalidOption(number));
      }
    }

    Ok(())
  }

  /// Strip or substitute recognized options whose values fall
  /// outside their format's domain or length bounds.
  ///
  /// Elective violators are dropped; violators with a well-defined
  /// canonical rewrite (uints packed with leading zeros) are
  /// substituted in place.  A critical option that cannot be
  /// repaired exactly makes the whole message unrepairable.
  ///
  /// Returns how many values were dropped or rewritten.
  pub fn replace_unacceptable_options(&self,
                                      msg: &mut Message)
                                      -> Result<usize, OptionValidationError> {
    let numbers = msg.opts.numbers().collect::<Vec<_>>();
    let mut touched = 0;

    for number in numbers {
      if !self.is_recognized(number) {
        continue;
      }

      let descriptor = self.lookup(number);
      let critical = number.must_be_processed() == OptionMustBeProcessed::Yes;
      let mut kept = Vec::new();

      for value in msg.opts.get(number).to_vec() {
        if descriptor.length_ok(value.len()) && descriptor.format.accepts(&value.0) {
          kept.push(value);
          continue;
        }

        let repaired = descriptor.format
                                 .canonicalize(&value.0)
                                 .filter(|c| descriptor.length_ok(c.len())
                                             && descriptor.format.accepts(c));

        match repaired {
          | Some(bytes) => {
            touched += 1;
            kept.push(OptValue(bytes));
          },
          | None if critical => {
            return Err(OptionValidationError::OptionLength { number,
                                                             actual: value.len(),
                                                             min: descriptor.min_len,
                                                             max: descriptor.max_len })
          },
          | None => touched += 1,
        }
      }

      msg.opts.set(number, kept);
    }

    Ok(touched)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{Code, Id, Message, Token, Type};

  fn get_request() -> Message {
    Message::new(Type::Con, Code::GET, Id(1), Token::empty())
  }

  #[test]
  fn register_conflicts() {
    let mut registry = Registry::core();
    let renamed = OptionDescriptor { name: "If-Match-2",
                                     ..registry.lookup(OptNumber(1)) };

    assert_eq!(registry.register(renamed),
               Err(RegistryConflict { number: OptNumber(1),
                                      existing: "If-Match",
                                      attempted: "If-Match-2" }));

    // identical re-registration is fine
    assert_eq!(registry.register(registry.lookup(OptNumber(1))), Ok(()));
  }

  #[test]
  fn lookup_synthesizes_unrecognized() {
    let registry = Registry::core();
    let d = registry.lookup(OptNumber(9));
    assert_eq!(d.name, "unrecognized");
    assert!(d.repeatable);
    assert!(!registry.is_recognized(OptNumber(9)));
  }

  #[test]
  fn validate_critical_unrecognized() {
    let registry = Registry::core();
    let mut msg = get_request();
    // 9 is odd (critical) and not in the base table
    msg.opts.insert(OptNumber(9), OptValue::empty());

    assert_eq!(registry.validate(&msg),
               Err(OptionValidationError::UnrecognizedCriticalOption(OptNumber(9))));
  }

  #[test]
  fn validate_elective_unrecognized_is_fine() {
    let registry = Registry::core();
    let mut msg = get_request();
    // 10 is even (elective) and not in the base table
    msg.opts.insert(OptNumber(10), OptValue::empty());

    assert_eq!(registry.validate(&msg), Ok(()));
  }

  #[test]
  fn validate_multiplicity() {
    let registry = Registry::core();
    let mut msg = get_request();
    msg.opts.push(OptNumber(3), OptValue::from("a.example"));
    msg.opts.push(OptNumber(3), OptValue::from("b.example"));

    assert_eq!(registry.validate(&msg),
               Err(OptionValidationError::InvalidMultipleOption(OptNumber(3))));
  }

  #[test]
  fn validate_length() {
    let registry = Registry::core();
    let mut msg = get_request();
    msg.opts.insert(OptNumber(4), OptValue(vec![0; 9]));

    assert_eq!(registry.validate(&msg),
               Err(OptionValidationError::OptionLength { number: OptNumber(4),
                                                         actual: 9,
                                                         min: 1,
                                                         max: 8 }));
  }

  #[test]
  fn validate_direction() {
    let registry = Registry::core();
    let mut msg = get_request();
    msg.code = Code::new(2, 5);
    msg.opts.insert(OptNumber(11), OptValue::from("path"));

    assert_eq!(registry.validate(&msg),
               Err(OptionValidationError::InvalidOption(OptNumber(11))));
  }

  #[test]
  fn repair_strips_elective_and_repacks_uints() {
    let registry = Registry::core();
    let mut msg = get_request();
    msg.code = Code::new(2, 5);
    // Max-Age (elective) sent as a sloppy 3-byte uint for 60
    msg.opts.insert(OptNumber(14), OptValue(vec![0, 0, 60]));
    // ETag (elective) too long to keep
    msg.opts.insert(OptNumber(4), OptValue(vec![1; 12]));

    let touched = registry.replace_unacceptable_options(&mut msg).unwrap();
    assert_eq!(touched, 2);
    assert_eq!(msg.opts.get(OptNumber(14)), &[OptValue(vec![60])]);
    assert_eq!(msg.opts.get(OptNumber(4)), &[]);
  }

  #[test]
  fn repair_gives_up_on_broken_critical() {
    let registry = Registry::core();
    let mut msg = get_request();
    // Uri-Host (critical) longer than 255 bytes has no well-defined repair
    msg.opts.insert(OptNumber(3), OptValue(vec![b'a'; 300]));

    assert!(registry.replace_unacceptable_options(&mut msg).is_err());
  }

  #[test]
  fn unpack_pack_round_trips() {
    assert_eq!(OptionFormat::Uint.unpack(&OptValue::uint(60)),
               Some(Value::Uint(60)));
    assert_eq!(Value::Uint(60).pack(), OptValue(vec![60]));
    assert_eq!(OptionFormat::Uint.unpack(&OptValue(vec![0, 60])), None);
    assert_eq!(OptionFormat::String.unpack(&OptValue::from("hi")),
               Some(Value::String("hi".into())));
    assert_eq!(OptionFormat::String.unpack(&OptValue(vec![0xFF, 0xFE])), None);
    assert_eq!(OptionFormat::Empty.unpack(&OptValue::empty()), Some(Value::Empty));
    assert_eq!(OptionFormat::Empty.unpack(&OptValue(vec![1])), None);
  }
}
