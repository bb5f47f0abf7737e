use core::hash::{Hash, Hasher};

use crate::cursor::Cursor;
use crate::from_bytes::TryConsumeBytes;
use crate::TryFromBytes;

/// Message Code
pub mod code;

/// Message parsing errors
pub mod parse_error;

/// Message ID
pub mod id;

/// Message Options
pub mod opt;

/// Message Type
pub mod ty;

/// Message Token
pub mod token;

/// Message Version
pub mod ver;

pub use code::*;
pub use id::*;
pub use opt::{ContentFormat, OptNumber, OptParseError, OptValue, OptionMap};
pub use parse_error::*;
pub use token::*;
pub use ty::*;
pub use ver::*;

/// The request/response body carried after the `0xFF` payload marker.
///
/// May be empty, in which case the marker is absent too.
///
/// See [RFC7252 Section 5.5](https://datatracker.ietf.org/doc/html/rfc7252#section-5.5)
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Payload(pub Vec<u8>);

/// Struct representing the first byte of a message.
///
/// ```text
/// CoAP version
/// |
/// |  Message type (confirmable, ack, ..)
/// |  |
/// |  |  Length of token, in bytes. (4-bit integer)
/// |  |  |
/// vv vv vvvv
/// 01 00 0000
/// ```
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub(crate) struct Byte1 {
  pub(crate) ver: Version,
  pub(crate) ty: Type,
  pub(crate) tkl: u8,
}

impl TryFrom<u8> for Byte1 {
  type Error = MessageParseError;

  fn try_from(b: u8) -> Result<Self, Self::Error> {
    let ver = b >> 6; // bits 0 & 1
    let ty = b >> 4 & 0b11; // bits 2 & 3
    let tkl = b & 0b1111u8; // last 4 bits

    Ok(Byte1 { ver: Version(ver),
               ty: Type::try_from(ty)?,
               tkl })
  }
}

/// # `Message` struct
/// Low-level representation of a message, one field per wire
/// element.  Immutable by convention once it has been handed to a
/// transport.
///
/// Supports serializing to and from bytes via
/// [`TryFromBytes`] and [`TryIntoBytes`](crate::TryIntoBytes).
///
/// ```
/// use tadpole_msg::{Code, Id, Message, Token, TryFromBytes, Type};
///
/// // CON GET, MID 1, token 0xA0, Uri-Path "hi" then "there"
/// let bytes: Vec<u8> = vec![0x41, 0x01, 0x00, 0x01, 0xA0, 0xB2, b'h', b'i', 0x05, b't', b'h',
///                           b'e', b'r', b'e'];
///
/// let msg = Message::try_from_bytes(&bytes).unwrap();
/// assert_eq!(msg.ty, Type::Con);
/// assert_eq!(msg.code, Code::GET);
/// assert_eq!(msg.id, Id(1));
/// assert_eq!(msg.token, Token::from_slice(&[0xA0]).unwrap());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
  /// see [`Id`] for details
  pub id: Id,
  /// see [`Type`] for details
  pub ty: Type,
  /// see [`Version`] for details
  pub ver: Version,
  /// see [`Token`] for details
  pub token: Token,
  /// see [`Code`] for details
  pub code: Code,
  /// see [`OptionMap`] for details
  pub opts: OptionMap,
  /// see [`Payload`]
  pub payload: Payload,
}

/// A message whose type and code disagree with its contents.
///
/// These are the invariants that cannot be expressed in the byte
/// layout itself; a message can parse and still be nonsense.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeError {
  /// The code's class is 1, 3, 6 or 7, which the protocol reserves
  ReservedCode(Code),
  /// A Reset carried a code other than `0.00`
  NonEmptyReset(Code),
  /// An Acknowledgement carried a code that is neither `0.00` nor
  /// a response
  BadAckCode(Code),
  /// The code was `0.00` but the message carried a token, options
  /// or payload
  EmptyCodeWithContent,
}

impl Message {
  /// Create a message with no options and no payload
  pub fn new(ty: Type, code: Code, id: Id, token: Token) -> Self {
    Self { id,
           ty,
           token,
           code,
           ver: Default::default(),
           opts: Default::default(),
           payload: Payload(Default::default()) }
  }

  /// Create the empty Acknowledgement for this message.
  ///
  /// Empty ACKs repeat the Id of the message they acknowledge and
  /// carry nothing else, not even the token.
  pub fn ack(&self) -> Self {
    Self::new(Type::Ack, Code::EMPTY, self.id, Token::empty())
  }

  /// Create the Reset reply for this message, used when the
  /// receiver lacks the context to process it.
  pub fn rst(&self) -> Self {
    Self::new(Type::Reset, Code::EMPTY, self.id, Token::empty())
  }

  /// Create an empty Confirmable message ("CoAP ping"); the peer
  /// will reply Reset, which is an inexpensive liveness check.
  pub fn ping(id: Id) -> Self {
    Self::new(Type::Con, Code::EMPTY, id, Token::empty())
  }

  /// Check the invariants that relate type, code and content.
  /// See [`ShapeError`].
  pub fn validate_shape(&self) -> Result<(), ShapeError> {
    let empty_content = self.token.is_empty() && self.opts.is_empty() && self.payload.0.is_empty();

    match (self.ty, self.code.kind()) {
      | (_, CodeKind::Reserved) => Err(ShapeError::ReservedCode(self.code)),
      | (_, CodeKind::Empty) if !empty_content => Err(ShapeError::EmptyCodeWithContent),
      | (Type::Reset, k) if k != CodeKind::Empty => Err(ShapeError::NonEmptyReset(self.code)),
      | (Type::Ack, CodeKind::Request) => Err(ShapeError::BadAckCode(self.code)),
      | _ => Ok(()),
    }
  }

  /// Feed the parts of this message that distinguish cacheable
  /// responses into a hasher: the code and every option except
  /// those marked no-cache-key.
  pub fn cache_key<H: Hasher>(&self, state: &mut H) {
    u8::from(self.code).hash(state);
    for (number, value) in self.opts.iter() {
      if number.when_option_changes() == opt::WhenOptionChanges::ResponseChanges {
        number.hash(state);
        value.hash(state);
      }
    }
  }
}

/// The identifying fields of a message that failed to parse.
///
/// Best-effort extraction from the fixed header and token, so that
/// the receiver of a garbled Confirmable message can still reply
/// Reset with the right [`Id`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Shell {
  /// see [`Type`]
  pub ty: Type,
  /// see [`Id`]
  pub id: Id,
  /// see [`Token`]
  pub token: Token,
}

impl Shell {
  /// Extract type, id and token from the first `4 + tkl` bytes,
  /// returning None when even those are unusable.
  pub fn try_from_bytes(bytes: &[u8]) -> Option<Shell> {
    let mut bytes = Cursor::new(bytes);
    let Byte1 { tkl, ty, .. } = bytes.next()?.try_into().ok()?;

    if tkl > 8 {
      return None;
    }

    bytes.next()?; // code
    let id = Id::try_consume_bytes(&mut bytes).ok()?;
    let token = bytes.take_exact(tkl as usize).and_then(Token::from_slice)?;

    Some(Shell { ty, id, token })
  }

  /// The Reset reply for the message this shell was torn from
  pub fn rst(&self) -> Message {
    Message::new(Type::Reset, Code::EMPTY, self.id, Token::empty())
  }
}

impl<Bytes: AsRef<[u8]>> TryFromBytes<Bytes> for Message {
  type Error = MessageParseError;

  fn try_from_bytes(bytes: Bytes) -> Result<Self, Self::Error> {
    let mut bytes = Cursor::new(bytes);

    let Byte1 { tkl, ty, ver } = bytes.next()
                                      .ok_or_else(MessageParseError::eof)?
                                      .try_into()?;

    if ver != Version(1) {
      return Err(MessageParseError::InvalidVersion(ver.0));
    }

    if tkl > 8 {
      return Err(MessageParseError::InvalidTokenLength(tkl));
    }

    let code: Code = bytes.next().ok_or_else(MessageParseError::eof)?.into();
    let id: Id = Id::try_consume_bytes(&mut bytes)?;

    let token = bytes.take_exact(tkl as usize)
                     .and_then(Token::from_slice)
                     .ok_or_else(MessageParseError::eof)?;

    if code == Code::EMPTY {
      // empty messages are the 4 header octets and nothing else
      if tkl != 0 || !bytes.is_exhausted() {
        return Err(MessageParseError::EmptyMessageWithContent);
      }

      return Ok(Message::new(ty, code, id, token));
    }

    let (opts, saw_marker) =
      opt::try_consume_opts(&mut bytes).map_err(MessageParseError::OptParseError)?;

    let payload = bytes.take_until_end().to_vec();
    if saw_marker && payload.is_empty() {
      return Err(MessageParseError::PayloadMarkerWithoutPayload);
    }

    Ok(Message { id,
                 ty,
                 ver,
                 code,
                 token,
                 opts,
                 payload: Payload(payload) })
  }
}
