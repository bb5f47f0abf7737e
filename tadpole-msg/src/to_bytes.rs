use tinyvec::ArrayVec;

use crate::msg::opt::MAX_VALUE_LEN;
use crate::*;

/// Trait allowing fallible conversion into bytes
pub trait TryIntoBytes {
  /// Error type yielded if conversion fails
  type Error;

  /// Try to convert into a `Vec` of bytes
  ///
  /// ```
  /// use tadpole_msg::{Id, Message, TryIntoBytes};
  ///
  /// let ping = Message::ping(Id(0x1234));
  /// assert_eq!(ping.try_into_bytes().unwrap(), vec![0x40, 0x00, 0x12, 0x34]);
  /// ```
  fn try_into_bytes(self) -> Result<Vec<u8>, Self::Error>;
}

/// Errors encounterable serializing to bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageToBytesError {
  /// Code was `0.00` but the message carried a token, options or
  /// payload; the empty encoding is exactly 4 octets and cannot
  /// represent them
  EmptyMessageWithContent,

  /// An option value was longer than the protocol allows
  #[allow(missing_docs)]
  OptionValueTooLong { max: usize, actual: usize },
}

impl TryIntoBytes for Message {
  type Error = MessageToBytesError;

  fn try_into_bytes(self) -> Result<Vec<u8>, Self::Error> {
    if self.code == Code::EMPTY
       && !(self.token.is_empty() && self.opts.is_empty() && self.payload.0.is_empty())
    {
      return Err(MessageToBytesError::EmptyMessageWithContent);
    }

    let mut bytes = Vec::with_capacity(4 + self.token.len() + self.payload.0.len() + 16);

    let byte1: u8 = Byte1 { tkl: self.token.len() as u8,
                            ver: self.ver,
                            ty: self.ty }.into();

    bytes.push(byte1);
    bytes.push(self.code.into());
    bytes.extend(<[u8; 2]>::from(self.id));
    bytes.extend(self.token.0);

    let mut prev = 0u16;
    for (OptNumber(number), value) in self.opts.iter() {
      if value.len() > MAX_VALUE_LEN {
        return Err(MessageToBytesError::OptionValueTooLong { max: MAX_VALUE_LEN,
                                                             actual: value.len() });
      }

      let (del, del_bytes) = opt_len_or_delta(number - prev);
      let (len, len_bytes) = opt_len_or_delta(value.len() as u16);

      bytes.push((del << 4) | len);

      if let Some(bs) = del_bytes {
        bytes.extend(bs);
      }

      if let Some(bs) = len_bytes {
        bytes.extend(bs);
      }

      bytes.extend_from_slice(&value.0);
      prev = number;
    }

    if !self.payload.0.is_empty() {
      bytes.push(0b11111111);
      bytes.extend(self.payload.0);
    }

    Ok(bytes)
  }
}

pub(crate) fn opt_len_or_delta(val: u16) -> (u8, Option<ArrayVec<[u8; 2]>>) {
  match val {
    | n if n >= 269 => {
      let mut bytes = ArrayVec::new();
      bytes.extend((n - 269).to_be_bytes());
      (14, Some(bytes))
    },
    | n if n >= 13 => {
      let mut bytes = ArrayVec::new();
      bytes.push((n as u8) - 13);
      (13, Some(bytes))
    },
    | n => (n as u8, None),
  }
}

impl From<Id> for [u8; 2] {
  fn from(id: Id) -> [u8; 2] {
    id.0.to_be_bytes()
  }
}

impl From<Byte1> for u8 {
  fn from(b: Byte1) -> u8 {
    let ver = b.ver.0 << 6;
    let ty = u8::from(b.ty) << 4;
    let tkl = b.tkl;

    ver | ty | tkl
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{assert_eqb, assert_eqb_iter, test_msg};

  #[test]
  fn msg() {
    let (msg, expected) = test_msg();
    let actual: Vec<u8> = msg.try_into_bytes().unwrap();
    assert_eqb_iter!(actual, expected);
  }

  #[test]
  fn byte_1() {
    let byte = Byte1 { ver: Version(1),
                       ty: Type::Ack,
                       tkl: 3 };
    let actual: u8 = byte.into();
    let expected = 0b_01_10_0011u8;
    assert_eqb!(actual, expected)
  }

  #[test]
  fn id() {
    let id = Id(16);
    let actual = u16::from_be_bytes(id.into());
    assert_eqb!(actual, 16)
  }

  #[test]
  fn opt_header_nibbles() {
    use core::iter::repeat;

    // (number, value, expected encoding with previous number 0)
    let cases: [(u16, Vec<u8>, Vec<u8>); 4] =
      [(1, vec![1], vec![0b0001_0001, 1]),
       (24, vec![1], vec![0b1101_0001, 24 - 13, 1]),
       (24,
        repeat(1).take(100).collect(),
        [[0b1101_1101u8, 24 - 13, 100 - 13].as_ref(),
         repeat(1).take(100).collect::<Vec<u8>>().as_ref()].concat()),
       (24,
        repeat(1).take(300).collect(),
        [[0b1101_1110, 24 - 13].as_ref(),
         (300u16 - 269).to_be_bytes().as_ref(),
         repeat(1).take(300).collect::<Vec<u8>>().as_ref()].concat())];

    cases.into_iter().for_each(|(number, value, expected)| {
                       let mut msg = Message::new(Type::Con, Code::GET, Id(0), Token::empty());
                       msg.opts.insert(OptNumber(number), OptValue(value));

                       let bytes = msg.try_into_bytes().unwrap();
                       assert_eqb_iter!(bytes[4..].to_vec(), expected)
                     });
  }

  #[test]
  fn sorted_options_with_repeats() {
    // "hi" and "there" as Uri-Path; delta 11 then delta 0
    let mut msg = Message::new(Type::Con,
                               Code::GET,
                               Id(1),
                               Token::from_slice(&[0xA0]).unwrap());
    msg.opts.push(OptNumber(11), OptValue::from("hi"));
    msg.opts.push(OptNumber(11), OptValue::from("there"));

    assert_eq!(msg.try_into_bytes().unwrap(),
               vec![0x41, 0x01, 0x00, 0x01, 0xA0, 0xB2, b'h', b'i', 0x05, b't', b'h', b'e', b'r',
                    b'e']);
  }

  #[test]
  fn no_payload_marker() {
    let msg = Message::new(Type::Con, Code::new(2, 5), Id(0), Token::empty());
    assert_ne!(msg.try_into_bytes().unwrap().last(), Some(&0b11111111));
  }

  #[test]
  fn empty_message_is_four_octets() {
    let ping = Message::ping(Id(0x1234));
    assert_eq!(ping.try_into_bytes().unwrap(), vec![0x40, 0x00, 0x12, 0x34]);

    let mut bad = Message::ping(Id(1));
    bad.payload = Payload(vec![1]);
    assert_eq!(bad.try_into_bytes(),
               Err(MessageToBytesError::EmptyMessageWithContent));
  }

  #[test]
  fn round_trip() {
    use crate::TryFromBytes;

    let mut msg = Message::new(Type::Non,
                               Code::new(2, 5),
                               Id(777),
                               Token::from_slice(&[1, 2, 3]).unwrap());
    msg.opts.insert(OptNumber(12), OptValue::uint(50));
    msg.opts.push(OptNumber(8), OptValue::from("a"));
    msg.opts.push(OptNumber(8), OptValue::from("b"));
    msg.payload = Payload(b"hello".to_vec());

    let bytes = msg.clone().try_into_bytes().unwrap();
    let back = Message::try_from_bytes(&bytes).unwrap();
    assert_eq!(back, msg);

    // canonical bytes re-encode to themselves
    assert_eq!(back.try_into_bytes().unwrap(), bytes);
  }
}
