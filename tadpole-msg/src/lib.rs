//! Low-level representation of CoAP messages.
//!
//! The most notable item in `tadpole_msg` is [`Message`];
//! a CoAP message very close to the actual byte layout.
//!
//! ## Options
//! CoAP messages carry their metadata in **options** (in http terms: headers).
//! Options are stored in an [`OptionMap`]; a sorted multimap from
//! [`OptNumber`] to the values set for that number.
//!
//! Iterating an [`OptionMap`] always yields options in the canonical wire
//! order (ascending number, insertion order among repeats), which is what
//! makes [`Message::try_into_bytes`] deterministic.
//!
//! ## Option registry
//! Whether a given option number is repeatable, how long its value may be
//! and in which direction it may travel is not knowable from the number
//! alone; that knowledge lives in the [`Registry`](opt::Registry).
//! The registry that ships with this crate covers the base table of
//! RFC7252; applications may [`register`](opt::Registry::register)
//! extension options at startup.
//!
//! ```rust
//! use tadpole_msg::{Code, Id, Message, Token, TryFromBytes, TryIntoBytes, Type};
//!
//! let mut msg = Message::new(Type::Con, Code::GET, Id(1), Token::empty());
//! msg.opts
//!    .insert(tadpole_msg::opt::repeat::URI_PATH, "hello".into());
//!
//! let bytes: Vec<u8> = msg.clone().try_into_bytes().unwrap();
//! assert_eq!(Message::try_from_bytes(&bytes).unwrap(), msg);
//! ```

#![doc(html_root_url = "https://docs.rs/tadpole-msg/0.1.0")]
#![cfg_attr(not(test), forbid(missing_debug_implementations, unreachable_pub))]
#![cfg_attr(not(test), deny(unsafe_code, missing_copy_implementations))]
#![deny(missing_docs)]

/// Cursor over a byte buffer used by the decoding traits
pub mod cursor;

#[doc(hidden)]
pub mod from_bytes;

/// Message structs
pub mod msg;

#[doc(hidden)]
pub mod to_bytes;

#[doc(inline)]
pub use from_bytes::TryFromBytes;
#[doc(inline)]
pub use msg::*;
#[doc(inline)]
pub use to_bytes::{MessageToBytesError, TryIntoBytes};

#[cfg(test)]
pub(crate) fn test_msg() -> (Message, Vec<u8>) {
  let header: [u8; 4] = 0b0100_0001_0100_0101_0000_0000_0000_0001_u32.to_be_bytes();
  let token: [u8; 1] = [254u8];
  let content_format: &[u8] = b"application/json";
  let options: [&[u8]; 2] = [&[0b_1100_1101u8, 0b00000011u8], content_format];
  let payload: [&[u8]; 2] = [&[0b1111_1111_u8], b"hello, world!"];
  let bytes = [header.as_ref(),
               token.as_ref(),
               options.concat().as_ref(),
               payload.concat().as_ref()].concat();

  let mut opts = OptionMap::default();
  opts.insert(OptNumber(12), OptValue(content_format.to_vec()));

  let msg = Message { id: Id(1),
                      ty: Type::Con,
                      ver: Version(1),
                      token: Token(tinyvec::array_vec!([u8; 8] => 254)),
                      opts,
                      code: Code { class: 2,
                                   detail: 5 },
                      payload: Payload(b"hello, world!".to_vec()) };
  (msg, bytes)
}

#[cfg(test)]
pub(crate) mod tests {
  #[macro_export]
  macro_rules! assert_eqb {
    ($actual:expr, $expected:expr) => {
      if $actual != $expected {
        panic!("expected {:08b} to equal {:08b}", $actual, $expected)
      }
    };
  }

  #[macro_export]
  macro_rules! assert_eqb_iter {
    ($actual:expr, $expected:expr) => {
      if $actual.iter().ne($expected.iter()) {
        panic!("expected {:?} to equal {:?}",
               $actual.into_iter()
                      .map(|b| format!("{:08b}", b))
                      .collect::<Vec<_>>(),
               $expected.into_iter()
                        .map(|b| format!("{:08b}", b))
                        .collect::<Vec<_>>())
      }
    };
  }
}
