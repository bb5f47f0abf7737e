use tinyvec::ArrayVec;

/// # Token
///
/// Opaque sequence of 0..8 bytes chosen by the sender of a request,
/// echoed verbatim by the responder.  Where [`Id`](crate::Id) pairs a
/// Confirmable message with its Acknowledgement or Reset, the token
/// pairs a *request* with its *response*, which may arrive in a later
/// exchange entirely.
///
/// See [RFC7252 Section 5.3.1](https://datatracker.ietf.org/doc/html/rfc7252#section-5.3.1)
#[derive(Copy, Clone, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Token(pub ArrayVec<[u8; 8]>);

impl Token {
  /// The zero-length token carried by empty messages
  /// and requests that don't care about response pairing.
  pub fn empty() -> Token {
    Token(Default::default())
  }

  /// Copy up to 8 bytes into a token, returning None when
  /// `data` is longer than the wire format allows.
  pub fn from_slice(data: &[u8]) -> Option<Token> {
    if data.len() > 8 {
      None
    } else {
      let mut buf = ArrayVec::default();
      buf.extend_from_slice(data);
      Some(Token(buf))
    }
  }

  /// Length of the token in bytes, 0..=8
  pub fn len(&self) -> usize {
    self.0.len()
  }

  /// Whether this is the zero-length token
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn from_slice_rejects_long_tokens() {
    assert_eq!(Token::from_slice(&[0; 9]), None);
    assert_eq!(Token::from_slice(&[1, 2]).unwrap().len(), 2);
    assert!(Token::empty().is_empty());
  }
}
