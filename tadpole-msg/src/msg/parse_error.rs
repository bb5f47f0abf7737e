/// Errors encounterable while parsing a message from bytes
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Eq, Ord)]
pub enum MessageParseError {
  /// Reached end of stream before parsing was finished
  UnexpectedEndOfStream,

  /// Version field was not 1
  InvalidVersion(u8),

  /// Token length was > 8
  InvalidTokenLength(u8),

  /// The message type is invalid (see [`Type`](crate::Type) for information & valid values)
  InvalidType(u8),

  /// Error parsing option
  OptParseError(super::opt::parse_error::OptParseError),

  /// The payload marker `0xFF` was present with zero payload bytes following it
  PayloadMarkerWithoutPayload,

  /// The code was `0.00` but the message carried a token, options or payload
  EmptyMessageWithContent,
}

impl MessageParseError {
  /// Shorthand for [`MessageParseError::UnexpectedEndOfStream`]
  pub fn eof() -> Self {
    Self::UnexpectedEndOfStream
  }
}
