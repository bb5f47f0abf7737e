use tadpole_msg::{MessageToBytesError, ShapeError};

/// Why a submission was refused outright.
///
/// Everything that can go wrong *after* a message is accepted is
/// reported through resolution events instead; no error crosses
/// the event-loop boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SubmitError {
  /// Type and code disagree with the message's contents
  /// (see [`ShapeError`])
  Shape(ShapeError),
  /// The message could not be serialized
  ToBytes(MessageToBytesError),
  /// The clock failed to produce a timestamp
  Clock(embedded_time::clock::Error),
}

/// Why one call into the event loop gave up early.
///
/// These abort the *call*, never the loop: the caller is free to
/// poll again.
#[derive(Debug)]
pub enum Error<E> {
  /// The transport failed while receiving.  Send-side failures
  /// resolve the affected transmission as failed instead of
  /// surfacing here.
  Transport(E),
  /// The clock failed to produce a timestamp
  Clock(embedded_time::clock::Error),
}
