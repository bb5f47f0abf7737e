use tadpole_msg::Message;

/// One-line description of a message for log records,
/// e.g. `Request: Con 0.01 with 0 byte payload`
pub(crate) fn msg_summary(msg: &Message) -> String {
  format!("{:?}: {:?} {} with {} byte payload",
          msg.code.kind(),
          msg.ty,
          msg.code,
          msg.payload.0.len())
}
