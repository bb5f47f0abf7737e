use core::fmt;

/// # Message Code
///
/// 8-bit code split into a 3-bit class and 5-bit detail,
/// customarily written `c.dd` (e.g. `0.01` GET, `2.05` Content,
/// `4.04` Not Found).
///
/// The class determines the role of the message:
///
/// | class | meaning |
/// | -- | -- |
/// | 0 | `0.00` empty message, `0.01`..`0.31` request methods |
/// | 2, 4, 5 | response |
/// | 1, 3, 6, 7 | reserved, must not appear on the wire |
///
/// See [RFC7252 Section 5.9](https://datatracker.ietf.org/doc/html/rfc7252#section-5.9)
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Code {
  /// The code class (0..7)
  pub class: u8,
  /// The code detail (0..31)
  pub detail: u8,
}

/// The role a [`Code`] plays in a conversation
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum CodeKind {
  /// `0.00`; carried by pings, Acknowledgements and Resets
  Empty,
  /// class 0 with nonzero detail; a request (GET, POST, PUT,
  /// DELETE, ..)
  Request,
  /// class 2, 4 or 5; a response
  Response,
  /// class 1, 3, 6 or 7; not defined by the protocol
  Reserved,
}

impl Code {
  /// Create a new Code
  ///
  /// ```
  /// use tadpole_msg::Code;
  ///
  /// let content = Code::new(2, 05);
  /// assert_eq!(content.to_string(), "2.05");
  /// ```
  pub const fn new(class: u8, detail: u8) -> Self {
    Self { class, detail }
  }

  /// `0.00`, the empty code
  pub const EMPTY: Code = Code::new(0, 0);
  /// `0.01` GET
  pub const GET: Code = Code::new(0, 1);
  /// `0.02` POST
  pub const POST: Code = Code::new(0, 2);
  /// `0.03` PUT
  pub const PUT: Code = Code::new(0, 3);
  /// `0.04` DELETE
  pub const DELETE: Code = Code::new(0, 4);

  /// Whether this code is empty, a request, a response,
  /// or reserved
  pub fn kind(&self) -> CodeKind {
    match (self.class, self.detail) {
      | (0, 0) => CodeKind::Empty,
      | (0, _) => CodeKind::Request,
      | (2 | 4 | 5, _) => CodeKind::Response,
      | _ => CodeKind::Reserved,
    }
  }
}

impl From<u8> for Code {
  fn from(b: u8) -> Self {
    Code { class: b >> 5,
           detail: b & 0b11111 }
  }
}

impl From<Code> for u8 {
  fn from(code: Code) -> u8 {
    (code.class << 5) | code.detail
  }
}

impl fmt::Display for Code {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{:02}", self.class, self.detail)
  }
}
