//! Named [`OptNumber`](crate::OptNumber) constants for the base
//! option table, grouped by whether the option may repeat.

use super::OptValue;

macro_rules! opt {
  (#[doc = $doc:expr] $name:ident = $n:literal) => {
    #[doc = $doc]
    #[allow(clippy::zero_prefixed_literal)]
    pub const $name: crate::OptNumber = crate::OptNumber($n);
  };
}

/// Non-repeatable options
pub mod no_repeat {
  opt!(#[doc = "Uri-Host, <https://datatracker.ietf.org/doc/html/rfc7252#section-5.10.1>"]
       URI_HOST = 3);
  opt!(#[doc = "If-None-Match, <https://datatracker.ietf.org/doc/html/rfc7252#section-5.10.8.2>"]
       IF_NONE_MATCH = 5);
  opt!(#[doc = "Uri-Port, see [`URI_HOST`]"]
       URI_PORT = 7);
  opt!(#[doc = "Content-Format, <https://datatracker.ietf.org/doc/html/rfc7252#section-5.10.3>"]
       CONTENT_FORMAT = 12);
  opt!(#[doc = "Max-Age, <https://datatracker.ietf.org/doc/html/rfc7252#section-5.10.5>"]
       MAX_AGE = 14);
  opt!(#[doc = "Accept, <https://datatracker.ietf.org/doc/html/rfc7252#section-5.10.4>"]
       ACCEPT = 17);
  opt!(#[doc = "Proxy-Uri, <https://datatracker.ietf.org/doc/html/rfc7252#section-5.10.2>"]
       PROXY_URI = 35);
  opt!(#[doc = "Proxy-Scheme, see [`PROXY_URI`]"]
       PROXY_SCHEME = 39);
  opt!(#[doc = "Size1, <https://datatracker.ietf.org/doc/html/rfc7252#section-5.10.9>"]
       SIZE1 = 60);
}

/// Repeatable options
pub mod repeat {
  opt!(#[doc = "If-Match, <https://datatracker.ietf.org/doc/html/rfc7252#section-5.10.8.1>"]
       IF_MATCH = 1);
  opt!(#[doc = "ETag, <https://datatracker.ietf.org/doc/html/rfc7252#section-5.10.6>"]
       ETAG = 4);
  opt!(#[doc = "Location-Path, <https://datatracker.ietf.org/doc/html/rfc7252#section-5.10.7>"]
       LOCATION_PATH = 8);
  opt!(#[doc = "Uri-Path, see [`super::no_repeat::URI_HOST`]"]
       URI_PATH = 11);
  opt!(#[doc = "Uri-Query, see [`super::no_repeat::URI_HOST`]"]
       URI_QUERY = 15);
  opt!(#[doc = "Location-Query, see [`LOCATION_PATH`]"]
       LOCATION_QUERY = 20);
}

/// Content-Format
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFormat {
  /// `text/plain; charset=utf-8`
  Text,
  /// `application/link-format`
  LinkFormat,
  /// `application/xml`
  Xml,
  /// `application/octet-stream`
  OctetStream,
  /// `application/exi`
  Exi,
  /// `application/json`
  Json,
  /// Another content format
  Other(u16),
}

impl<'a> From<&'a ContentFormat> for u16 {
  fn from(f: &'a ContentFormat) -> Self {
    use ContentFormat::*;
    match *f {
      | Text => 0,
      | LinkFormat => 40,
      | Xml => 41,
      | OctetStream => 42,
      | Exi => 47,
      | Json => 50,
      | Other(n) => n,
    }
  }
}

impl From<u16> for ContentFormat {
  fn from(n: u16) -> Self {
    use ContentFormat::*;
    match n {
      | 0 => Text,
      | 40 => LinkFormat,
      | 41 => Xml,
      | 42 => OctetStream,
      | 47 => Exi,
      | 50 => Json,
      | n => Other(n),
    }
  }
}

impl From<ContentFormat> for OptValue {
  fn from(f: ContentFormat) -> Self {
    OptValue::uint(u16::from(&f) as u64)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn content_format_values() {
    assert_eq!(u16::from(&ContentFormat::Json), 50);
    assert_eq!(ContentFormat::from(50u16), ContentFormat::Json);
    assert_eq!(OptValue::from(ContentFormat::Text), OptValue::empty());
    assert_eq!(OptValue::from(ContentFormat::Json), OptValue(vec![50]));
  }
}
