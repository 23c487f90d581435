//! Payload decoding: raw subscription bytes to text, unwrapping at most one
//! Base64 layer.

use crate::error::DecodeError;
use base64::engine::general_purpose;
use base64::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
  Plain,
  Base64,
}

#[derive(Debug, Clone)]
pub struct Decoded {
  pub text: String,
  pub encoding: Encoding,
}

const YAML_INDICATORS: &[char] = &[
  ':', '{', '}', '[', ']', '#', '&', '*', '!', '|', '>', '\'', '"', '%', '@', '`',
];

/// Decodes one subscription payload.
///
/// Direct UTF-8 is tried first. Text that carries neither `:` nor any YAML
/// indicator and looks like Base64 is unwrapped once; the unwrapped text is
/// never decoded again. Empty or whitespace-only payloads decode to empty
/// text.
pub fn decode(raw: &[u8]) -> Result<Decoded, DecodeError> {
  let raw = raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(raw);
  let text = std::str::from_utf8(raw).map_err(|_| DecodeError::NotText(raw.len()))?;

  if looks_plausible(text) || !looks_like_base64(text) {
    return Ok(Decoded {
      text: text.to_string(),
      encoding: Encoding::Plain,
    });
  }

  match decode_base64_to_utf8(text) {
    Some(inner) => Ok(Decoded {
      text: inner,
      encoding: Encoding::Base64,
    }),
    None => Ok(Decoded {
      text: text.to_string(),
      encoding: Encoding::Plain,
    }),
  }
}

fn looks_plausible(text: &str) -> bool {
  text.trim().is_empty() || text.contains(YAML_INDICATORS)
}

pub(crate) fn looks_like_base64(text: &str) -> bool {
  let s = text.trim();
  if s.len() < 16 {
    return false;
  }
  let lower = s.to_lowercase();
  if lower.starts_with("http://") || lower.starts_with("https://") {
    return false;
  }
  s.chars().all(|c| {
    c.is_whitespace() || c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=' | '-' | '_')
  })
}

/// Lenient Base64 decode: standard or URL-safe alphabet, padding optional,
/// embedded whitespace ignored. `None` unless the result is non-blank UTF-8.
pub(crate) fn decode_base64_to_utf8(s: &str) -> Option<String> {
  let cleaned: String = s.chars().filter(|c| !c.is_whitespace()).collect();
  let cleaned = cleaned.trim_end_matches('=');
  if cleaned.is_empty() {
    return None;
  }
  let mut padded = cleaned.to_string();
  let rem = padded.len() % 4;
  if rem == 1 {
    return None;
  }
  if rem != 0 {
    padded.push_str(&"=".repeat(4 - rem));
  }

  for engine in [&general_purpose::STANDARD, &general_purpose::URL_SAFE] {
    if let Ok(bytes) = engine.decode(&padded) {
      if let Ok(txt) = String::from_utf8(bytes) {
        if !txt.trim().is_empty() {
          return Some(txt);
        }
      }
    }
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;

  fn b64(s: &str) -> String {
    general_purpose::STANDARD.encode(s)
  }

  #[test]
  fn test_plain_uri_list_passes_through() {
    let d = decode(b"trojan://pw@host:443#a\n").unwrap();
    assert_eq!(d.encoding, Encoding::Plain);
    assert!(d.text.starts_with("trojan://"));
  }

  #[test]
  fn test_base64_wrapped_list_is_unwrapped_once() {
    let inner = "ss://YWVzLTI1Ni1nY206cGFzcw@host1:8388#A\ntrojan://pw@host2:443#B";
    let d = decode(b64(inner).as_bytes()).unwrap();
    assert_eq!(d.encoding, Encoding::Base64);
    assert_eq!(d.text, inner);
  }

  #[test]
  fn test_double_wrapped_payload_is_not_decoded_twice() {
    let inner = "trojan://pw@host2:443#B";
    let twice = b64(&b64(inner));
    let d = decode(twice.as_bytes()).unwrap();
    assert_eq!(d.encoding, Encoding::Base64);
    assert_eq!(d.text, b64(inner));
  }

  #[test]
  fn test_line_wrapped_and_unpadded_base64() {
    let inner = "vless://uuid@example.com:443?security=tls#v";
    let enc = general_purpose::URL_SAFE_NO_PAD.encode(inner);
    let wrapped = format!("{}\n{}\n", &enc[..20], &enc[20..]);
    let d = decode(wrapped.as_bytes()).unwrap();
    assert_eq!(d.text, inner);
  }

  #[test]
  fn test_empty_and_whitespace_payloads_are_not_errors() {
    assert_eq!(decode(b"").unwrap().text, "");
    assert_eq!(decode(b"  \n\t").unwrap().encoding, Encoding::Plain);
  }

  #[test]
  fn test_utf8_bom_is_stripped() {
    let d = decode(b"\xEF\xBB\xBFproxies: []").unwrap();
    assert_eq!(d.text, "proxies: []");
  }

  #[test]
  fn test_non_utf8_bytes_fail() {
    let err = decode(&[0xff, 0xfe, 0x00, 0x81]).unwrap_err();
    assert!(matches!(err, DecodeError::NotText(4)));
  }

  #[test]
  fn test_undecodable_base64_lookalike_is_kept_as_text() {
    let d = decode(b"abcdefghijklmnopq").unwrap();
    assert_eq!(d.encoding, Encoding::Plain);
    assert_eq!(d.text, "abcdefghijklmnopq");
  }
}
