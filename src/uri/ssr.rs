//! `ssr://base64(host:port:protocol:method:obfs:base64(password)/?params)`.
//! Parameter values (`obfsparam`, `protoparam`, `remarks`, `group`) are
//! themselves URL-safe Base64.

use super::{parse_port, percent_decode_to_string};
use crate::decode::decode_base64_to_utf8;
use crate::error::ParseError;
use crate::model::{non_empty, Auth, CanonicalProxy, Transport};
use base64::engine::general_purpose;
use base64::Engine;

const SCHEME: &str = "ssr";

pub(super) fn parse(rest: &str) -> Result<CanonicalProxy, ParseError> {
  let body = rest.trim();
  let decoded =
    decode_base64_to_utf8(body).ok_or_else(|| ParseError::malformed(SCHEME, "body is not base64"))?;
  let decoded = decoded.trim();

  let (main, query) = match decoded.split_once("/?").or_else(|| decoded.split_once('?')) {
    Some((m, q)) => (m, q),
    None => (decoded, ""),
  };
  let main = main.trim_end_matches('/');

  let fields: Vec<&str> = main.rsplitn(6, ':').collect();
  let [password_b64, obfs, method, protocol, port, host] = fields[..] else {
    return Err(ParseError::malformed(
      SCHEME,
      "expected host:port:protocol:method:obfs:password",
    ));
  };

  let host = host.trim().trim_start_matches('[').trim_end_matches(']');
  if host.is_empty() {
    return Err(ParseError::malformed(SCHEME, "missing host"));
  }
  let port = parse_port(port, SCHEME)?;
  let password = decode_base64_to_utf8(password_b64)
    .ok_or_else(|| ParseError::malformed(SCHEME, "password is not base64"))?;
  let (Some(method), Some(protocol), Some(obfs)) = (non_empty(method), non_empty(protocol), non_empty(obfs)) else {
    return Err(ParseError::malformed(SCHEME, "empty method, protocol or obfs"));
  };

  let mut name = None;
  let mut transport = Transport::default();
  for pair in query.split('&').filter(|p| !p.is_empty()) {
    let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
    let value = param_value(v);
    match k {
      "remarks" => name = value,
      "obfsparam" => transport.obfs_param = value,
      "protoparam" => transport.protocol_param = value,
      _ => {}
    }
  }

  Ok(CanonicalProxy::new(
    name,
    host.to_string(),
    port,
    Auth::ShadowsocksR {
      cipher: method.to_lowercase(),
      password,
      protocol,
      obfs,
    },
    transport,
  ))
}

fn param_value(raw: &str) -> Option<String> {
  let raw = percent_decode_to_string(raw);
  decode_base64_to_utf8(&raw).and_then(|s| non_empty(&s))
}

fn b64(s: &str) -> String {
  general_purpose::URL_SAFE_NO_PAD.encode(s)
}

pub(super) fn to_uri(proxy: &CanonicalProxy, [protocol, cipher, obfs]: [&str; 3], password: &str) -> String {
  let t = &proxy.transport;
  let mut params = vec![format!("remarks={}", b64(&proxy.name))];
  if let Some(p) = &t.obfs_param {
    params.push(format!("obfsparam={}", b64(p)));
  }
  if let Some(p) = &t.protocol_param {
    params.push(format!("protoparam={}", b64(p)));
  }
  let body = format!(
    "{}:{}:{protocol}:{cipher}:{obfs}:{}/?{}",
    proxy.server,
    proxy.port,
    b64(password),
    params.join("&")
  );
  format!("ssr://{}", b64(&body))
}

#[cfg(test)]
mod tests {
  use super::super::{parse_uri, to_uri};
  use super::*;

  fn link(body: &str) -> String {
    format!("ssr://{}", b64(body))
  }

  #[test]
  fn test_full_link_with_params() {
    let uri = link(&format!(
      "example.com:8989:auth_aes128_md5:aes-256-cfb:tls1.2_ticket_auth:{}/?obfsparam={}&protoparam={}&remarks={}&group={}",
      b64("secret"),
      b64("cdn.example"),
      b64("1234:abcd"),
      b64("香港 01"),
      b64("grp")
    ));
    let p = parse_uri(&uri).unwrap();
    assert_eq!(p.name, "香港 01");
    assert_eq!(p.server, "example.com");
    assert_eq!(p.port, 8989);
    assert_eq!(
      p.auth,
      Auth::ShadowsocksR {
        cipher: "aes-256-cfb".into(),
        password: "secret".into(),
        protocol: "auth_aes128_md5".into(),
        obfs: "tls1.2_ticket_auth".into(),
      }
    );
    assert_eq!(p.transport.obfs_param.as_deref(), Some("cdn.example"));
    assert_eq!(p.transport.protocol_param.as_deref(), Some("1234:abcd"));
  }

  #[test]
  fn test_missing_remarks_synthesizes_name() {
    let uri = link(&format!("1.2.3.4:443:origin:aes-128-ctr:plain:{}", b64("pw")));
    let p = parse_uri(&uri).unwrap();
    assert_eq!(p.name, "ssr-1.2.3.4:443");
  }

  #[test]
  fn test_ipv6_host() {
    let uri = link(&format!("2001:db8::1:443:origin:aes-128-ctr:plain:{}/?", b64("pw")));
    let p = parse_uri(&uri).unwrap();
    assert_eq!(p.server, "2001:db8::1");
    assert_eq!(p.port, 443);
  }

  #[test]
  fn test_round_trip() {
    let uri = link(&format!(
      "h.example:1080:auth_chain_a:none:http_simple:{}/?obfsparam={}&remarks={}",
      b64("p:w"),
      b64("obfs.example"),
      b64("R")
    ));
    let p = parse_uri(&uri).unwrap();
    let back = parse_uri(&to_uri(&p)).unwrap();
    assert_eq!(back.identity(), p.identity());
    assert_eq!(back.name, "R");
    assert_eq!(back.transport.obfs_param, p.transport.obfs_param);
  }

  #[test]
  fn test_malformed() {
    assert!(parse_uri("ssr://%%%").is_err());
    assert!(parse_uri(&link("host:443:origin:aes-128-ctr")).is_err());
    assert!(parse_uri(&link(&format!("host:notaport:origin:aes:plain:{}", b64("pw")))).is_err());
  }
}
