//! Proxy URI parsers, one per scheme, selected by a fixed prefix table.
//!
//! Every parser turns one URI into a [`CanonicalProxy`]; [`to_uri`] goes the
//! other way so records can be re-exported as a URI list.

mod ss;
mod ssr;
mod trojan;
mod vless;
mod vmess;

use crate::error::ParseError;
use crate::model::{non_empty, truthy, Auth, CanonicalProxy, Transport};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::HashMap;
use url::Url;

type ParseFn = fn(&str) -> Result<CanonicalProxy, ParseError>;

const PARSERS: &[(&str, ParseFn)] = &[
  ("ss://", ss::parse),
  ("ssr://", ssr::parse),
  ("trojan://", trojan::parse),
  ("vless://", vless::parse),
  ("vmess://", vmess::parse),
];

/// Characters left as-is when percent-encoding a URI component.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Parses one proxy URI. The scheme match is case-insensitive.
pub fn parse_uri(uri: &str) -> Result<CanonicalProxy, ParseError> {
  let s = uri.trim();
  let lower = s.get(..9).unwrap_or(s).to_ascii_lowercase();
  for (prefix, parse) in PARSERS {
    if lower.starts_with(prefix) {
      return parse(&s[prefix.len()..]);
    }
  }
  let scheme = match s.split_once("://") {
    Some((scheme, _)) => scheme.to_string(),
    None => s.chars().take(16).collect(),
  };
  Err(ParseError::UnsupportedProtocol(scheme))
}

/// True when `line` starts with one of the supported schemes.
pub fn is_supported(line: &str) -> bool {
  let line = line.trim_start();
  let lower = line.get(..9).unwrap_or(line).to_ascii_lowercase();
  PARSERS.iter().any(|(prefix, _)| lower.starts_with(prefix))
}

/// Re-synthesizes a URI that parses back to the same identity.
pub fn to_uri(proxy: &CanonicalProxy) -> String {
  match &proxy.auth {
    Auth::Shadowsocks { cipher, password } => ss::to_uri(proxy, cipher, password),
    Auth::ShadowsocksR {
      cipher,
      password,
      protocol,
      obfs,
    } => ssr::to_uri(proxy, [protocol.as_str(), cipher.as_str(), obfs.as_str()], password),
    Auth::Trojan { password } => trojan::to_uri(proxy, password),
    Auth::Vless { uuid, flow } => vless::to_uri(proxy, uuid, flow.as_deref()),
    Auth::Vmess {
      uuid,
      alter_id,
      cipher,
    } => vmess::to_uri(proxy, uuid, *alter_id, cipher),
  }
}

pub(crate) fn percent_decode_to_string(s: &str) -> String {
  match percent_decode_str(s).decode_utf8() {
    Ok(cow) => cow.to_string(),
    Err(_) => s.to_string(),
  }
}

pub(crate) fn encode_component(s: &str) -> String {
  utf8_percent_encode(s, COMPONENT).to_string()
}

/// Splits `host:port`, accepting a bracketed IPv6 host.
pub(crate) fn split_host_port(s: &str, scheme: &'static str) -> Result<(String, u16), ParseError> {
  let s = s.trim().trim_end_matches('/');
  let (host, port) = if let Some(rest) = s.strip_prefix('[') {
    let (host, tail) = rest
      .split_once(']')
      .ok_or_else(|| ParseError::malformed(scheme, "unterminated ipv6 host"))?;
    let port = tail
      .strip_prefix(':')
      .ok_or_else(|| ParseError::malformed(scheme, "missing port"))?;
    (host, port)
  } else {
    s.rsplit_once(':')
      .ok_or_else(|| ParseError::malformed(scheme, "missing port"))?
  };
  let host = host.trim();
  if host.is_empty() {
    return Err(ParseError::malformed(scheme, "missing host"));
  }
  Ok((host.to_string(), parse_port(port, scheme)?))
}

pub(crate) fn parse_port(raw: &str, scheme: &'static str) -> Result<u16, ParseError> {
  match raw.trim().parse::<u16>() {
    Ok(0) | Err(_) => Err(ParseError::malformed(scheme, format!("invalid port `{}`", raw.trim()))),
    Ok(port) => Ok(port),
  }
}

/// Formats `host:port`, bracketing IPv6 literals.
pub(crate) fn join_host_port(host: &str, port: u16) -> String {
  if host.contains(':') {
    format!("[{host}]:{port}")
  } else {
    format!("{host}:{port}")
  }
}

/// Shape shared by `scheme://credential@host:port?query#fragment` URIs.
#[derive(Debug)]
pub(crate) struct UriCommon {
  pub name: Option<String>,
  pub host: String,
  pub port: u16,
  pub credential: String,
  pub params: HashMap<String, String>,
}

pub(crate) fn parse_uri_common(scheme: &'static str, rest: &str) -> Result<UriCommon, ParseError> {
  let u = Url::parse(&format!("{scheme}://{rest}"))
    .map_err(|e| ParseError::malformed(scheme, e.to_string()))?;

  let host = u
    .host_str()
    .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
    .filter(|h| !h.is_empty())
    .ok_or_else(|| ParseError::malformed(scheme, "missing host"))?;
  let port = match u.port() {
    Some(0) | None => return Err(ParseError::malformed(scheme, "missing port")),
    Some(p) => p,
  };

  let mut credential = percent_decode_to_string(u.username());
  if let Some(password) = u.password() {
    credential.push(':');
    credential.push_str(&percent_decode_to_string(password));
  }
  if credential.trim().is_empty() {
    return Err(ParseError::malformed(scheme, "missing credential"));
  }

  let name = u.fragment().map(percent_decode_to_string).and_then(|s| non_empty(&s));
  let params = u
    .query_pairs()
    .map(|(k, v)| (k.to_string(), v.trim().to_string()))
    .collect();

  Ok(UriCommon {
    name,
    host,
    port,
    credential,
    params,
  })
}

fn param<'a>(params: &'a HashMap<String, String>, keys: &[&str]) -> Option<&'a str> {
  keys
    .iter()
    .filter_map(|k| params.get(*k))
    .map(String::as_str)
    .find(|v| !v.is_empty())
}

/// Transport options from the query string of a trojan or vless URI.
pub(crate) fn transport_from_query(params: &HashMap<String, String>, tls_by_default: bool) -> Transport {
  let network = param(params, &["type"]).map(|s| s.to_ascii_lowercase());
  let security = param(params, &["security"]).map(|s| s.to_ascii_lowercase());
  let tls = match security.as_deref() {
    Some("tls") | Some("xtls") | Some("reality") => true,
    Some(_) => false,
    None => tls_by_default || param(params, &["tls"]).is_some_and(truthy),
  };

  let mut t = Transport {
    network: network.clone(),
    tls,
    sni: param(params, &["sni", "peer", "serverName", "servername"]).map(str::to_string),
    alpn: param(params, &["alpn"])
      .map(|s| s.split(',').filter_map(non_empty).collect())
      .unwrap_or_default(),
    skip_cert_verify: param(
      params,
      &["allowInsecure", "allow_insecure", "insecure", "skip-cert-verify"],
    )
    .map(truthy),
    udp: param(params, &["udp"]).map(truthy),
    fingerprint: param(params, &["fp", "client-fingerprint"]).map(str::to_string),
    ..Transport::default()
  };

  match network.as_deref() {
    Some("ws") | Some("httpupgrade") => {
      t.ws_path = param(params, &["path"]).map(str::to_string);
      t.ws_host = param(params, &["host"]).map(str::to_string);
    }
    Some("grpc") => {
      t.grpc_service_name = param(params, &["serviceName", "service_name"]).map(str::to_string);
    }
    _ => {}
  }

  if security.as_deref() == Some("reality") {
    t.reality_public_key = param(params, &["pbk"]).map(str::to_string);
    t.reality_short_id = param(params, &["sid"]).map(str::to_string);
  }
  t
}

/// Inverse of [`transport_from_query`]; `security` is written by the caller.
pub(crate) fn transport_to_query(t: &Transport, out: &mut Vec<(&'static str, String)>) {
  if let Some(sni) = &t.sni {
    out.push(("sni", sni.clone()));
  }
  if !t.alpn.is_empty() {
    out.push(("alpn", t.alpn.join(",")));
  }
  if let Some(fp) = &t.fingerprint {
    out.push(("fp", fp.clone()));
  }
  if let Some(pbk) = &t.reality_public_key {
    out.push(("pbk", pbk.clone()));
  }
  if let Some(sid) = &t.reality_short_id {
    out.push(("sid", sid.clone()));
  }
  if let Some(network) = &t.network {
    out.push(("type", network.clone()));
  }
  if let Some(path) = &t.ws_path {
    out.push(("path", path.clone()));
  }
  if let Some(host) = &t.ws_host {
    out.push(("host", host.clone()));
  }
  if let Some(service) = &t.grpc_service_name {
    out.push(("serviceName", service.clone()));
  }
  if t.skip_cert_verify == Some(true) {
    out.push(("allowInsecure", "1".to_string()));
  }
  if let Some(udp) = t.udp {
    out.push(("udp", if udp { "1" } else { "0" }.to_string()));
  }
}

pub(crate) fn encode_query(pairs: &[(&'static str, String)]) -> String {
  pairs
    .iter()
    .map(|(k, v)| format!("{k}={}", encode_component(v)))
    .collect::<Vec<_>>()
    .join("&")
}

/// `scheme://credential@host:port?query#name`
pub(crate) fn format_authority_uri(
  scheme: &str,
  credential: &str,
  proxy: &CanonicalProxy,
  query: &[(&'static str, String)],
) -> String {
  let mut out = format!(
    "{scheme}://{}@{}",
    encode_component(credential),
    join_host_port(&proxy.server, proxy.port)
  );
  if !query.is_empty() {
    out.push('?');
    out.push_str(&encode_query(query));
  }
  out.push('#');
  out.push_str(&encode_component(&proxy.name));
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Protocol;

  #[test]
  fn test_unknown_scheme_is_unsupported() {
    let err = parse_uri("hysteria2://pw@h:443#x").unwrap_err();
    assert_eq!(err, ParseError::UnsupportedProtocol("hysteria2".into()));
    let err = parse_uri("not a uri").unwrap_err();
    assert!(matches!(err, ParseError::UnsupportedProtocol(_)));
  }

  #[test]
  fn test_scheme_match_is_case_insensitive() {
    let p = parse_uri("TROJAN://pw@example.com:443#t").unwrap();
    assert_eq!(p.protocol(), Protocol::Trojan);
  }

  #[test]
  fn test_is_supported() {
    assert!(is_supported("ssr://abc"));
    assert!(is_supported("  vmess://abc"));
    assert!(!is_supported("socks5://h:1"));
  }

  #[test]
  fn test_split_host_port_variants() {
    assert_eq!(split_host_port("h:1", "ss").unwrap(), ("h".to_string(), 1));
    assert_eq!(split_host_port("[::1]:8388/", "ss").unwrap(), ("::1".to_string(), 8388));
    assert!(split_host_port("h", "ss").is_err());
    assert!(split_host_port("h:0", "ss").is_err());
    assert!(split_host_port("h:70000", "ss").is_err());
    assert!(split_host_port(":80", "ss").is_err());
  }

  #[test]
  fn test_round_trip_keeps_identity_for_every_protocol() {
    let uris = [
      "ss://YWVzLTI1Ni1nY206cGFzcw@host1:8388#A",
      "trojan://secret@example.com:443?sni=cdn.example&type=ws&path=%2Fws#T",
      "vless://b831381d-6324-4d53-ad4f-8cda48b30811@[2001:db8::1]:443?security=reality&pbk=KEY&sid=01&flow=xtls-rprx-vision#V",
    ];
    for uri in uris {
      let first = parse_uri(uri).unwrap();
      let again = parse_uri(&to_uri(&first)).unwrap();
      assert_eq!(first.identity(), again.identity(), "{uri}");
      assert_eq!(first.name, again.name);
    }
  }

  #[test]
  fn test_round_trip_with_reserved_characters_in_credentials() {
    let p = CanonicalProxy::new(
      Some("名字 #1".into()),
      "example.com".into(),
      443,
      Auth::Trojan {
        password: "p@ss:w/rd?#".into(),
      },
      Transport {
        tls: true,
        ..Transport::default()
      },
    );
    let back = parse_uri(&to_uri(&p)).unwrap();
    assert_eq!(back.auth, p.auth);
    assert_eq!(back.name, "名字 #1");
  }
}
