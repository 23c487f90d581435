//! `ss://` links, SIP002 (`ss://userinfo@host:port/?plugin=..#name`) and the
//! legacy fully-encoded `ss://base64(method:password@host:port)#name`.

use super::{encode_component, encode_query, join_host_port, percent_decode_to_string, split_host_port};
use crate::decode::decode_base64_to_utf8;
use crate::error::ParseError;
use crate::model::{non_empty, Auth, CanonicalProxy, Transport};
use base64::engine::general_purpose;
use base64::Engine;
use std::collections::BTreeMap;

const SCHEME: &str = "ss";

pub(super) fn parse(rest: &str) -> Result<CanonicalProxy, ParseError> {
  let (main, fragment) = match rest.split_once('#') {
    Some((m, f)) => (m, Some(f)),
    None => (rest, None),
  };
  let name = fragment.map(percent_decode_to_string);

  let (addr, query) = match main.split_once('?') {
    Some((a, q)) => (a, Some(q)),
    None => (main, None),
  };
  let addr = addr.trim().trim_end_matches('/');
  if addr.is_empty() {
    return Err(ParseError::malformed(SCHEME, "empty body"));
  }

  let (userinfo, host_port) = match addr.rsplit_once('@') {
    Some((user, hp)) => (decode_userinfo(user)?, hp.to_string()),
    None => {
      let decoded = decode_base64_to_utf8(addr)
        .ok_or_else(|| ParseError::malformed(SCHEME, "legacy body is not base64"))?;
      let (user, hp) = decoded
        .trim()
        .rsplit_once('@')
        .ok_or_else(|| ParseError::malformed(SCHEME, "legacy body has no `@`"))?;
      (user.to_string(), hp.to_string())
    }
  };

  let (cipher, password) = userinfo
    .split_once(':')
    .ok_or_else(|| ParseError::malformed(SCHEME, "userinfo is not `method:password`"))?;
  let cipher = non_empty(cipher).ok_or_else(|| ParseError::malformed(SCHEME, "empty method"))?;
  if password.is_empty() {
    return Err(ParseError::malformed(SCHEME, "empty password"));
  }
  let (server, port) = split_host_port(&host_port, SCHEME)?;

  let mut transport = Transport::default();
  if let Some(query) = query {
    for pair in query.split('&') {
      let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
      if k == "plugin" {
        apply_plugin(&percent_decode_to_string(v), &mut transport);
      }
    }
  }

  Ok(CanonicalProxy::new(
    name,
    server,
    port,
    Auth::Shadowsocks {
      cipher: cipher.to_lowercase(),
      password: password.to_string(),
    },
    transport,
  ))
}

/// Plain `method:password` (percent-encoded) or its Base64 form.
fn decode_userinfo(raw: &str) -> Result<String, ParseError> {
  let plain = percent_decode_to_string(raw);
  if plain.contains(':') {
    return Ok(plain);
  }
  decode_base64_to_utf8(&plain).ok_or_else(|| ParseError::malformed(SCHEME, "userinfo is not base64"))
}

/// SIP003 `name;key=value;flag`, translated to Clash names for obfs.
fn apply_plugin(raw: &str, t: &mut Transport) {
  let mut parts = raw.split(';').map(str::trim).filter(|s| !s.is_empty());
  let Some(plugin) = parts.next() else {
    return;
  };
  let mut opts = BTreeMap::new();
  for part in parts {
    let (k, v) = part.split_once('=').unwrap_or((part, "true"));
    opts.insert(k.to_string(), v.to_string());
  }

  if matches!(plugin, "obfs-local" | "simple-obfs") {
    let mut clash = BTreeMap::new();
    if let Some(mode) = opts.remove("obfs") {
      clash.insert("mode".to_string(), mode);
    }
    if let Some(host) = opts.remove("obfs-host") {
      clash.insert("host".to_string(), host);
    }
    clash.extend(opts);
    t.plugin = Some("obfs".to_string());
    t.plugin_opts = clash;
  } else {
    t.plugin = Some(plugin.to_string());
    t.plugin_opts = opts;
  }
}

fn plugin_to_sip003(t: &Transport) -> Option<String> {
  let plugin = t.plugin.as_deref()?;
  let mut parts = Vec::new();
  if plugin == "obfs" {
    parts.push("obfs-local".to_string());
    for (k, v) in &t.plugin_opts {
      let key = match k.as_str() {
        "mode" => "obfs",
        "host" => "obfs-host",
        other => other,
      };
      parts.push(format!("{key}={v}"));
    }
  } else {
    parts.push(plugin.to_string());
    for (k, v) in &t.plugin_opts {
      if v == "true" {
        parts.push(k.clone());
      } else {
        parts.push(format!("{k}={v}"));
      }
    }
  }
  Some(parts.join(";"))
}

pub(super) fn to_uri(proxy: &CanonicalProxy, cipher: &str, password: &str) -> String {
  let userinfo = general_purpose::URL_SAFE_NO_PAD.encode(format!("{cipher}:{password}"));
  let mut out = format!("ss://{userinfo}@{}", join_host_port(&proxy.server, proxy.port));
  if let Some(plugin) = plugin_to_sip003(&proxy.transport) {
    out.push_str("/?");
    out.push_str(&encode_query(&[("plugin", plugin)]));
  }
  out.push('#');
  out.push_str(&encode_component(&proxy.name));
  out
}
