//! Structured (`proxies:` list) entries to canonical records.
//!
//! Entries already use the Clash field vocabulary, so this is renaming and
//! scalar coercion only.

use crate::error::NormalizeError;
use crate::model::{non_empty, truthy, Auth, CanonicalProxy, Protocol, Transport};
use crate::uri::{is_supported, parse_uri};
use serde_yaml::{Mapping, Value as YamlValue};
use std::collections::BTreeMap;

fn y_get<'a>(m: &'a Mapping, key: &str) -> Option<&'a YamlValue> {
  m.iter().find(|(k, _)| k.as_str() == Some(key)).map(|(_, v)| v)
}

/// First present key among `keys`.
fn y_any<'a>(m: &'a Mapping, keys: &[&str]) -> Option<&'a YamlValue> {
  keys.iter().find_map(|k| y_get(m, k))
}

fn y_str(v: Option<&YamlValue>) -> Option<String> {
  match v? {
    YamlValue::String(s) => non_empty(s),
    YamlValue::Number(n) => Some(n.to_string()),
    YamlValue::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

fn y_bool(v: Option<&YamlValue>) -> Option<bool> {
  match v? {
    YamlValue::Bool(b) => Some(*b),
    YamlValue::Number(n) => n.as_i64().map(|n| n != 0),
    YamlValue::String(s) if !s.trim().is_empty() => Some(truthy(s)),
    _ => None,
  }
}

fn y_map<'a>(m: &'a Mapping, key: &str) -> Option<&'a Mapping> {
  y_get(m, key)?.as_mapping()
}

fn y_port(v: Option<&YamlValue>) -> Result<u16, NormalizeError> {
  let v = v.ok_or(NormalizeError::MissingField("port"))?;
  let raw = match v {
    YamlValue::Number(n) => n.to_string(),
    YamlValue::String(s) => s.trim().to_string(),
    other => format!("{other:?}"),
  };
  match raw.parse::<u16>() {
    Ok(0) | Err(_) => Err(NormalizeError::InvalidPort(raw)),
    Ok(port) => Ok(port),
  }
}

fn required(m: &Mapping, keys: &[&str], field: &'static str) -> Result<String, NormalizeError> {
  y_str(y_any(m, keys)).ok_or(NormalizeError::MissingField(field))
}

/// Normalizes one item of a `proxies` sequence. Besides mappings, a string
/// item may hold a proxy URI or an inline JSON object.
pub fn normalize_entry(entry: &YamlValue) -> Result<CanonicalProxy, NormalizeError> {
  match entry {
    YamlValue::Mapping(m) => normalize(m),
    YamlValue::String(s) => {
      let s = s.trim();
      if is_supported(s) {
        return Ok(parse_uri(s)?);
      }
      if s.starts_with('{') {
        let inner: YamlValue =
          serde_yaml::from_str(s).map_err(|e| NormalizeError::InlineEntry(e.to_string()))?;
        return match inner {
          YamlValue::Mapping(m) => normalize(&m),
          _ => Err(NormalizeError::NotAMapping),
        };
      }
      Err(NormalizeError::InlineEntry(s.chars().take(50).collect()))
    }
    _ => Err(NormalizeError::NotAMapping),
  }
}

pub fn normalize(m: &Mapping) -> Result<CanonicalProxy, NormalizeError> {
  let type_raw = y_str(y_get(m, "type")).ok_or(NormalizeError::MissingField("type"))?;
  let protocol = Protocol::from_type(&type_raw).ok_or(NormalizeError::UnsupportedType(type_raw))?;
  let server = y_str(y_get(m, "server")).ok_or(NormalizeError::MissingField("server"))?;
  let port = y_port(y_get(m, "port"))?;
  let name = y_str(y_get(m, "name"));

  let auth = match protocol {
    Protocol::Shadowsocks => Auth::Shadowsocks {
      cipher: required(m, &["cipher", "method"], "cipher")?.to_lowercase(),
      password: required(m, &["password"], "password")?,
    },
    Protocol::ShadowsocksR => Auth::ShadowsocksR {
      cipher: required(m, &["cipher", "method"], "cipher")?.to_lowercase(),
      password: required(m, &["password"], "password")?,
      protocol: required(m, &["protocol"], "protocol")?,
      obfs: required(m, &["obfs"], "obfs")?,
    },
    Protocol::Trojan => Auth::Trojan {
      password: required(m, &["password"], "password")?,
    },
    Protocol::Vless => Auth::Vless {
      uuid: required(m, &["uuid", "id"], "uuid")?,
      flow: y_str(y_get(m, "flow")),
    },
    Protocol::Vmess => Auth::Vmess {
      uuid: required(m, &["uuid", "id"], "uuid")?,
      alter_id: y_str(y_any(m, &["alterId", "alter-id", "aid"]))
        .and_then(|s| s.parse().ok())
        .unwrap_or(0),
      cipher: y_str(y_any(m, &["cipher", "security"]))
        .unwrap_or_else(|| "auto".to_string())
        .to_ascii_lowercase(),
    },
  };

  Ok(CanonicalProxy::new(name, server, port, auth, transport(m, protocol)))
}

fn transport(m: &Mapping, protocol: Protocol) -> Transport {
  let mut t = Transport {
    network: y_str(y_get(m, "network")).map(|s| s.to_ascii_lowercase()),
    // trojan is TLS unless explicitly disabled
    tls: y_bool(y_get(m, "tls")).unwrap_or(protocol == Protocol::Trojan),
    sni: y_str(y_any(m, &["servername", "sni", "peer"])),
    skip_cert_verify: y_bool(y_any(m, &["skip-cert-verify", "skipCertVerify", "allowInsecure"])),
    udp: y_bool(y_get(m, "udp")),
    fingerprint: y_str(y_any(m, &["client-fingerprint", "fingerprint", "fp"])),
    plugin: y_str(y_get(m, "plugin")),
    protocol_param: y_str(y_any(m, &["protocol-param", "protocolparam"])),
    obfs_param: y_str(y_any(m, &["obfs-param", "obfsparam"])),
    ..Transport::default()
  };

  t.alpn = match y_get(m, "alpn") {
    Some(YamlValue::Sequence(seq)) => seq.iter().filter_map(|v| y_str(Some(v))).collect(),
    other => y_str(other)
      .map(|s| s.split(',').filter_map(non_empty).collect())
      .unwrap_or_default(),
  };

  if let Some(opts) = y_map(m, "plugin-opts") {
    t.plugin_opts = opts
      .iter()
      .filter_map(|(k, v)| Some((k.as_str()?.to_string(), y_str(Some(v))?)))
      .collect::<BTreeMap<_, _>>();
  }

  if let Some(ws) = y_map(m, "ws-opts") {
    t.ws_path = y_str(y_get(ws, "path"));
    t.ws_host = y_map(ws, "headers").and_then(|h| y_str(y_any(h, &["Host", "host"])));
  } else {
    // legacy flat keys used by older converters
    t.ws_path = y_str(y_get(m, "ws-path"));
    t.ws_host = y_map(m, "ws-headers").and_then(|h| y_str(y_any(h, &["Host", "host"])));
  }
  if let Some(grpc) = y_map(m, "grpc-opts") {
    t.grpc_service_name = y_str(y_get(grpc, "grpc-service-name"));
  }
  if let Some(reality) = y_map(m, "reality-opts") {
    t.reality_public_key = y_str(y_get(reality, "public-key"));
    t.reality_short_id = y_str(y_get(reality, "short-id"));
    t.tls = true;
  }
  t
}
