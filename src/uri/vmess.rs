//! `vmess://` carrying a Base64 JSON object (the v2rayN share format).

use crate::decode::decode_base64_to_utf8;
use crate::error::ParseError;
use crate::model::{non_empty, truthy, Auth, CanonicalProxy, Transport};
use base64::engine::general_purpose;
use base64::Engine;
use serde_json::{json, Map, Value as JsonValue};

const SCHEME: &str = "vmess";

fn json_str(obj: &Map<String, JsonValue>, key: &str) -> Option<String> {
  match obj.get(key)? {
    JsonValue::String(s) => non_empty(s),
    JsonValue::Number(n) => Some(n.to_string()),
    JsonValue::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

fn json_u32(obj: &Map<String, JsonValue>, key: &str) -> Option<u32> {
  match obj.get(key)? {
    JsonValue::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
    JsonValue::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

pub(super) fn parse(rest: &str) -> Result<CanonicalProxy, ParseError> {
  let body = rest.trim();
  let text =
    decode_base64_to_utf8(body).ok_or_else(|| ParseError::malformed(SCHEME, "body is not base64"))?;
  let value: JsonValue =
    serde_json::from_str(text.trim()).map_err(|e| ParseError::malformed(SCHEME, format!("invalid json: {e}")))?;
  let JsonValue::Object(obj) = value else {
    return Err(ParseError::malformed(SCHEME, "json is not an object"));
  };

  let server = json_str(&obj, "add").ok_or_else(|| ParseError::malformed(SCHEME, "missing `add`"))?;
  let port = json_str(&obj, "port").ok_or_else(|| ParseError::malformed(SCHEME, "missing `port`"))?;
  let port = super::parse_port(&port, SCHEME)?;
  let uuid = json_str(&obj, "id").ok_or_else(|| ParseError::malformed(SCHEME, "missing `id`"))?;

  let alter_id = json_u32(&obj, "aid").unwrap_or(0);
  let cipher = json_str(&obj, "scy")
    .or_else(|| json_str(&obj, "cipher"))
    .unwrap_or_else(|| "auto".to_string());

  let network = json_str(&obj, "net").map(|s| s.to_ascii_lowercase());
  let mut t = Transport {
    network: network.clone(),
    tls: json_str(&obj, "tls").is_some_and(|s| s.eq_ignore_ascii_case("tls") || truthy(&s)),
    sni: json_str(&obj, "sni"),
    alpn: json_str(&obj, "alpn")
      .map(|s| s.split(',').filter_map(non_empty).collect())
      .unwrap_or_default(),
    skip_cert_verify: json_str(&obj, "allowInsecure")
      .or_else(|| json_str(&obj, "skip-cert-verify"))
      .map(|s| truthy(&s)),
    fingerprint: json_str(&obj, "fp"),
    ..Transport::default()
  };
  match network.as_deref() {
    Some("ws") | Some("httpupgrade") => {
      t.ws_path = json_str(&obj, "path");
      t.ws_host = json_str(&obj, "host");
    }
    Some("grpc") => t.grpc_service_name = json_str(&obj, "path"),
    _ => {}
  }

  Ok(CanonicalProxy::new(
    json_str(&obj, "ps"),
    server,
    port,
    Auth::Vmess {
      uuid,
      alter_id,
      cipher: cipher.to_ascii_lowercase(),
    },
    t,
  ))
}

pub(super) fn to_uri(proxy: &CanonicalProxy, uuid: &str, alter_id: u32, cipher: &str) -> String {
  let t = &proxy.transport;
  let path = t.ws_path.as_deref().or(t.grpc_service_name.as_deref()).unwrap_or("");
  let doc = json!({
    "v": "2",
    "ps": proxy.name,
    "add": proxy.server,
    "port": proxy.port,
    "id": uuid,
    "aid": alter_id,
    "scy": cipher,
    "net": t.network.as_deref().unwrap_or("tcp"),
    "type": "none",
    "host": t.ws_host.as_deref().unwrap_or(""),
    "path": path,
    "tls": if t.tls { "tls" } else { "" },
    "sni": t.sni.as_deref().unwrap_or(""),
    "alpn": t.alpn.join(","),
    "fp": t.fingerprint.as_deref().unwrap_or(""),
  });
  format!("vmess://{}", general_purpose::STANDARD.encode(doc.to_string()))
}

#[cfg(test)]
mod tests {
  use super::super::{parse_uri, to_uri};
  use super::*;

  fn link(json: &str) -> String {
    format!("vmess://{}", general_purpose::STANDARD.encode(json))
  }

  #[test]
  fn test_boolean_tls_flag() {
    let on = parse_uri(&link(r#"{"add":"h","port":443,"id":"u","tls":true}"#)).unwrap();
    assert!(on.transport.tls);
    let off = parse_uri(&link(r#"{"add":"h","port":443,"id":"u","tls":false}"#)).unwrap();
    assert!(!off.transport.tls);
    let empty = parse_uri(&link(r#"{"add":"h","port":443,"id":"u","tls":""}"#)).unwrap();
    assert!(!empty.transport.tls);
  }

  #[test]
  fn test_minimal_object_uses_defaults() {
    let p = parse_uri(&link(r#"{"add":"1.2.3.4","port":443,"id":"abc-123","ps":"node1"}"#)).unwrap();
    assert_eq!(p.name, "node1");
    assert_eq!(p.server, "1.2.3.4");
    assert_eq!(p.port, 443);
    assert_eq!(
      p.auth,
      Auth::Vmess {
        uuid: "abc-123".into(),
        alter_id: 0,
        cipher: "auto".into(),
      }
    );
  }

  #[test]
  fn test_string_port_and_ws_options() {
    let p = parse_uri(&link(
      r#"{"v":"2","ps":"w","add":"h.example","port":"8080","id":"u","aid":"2","net":"ws","host":"cdn.example","path":"/ray","tls":"tls","sni":"cdn.example"}"#,
    ))
    .unwrap();
    assert_eq!(p.port, 8080);
    assert!(matches!(p.auth, Auth::Vmess { alter_id: 2, .. }));
    assert!(p.transport.tls);
    assert_eq!(p.transport.ws_path.as_deref(), Some("/ray"));
    assert_eq!(p.transport.ws_host.as_deref(), Some("cdn.example"));
  }

  #[test]
  fn test_round_trip() {
    let p = parse_uri(&link(
      r#"{"add":"h.example","port":443,"id":"u","aid":0,"scy":"aes-128-gcm","net":"grpc","path":"svc","tls":"tls","ps":"G"}"#,
    ))
    .unwrap();
    let back = parse_uri(&to_uri(&p)).unwrap();
    assert_eq!(back.identity(), p.identity());
    assert_eq!(back.name, "G");
    assert_eq!(back.transport.grpc_service_name.as_deref(), Some("svc"));
  }

  #[test]
  fn test_malformed_payloads() {
    assert!(parse_uri("vmess://!!!").is_err());
    assert!(parse_uri(&link("not json at all")).is_err());
    assert!(parse_uri(&link("[1,2,3]")).is_err());
    assert!(parse_uri(&link(r#"{"add":"h","id":"u"}"#)).is_err());
    assert!(parse_uri(&link(r#"{"add":"h","port":0,"id":"u"}"#)).is_err());
  }
}
