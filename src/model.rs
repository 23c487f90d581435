//! Canonical proxy record shared by the URI and structured ingestion paths.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
  Shadowsocks,
  ShadowsocksR,
  Trojan,
  Vless,
  Vmess,
}

impl Protocol {
  /// URI scheme, which is also the `type` value in the Clash vocabulary.
  pub fn scheme(self) -> &'static str {
    match self {
      Protocol::Shadowsocks => "ss",
      Protocol::ShadowsocksR => "ssr",
      Protocol::Trojan => "trojan",
      Protocol::Vless => "vless",
      Protocol::Vmess => "vmess",
    }
  }

  /// Accepts the `type` spellings found in structured subscriptions.
  pub fn from_type(raw: &str) -> Option<Protocol> {
    match raw.trim().to_ascii_lowercase().as_str() {
      "ss" | "shadowsocks" => Some(Protocol::Shadowsocks),
      "ssr" | "shadowsocksr" => Some(Protocol::ShadowsocksR),
      "trojan" => Some(Protocol::Trojan),
      "vless" => Some(Protocol::Vless),
      "vmess" => Some(Protocol::Vmess),
      _ => None,
    }
  }
}

impl fmt::Display for Protocol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.scheme())
  }
}

/// Protocol credentials. The variant determines the protocol, so a record can
/// never carry a credential bundle of the wrong shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Auth {
  Shadowsocks {
    cipher: String,
    password: String,
  },
  ShadowsocksR {
    cipher: String,
    password: String,
    protocol: String,
    obfs: String,
  },
  Trojan {
    password: String,
  },
  Vless {
    uuid: String,
    flow: Option<String>,
  },
  Vmess {
    uuid: String,
    alter_id: u32,
    cipher: String,
  },
}

impl Auth {
  pub fn protocol(&self) -> Protocol {
    match self {
      Auth::Shadowsocks { .. } => Protocol::Shadowsocks,
      Auth::ShadowsocksR { .. } => Protocol::ShadowsocksR,
      Auth::Trojan { .. } => Protocol::Trojan,
      Auth::Vless { .. } => Protocol::Vless,
      Auth::Vmess { .. } => Protocol::Vmess,
    }
  }
}

/// Transport and TLS options. Not part of a record's identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transport {
  pub network: Option<String>,
  pub tls: bool,
  pub sni: Option<String>,
  pub alpn: Vec<String>,
  pub skip_cert_verify: Option<bool>,
  pub udp: Option<bool>,
  pub fingerprint: Option<String>,
  pub ws_path: Option<String>,
  pub ws_host: Option<String>,
  pub grpc_service_name: Option<String>,
  pub reality_public_key: Option<String>,
  pub reality_short_id: Option<String>,
  pub plugin: Option<String>,
  pub plugin_opts: BTreeMap<String, String>,
  pub protocol_param: Option<String>,
  pub obfs_param: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalProxy {
  pub name: String,
  pub server: String,
  pub port: u16,
  pub auth: Auth,
  pub transport: Transport,
}

/// Duplicate-detection key: `(protocol, server, port, auth)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
  pub protocol: Protocol,
  pub server: String,
  pub port: u16,
  pub auth: Auth,
}

impl CanonicalProxy {
  /// Builds a record, synthesizing `<protocol>-<server>:<port>` when `name` is blank.
  pub fn new(name: Option<String>, server: String, port: u16, auth: Auth, transport: Transport) -> Self {
    let name = match name.as_deref().map(str::trim) {
      Some(n) if !n.is_empty() => n.to_string(),
      _ => fallback_name(auth.protocol(), &server, port),
    };
    CanonicalProxy {
      name,
      server,
      port,
      auth,
      transport,
    }
  }

  pub fn protocol(&self) -> Protocol {
    self.auth.protocol()
  }

  pub fn identity(&self) -> Identity {
    Identity {
      protocol: self.protocol(),
      server: self.server.to_ascii_lowercase(),
      port: self.port,
      auth: self.auth.clone(),
    }
  }
}

pub fn fallback_name(protocol: Protocol, server: &str, port: u16) -> String {
  format!("{}-{}:{}", protocol.scheme(), server, port)
}

pub(crate) fn non_empty(s: &str) -> Option<String> {
  let t = s.trim();
  if t.is_empty() {
    None
  } else {
    Some(t.to_string())
  }
}

pub(crate) fn truthy(v: &str) -> bool {
  let s = v.trim().to_lowercase();
  matches!(s.as_str(), "1" | "true" | "yes" | "y" | "on")
}

#[derive(Serialize)]
#[serde(untagged)]
enum OptValue<'a> {
  Bool(bool),
  Text(&'a str),
}

#[derive(Serialize)]
struct WsHeaders<'a> {
  #[serde(rename = "Host")]
  host: &'a str,
}

#[derive(Serialize)]
struct WsOpts<'a> {
  #[serde(skip_serializing_if = "Option::is_none")]
  path: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  headers: Option<WsHeaders<'a>>,
}

#[derive(Serialize)]
struct GrpcOpts<'a> {
  #[serde(rename = "grpc-service-name")]
  service_name: &'a str,
}

#[derive(Serialize)]
struct RealityOpts<'a> {
  #[serde(rename = "public-key")]
  public_key: &'a str,
  #[serde(rename = "short-id", skip_serializing_if = "Option::is_none")]
  short_id: Option<&'a str>,
}

/// Clash field vocabulary, the shape written to mirror files.
#[derive(Serialize)]
struct ClashProxy<'a> {
  name: &'a str,
  #[serde(rename = "type")]
  type_: &'static str,
  server: &'a str,
  port: u16,
  #[serde(skip_serializing_if = "Option::is_none")]
  cipher: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  password: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  uuid: Option<&'a str>,
  #[serde(rename = "alterId", skip_serializing_if = "Option::is_none")]
  alter_id: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  flow: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  protocol: Option<&'a str>,
  #[serde(rename = "protocol-param", skip_serializing_if = "Option::is_none")]
  protocol_param: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  obfs: Option<&'a str>,
  #[serde(rename = "obfs-param", skip_serializing_if = "Option::is_none")]
  obfs_param: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  plugin: Option<&'a str>,
  #[serde(rename = "plugin-opts", skip_serializing_if = "BTreeMap::is_empty")]
  plugin_opts: BTreeMap<&'a str, OptValue<'a>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  network: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  tls: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  servername: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  sni: Option<&'a str>,
  #[serde(skip_serializing_if = "<[String]>::is_empty")]
  alpn: &'a [String],
  #[serde(rename = "skip-cert-verify", skip_serializing_if = "Option::is_none")]
  skip_cert_verify: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  udp: Option<bool>,
  #[serde(rename = "client-fingerprint", skip_serializing_if = "Option::is_none")]
  client_fingerprint: Option<&'a str>,
  #[serde(rename = "ws-opts", skip_serializing_if = "Option::is_none")]
  ws_opts: Option<WsOpts<'a>>,
  #[serde(rename = "grpc-opts", skip_serializing_if = "Option::is_none")]
  grpc_opts: Option<GrpcOpts<'a>>,
  #[serde(rename = "reality-opts", skip_serializing_if = "Option::is_none")]
  reality_opts: Option<RealityOpts<'a>>,
}

impl Serialize for CanonicalProxy {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let t = &self.transport;
    let mut out = ClashProxy {
      name: &self.name,
      type_: self.protocol().scheme(),
      server: &self.server,
      port: self.port,
      cipher: None,
      password: None,
      uuid: None,
      alter_id: None,
      flow: None,
      protocol: None,
      protocol_param: t.protocol_param.as_deref(),
      obfs: None,
      obfs_param: t.obfs_param.as_deref(),
      plugin: t.plugin.as_deref(),
      plugin_opts: t
        .plugin_opts
        .iter()
        .map(|(k, v)| {
          let value = match v.as_str() {
            "true" => OptValue::Bool(true),
            "false" => OptValue::Bool(false),
            other => OptValue::Text(other),
          };
          (k.as_str(), value)
        })
        .collect(),
      network: t.network.as_deref(),
      tls: None,
      servername: None,
      sni: None,
      alpn: &t.alpn,
      skip_cert_verify: t.skip_cert_verify,
      udp: t.udp,
      client_fingerprint: t.fingerprint.as_deref(),
      ws_opts: None,
      grpc_opts: t
        .grpc_service_name
        .as_deref()
        .map(|service_name| GrpcOpts { service_name }),
      reality_opts: t.reality_public_key.as_deref().map(|public_key| RealityOpts {
        public_key,
        short_id: t.reality_short_id.as_deref(),
      }),
    };

    if t.ws_path.is_some() || t.ws_host.is_some() {
      out.ws_opts = Some(WsOpts {
        path: t.ws_path.as_deref(),
        headers: t.ws_host.as_deref().map(|host| WsHeaders { host }),
      });
    }

    match &self.auth {
      Auth::Shadowsocks { cipher, password } => {
        out.cipher = Some(cipher.as_str());
        out.password = Some(password.as_str());
      }
      Auth::ShadowsocksR {
        cipher,
        password,
        protocol,
        obfs,
      } => {
        out.cipher = Some(cipher.as_str());
        out.password = Some(password.as_str());
        out.protocol = Some(protocol.as_str());
        out.obfs = Some(obfs.as_str());
      }
      Auth::Trojan { password } => {
        out.password = Some(password.as_str());
        out.sni = t.sni.as_deref();
      }
      Auth::Vless { uuid, flow } => {
        out.uuid = Some(uuid.as_str());
        out.flow = flow.as_deref();
        out.tls = t.tls.then_some(true);
        out.servername = t.sni.as_deref();
      }
      Auth::Vmess {
        uuid,
        alter_id,
        cipher,
      } => {
        out.uuid = Some(uuid.as_str());
        out.alter_id = Some(*alter_id);
        out.cipher = Some(cipher.as_str());
        out.tls = t.tls.then_some(true);
        out.servername = t.sni.as_deref();
      }
    }

    out.serialize(serializer)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ss(name: &str, server: &str) -> CanonicalProxy {
    CanonicalProxy::new(
      Some(name.to_string()),
      server.to_string(),
      8388,
      Auth::Shadowsocks {
        cipher: "aes-256-gcm".into(),
        password: "pass".into(),
      },
      Transport::default(),
    )
  }

  #[test]
  fn test_blank_name_is_synthesized() {
    let p = CanonicalProxy::new(
      Some("  ".into()),
      "1.2.3.4".into(),
      443,
      Auth::Trojan {
        password: "pw".into(),
      },
      Transport::default(),
    );
    assert_eq!(p.name, "trojan-1.2.3.4:443");
  }

  #[test]
  fn test_identity_ignores_name_and_host_case() {
    let a = ss("A", "Host1.example");
    let b = ss("B", "host1.example");
    assert_eq!(a.identity(), b.identity());
  }

  #[test]
  fn test_identity_differs_on_auth() {
    let a = ss("A", "host1");
    let mut b = ss("A", "host1");
    b.auth = Auth::Shadowsocks {
      cipher: "aes-256-gcm".into(),
      password: "other".into(),
    };
    assert_ne!(a.identity(), b.identity());
  }

  #[test]
  fn test_protocol_from_type_aliases() {
    assert_eq!(Protocol::from_type("Shadowsocks"), Some(Protocol::Shadowsocks));
    assert_eq!(Protocol::from_type("ssr"), Some(Protocol::ShadowsocksR));
    assert_eq!(Protocol::from_type("hysteria2"), None);
  }

  #[test]
  fn test_serialize_uses_clash_vocabulary() {
    let mut t = Transport::default();
    t.network = Some("ws".into());
    t.tls = true;
    t.sni = Some("cdn.example".into());
    t.ws_path = Some("/ray".into());
    t.ws_host = Some("cdn.example".into());
    let p = CanonicalProxy::new(
      Some("node1".into()),
      "1.2.3.4".into(),
      443,
      Auth::Vmess {
        uuid: "abc-123".into(),
        alter_id: 0,
        cipher: "auto".into(),
      },
      t,
    );
    let v = serde_json::to_value(&p).unwrap();
    assert_eq!(v["type"], "vmess");
    assert_eq!(v["uuid"], "abc-123");
    assert_eq!(v["alterId"], 0);
    assert_eq!(v["tls"], true);
    assert_eq!(v["servername"], "cdn.example");
    assert_eq!(v["ws-opts"]["path"], "/ray");
    assert_eq!(v["ws-opts"]["headers"]["Host"], "cdn.example");
    assert!(v.get("sni").is_none());
  }

  #[test]
  fn test_serialize_plugin_opts_bool_values() {
    let mut p = ss("A", "host1");
    p.transport.plugin = Some("v2ray-plugin".into());
    p.transport.plugin_opts.insert("mode".into(), "websocket".into());
    p.transport.plugin_opts.insert("tls".into(), "true".into());
    let v = serde_json::to_value(&p).unwrap();
    assert_eq!(v["plugin-opts"]["tls"], true);
    assert_eq!(v["plugin-opts"]["mode"], "websocket");
  }
}
