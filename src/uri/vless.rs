use super::{format_authority_uri, parse_uri_common, transport_from_query, transport_to_query};
use crate::error::ParseError;
use crate::model::{non_empty, Auth, CanonicalProxy};

pub(super) fn parse(rest: &str) -> Result<CanonicalProxy, ParseError> {
  let c = parse_uri_common("vless", rest)?;
  let flow = c.params.get("flow").and_then(|f| non_empty(f));
  let transport = transport_from_query(&c.params, false);
  Ok(CanonicalProxy::new(
    c.name,
    c.host,
    c.port,
    Auth::Vless {
      uuid: c.credential,
      flow,
    },
    transport,
  ))
}

pub(super) fn to_uri(proxy: &CanonicalProxy, uuid: &str, flow: Option<&str>) -> String {
  let t = &proxy.transport;
  let security = if t.reality_public_key.is_some() {
    "reality"
  } else if t.tls {
    "tls"
  } else {
    "none"
  };
  let mut query = vec![
    ("encryption", "none".to_string()),
    ("security", security.to_string()),
  ];
  if let Some(flow) = flow {
    query.push(("flow", flow.to_string()));
  }
  transport_to_query(t, &mut query);
  format_authority_uri("vless", uuid, proxy, &query)
}

#[cfg(test)]
mod tests {
  use super::super::parse_uri;
  use super::*;

  #[test]
  fn test_reality_link() {
    let p = parse_uri(
      "vless://b831381d-6324-4d53-ad4f-8cda48b30811@example.com:443?encryption=none&security=reality&sni=www.microsoft.com&fp=chrome&pbk=KEY&sid=6ba85179&type=tcp&flow=xtls-rprx-vision#R",
    )
    .unwrap();
    assert_eq!(
      p.auth,
      Auth::Vless {
        uuid: "b831381d-6324-4d53-ad4f-8cda48b30811".into(),
        flow: Some("xtls-rprx-vision".into()),
      }
    );
    assert!(p.transport.tls);
    assert_eq!(p.transport.fingerprint.as_deref(), Some("chrome"));
    assert_eq!(p.transport.reality_public_key.as_deref(), Some("KEY"));
    assert_eq!(p.transport.reality_short_id.as_deref(), Some("6ba85179"));
    assert_eq!(p.transport.sni.as_deref(), Some("www.microsoft.com"));
  }

  #[test]
  fn test_empty_flow_is_absent() {
    let a = parse_uri("vless://id@h.example:443?flow=#a").unwrap();
    let b = parse_uri("vless://id@h.example:443#b").unwrap();
    assert_eq!(a.identity(), b.identity());
  }

  #[test]
  fn test_ws_transport_and_default_plaintext() {
    let p = parse_uri("vless://id@h.example:80?type=ws&path=%2Fray&host=cdn.example#w").unwrap();
    assert!(!p.transport.tls);
    assert_eq!(p.transport.ws_path.as_deref(), Some("/ray"));
    assert_eq!(p.transport.ws_host.as_deref(), Some("cdn.example"));
  }

  #[test]
  fn test_missing_uuid_fails() {
    assert!(parse_uri("vless://h.example:443#x").is_err());
  }
}
