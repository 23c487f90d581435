use super::{format_authority_uri, parse_uri_common, transport_from_query, transport_to_query};
use crate::error::ParseError;
use crate::model::{Auth, CanonicalProxy};

pub(super) fn parse(rest: &str) -> Result<CanonicalProxy, ParseError> {
  let c = parse_uri_common("trojan", rest)?;
  let transport = transport_from_query(&c.params, true);
  Ok(CanonicalProxy::new(
    c.name,
    c.host,
    c.port,
    Auth::Trojan { password: c.credential },
    transport,
  ))
}

pub(super) fn to_uri(proxy: &CanonicalProxy, password: &str) -> String {
  let mut query = Vec::new();
  if !proxy.transport.tls {
    query.push(("security", "none".to_string()));
  }
  transport_to_query(&proxy.transport, &mut query);
  format_authority_uri("trojan", password, proxy, &query)
}

#[cfg(test)]
mod tests {
  use super::super::{parse_uri, to_uri};
  use super::*;

  #[test]
  fn test_basic_link() {
    let p = parse_uri("trojan://secret@example.com:443?sni=cdn.example&allowInsecure=1#HK%2001").unwrap();
    assert_eq!(p.name, "HK 01");
    assert_eq!(p.server, "example.com");
    assert_eq!(p.port, 443);
    assert_eq!(
      p.auth,
      Auth::Trojan {
        password: "secret".into()
      }
    );
    assert!(p.transport.tls);
    assert_eq!(p.transport.sni.as_deref(), Some("cdn.example"));
    assert_eq!(p.transport.skip_cert_verify, Some(true));
  }

  #[test]
  fn test_grpc_transport() {
    let p = parse_uri("trojan://pw@h.example:8443?type=grpc&serviceName=svc#g").unwrap();
    assert_eq!(p.transport.network.as_deref(), Some("grpc"));
    assert_eq!(p.transport.grpc_service_name.as_deref(), Some("svc"));
  }

  #[test]
  fn test_security_none_survives_round_trip() {
    let p = parse_uri("trojan://pw@h.example:80?security=none#plain").unwrap();
    assert!(!p.transport.tls);
    let back = parse_uri(&to_uri(&p)).unwrap();
    assert!(!back.transport.tls);
    assert_eq!(back.identity(), p.identity());
  }

  #[test]
  fn test_missing_password_or_port_fails() {
    assert!(parse_uri("trojan://@h.example:443#x").is_err());
    assert!(parse_uri("trojan://pw@h.example#x").is_err());
  }
}
