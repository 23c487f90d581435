//! Persists source mirrors and the overwrite document.

use crate::decode::Encoding;
use crate::emit::compact;
use crate::error::{EmitError, Result};
use crate::model::CanonicalProxy;
use crate::pipeline::SourceOutcome;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Writes through a `.tmp` sibling and renames it into place.
pub async fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    fs::create_dir_all(parent).await?;
  }
  let mut tmp = path.as_os_str().to_owned();
  tmp.push(".tmp");
  let tmp = PathBuf::from(tmp);
  fs::write(&tmp, contents).await?;
  if let Err(e) = fs::rename(&tmp, path).await {
    let _ = fs::remove_file(&tmp).await;
    return Err(e);
  }
  debug!(path = %path.display(), bytes = contents.len(), "written");
  Ok(())
}

/// `proxies:` followed by one compact JSON object per record.
pub fn mirror_text(proxies: &[CanonicalProxy]) -> std::result::Result<String, EmitError> {
  if proxies.is_empty() {
    return Ok("proxies: []\n".to_string());
  }
  let mut out = String::from("proxies:\n");
  for p in proxies {
    out.push_str("  - ");
    out.push_str(&compact(p)?);
    out.push('\n');
  }
  Ok(out)
}

/// `a.yaml` -> `a.decoded.yaml`; `a` -> `a.decoded`.
pub fn decoded_name(label: &str) -> String {
  match label.rsplit_once('.') {
    Some((stem, ext)) if !stem.is_empty() => format!("{stem}.decoded.{ext}"),
    _ => format!("{label}.decoded"),
  }
}

/// Writes the mirror of one ingested source, plus the unwrapped text when
/// the payload was Base64. Sources without a payload are skipped.
pub async fn write_mirror(dir: &Path, outcome: &SourceOutcome) -> Result<Vec<PathBuf>> {
  let Some(payload) = &outcome.payload else {
    return Ok(Vec::new());
  };
  let mut written = Vec::new();

  let path = dir.join(&outcome.source.label);
  write_atomic(&path, &mirror_text(&payload.proxies)?).await?;
  written.push(path);

  if payload.encoding == Encoding::Base64 {
    let path = dir.join(decoded_name(&outcome.source.label));
    write_atomic(&path, &payload.text).await?;
    written.push(path);
  }
  info!(label = %outcome.source.label, files = written.len(), "mirror saved");
  Ok(written)
}

pub async fn write_output(dir: &Path, name: &str, text: &str) -> Result<PathBuf> {
  let path = dir.join(name);
  write_atomic(&path, text).await?;
  info!(path = %path.display(), "overwrite config saved");
  Ok(path)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::SubscriptionSource;
  use crate::pipeline::{parse_payload, SourceReport, SourceStatus};
  use base64::engine::general_purpose;
  use base64::Engine;

  fn temp_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("sub-merge-writer-{tag}-{}", std::process::id()))
  }

  fn outcome(label: &str, raw: &[u8]) -> SourceOutcome {
    let source = SubscriptionSource {
      label: label.to_string(),
      url: "https://example.com/s".to_string(),
    };
    SourceOutcome {
      report: SourceReport {
        label: source.label.clone(),
        url: source.url.clone(),
        status: SourceStatus::Ok,
        format: None,
        encoding: None,
        bytes: raw.len(),
        parsed: 0,
        skipped: 0,
        warnings: Vec::new(),
      },
      payload: Some(parse_payload(raw).unwrap()),
      source,
    }
  }

  #[test]
  fn test_decoded_name() {
    assert_eq!(decoded_name("a.yaml"), "a.decoded.yaml");
    assert_eq!(decoded_name("sub.v2.yml"), "sub.v2.decoded.yml");
    assert_eq!(decoded_name("plain"), "plain.decoded");
    assert_eq!(decoded_name(".hidden"), ".hidden.decoded");
  }

  #[test]
  fn test_mirror_text_is_valid_yaml() {
    let p = parse_payload(b"trojan://pw@h:443#A\nss://YWVzLTI1Ni1nY206cGFzcw@host1:8388#B").unwrap();
    let text = mirror_text(&p.proxies).unwrap();
    assert_eq!(text.lines().count(), 3);
    let v: serde_yaml::Value = serde_yaml::from_str(&text).unwrap();
    let seq = v["proxies"].as_sequence().unwrap();
    assert_eq!(seq[0]["type"].as_str(), Some("trojan"));
    assert_eq!(seq[1]["cipher"].as_str(), Some("aes-256-gcm"));
  }

  #[tokio::test]
  async fn test_write_mirror_with_decoded_copy() {
    let dir = temp_dir("mirror");
    let raw = general_purpose::STANDARD.encode("trojan://pw@h:443#A\ntrojan://pw@h2:443#B");
    let written = write_mirror(&dir, &outcome("a.yaml", raw.as_bytes())).await.unwrap();
    assert_eq!(written, vec![dir.join("a.yaml"), dir.join("a.decoded.yaml")]);
    let decoded = std::fs::read_to_string(dir.join("a.decoded.yaml")).unwrap();
    assert!(decoded.starts_with("trojan://"));
    assert!(!dir.join("a.yaml.tmp").exists());
    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[tokio::test]
  async fn test_write_output_replaces_existing_file() {
    let dir = temp_dir("output");
    write_output(&dir, "overwrite.yaml", "old").await.unwrap();
    let path = write_output(&dir, "overwrite.yaml", "new").await.unwrap();
    assert_eq!(std::fs::read_to_string(path).unwrap(), "new");
    std::fs::remove_dir_all(&dir).unwrap();
  }
}
