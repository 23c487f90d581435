//! Error taxonomy for the ingestion pipeline.
//!
//! Per-item errors (`ParseError`, `NormalizeError`) and per-source errors
//! (`DecodeError`, `FetchError`) are caught at their boundary and counted.
//! Only `Error` reaches the command layer.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("payload is not UTF-8 text ({0} bytes)")]
  NotText(usize),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
  #[error("unsupported protocol: {0}")]
  UnsupportedProtocol(String),

  #[error("malformed {scheme} uri: {reason}")]
  Malformed { scheme: &'static str, reason: String },
}

impl ParseError {
  pub fn malformed<S: Into<String>>(scheme: &'static str, reason: S) -> Self {
    ParseError::Malformed {
      scheme,
      reason: reason.into(),
    }
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
  #[error("entry is not a mapping")]
  NotAMapping,

  #[error("missing required field `{0}`")]
  MissingField(&'static str),

  #[error("invalid port: {0}")]
  InvalidPort(String),

  #[error("unsupported proxy type: {0}")]
  UnsupportedType(String),

  #[error("invalid inline entry: {0}")]
  InlineEntry(String),

  #[error(transparent)]
  Uri(#[from] ParseError),
}

#[derive(Error, Debug)]
pub enum FetchError {
  #[error("invalid url: {0}")]
  InvalidUrl(String),

  #[error("http status {0}")]
  Status(u16),

  #[error("request failed: {0}")]
  Request(#[from] reqwest::Error),

  #[error("timed out after {0}s")]
  Timeout(u64),
}

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("cannot read {path}: {source}")]
  Read { path: String, source: io::Error },

  #[error("no usable subscription in {0}")]
  NoSources(String),

  #[error("invalid template file: {0}")]
  Template(#[from] serde_yaml::Error),

  #[error("template defines group `{0}` twice")]
  DuplicateGroup(String),
}

#[derive(Error, Debug)]
pub enum EmitError {
  #[error("group `{group}` references unknown member `{member}`")]
  DanglingReference { group: String, member: String },

  #[error("proxy `{0}` shares its name with a group or built-in target")]
  NameConflict(String),

  #[error("yaml serialization failed: {0}")]
  Yaml(#[from] serde_yaml::Error),

  #[error("json serialization failed: {0}")]
  Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum Error {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Emit(#[from] EmitError),

  #[error("io error: {0}")]
  Io(#[from] io::Error),

  #[error("no source produced a usable proxy ({0} sources tried)")]
  NoProxies(usize),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_error_display() {
    let e = ParseError::malformed("vmess", "missing field `id`");
    assert_eq!(e.to_string(), "malformed vmess uri: missing field `id`");
    assert_eq!(
      ParseError::UnsupportedProtocol("hy2".into()).to_string(),
      "unsupported protocol: hy2"
    );
  }

  #[test]
  fn test_normalize_error_wraps_uri_error() {
    let e: NormalizeError = ParseError::UnsupportedProtocol("tuic".into()).into();
    assert!(matches!(e, NormalizeError::Uri(ParseError::UnsupportedProtocol(_))));
  }
}
