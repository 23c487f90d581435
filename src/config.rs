//! Subscription list and template loading.

use crate::emit::Templates;
use crate::error::ConfigError;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSource {
  /// File name of the mirror written under the download directory.
  pub label: String,
  pub url: String,
}

fn read(path: &Path) -> Result<String, ConfigError> {
  std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
    path: path.display().to_string(),
    source,
  })
}

pub fn load_subscriptions(path: &Path) -> Result<Vec<SubscriptionSource>, ConfigError> {
  let text = read(path)?;
  let sources = parse_subscriptions(&text);
  if sources.is_empty() {
    return Err(ConfigError::NoSources(path.display().to_string()));
  }
  info!(count = sources.len(), path = %path.display(), "loaded subscriptions");
  Ok(sources)
}

/// Parses `label | url` lines. Bad lines are skipped with a warning.
pub fn parse_subscriptions(text: &str) -> Vec<SubscriptionSource> {
  let mut seen = HashSet::new();
  let mut out = Vec::new();
  for (idx, line) in text.lines().enumerate() {
    let line_no = idx + 1;
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
      continue;
    }
    let Some((label, url)) = line.split_once('|') else {
      warn!(line = line_no, "expected `label | url`, skipped");
      continue;
    };
    let (label, url) = (label.trim(), url.trim());
    if label.is_empty() || url.is_empty() {
      warn!(line = line_no, "empty label or url, skipped");
      continue;
    }
    if label.contains(['/', '\\']) || label == "." || label == ".." {
      warn!(line = line_no, label, "label must be a plain file name, skipped");
      continue;
    }
    if !seen.insert(label.to_string()) {
      warn!(line = line_no, label, "duplicate label, skipped");
      continue;
    }
    if !(label.ends_with(".yaml") || label.ends_with(".yml")) {
      warn!(line = line_no, label, "label has no .yaml/.yml extension");
    }
    debug!(label, url, "subscription");
    out.push(SubscriptionSource {
      label: label.to_string(),
      url: url.to_string(),
    });
  }
  out
}

pub fn load_templates(path: &Path) -> Result<Templates, ConfigError> {
  parse_templates(&read(path)?)
}

pub fn parse_templates(text: &str) -> Result<Templates, ConfigError> {
  let templates: Templates = serde_yaml::from_str(text)?;
  let mut names = HashSet::new();
  for g in &templates.groups {
    if !names.insert(g.name.as_str()) {
      return Err(ConfigError::DuplicateGroup(g.name.clone()));
    }
  }
  Ok(templates)
}
