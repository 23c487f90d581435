//! Classifies decoded subscription text as a structured document or a URI list.

use serde::Serialize;
use serde_yaml::Value as YamlValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Format {
  Structured,
  UriList,
}

/// Result of classification; a structured document carries its entries.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
  Structured(Vec<YamlValue>),
  UriList,
}

impl Classified {
  pub fn format(&self) -> Format {
    match self {
      Classified::Structured(_) => Format::Structured,
      Classified::UriList => Format::UriList,
    }
  }
}

/// Structured when `text` is a YAML mapping with a `proxies` sequence.
/// A YAML syntax error is not reported; the text is simply a URI list.
pub fn classify(text: &str) -> Classified {
  match structured_entries(text) {
    Some(entries) => Classified::Structured(entries),
    None => Classified::UriList,
  }
}

fn structured_entries(text: &str) -> Option<Vec<YamlValue>> {
  let doc: YamlValue = serde_yaml::from_str(text).ok()?;
  let map = doc.as_mapping()?;
  match map.get("proxies")? {
    YamlValue::Sequence(seq) => Some(seq.clone()),
    _ => None,
  }
}

/// Non-blank, non-comment lines of a URI list, trimmed.
pub fn uri_lines(text: &str) -> impl Iterator<Item = &str> {
  text
    .lines()
    .map(str::trim)
    .filter(|l| !l.is_empty() && !l.starts_with('#'))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_yaml_with_proxies_sequence_is_structured() {
    let text = "mixed-port: 7890\nproxies:\n  - {name: a, type: ss, server: h, port: 1}\n";
    let Classified::Structured(entries) = classify(text) else {
      panic!("expected a structured document");
    };
    assert_eq!(entries.len(), 1);
  }

  #[test]
  fn test_empty_proxies_sequence_is_still_structured() {
    assert_eq!(classify("proxies: []").format(), Format::Structured);
  }

  #[test]
  fn test_proxies_not_a_sequence_is_uri_list() {
    assert_eq!(classify("proxies: 3").format(), Format::UriList);
    assert_eq!(classify("proxies:").format(), Format::UriList);
  }

  #[test]
  fn test_uri_list_and_broken_yaml_are_uri_list() {
    assert_eq!(classify("ss://abc@host:1#x\ntrojan://p@h:2").format(), Format::UriList);
    assert_eq!(classify("proxies: [unclosed").format(), Format::UriList);
    assert_eq!(classify("").format(), Format::UriList);
  }

  #[test]
  fn test_uri_lines_skip_blank_and_comments() {
    let text = "# header\n\n  ss://a@b:1  \r\n#trojan://x@y:2\nvmess://zz\n";
    let lines: Vec<_> = uri_lines(text).collect();
    assert_eq!(lines, vec!["ss://a@b:1", "vmess://zz"]);
  }
}
