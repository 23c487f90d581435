//! Overwrite document: `proxy-groups` and `rules`, never `proxies`.

use crate::error::EmitError;
use crate::merge::MergedSet;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// Targets every client understands without a definition.
pub const BUILTIN_TARGETS: [&str; 2] = ["DIRECT", "REJECT"];

const PROBE_URL: &str = "http://www.gstatic.com/generate_204";
const MANUAL: &str = "手动选择";
const AUTO: &str = "自动选择";
const FAILOVER: &str = "故障转移";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupKind {
  Select,
  UrlTest,
  Fallback,
  LoadBalance,
}

fn default_true() -> bool {
  true
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupTemplate {
  pub name: String,
  #[serde(rename = "type")]
  pub kind: GroupKind,
  /// Fixed members listed before the proxies; other group names or built-ins.
  #[serde(default)]
  pub members: Vec<String>,
  #[serde(rename = "include-proxies", default = "default_true")]
  pub include_proxies: bool,
  #[serde(default)]
  pub url: Option<String>,
  #[serde(default)]
  pub interval: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RuleTemplate {
  Line(String),
  Parts {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    value: Option<String>,
    target: String,
    #[serde(default)]
    options: Vec<String>,
  },
}

impl RuleTemplate {
  pub fn render(&self) -> String {
    match self {
      RuleTemplate::Line(line) => line.trim().to_string(),
      RuleTemplate::Parts {
        kind,
        value,
        target,
        options,
      } => {
        let mut fields = vec![kind.as_str()];
        fields.extend(value.as_deref());
        fields.push(target.as_str());
        fields.extend(options.iter().map(String::as_str));
        fields.join(",")
      }
    }
  }
}

/// Group and rule definitions the proxy names are substituted into.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Templates {
  #[serde(rename = "proxy-groups", default)]
  pub groups: Vec<GroupTemplate>,
  #[serde(default)]
  pub rules: Vec<RuleTemplate>,
}

impl Default for Templates {
  fn default() -> Self {
    let probe = |name: &str, kind, interval| GroupTemplate {
      name: name.to_string(),
      kind,
      members: Vec::new(),
      include_proxies: true,
      url: Some(PROBE_URL.to_string()),
      interval: Some(interval),
    };
    let groups = vec![
      GroupTemplate {
        name: MANUAL.to_string(),
        kind: GroupKind::Select,
        members: vec![AUTO.to_string(), FAILOVER.to_string()],
        include_proxies: true,
        url: None,
        interval: None,
      },
      probe(AUTO, GroupKind::UrlTest, 86400),
      probe(FAILOVER, GroupKind::Fallback, 7200),
    ];
    let rules = [
      "DOMAIN-SUFFIX,local,DIRECT",
      "IP-CIDR,127.0.0.0/8,DIRECT,no-resolve",
      "IP-CIDR,10.0.0.0/8,DIRECT,no-resolve",
      "IP-CIDR,172.16.0.0/12,DIRECT,no-resolve",
      "IP-CIDR,192.168.0.0/16,DIRECT,no-resolve",
      "DOMAIN-SUFFIX,cn,DIRECT",
      "DOMAIN-KEYWORD,baidu,DIRECT",
      "DOMAIN-KEYWORD,taobao,DIRECT",
      "DOMAIN-SUFFIX,163.com,DIRECT",
      "GEOIP,CN,DIRECT",
    ]
    .into_iter()
    .map(|r| RuleTemplate::Line(r.to_string()))
    .collect();
    Templates { groups, rules }
  }
}

impl Templates {
  pub fn group_names(&self) -> impl Iterator<Item = &str> {
    self.groups.iter().map(|g| g.name.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyGroup {
  pub name: String,
  #[serde(rename = "type")]
  pub kind: GroupKind,
  pub proxies: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub interval: Option<u32>,
}

/// The only two sections an overwrite file carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverwriteDocument {
  #[serde(rename = "proxy-groups")]
  pub proxy_groups: Vec<ProxyGroup>,
  pub rules: Vec<String>,
}

/// Substitutes the merged proxy names into the group templates.
///
/// Fails when a fixed group member is neither a merged proxy, a defined group
/// nor a built-in target. Unknown rule targets are logged and kept.
pub fn emit(merged: &MergedSet, templates: &Templates) -> Result<OverwriteDocument, EmitError> {
  let proxy_names: Vec<String> = merged.names().map(str::to_string).collect();
  let reserved: HashSet<&str> = templates.group_names().chain(BUILTIN_TARGETS).collect();
  if let Some(name) = proxy_names.iter().find(|n| reserved.contains(n.as_str())) {
    return Err(EmitError::NameConflict(name.clone()));
  }
  let known: HashSet<&str> = proxy_names
    .iter()
    .map(String::as_str)
    .chain(templates.group_names())
    .chain(BUILTIN_TARGETS)
    .collect();

  let mut proxy_groups = Vec::with_capacity(templates.groups.len());
  for g in &templates.groups {
    if let Some(member) = g.members.iter().find(|m| !known.contains(m.as_str())) {
      return Err(EmitError::DanglingReference {
        group: g.name.clone(),
        member: member.clone(),
      });
    }
    let mut proxies = g.members.clone();
    if g.include_proxies {
      proxies.extend(proxy_names.iter().cloned());
    }
    proxy_groups.push(ProxyGroup {
      name: g.name.clone(),
      kind: g.kind,
      proxies,
      url: g.url.clone(),
      interval: g.interval,
    });
  }

  let mut rules: Vec<String> = templates
    .rules
    .iter()
    .map(RuleTemplate::render)
    .filter(|r| !r.is_empty())
    .collect();
  if !rules.iter().any(|r| r.starts_with("MATCH,")) {
    if let Some(first) = templates.groups.first() {
      rules.push(format!("MATCH,{}", first.name));
    }
  }
  for rule in &rules {
    match rule_target(rule) {
      Some(target) if known.contains(target) => {}
      unresolved => warn!(rule = %rule, ?unresolved, "rule target is not a known group or proxy"),
    }
  }

  Ok(OverwriteDocument { proxy_groups, rules })
}

/// Last field of a rule, skipping a trailing `no-resolve`.
fn rule_target(rule: &str) -> Option<&str> {
  let fields: Vec<&str> = rule.split(',').map(str::trim).collect();
  let fields = match fields.split_last() {
    Some((&"no-resolve", rest)) => rest,
    _ => &fields[..],
  };
  match fields {
    [_, .., target] => Some(*target),
    _ => None,
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Style {
  /// One flow-style JSON object per group and one quoted scalar per rule.
  #[default]
  Compact,
  /// Block-style YAML.
  Pretty,
}

/// Single-line JSON, a valid YAML flow mapping.
pub fn compact<T: Serialize>(value: &T) -> Result<String, EmitError> {
  Ok(serde_json::to_string(value)?)
}

fn single_quoted(s: &str) -> String {
  format!("'{}'", s.replace('\'', "''"))
}

pub fn render(doc: &OverwriteDocument, style: Style) -> Result<String, EmitError> {
  match style {
    Style::Pretty => Ok(serde_yaml::to_string(doc)?),
    Style::Compact => {
      let mut out = String::from("proxy-groups:\n");
      for g in &doc.proxy_groups {
        out.push_str("  - ");
        out.push_str(&compact(g)?);
        out.push('\n');
      }
      out.push_str("rules:\n");
      for r in &doc.rules {
        out.push_str("  - ");
        out.push_str(&single_quoted(r));
        out.push('\n');
      }
      Ok(out)
    }
  }
}
