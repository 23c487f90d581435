use std::path::Path;
use sub_merge::config::{load_subscriptions, load_templates};
use sub_merge::{emit, merge, parse_uri, Templates};

fn conf(name: &str) -> std::path::PathBuf {
  Path::new(env!("CARGO_MANIFEST_DIR")).join("conf").join(name)
}

#[test]
fn sample_subscription_list_loads() {
  let sources = load_subscriptions(&conf("subscriptions.conf.example")).unwrap();
  assert_eq!(sources.len(), 2);
  assert_eq!(sources[0].label, "provider-a.yaml");
  assert!(sources[1].url.starts_with("https://"));
}

#[test]
fn sample_templates_match_builtin_groups() {
  let t = load_templates(&conf("templates.yaml")).unwrap();
  let builtin = Templates::default();
  assert_eq!(t.groups, builtin.groups);

  let merged = merge(vec![vec![parse_uri("trojan://pw@h:443#A").unwrap()]]);
  let doc = emit(&merged, &t).unwrap();
  assert_eq!(doc.rules.last().map(String::as_str), Some("MATCH,手动选择"));
  assert_eq!(doc.rules.iter().filter(|r| r.starts_with("MATCH,")).count(), 1);
  assert_eq!(doc.rules[1], "IP-CIDR,192.168.0.0/16,DIRECT,no-resolve");
}
