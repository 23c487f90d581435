//! First-seen-wins merge of per-source batches.

use crate::model::{CanonicalProxy, Identity};
use std::collections::HashSet;
use tracing::debug;

/// Merged proxies in first-seen order, plus what the merge dropped or renamed.
#[derive(Debug, Clone, Default)]
pub struct MergedSet {
  pub proxies: Vec<CanonicalProxy>,
  pub duplicates: usize,
  /// `(original name, assigned name)` for every suffixed proxy.
  pub renamed: Vec<(String, String)>,
}

impl MergedSet {
  pub fn len(&self) -> usize {
    self.proxies.len()
  }

  pub fn is_empty(&self) -> bool {
    self.proxies.is_empty()
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.proxies.iter().map(|p| p.name.as_str())
  }
}

#[derive(Debug, Default)]
pub struct Merger {
  seen: HashSet<Identity>,
  used_names: HashSet<String>,
  out: MergedSet,
}

impl Merger {
  pub fn new() -> Self {
    Self::default()
  }

  /// Marks names proxies may not take (group names, built-in targets).
  pub fn reserve<I, S>(&mut self, names: I)
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.used_names.extend(names.into_iter().map(Into::into));
  }

  /// Adds one source's batch. Must be called in configuration order.
  pub fn push_batch(&mut self, batch: Vec<CanonicalProxy>) {
    for mut proxy in batch {
      if !self.seen.insert(proxy.identity()) {
        debug!(name = %proxy.name, "duplicate proxy dropped");
        self.out.duplicates += 1;
        continue;
      }
      let unique = self.unique_name(&proxy.name);
      if unique != proxy.name {
        debug!(from = %proxy.name, to = %unique, "proxy renamed");
        let original = std::mem::replace(&mut proxy.name, unique.clone());
        self.out.renamed.push((original, unique.clone()));
      }
      self.used_names.insert(unique);
      self.out.proxies.push(proxy);
    }
  }

  fn unique_name(&self, name: &str) -> String {
    if !self.used_names.contains(name) {
      return name.to_string();
    }
    (2..)
      .map(|n| format!("{name}-{n}"))
      .find(|candidate| !self.used_names.contains(candidate))
      .unwrap_or_else(|| name.to_string())
  }

  pub fn finish(self) -> MergedSet {
    self.out
  }
}

/// Merges batches in the order given.
pub fn merge<I>(batches: I) -> MergedSet
where
  I: IntoIterator<Item = Vec<CanonicalProxy>>,
{
  let mut merger = Merger::new();
  for batch in batches {
    merger.push_batch(batch);
  }
  merger.finish()
}
