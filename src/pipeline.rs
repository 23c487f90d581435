//! Per-source ingestion and the whole-run driver.
//!
//! Sources are fetched concurrently but merged strictly in configuration
//! order, so the first-seen record of a duplicate is always the same one.

use crate::config::SubscriptionSource;
use crate::decode::{decode, Encoding};
use crate::detect::{classify, uri_lines, Classified, Format};
use crate::emit::{compact, emit, OverwriteDocument, Templates, BUILTIN_TARGETS};
use crate::error::{DecodeError, Error, FetchError, Result};
use crate::fetch::Fetch;
use crate::merge::{MergedSet, Merger};
use crate::model::CanonicalProxy;
use crate::normalize::normalize_entry;
use crate::uri::parse_uri;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

const SNIPPET_CHARS: usize = 50;

fn snippet(s: &str) -> String {
  let mut out: String = s.chars().take(SNIPPET_CHARS).collect();
  if s.chars().nth(SNIPPET_CHARS).is_some() {
    out.push('…');
  }
  out
}

/// Records parsed from one decoded payload.
#[derive(Debug, Clone)]
pub struct ParsedPayload {
  pub format: Format,
  pub encoding: Encoding,
  /// Decoded text; kept so a Base64 payload can be mirrored unwrapped.
  pub text: String,
  pub proxies: Vec<CanonicalProxy>,
  pub skipped: usize,
  pub warnings: Vec<String>,
}

/// Decode, classify, then parse every item. Item failures are counted.
pub fn parse_payload(raw: &[u8]) -> std::result::Result<ParsedPayload, DecodeError> {
  let decoded = decode(raw)?;
  let mut out = parse_text(&decoded.text);
  out.encoding = decoded.encoding;
  out.text = decoded.text;
  Ok(out)
}

pub fn parse_text(text: &str) -> ParsedPayload {
  let mut out = ParsedPayload {
    format: Format::UriList,
    encoding: Encoding::Plain,
    text: String::new(),
    proxies: Vec::new(),
    skipped: 0,
    warnings: Vec::new(),
  };

  let classified = classify(text);
  out.format = classified.format();
  if let Classified::Structured(entries) = classified {
    for (idx, entry) in entries.iter().enumerate() {
      match normalize_entry(entry) {
        Ok(p) => out.proxies.push(p),
        Err(e) => {
          let item = snippet(&compact(entry).unwrap_or_else(|_| format!("{entry:?}")));
          debug!(entry = idx + 1, item = %item, error = %e, "structured entry skipped");
          out.skipped += 1;
          out.warnings.push(format!("entry {}: {e}: {item}", idx + 1));
        }
      }
    }
  } else {
    for line in uri_lines(text) {
      match parse_uri(line) {
        Ok(p) => out.proxies.push(p),
        Err(e) => {
          debug!(line = %snippet(line), error = %e, "uri skipped");
          out.skipped += 1;
          out.warnings.push(format!("{e}: {}", snippet(line)));
        }
      }
    }
  }

  if out.proxies.is_empty() {
    out.warnings.push("no usable proxy in payload".to_string());
  }
  out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
  Ok,
  FetchFailed(String),
  DecodeFailed(String),
}

#[derive(Debug, Clone)]
pub struct SourceReport {
  pub label: String,
  pub url: String,
  pub status: SourceStatus,
  pub format: Option<Format>,
  pub encoding: Option<Encoding>,
  pub bytes: usize,
  pub parsed: usize,
  pub skipped: usize,
  pub warnings: Vec<String>,
}

impl SourceReport {
  fn new(source: &SubscriptionSource, status: SourceStatus) -> Self {
    SourceReport {
      label: source.label.clone(),
      url: source.url.clone(),
      status,
      format: None,
      encoding: None,
      bytes: 0,
      parsed: 0,
      skipped: 0,
      warnings: Vec::new(),
    }
  }
}

#[derive(Debug, Clone)]
pub struct SourceOutcome {
  pub source: SubscriptionSource,
  pub report: SourceReport,
  pub payload: Option<ParsedPayload>,
}

/// Fetches and parses one source. Never fails; failures land in the report.
pub async fn ingest_source(fetcher: &dyn Fetch, source: &SubscriptionSource, timeout: Duration) -> SourceOutcome {
  let fetched = match tokio::time::timeout(timeout, fetcher.fetch(&source.url)).await {
    Ok(r) => r,
    Err(_) => Err(FetchError::Timeout(timeout.as_secs())),
  };
  let raw = match fetched {
    Ok(raw) => raw,
    Err(e) => {
      warn!(label = %source.label, error = %e, "fetch failed");
      return SourceOutcome {
        source: source.clone(),
        report: SourceReport::new(source, SourceStatus::FetchFailed(e.to_string())),
        payload: None,
      };
    }
  };

  let payload = match parse_payload(&raw) {
    Ok(p) => p,
    Err(e) => {
      warn!(label = %source.label, error = %e, "decode failed");
      let mut report = SourceReport::new(source, SourceStatus::DecodeFailed(e.to_string()));
      report.bytes = raw.len();
      return SourceOutcome {
        source: source.clone(),
        report,
        payload: None,
      };
    }
  };

  if payload.proxies.is_empty() {
    warn!(label = %source.label, skipped = payload.skipped, "source yielded no proxies");
  } else {
    info!(
      label = %source.label,
      parsed = payload.proxies.len(),
      skipped = payload.skipped,
      "source ingested"
    );
  }

  let report = SourceReport {
    format: Some(payload.format),
    encoding: Some(payload.encoding),
    bytes: raw.len(),
    parsed: payload.proxies.len(),
    skipped: payload.skipped,
    warnings: payload.warnings.clone(),
    ..SourceReport::new(source, SourceStatus::Ok)
  };
  SourceOutcome {
    source: source.clone(),
    report,
    payload: Some(payload),
  }
}

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
  pub concurrency: usize,
  pub timeout: Duration,
}

impl Default for IngestOptions {
  fn default() -> Self {
    IngestOptions {
      concurrency: 4,
      timeout: Duration::from_secs(30),
    }
  }
}

/// Ingests all sources with bounded concurrency; results keep input order.
pub async fn ingest_all(
  fetcher: &dyn Fetch,
  sources: &[SubscriptionSource],
  opts: IngestOptions,
) -> Vec<SourceOutcome> {
  stream::iter(sources.iter().map(|s| ingest_source(fetcher, s, opts.timeout)))
    .buffered(opts.concurrency.max(1))
    .collect()
    .await
}

#[derive(Debug, Clone)]
pub struct RunSummary {
  pub sources: Vec<SourceReport>,
  pub unique: usize,
  pub duplicates: usize,
  pub renamed: usize,
}

impl fmt::Display for RunSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "sources:")?;
    for r in &self.sources {
      let status = match &r.status {
        SourceStatus::Ok => "ok".to_string(),
        SourceStatus::FetchFailed(e) => format!("fetch failed: {e}"),
        SourceStatus::DecodeFailed(e) => format!("decode failed: {e}"),
      };
      let format = match (r.format, r.encoding) {
        (Some(Format::Structured), Some(Encoding::Base64)) => "structured/base64",
        (Some(Format::Structured), _) => "structured",
        (Some(Format::UriList), Some(Encoding::Base64)) => "uri-list/base64",
        (Some(Format::UriList), _) => "uri-list",
        (None, _) => "-",
      };
      writeln!(
        f,
        "  {}: {status}, format={format}, bytes={}, parsed={}, skipped={}",
        r.label, r.bytes, r.parsed, r.skipped
      )?;
      for w in r.warnings.iter().take(5) {
        writeln!(f, "    warning: {w}")?;
      }
      if r.warnings.len() > 5 {
        writeln!(f, "    ... {} more", r.warnings.len() - 5)?;
      }
    }
    write!(
      f,
      "total: unique={}, duplicates dropped={}, renamed={}",
      self.unique, self.duplicates, self.renamed
    )
  }
}

pub struct RunOutput {
  pub outcomes: Vec<SourceOutcome>,
  pub merged: MergedSet,
  pub document: OverwriteDocument,
  pub summary: RunSummary,
}

/// Ingest, merge in configuration order, and build the overwrite document.
///
/// Fails only when no source yields a usable proxy or emitting fails.
pub async fn run(
  fetcher: &dyn Fetch,
  sources: &[SubscriptionSource],
  templates: &Templates,
  opts: IngestOptions,
) -> Result<RunOutput> {
  let outcomes = ingest_all(fetcher, sources, opts).await;

  let mut merger = Merger::new();
  merger.reserve(templates.group_names());
  merger.reserve(BUILTIN_TARGETS);
  for outcome in &outcomes {
    if let Some(payload) = &outcome.payload {
      merger.push_batch(payload.proxies.clone());
    }
  }
  let merged = merger.finish();
  if merged.is_empty() {
    return Err(Error::NoProxies(sources.len()));
  }

  let document = emit(&merged, templates)?;
  let summary = RunSummary {
    sources: outcomes.iter().map(|o| o.report.clone()).collect(),
    unique: merged.len(),
    duplicates: merged.duplicates,
    renamed: merged.renamed.len(),
  };
  info!(
    unique = summary.unique,
    duplicates = summary.duplicates,
    renamed = summary.renamed,
    "merge finished"
  );
  Ok(RunOutput {
    outcomes,
    merged,
    document,
    summary,
  })
}
