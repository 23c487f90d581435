use crate::config;
use crate::emit::{render, Style, Templates};
use crate::fetch::{default_user_agent, FetchOptions, HttpFetcher};
use crate::pipeline::{self, IngestOptions};
use crate::writer;
use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(ClapArgs, Debug, Clone)]
pub struct Args {
  /// Subscription list, one `label | url` per line.
  #[arg(short, long, default_value = "subscriptions.conf")]
  pub config: PathBuf,

  /// Directory of the generated overwrite file.
  #[arg(short, long, default_value = "merged-yamls")]
  pub output_dir: PathBuf,

  /// Directory of the per-source mirrors.
  #[arg(short, long, default_value = "sub-yamls")]
  pub download_dir: PathBuf,

  #[arg(long, default_value = "overwrite.yaml")]
  pub output_name: String,

  /// YAML file with `proxy-groups` and `rules` templates (built-in set when omitted).
  #[arg(short, long)]
  pub templates: Option<PathBuf>,

  #[arg(long, value_enum, default_value_t = Style::Compact)]
  pub style: Style,

  /// Per-request timeout (seconds).
  #[arg(long, default_value_t = 30)]
  pub timeout_secs: u64,

  /// Deadline for one source including retries (seconds).
  #[arg(long, default_value_t = 120)]
  pub source_timeout_secs: u64,

  /// Sources fetched at the same time.
  #[arg(long, default_value_t = 4)]
  pub concurrency: usize,

  /// Retries on 429/5xx and transport errors.
  #[arg(long, default_value_t = 3)]
  pub retries: u32,

  /// User-Agent header (default: Chrome-like UA).
  #[arg(long)]
  pub user_agent: Option<String>,

  /// HTTP proxy used for downloads, e.g. http://127.0.0.1:7890
  #[arg(long)]
  pub proxy: Option<String>,

  /// Print the overwrite document instead of writing any file.
  #[arg(short = 'n', long, default_value_t = false)]
  pub dry_run: bool,
}

const SEPARATOR: &str = "==================================================";

pub async fn run(args: Args) -> Result<()> {
  let sources = config::load_subscriptions(&args.config)?;
  let templates = match &args.templates {
    Some(path) => config::load_templates(path).with_context(|| format!("loading {}", path.display()))?,
    None => Templates::default(),
  };

  let fetcher = HttpFetcher::new(FetchOptions {
    timeout: Duration::from_secs(args.timeout_secs.max(1)),
    retries: args.retries,
    user_agent: args
      .user_agent
      .clone()
      .unwrap_or_else(|| default_user_agent().to_string()),
    proxy: args.proxy.clone(),
    ..FetchOptions::default()
  })
  .context("building http client")?;

  let opts = IngestOptions {
    concurrency: args.concurrency.max(1),
    timeout: Duration::from_secs(args.source_timeout_secs.max(1)),
  };
  info!(sources = sources.len(), concurrency = opts.concurrency, "starting merge");
  let out = pipeline::run(&fetcher, &sources, &templates, opts).await?;
  let text = render(&out.document, args.style)?;

  if args.dry_run {
    println!("{SEPARATOR}");
    print!("{text}");
    println!("{SEPARATOR}");
  } else {
    for outcome in &out.outcomes {
      if let Err(e) = writer::write_mirror(&args.download_dir, outcome).await {
        warn!(label = %outcome.source.label, error = %e, "mirror not saved");
      }
    }
    let path = writer::write_output(&args.output_dir, &args.output_name, &text)
      .await
      .with_context(|| format!("writing {}", args.output_dir.join(&args.output_name).display()))?;
    info!(path = %path.display(), proxies = out.merged.len(), "done");
  }

  eprintln!("{}", out.summary);
  Ok(())
}
