use crate::merge::merge;
use crate::pipeline::parse_payload;
use crate::uri::to_uri;
use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, BufReader};
use tracing::info;

#[derive(ClapArgs, Debug, Clone)]
pub struct Args {
  /// Read the subscription payload from a file.
  #[arg(long, conflicts_with = "text")]
  pub file: Option<PathBuf>,

  /// Subscription payload given directly. Stdin is read when neither is set.
  #[arg(long)]
  pub text: Option<String>,

  /// Print one proxy URI per line instead of JSON.
  #[arg(long, default_value_t = false)]
  pub uri: bool,

  /// Keep records that share an identity with an earlier one.
  #[arg(long, default_value_t = false)]
  pub keep_duplicates: bool,
}

async fn read_input(args: &Args) -> Result<Vec<u8>> {
  if let Some(path) = &args.file {
    return tokio::fs::read(path)
      .await
      .with_context(|| format!("reading {}", path.display()));
  }
  if let Some(text) = &args.text {
    return Ok(text.clone().into_bytes());
  }
  let mut buf = Vec::new();
  BufReader::new(tokio::io::stdin()).read_to_end(&mut buf).await?;
  Ok(buf)
}

pub async fn run(args: Args) -> Result<()> {
  let raw = read_input(&args).await?;
  let payload = parse_payload(&raw)?;

  let parsed = payload.proxies.len();
  let proxies = if args.keep_duplicates {
    payload.proxies
  } else {
    merge(vec![payload.proxies]).proxies
  };
  info!(
    format = ?payload.format,
    encoding = ?payload.encoding,
    parsed,
    skipped = payload.skipped,
    output = proxies.len(),
    "payload parsed"
  );

  for p in &proxies {
    if args.uri {
      println!("{}", to_uri(p));
    } else {
      println!("{}", serde_json::to_string(p)?);
    }
  }
  Ok(())
}
