use anyhow::Result;
use clap::{Parser, Subcommand};
use sub_merge::commands::{merge, parse};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
  /// Debug logging (RUST_LOG takes precedence).
  #[arg(short, long, global = true, default_value_t = false)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Download all subscriptions, merge their proxies and write the overwrite config.
  Merge(merge::Args),

  /// Parse one subscription payload (URI list, Base64 or Clash YAML) and print canonical proxies as JSONL.
  Parse(parse::Args),
}

fn init_tracing(verbose: bool) {
  let default = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .init();
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(cli.verbose);
  match cli.command {
    Commands::Merge(args) => merge::run(args).await,
    Commands::Parse(args) => parse::run(args).await,
  }
}
