//! Subscription ingestion: decode, parse and merge proxy subscriptions, then
//! emit a Clash overwrite document (`proxy-groups` + `rules`).

pub mod commands;
pub mod config;
pub mod decode;
pub mod detect;
pub mod emit;
pub mod error;
pub mod fetch;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod uri;
pub mod writer;

pub use config::SubscriptionSource;
pub use emit::{emit, render, OverwriteDocument, Style, Templates};
pub use error::{Error, Result};
pub use fetch::{Fetch, HttpFetcher};
pub use merge::{merge, MergedSet};
pub use model::{Auth, CanonicalProxy, Identity, Protocol, Transport};
pub use pipeline::{parse_payload, IngestOptions, RunSummary};
pub use uri::{parse_uri, to_uri};
