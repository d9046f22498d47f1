//! Component H: the command-line surface, parsed with `clap` and validated
//! into a `Config` the rest of the process runs from.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Scrapes a Prometheus federation endpoint, transforms the result, and
/// forwards it to a remote aggregator.
#[derive(Debug, Clone, Parser)]
#[command(name = "metrics-federator", version, about)]
pub struct Cli {
    /// Federation endpoint to scrape, e.g. https://prometheus.example.com.
    /// A bare host/path with no explicit path has `/federate` appended.
    #[arg(long)]
    pub from: String,

    /// Bearer token used to authenticate the scrape request, given inline.
    #[arg(long)]
    pub from_token: Option<String>,

    /// Bearer token file used to authenticate the scrape request. Re-read
    /// on every attempt; wins over `--from-token` if both are given.
    #[arg(long)]
    pub from_token_file: Option<PathBuf>,

    /// CA bundle used to validate the federation endpoint's certificate.
    #[arg(long)]
    pub from_ca_file: Option<PathBuf>,

    /// Identifies this agent's cluster to the authorize endpoint and to
    /// remote-write series labeling.
    #[arg(long)]
    pub id: Option<String>,

    /// `match[]` series selector passed to the federation endpoint. May be
    /// given multiple times.
    #[arg(long = "match")]
    pub match_expr: Vec<String>,

    /// File of newline-separated `match[]` expressions, merged with
    /// `--match`.
    #[arg(long)]
    pub match_file: Option<PathBuf>,

    /// Destination to forward samples to. Its path shape picks the upload
    /// protocol: a path ending in `/api/v1/receive` is treated as a
    /// remote-write receiver, anything else as a raw protobuf push.
    #[arg(long)]
    pub to: Option<String>,

    /// Overrides the derived upload URL (`<to>/upload` by default).
    #[arg(long)]
    pub to_upload: Option<String>,

    /// Overrides the derived authorize URL (`<to>/authorize?id=<id>` by
    /// default).
    #[arg(long)]
    pub to_auth: Option<String>,

    /// Long-lived authorization token exchanged for a short-lived upload
    /// token, given inline.
    #[arg(long)]
    pub to_token: Option<String>,

    /// File holding the long-lived authorization token. Re-read on every
    /// attempt; wins over `--to-token` if both are given.
    #[arg(long)]
    pub to_token_file: Option<PathBuf>,

    /// Address the HTTP server listens on.
    #[arg(long, default_value = "localhost:9002")]
    pub listen: String,

    /// How often the worker scrapes and forwards.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "4m30s")]
    pub interval: Duration,

    /// Maximum bytes accepted from a single federation scrape response.
    #[arg(long, default_value_t = 200 * 1024)]
    pub limit_bytes: u64,

    /// Adds (or overwrites) a static label on every forwarded sample.
    /// Repeatable, format `name=value`.
    #[arg(long = "label")]
    pub label: Vec<String>,

    /// Renames a scraped family. Repeatable, format `old=new`. Defaults to
    /// `ALERTS=alerts` when no `--rename` is given at all.
    #[arg(long = "rename")]
    pub rename: Vec<String>,

    /// Label whose value is replaced with a salted digest before
    /// forwarding. Repeatable.
    #[arg(long = "anonymize-labels")]
    pub anonymize_labels: Vec<String>,

    /// Salt used by `--anonymize-labels`. Required if any are given.
    #[arg(long)]
    pub anonymize_salt: Option<String>,

    /// File holding the anonymize salt, as an alternative to
    /// `--anonymize-salt`.
    #[arg(long)]
    pub anonymize_salt_file: Option<PathBuf>,

    /// Increases log verbosity; repeatable.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Sets the log level directly, overriding `-v`.
    #[arg(long)]
    pub log_level: Option<String>,
}
