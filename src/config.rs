//! Validates a parsed `Cli` into the `Config` the rest of the process
//! consumes. Mirrors the original CLI's own validation: splitting
//! `name=value` flags, defaulting URL paths, deriving the authorize/upload
//! URLs from `--to`, and falling back to a scrape-disabled, server-only
//! mode when no upload destination is configured at all.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hyper::Uri;
use snafu::{ResultExt, Snafu};

use crate::cli::Cli;
use crate::client::TlsConfig;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("--from is not a valid URL: {}", source))]
    InvalidFromUrl { source: http::uri::InvalidUri },

    #[snafu(display("--to is not a valid URL: {}", source))]
    InvalidToUrl { source: http::uri::InvalidUri },

    #[snafu(display("{flag} value {value:?} is not in the form name=value"))]
    MalformedPair { flag: &'static str, value: String },

    #[snafu(display("--listen is not a valid address: {}", source))]
    InvalidListenAddr { source: std::net::AddrParseError },

    #[snafu(display("--anonymize-labels was given but neither --anonymize-salt nor --anonymize-salt-file was"))]
    MissingAnonymizeSalt,

    #[snafu(display("reading {}: {}", path.display(), source))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    /// Raw delimited-protobuf push, same wire format as the federation
    /// scrape itself.
    Push,
    /// `prometheus.WriteRequest` remote-write, snappy-compressed.
    RemoteWrite,
}

#[derive(Debug, Clone)]
pub struct UploadTarget {
    pub kind: UploadKind,
    pub upload_url: Uri,
    pub authorize_url: Uri,
    pub authorization_token: String,
    pub cluster_id: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub from: Uri,
    pub from_bearer_token: Option<String>,
    pub from_tls: TlsConfig,
    pub match_exprs: Vec<String>,
    pub listen: SocketAddr,
    pub interval: Duration,
    pub limit_bytes: u64,
    pub labels: Vec<(String, String)>,
    pub renames: HashMap<String, String>,
    pub anonymize_labels: Vec<String>,
    pub anonymize_salt: Vec<u8>,
    /// `None` when no upload destination at all is configured: the HTTP
    /// server still runs (`/metrics`, `/federate`, `/healthz`) but the
    /// worker that scrapes and forwards does not.
    pub upload: Option<UploadTarget>,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self, Error> {
        let from = default_path(&cli.from, "/federate").context(InvalidFromUrlSnafu)?;
        let from_bearer_token = resolve_token(cli.from_token.as_deref(), cli.from_token_file.as_deref())?;
        let from_tls = TlsConfig {
            ca_file: cli.from_ca_file.clone(),
            cert_file: None,
            key_file: None,
        };

        let listen = cli.listen.parse().context(InvalidListenAddrSnafu)?;

        let labels = cli
            .label
            .iter()
            .map(|s| split_pair("--label", s))
            .collect::<Result<Vec<_>, _>>()?;

        let mut renames = cli
            .rename
            .iter()
            .map(|s| split_pair("--rename", s))
            .collect::<Result<HashMap<_, _>, _>>()?;
        if renames.is_empty() {
            renames.insert("ALERTS".to_owned(), "alerts".to_owned());
        }

        let mut match_exprs = cli.match_expr.clone();
        if let Some(path) = &cli.match_file {
            let contents = std::fs::read_to_string(path).context(ReadFileSnafu { path: path.clone() })?;
            match_exprs.extend(contents.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_owned));
        }

        let anonymize_labels = cli.anonymize_labels.clone();
        let anonymize_salt = if anonymize_labels.is_empty() {
            Vec::new()
        } else if let Some(salt) = &cli.anonymize_salt {
            salt.clone().into_bytes()
        } else if let Some(path) = &cli.anonymize_salt_file {
            read_trimmed(path)?.into_bytes()
        } else {
            return Err(Error::MissingAnonymizeSalt);
        };

        let upload = match &cli.to {
            None => None,
            Some(to) => Some(build_upload_target(&cli, to)?),
        };

        Ok(Config {
            from,
            from_bearer_token,
            from_tls,
            match_exprs,
            listen,
            interval: cli.interval,
            limit_bytes: cli.limit_bytes,
            labels,
            renames,
            anonymize_labels,
            anonymize_salt,
            upload,
        })
    }
}

/// A file-backed token wins over an inline one; both are optional.
fn resolve_token(inline: Option<&str>, file: Option<&Path>) -> Result<Option<String>, Error> {
    if let Some(path) = file {
        return Ok(Some(read_trimmed(path)?));
    }
    Ok(inline.map(str::to_owned))
}

fn build_upload_target(cli: &Cli, to: &str) -> Result<UploadTarget, Error> {
    let base = to.trim_end_matches('/');
    let cluster_id = cli.id.clone().unwrap_or_default();

    let upload_url: Uri = cli
        .to_upload
        .clone()
        .unwrap_or_else(|| format!("{base}/upload"))
        .parse()
        .context(InvalidToUrlSnafu)?;
    let authorize_url: Uri = cli
        .to_auth
        .clone()
        .unwrap_or_else(|| format!("{base}/authorize?id={cluster_id}"))
        .parse()
        .context(InvalidToUrlSnafu)?;

    let kind = if upload_url.path().ends_with("/api/v1/receive") {
        UploadKind::RemoteWrite
    } else {
        UploadKind::Push
    };

    let authorization_token = resolve_token(cli.to_token.as_deref(), cli.to_token_file.as_deref())?.unwrap_or_default();

    Ok(UploadTarget {
        kind,
        upload_url,
        authorize_url,
        authorization_token,
        cluster_id,
    })
}

fn default_path(raw: &str, fallback_path: &str) -> Result<Uri, http::uri::InvalidUri> {
    let uri: Uri = raw.parse()?;
    if uri.path() == "/" || uri.path().is_empty() {
        let authority = uri.authority().map(|a| a.as_str()).unwrap_or_default();
        let scheme = uri.scheme_str().unwrap_or("http");
        format!("{scheme}://{authority}{fallback_path}").parse()
    } else {
        Ok(uri)
    }
}

fn split_pair(flag: &'static str, value: &str) -> Result<(String, String), Error> {
    value
        .split_once('=')
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .ok_or_else(|| Error::MalformedPair {
            flag,
            value: value.to_owned(),
        })
}

fn read_trimmed(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_owned())
        .context(ReadFileSnafu { path: path.to_owned() })
}

#[cfg(test)]
mod test {
    use super::*;

    fn base_cli(from: &str) -> Cli {
        Cli {
            from: from.to_owned(),
            from_token: None,
            from_token_file: None,
            from_ca_file: None,
            id: None,
            match_expr: vec!["up".to_owned()],
            match_file: None,
            to: None,
            to_upload: None,
            to_auth: None,
            to_token: None,
            to_token_file: None,
            listen: "localhost:9002".to_owned(),
            interval: Duration::from_secs(270),
            limit_bytes: 1024,
            label: vec![],
            rename: vec![],
            anonymize_labels: vec![],
            anonymize_salt: None,
            anonymize_salt_file: None,
            verbose: 0,
            log_level: None,
        }
    }

    #[test]
    fn defaults_from_path_to_federate() {
        let config = Config::from_cli(base_cli("https://prom.example.com")).unwrap();
        assert_eq!(config.from.path(), "/federate");
    }

    #[test]
    fn keeps_explicit_from_path() {
        let config = Config::from_cli(base_cli("https://prom.example.com/federate?x=1")).unwrap();
        assert_eq!(config.from.path(), "/federate");
    }

    #[test]
    fn defaults_rename_to_alerts_when_none_given() {
        let config = Config::from_cli(base_cli("https://prom.example.com")).unwrap();
        assert_eq!(config.renames.get("ALERTS"), Some(&"alerts".to_owned()));
    }

    #[test]
    fn explicit_rename_suppresses_the_default() {
        let mut cli = base_cli("https://prom.example.com");
        cli.rename = vec!["foo=bar".to_owned()];
        let config = Config::from_cli(cli).unwrap();
        assert_eq!(config.renames.len(), 1);
        assert_eq!(config.renames.get("foo"), Some(&"bar".to_owned()));
    }

    #[test]
    fn no_to_means_worker_is_disabled() {
        let config = Config::from_cli(base_cli("https://prom.example.com")).unwrap();
        assert!(config.upload.is_none());
    }

    #[test]
    fn derives_upload_and_authorize_urls_from_to() {
        let mut cli = base_cli("https://prom.example.com");
        cli.to = Some("https://aggregator.example.com".to_owned());
        cli.id = Some("cluster-1".to_owned());
        let config = Config::from_cli(cli).unwrap();
        let upload = config.upload.unwrap();
        assert_eq!(upload.upload_url, "https://aggregator.example.com/upload");
        assert_eq!(upload.authorize_url, "https://aggregator.example.com/authorize?id=cluster-1");
        assert_eq!(upload.cluster_id, "cluster-1");
        assert_eq!(upload.kind, UploadKind::Push);
    }

    #[test]
    fn remote_write_receive_path_selects_remote_write_kind() {
        let mut cli = base_cli("https://prom.example.com");
        cli.to_upload = Some("https://thanos.example.com/api/v1/receive".to_owned());
        cli.to = Some("https://thanos.example.com".to_owned());
        let config = Config::from_cli(cli).unwrap();
        assert_eq!(config.upload.unwrap().kind, UploadKind::RemoteWrite);
    }

    #[test]
    fn rejects_malformed_label_pair() {
        let mut cli = base_cli("https://prom.example.com");
        cli.label = vec!["no-equals-sign".to_owned()];
        assert!(matches!(
            Config::from_cli(cli),
            Err(Error::MalformedPair { flag: "--label", .. })
        ));
    }

    #[test]
    fn anonymize_label_without_salt_is_rejected() {
        let mut cli = base_cli("https://prom.example.com");
        cli.anonymize_labels = vec!["instance".to_owned()];
        assert!(matches!(Config::from_cli(cli), Err(Error::MissingAnonymizeSalt)));
    }
}
