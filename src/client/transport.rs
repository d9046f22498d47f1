use std::path::PathBuf;
use std::time::Duration;

use hyper::client::HttpConnector;
use hyper::Client;
use hyper_openssl::HttpsConnector;
use openssl::ssl::{SslConnector, SslFiletype, SslMethod};
use snafu::ResultExt;

use super::error::{Error, TlsSnafu};

pub type HttpClient = Client<HttpsConnector<HttpConnector>>;

const DIAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Client certificate material for talking to an mTLS-protected upload
/// endpoint. Paths are read from `/tlscerts/...` by default, or
/// `./tlscerts/...` when `UNIT_TEST` is set, matching the layout the
/// in-cluster and local test deployments respectively mount these at.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub ca_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
}

impl TlsConfig {
    pub fn tls_cert_dir() -> PathBuf {
        if std::env::var_os("UNIT_TEST").is_some() {
            PathBuf::from("./tlscerts")
        } else {
            PathBuf::from("/tlscerts")
        }
    }

    pub fn from_cert_dir(dir: &std::path::Path) -> Self {
        TlsConfig {
            ca_file: Some(dir.join("ca.crt")),
            cert_file: Some(dir.join("tls.crt")),
            key_file: Some(dir.join("tls.key")),
        }
    }
}

/// Builds the shared HTTP(S) client used for every outbound request: the
/// federation scrape, the authorize handshake, and the upload push.
/// Plain `http://` destinations simply never trigger the TLS handshake
/// this connector is also capable of.
pub fn build(tls: &TlsConfig) -> Result<HttpClient, Error> {
    let mut http = HttpConnector::new();
    http.set_connect_timeout(Some(DIAL_TIMEOUT));
    http.set_keepalive(None);
    http.enforce_http(false);

    let mut builder = SslConnector::builder(SslMethod::tls()).context(TlsSnafu)?;
    if let Some(ca_file) = &tls.ca_file {
        if ca_file.exists() {
            builder.set_ca_file(ca_file).context(TlsSnafu)?;
        }
    }
    if let (Some(cert_file), Some(key_file)) = (&tls.cert_file, &tls.key_file) {
        if cert_file.exists() && key_file.exists() {
            builder
                .set_certificate_file(cert_file, SslFiletype::PEM)
                .context(TlsSnafu)?;
            builder
                .set_private_key_file(key_file, SslFiletype::PEM)
                .context(TlsSnafu)?;
        }
    }

    let https = HttpsConnector::with_connector(http, builder).context(TlsSnafu)?;
    Ok(Client::builder().pool_idle_timeout(DIAL_TIMEOUT).build(https))
}
