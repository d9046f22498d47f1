use std::time::Duration;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("building TLS connector: {}", source))]
    Tls { source: openssl::error::ErrorStack },

    #[snafu(display("invalid request URL: {}", message))]
    InvalidUrl { message: String },

    #[snafu(display("request timed out after {:?}", elapsed))]
    Timeout { elapsed: Duration },

    #[snafu(display("sending request: {}", source))]
    Transport { source: hyper::Error },

    #[snafu(display("reading response body: {}", source))]
    Body { source: hyper::Error },

    #[snafu(display("compressing payload: {}", source))]
    Compress { source: std::io::Error },

    #[snafu(display("decoding delimited response body: {}", source))]
    Decode { source: prost::DecodeError },

    #[snafu(display("parsing text exposition response body: {}", source))]
    ParseText { source: metrics_model::ParserError },

    #[snafu(display("server requires authorization (401 from {url})"))]
    Unauthorized { url: String },

    #[snafu(display("server forbade the request (403 from {url})"))]
    Forbidden { url: String },

    #[snafu(display("server rejected the request (400 from {url}): {body}"))]
    BadRequest { url: String, body: String },

    #[snafu(display("upstream {url} returned unexpected status {status}: {body}"))]
    Upstream {
        url: String,
        status: u16,
        body: String,
    },
}

impl Error {
    /// Whether retrying the same request might succeed: everything except
    /// an auth/permission/validation rejection, which won't change without
    /// operator intervention.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::Unauthorized { .. } | Error::Forbidden { .. } | Error::BadRequest { .. }
        )
    }
}
