//! A byte-ceiling wrapper over a chunked body stream.
//!
//! Federation endpoints are not obligated to respect the local scrape
//! timeout or any notion of "reasonable size", and a misbehaving or
//! compromised upstream can otherwise force unbounded memory growth while
//! buffering a response. `LimitedReader` collects a stream of `Bytes`
//! chunks up to a configured ceiling and then stops cleanly: it is not an
//! error to exceed the limit, the remainder is just discarded, same as the
//! federation source treats a truncated family list as an incomplete (not
//! failed) scrape.

use bytes::Bytes;
use futures::{Stream, StreamExt};

pub struct LimitedReader<S> {
    inner: S,
    remaining: u64,
    truncated: bool,
}

impl<S, E> LimitedReader<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    pub fn new(inner: S, limit_bytes: u64) -> Self {
        LimitedReader {
            inner,
            remaining: limit_bytes,
            truncated: false,
        }
    }

    /// True once the ceiling was reached and the remainder of the stream,
    /// if any, was discarded unread.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Drains the stream into a single buffer, stopping once `limit_bytes`
    /// have been collected. Call `truncated()` afterward to check whether
    /// the ceiling was hit.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>, E> {
        let mut out = Vec::new();
        if self.remaining == 0 {
            return Ok(out);
        }
        while let Some(chunk) = self.inner.next().await {
            let chunk = chunk?;
            let chunk_len = chunk.len() as u64;
            if chunk_len >= self.remaining {
                let take = self.remaining as usize;
                out.extend_from_slice(&chunk[..take]);
                self.remaining = 0;
                self.truncated = true;
                break;
            }
            self.remaining -= chunk_len;
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use futures::stream;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Bytes, std::convert::Infallible>> {
        stream::iter(parts.iter().map(|p| Ok(Bytes::from(p.to_string()))).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn reads_everything_under_the_limit() {
        let mut reader = LimitedReader::new(chunks(&["hello", " ", "world"]), 100);
        let out = reader.read_to_end().await.unwrap();
        assert_eq!(out, b"hello world");
        assert!(!reader.truncated());
    }

    #[tokio::test]
    async fn truncates_cleanly_at_the_limit() {
        let mut reader = LimitedReader::new(chunks(&["hello", " world"]), 7);
        let out = reader.read_to_end().await.unwrap();
        assert_eq!(out, b"hello w");
        assert!(reader.truncated());
    }

    #[tokio::test]
    async fn reports_truncation_across_chunk_boundaries() {
        let mut reader = LimitedReader::new(chunks(&["0123456789"]), 4);
        let out = reader.read_to_end().await.unwrap();
        assert_eq!(out, b"0123");
        assert!(reader.truncated());
    }

    #[tokio::test]
    async fn zero_limit_reads_nothing() {
        let mut reader = LimitedReader::new(chunks(&["anything"]), 0);
        let out = reader.read_to_end().await.unwrap();
        assert!(out.is_empty());
    }
}
