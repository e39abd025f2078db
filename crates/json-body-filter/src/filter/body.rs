//! Bounded request body reads and body restoration.
//!
//! Reading a body consumes it. Every path out of [`read_bounded`] hands back
//! enough to rebuild a consumable body carrying exactly the original bytes,
//! so a forwarded request is never left with a drained stream.

use futures::{future, stream, StreamExt};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, BodyStream, Full, StreamBody};
use hyper::body::{Body, Bytes, Frame};
use hyper::HeaderMap;
use std::convert::Infallible;
use std::fmt::Display;
use tracing::debug;

/// Bodies of this size or larger are forwarded without being inspected.
pub const MAX_INSPECTED_BODY_BYTES: usize = 10 * 1024 * 1024;

/// A body drained into memory.
#[derive(Debug, Clone, Default)]
pub struct BufferedBody {
    data: Bytes,
    trailers: Option<HeaderMap>,
}

impl BufferedBody {
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn trailers(&self) -> Option<&HeaderMap> {
        self.trailers.as_ref()
    }

    /// Rebuild a fresh body that yields the buffered bytes (and trailers) once.
    pub fn into_body<E>(self) -> BoxBody<Bytes, E>
    where
        E: Send + Sync + 'static,
    {
        match self.trailers {
            None => Full::new(self.data)
                .map_err(|never: Infallible| match never {})
                .boxed(),
            Some(trailers) => {
                let frames = vec![Ok(Frame::data(self.data)), Ok(Frame::trailers(trailers))];
                BodyExt::boxed(StreamBody::new(stream::iter(frames)))
            }
        }
    }
}

/// Outcome of a bounded read.
pub enum BodyRead<B> {
    /// The whole body fit under the limit.
    Complete(BufferedBody),
    /// The limit was reached; `rest` is the unread remainder of the stream.
    Capped { prefix: Bytes, rest: B },
    /// The stream failed; holds what was read before the failure.
    Failed(BufferedBody),
}

/// Drain `body` into memory, stopping once `limit` bytes have been read.
pub async fn read_bounded<B>(mut body: B, limit: usize) -> BodyRead<B>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: Display,
{
    let mut data = Vec::new();
    let mut trailers: Option<HeaderMap> = None;

    while let Some(frame) = body.frame().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, bytes_read = data.len(), "request body read failed");
                return BodyRead::Failed(BufferedBody {
                    data: Bytes::from(data),
                    trailers,
                });
            }
        };

        match frame.into_data() {
            Ok(chunk) => {
                data.extend_from_slice(&chunk);
                if data.len() >= limit {
                    return BodyRead::Capped {
                        prefix: Bytes::from(data),
                        rest: body,
                    };
                }
            }
            Err(frame) => {
                if let Ok(received) = frame.into_trailers() {
                    match trailers.as_mut() {
                        Some(existing) => existing.extend(received),
                        None => trailers = Some(received),
                    }
                }
            }
        }
    }

    BodyRead::Complete(BufferedBody {
        data: Bytes::from(data),
        trailers,
    })
}

/// Body that replays `prefix` and then streams the unread remainder of `rest`.
pub fn replay_with_remainder<B>(prefix: Bytes, rest: B) -> BoxBody<Bytes, B::Error>
where
    B: Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Send + Sync + 'static,
{
    let head = stream::once(future::ready(Ok(Frame::data(prefix))));
    BodyExt::boxed(StreamBody::new(head.chain(BodyStream::new(rest))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;
    use std::io;

    type TestFrame = Result<Frame<Bytes>, io::Error>;
    type ChunkedBody = StreamBody<stream::Iter<std::vec::IntoIter<TestFrame>>>;

    fn chunked(frames: Vec<TestFrame>) -> ChunkedBody {
        StreamBody::new(stream::iter(frames))
    }

    fn data(chunk: &'static str) -> TestFrame {
        Ok(Frame::data(Bytes::from_static(chunk.as_bytes())))
    }

    #[tokio::test]
    async fn test_complete_read() {
        let body = Full::new(Bytes::from("hello"));
        match read_bounded(body, 16).await {
            BodyRead::Complete(buffered) => {
                assert_eq!(buffered.data(), "hello");
                assert!(buffered.trailers().is_none());
                let restored: BoxBody<Bytes, Infallible> = buffered.into_body();
                let bytes = restored.collect().await.unwrap().to_bytes();
                assert_eq!(bytes, "hello");
            }
            _ => panic!("expected a complete read"),
        }
    }

    #[tokio::test]
    async fn test_empty_body_is_complete() {
        let body = Full::new(Bytes::new());
        match read_bounded(body, 16).await {
            BodyRead::Complete(buffered) => assert!(buffered.data().is_empty()),
            _ => panic!("expected a complete read"),
        }
    }

    #[tokio::test]
    async fn test_capped_read_replays_original_bytes() {
        let body = chunked(vec![data("abc"), data("def"), data("ghi")]);
        match read_bounded(body, 5).await {
            BodyRead::Capped { prefix, rest } => {
                assert_eq!(prefix, "abcdef");
                let replay = replay_with_remainder(prefix, rest);
                let bytes = replay.collect().await.unwrap().to_bytes();
                assert_eq!(bytes, "abcdefghi");
            }
            _ => panic!("expected a capped read"),
        }
    }

    #[tokio::test]
    async fn test_body_exactly_at_limit_is_capped() {
        let body = chunked(vec![data("abcd")]);
        assert!(matches!(
            read_bounded(body, 4).await,
            BodyRead::Capped { .. }
        ));
    }

    #[tokio::test]
    async fn test_failed_read_keeps_bytes_read_so_far() {
        let body = chunked(vec![
            data("partial"),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            data("never seen"),
        ]);
        match read_bounded(body, 1024).await {
            BodyRead::Failed(buffered) => {
                assert_eq!(buffered.data(), "partial");
                let restored: BoxBody<Bytes, io::Error> = buffered.into_body();
                let bytes = restored.collect().await.unwrap().to_bytes();
                assert_eq!(bytes, "partial");
            }
            _ => panic!("expected a failed read"),
        }
    }

    #[tokio::test]
    async fn test_trailers_survive_restoration() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", HeaderValue::from_static("abc123"));
        let body = chunked(vec![data("{\"a\":1}"), Ok(Frame::trailers(trailers))]);

        match read_bounded(body, 1024).await {
            BodyRead::Complete(buffered) => {
                assert_eq!(buffered.data(), "{\"a\":1}");
                let restored: BoxBody<Bytes, io::Error> = buffered.into_body();
                let collected = restored.collect().await.unwrap();
                assert_eq!(
                    collected.trailers().and_then(|t| t.get("x-checksum")).unwrap(),
                    "abc123"
                );
                assert_eq!(collected.to_bytes(), "{\"a\":1}");
            }
            _ => panic!("expected a complete read"),
        }
    }
}
