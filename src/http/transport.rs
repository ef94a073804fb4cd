//! Transport boundary: something that turns a request into a response with a streaming body.
//!
//! [`Transport`] is implemented for `reqwest::Client`. Tests and other stacks can supply their own.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::{Request, Response};

use super::error::TransportError;

/// Streaming response body.
#[async_trait]
pub trait ResponseBody: Send {
    /// Next chunk, or `None` at end of stream.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransportError>;

    /// Release the underlying connection. Dropping the body also closes it.
    fn close(&mut self) {}
}

pub type BoxBody = Box<dyn ResponseBody>;

/// Executes one HTTP round trip.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn round_trip(
        &self,
        request: Request<Bytes>,
    ) -> Result<Response<BoxBody>, TransportError>;
}

/// Read at most `limit` bytes. Returns the bytes and whether the body had more.
pub(crate) async fn read_limited(
    body: &mut BoxBody,
    limit: usize,
) -> Result<(Bytes, bool), TransportError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = body.next_chunk().await? {
        let room = limit - buf.len();
        if chunk.len() > room {
            buf.extend_from_slice(&chunk[..room]);
            return Ok((buf.freeze(), true));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok((buf.freeze(), false))
}

/// Drain up to `limit` bytes so the connection can be reused, then close the body.
///
/// Read errors are swallowed; a body that fails mid-drain just won't be reused.
pub(crate) async fn drain(mut body: BoxBody, limit: usize) -> Bytes {
    let drained = match read_limited(&mut body, limit).await {
        Ok((bytes, _truncated)) => bytes,
        Err(err) => {
            tracing::trace!(error = %err, "body drain failed");
            Bytes::new()
        }
    };
    body.close();
    tracing::trace!(bytes = drained.len(), "response body drained");
    drained
}

struct ReqwestBody(reqwest::Response);

#[async_trait]
impl ResponseBody for ReqwestBody {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        self.0.chunk().await.map_err(TransportError::new)
    }
}

#[async_trait]
impl Transport for reqwest::Client {
    async fn round_trip(
        &self,
        request: Request<Bytes>,
    ) -> Result<Response<BoxBody>, TransportError> {
        let request = reqwest::Request::try_from(request).map_err(TransportError::new)?;
        let response = self.execute(request).await.map_err(TransportError::new)?;

        let mut builder = Response::builder().status(response.status()).version(response.version());
        if let Some(headers) = builder.headers_mut() {
            *headers = response.headers().clone();
        }
        builder.body(Box::new(ReqwestBody(response)) as BoxBody).map_err(TransportError::new)
    }
}
