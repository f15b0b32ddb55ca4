//! Concrete protocol adapters.
//!
//! Every adapter runs its exchange in a tokio task and reports back through
//! the [`EventSink`](crate::handler::EventSink) it was handed. The helpers in
//! this module hold the shared plumbing: the task slot that backs
//! `is_in_progress`/`cancel_request`, and body reading with progress events.

mod about;
mod file;
mod finger;
mod gemini;
mod gopher;
mod http;

pub use about::AboutHandler;
pub use file::FileHandler;
pub use finger::FingerHandler;
pub use gemini::{parse_response_header, GeminiHandler, GeminiOutcome, ResponseHeader};
pub use gopher::{GopherHandler, GopherSelector};
pub use http::WebHandler;

use std::future::Future;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::NetworkError;
use crate::handler::EventSink;

const READ_CHUNK: usize = 16 * 1024;
/// Largest body the raw socket adapters accept
pub const MAX_BODY_SIZE: usize = 64 * 1024 * 1024;

/// The background task of the request an adapter is currently running
#[derive(Debug, Default)]
pub(crate) struct RequestTask {
    handle: Option<JoinHandle<()>>,
}

impl RequestTask {
    /// Spawn `work` on the current runtime, replacing any finished task.
    /// Returns false when called outside a tokio runtime.
    pub(crate) fn spawn<F>(&mut self, adapter: &str, work: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match Handle::try_current() {
            Ok(runtime) => {
                self.handle = Some(runtime.spawn(work));
                true
            }
            Err(e) => {
                log::error!("{} adapter cannot start a request without a runtime: {}", adapter, e);
                false
            }
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Abort the running task. Aborting never fails for a tokio task.
    pub(crate) fn abort(&mut self) -> bool {
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                handle.abort();
            }
        }
        true
    }
}

/// Report the outcome of an exchange whose success path already emitted its
/// terminal event
pub(crate) fn report(adapter: &str, sink: &EventSink, outcome: Result<(), NetworkError>) {
    if let Err(error) = outcome {
        log::debug!("{} request {:?} failed: {}", adapter, sink.id(), error);
        sink.error(error);
    }
}

/// Read everything until the peer closes, emitting a progress event per chunk.
///
/// Servers on the small internet commonly close TLS without a close_notify,
/// so an unexpected EOF after the header counts as end of body.
pub(crate) async fn read_body<R>(reader: &mut R, sink: &EventSink) -> Result<Vec<u8>, NetworkError>
where
    R: AsyncRead + Unpin,
{
    read_body_limited(reader, sink, MAX_BODY_SIZE).await
}

async fn read_body_limited<R>(
    reader: &mut R,
    sink: &EventSink,
    limit: usize,
) -> Result<Vec<u8>, NetworkError>
where
    R: AsyncRead + Unpin,
{
    let mut body = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if body.len() + n > limit {
                    return Err(NetworkError::ProtocolViolation(format!(
                        "Response body exceeds {} bytes",
                        limit
                    )));
                }
                body.extend_from_slice(&chunk[..n]);
                sink.progress(body.len() as u64);
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                log::debug!("Peer closed without close_notify after {} bytes", body.len());
                break;
            }
            Err(e) => return Err(NetworkError::from_io(&e)),
        }
    }

    Ok(body)
}

/// CR or LF in a decoded request field would start a second request line
pub(crate) fn has_line_break(bytes: &[u8]) -> bool {
    bytes.iter().any(|&b| b == b'\r' || b == b'\n')
}

/// Decode `%XX` escapes in a URL path component
pub(crate) fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    out
}
