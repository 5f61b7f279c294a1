//! ccTalk link layer: a blocking serial worker on its own thread, and the
//! link controller that frames commands, enforces single-request-in-flight
//! discipline, and validates replies.
//!
//! How it all works: [`worker::SerialWorker`] owns the serial port and runs
//! on a dedicated thread, performing one blocking write plus bounded read
//! per request. [`LinkController`] talks to it through a command queue and
//! receives each request's outcome through a one-shot channel, so the
//! async side never blocks on the port.

mod controller;
mod worker;

use std::future::Future;
use std::time::Duration;

use cctalk_framing::FrameError;
use cctalk_types::Header;
use thiserror::Error;

pub use controller::LinkController;

/// Default response timeout when the caller does not override it.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(1500);

/// Gap after which a response is considered complete once bytes have
/// started arriving. The ccTalk recommendation.
pub const INTER_BYTE_GAP: Duration = Duration::from_millis(50);

/// Write timeout for a request of `len` bytes: generous fixed cost plus
/// per-byte time at 9600 baud.
pub fn write_timeout_for(len: usize) -> Duration {
    Duration::from_millis(500 + 2 * len as u64)
}

/// Errors surfaced by the link layer. Each request sees exactly one
/// terminal outcome: a validated reply or one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("cannot open serial port: {0}")]
    PortOpen(String),
    #[error("serial port is not open")]
    PortClosed,
    #[error("serial port error: {0}")]
    Port(String),
    #[error("request #{request_id} write timeout ({timeout_ms} ms)")]
    RequestTimeout { request_id: u64, timeout_ms: u64 },
    #[error("response #{request_id} read timeout ({timeout_ms} ms)")]
    ResponseTimeout { request_id: u64, timeout_ms: u64 },
    #[error("response #{request_id} malformed: {source}")]
    Structure {
        request_id: u64,
        #[source]
        source: FrameError,
    },
    #[error("unsupported link option: {0}")]
    Unsupported(&'static str),
    #[error("link worker has shut down")]
    WorkerGone,
}

impl LinkError {
    /// Whether this is a response read timeout. `ReadBufferedCredit`
    /// treats those as "no news", not as an error.
    pub fn is_response_timeout(&self) -> bool {
        matches!(self, LinkError::ResponseTimeout { .. })
    }
}

/// A validated generic reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Id of the request this answers.
    pub request_id: u64,
    /// Reply payload; empty for an ACK.
    pub data: Vec<u8>,
}

/// The seam between the command layer and the transport.
///
/// Implemented by [`LinkController`] for real serial buses and by scripted
/// mocks in tests. One transaction is one request and its single terminal
/// outcome; implementations serialize concurrent callers.
pub trait Link: Send + Sync + 'static {
    /// Send `header` with `payload` and await the validated reply.
    fn transact(
        &self,
        header: Header,
        payload: Vec<u8>,
        response_timeout: Duration,
    ) -> impl Future<Output = Result<Reply, LinkError>> + Send;

    /// Open the underlying transport. Defaults to a no-op for transports
    /// that have nothing to open.
    fn open(&self) -> impl Future<Output = Result<(), LinkError>> + Send {
        async { Ok(()) }
    }

    /// Close the underlying transport.
    fn close(&self) -> impl Future<Output = ()> + Send {
        async {}
    }
}
