//! Message contract between the HTTP adapter, the manager, and workers.
//!
//! Every admitted HTTP request carries a oneshot responder. The responder
//! is the only handle to the waiting client, so it is moved (never cloned)
//! through the pending and in-progress queues: exactly one reply is
//! produced per admitted request. If the client disconnects the receiving
//! half is dropped and the eventual send is silently ignored.

use crate::http::ImageSource;
use crate::transform::{Blob, ImageFormat, ResizeParams, ResizeRequestKey};
use std::time::Duration;
use tokio::sync::oneshot;

/// Reply channel for one image request.
pub type ImageResponder = oneshot::Sender<ImageReply>;

/// Reply channel for one cache purge request.
pub type PurgeResponder = oneshot::Sender<PurgeReply>;

/// Outcome of an image request, as rendered by the HTTP adapter.
#[derive(Debug)]
pub enum ImageReply {
    /// Serve the blob with a 200. `timing` is present on the transform
    /// path and absent on the cache path (which reports zero processing
    /// time).
    Image {
        blob: Blob,
        format: ImageFormat,
        source: ImageSource,
        timing: Option<ProcessingTiming>,
    },
    /// Unknown image or failed transformation: 404.
    NotFound,
    /// Pending queue is full: 503.
    Overloaded,
    /// Waited in the pending queue for too long: 504.
    TimedOut,
}

/// Time spent producing a transformation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingTiming {
    pub resize: Duration,
    pub encoding: Duration,
}

impl ProcessingTiming {
    pub fn total(&self) -> Duration {
        self.resize + self.encoding
    }
}

/// Outcome of a cache purge request.
#[derive(Debug, PartialEq, Eq)]
pub enum PurgeReply {
    /// Cache was cleared: 200.
    Deleted,
    /// Authentication failed: 403 with the explanation.
    Forbidden(String),
}

/// What a worker produced for one key.
#[derive(Debug)]
pub enum ResizeOutcome {
    Success {
        blob: Blob,
        resize_time: Duration,
        encoding_time: Duration,
    },
    Failure {
        reason: String,
    },
}

/// Messages handled by the transform manager.
#[derive(Debug)]
pub enum ManagerMessage {
    /// An admission from the HTTP adapter.
    ResizeRequest {
        responder: ImageResponder,
        path: String,
        format: ImageFormat,
        params: ResizeParams,
    },
    /// A finished transformation from a worker.
    ResizeResult {
        worker_id: usize,
        key: ResizeRequestKey,
        outcome: ResizeOutcome,
    },
    /// An admin purge from the HTTP adapter.
    DeleteCacheRequest {
        responder: PurgeResponder,
        token: String,
    },
    /// Delayed self-message carrying a failed-auth purge response.
    NegativeDeleteCacheResponse {
        responder: PurgeResponder,
        text: String,
    },
}

/// Per-request record held in the pending and in-progress queues.
///
/// The key itself is the queue key; only the responder and the target
/// format travel with the request.
#[derive(Debug)]
pub struct PendingRequest {
    pub responder: ImageResponder,
    pub format: ImageFormat,
}
