//! Transformer workers.
//!
//! A worker is a pure function of a request key plus the filesystem: load
//! the source image, resize it according to the key's parameters, and
//! re-encode it in the key's target format. Decoding and encoding are
//! CPU-bound and the file read blocks, so every worker runs on its own
//! dedicated OS thread and communicates with the manager via channels.
//! The worker has no state beyond the shared read-only images root.

use crate::manager::{ManagerMessage, ResizeOutcome};
use crate::transform::{
    check_result_size, result_dimensions, Blob, ImageFormat, ResizeParams, ResizeRequestKey,
    TransformError,
};
use bytes::Bytes;
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;
use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// One transformation job.
///
/// Exactly one [`ManagerMessage::ResizeResult`] is sent to `reply_to`
/// per job.
#[derive(Debug)]
pub struct WorkerJob {
    pub key: ResizeRequestKey,
    pub reply_to: mpsc::UnboundedSender<ManagerMessage>,
}

/// Address of a spawned worker.
///
/// The manager keeps free workers' handles on a stack and sends jobs
/// through them; the worker itself holds a clone so results can identify
/// their producer.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    id: usize,
    jobs: mpsc::UnboundedSender<WorkerJob>,
}

impl WorkerHandle {
    pub fn new(id: usize, jobs: mpsc::UnboundedSender<WorkerJob>) -> Self {
        Self { id, jobs }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Hand a job to the worker. Fails only if the worker thread is gone.
    pub fn send(&self, job: WorkerJob) -> Result<(), mpsc::error::SendError<WorkerJob>> {
        self.jobs.send(job)
    }
}

/// A transformer worker bound to an images root directory.
pub struct TransformWorker {
    id: usize,
    root_dir: PathBuf,
}

impl TransformWorker {
    /// Spawn a worker on its own named OS thread.
    ///
    /// The thread ends when every sender for its job channel is dropped;
    /// the manager's worker registry holds those senders.
    pub fn spawn(id: usize, root_dir: PathBuf) -> std::io::Result<(WorkerHandle, JoinHandle<()>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = WorkerHandle::new(id, tx);
        let worker = TransformWorker { id, root_dir };

        let join = std::thread::Builder::new()
            .name(format!("shrimp-worker-{id}"))
            .spawn(move || worker.run(rx))?;

        Ok((handle, join))
    }

    fn run(self, mut jobs: mpsc::UnboundedReceiver<WorkerJob>) {
        debug!(worker = self.id, "transformer worker started");

        while let Some(WorkerJob { key, reply_to }) = jobs.blocking_recv() {
            trace!(worker = self.id, key = %key, "transformation started");
            let outcome = self.process(&key);

            // A failed send means the manager is shutting down; the loop
            // ends once the job channel drains.
            let _ = reply_to.send(ManagerMessage::ResizeResult {
                worker_id: self.id,
                key,
                outcome,
            });
        }

        debug!(worker = self.id, "transformer worker stopped");
    }

    /// Perform a transformation, folding any error into a failure reason.
    pub fn process(&self, key: &ResizeRequestKey) -> ResizeOutcome {
        match self.transform(key) {
            Ok((blob, resize_time, encoding_time)) => {
                debug!(
                    worker = self.id,
                    key = %key,
                    blob_size = blob.len(),
                    resize_us = resize_time.as_micros() as u64,
                    encoding_us = encoding_time.as_micros() as u64,
                    "transformation finished"
                );
                ResizeOutcome::Success {
                    blob,
                    resize_time,
                    encoding_time,
                }
            }
            Err(err) => ResizeOutcome::Failure {
                reason: err.to_string(),
            },
        }
    }

    fn transform(
        &self,
        key: &ResizeRequestKey,
    ) -> Result<(Blob, std::time::Duration, std::time::Duration), TransformError> {
        let path = self.full_path(key.path());
        let image = image::open(&path).map_err(|err| match err {
            image::ImageError::IoError(io) => TransformError::Io(io),
            other => TransformError::Decode(other),
        })?;

        let resize_started = Instant::now();
        let image = apply_resize(image, key.params())?;
        let resize_time = resize_started.elapsed();

        let encoding_started = Instant::now();
        let blob = encode(image, key.format())?;
        let encoding_time = encoding_started.elapsed();

        Ok((blob, resize_time, encoding_time))
    }

    fn full_path(&self, request_path: &str) -> PathBuf {
        self.root_dir.join(request_path.trim_start_matches('/'))
    }
}

fn apply_resize(
    image: DynamicImage,
    params: ResizeParams,
) -> Result<DynamicImage, TransformError> {
    if params == ResizeParams::KeepOriginal {
        return Ok(image);
    }

    let (width, height) = result_dimensions(image.width(), image.height(), params);
    check_result_size(width, height)?;

    Ok(image.resize_exact(width, height, FilterType::Lanczos3))
}

fn encode(image: DynamicImage, format: ImageFormat) -> Result<Blob, TransformError> {
    // Codecs are picky about pixel layouts: JPEG has no alpha channel,
    // GIF and WebP encoders accept RGBA only.
    let image = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
        ImageFormat::Gif | ImageFormat::Webp => DynamicImage::ImageRgba8(image.to_rgba8()),
        ImageFormat::Png => image,
    };

    let target = match format {
        ImageFormat::Jpeg => image::ImageFormat::Jpeg,
        ImageFormat::Png => image::ImageFormat::Png,
        ImageFormat::Gif => image::ImageFormat::Gif,
        ImageFormat::Webp => image::ImageFormat::WebP,
    };

    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, target)
        .map_err(TransformError::Encode)?;

    Ok(Blob::new(Bytes::from(buffer.into_inner())))
}
