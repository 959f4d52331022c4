//! The transform manager actor.
//!
//! All coordination state lives in one place and is mutated by exactly
//! one task: the manager owns the content cache, the pending and
//! in-progress request queues, and the free-worker stack. Handlers run
//! to completion one message at a time, so none of the structures need
//! locking. The manager never blocks; eviction and timeout sweeps arrive
//! as timer ticks on the same select loop as the messages.

use super::config::ManagerConfig;
use super::messages::{
    ImageReply, ImageResponder, ManagerMessage, PendingRequest, ProcessingTiming, PurgeReply,
    PurgeResponder, ResizeOutcome,
};
use crate::cache::{KeyedQueue, TimedCache};
use crate::http::ImageSource;
use crate::transform::{Blob, ImageFormat, ResizeParams, ResizeRequestKey};
use crate::worker::{WorkerHandle, WorkerJob};
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Environment variable holding the shared admin token for cache purges.
pub const ADMIN_TOKEN_ENV: &str = "SHRIMP_ADMIN_TOKEN";

/// The transformation manager.
///
/// Holds a cache of transformed images; a request whose key is already
/// cached is answered immediately. Otherwise the request joins the queue
/// for its key: the in-progress queue if a worker is already computing
/// that key, the pending queue if not. When a worker frees up, all
/// requests for the oldest pending key migrate to in-progress and the
/// worker receives one job; when the result comes back it is fanned out
/// to every waiter at once.
///
/// Requests stuck in the pending queue beyond their allowance are
/// rejected by a periodic sweep, and another periodic sweep drops cache
/// entries that have not been touched for too long.
pub struct TransformManager {
    config: ManagerConfig,
    cache: TimedCache<ResizeRequestKey, Blob>,
    cache_bytes: u64,
    pending: KeyedQueue<ResizeRequestKey, PendingRequest>,
    in_progress: KeyedQueue<ResizeRequestKey, PendingRequest>,
    /// Every worker in the pool, by id. A worker is free iff its id is
    /// on the `free_workers` stack.
    workers: HashMap<usize, WorkerHandle>,
    /// LIFO on purpose: the most recently used worker goes out first.
    free_workers: Vec<usize>,
    self_tx: mpsc::UnboundedSender<ManagerMessage>,
    rx: mpsc::UnboundedReceiver<ManagerMessage>,
}

impl TransformManager {
    /// Create a manager owning the given worker pool.
    ///
    /// Returns the manager and the sender used by the HTTP adapter (and
    /// cloned into worker jobs for replies). Worker ids must be unique.
    pub fn new(
        config: ManagerConfig,
        workers: Vec<WorkerHandle>,
    ) -> (Self, mpsc::UnboundedSender<ManagerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let free_workers: Vec<usize> = workers.iter().map(WorkerHandle::id).collect();
        let workers: HashMap<usize, WorkerHandle> =
            workers.into_iter().map(|w| (w.id(), w)).collect();

        let manager = Self {
            config,
            cache: TimedCache::new(),
            cache_bytes: 0,
            pending: KeyedQueue::new(),
            in_progress: KeyedQueue::new(),
            workers,
            free_workers,
            self_tx: tx.clone(),
            rx,
        };

        (manager, tx)
    }

    /// Run until the token is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let start = tokio::time::Instant::now();
        let mut clear_cache = tokio::time::interval_at(
            start + self.config.clear_cache_period,
            self.config.clear_cache_period,
        );
        let mut check_pending = tokio::time::interval_at(
            start + self.config.check_pending_period,
            self.config.check_pending_period,
        );

        info!(workers = self.workers.len(), "transform manager started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("transform manager stopped");
                    break;
                }

                message = self.rx.recv() => match message {
                    Some(message) => self.handle_message(message),
                    None => break,
                },

                _ = clear_cache.tick() => self.evict_stale_entries(),

                _ = check_pending.tick() => self.expire_pending_requests(),
            }
        }
    }

    fn handle_message(&mut self, message: ManagerMessage) {
        match message {
            ManagerMessage::ResizeRequest {
                responder,
                path,
                format,
                params,
            } => self.on_resize_request(responder, path, format, params),
            ManagerMessage::ResizeResult {
                worker_id,
                key,
                outcome,
            } => self.on_resize_result(worker_id, key, outcome),
            ManagerMessage::DeleteCacheRequest { responder, token } => {
                self.on_delete_cache_request(responder, token)
            }
            ManagerMessage::NegativeDeleteCacheResponse { responder, text } => {
                self.on_negative_delete_cache_response(responder, text)
            }
        }
    }

    fn on_resize_request(
        &mut self,
        responder: ImageResponder,
        path: String,
        format: ImageFormat,
        params: ResizeParams,
    ) {
        let key = ResizeRequestKey::new(path, format, params);
        trace!(key = %key, "request received");

        if let Some(handle) = self.cache.lookup(&key) {
            debug!(key = %key, "transformed image is present in cache");

            // Every access keeps the entry young.
            self.cache.update_access_time(handle);
            let blob = self.cache.value(handle).clone();

            respond(
                responder,
                ImageReply::Image {
                    blob,
                    format,
                    source: ImageSource::Cache,
                    timing: None,
                },
            );
        } else {
            self.on_not_cached(key, PendingRequest { responder, format });
        }
    }

    fn on_not_cached(&mut self, key: ResizeRequestKey, request: PendingRequest) {
        if self.in_progress.has_key(&key) {
            // A worker is already computing exactly this output; register
            // to be notified when it completes.
            debug!(key = %key, "same request is already in progress");
            self.in_progress.insert(key, request);
        } else if self.pending.has_key(&key) {
            debug!(key = %key, "same request is already pending");
            self.pending.insert(key, request);
        } else if self.pending.unique_keys_count() < self.config.max_pending {
            debug!(key = %key, "storing request in the pending queue");
            self.pending.insert(key, request);
            self.try_dispatch();
        } else {
            warn!(key = %key, "request rejected because of overload");
            respond(request.responder, ImageReply::Overloaded);
        }
    }

    /// Match free workers with pending keys, oldest key first.
    fn try_dispatch(&mut self) {
        loop {
            if self.free_workers.is_empty() {
                break;
            }
            let Some(handle) = self.pending.oldest() else {
                break;
            };
            let key = self.pending.key(handle).clone();

            // All values for the key move together; the extraction
            // detaches the whole chain before reinserting, so a partial
            // migration cannot be observed.
            let pending = &mut self.pending;
            let in_progress = &mut self.in_progress;
            pending.extract_values_for_key(handle, |request| {
                in_progress.insert(key.clone(), request);
            });

            let Some(worker_id) = self.free_workers.pop() else {
                break;
            };

            trace!(key = %key, worker = worker_id, "initiating processing of a request");

            let job = WorkerJob {
                key: key.clone(),
                reply_to: self.self_tx.clone(),
            };
            let delivered = self
                .workers
                .get(&worker_id)
                .map(|worker| worker.send(job).is_ok())
                .unwrap_or(false);
            if !delivered {
                // The worker thread is gone; nothing will ever complete
                // this key, so its waiters must not be left hanging.
                error!(worker = worker_id, key = %key, "worker is unreachable");
                self.fail_waiters(&key);
            }
        }
    }

    fn on_resize_result(
        &mut self,
        worker_id: usize,
        key: ResizeRequestKey,
        outcome: ResizeOutcome,
    ) {
        trace!(key = %key, worker = worker_id, "resize result received");

        // The worker is returned to the pool and dispatch retried before
        // the fan-out below, so response writing cannot delay the next
        // transformation.
        if self.workers.contains_key(&worker_id) {
            self.free_workers.push(worker_id);
        } else {
            warn!(worker = worker_id, "result from a worker outside the pool");
        }
        self.try_dispatch();

        let Some(handle) = self.in_progress.find_first_for_key(&key) else {
            warn!(key = %key, "resize result for a key with no waiters");
            return;
        };
        let mut requests = Vec::new();
        self.in_progress
            .extract_values_for_key(handle, |request| requests.push(request));

        match outcome {
            ResizeOutcome::Success {
                blob,
                resize_time,
                encoding_time,
            } => {
                debug!(key = %key, blob_size = blob.len(), "successful resize result");

                self.store_in_cache(key.clone(), blob.clone());

                let timing = ProcessingTiming {
                    resize: resize_time,
                    encoding: encoding_time,
                };
                for request in requests {
                    trace!(key = %key, "sending positive response back");
                    respond(
                        request.responder,
                        ImageReply::Image {
                            blob: blob.clone(),
                            format: request.format,
                            source: ImageSource::Transform,
                            timing: Some(timing),
                        },
                    );
                }
            }
            ResizeOutcome::Failure { reason } => {
                warn!(key = %key, reason = %reason, "failed resize");

                for request in requests {
                    trace!(key = %key, "sending negative response back");
                    respond(request.responder, ImageReply::NotFound);
                }
            }
        }
    }

    /// Insert a blob and evict oldest entries beyond the byte budget.
    ///
    /// At least one entry always survives, so a blob bigger than the
    /// whole budget still gets cached.
    fn store_in_cache(&mut self, key: ResizeRequestKey, blob: Blob) {
        let new_total = self.cache_bytes + blob.len() as u64;
        self.cache.insert(key, blob);
        self.cache_bytes = new_total;

        while self.cache_bytes > self.config.max_cache_bytes && self.cache.len() > 1 {
            let oldest = match self.cache.oldest() {
                Some(oldest) => oldest,
                None => break,
            };
            self.cache_bytes -= self.cache.value(oldest).len() as u64;
            debug!(key = %self.cache.key(oldest), "evicting cache entry, size budget exceeded");
            self.cache.erase(oldest);
        }
    }

    /// Drop cache entries untouched for longer than the configured age.
    ///
    /// The chronological ordering lets the sweep stop at the first entry
    /// young enough to keep.
    fn evict_stale_entries(&mut self) {
        let Some(threshold) = Instant::now().checked_sub(self.config.max_cache_age) else {
            return;
        };

        while let Some(oldest) = self.cache.oldest() {
            if self.cache.access_time(oldest) < threshold {
                self.cache_bytes -= self.cache.value(oldest).len() as u64;
                debug!(key = %self.cache.key(oldest), "evicting cache entry, too old");
                self.cache.erase(oldest);
            } else {
                break;
            }
        }
    }

    /// Reject pending requests that have waited beyond their allowance.
    ///
    /// In-progress requests are exempt: once a worker has started, the
    /// caller waits for the result.
    fn expire_pending_requests(&mut self) {
        let Some(threshold) = Instant::now().checked_sub(self.config.max_pending_time) else {
            return;
        };

        while let Some(oldest) = self.pending.oldest() {
            if self.pending.access_time(oldest) < threshold {
                let key = self.pending.key(oldest).clone();
                warn!(key = %key, "rejecting pending request, waited too long");

                let request = self.pending.erase(oldest);
                respond(request.responder, ImageReply::TimedOut);
            } else {
                break;
            }
        }
    }

    fn on_delete_cache_request(&mut self, responder: PurgeResponder, token: String) {
        warn!("delete cache request received");

        match std::env::var(ADMIN_TOKEN_ENV) {
            Ok(admin_token) if !admin_token.is_empty() => {
                if token == admin_token {
                    self.cache.clear();
                    self.cache_bytes = 0;

                    info!("cache deleted");
                    respond_purge(responder, PurgeReply::Deleted);
                } else {
                    error!("invalid token value for delete cache request");
                    self.delay_negative_response(responder, "Token value mismatch\r\n");
                }
            }
            _ => {
                warn!("delete cache cannot be performed, no admin token defined");
                self.delay_negative_response(responder, "No admin token defined\r\n");
            }
        }
    }

    /// Charge every failed purge authentication a fixed wall-clock delay.
    ///
    /// The response is a delayed self-message, so the manager never
    /// sleeps; the reply is produced when the message comes back around.
    fn delay_negative_response(&self, responder: PurgeResponder, text: &str) {
        let tx = self.self_tx.clone();
        let delay = self.config.negative_auth_delay;
        let text = text.to_string();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(ManagerMessage::NegativeDeleteCacheResponse { responder, text });
        });
    }

    fn on_negative_delete_cache_response(&mut self, responder: PurgeResponder, text: String) {
        debug!("sending negative response to delete cache request");
        respond_purge(responder, PurgeReply::Forbidden(text));
    }

    fn fail_waiters(&mut self, key: &ResizeRequestKey) {
        if let Some(handle) = self.in_progress.find_first_for_key(key) {
            let mut requests = Vec::new();
            self.in_progress
                .extract_values_for_key(handle, |request| requests.push(request));
            for request in requests {
                respond(request.responder, ImageReply::NotFound);
            }
        }
    }
}

fn respond(responder: ImageResponder, reply: ImageReply) {
    // A closed receiver means the client disconnected; drop the reply.
    let _ = responder.send(reply);
}

fn respond_purge(responder: PurgeResponder, reply: PurgeReply) {
    let _ = responder.send(reply);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;
    use tokio::sync::{mpsc::UnboundedReceiver, oneshot};

    fn test_config() -> ManagerConfig {
        ManagerConfig::default()
    }

    fn key(path: &str) -> ResizeRequestKey {
        ResizeRequestKey::new(path, ImageFormat::Png, ResizeParams::ByWidth(200))
    }

    fn blob(size: usize) -> Blob {
        Blob::new(Bytes::from(vec![0u8; size]))
    }

    fn fake_workers(count: usize) -> (Vec<WorkerHandle>, Vec<UnboundedReceiver<WorkerJob>>) {
        let mut handles = Vec::new();
        let mut receivers = Vec::new();
        for id in 0..count {
            let (tx, rx) = mpsc::unbounded_channel();
            handles.push(WorkerHandle::new(id, tx));
            receivers.push(rx);
        }
        (handles, receivers)
    }

    fn manager(
        config: ManagerConfig,
        workers: usize,
    ) -> (TransformManager, Vec<UnboundedReceiver<WorkerJob>>) {
        let (handles, receivers) = fake_workers(workers);
        let (manager, _tx) = TransformManager::new(config, handles);
        (manager, receivers)
    }

    fn admit(manager: &mut TransformManager, path: &str) -> oneshot::Receiver<ImageReply> {
        let (tx, rx) = oneshot::channel();
        manager.on_resize_request(
            tx,
            path.to_string(),
            ImageFormat::Png,
            ResizeParams::ByWidth(200),
        );
        rx
    }

    fn pool_invariant(manager: &TransformManager, pool_size: usize) {
        assert_eq!(
            manager.free_workers.len() + manager.in_progress.unique_keys_count(),
            pool_size
        );
    }

    #[test]
    fn cache_hit_is_served_immediately() {
        let (mut manager, _) = manager(test_config(), 0);
        manager.store_in_cache(key("/a.png"), blob(10));

        let mut rx = admit(&mut manager, "/a.png");

        match rx.try_recv().unwrap() {
            ImageReply::Image { source, timing, .. } => {
                assert_eq!(source, ImageSource::Cache);
                assert!(timing.is_none());
            }
            other => panic!("unexpected reply: {other:?}"),
        }
        assert!(manager.pending.is_empty());
        assert!(manager.in_progress.is_empty());
    }

    #[test]
    fn first_request_is_dispatched() {
        let (mut manager, mut workers) = manager(test_config(), 1);

        let mut rx = admit(&mut manager, "/a.png");

        let job = workers[0].try_recv().unwrap();
        assert_eq!(job.key, key("/a.png"));
        assert!(manager.in_progress.has_key(&key("/a.png")));
        assert!(manager.pending.is_empty());
        assert!(rx.try_recv().is_err());
        pool_invariant(&manager, 1);
    }

    #[test]
    fn identical_request_joins_in_progress_without_new_job() {
        let (mut manager, mut workers) = manager(test_config(), 1);

        let _rx1 = admit(&mut manager, "/a.png");
        let _rx2 = admit(&mut manager, "/a.png");

        assert!(workers[0].try_recv().is_ok());
        assert!(
            workers[0].try_recv().is_err(),
            "coalesced request must not spawn a job"
        );
        assert_eq!(manager.in_progress.len(), 2);
        assert!(
            !manager.pending.has_key(&key("/a.png")),
            "a key is never in pending and in-progress at once"
        );
    }

    #[test]
    fn distinct_key_queues_when_no_worker_is_free() {
        let (mut manager, mut workers) = manager(test_config(), 1);

        let _rx1 = admit(&mut manager, "/a.png");
        let _rx2 = admit(&mut manager, "/b.png");

        assert!(workers[0].try_recv().is_ok());
        assert!(workers[0].try_recv().is_err());
        assert!(manager.pending.has_key(&key("/b.png")));
        assert!(manager.in_progress.has_key(&key("/a.png")));
        pool_invariant(&manager, 1);
    }

    #[test]
    fn completion_fans_out_to_all_waiters() {
        let (mut manager, _workers) = manager(test_config(), 1);

        let mut rx1 = admit(&mut manager, "/a.png");
        let mut rx2 = admit(&mut manager, "/a.png");

        manager.on_resize_result(
            0,
            key("/a.png"),
            ResizeOutcome::Success {
                blob: blob(42),
                resize_time: Duration::from_micros(1500),
                encoding_time: Duration::from_micros(500),
            },
        );

        for rx in [&mut rx1, &mut rx2] {
            match rx.try_recv().unwrap() {
                ImageReply::Image {
                    blob,
                    source,
                    timing,
                    ..
                } => {
                    assert_eq!(blob.len(), 42);
                    assert_eq!(source, ImageSource::Transform);
                    let timing = timing.unwrap();
                    assert_eq!(timing.resize, Duration::from_micros(1500));
                    assert_eq!(timing.total(), Duration::from_micros(2000));
                }
                other => panic!("unexpected reply: {other:?}"),
            }
        }

        assert!(manager.in_progress.is_empty());
        assert_eq!(manager.cache.len(), 1);
        assert_eq!(manager.cache_bytes, 42);
        pool_invariant(&manager, 1);
    }

    #[test]
    fn freed_worker_is_redispatched_before_fan_out() {
        let (mut manager, mut workers) = manager(test_config(), 1);

        let _rx1 = admit(&mut manager, "/a.png");
        let _rx2 = admit(&mut manager, "/b.png");
        assert!(workers[0].try_recv().is_ok());

        manager.on_resize_result(
            0,
            key("/a.png"),
            ResizeOutcome::Success {
                blob: blob(10),
                resize_time: Duration::ZERO,
                encoding_time: Duration::ZERO,
            },
        );

        // The worker freed by /a.png immediately picked up /b.png.
        let job = workers[0].try_recv().unwrap();
        assert_eq!(job.key, key("/b.png"));
        assert!(manager.in_progress.has_key(&key("/b.png")));
        assert!(manager.pending.is_empty());
        pool_invariant(&manager, 1);
    }

    #[test]
    fn failure_sends_not_found_to_all_waiters() {
        let (mut manager, _workers) = manager(test_config(), 1);

        let mut rx1 = admit(&mut manager, "/a.png");
        let mut rx2 = admit(&mut manager, "/a.png");

        manager.on_resize_result(
            0,
            key("/a.png"),
            ResizeOutcome::Failure {
                reason: "decode error".to_string(),
            },
        );

        assert!(matches!(rx1.try_recv().unwrap(), ImageReply::NotFound));
        assert!(matches!(rx2.try_recv().unwrap(), ImageReply::NotFound));
        assert!(manager.cache.is_empty());
        assert_eq!(manager.cache_bytes, 0);
    }

    #[test]
    fn overload_rejects_excess_unique_keys() {
        let config = ManagerConfig {
            max_pending: 2,
            ..test_config()
        };
        let (mut manager, _) = manager(config, 0);

        let _rx1 = admit(&mut manager, "/a.png");
        let _rx2 = admit(&mut manager, "/b.png");
        let mut rx3 = admit(&mut manager, "/c.png");

        assert!(matches!(rx3.try_recv().unwrap(), ImageReply::Overloaded));
        assert_eq!(manager.pending.unique_keys_count(), 2);
    }

    #[test]
    fn repeated_key_is_not_counted_against_pending_limit() {
        let config = ManagerConfig {
            max_pending: 2,
            ..test_config()
        };
        let (mut manager, _) = manager(config, 0);

        let _rx1 = admit(&mut manager, "/a.png");
        let _rx2 = admit(&mut manager, "/b.png");
        let mut rx3 = admit(&mut manager, "/a.png");

        assert!(rx3.try_recv().is_err(), "duplicate key joins its queue");
        assert_eq!(manager.pending.unique_keys_count(), 2);
        assert_eq!(manager.pending.len(), 3);
    }

    #[test]
    fn size_eviction_keeps_total_under_budget() {
        let config = ManagerConfig {
            max_cache_bytes: 100,
            ..test_config()
        };
        let (mut manager, _) = manager(config, 0);

        manager.store_in_cache(key("/a.png"), blob(60));
        std::thread::sleep(Duration::from_millis(2));
        manager.store_in_cache(key("/b.png"), blob(60));

        assert_eq!(manager.cache.len(), 1);
        assert_eq!(manager.cache_bytes, 60);
        assert!(manager.cache.lookup(&key("/b.png")).is_some());
    }

    #[test]
    fn size_eviction_follows_access_order() {
        let config = ManagerConfig {
            max_cache_bytes: 100,
            ..test_config()
        };
        let (mut manager, _) = manager(config, 0);

        manager.store_in_cache(key("/a.png"), blob(40));
        std::thread::sleep(Duration::from_millis(2));
        manager.store_in_cache(key("/b.png"), blob(40));
        std::thread::sleep(Duration::from_millis(2));

        // Touching /a.png makes /b.png the eviction candidate.
        let mut rx = admit(&mut manager, "/a.png");
        assert!(rx.try_recv().is_ok());
        std::thread::sleep(Duration::from_millis(2));

        manager.store_in_cache(key("/c.png"), blob(40));

        assert!(manager.cache.lookup(&key("/a.png")).is_some());
        assert!(manager.cache.lookup(&key("/b.png")).is_none());
        assert!(manager.cache.lookup(&key("/c.png")).is_some());
        assert_eq!(manager.cache_bytes, 80);
    }

    #[test]
    fn oversized_blob_survives_alone() {
        let config = ManagerConfig {
            max_cache_bytes: 100,
            ..test_config()
        };
        let (mut manager, _) = manager(config, 0);

        manager.store_in_cache(key("/big.png"), blob(500));

        assert_eq!(manager.cache.len(), 1);
        assert_eq!(manager.cache_bytes, 500);
    }

    #[test]
    fn age_sweep_evicts_stale_entries() {
        let config = ManagerConfig {
            max_cache_age: Duration::ZERO,
            ..test_config()
        };
        let (mut manager, _) = manager(config, 0);

        manager.store_in_cache(key("/a.png"), blob(10));
        manager.store_in_cache(key("/b.png"), blob(20));
        std::thread::sleep(Duration::from_millis(2));

        manager.evict_stale_entries();

        assert!(manager.cache.is_empty());
        assert_eq!(manager.cache_bytes, 0);
    }

    #[test]
    fn age_sweep_keeps_young_entries() {
        let (mut manager, _) = manager(test_config(), 0);

        manager.store_in_cache(key("/a.png"), blob(10));
        manager.evict_stale_entries();

        assert_eq!(manager.cache.len(), 1);
        assert_eq!(manager.cache_bytes, 10);
    }

    #[test]
    fn pending_sweep_times_out_old_requests() {
        let config = ManagerConfig {
            max_pending_time: Duration::ZERO,
            ..test_config()
        };
        let (mut manager, _) = manager(config, 0);

        let mut rx = admit(&mut manager, "/a.png");
        std::thread::sleep(Duration::from_millis(2));

        manager.expire_pending_requests();

        assert!(matches!(rx.try_recv().unwrap(), ImageReply::TimedOut));
        assert!(manager.pending.is_empty());
    }

    #[test]
    fn in_progress_requests_are_never_timed_out() {
        let config = ManagerConfig {
            max_pending_time: Duration::ZERO,
            ..test_config()
        };
        let (mut manager, _workers) = manager(config, 1);

        let mut rx = admit(&mut manager, "/a.png");
        std::thread::sleep(Duration::from_millis(2));

        manager.expire_pending_requests();

        assert!(rx.try_recv().is_err());
        assert!(manager.in_progress.has_key(&key("/a.png")));
    }

    #[tokio::test]
    async fn delete_cache_authentication_paths() {
        let config = ManagerConfig {
            negative_auth_delay: Duration::from_millis(20),
            ..test_config()
        };
        let (mut manager, _) = manager(config, 0);
        manager.store_in_cache(key("/a.png"), blob(10));

        // No token defined in the environment.
        std::env::remove_var(ADMIN_TOKEN_ENV);
        let (tx, rx) = oneshot::channel();
        manager.on_delete_cache_request(tx, "whatever".to_string());
        let message = manager.rx.recv().await.unwrap();
        manager.handle_message(message);
        assert_eq!(
            rx.await.unwrap(),
            PurgeReply::Forbidden("No admin token defined\r\n".to_string())
        );
        assert_eq!(manager.cache.len(), 1);

        // Token mismatch.
        std::env::set_var(ADMIN_TOKEN_ENV, "sekret");
        let (tx, rx) = oneshot::channel();
        let started = Instant::now();
        manager.on_delete_cache_request(tx, "wrong".to_string());
        let message = manager.rx.recv().await.unwrap();
        manager.handle_message(message);
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(
            rx.await.unwrap(),
            PurgeReply::Forbidden("Token value mismatch\r\n".to_string())
        );
        assert_eq!(manager.cache.len(), 1);

        // Token match clears the cache synchronously.
        let (tx, rx) = oneshot::channel();
        manager.on_delete_cache_request(tx, "sekret".to_string());
        assert_eq!(rx.await.unwrap(), PurgeReply::Deleted);
        assert!(manager.cache.is_empty());
        assert_eq!(manager.cache_bytes, 0);

        std::env::remove_var(ADMIN_TOKEN_ENV);
    }
}
