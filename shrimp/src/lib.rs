//! Shrimp - HTTP service for on-the-fly image resizing
//!
//! This library provides the core functionality for serving resized image
//! variants over HTTP. A client requests an image by path with resize
//! parameters in the query string; the service loads the source image from
//! a local root directory, produces a transformed variant, and streams it
//! back. Repeated requests for the same (path, format, parameters) triple
//! are served from an in-memory cache.
//!
//! # Architecture
//!
//! The heart of the service is the [`manager`] module: a single-writer
//! coordinator that owns the content cache, the pending and in-progress
//! request queues, and the free-worker stack. It coalesces identical
//! requests into one transformation, fans the result out to every waiter,
//! and runs time- and size-based cache eviction.
//!
//! ```text
//! HTTP adapter ──ResizeRequest──► manager ──WorkerJob──► worker
//!      ▲                            │  ▲                    │
//!      └────────responses───────────┘  └────ResizeResult────┘
//! ```
//!
//! For most use cases the [`service`] module provides the wiring:
//!
//! ```ignore
//! use shrimp::config::AppConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = AppConfig::default();
//! shrimp::service::run(config, CancellationToken::new()).await?;
//! ```

pub mod cache;
pub mod config;
pub mod http;
pub mod logging;
pub mod manager;
pub mod service;
pub mod transform;
pub mod worker;

/// Version of the shrimp library and CLI.
///
/// This is synchronized across all components in the workspace.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
