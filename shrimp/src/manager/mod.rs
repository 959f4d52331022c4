//! The transform manager: single-writer coordination of cache, request
//! coalescing, worker scheduling, and result fan-out.
//!
//! See [`TransformManager`] for the behavioral contract and
//! [`messages`] for the message types crossing its boundary.

mod config;
mod core;
mod messages;

pub use config::ManagerConfig;
pub use core::{TransformManager, ADMIN_TOKEN_ENV};
pub use messages::{
    ImageReply, ImageResponder, ManagerMessage, PendingRequest, ProcessingTiming, PurgeReply,
    PurgeResponder, ResizeOutcome,
};
