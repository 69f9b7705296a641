//! # berth-sync
//!
//! Keeps a local view of a remote container fleet in step with the
//! orchestration API and tells the user what changed.
//!
//! - [`coordinator`]: single-flight, supersede-on-request refreshes of
//!   endpoints and containers.
//! - [`detector`]: pure diff of two snapshots into an ordered change set.
//! - [`composer`]: notification text and dedup identifier for a change set.
//! - [`store`]: last-known snapshot per endpoint with atomic replacement.
//! - [`scheduler`]: the periodic fetch, diff, notify, commit pipeline.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod composer;
pub mod coordinator;
pub mod detector;
pub mod dispatch;
pub mod event;
pub mod handle;
pub mod scheduler;
pub mod snapshot;
pub mod store;
