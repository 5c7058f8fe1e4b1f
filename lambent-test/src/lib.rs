//! Test utilities for Lambent
//!
//! Provides the host side of the Lambda Runtime API for integration
//! testing:
//! - Start a local Runtime API on an ephemeral port
//! - Queue invocations with controlled headers and payloads
//! - Record responses, invocation errors and init errors
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lambent_test::{LocalRuntimeApi, QueuedInvocation};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! async fn example() {
//!     let host = LocalRuntimeApi::start().await.unwrap();
//!
//!     // Point a runtime at host.endpoint(), then queue work for it.
//!     let request_id = host
//!         .enqueue(QueuedInvocation::new(json!({ "n": 1 })))
//!         .await;
//!
//!     let completion = host
//!         .wait_for_completion(&request_id, Duration::from_secs(5))
//!         .await;
//!     println!("runtime reported: {:?}", completion);
//! }
//! ```

pub mod server;

pub use server::{
    Completion, HostError, LocalRuntimeApi, QueuedInvocation, RecordedError, WireError,
};

/// Default timeout for waiting on a completion
pub const COMPLETION_TIMEOUT_SECS: u64 = 5;
