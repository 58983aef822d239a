//! REST client for HyperCore-style cluster management APIs.
//!
//! The cluster exposes its resources under `/rest/v1/{endpoint}` and answers
//! every mutating call with a task handle that must be polled to completion.
//! This crate provides the typed wire model, the HTTP binding, and the
//! narrow [`ClusterApi`] trait the reconciliation engine is written against.

pub mod api;
pub mod client;
pub mod error;
pub mod resources;
pub mod task;

pub use api::{ClusterApi, endpoints};
pub use client::{ClusterConfig, HttpClient};
pub use error::{ApiError, Result};
pub use task::{TaskHandle, TaskState, TaskStatus, TaskWaitOptions, wait_task};
