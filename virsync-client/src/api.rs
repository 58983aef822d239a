//! The narrow API contract the reconciliation engine depends on.
//!
//! One method per remote primitive: collection list, singular get, create,
//! partial update, delete, power-style action, raw content upload, and task
//! status. [`crate::HttpClient`] binds this to HTTP; test suites substitute
//! an in-memory fake.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::task::{TaskHandle, TaskStatus};

/// Resource collection names under `/rest/v1/`.
pub mod endpoints {
    pub const VIR_DOMAIN: &str = "VirDomain";
    pub const VIR_DOMAIN_ACTION: &str = "VirDomain/action";
    pub const BLOCK_DEVICE: &str = "VirDomainBlockDevice";
    pub const NET_DEVICE: &str = "VirDomainNetDevice";
    pub const SNAPSHOT_SCHEDULE: &str = "VirDomainSnapshotSchedule";
    pub const REPLICATION: &str = "VirDomainReplication";
    pub const ISO: &str = "ISO";
    pub const NODE: &str = "Node";
    pub const TASK_TAG: &str = "TaskTag";
}

/// Typed request/response contract against the cluster.
///
/// Read calls are side-effect free. Mutating calls return a [`TaskHandle`]
/// that must be awaited with [`crate::wait_task`] before the change is
/// assumed applied.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// List records in a collection, optionally filtered by field values.
    async fn list(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Vec<Value>>;

    /// Fetch a single record by uuid; `None` when it does not exist.
    async fn get(&self, endpoint: &str, uuid: &str) -> Result<Option<Value>>;

    /// Create a record.
    async fn create(&self, endpoint: &str, payload: Value) -> Result<TaskHandle>;

    /// Apply a partial update to an existing record.
    async fn update(&self, endpoint: &str, uuid: &str, payload: Value) -> Result<TaskHandle>;

    /// Delete a record.
    async fn delete(&self, endpoint: &str, uuid: &str) -> Result<TaskHandle>;

    /// Submit an action document (e.g. a VM power action).
    async fn action(&self, endpoint: &str, payload: Value) -> Result<TaskHandle>;

    /// Upload raw content for a record (ISO image data).
    async fn upload(&self, endpoint: &str, uuid: &str, content: Vec<u8>) -> Result<TaskHandle>;

    /// Fetch the status of an asynchronous task.
    async fn task_status(&self, tag: &str) -> Result<TaskStatus>;
}
