//! Asynchronous task polling.
//!
//! Every mutating call answers with a task tag. The caller polls
//! `GET /rest/v1/TaskTag/{tag}` until the task reaches a terminal state,
//! with a bounded total wait. A submitted task is not revocable from here:
//! on timeout we stop waiting and the cluster finishes on its own.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::api::ClusterApi;
use crate::error::{ApiError, Result};

/// Handle returned by mutating API calls.
///
/// `task_tag` is empty when the cluster applied the change synchronously;
/// `created_uuid` is empty for updates and deletes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskHandle {
    #[serde(default)]
    pub task_tag: String,
    #[serde(default, rename = "createdUUID")]
    pub created_uuid: String,
}

impl TaskHandle {
    pub fn created_uuid(&self) -> Option<&str> {
        if self.created_uuid.is_empty() {
            None
        } else {
            Some(&self.created_uuid)
        }
    }
}

/// Task lifecycle states reported by the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Uninitialized,
    Queued,
    Running,
    Complete,
    Error,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Complete | TaskState::Error)
    }
}

/// Status record for a task tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub state: TaskState,
    #[serde(default)]
    pub formatted_description: Option<String>,
}

/// Bounds for the poll loop.
#[derive(Debug, Clone)]
pub struct TaskWaitOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for TaskWaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Poll a task until it reaches a terminal state.
///
/// Returns immediately for handles without a task tag (synchronous
/// operations). Fails with [`ApiError::TaskFailed`] on the ERROR state and
/// [`ApiError::TaskTimeout`] when the bound is exceeded.
pub async fn wait_task(
    api: &dyn ClusterApi,
    handle: &TaskHandle,
    opts: &TaskWaitOptions,
) -> Result<()> {
    if handle.task_tag.is_empty() {
        return Ok(());
    }

    let deadline = Instant::now() + opts.timeout;
    loop {
        let status = api.task_status(&handle.task_tag).await?;
        debug!(tag = %handle.task_tag, state = ?status.state, "Polled task");

        match status.state {
            TaskState::Complete => return Ok(()),
            TaskState::Error => {
                return Err(ApiError::TaskFailed {
                    tag: handle.task_tag.clone(),
                    detail: status
                        .formatted_description
                        .unwrap_or_else(|| "task reported ERROR".to_string()),
                });
            }
            _ => {
                if Instant::now() >= deadline {
                    return Err(ApiError::TaskTimeout {
                        tag: handle.task_tag.clone(),
                        waited_secs: opts.timeout.as_secs(),
                    });
                }
                tokio::time::sleep(opts.poll_interval).await;
            }
        }
    }
}
