//! Applies a ChangeSet against the cluster.
//!
//! Operations run strictly in planner order, one API call each, awaiting
//! any asynchronous task before moving on. On failure the executor stops:
//! already-applied operations stay applied and are reported, and the run
//! converges on the next invocation.

use tracing::{info, warn};
use virsync_client::{ClusterApi, TaskWaitOptions, wait_task};

use crate::changeset::{ChangeSet, Operation};
use crate::error::ReconcileError;

/// What one executed operation did.
#[derive(Debug, Clone)]
pub struct OpReport {
    pub kind: &'static str,
    pub endpoint: String,
    pub uuid: Option<String>,
}

impl OpReport {
    pub fn describe(&self) -> String {
        match &self.uuid {
            Some(uuid) => format!("{} {}/{}", self.kind, self.endpoint, uuid),
            None => format!("{} {}", self.kind, self.endpoint),
        }
    }
}

/// Successful execution of a whole ChangeSet.
#[derive(Debug, Default)]
pub struct Applied {
    pub reports: Vec<OpReport>,
    /// Uuid assigned by the first `create` in the set, when the cluster
    /// reported one.
    pub created_uuid: Option<String>,
}

/// Execution stopped mid-ChangeSet; `applied` lists what went through.
#[derive(Debug)]
pub struct ExecFailure {
    pub applied: Vec<OpReport>,
    pub error: ReconcileError,
}

impl std::fmt::Display for ExecFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "execution stopped after {} operation(s): {}",
            self.applied.len(),
            self.error
        )
    }
}

impl std::error::Error for ExecFailure {}

/// Apply every operation in order, waiting out asynchronous tasks.
pub async fn apply(
    api: &dyn ClusterApi,
    changeset: ChangeSet,
    wait: &TaskWaitOptions,
) -> Result<Applied, ExecFailure> {
    let mut applied = Applied::default();

    for op in changeset.into_ops() {
        let report = OpReport {
            kind: op.kind(),
            endpoint: op.endpoint().to_string(),
            uuid: op.target_uuid().map(str::to_string),
        };
        info!(op = %report.describe(), "Applying operation");

        let result = match op {
            Operation::Create { endpoint, payload } => api.create(&endpoint, payload).await,
            Operation::Update {
                endpoint,
                uuid,
                payload,
            } => api.update(&endpoint, &uuid, payload).await,
            Operation::Delete { endpoint, uuid } => api.delete(&endpoint, &uuid).await,
            Operation::Action { endpoint, payload } => api.action(&endpoint, payload).await,
            Operation::Upload {
                endpoint,
                uuid,
                content,
            } => api.upload(&endpoint, &uuid, content).await,
        };

        let handle = match result {
            Ok(handle) => handle,
            Err(e) => {
                warn!(op = %report.describe(), error = %e, "Operation failed");
                return Err(ExecFailure {
                    applied: applied.reports,
                    error: e.into(),
                });
            }
        };

        if let Err(e) = wait_task(api, &handle, wait).await {
            warn!(op = %report.describe(), error = %e, "Task did not complete");
            return Err(ExecFailure {
                applied: applied.reports,
                error: e.into(),
            });
        }

        if report.kind == "create" && applied.created_uuid.is_none() {
            applied.created_uuid = handle.created_uuid().map(str::to_string);
        }
        applied.reports.push(report);
    }

    Ok(applied)
}
