//! The result document returned to the caller.

use serde::Serialize;
use serde_json::Value;

use crate::executor::OpReport;

/// Before/after snapshots of the reconciled resource.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diff {
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// Structured outcome of one reconciliation run.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    /// True iff at least one operation was applied.
    pub changed: bool,
    /// True when the run stopped on an error; `msg` carries the detail and
    /// `changed` still reflects the operations applied before the failure.
    pub failed: bool,
    /// The resulting record, re-fetched after execution so server-assigned
    /// fields (uuid, computed values) are included. `None` after deletion.
    pub record: Option<Value>,
    pub diff: Diff,
    pub msg: Option<String>,
}

impl Outcome {
    /// Nothing to do: the snapshot is passed through unmodified.
    pub fn unchanged(record: Option<Value>) -> Self {
        Self {
            changed: false,
            failed: false,
            diff: Diff {
                before: record.clone(),
                after: record.clone(),
            },
            record,
            msg: None,
        }
    }

    /// Operations were applied and the resource now matches `after`.
    pub fn converged(before: Option<Value>, after: Option<Value>) -> Self {
        Self {
            changed: true,
            failed: false,
            record: after.clone(),
            diff: Diff { before, after },
            msg: None,
        }
    }

    pub fn with_msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = Some(msg.into());
        self
    }

    /// Execution stopped mid-ChangeSet. Already-applied operations are not
    /// rolled back; convergence comes from re-running the reconciliation.
    pub fn failure(before: Option<Value>, applied: &[OpReport], error: impl std::fmt::Display) -> Self {
        let msg = if applied.is_empty() {
            format!("{}", error)
        } else {
            let done: Vec<String> = applied.iter().map(OpReport::describe).collect();
            format!("{} (applied before failure: {})", error, done.join(", "))
        };
        Self {
            changed: !applied.is_empty(),
            failed: true,
            record: None,
            diff: Diff {
                before,
                after: None,
            },
            msg: Some(msg),
        }
    }
}
