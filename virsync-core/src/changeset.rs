//! Atomic operations computed by the diff step.
//!
//! Each operation maps to exactly one API call. Payloads are partial
//! documents carrying only the fields to apply, so an `Update` never
//! rewrites fields the caller left unmanaged.

use serde_json::Value;

/// One create/update/delete/action/upload against a collection endpoint.
#[derive(Debug, Clone)]
pub enum Operation {
    Create {
        endpoint: String,
        payload: Value,
    },
    Update {
        endpoint: String,
        uuid: String,
        payload: Value,
    },
    Delete {
        endpoint: String,
        uuid: String,
    },
    /// Action documents (e.g. VM power actions) POSTed to an action endpoint.
    Action {
        endpoint: String,
        payload: Value,
    },
    /// Raw content upload for an existing record (ISO image data).
    Upload {
        endpoint: String,
        uuid: String,
        content: Vec<u8>,
    },
}

impl Operation {
    pub fn create(endpoint: impl Into<String>, payload: Value) -> Self {
        Operation::Create {
            endpoint: endpoint.into(),
            payload,
        }
    }

    pub fn update(endpoint: impl Into<String>, uuid: impl Into<String>, payload: Value) -> Self {
        Operation::Update {
            endpoint: endpoint.into(),
            uuid: uuid.into(),
            payload,
        }
    }

    pub fn delete(endpoint: impl Into<String>, uuid: impl Into<String>) -> Self {
        Operation::Delete {
            endpoint: endpoint.into(),
            uuid: uuid.into(),
        }
    }

    pub fn action(endpoint: impl Into<String>, payload: Value) -> Self {
        Operation::Action {
            endpoint: endpoint.into(),
            payload,
        }
    }

    pub fn upload(endpoint: impl Into<String>, uuid: impl Into<String>, content: Vec<u8>) -> Self {
        Operation::Upload {
            endpoint: endpoint.into(),
            uuid: uuid.into(),
            content,
        }
    }

    /// Short verb for logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Create { .. } => "create",
            Operation::Update { .. } => "update",
            Operation::Delete { .. } => "delete",
            Operation::Action { .. } => "action",
            Operation::Upload { .. } => "upload",
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            Operation::Create { endpoint, .. }
            | Operation::Update { endpoint, .. }
            | Operation::Delete { endpoint, .. }
            | Operation::Action { endpoint, .. }
            | Operation::Upload { endpoint, .. } => endpoint,
        }
    }

    pub fn target_uuid(&self) -> Option<&str> {
        match self {
            Operation::Update { uuid, .. }
            | Operation::Delete { uuid, .. }
            | Operation::Upload { uuid, .. } => Some(uuid),
            Operation::Create { .. } | Operation::Action { .. } => None,
        }
    }
}

/// Ordered list of operations; the planner's order is the execution order.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    ops: Vec<Operation>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: Operation) {
        self.ops.push(op);
    }

    pub fn extend(&mut self, ops: impl IntoIterator<Item = Operation>) {
        self.ops.extend(ops);
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// A run changed something iff its ChangeSet is non-empty.
    pub fn changed(&self) -> bool {
        !self.ops.is_empty()
    }

    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<Operation> {
        self.ops
    }
}

impl FromIterator<Operation> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}
