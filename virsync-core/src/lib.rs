//! Idempotent reconciliation of declaratively-described cluster resources.
//!
//! One reconciliation run is a strict pipeline: fetch current state,
//! normalize the desired document, diff the two into a [`ChangeSet`],
//! apply the operations in order (waiting out asynchronous tasks), and
//! report an [`Outcome`] with a `changed` flag and a before/after diff.
//! Re-running a converged document is always a no-op.

pub mod changeset;
pub mod diff;
pub mod error;
pub mod executor;
pub mod outcome;
pub mod resources;

pub use changeset::{ChangeSet, Operation};
pub use error::{ReconcileError, Result};
pub use executor::{Applied, ExecFailure, OpReport};
pub use outcome::{Diff, Outcome};
pub use resources::{DesiredDocument, ReconcileOptions, State, reconcile_document};
