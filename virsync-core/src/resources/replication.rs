//! VM replication reconciliation.
//!
//! A VM has at most one replication record, keyed by its source domain
//! uuid. The record is created once and then toggled in place; `absent`
//! removes it entirely.

use serde::Deserialize;
use serde_json::{Value, json};
use virsync_client::resources::VirDomainReplication;
use virsync_client::{ClusterApi, endpoints};

use crate::changeset::{ChangeSet, Operation};
use crate::diff::PayloadDiff;
use crate::error::{ReconcileError, Result};
use crate::outcome::Outcome;
use crate::resources::{ReconcileOptions, Runner, State, find_vm_by_name, record};

/// Desired replication for a VM.
#[derive(Debug, Deserialize)]
pub struct DesiredReplication {
    pub vm_name: String,
    pub state: State,
    /// Remote cluster connection; required for `state: present`.
    #[serde(default)]
    pub connection_uuid: Option<String>,
    /// Replication can exist but be paused.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub label: Option<String>,
}

fn default_true() -> bool {
    true
}

async fn find_for_vm(
    api: &dyn ClusterApi,
    vm_uuid: &str,
) -> Result<Option<VirDomainReplication>> {
    let records = api
        .list(
            endpoints::REPLICATION,
            &[("sourceDomainUUID", vm_uuid.to_string())],
        )
        .await?;
    for r in records {
        let replication: VirDomainReplication =
            serde_json::from_value(r).map_err(virsync_client::ApiError::from)?;
        if replication.source_domain_uuid == vm_uuid {
            return Ok(Some(replication));
        }
    }
    Ok(None)
}

fn create_payload(vm_uuid: &str, desired: &DesiredReplication, connection: &str) -> Value {
    json!({
        "sourceDomainUUID": vm_uuid,
        "connectionUUID": connection,
        "enable": desired.enabled,
        "label": desired.label.clone().unwrap_or_default(),
    })
}

fn update_payload(desired: &DesiredReplication, current: &VirDomainReplication) -> Option<Value> {
    PayloadDiff::new()
        .field("enable", Some(&desired.enabled), &current.enable)
        .field(
            "connectionUUID",
            desired.connection_uuid.as_deref(),
            current.connection_uuid.as_str(),
        )
        .field("label", desired.label.as_deref(), current.label.as_str())
        .into_payload()
}

pub async fn reconcile(
    api: &dyn ClusterApi,
    desired: DesiredReplication,
    opts: &ReconcileOptions,
) -> Result<Outcome> {
    let vm = match (find_vm_by_name(api, &desired.vm_name).await?, desired.state) {
        (Some(vm), _) => vm,
        // Deleting replication of a VM that is gone is a no-op.
        (None, State::Absent) => return Ok(Outcome::unchanged(None)),
        (None, State::Present) => {
            return Err(ReconcileError::NotFound(format!(
                "VM named {}",
                desired.vm_name
            )));
        }
    };

    let current = find_for_vm(api, &vm.uuid).await?;
    let before = current.as_ref().and_then(record);

    let mut changeset = ChangeSet::new();
    match (desired.state, &current) {
        (State::Present, None) => {
            let connection = desired.connection_uuid.as_deref().ok_or_else(|| {
                ReconcileError::Validation(
                    "connection_uuid is required to set up replication".to_string(),
                )
            })?;
            changeset.push(Operation::create(
                endpoints::REPLICATION,
                create_payload(&vm.uuid, &desired, connection),
            ));
        }
        (State::Present, Some(current)) => {
            if let Some(payload) = update_payload(&desired, current) {
                changeset.push(Operation::update(
                    endpoints::REPLICATION,
                    &current.uuid,
                    payload,
                ));
            }
        }
        (State::Absent, Some(current)) => {
            changeset.push(Operation::delete(endpoints::REPLICATION, &current.uuid));
        }
        (State::Absent, None) => {}
    }

    if changeset.is_empty() {
        return Ok(Outcome::unchanged(before));
    }

    let mut runner = Runner::new(api, opts, before.clone());
    if let Err(outcome) = runner.run(changeset).await {
        return Ok(*outcome);
    }

    let after = find_for_vm(api, &vm.uuid).await?;
    Ok(Outcome::converged(before, after.as_ref().and_then(record)))
}
