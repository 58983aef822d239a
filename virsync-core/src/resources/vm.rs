//! Whole-VM reconciliation.
//!
//! Creates or deletes a VM together with its disks, NICs, boot order and
//! power state. An existing VM is converged in phases declared in
//! dependency order: sub-resources and scalar fields first, then boot
//! order (which needs the uuids of any freshly created devices), then
//! power. The disk and NIC lists are fully managed here: devices the
//! desired document does not mention are removed.

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;
use virsync_client::resources::{PowerAction, VirDomain, VmState, join_tags};
use virsync_client::{ApiError, ClusterApi, endpoints};

use crate::changeset::{ChangeSet, Operation};
use crate::error::{ReconcileError, Result};
use crate::outcome::Outcome;
use crate::resources::boot_devices::{self, BootDeviceRef};
use crate::resources::disk::{self, DesiredDisk};
use crate::resources::nic::{self, DesiredNic};
use crate::resources::vm_params::{VmFieldPatch, patch_payload};
use crate::resources::{
    CloudInit, PowerState, ReconcileOptions, Runner, State, find_vm_by_name,
    power_action_payload, record, require_vm_by_name,
};

/// Desired state of a VM and everything attached to it.
#[derive(Debug, Deserialize)]
pub struct DesiredVm {
    pub vm_name: String,
    pub state: State,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Physical memory in bytes. Required for `state: present`.
    #[serde(default)]
    pub memory: Option<u64>,
    /// Required for `state: present`.
    #[serde(default)]
    pub vcpu: Option<u32>,
    #[serde(default)]
    pub power_state: PowerState,
    #[serde(default)]
    pub disks: Vec<DesiredDisk>,
    #[serde(default)]
    pub nics: Vec<DesiredNic>,
    /// Omitted boot order leaves the current order unmanaged.
    #[serde(default)]
    pub boot_devices: Option<Vec<BootDeviceRef>>,
    /// Attached as a NoCloud datasource at creation time only.
    #[serde(default)]
    pub cloud_init: Option<CloudInit>,
}

fn validate(desired: &DesiredVm) -> Result<()> {
    if desired.state == State::Absent {
        return Ok(());
    }
    if desired.memory.is_none() {
        return Err(ReconcileError::Validation(
            "memory is required for state: present".to_string(),
        ));
    }
    if desired.vcpu.is_none() {
        return Err(ReconcileError::Validation(
            "vcpu is required for state: present".to_string(),
        ));
    }
    disk::validate(&desired.disks)?;
    if let Some(refs) = &desired.boot_devices {
        boot_devices::validate(refs)?;
    }
    Ok(())
}

fn create_payload(desired: &DesiredVm) -> Value {
    let mut payload = json!({
        "name": desired.vm_name,
        "description": desired.description.clone().unwrap_or_default(),
        "mem": desired.memory.unwrap_or(0),
        "numVCPU": desired.vcpu.unwrap_or(0),
        "tags": join_tags(desired.tags.as_deref().unwrap_or_default()),
        "blockDevs": desired.disks.iter().map(disk::inline_payload).collect::<Vec<_>>(),
        "netDevs": desired.nics.iter().map(nic::inline_payload).collect::<Vec<_>>(),
    });
    if let Some(ci) = &desired.cloud_init
        && !ci.is_empty()
    {
        payload["cloudInitData"] = ci.to_payload();
    }
    payload
}

fn power_op(vm_uuid: &str, action: PowerAction) -> Operation {
    Operation::action(
        endpoints::VIR_DOMAIN_ACTION,
        power_action_payload(vm_uuid, action),
    )
}

pub async fn reconcile(
    api: &dyn ClusterApi,
    desired: DesiredVm,
    opts: &ReconcileOptions,
) -> Result<Outcome> {
    validate(&desired)?;
    let current = find_vm_by_name(api, &desired.vm_name).await?;

    match (desired.state, current) {
        // Delete-of-nonexistent is a no-op, never an error.
        (State::Absent, None) => Ok(Outcome::unchanged(None)),
        (State::Absent, Some(vm)) => delete_flow(api, vm, opts).await,
        (State::Present, None) => create_flow(api, &desired, opts).await,
        (State::Present, Some(vm)) => update_flow(api, &desired, vm, opts).await,
    }
}

/// A VM that is not already shut off is stopped before deletion.
async fn delete_flow(api: &dyn ClusterApi, vm: VirDomain, opts: &ReconcileOptions) -> Result<Outcome> {
    let before = record(&vm);
    info!(vm = %vm.name, state = ?vm.state, "Deleting VM");

    let mut changeset = ChangeSet::new();
    if vm.state != VmState::Shutoff {
        changeset.push(power_op(&vm.uuid, PowerAction::Stop));
    }
    changeset.push(Operation::delete(endpoints::VIR_DOMAIN, &vm.uuid));

    let mut runner = Runner::new(api, opts, before.clone());
    if let Err(outcome) = runner.run(changeset).await {
        return Ok(*outcome);
    }
    Ok(Outcome::converged(before, None))
}

async fn create_flow(
    api: &dyn ClusterApi,
    desired: &DesiredVm,
    opts: &ReconcileOptions,
) -> Result<Outcome> {
    info!(vm = %desired.vm_name, disks = desired.disks.len(), nics = desired.nics.len(), "Creating VM");
    let mut runner = Runner::new(api, opts, None);

    let mut create = ChangeSet::new();
    create.push(Operation::create(
        endpoints::VIR_DOMAIN,
        create_payload(desired),
    ));
    let created_uuid = match runner.run(create).await {
        Ok(uuid) => uuid,
        Err(outcome) => return Ok(*outcome),
    };

    // Boot order and power need the created record: device uuids are
    // assigned by the cluster and the VM comes up shut off.
    let vm = match created_uuid {
        Some(uuid) => match api.get(endpoints::VIR_DOMAIN, &uuid).await? {
            Some(value) => serde_json::from_value(value).map_err(ApiError::from)?,
            None => require_vm_by_name(api, &desired.vm_name).await?,
        },
        None => require_vm_by_name(api, &desired.vm_name).await?,
    };

    let mut follow_up = ChangeSet::new();
    if let Some(refs) = &desired.boot_devices {
        let order = boot_devices::resolve(&vm, refs)?;
        follow_up.extend(boot_devices::plan(&vm, &order));
    }
    if let Some(action) = desired.power_state.action_from(vm.state) {
        follow_up.push(power_op(&vm.uuid, action));
    }
    if let Err(outcome) = runner.run(follow_up).await {
        return Ok(*outcome);
    }

    let after = require_vm_by_name(api, &desired.vm_name).await?;
    Ok(Outcome::converged(None, record(&after)))
}

async fn update_flow(
    api: &dyn ClusterApi,
    desired: &DesiredVm,
    vm: VirDomain,
    opts: &ReconcileOptions,
) -> Result<Outcome> {
    let before = record(&vm);
    let mut runner = Runner::new(api, opts, before.clone());

    // Phase 1: sub-resource lists and scalar fields.
    let mut phase1 = ChangeSet::new();
    phase1.extend(disk::plan_items(&vm, &desired.disks, true)?);
    phase1.extend(nic::plan_items(&vm, &desired.nics, true));
    let fields = VmFieldPatch {
        description: desired.description.as_deref(),
        tags: desired.tags.as_deref(),
        memory: desired.memory,
        vcpu: desired.vcpu,
    };
    if let Some(payload) = patch_payload(&fields, &vm) {
        phase1.push(Operation::update(endpoints::VIR_DOMAIN, &vm.uuid, payload));
    }
    let devices_touched = phase1.changed();
    if let Err(outcome) = runner.run(phase1).await {
        return Ok(*outcome);
    }

    // Phase 2: boot order, re-resolved so freshly created devices count.
    let vm = if devices_touched {
        require_vm_by_name(api, &desired.vm_name).await?
    } else {
        vm
    };
    if let Some(refs) = &desired.boot_devices {
        let order = boot_devices::resolve(&vm, refs)?;
        let changeset: ChangeSet = boot_devices::plan(&vm, &order).into_iter().collect();
        if let Err(outcome) = runner.run(changeset).await {
            return Ok(*outcome);
        }
    }

    // Phase 3: power.
    if let Some(action) = desired.power_state.action_from(vm.state) {
        let mut changeset = ChangeSet::new();
        changeset.push(power_op(&vm.uuid, action));
        if let Err(outcome) = runner.run(changeset).await {
            return Ok(*outcome);
        }
    }

    if !runner.changed() {
        return Ok(Outcome::unchanged(before));
    }
    let after = require_vm_by_name(api, &desired.vm_name).await?;
    Ok(Outcome::converged(before, record(&after)))
}
