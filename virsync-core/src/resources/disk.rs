//! Virtual disk reconciliation.
//!
//! Disks are matched by their natural key (bus type, slot). Capacity may
//! only grow; a shrink request is rejected before any API call because the
//! cluster would fail the task anyway.

use serde::Deserialize;
use serde_json::{Value, json};
use virsync_client::resources::{CacheMode, DiskType, VirDomain, VirDomainBlockDevice};
use virsync_client::{ClusterApi, endpoints};

use crate::changeset::{ChangeSet, Operation};
use crate::diff::{PayloadDiff, match_by_key};
use crate::error::{ReconcileError, Result};
use crate::outcome::Outcome;
use crate::resources::{ReconcileOptions, Runner, State, record, require_vm_by_name};

/// One desired disk. `size` is in bytes; CD-ROM entries name an ISO instead.
#[derive(Debug, Clone, Deserialize)]
pub struct DesiredDisk {
    pub disk_slot: i64,
    #[serde(rename = "type")]
    pub kind: DiskType,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub cache_mode: Option<CacheMode>,
    #[serde(default)]
    pub iso_name: Option<String>,
}

impl DesiredDisk {
    fn key(&self) -> (DiskType, i64) {
        (self.kind, self.disk_slot)
    }
}

fn device_key(dev: &VirDomainBlockDevice) -> (DiskType, i64) {
    (dev.kind, dev.slot)
}

pub(crate) fn validate(disks: &[DesiredDisk]) -> Result<()> {
    for disk in disks {
        if disk.kind == DiskType::IdeCdrom {
            if disk.iso_name.is_none() {
                return Err(ReconcileError::Validation(format!(
                    "disk in slot {} is an ide_cdrom and requires iso_name",
                    disk.disk_slot
                )));
            }
        } else {
            if disk.iso_name.is_some() {
                return Err(ReconcileError::Validation(format!(
                    "iso_name on disk in slot {} is only valid for ide_cdrom",
                    disk.disk_slot
                )));
            }
            if disk.size.is_none() {
                return Err(ReconcileError::Validation(format!(
                    "disk in slot {} requires size",
                    disk.disk_slot
                )));
            }
        }
    }
    Ok(())
}

/// Payload for a disk created inline within a VM create request.
pub(crate) fn inline_payload(disk: &DesiredDisk) -> Value {
    let mut payload = json!({
        "type": disk.kind,
        "slot": disk.disk_slot,
        "capacity": disk.size.unwrap_or(0),
        "cacheMode": disk.cache_mode.unwrap_or_default(),
    });
    if let Some(iso) = &disk.iso_name {
        payload["name"] = json!(iso);
    }
    payload
}

fn create_payload(vm_uuid: &str, disk: &DesiredDisk) -> Value {
    let mut payload = inline_payload(disk);
    payload["virDomainUUID"] = json!(vm_uuid);
    payload
}

fn update_payload(disk: &DesiredDisk, current: &VirDomainBlockDevice) -> Result<Option<Value>> {
    if let Some(size) = disk.size
        && size < current.capacity
    {
        return Err(ReconcileError::Validation(format!(
            "disk in slot {} cannot shrink from {} to {} bytes",
            disk.disk_slot, current.capacity, size
        )));
    }

    Ok(PayloadDiff::new()
        .field("capacity", disk.size.as_ref(), &current.capacity)
        .field("cacheMode", disk.cache_mode.as_ref(), &current.cache_mode)
        .field(
            "name",
            disk.iso_name.as_deref(),
            current.name.as_str(),
        )
        .into_payload())
}

/// Plan the operations that bring the VM's disk list in line with the
/// desired entries. With `fully_managed`, current disks no desired entry
/// claims are deleted; otherwise they are left untouched.
pub(crate) fn plan_items(
    vm: &VirDomain,
    desired: &[DesiredDisk],
    fully_managed: bool,
) -> Result<Vec<Operation>> {
    let m = match_by_key(desired, &vm.block_devs, DesiredDisk::key, device_key);

    let mut ops = Vec::new();
    for disk in &m.missing {
        ops.push(Operation::create(
            endpoints::BLOCK_DEVICE,
            create_payload(&vm.uuid, disk),
        ));
    }
    for (disk, current) in &m.matched {
        if let Some(payload) = update_payload(disk, current)? {
            ops.push(Operation::update(
                endpoints::BLOCK_DEVICE,
                &current.uuid,
                payload,
            ));
        }
    }
    if fully_managed {
        for leftover in &m.leftover {
            ops.push(Operation::delete(endpoints::BLOCK_DEVICE, &leftover.uuid));
        }
    }
    Ok(ops)
}

/// Desired disk list for an existing VM.
#[derive(Debug, Deserialize)]
pub struct DesiredVmDisks {
    pub vm_name: String,
    pub state: State,
    #[serde(default)]
    pub disks: Vec<DesiredDisk>,
    /// When true, disks not listed here are deleted from the VM.
    #[serde(default)]
    pub fully_managed: bool,
}

pub async fn reconcile(
    api: &dyn ClusterApi,
    desired: DesiredVmDisks,
    opts: &ReconcileOptions,
) -> Result<Outcome> {
    if desired.state == State::Present {
        validate(&desired.disks)?;
    }
    let vm = require_vm_by_name(api, &desired.vm_name).await?;
    let before = record(&vm.block_devs);

    let changeset: ChangeSet = match desired.state {
        State::Present => plan_items(&vm, &desired.disks, desired.fully_managed)?
            .into_iter()
            .collect(),
        // Absent deletes the listed disks; entries that are already gone
        // are a no-op.
        State::Absent => {
            let m = match_by_key(&desired.disks, &vm.block_devs, DesiredDisk::key, device_key);
            m.matched
                .iter()
                .map(|(_, current)| Operation::delete(endpoints::BLOCK_DEVICE, &current.uuid))
                .collect()
        }
    };

    if changeset.is_empty() {
        return Ok(Outcome::unchanged(before));
    }

    let mut runner = Runner::new(api, opts, before.clone());
    if let Err(outcome) = runner.run(changeset).await {
        return Ok(*outcome);
    }

    let after = require_vm_by_name(api, &desired.vm_name).await?;
    Ok(Outcome::converged(before, record(&after.block_devs)))
}
