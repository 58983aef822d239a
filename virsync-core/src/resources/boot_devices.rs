//! Boot order reconciliation.
//!
//! Boot order is the one list where position matters: the desired entries
//! are resolved to device uuids and compared positionally against the VM's
//! current `bootDevices`.

use serde::Deserialize;
use serde_json::json;
use virsync_client::resources::{DiskType, VirDomain};
use virsync_client::{ClusterApi, endpoints};

use crate::changeset::{ChangeSet, Operation};
use crate::error::{ReconcileError, Result};
use crate::outcome::Outcome;
use crate::resources::{ReconcileOptions, Runner, State, record, require_vm_by_name};

/// Reference to a bootable device on the VM: a disk by (type, slot) or a
/// NIC by VLAN.
#[derive(Debug, Clone, Deserialize)]
pub struct BootDeviceRef {
    #[serde(rename = "type")]
    pub kind: BootDeviceKind,
    #[serde(default)]
    pub disk_slot: Option<i64>,
    #[serde(default)]
    pub nic_vlan: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootDeviceKind {
    VirtioDisk,
    IdeDisk,
    ScsiDisk,
    IdeCdrom,
    IdeFloppy,
    Nvram,
    Nic,
}

impl BootDeviceKind {
    fn disk_type(self) -> Option<DiskType> {
        match self {
            BootDeviceKind::VirtioDisk => Some(DiskType::VirtioDisk),
            BootDeviceKind::IdeDisk => Some(DiskType::IdeDisk),
            BootDeviceKind::ScsiDisk => Some(DiskType::ScsiDisk),
            BootDeviceKind::IdeCdrom => Some(DiskType::IdeCdrom),
            BootDeviceKind::IdeFloppy => Some(DiskType::IdeFloppy),
            BootDeviceKind::Nvram => Some(DiskType::Nvram),
            BootDeviceKind::Nic => None,
        }
    }
}

pub(crate) fn validate(refs: &[BootDeviceRef]) -> Result<()> {
    for r in refs {
        match r.kind {
            BootDeviceKind::Nic if r.nic_vlan.is_none() => {
                return Err(ReconcileError::Validation(
                    "boot device of type nic requires nic_vlan".to_string(),
                ));
            }
            kind if kind != BootDeviceKind::Nic && r.disk_slot.is_none() => {
                return Err(ReconcileError::Validation(format!(
                    "boot device of type {:?} requires disk_slot",
                    r.kind
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Resolve boot device references against the VM's devices, in order.
pub(crate) fn resolve(vm: &VirDomain, refs: &[BootDeviceRef]) -> Result<Vec<String>> {
    let mut uuids = Vec::with_capacity(refs.len());
    for r in refs {
        let uuid = match r.kind.disk_type() {
            Some(disk_type) => vm
                .block_devs
                .iter()
                .find(|d| d.kind == disk_type && Some(d.slot) == r.disk_slot)
                .map(|d| d.uuid.clone()),
            None => vm
                .net_devs
                .iter()
                .find(|n| Some(n.vlan) == r.nic_vlan)
                .map(|n| n.uuid.clone()),
        };
        match uuid {
            Some(uuid) => uuids.push(uuid),
            None => {
                return Err(ReconcileError::NotFound(format!(
                    "boot device {:?} matches no device on VM {}",
                    r, vm.name
                )));
            }
        }
    }
    Ok(uuids)
}

/// Emit the boot-order patch when the resolved order differs.
pub(crate) fn plan(vm: &VirDomain, order: &[String]) -> Option<Operation> {
    if vm.boot_devices == order {
        return None;
    }
    Some(Operation::update(
        endpoints::VIR_DOMAIN,
        &vm.uuid,
        json!({"bootDevices": order}),
    ))
}

/// Desired boot order for an existing VM. The list is the complete order;
/// `state` only exists for document uniformity and `absent` clears it.
#[derive(Debug, Deserialize)]
pub struct DesiredBootDevices {
    pub vm_name: String,
    #[serde(default = "present")]
    pub state: State,
    #[serde(default)]
    pub items: Vec<BootDeviceRef>,
}

fn present() -> State {
    State::Present
}

pub async fn reconcile(
    api: &dyn ClusterApi,
    desired: DesiredBootDevices,
    opts: &ReconcileOptions,
) -> Result<Outcome> {
    validate(&desired.items)?;
    let vm = require_vm_by_name(api, &desired.vm_name).await?;
    let before = record(&vm.boot_devices);

    let order = match desired.state {
        State::Present => resolve(&vm, &desired.items)?,
        State::Absent => Vec::new(),
    };

    let changeset: ChangeSet = plan(&vm, &order).into_iter().collect();
    if changeset.is_empty() {
        return Ok(Outcome::unchanged(before));
    }

    let mut runner = Runner::new(api, opts, before.clone());
    if let Err(outcome) = runner.run(changeset).await {
        return Ok(*outcome);
    }

    let after = require_vm_by_name(api, &desired.vm_name).await?;
    Ok(Outcome::converged(before, record(&after.boot_devices)))
}
