//! Virtual NIC reconciliation.
//!
//! NICs are matched by VLAN. Type, MAC and link state update in place; a
//! NIC is never recreated when only its value fields changed.

use serde::Deserialize;
use serde_json::{Value, json};
use virsync_client::resources::{NicType, VirDomain, VirDomainNetDevice};
use virsync_client::{ClusterApi, endpoints};

use crate::changeset::{ChangeSet, Operation};
use crate::diff::{PayloadDiff, match_by_key};
use crate::error::Result;
use crate::outcome::Outcome;
use crate::resources::{ReconcileOptions, Runner, State, record, require_vm_by_name};

/// One desired NIC. Defaults: virtio on VLAN 0, connected.
#[derive(Debug, Clone, Deserialize)]
pub struct DesiredNic {
    #[serde(default)]
    pub vlan: i64,
    #[serde(rename = "type", default)]
    pub kind: NicType,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default = "default_true")]
    pub connected: bool,
}

fn default_true() -> bool {
    true
}

/// Payload for a NIC created inline within a VM create request.
pub(crate) fn inline_payload(nic: &DesiredNic) -> Value {
    let mut payload = json!({
        "type": nic.kind,
        "vlan": nic.vlan,
        "connected": nic.connected,
    });
    if let Some(mac) = &nic.mac {
        payload["macAddress"] = json!(mac);
    }
    payload
}

fn create_payload(vm_uuid: &str, nic: &DesiredNic) -> Value {
    let mut payload = inline_payload(nic);
    payload["virDomainUUID"] = json!(vm_uuid);
    payload
}

fn update_payload(nic: &DesiredNic, current: &VirDomainNetDevice) -> Option<Value> {
    PayloadDiff::new()
        .field("type", Some(&nic.kind), &current.kind)
        .field("connected", Some(&nic.connected), &current.connected)
        .field("macAddress", nic.mac.as_deref(), current.mac_address.as_str())
        .into_payload()
}

/// Plan the operations that bring the VM's NIC list in line with the
/// desired entries.
pub(crate) fn plan_items(
    vm: &VirDomain,
    desired: &[DesiredNic],
    fully_managed: bool,
) -> Vec<Operation> {
    let m = match_by_key(desired, &vm.net_devs, |d| d.vlan, |c| c.vlan);

    let mut ops = Vec::new();
    for nic in &m.missing {
        ops.push(Operation::create(
            endpoints::NET_DEVICE,
            create_payload(&vm.uuid, nic),
        ));
    }
    for (nic, current) in &m.matched {
        if let Some(payload) = update_payload(nic, current) {
            ops.push(Operation::update(
                endpoints::NET_DEVICE,
                &current.uuid,
                payload,
            ));
        }
    }
    if fully_managed {
        for leftover in &m.leftover {
            ops.push(Operation::delete(endpoints::NET_DEVICE, &leftover.uuid));
        }
    }
    ops
}

/// Desired NIC list for an existing VM.
#[derive(Debug, Deserialize)]
pub struct DesiredVmNics {
    pub vm_name: String,
    pub state: State,
    #[serde(default)]
    pub nics: Vec<DesiredNic>,
    /// When true, NICs not listed here are deleted from the VM.
    #[serde(default)]
    pub fully_managed: bool,
}

pub async fn reconcile(
    api: &dyn ClusterApi,
    desired: DesiredVmNics,
    opts: &ReconcileOptions,
) -> Result<Outcome> {
    let vm = require_vm_by_name(api, &desired.vm_name).await?;
    let before = record(&vm.net_devs);

    let changeset: ChangeSet = match desired.state {
        State::Present => plan_items(&vm, &desired.nics, desired.fully_managed)
            .into_iter()
            .collect(),
        State::Absent => {
            let m = match_by_key(&desired.nics, &vm.net_devs, |d| d.vlan, |c| c.vlan);
            m.matched
                .iter()
                .map(|(_, current)| Operation::delete(endpoints::NET_DEVICE, &current.uuid))
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
    Ok(Outcome::converged(before, record(&after.net_devs)))
}
