//! Resource modules: one per managed resource kind.
//!
//! Every module follows the same shape: a desired-state document with
//! per-field defaulting, a `validate` step that rejects contradictory input
//! before any API call, a pure planner producing a [`ChangeSet`], and an
//! async `reconcile` that fetches, plans, executes and reports.

pub mod boot_devices;
pub mod disk;
pub mod iso;
pub mod nic;
pub mod node_affinity;
pub mod replication;
pub mod snapshot_schedule;
pub mod vm;
pub mod vm_clone;
pub mod vm_params;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use virsync_client::resources::{PowerAction, VirDomain, VmState};
use virsync_client::{ClusterApi, TaskWaitOptions, endpoints};

use crate::changeset::ChangeSet;
use crate::error::{ReconcileError, Result};
use crate::executor::{self, OpReport};
use crate::outcome::Outcome;

/// Desired presence of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Present,
    Absent,
}

/// Caller-tunable knobs for one reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    pub task_wait: TaskWaitOptions,
}

/// Desired VM power state. `start` is the default when unspecified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    #[default]
    Start,
    Shutdown,
    Stop,
    Reboot,
    Reset,
}

impl PowerState {
    /// The action that moves a VM in `current` state toward this desired
    /// state, or `None` when it is already there. Reboot and reset of a VM
    /// that is not running degrade to a plain start.
    pub fn action_from(self, current: VmState) -> Option<PowerAction> {
        match self {
            PowerState::Start => {
                (current != VmState::Running).then_some(PowerAction::Start)
            }
            PowerState::Shutdown => {
                (current != VmState::Shutoff).then_some(PowerAction::Shutdown)
            }
            PowerState::Stop => (current != VmState::Shutoff).then_some(PowerAction::Stop),
            PowerState::Reboot => Some(if current == VmState::Running {
                PowerAction::Reboot
            } else {
                PowerAction::Start
            }),
            PowerState::Reset => Some(if current == VmState::Running {
                PowerAction::Reset
            } else {
                PowerAction::Start
            }),
        }
    }
}

/// Cloud-init NoCloud data attached to a VM at creation or clone time.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloudInit {
    pub user_data: Option<String>,
    pub meta_data: Option<String>,
}

impl CloudInit {
    pub fn is_empty(&self) -> bool {
        self.user_data.is_none() && self.meta_data.is_none()
    }

    /// The cluster expects base64-encoded source documents.
    pub fn to_payload(&self) -> Value {
        let mut data = serde_json::Map::new();
        if let Some(user) = &self.user_data {
            data.insert("userData".to_string(), json!(BASE64.encode(user)));
        }
        if let Some(meta) = &self.meta_data {
            data.insert("metaData".to_string(), json!(BASE64.encode(meta)));
        }
        Value::Object(data)
    }
}

pub(crate) fn power_action_payload(vm_uuid: &str, action: PowerAction) -> Value {
    json!({
        "virDomainUUID": vm_uuid,
        "actionType": action,
        "cause": "INTERNAL",
    })
}

/// Fetch a VM by its unique name. Names are the caller-facing identity for
/// `VirDomain`, so the list is filtered server-side and re-checked here.
pub(crate) async fn find_vm_by_name(
    api: &dyn ClusterApi,
    name: &str,
) -> Result<Option<VirDomain>> {
    let records = api
        .list(endpoints::VIR_DOMAIN, &[("name", name.to_string())])
        .await?;
    for record in records {
        let vm: VirDomain =
            serde_json::from_value(record).map_err(virsync_client::ApiError::from)?;
        if vm.name == name {
            return Ok(Some(vm));
        }
    }
    Ok(None)
}

pub(crate) async fn require_vm_by_name(api: &dyn ClusterApi, name: &str) -> Result<VirDomain> {
    find_vm_by_name(api, name)
        .await?
        .ok_or_else(|| ReconcileError::NotFound(format!("VM named {}", name)))
}

pub(crate) fn record<T: Serialize>(value: &T) -> Option<Value> {
    serde_json::to_value(value).ok()
}

/// Runs ChangeSets phase by phase, carrying applied-operation reports
/// across phases so a mid-run failure reports everything that went through.
pub(crate) struct Runner<'a> {
    api: &'a dyn ClusterApi,
    wait: &'a TaskWaitOptions,
    before: Option<Value>,
    reports: Vec<OpReport>,
}

impl<'a> Runner<'a> {
    pub(crate) fn new(
        api: &'a dyn ClusterApi,
        opts: &'a ReconcileOptions,
        before: Option<Value>,
    ) -> Self {
        Self {
            api,
            wait: &opts.task_wait,
            before,
            reports: Vec::new(),
        }
    }

    /// Apply one phase. On failure, returns the final failed [`Outcome`]
    /// (boxed to keep the happy path lean); already-applied operations are
    /// not rolled back.
    pub(crate) async fn run(
        &mut self,
        changeset: ChangeSet,
    ) -> std::result::Result<Option<String>, Box<Outcome>> {
        if changeset.is_empty() {
            return Ok(None);
        }
        match executor::apply(self.api, changeset, self.wait).await {
            Ok(applied) => {
                self.reports.extend(applied.reports);
                Ok(applied.created_uuid)
            }
            Err(failure) => {
                self.reports.extend(failure.applied);
                Err(Box::new(Outcome::failure(
                    self.before.clone(),
                    &self.reports,
                    failure.error,
                )))
            }
        }
    }

    pub(crate) fn changed(&self) -> bool {
        !self.reports.is_empty()
    }
}

/// A desired-state document tagged with the resource kind it manages.
#[derive(Debug, Deserialize)]
#[serde(tag = "resource", rename_all = "snake_case")]
pub enum DesiredDocument {
    Vm(vm::DesiredVm),
    VmParams(vm_params::DesiredVmParams),
    VmClone(vm_clone::DesiredVmClone),
    VmDisks(disk::DesiredVmDisks),
    VmNics(nic::DesiredVmNics),
    VmBootDevices(boot_devices::DesiredBootDevices),
    VmNodeAffinity(node_affinity::DesiredNodeAffinity),
    VmReplication(replication::DesiredReplication),
    SnapshotSchedule(snapshot_schedule::DesiredSnapshotSchedule),
    Iso(iso::DesiredIso),
}

/// Reconcile one desired-state document against the cluster.
pub async fn reconcile_document(
    api: &dyn ClusterApi,
    document: DesiredDocument,
    opts: &ReconcileOptions,
) -> Result<Outcome> {
    match document {
        DesiredDocument::Vm(d) => vm::reconcile(api, d, opts).await,
        DesiredDocument::VmParams(d) => vm_params::reconcile(api, d, opts).await,
        DesiredDocument::VmClone(d) => vm_clone::reconcile(api, d, opts).await,
        DesiredDocument::VmDisks(d) => disk::reconcile(api, d, opts).await,
        DesiredDocument::VmNics(d) => nic::reconcile(api, d, opts).await,
        DesiredDocument::VmBootDevices(d) => boot_devices::reconcile(api, d, opts).await,
        DesiredDocument::VmNodeAffinity(d) => node_affinity::reconcile(api, d, opts).await,
        DesiredDocument::VmReplication(d) => replication::reconcile(api, d, opts).await,
        DesiredDocument::SnapshotSchedule(d) => snapshot_schedule::reconcile(api, d, opts).await,
        DesiredDocument::Iso(d) => iso::reconcile(api, d, opts).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_state_noop_when_already_there() {
        assert_eq!(PowerState::Start.action_from(VmState::Running), None);
        assert_eq!(PowerState::Stop.action_from(VmState::Shutoff), None);
        assert_eq!(PowerState::Shutdown.action_from(VmState::Shutoff), None);
    }

    #[test]
    fn power_state_moves_toward_desired() {
        assert_eq!(
            PowerState::Start.action_from(VmState::Shutoff),
            Some(PowerAction::Start)
        );
        assert_eq!(
            PowerState::Stop.action_from(VmState::Running),
            Some(PowerAction::Stop)
        );
        // Reboot of a stopped VM is just a start.
        assert_eq!(
            PowerState::Reboot.action_from(VmState::Shutoff),
            Some(PowerAction::Start)
        );
        assert_eq!(
            PowerState::Reboot.action_from(VmState::Running),
            Some(PowerAction::Reboot)
        );
    }

    #[test]
    fn cloud_init_payload_is_base64_encoded() {
        let ci = CloudInit {
            user_data: Some("#cloud-config\n".to_string()),
            meta_data: None,
        };
        let payload = ci.to_payload();
        assert_eq!(payload["userData"], json!("I2Nsb3VkLWNvbmZpZwo="));
        assert!(payload.get("metaData").is_none());
    }

    #[test]
    fn desired_document_dispatches_on_resource_tag() {
        let doc: DesiredDocument = serde_json::from_value(json!({
            "resource": "snapshot_schedule",
            "name": "sched1",
            "state": "present",
            "recurrences": [
                {"name": "r1", "frequency": "FREQ=WEEKLY", "local_retention": 604800}
            ]
        }))
        .unwrap();
        assert!(matches!(doc, DesiredDocument::SnapshotSchedule(_)));
    }
}
