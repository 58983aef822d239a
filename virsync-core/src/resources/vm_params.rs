//! In-place VM parameter updates.
//!
//! Manages description, tags, memory, vcpu count and power state of an
//! existing VM. Every field is optional; omitted fields are left alone and
//! the resulting PATCH carries only what actually differs.

use serde::Deserialize;
use serde_json::{Value, json};
use virsync_client::resources::{VirDomain, join_tags};
use virsync_client::{ClusterApi, endpoints};

use crate::changeset::{ChangeSet, Operation};
use crate::diff::PayloadDiff;
use crate::error::Result;
use crate::outcome::Outcome;
use crate::resources::{
    PowerState, ReconcileOptions, Runner, power_action_payload, record, require_vm_by_name,
};

/// Desired parameter values for an existing VM.
#[derive(Debug, Deserialize)]
pub struct DesiredVmParams {
    pub vm_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Physical memory in bytes.
    #[serde(default)]
    pub memory: Option<u64>,
    #[serde(default)]
    pub vcpu: Option<u32>,
    #[serde(default)]
    pub power_state: Option<PowerState>,
}

/// The managed scalar fields of a VM record.
pub(crate) struct VmFieldPatch<'a> {
    pub description: Option<&'a str>,
    pub tags: Option<&'a [String]>,
    pub memory: Option<u64>,
    pub vcpu: Option<u32>,
}

/// Minimal PATCH body for the VM record, or `None` when nothing differs.
/// Tags are compared as lists (the first tag is the VM's group, so order
/// matters) and serialized in the vendor's comma-joined form.
pub(crate) fn patch_payload(fields: &VmFieldPatch<'_>, vm: &VirDomain) -> Option<Value> {
    let current_tags = vm.tag_list();
    let tags_wire = fields
        .tags
        .map(|t| json!(join_tags(t)))
        .unwrap_or(Value::Null);

    PayloadDiff::new()
        .field("description", fields.description, vm.description.as_str())
        .field_as("tags", fields.tags, current_tags.as_slice(), tags_wire)
        .field("mem", fields.memory.as_ref(), &vm.mem)
        .field("numVCPU", fields.vcpu.as_ref(), &vm.num_vcpu)
        .into_payload()
}

pub async fn reconcile(
    api: &dyn ClusterApi,
    desired: DesiredVmParams,
    opts: &ReconcileOptions,
) -> Result<Outcome> {
    let vm = require_vm_by_name(api, &desired.vm_name).await?;
    let before = record(&vm);

    let fields = VmFieldPatch {
        description: desired.description.as_deref(),
        tags: desired.tags.as_deref(),
        memory: desired.memory,
        vcpu: desired.vcpu,
    };

    let mut changeset = ChangeSet::new();
    if let Some(payload) = patch_payload(&fields, &vm) {
        changeset.push(Operation::update(endpoints::VIR_DOMAIN, &vm.uuid, payload));
    }
    if let Some(power) = desired.power_state
        && let Some(action) = power.action_from(vm.state)
    {
        changeset.push(Operation::action(
            endpoints::VIR_DOMAIN_ACTION,
            power_action_payload(&vm.uuid, action),
        ));
    }

    if changeset.is_empty() {
        return Ok(Outcome::unchanged(before));
    }

    let mut runner = Runner::new(api, opts, before.clone());
    if let Err(outcome) = runner.run(changeset).await {
        return Ok(*outcome);
    }

    let after = require_vm_by_name(api, &desired.vm_name).await?;
    Ok(Outcome::converged(before, record(&after)))
}
