//! VM cloning.
//!
//! Clones an existing VM to a new name, optionally overriding tags and
//! attaching fresh cloud-init data. Cloning is not a diffed resource: when
//! the target name already exists the run is a no-op.

use serde::Deserialize;
use serde_json::json;
use virsync_client::resources::join_tags;
use virsync_client::{ClusterApi, endpoints};

use crate::changeset::{ChangeSet, Operation};
use crate::error::Result;
use crate::outcome::Outcome;
use crate::resources::{
    CloudInit, ReconcileOptions, Runner, find_vm_by_name, record, require_vm_by_name,
};

/// Desired clone of an existing VM.
#[derive(Debug, Deserialize)]
pub struct DesiredVmClone {
    /// Name of the clone to create.
    pub vm_name: String,
    pub source_vm_name: String,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub cloud_init: Option<CloudInit>,
}

pub async fn reconcile(
    api: &dyn ClusterApi,
    desired: DesiredVmClone,
    opts: &ReconcileOptions,
) -> Result<Outcome> {
    if let Some(existing) = find_vm_by_name(api, &desired.vm_name).await? {
        return Ok(Outcome::unchanged(record(&existing))
            .with_msg(format!("VM {} already exists", desired.vm_name)));
    }

    let source = require_vm_by_name(api, &desired.source_vm_name).await?;

    let mut template = json!({"name": desired.vm_name});
    if let Some(tags) = &desired.tags {
        template["tags"] = json!(join_tags(tags));
    }
    if let Some(ci) = &desired.cloud_init
        && !ci.is_empty()
    {
        template["cloudInitData"] = ci.to_payload();
    }

    let mut changeset = ChangeSet::new();
    changeset.push(Operation::create(
        format!("{}/{}/clone", endpoints::VIR_DOMAIN, source.uuid),
        json!({"template": template}),
    ));

    let mut runner = Runner::new(api, opts, None);
    if let Err(outcome) = runner.run(changeset).await {
        return Ok(*outcome);
    }

    let clone = require_vm_by_name(api, &desired.vm_name).await?;
    Ok(Outcome::converged(None, record(&clone)).with_msg(format!(
        "cloned {} to {}",
        desired.source_vm_name, desired.vm_name
    )))
}
