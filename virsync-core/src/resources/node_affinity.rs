//! Node affinity reconciliation.
//!
//! The affinity strategy is a single managed field on the VM: strict flag
//! plus preferred and backup nodes. Nodes can be referenced by uuid,
//! backplane IP, LAN IP or peer id; exactly one selector must be given.

use serde::Deserialize;
use serde_json::json;
use virsync_client::resources::{AffinityStrategy, Node};
use virsync_client::{ClusterApi, endpoints};

use crate::changeset::{ChangeSet, Operation};
use crate::error::{ReconcileError, Result};
use crate::outcome::Outcome;
use crate::resources::{ReconcileOptions, Runner, record, require_vm_by_name};

/// Reference to a cluster node. Exactly one selector must be set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeRef {
    #[serde(default)]
    pub node_uuid: Option<String>,
    #[serde(default)]
    pub backplane_ip: Option<String>,
    #[serde(default)]
    pub lan_ip: Option<String>,
    #[serde(default)]
    pub peer_id: Option<i64>,
}

impl NodeRef {
    fn selector_count(&self) -> usize {
        [
            self.node_uuid.is_some(),
            self.backplane_ip.is_some(),
            self.lan_ip.is_some(),
            self.peer_id.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    fn matches(&self, node: &Node) -> bool {
        if let Some(uuid) = &self.node_uuid {
            return &node.uuid == uuid;
        }
        if let Some(ip) = &self.backplane_ip {
            return &node.backplane_ip == ip;
        }
        if let Some(ip) = &self.lan_ip {
            return &node.lan_ip == ip;
        }
        if let Some(id) = self.peer_id {
            return node.peer_id == id;
        }
        false
    }
}

fn validate_ref(name: &str, r: &NodeRef) -> Result<()> {
    match r.selector_count() {
        1 => Ok(()),
        0 => Err(ReconcileError::Validation(format!(
            "{} needs one of node_uuid, backplane_ip, lan_ip or peer_id",
            name
        ))),
        _ => Err(ReconcileError::Validation(format!(
            "{} selectors are mutually exclusive, set exactly one",
            name
        ))),
    }
}

fn resolve(nodes: &[Node], r: &NodeRef) -> Result<String> {
    nodes
        .iter()
        .find(|n| r.matches(n))
        .map(|n| n.uuid.clone())
        .ok_or_else(|| ReconcileError::NotFound(format!("no cluster node matches {:?}", r)))
}

/// Desired node affinity for an existing VM. Omitting a node clears it.
#[derive(Debug, Deserialize)]
pub struct DesiredNodeAffinity {
    pub vm_name: String,
    #[serde(default)]
    pub strict_affinity: bool,
    #[serde(default)]
    pub preferred_node: Option<NodeRef>,
    #[serde(default)]
    pub backup_node: Option<NodeRef>,
}

pub async fn reconcile(
    api: &dyn ClusterApi,
    desired: DesiredNodeAffinity,
    opts: &ReconcileOptions,
) -> Result<Outcome> {
    if let Some(r) = &desired.preferred_node {
        validate_ref("preferred_node", r)?;
    }
    if let Some(r) = &desired.backup_node {
        validate_ref("backup_node", r)?;
    }

    let vm = require_vm_by_name(api, &desired.vm_name).await?;
    let before = record(&vm.affinity_strategy);

    // Node listing is only needed when a node is actually referenced.
    let nodes = if desired.preferred_node.is_some() || desired.backup_node.is_some() {
        let records = api.list(endpoints::NODE, &[]).await?;
        records
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<Node>, _>>()
            .map_err(virsync_client::ApiError::from)?
    } else {
        Vec::new()
    };

    let target = AffinityStrategy {
        strict_affinity: desired.strict_affinity,
        preferred_node_uuid: match &desired.preferred_node {
            Some(r) => resolve(&nodes, r)?,
            None => String::new(),
        },
        backup_node_uuid: match &desired.backup_node {
            Some(r) => resolve(&nodes, r)?,
            None => String::new(),
        },
    };

    if target == vm.affinity_strategy {
        return Ok(Outcome::unchanged(before));
    }

    let mut changeset = ChangeSet::new();
    changeset.push(Operation::update(
        endpoints::VIR_DOMAIN,
        &vm.uuid,
        json!({"affinityStrategy": target}),
    ));

    let mut runner = Runner::new(api, opts, before.clone());
    if let Err(outcome) = runner.run(changeset).await {
        return Ok(*outcome);
    }

    let after = require_vm_by_name(api, &desired.vm_name).await?;
    Ok(Outcome::converged(before, record(&after.affinity_strategy)))
}
