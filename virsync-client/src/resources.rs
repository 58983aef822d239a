//! Wire model for cluster resources.
//!
//! Field names follow the cluster's camelCase JSON. Records fetched from the
//! API always carry a server-assigned `uuid`; payloads we send omit it.

use serde::{Deserialize, Serialize};

/// Virtual machine record (`VirDomain`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirDomain {
    #[serde(default)]
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Physical memory in bytes.
    #[serde(default)]
    pub mem: u64,
    #[serde(default, rename = "numVCPU")]
    pub num_vcpu: u32,
    #[serde(default)]
    pub state: VmState,
    /// Comma-joined tag string; the first tag is the VM's group.
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub block_devs: Vec<VirDomainBlockDevice>,
    #[serde(default)]
    pub net_devs: Vec<VirDomainNetDevice>,
    /// Device uuids in boot priority order.
    #[serde(default)]
    pub boot_devices: Vec<String>,
    #[serde(default)]
    pub affinity_strategy: AffinityStrategy,
}

impl VirDomain {
    /// Tags split out of the vendor's comma-joined representation.
    pub fn tag_list(&self) -> Vec<String> {
        split_tags(&self.tags)
    }
}

pub fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn join_tags(tags: &[String]) -> String {
    tags.join(",")
}

/// VM power states reported by the cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VmState {
    Running,
    Blocked,
    Paused,
    Shutdown,
    #[default]
    Shutoff,
    Crashed,
}

/// Power actions accepted by `POST /rest/v1/VirDomain/action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PowerAction {
    Start,
    Shutdown,
    Stop,
    Reboot,
    Reset,
}

/// Node placement constraints stored on the VM record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffinityStrategy {
    #[serde(default)]
    pub strict_affinity: bool,
    /// Empty string when no node is pinned.
    #[serde(default, rename = "preferredNodeUUID")]
    pub preferred_node_uuid: String,
    #[serde(default, rename = "backupNodeUUID")]
    pub backup_node_uuid: String,
}

/// Virtual disk record (`VirDomainBlockDevice`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirDomainBlockDevice {
    #[serde(default)]
    pub uuid: String,
    #[serde(default, rename = "virDomainUUID")]
    pub vir_domain_uuid: String,
    #[serde(rename = "type")]
    pub kind: DiskType,
    pub slot: i64,
    /// Logical size in bytes.
    #[serde(default)]
    pub capacity: u64,
    #[serde(default)]
    pub cache_mode: CacheMode,
    /// For CD-ROM devices, the attached ISO path; empty otherwise.
    #[serde(default)]
    pub name: String,
}

/// Serialized in the vendor's SCREAMING_SNAKE_CASE; the snake_case aliases
/// accept the caller-facing spelling used in desired-state documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiskType {
    #[default]
    #[serde(alias = "virtio_disk")]
    VirtioDisk,
    #[serde(alias = "ide_disk")]
    IdeDisk,
    #[serde(alias = "scsi_disk")]
    ScsiDisk,
    #[serde(alias = "ide_cdrom")]
    IdeCdrom,
    #[serde(alias = "ide_floppy")]
    IdeFloppy,
    #[serde(alias = "nvram")]
    Nvram,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheMode {
    #[default]
    #[serde(alias = "none")]
    None,
    #[serde(alias = "writeback")]
    Writeback,
    #[serde(alias = "writethrough")]
    Writethrough,
}

/// Virtual NIC record (`VirDomainNetDevice`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirDomainNetDevice {
    #[serde(default)]
    pub uuid: String,
    #[serde(default, rename = "virDomainUUID")]
    pub vir_domain_uuid: String,
    #[serde(rename = "type", default)]
    pub kind: NicType,
    #[serde(default)]
    pub vlan: i64,
    #[serde(default)]
    pub mac_address: String,
    #[serde(default = "default_true")]
    pub connected: bool,
    #[serde(default)]
    pub ipv4_addresses: Vec<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NicType {
    #[default]
    #[serde(rename = "VIRTIO", alias = "virtio")]
    Virtio,
    #[serde(rename = "RTL8139")]
    Rtl8139,
    #[serde(rename = "INTEL_E1000")]
    IntelE1000,
}

/// Snapshot schedule record (`VirDomainSnapshotSchedule`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirDomainSnapshotSchedule {
    #[serde(default)]
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub rrules: Vec<ScheduleRecurrence>,
}

/// One recurrence rule within a snapshot schedule.
///
/// Recurrences live as a list field on the schedule record; the cluster
/// assigns each entry a uuid on first write. `name` is the caller-facing
/// natural key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRecurrence {
    #[serde(default)]
    pub uuid: String,
    pub name: String,
    /// RFC 5545 recurrence rule, e.g. `FREQ=WEEKLY;INTERVAL=1;BYDAY=MO`.
    pub rrule: String,
    #[serde(default)]
    pub dtstart: String,
    /// Seconds to keep local snapshots; 0 means keep forever.
    #[serde(default)]
    pub local_retention_duration_seconds: u64,
    /// Seconds to keep replicated snapshots; 0 means keep forever.
    #[serde(default)]
    pub remote_retention_duration_seconds: u64,
}

/// Replication configuration record (`VirDomainReplication`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirDomainReplication {
    #[serde(default)]
    pub uuid: String,
    #[serde(rename = "sourceDomainUUID")]
    pub source_domain_uuid: String,
    #[serde(rename = "connectionUUID")]
    pub connection_uuid: String,
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub label: String,
}

/// ISO image record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Iso {
    #[serde(default)]
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub ready_for_insert: bool,
    #[serde(default)]
    pub path: String,
}

/// Cluster node record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    #[serde(default)]
    pub uuid: String,
    #[serde(default, rename = "backplaneIP")]
    pub backplane_ip: String,
    #[serde(default, rename = "lanIP")]
    pub lan_ip: String,
    #[serde(default, rename = "peerID")]
    pub peer_id: i64,
}
