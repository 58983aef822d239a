//! In-memory cluster fake implementing the `ClusterApi` trait.
//!
//! Mutations apply synchronously (empty task tags), records get uuids on
//! creation, and every mutating call is appended to an operation log so
//! tests can assert ordering.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use uuid::Uuid;

use virsync_client::resources::{
    Iso, Node, ScheduleRecurrence, VirDomain, VirDomainBlockDevice, VirDomainNetDevice,
    VirDomainReplication, VirDomainSnapshotSchedule, VmState,
};
use virsync_client::{ApiError, ClusterApi, Result, TaskHandle, TaskState, TaskStatus};

#[derive(Default)]
struct Inner {
    vms: HashMap<String, VirDomain>,
    schedules: HashMap<String, VirDomainSnapshotSchedule>,
    replications: HashMap<String, VirDomainReplication>,
    isos: HashMap<String, Iso>,
    nodes: Vec<Node>,
    log: Vec<String>,
    /// When set, the next matching "<kind> <endpoint>" call fails once.
    fail_next: Option<String>,
}

#[derive(Default)]
pub struct FakeCluster {
    inner: Mutex<Inner>,
}

fn new_uuid() -> String {
    Uuid::new_v4().to_string()
}

fn merge<T: Serialize + DeserializeOwned>(target: &mut T, patch: &Value) {
    let mut value = serde_json::to_value(&*target).unwrap();
    if let (Value::Object(dst), Value::Object(src)) = (&mut value, patch) {
        for (key, val) in src {
            dst.insert(key.clone(), val.clone());
        }
    }
    *target = serde_json::from_value(value).unwrap();
}

fn to_values<T: Serialize>(records: impl IntoIterator<Item = T>) -> Vec<Value> {
    records
        .into_iter()
        .map(|r| serde_json::to_value(r).unwrap())
        .collect()
}

fn matches_query(record: &Value, query: &[(&str, String)]) -> bool {
    query.iter().all(|(field, want)| {
        record
            .get(*field)
            .map(|v| match v {
                Value::String(s) => s == want,
                other => &other.to_string() == want,
            })
            .unwrap_or(false)
    })
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_nodes(&self, nodes: Vec<Node>) {
        self.inner.lock().unwrap().nodes = nodes;
    }

    /// Make the next operation matching `"<kind> <endpoint>"` fail once
    /// with an HTTP 500.
    pub fn fail_next(&self, op: &str) {
        self.inner.lock().unwrap().fail_next = Some(op.to_string());
    }

    pub fn log(&self) -> Vec<String> {
        self.inner.lock().unwrap().log.clone()
    }

    pub fn vm_by_name(&self, name: &str) -> Option<VirDomain> {
        let inner = self.inner.lock().unwrap();
        inner.vms.values().find(|vm| vm.name == name).cloned()
    }

    fn check_fail(inner: &mut Inner, kind: &str, endpoint: &str) -> Result<()> {
        let op = format!("{} {}", kind, endpoint);
        if inner.fail_next.as_deref() == Some(op.as_str()) {
            inner.fail_next = None;
            return Err(ApiError::Api {
                status: 500,
                detail: format!("injected failure for {}", op),
            });
        }
        Ok(())
    }

    fn create_vm(inner: &mut Inner, payload: &Value) -> String {
        let uuid = new_uuid();
        let mut vm = VirDomain {
            uuid: uuid.clone(),
            name: payload["name"].as_str().unwrap_or_default().to_string(),
            description: payload["description"].as_str().unwrap_or_default().to_string(),
            mem: payload["mem"].as_u64().unwrap_or(0),
            num_vcpu: payload["numVCPU"].as_u64().unwrap_or(0) as u32,
            state: VmState::Shutoff,
            tags: payload["tags"].as_str().unwrap_or_default().to_string(),
            ..Default::default()
        };
        if let Some(devs) = payload["blockDevs"].as_array() {
            for dev in devs {
                let mut disk: VirDomainBlockDevice = serde_json::from_value(dev.clone()).unwrap();
                disk.uuid = new_uuid();
                disk.vir_domain_uuid = uuid.clone();
                vm.block_devs.push(disk);
            }
        }
        if let Some(devs) = payload["netDevs"].as_array() {
            for dev in devs {
                let mut nic: VirDomainNetDevice = serde_json::from_value(dev.clone()).unwrap();
                nic.uuid = new_uuid();
                nic.vir_domain_uuid = uuid.clone();
                vm.net_devs.push(nic);
            }
        }
        inner.vms.insert(uuid.clone(), vm);
        uuid
    }

    fn clone_vm(inner: &mut Inner, source_uuid: &str, payload: &Value) -> Result<String> {
        let source = inner
            .vms
            .get(source_uuid)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(source_uuid.to_string()))?;
        let template = &payload["template"];

        let uuid = new_uuid();
        let mut vm = source;
        vm.uuid = uuid.clone();
        vm.name = template["name"].as_str().unwrap_or_default().to_string();
        vm.state = VmState::Shutoff;
        if let Some(tags) = template["tags"].as_str() {
            vm.tags = tags.to_string();
        }
        for disk in &mut vm.block_devs {
            disk.uuid = new_uuid();
            disk.vir_domain_uuid = uuid.clone();
        }
        for nic in &mut vm.net_devs {
            nic.uuid = new_uuid();
            nic.vir_domain_uuid = uuid.clone();
        }
        vm.boot_devices = Vec::new();
        inner.vms.insert(uuid.clone(), vm);
        Ok(uuid)
    }

    fn assign_rrule_uuids(rrules: &mut [ScheduleRecurrence]) {
        for rule in rrules {
            if rule.uuid.is_empty() {
                rule.uuid = new_uuid();
            }
        }
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn list(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Vec<Value>> {
        let inner = self.inner.lock().unwrap();
        let records = match endpoint {
            "VirDomain" => to_values(inner.vms.values()),
            "VirDomainSnapshotSchedule" => to_values(inner.schedules.values()),
            "VirDomainReplication" => to_values(inner.replications.values()),
            "ISO" => to_values(inner.isos.values()),
            "Node" => to_values(inner.nodes.iter()),
            _ => Vec::new(),
        };
        Ok(records
            .into_iter()
            .filter(|r| matches_query(r, query))
            .collect())
    }

    async fn get(&self, endpoint: &str, uuid: &str) -> Result<Option<Value>> {
        let inner = self.inner.lock().unwrap();
        let record = match endpoint {
            "VirDomain" => inner.vms.get(uuid).map(|r| serde_json::to_value(r).unwrap()),
            "VirDomainSnapshotSchedule" => inner
                .schedules
                .get(uuid)
                .map(|r| serde_json::to_value(r).unwrap()),
            "ISO" => inner.isos.get(uuid).map(|r| serde_json::to_value(r).unwrap()),
            _ => None,
        };
        Ok(record)
    }

    async fn create(&self, endpoint: &str, payload: Value) -> Result<TaskHandle> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_fail(&mut inner, "create", endpoint)?;

        let created = if endpoint == "VirDomain" {
            let uuid = Self::create_vm(&mut inner, &payload);
            inner.log.push(format!("create VirDomain {}", uuid));
            uuid
        } else if let Some(rest) = endpoint.strip_prefix("VirDomain/") {
            let source = rest.strip_suffix("/clone").ok_or_else(|| ApiError::Api {
                status: 400,
                detail: format!("unsupported endpoint {}", endpoint),
            })?;
            let uuid = Self::clone_vm(&mut inner, source, &payload)?;
            inner.log.push(format!("clone {} -> {}", source, uuid));
            uuid
        } else {
            match endpoint {
                "VirDomainBlockDevice" => {
                    let mut disk: VirDomainBlockDevice =
                        serde_json::from_value(payload).unwrap();
                    disk.uuid = new_uuid();
                    let uuid = disk.uuid.clone();
                    let vm_uuid = disk.vir_domain_uuid.clone();
                    let vm = inner
                        .vms
                        .get_mut(&vm_uuid)
                        .ok_or_else(|| ApiError::NotFound(vm_uuid.clone()))?;
                    vm.block_devs.push(disk);
                    inner.log.push(format!("create VirDomainBlockDevice {}", uuid));
                    uuid
                }
                "VirDomainNetDevice" => {
                    let mut nic: VirDomainNetDevice = serde_json::from_value(payload).unwrap();
                    nic.uuid = new_uuid();
                    let uuid = nic.uuid.clone();
                    let vm_uuid = nic.vir_domain_uuid.clone();
                    let vm = inner
                        .vms
                        .get_mut(&vm_uuid)
                        .ok_or_else(|| ApiError::NotFound(vm_uuid.clone()))?;
                    vm.net_devs.push(nic);
                    inner.log.push(format!("create VirDomainNetDevice {}", uuid));
                    uuid
                }
                "VirDomainSnapshotSchedule" => {
                    let mut schedule: VirDomainSnapshotSchedule =
                        serde_json::from_value(payload).unwrap();
                    schedule.uuid = new_uuid();
                    Self::assign_rrule_uuids(&mut schedule.rrules);
                    let uuid = schedule.uuid.clone();
                    inner.schedules.insert(uuid.clone(), schedule);
                    inner
                        .log
                        .push(format!("create VirDomainSnapshotSchedule {}", uuid));
                    uuid
                }
                "VirDomainReplication" => {
                    let mut replication: VirDomainReplication =
                        serde_json::from_value(payload).unwrap();
                    replication.uuid = new_uuid();
                    let uuid = replication.uuid.clone();
                    inner.replications.insert(uuid.clone(), replication);
                    inner.log.push(format!("create VirDomainReplication {}", uuid));
                    uuid
                }
                "ISO" => {
                    let mut iso: Iso = serde_json::from_value(payload).unwrap();
                    iso.uuid = new_uuid();
                    let uuid = iso.uuid.clone();
                    inner.isos.insert(uuid.clone(), iso);
                    inner.log.push(format!("create ISO {}", uuid));
                    uuid
                }
                other => {
                    return Err(ApiError::Api {
                        status: 400,
                        detail: format!("unsupported endpoint {}", other),
                    });
                }
            }
        };

        Ok(TaskHandle {
            task_tag: String::new(),
            created_uuid: created,
        })
    }

    async fn update(&self, endpoint: &str, uuid: &str, payload: Value) -> Result<TaskHandle> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_fail(&mut inner, "update", endpoint)?;

        match endpoint {
            "VirDomain" => {
                let vm = inner
                    .vms
                    .get_mut(uuid)
                    .ok_or_else(|| ApiError::NotFound(uuid.to_string()))?;
                merge(vm, &payload);
            }
            "VirDomainBlockDevice" => {
                let disk = inner
                    .vms
                    .values_mut()
                    .flat_map(|vm| vm.block_devs.iter_mut())
                    .find(|d| d.uuid == uuid)
                    .ok_or_else(|| ApiError::NotFound(uuid.to_string()))?;
                merge(disk, &payload);
            }
            "VirDomainNetDevice" => {
                let nic = inner
                    .vms
                    .values_mut()
                    .flat_map(|vm| vm.net_devs.iter_mut())
                    .find(|n| n.uuid == uuid)
                    .ok_or_else(|| ApiError::NotFound(uuid.to_string()))?;
                merge(nic, &payload);
            }
            "VirDomainSnapshotSchedule" => {
                let schedule = inner
                    .schedules
                    .get_mut(uuid)
                    .ok_or_else(|| ApiError::NotFound(uuid.to_string()))?;
                merge(schedule, &payload);
                Self::assign_rrule_uuids(&mut schedule.rrules);
            }
            "VirDomainReplication" => {
                let replication = inner
                    .replications
                    .get_mut(uuid)
                    .ok_or_else(|| ApiError::NotFound(uuid.to_string()))?;
                merge(replication, &payload);
            }
            "ISO" => {
                let iso = inner
                    .isos
                    .get_mut(uuid)
                    .ok_or_else(|| ApiError::NotFound(uuid.to_string()))?;
                merge(iso, &payload);
            }
            other => {
                return Err(ApiError::Api {
                    status: 400,
                    detail: format!("unsupported endpoint {}", other),
                });
            }
        }
        inner.log.push(format!("update {} {}", endpoint, uuid));
        Ok(TaskHandle::default())
    }

    async fn delete(&self, endpoint: &str, uuid: &str) -> Result<TaskHandle> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_fail(&mut inner, "delete", endpoint)?;

        let removed = match endpoint {
            "VirDomain" => inner.vms.remove(uuid).is_some(),
            "VirDomainBlockDevice" => inner.vms.values_mut().any(|vm| {
                let before = vm.block_devs.len();
                vm.block_devs.retain(|d| d.uuid != uuid);
                vm.block_devs.len() != before
            }),
            "VirDomainNetDevice" => inner.vms.values_mut().any(|vm| {
                let before = vm.net_devs.len();
                vm.net_devs.retain(|n| n.uuid != uuid);
                vm.net_devs.len() != before
            }),
            "VirDomainSnapshotSchedule" => inner.schedules.remove(uuid).is_some(),
            "VirDomainReplication" => inner.replications.remove(uuid).is_some(),
            "ISO" => inner.isos.remove(uuid).is_some(),
            _ => false,
        };
        if !removed {
            return Err(ApiError::NotFound(uuid.to_string()));
        }
        inner.log.push(format!("delete {} {}", endpoint, uuid));
        Ok(TaskHandle::default())
    }

    async fn action(&self, endpoint: &str, payload: Value) -> Result<TaskHandle> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_fail(&mut inner, "action", endpoint)?;

        let uuid = payload["virDomainUUID"].as_str().unwrap_or_default().to_string();
        let action = payload["actionType"].as_str().unwrap_or_default().to_string();
        let vm = inner
            .vms
            .get_mut(&uuid)
            .ok_or_else(|| ApiError::NotFound(uuid.clone()))?;
        vm.state = match action.as_str() {
            "START" | "REBOOT" | "RESET" => VmState::Running,
            "STOP" | "SHUTDOWN" => VmState::Shutoff,
            _ => vm.state,
        };
        inner.log.push(format!("action {} {}", action, uuid));
        Ok(TaskHandle::default())
    }

    async fn upload(&self, endpoint: &str, uuid: &str, content: Vec<u8>) -> Result<TaskHandle> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_fail(&mut inner, "upload", endpoint)?;

        let iso = inner
            .isos
            .get_mut(uuid)
            .ok_or_else(|| ApiError::NotFound(uuid.to_string()))?;
        iso.size = content.len() as u64;
        iso.path = format!("isos/{}", iso.name);
        inner.log.push(format!("upload ISO {}", uuid));
        Ok(TaskHandle::default())
    }

    async fn task_status(&self, _tag: &str) -> Result<TaskStatus> {
        // All fake mutations are synchronous; nothing ever polls.
        Ok(TaskStatus {
            state: TaskState::Complete,
            formatted_description: None,
        })
    }
}

/// Shorthand used across the scenario tests.
pub fn node(uuid: &str, peer_id: i64) -> Node {
    Node {
        uuid: uuid.to_string(),
        backplane_ip: format!("10.0.0.{}", peer_id),
        lan_ip: format!("192.168.1.{}", peer_id),
        peer_id,
    }
}

/// A VM desired-state document used as the baseline in several tests.
pub fn demo_vm_doc(name: &str) -> Value {
    json!({
        "resource": "vm",
        "vm_name": name,
        "state": "present",
        "description": "integration test vm",
        "tags": ["group", "demo"],
        "memory": 1073741824u64,
        "vcpu": 2,
        "power_state": "start",
        "disks": [
            {"type": "virtio_disk", "disk_slot": 0, "size": 10_000_000_000u64}
        ],
        "nics": [
            {"type": "virtio", "vlan": 0}
        ]
    })
}
