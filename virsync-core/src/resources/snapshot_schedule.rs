//! Snapshot schedule reconciliation.
//!
//! A schedule carries a list of recurrence rules. Recurrences are matched
//! by name; matched entries keep their cluster-assigned uuid so a value
//! change never recreates them, and entries missing from the desired list
//! are dropped (the recurrence list is fully managed).

use serde::Deserialize;
use serde_json::json;
use virsync_client::resources::{ScheduleRecurrence, VirDomainSnapshotSchedule};
use virsync_client::{ClusterApi, endpoints};

use crate::changeset::{ChangeSet, Operation};
use crate::diff::match_by_key;
use crate::error::{ReconcileError, Result};
use crate::outcome::Outcome;
use crate::resources::{ReconcileOptions, Runner, State, record};

/// One desired recurrence rule.
#[derive(Debug, Clone, Deserialize)]
pub struct DesiredRecurrence {
    pub name: String,
    /// RFC 5545 rule, e.g. `FREQ=WEEKLY;INTERVAL=1;BYDAY=MO`.
    pub frequency: String,
    /// Omitted start time leaves the current one unmanaged.
    #[serde(default)]
    pub start_time: Option<String>,
    /// Retention in seconds; omitted means keep forever.
    #[serde(default)]
    pub local_retention: Option<u64>,
    #[serde(default)]
    pub remote_retention: Option<u64>,
}

impl DesiredRecurrence {
    /// Build the wire entry, inheriting identity and unmanaged fields from
    /// the matched current entry when one exists.
    fn to_wire(&self, existing: Option<&ScheduleRecurrence>) -> ScheduleRecurrence {
        ScheduleRecurrence {
            uuid: existing.map(|e| e.uuid.clone()).unwrap_or_default(),
            name: self.name.clone(),
            rrule: self.frequency.clone(),
            dtstart: match &self.start_time {
                Some(start) => start.clone(),
                None => existing.map(|e| e.dtstart.clone()).unwrap_or_default(),
            },
            local_retention_duration_seconds: self.local_retention.unwrap_or(0),
            remote_retention_duration_seconds: self.remote_retention.unwrap_or(0),
        }
    }
}

/// Desired snapshot schedule, identified by name.
#[derive(Debug, Deserialize)]
pub struct DesiredSnapshotSchedule {
    pub name: String,
    pub state: State,
    #[serde(default)]
    pub recurrences: Vec<DesiredRecurrence>,
}

pub(crate) fn validate(desired: &DesiredSnapshotSchedule) -> Result<()> {
    for (i, r) in desired.recurrences.iter().enumerate() {
        if r.name.is_empty() {
            return Err(ReconcileError::Validation(format!(
                "recurrence {} needs a name",
                i
            )));
        }
        if r.frequency.is_empty() {
            return Err(ReconcileError::Validation(format!(
                "recurrence {} needs a frequency rule",
                r.name
            )));
        }
    }
    let mut names: Vec<&str> = desired.recurrences.iter().map(|r| r.name.as_str()).collect();
    names.sort_unstable();
    names.dedup();
    if names.len() != desired.recurrences.len() {
        return Err(ReconcileError::Validation(
            "recurrence names must be unique".to_string(),
        ));
    }
    Ok(())
}

/// Plan the schedule operations. Change detection is key-based: reordering
/// recurrences with identical content is not a change.
pub(crate) fn plan(
    desired: &DesiredSnapshotSchedule,
    current: Option<&VirDomainSnapshotSchedule>,
) -> ChangeSet {
    let mut changeset = ChangeSet::new();
    match (desired.state, current) {
        (State::Absent, None) => {}
        (State::Absent, Some(current)) => {
            changeset.push(Operation::delete(
                endpoints::SNAPSHOT_SCHEDULE,
                &current.uuid,
            ));
        }
        (State::Present, None) => {
            let rrules: Vec<ScheduleRecurrence> = desired
                .recurrences
                .iter()
                .map(|r| r.to_wire(None))
                .collect();
            changeset.push(Operation::create(
                endpoints::SNAPSHOT_SCHEDULE,
                json!({"name": desired.name, "rrules": rrules}),
            ));
        }
        (State::Present, Some(current)) => {
            let m = match_by_key(
                &desired.recurrences,
                &current.rrules,
                |d| d.name.clone(),
                |c| c.name.clone(),
            );

            let mut differs = !m.missing.is_empty() || !m.leftover.is_empty();
            let mut rrules = Vec::with_capacity(desired.recurrences.len());
            for (d, c) in &m.matched {
                let wire = d.to_wire(Some(c));
                differs |= wire != **c;
                rrules.push(wire);
            }
            for d in &m.missing {
                rrules.push(d.to_wire(None));
            }

            if differs {
                changeset.push(Operation::update(
                    endpoints::SNAPSHOT_SCHEDULE,
                    &current.uuid,
                    json!({"rrules": rrules}),
                ));
            }
        }
    }
    changeset
}

async fn find_by_name(
    api: &dyn ClusterApi,
    name: &str,
) -> Result<Option<VirDomainSnapshotSchedule>> {
    let records = api
        .list(endpoints::SNAPSHOT_SCHEDULE, &[("name", name.to_string())])
        .await?;
    for r in records {
        let schedule: VirDomainSnapshotSchedule =
            serde_json::from_value(r).map_err(virsync_client::ApiError::from)?;
        if schedule.name == name {
            return Ok(Some(schedule));
        }
    }
    Ok(None)
}

pub async fn reconcile(
    api: &dyn ClusterApi,
    desired: DesiredSnapshotSchedule,
    opts: &ReconcileOptions,
) -> Result<Outcome> {
    if desired.state == State::Present {
        validate(&desired)?;
    }
    let current = find_by_name(api, &desired.name).await?;
    let before = current.as_ref().and_then(record);

    let changeset = plan(&desired, current.as_ref());
    if changeset.is_empty() {
        return Ok(Outcome::unchanged(before));
    }

    let mut runner = Runner::new(api, opts, before.clone());
    if let Err(outcome) = runner.run(changeset).await {
        return Ok(*outcome);
    }

    let after = find_by_name(api, &desired.name).await?;
    Ok(Outcome::converged(before, after.as_ref().and_then(record)))
}
