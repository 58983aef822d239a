//! ISO image reconciliation.
//!
//! Presence runs in two phases because the upload needs the record's
//! uuid: first the record is created, then the content is uploaded and the
//! image flagged ready for insertion. An image that already exists by name
//! is left alone; content is not re-verified.

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::json;
use tracing::info;
use virsync_client::resources::Iso;
use virsync_client::{ClusterApi, endpoints};

use crate::changeset::{ChangeSet, Operation};
use crate::error::{ReconcileError, Result};
use crate::outcome::Outcome;
use crate::resources::{ReconcileOptions, Runner, State, record};

/// Desired ISO image, identified by name.
#[derive(Debug, Deserialize)]
pub struct DesiredIso {
    pub name: String,
    pub state: State,
    /// Local file to upload; required when creating the image.
    #[serde(default)]
    pub source_path: Option<PathBuf>,
}

async fn find_by_name(api: &dyn ClusterApi, name: &str) -> Result<Option<Iso>> {
    let records = api
        .list(endpoints::ISO, &[("name", name.to_string())])
        .await?;
    for r in records {
        let iso: Iso = serde_json::from_value(r).map_err(virsync_client::ApiError::from)?;
        if iso.name == name {
            return Ok(Some(iso));
        }
    }
    Ok(None)
}

pub async fn reconcile(
    api: &dyn ClusterApi,
    desired: DesiredIso,
    opts: &ReconcileOptions,
) -> Result<Outcome> {
    let current = find_by_name(api, &desired.name).await?;
    let before = current.as_ref().and_then(record);

    match (desired.state, current) {
        (State::Present, Some(_)) => Ok(Outcome::unchanged(before)),
        (State::Absent, None) => Ok(Outcome::unchanged(None)),
        (State::Absent, Some(current)) => {
            let mut changeset = ChangeSet::new();
            changeset.push(Operation::delete(endpoints::ISO, &current.uuid));

            let mut runner = Runner::new(api, opts, before.clone());
            if let Err(outcome) = runner.run(changeset).await {
                return Ok(*outcome);
            }
            Ok(Outcome::converged(before, None))
        }
        (State::Present, None) => {
            let path = desired.source_path.as_ref().ok_or_else(|| {
                ReconcileError::Validation(format!(
                    "source_path is required to create ISO {}",
                    desired.name
                ))
            })?;
            let content = tokio::fs::read(path).await.map_err(|source| {
                ReconcileError::Source {
                    path: path.display().to_string(),
                    source,
                }
            })?;
            info!(name = %desired.name, bytes = content.len(), "Uploading ISO image");

            let mut runner = Runner::new(api, opts, None);

            // Phase 1: the record; its uuid is needed for the upload.
            let mut create = ChangeSet::new();
            create.push(Operation::create(
                endpoints::ISO,
                json!({
                    "name": desired.name,
                    "size": content.len() as u64,
                    "readyForInsert": false,
                }),
            ));
            let created_uuid = match runner.run(create).await {
                Ok(uuid) => uuid,
                Err(outcome) => return Ok(*outcome),
            };
            let uuid = match created_uuid {
                Some(uuid) => uuid,
                None => {
                    // Cluster did not echo the uuid; resolve it by name.
                    find_by_name(api, &desired.name)
                        .await?
                        .map(|iso| iso.uuid)
                        .ok_or_else(|| {
                            ReconcileError::NotFound(format!(
                                "ISO {} after creation",
                                desired.name
                            ))
                        })?
                }
            };

            // Phase 2: content, then flag the image usable.
            let mut upload = ChangeSet::new();
            upload.push(Operation::upload(endpoints::ISO, &uuid, content));
            upload.push(Operation::update(
                endpoints::ISO,
                &uuid,
                json!({"readyForInsert": true}),
            ));
            if let Err(outcome) = runner.run(upload).await {
                return Ok(*outcome);
            }

            let after = find_by_name(api, &desired.name).await?;
            Ok(Outcome::converged(None, after.as_ref().and_then(record)))
        }
    }
}
