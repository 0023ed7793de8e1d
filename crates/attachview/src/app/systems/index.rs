//! Attachment list for one owner, fetched once on a worker thread

use bevy::prelude::*;

use super::RecordService;
use crate::lib::attachment::Attachment;
use crate::lib::workers::{spawn_index_worker, IndexRequest, IndexWorker};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum IndexStatus {
    /// No owner configured
    #[default]
    Idle,
    Loading,
    Loaded,
    Failed(String),
}

#[derive(Resource, Default)]
pub struct AttachmentIndex {
    pub owner_id: Option<String>,
    pub status: IndexStatus,
    pub attachments: Vec<Attachment>,
    /// Opaque patient record, shown as the panel header when present
    pub patient: Option<serde_json::Value>,
    worker: Option<IndexWorker>,
}

impl AttachmentIndex {
    pub fn for_owner(owner_id: Option<String>) -> Self {
        Self {
            owner_id,
            ..default()
        }
    }

    /// Human readable patient name, if the record carries one
    pub fn patient_title(&self) -> Option<String> {
        let patient = self.patient.as_ref()?;
        ["name", "full_name", "display_name"]
            .iter()
            .find_map(|key| patient.get(*key).and_then(|v| v.as_str()))
            .map(str::to_string)
    }
}

pub struct AttachmentIndexPlugin;

impl Plugin for AttachmentIndexPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<AttachmentIndex>()
            .add_systems(Startup, start_index_fetch)
            .add_systems(Update, poll_index);
    }
}

fn start_index_fetch(mut index: ResMut<AttachmentIndex>, service: Res<RecordService>) {
    let Some(owner_id) = index.owner_id.clone() else {
        return;
    };
    let worker = match spawn_index_worker(service.0.clone()) {
        Ok(worker) => worker,
        Err(err) => {
            error!("Failed to start index worker: {}", err);
            index.status = IndexStatus::Failed(err.to_string());
            return;
        }
    };
    if let Err(err) = worker.send(IndexRequest {
        owner_id: owner_id.clone(),
    }) {
        index.status = IndexStatus::Failed(err.to_string());
        return;
    }
    info!("Fetching attachments for owner {}", owner_id);
    index.status = IndexStatus::Loading;
    index.worker = Some(worker);
}

fn poll_index(mut index: ResMut<AttachmentIndex>) {
    let Some(response) = index.worker.as_ref().and_then(|worker| worker.try_recv()) else {
        return;
    };
    // One request per run; the worker is no longer needed
    index.worker = None;
    index.patient = response.patient;
    match response.attachments {
        Ok(attachments) => {
            info!(
                "Owner {} has {} attachments",
                response.owner_id,
                attachments.len()
            );
            index.attachments = attachments;
            index.status = IndexStatus::Loaded;
        }
        Err(err) => index.status = IndexStatus::Failed(err.to_string()),
    }
}
