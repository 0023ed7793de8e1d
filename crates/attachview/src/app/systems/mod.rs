//! ECS side of the viewer: routing, the two 3D viewers, and camera glue

use bevy::prelude::*;

use crate::lib::fetch::ApiClient;

pub mod camera;
pub mod index;
pub mod lighting;
pub mod mesh_viewer;
pub mod router;
pub mod spline_viewer;

/// Shared client for the record service
#[derive(Resource, Clone, Deref)]
pub struct RecordService(pub ApiClient);

/// All viewer systems; expects [`RecordService`] and
/// [`ViewerConfig`](crate::lib::settings::ViewerConfig) to be inserted.
pub struct AttachviewPlugin;

impl Plugin for AttachviewPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins((
            camera::ViewerCameraPlugin,
            index::AttachmentIndexPlugin,
            router::RouterPlugin,
            mesh_viewer::MeshViewerPlugin,
            spline_viewer::SplineViewerPlugin,
        ));
    }
}
