//! Attachment router
//!
//! Opening an attachment always tears the current viewer down first, then
//! mounts whichever viewer the media type selects. Only one viewer root
//! exists at a time.

use bevy::prelude::*;

use super::mesh_viewer::mount_mesh_viewer;
use super::spline_viewer::mount_spline_viewer;
use super::RecordService;
use crate::lib::attachment::{route, Attachment, ViewerKind};
use crate::lib::settings::ViewerConfig;

/// Request to show an attachment
#[derive(Message, Debug, Clone)]
pub struct OpenAttachment {
    pub attachment: Attachment,
}

/// What the central area currently shows
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ViewerView {
    #[default]
    Empty,
    Mesh {
        root: Entity,
    },
    Spline {
        root: Entity,
    },
    /// Handled by the flat image viewer; only the URL and name are shown
    Image {
        url: String,
        name: String,
    },
    Unsupported {
        media_type: String,
    },
    /// The viewer could not even be mounted
    Failed {
        reason: String,
    },
}

#[derive(Resource, Debug, Default)]
pub struct ActiveViewer {
    pub view: ViewerView,
    pub attachment: Option<Attachment>,
}

impl ActiveViewer {
    /// Root entity of the mounted 3D viewer
    pub fn root(&self) -> Option<Entity> {
        match self.view {
            ViewerView::Mesh { root } | ViewerView::Spline { root } => Some(root),
            _ => None,
        }
    }
}

pub struct RouterPlugin;

impl Plugin for RouterPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ActiveViewer>()
            .add_message::<OpenAttachment>()
            .add_systems(Update, open_attachments);
    }
}

/// Unmount the current viewer and mount the one for the newest request
pub fn open_attachments(
    mut commands: Commands,
    mut requests: MessageReader<OpenAttachment>,
    mut active: ResMut<ActiveViewer>,
    service: Res<RecordService>,
    config: Res<ViewerConfig>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    // Only the newest request matters when several arrive in one frame
    let Some(request) = requests.read().last().cloned() else {
        return;
    };

    if let Some(root) = active.root() {
        debug!("Unmounting viewer {:?}", root);
        commands.entity(root).despawn();
    }

    let target = route(&request.attachment);
    info!(
        "Opening '{}' ({}) with the {} viewer",
        target.name,
        request.attachment.media_type,
        target.kind.name()
    );

    active.view = match (target.kind, target.href) {
        (ViewerKind::Mesh, Some(href)) => match mount_mesh_viewer(&mut commands, &service, &href, &target.name) {
            Ok(root) => ViewerView::Mesh { root },
            Err(err) => {
                error!("Failed to start mesh loader: {}", err);
                ViewerView::Failed {
                    reason: err.to_string(),
                }
            }
        },
        (ViewerKind::Spline, Some(href)) => match mount_spline_viewer(
            &mut commands,
            &mut meshes,
            &mut materials,
            &config,
            &service,
            &href,
            &target.name,
        ) {
            Ok(root) => ViewerView::Spline { root },
            Err(err) => {
                error!("Failed to start spline workers: {}", err);
                ViewerView::Failed {
                    reason: err.to_string(),
                }
            }
        },
        (ViewerKind::Image, Some(href)) => match service.resolve(&href) {
            Ok(url) => ViewerView::Image {
                url: url.to_string(),
                name: target.name,
            },
            Err(err) => {
                error!("{}", err);
                ViewerView::Failed {
                    reason: err.to_string(),
                }
            }
        },
        (ViewerKind::Unsupported(media_type), _) => {
            warn!("No viewer available for media type: {}", media_type);
            ViewerView::Unsupported { media_type }
        }
        (_, None) => ViewerView::Unsupported {
            media_type: request.attachment.media_type.clone(),
        },
    };
    active.attachment = Some(request.attachment);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lib::attachment::{Link, DATA_REL};
    use crate::lib::fetch::ApiClient;
    use std::time::Duration;

    fn attachment(media_type: &str) -> Attachment {
        Attachment {
            id: serde_json::json!(1),
            media_type: media_type.to_string(),
            name: "report".to_string(),
            links: vec![Link {
                rel: DATA_REL.to_string(),
                href: "/attachments/1/data".to_string(),
                method: Some("GET".to_string()),
            }],
        }
    }

    fn test_app() -> App {
        let client = ApiClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .insert_resource(RecordService(client))
            .insert_resource(ViewerConfig::default())
            .init_resource::<Assets<Mesh>>()
            .init_resource::<Assets<StandardMaterial>>()
            .add_plugins(RouterPlugin);
        app
    }

    #[test]
    fn test_unsupported_media_type_tears_down_previous_viewer() {
        let mut app = test_app();
        let previous = app.world_mut().spawn_empty().id();
        app.world_mut().resource_mut::<ActiveViewer>().view = ViewerView::Mesh { root: previous };

        app.world_mut().write_message(OpenAttachment {
            attachment: attachment("application/pdf"),
        });
        app.update();

        assert!(app.world().get_entity(previous).is_err());
        let active = app.world().resource::<ActiveViewer>();
        assert_eq!(
            active.view,
            ViewerView::Unsupported {
                media_type: "application/pdf".to_string()
            }
        );
        assert!(active.root().is_none());
    }

    #[test]
    fn test_image_shows_resolved_url() {
        let mut app = test_app();
        app.world_mut().write_message(OpenAttachment {
            attachment: attachment("image/jpeg"),
        });
        app.update();

        assert_eq!(
            app.world().resource::<ActiveViewer>().view,
            ViewerView::Image {
                url: "http://127.0.0.1:9/attachments/1/data".to_string(),
                name: "report".to_string(),
            }
        );
    }

    #[test]
    fn test_last_request_in_frame_wins() {
        let mut app = test_app();
        app.world_mut().write_message(OpenAttachment {
            attachment: attachment("image/jpeg"),
        });
        app.world_mut().write_message(OpenAttachment {
            attachment: attachment("text/plain"),
        });
        app.update();

        assert!(matches!(
            app.world().resource::<ActiveViewer>().view,
            ViewerView::Unsupported { .. }
        ));
    }
}
