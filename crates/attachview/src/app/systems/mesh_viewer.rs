//! glTF mesh viewer
//!
//! The viewer root owns the download thread through [`MeshViewer`]. Each frame
//! the poll system drains progress events; once the asset is decoded the
//! model is fitted to [`MESH_TARGET_EXTENT`], centered, and put on a shadowed
//! stage. Despawning the root cancels an in-flight load.

use bevy::asset::RenderAssetUsages;
use bevy::light::NotShadowCaster;
use bevy::mesh::{Indices, PrimitiveTopology};
use bevy::prelude::*;
use bevy::render::render_resource::Face;

use super::camera::{OrbitCamera, ViewerCamera};
use super::lighting::{insert_ambient_light, spawn_key_light, MESH_KEY_LIGHT_POSITION};
use crate::lib::fetch::ApiClient;
use crate::lib::geometry::MESH_TARGET_EXTENT;
use crate::lib::mesh_asset::{MeshAsset, MeshPart};
use crate::lib::progress::MeshLoadState;
use crate::lib::workers::{MeshLoadEvent, MeshLoadJob};

pub const INITIAL_FOV_DEGREES: f32 = 75.0;
pub const MIN_FOV_DEGREES: f32 = 10.0;
pub const MAX_FOV_DEGREES: f32 = 100.0;
pub const FOV_STEP_DEGREES: f32 = 5.0;

pub const CAMERA_START: Vec3 = Vec3::new(0.0, 2.0, 5.0);
pub const GROUND_SIZE: f32 = 500.0;
pub const GROUND_HEIGHT: f32 = -1.5;

/// Root component of a mounted mesh viewer
#[derive(Component)]
pub struct MeshViewer {
    pub href: String,
    pub name: String,
    pub state: MeshLoadState,
    job: Option<MeshLoadJob>,
}

impl MeshViewer {
    pub fn percent(&self) -> Option<u8> {
        self.state.percent()
    }
}

/// Fitted model container, child of the viewer root
#[derive(Component)]
pub struct MeshModel;

#[derive(Component)]
pub struct GroundPlane;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    In,
    Out,
}

/// Step the mesh viewer camera's field of view
#[derive(Message, Debug, Clone, Copy)]
pub struct ZoomCamera(pub ZoomDirection);

pub struct MeshViewerPlugin;

impl Plugin for MeshViewerPlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<ZoomCamera>()
            .add_systems(Update, (poll_mesh_loads, apply_zoom));
    }
}

/// Spawn the viewer root with its camera and lights and start the download
pub fn mount_mesh_viewer(
    commands: &mut Commands,
    client: &ApiClient,
    href: &str,
    name: &str,
) -> std::io::Result<Entity> {
    let job = MeshLoadJob::spawn(client.clone(), href)?;
    let mut state = MeshLoadState::default();
    state.start();

    let root = commands
        .spawn((
            Name::new(format!("Mesh viewer: {name}")),
            MeshViewer {
                href: href.to_string(),
                name: name.to_string(),
                state,
                job: Some(job),
            },
            Transform::default(),
            Visibility::default(),
        ))
        .with_children(|parent| {
            parent.spawn((
                Camera3d::default(),
                Projection::from(PerspectiveProjection {
                    fov: INITIAL_FOV_DEGREES.to_radians(),
                    ..default()
                }),
                Transform::from_translation(CAMERA_START).looking_at(Vec3::ZERO, Vec3::Y),
                OrbitCamera::looking_from(CAMERA_START, Vec3::ZERO),
                ViewerCamera,
            ));
        })
        .id();

    insert_ambient_light(commands);
    spawn_key_light(commands, root, MESH_KEY_LIGHT_POSITION, true);

    info!("Loading mesh from {}", href);
    Ok(root)
}

/// Drain load events and move each viewer through its state machine
pub fn poll_mesh_loads(
    mut commands: Commands,
    mut viewers: Query<(Entity, &mut MeshViewer)>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    for (root, mut viewer) in &mut viewers {
        let Some(job) = viewer.job.as_ref() else {
            continue;
        };
        let events = job.poll();
        if events.is_empty() {
            continue;
        }

        let mut finished = false;
        for event in events {
            match event {
                MeshLoadEvent::Progress { loaded, total } => viewer.state.progress(loaded, total),
                MeshLoadEvent::Loaded(asset) => {
                    finished = true;
                    match spawn_model(&mut commands, root, &asset, &mut meshes, &mut materials) {
                        Ok(()) => {
                            info!(
                                "Mesh '{}' ready: {} parts, {} triangles",
                                viewer.name,
                                asset.parts.len(),
                                asset.triangle_count()
                            );
                            viewer.state.ready();
                        }
                        Err(err) => {
                            error!("Mesh '{}' cannot be displayed: {}", viewer.name, err);
                            viewer.state.fail(err.to_string());
                        }
                    }
                }
                MeshLoadEvent::Failed(err) => {
                    finished = true;
                    error!("Failed to load mesh '{}': {}", viewer.name, err);
                    viewer.state.fail(err.to_string());
                }
            }
        }

        if finished {
            viewer.job = None;
        }
    }
}

fn spawn_model(
    commands: &mut Commands,
    root: Entity,
    asset: &MeshAsset,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
) -> Result<(), crate::lib::geometry::GeometryError> {
    let (scale, offset) = asset.fit_transform(MESH_TARGET_EXTENT)?;

    let parts: Vec<_> = asset
        .parts
        .iter()
        .map(|part| {
            (
                meshes.add(build_mesh(part)),
                materials.add(part_material(part)),
                Transform::from_matrix(part.transform),
            )
        })
        .collect();

    let ground_mesh = meshes.add(Plane3d::default().mesh().size(GROUND_SIZE, GROUND_SIZE));
    let ground_material = materials.add(StandardMaterial {
        base_color: Color::srgb(0.25, 0.25, 0.25),
        perceptual_roughness: 1.0,
        ..default()
    });

    commands.entity(root).with_children(|parent| {
        parent
            .spawn((
                MeshModel,
                Transform::from_translation(offset).with_scale(Vec3::splat(scale)),
                Visibility::default(),
            ))
            .with_children(|model| {
                for (mesh, material, transform) in parts {
                    model.spawn((Mesh3d(mesh), MeshMaterial3d(material), transform));
                }
            });

        parent.spawn((
            GroundPlane,
            Mesh3d(ground_mesh),
            MeshMaterial3d(ground_material),
            Transform::from_xyz(0.0, GROUND_HEIGHT, 0.0),
            NotShadowCaster,
        ));
    });
    Ok(())
}

/// Bevy mesh for a decoded part
pub fn build_mesh(part: &MeshPart) -> Mesh {
    Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::RENDER_WORLD)
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, part.positions.clone())
        .with_inserted_attribute(Mesh::ATTRIBUTE_NORMAL, part.normals.clone())
        .with_inserted_indices(Indices::U32(part.indices.clone()))
}

fn part_material(part: &MeshPart) -> StandardMaterial {
    let [r, g, b, a] = part.base_color;
    StandardMaterial {
        base_color: Color::srgba(r, g, b, a),
        metallic: part.metallic,
        perceptual_roughness: part.roughness,
        double_sided: part.double_sided,
        cull_mode: if part.double_sided {
            None
        } else {
            Some(Face::Back)
        },
        alpha_mode: if a < 1.0 {
            AlphaMode::Blend
        } else {
            AlphaMode::Opaque
        },
        ..default()
    }
}

/// Next field of view in degrees, clamped to the allowed range
pub fn zoom_fov(current_degrees: f32, direction: ZoomDirection) -> f32 {
    let next = match direction {
        ZoomDirection::In => current_degrees - FOV_STEP_DEGREES,
        ZoomDirection::Out => current_degrees + FOV_STEP_DEGREES,
    };
    next.clamp(MIN_FOV_DEGREES, MAX_FOV_DEGREES)
}

/// Apply zoom requests to mesh viewer cameras; nothing happens without one
pub fn apply_zoom(
    mut requests: MessageReader<ZoomCamera>,
    viewers: Query<&Children, With<MeshViewer>>,
    mut cameras: Query<&mut Projection, With<ViewerCamera>>,
) {
    for ZoomCamera(direction) in requests.read() {
        for children in &viewers {
            for child in children.iter() {
                let Ok(mut projection) = cameras.get_mut(child) else {
                    continue;
                };
                if let Projection::Perspective(perspective) = projection.as_mut() {
                    let fov = zoom_fov(perspective.fov.to_degrees(), *direction);
                    perspective.fov = fov.to_radians();
                    debug!("Mesh camera fov now {:.0} degrees", fov);
                }
            }
        }
    }
}
