//! Spline dataset viewer
//!
//! Mounting spawns a root entity owning both background workers, a camera,
//! lights, and a rotating group that holds the rendered curves and point
//! markers. The flow per dataset is:
//!
//! 1. the classify worker downloads and classifies the payload,
//! 2. the splines go to the normalize worker,
//! 3. the normalized result replaces the group's children wholesale and the
//!    camera is reframed.
//!
//! Every request carries the viewer's current generation; answers for an
//! older generation are dropped. A failure at any step empties the group, so
//! a failed reload never leaves the previous dataset on screen.

use bevy::asset::RenderAssetUsages;
use bevy::mesh::PrimitiveTopology;
use bevy::prelude::*;
use bevy::window::PrimaryWindow;
use bevy_egui::EguiContexts;

use super::camera::ViewerCamera;
use super::lighting::{insert_ambient_light, spawn_key_light, SPLINE_KEY_LIGHT_POSITION};
use crate::lib::curve::closed_curve;
use crate::lib::dataset::Scalar;
use crate::lib::fetch::ApiClient;
use crate::lib::framing::frame_dataset;
use crate::lib::geometry::{NormalizationScope, SPLINE_TARGET_EXTENT};
use crate::lib::picking::{pick_nearest, viewport_to_ndc, PickRay, Selection};
use crate::lib::settings::ViewerConfig;
use crate::lib::workers::{
    spawn_classify_worker, spawn_normalize_worker, ClassifyRequest, ClassifyWorker,
    NormalizeRequest, NormalizeWorker, NormalizedSpline, WorkerError,
};

pub const BACKGROUND: Color = Color::srgb(0.125, 0.125, 0.125);
pub const CURVE_COLOR: Color = Color::srgb(1.0, 0.0, 0.0);
pub const MARKER_COLOR: Color = Color::WHITE;
pub const HIGHLIGHT_COLOR: Color = Color::srgb(1.0, 1.0, 0.0);

const CAMERA_FOV_DEGREES: f32 = 75.0;
const CAMERA_FAR: f32 = 10_000.0;
/// Reference frame rate the rotation speed is expressed in
const ROTATION_REFERENCE_FPS: f32 = 60.0;

#[derive(Debug, Clone, PartialEq)]
pub enum SplineStatus {
    Fetching,
    Normalizing,
    Ready {
        splines: usize,
        scalars: usize,
        points: usize,
    },
    Failed(String),
}

/// Root component of a mounted spline viewer
#[derive(Component)]
pub struct SplineViewer {
    pub href: String,
    pub name: String,
    pub status: SplineStatus,
    pub scalars: Vec<Scalar>,
    /// Labels of the rendered splines, indexed by [`PickableMarker::spline`]
    pub labels: Vec<String>,
    scope: NormalizationScope,
    generation: u64,
    group: Entity,
    camera: Entity,
    selection: Selection<Entity>,
    /// Set by a failure; the next poll empties the group
    clear_pending: bool,
    classify: ClassifyWorker,
    normalize: NormalizeWorker,
}

impl SplineViewer {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn selected(&self) -> Option<Entity> {
        self.selection.current()
    }

    /// Start a new fetch; anything still in flight becomes stale
    pub fn request(&mut self) {
        self.generation += 1;
        self.status = SplineStatus::Fetching;
        let request = ClassifyRequest {
            generation: self.generation,
            href: self.href.clone(),
        };
        if let Err(err) = self.classify.send(request) {
            self.fail(err);
        }
    }

    fn fail(&mut self, err: WorkerError) {
        error!("Spline viewer '{}': {}", self.name, err);
        self.status = SplineStatus::Failed(err.to_string());
        self.clear_pending = true;
    }
}

/// Render resources shared by everything one viewer draws
#[derive(Component)]
pub struct SplineMaterials {
    pub curve: Handle<StandardMaterial>,
    pub marker: Handle<StandardMaterial>,
    pub highlight: Handle<StandardMaterial>,
    pub marker_mesh: Handle<Mesh>,
    pub marker_radius: f32,
    pub curve_divisions: usize,
}

/// Parent of all curves and markers; rotates about Y
#[derive(Component)]
pub struct SplineGroup {
    /// Radians per 1/60 s
    pub rotation_speed: f32,
}

#[derive(Component)]
pub struct SplineCurve {
    pub spline: usize,
}

/// Sphere at a normalized spline point
#[derive(Component, Debug, Clone, Copy)]
pub struct PickableMarker {
    pub spline: usize,
    pub index: usize,
    pub radius: f32,
}

/// Refetch the dataset of every mounted spline viewer
#[derive(Message, Debug, Clone, Copy)]
pub struct RefreshDataset;

/// Result of a click inside a viewer; `hit` is `None` for a miss
#[derive(Message, Debug, Clone, Copy)]
pub struct MarkerPicked {
    pub viewer: Entity,
    pub hit: Option<Entity>,
}

pub struct SplineViewerPlugin;

impl Plugin for SplineViewerPlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<RefreshDataset>()
            .add_message::<MarkerPicked>()
            .add_systems(
                Update,
                (
                    refresh_datasets,
                    poll_spline_workers,
                    rotate_spline_groups,
                    pick_spline_markers,
                    highlight_picked_markers,
                )
                    .chain(),
            );
    }
}

/// Spawn the viewer root, its camera, lights and group, and start fetching
pub fn mount_spline_viewer(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
    config: &ViewerConfig,
    client: &ApiClient,
    href: &str,
    name: &str,
) -> std::io::Result<Entity> {
    let classify = spawn_classify_worker(client.clone())?;
    let normalize = spawn_normalize_worker()?;

    let camera = commands
        .spawn((
            Camera3d::default(),
            Camera {
                clear_color: ClearColorConfig::Custom(BACKGROUND),
                ..default()
            },
            Projection::from(PerspectiveProjection {
                fov: CAMERA_FOV_DEGREES.to_radians(),
                far: CAMERA_FAR,
                ..default()
            }),
            Transform::from_xyz(0.0, 0.0, SPLINE_TARGET_EXTENT * 2.0).looking_at(Vec3::ZERO, Vec3::Y),
            ViewerCamera,
        ))
        .id();

    let group = commands
        .spawn((
            SplineGroup {
                rotation_speed: config.rotation_speed,
            },
            Transform::default(),
            Visibility::default(),
        ))
        .id();

    let spline_materials = SplineMaterials {
        curve: materials.add(StandardMaterial {
            base_color: CURVE_COLOR,
            unlit: true,
            ..default()
        }),
        marker: materials.add(StandardMaterial {
            base_color: MARKER_COLOR,
            ..default()
        }),
        highlight: materials.add(StandardMaterial {
            base_color: HIGHLIGHT_COLOR,
            emissive: LinearRgba::rgb(0.4, 0.4, 0.0),
            ..default()
        }),
        marker_mesh: meshes.add(Sphere::new(config.marker_radius).mesh().uv(16, 12)),
        marker_radius: config.marker_radius,
        curve_divisions: config.curve_divisions,
    };

    let mut viewer = SplineViewer {
        href: href.to_string(),
        name: name.to_string(),
        status: SplineStatus::Fetching,
        scalars: Vec::new(),
        labels: Vec::new(),
        scope: config.normalization_scope,
        generation: 0,
        group,
        camera,
        selection: Selection::default(),
        clear_pending: false,
        classify,
        normalize,
    };
    viewer.request();

    let root = commands
        .spawn((
            Name::new(format!("Spline viewer: {name}")),
            viewer,
            spline_materials,
            Transform::default(),
            Visibility::default(),
        ))
        .add_children(&[camera, group])
        .id();

    insert_ambient_light(commands);
    spawn_key_light(commands, root, SPLINE_KEY_LIGHT_POSITION, false);

    info!("Loading spline dataset from {}", href);
    Ok(root)
}

fn refresh_datasets(mut requests: MessageReader<RefreshDataset>, mut viewers: Query<&mut SplineViewer>) {
    if requests.read().count() == 0 {
        return;
    }
    for mut viewer in &mut viewers {
        info!("Refreshing dataset '{}'", viewer.name);
        viewer.request();
    }
}

/// Advance each viewer with whatever its workers have answered
pub fn poll_spline_workers(
    mut commands: Commands,
    mut viewers: Query<(&mut SplineViewer, &SplineMaterials)>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut cameras: Query<&mut Transform, With<ViewerCamera>>,
) {
    for (mut viewer, materials) in &mut viewers {
        let mut rebuild: Option<Vec<NormalizedSpline>> = None;

        for response in viewer.classify.drain() {
            if response.generation != viewer.generation {
                debug!("Dropping stale classification (generation {})", response.generation);
                continue;
            }
            match response.outcome {
                Ok(dataset) => {
                    info!(
                        "Classified '{}': {} splines, {} scalars",
                        viewer.name,
                        dataset.splines.len(),
                        dataset.scalars.len()
                    );
                    viewer.scalars = dataset.scalars;
                    if dataset.splines.is_empty() {
                        rebuild = Some(Vec::new());
                        continue;
                    }
                    viewer.status = SplineStatus::Normalizing;
                    let request = NormalizeRequest {
                        generation: viewer.generation,
                        splines: dataset.splines,
                        target_extent: SPLINE_TARGET_EXTENT,
                        scope: viewer.scope,
                    };
                    if let Err(err) = viewer.normalize.send(request) {
                        viewer.fail(err);
                    }
                }
                Err(err) => viewer.fail(err),
            }
        }

        for response in viewer.normalize.drain() {
            if response.generation != viewer.generation {
                debug!("Dropping stale normalization (generation {})", response.generation);
                continue;
            }
            match response.outcome {
                Ok(normalized) => rebuild = Some(normalized),
                Err(err) => viewer.fail(err),
            }
        }

        if viewer.clear_pending {
            viewer.clear_pending = false;
            clear_group(&mut commands, &mut viewer);
        }

        let Some(normalized) = rebuild else {
            continue;
        };

        rebuild_group(&mut commands, viewer.group, &normalized, materials, &mut meshes);
        viewer.selection.clear();
        viewer.labels = normalized.iter().map(|s| s.label.clone()).collect();
        viewer.status = SplineStatus::Ready {
            splines: normalized.len(),
            scalars: viewer.scalars.len(),
            points: normalized.iter().map(|s| s.points.len()).sum(),
        };

        let points = normalized.iter().flat_map(|s| s.points.iter());
        if let Some(framing) = frame_dataset(points, viewer.scalars.len()) {
            if let Ok(mut transform) = cameras.get_mut(viewer.camera) {
                *transform = Transform::from_translation(framing.position)
                    .looking_at(framing.target, Vec3::Y);
            }
        }
    }
}

fn clear_group(commands: &mut Commands, viewer: &mut SplineViewer) {
    debug!("Clearing geometry of '{}'", viewer.name);
    commands.entity(viewer.group).despawn_related::<Children>();
    viewer.selection.clear();
    viewer.labels.clear();
}

/// Replace every child of `group` with curves and markers for `splines`
fn rebuild_group(
    commands: &mut Commands,
    group: Entity,
    splines: &[NormalizedSpline],
    materials: &SplineMaterials,
    meshes: &mut Assets<Mesh>,
) {
    let curves: Vec<_> = splines
        .iter()
        .map(|spline| meshes.add(curve_mesh(&spline.points, materials.curve_divisions)))
        .collect();

    let mut group_commands = commands.entity(group);
    group_commands.despawn_related::<Children>();
    group_commands.with_children(|parent| {
        for (spline_index, (spline, curve)) in splines.iter().zip(curves).enumerate() {
            parent.spawn((
                SplineCurve {
                    spline: spline_index,
                },
                Mesh3d(curve),
                MeshMaterial3d(materials.curve.clone()),
                Transform::default(),
            ));
            for (index, point) in spline.points.iter().enumerate() {
                parent.spawn((
                    PickableMarker {
                        spline: spline_index,
                        index,
                        radius: materials.marker_radius,
                    },
                    Mesh3d(materials.marker_mesh.clone()),
                    MeshMaterial3d(materials.marker.clone()),
                    Transform::from_translation(*point),
                ));
            }
        }
    });
}

/// Closed curve through `points` as a line strip
pub fn curve_mesh(points: &[Vec3], divisions: usize) -> Mesh {
    let vertices: Vec<[f32; 3]> = closed_curve(points, divisions)
        .into_iter()
        .map(|p| p.to_array())
        .collect();
    Mesh::new(PrimitiveTopology::LineStrip, RenderAssetUsages::RENDER_WORLD)
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, vertices)
}

/// Frame-rate independent rotation about Y
pub fn rotate_spline_groups(time: Res<Time>, mut groups: Query<(&mut Transform, &SplineGroup)>) {
    let frames = time.delta_secs() * ROTATION_REFERENCE_FPS;
    for (mut transform, group) in &mut groups {
        transform.rotate_y(group.rotation_speed * frames);
    }
}

/// World-space ray under the cursor, `None` outside the camera's viewport
pub fn cursor_ray(camera: &Camera, transform: &GlobalTransform, cursor: Vec2) -> Option<PickRay> {
    let viewport = camera.logical_viewport_rect()?;
    let ndc = viewport_to_ndc(cursor, viewport)?;
    // Reverse-Z: 1 is the near plane, values toward 0 approach infinity
    let near = camera.ndc_to_world(transform, ndc.extend(1.0))?;
    let far = camera.ndc_to_world(transform, ndc.extend(f32::EPSILON))?;
    PickRay::through(near, far)
}

/// Left click picks the nearest marker under the cursor
pub fn pick_spline_markers(
    buttons: Res<ButtonInput<MouseButton>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut egui_contexts: EguiContexts,
    viewers: Query<(Entity, &SplineViewer)>,
    cameras: Query<(&Camera, &GlobalTransform), With<ViewerCamera>>,
    markers: Query<(Entity, &GlobalTransform, &PickableMarker, &ChildOf)>,
    mut picks: MessageWriter<MarkerPicked>,
) {
    if !buttons.just_pressed(MouseButton::Left) {
        return;
    }
    if let Ok(ctx) = egui_contexts.ctx_mut() {
        if ctx.wants_pointer_input() || ctx.is_pointer_over_area() {
            return;
        }
    }
    let Some(cursor) = windows.single().ok().and_then(Window::cursor_position) else {
        return;
    };

    for (root, viewer) in &viewers {
        let Ok((camera, camera_transform)) = cameras.get(viewer.camera) else {
            continue;
        };
        let Some(ray) = cursor_ray(camera, camera_transform, cursor) else {
            continue;
        };

        let group = viewer.group;
        let candidates = markers
            .iter()
            .filter(|(_, _, _, child_of)| child_of.parent() == group)
            .map(|(entity, transform, marker, _)| (entity, transform.translation(), marker.radius));
        let hit = pick_nearest(&ray, candidates).map(|(entity, _)| entity);
        picks.write(MarkerPicked { viewer: root, hit });
    }
}

/// Move the highlight to the picked marker; a miss changes nothing
pub fn highlight_picked_markers(
    mut picks: MessageReader<MarkerPicked>,
    mut viewers: Query<(&mut SplineViewer, &SplineMaterials)>,
    markers: Query<&PickableMarker>,
    mut marker_materials: Query<&mut MeshMaterial3d<StandardMaterial>, With<PickableMarker>>,
) {
    for pick in picks.read() {
        let Ok((mut viewer, materials)) = viewers.get_mut(pick.viewer) else {
            continue;
        };
        let Some(change) = viewer.selection.apply(pick.hit) else {
            continue;
        };
        if let Some(previous) = change.deselected {
            if let Ok(mut material) = marker_materials.get_mut(previous) {
                material.0 = materials.marker.clone();
            }
        }
        if let Ok(mut material) = marker_materials.get_mut(change.selected) {
            material.0 = materials.highlight.clone();
        }
        if let Ok(marker) = markers.get(change.selected) {
            let label = viewer.labels.get(marker.spline).map(String::as_str).unwrap_or("?");
            info!("Picked point {} of '{}'", marker.index, label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lib::dataset::{Dataset, Spline};
    use crate::lib::workers::{ClassifyResponse, Worker};
    use bevy::ecs::system::RunSystemOnce;
    use std::time::{Duration, Instant};

    fn spline(label: &str, points: &[[f32; 3]]) -> Spline {
        Spline {
            label: label.to_string(),
            points: points.iter().map(|p| Vec3::from_array(*p)).collect(),
        }
    }

    fn dataset_a() -> Dataset {
        Dataset {
            scalars: Vec::new(),
            splines: vec![
                spline("a1", &[[0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [0.0, 10.0, 0.0]]),
                spline(
                    "a2",
                    &[[5.0, 5.0, 5.0], [6.0, 5.0, 5.0], [6.0, 6.0, 5.0], [5.0, 6.0, 6.0]],
                ),
            ],
        }
    }

    fn dataset_b() -> Dataset {
        Dataset {
            scalars: Vec::new(),
            splines: vec![spline(
                "b1",
                &[
                    [0.0, 0.0, 0.0],
                    [4.0, 0.0, 0.0],
                    [4.0, 4.0, 0.0],
                    [0.0, 4.0, 0.0],
                    [2.0, 2.0, 3.0],
                ],
            )],
        }
    }

    /// Classify worker answering each request with the next canned outcome
    fn canned_classify(outcomes: Vec<Result<Dataset, WorkerError>>) -> ClassifyWorker {
        let mut outcomes = outcomes.into_iter();
        Worker::spawn("canned-classify", move |request: ClassifyRequest, _| ClassifyResponse {
            generation: request.generation,
            outcome: outcomes.next().unwrap_or(Err(WorkerError::Disconnected)),
        })
        .unwrap()
    }

    fn viewer_app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .init_resource::<Assets<Mesh>>()
            .init_resource::<Assets<StandardMaterial>>()
            .add_message::<RefreshDataset>()
            .add_message::<MarkerPicked>()
            .add_systems(
                Update,
                (refresh_datasets, poll_spline_workers, highlight_picked_markers).chain(),
            );
        app
    }

    /// Viewer root wired like `mount_spline_viewer`, with a canned classifier
    fn spawn_viewer(app: &mut App, classify: ClassifyWorker) -> Entity {
        let world = app.world_mut();
        let camera = world.spawn((Transform::default(), ViewerCamera)).id();
        let group = world
            .spawn((SplineGroup { rotation_speed: 0.0 }, Transform::default()))
            .id();
        let marker_mesh = world
            .resource_mut::<Assets<Mesh>>()
            .add(Sphere::new(1.0).mesh().uv(8, 6));
        let spline_materials = {
            let mut materials = world.resource_mut::<Assets<StandardMaterial>>();
            SplineMaterials {
                curve: materials.add(StandardMaterial::default()),
                marker: materials.add(StandardMaterial::default()),
                highlight: materials.add(StandardMaterial::default()),
                marker_mesh,
                marker_radius: 1.0,
                curve_divisions: 100,
            }
        };

        let mut viewer = SplineViewer {
            href: "/attachments/1/data".to_string(),
            name: "test".to_string(),
            status: SplineStatus::Fetching,
            scalars: Vec::new(),
            labels: Vec::new(),
            scope: NormalizationScope::Global,
            generation: 0,
            group,
            camera,
            selection: Selection::default(),
            clear_pending: false,
            classify,
            normalize: spawn_normalize_worker().unwrap(),
        };
        viewer.request();
        world.spawn((viewer, spline_materials)).id()
    }

    fn viewer(app: &App, root: Entity) -> &SplineViewer {
        app.world().get::<SplineViewer>(root).unwrap()
    }

    fn update_until(app: &mut App, root: Entity, done: impl Fn(&SplineViewer) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            app.update();
            if done(viewer(app, root)) {
                return;
            }
            assert!(Instant::now() < deadline, "viewer did not settle");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn is_ready(viewer: &SplineViewer) -> bool {
        matches!(viewer.status, SplineStatus::Ready { .. })
    }

    fn is_failed(viewer: &SplineViewer) -> bool {
        matches!(viewer.status, SplineStatus::Failed(_))
    }

    fn group_children(app: &App, root: Entity) -> Vec<Entity> {
        let group = viewer(app, root).group;
        app.world()
            .get::<Children>(group)
            .map(|children| children.iter().collect())
            .unwrap_or_default()
    }

    /// Markers under the viewer's group, ordered by spline then point index
    fn markers_of(app: &mut App, root: Entity) -> Vec<(Entity, usize, usize, Vec3)> {
        let group = viewer(app, root).group;
        let mut query = app
            .world_mut()
            .query::<(Entity, &PickableMarker, &ChildOf, &Transform)>();
        let mut markers: Vec<_> = query
            .iter(app.world())
            .filter(|(_, _, child_of, _)| child_of.parent() == group)
            .map(|(entity, marker, _, transform)| {
                (entity, marker.spline, marker.index, transform.translation)
            })
            .collect();
        markers.sort_by_key(|(_, spline, index, _)| (*spline, *index));
        markers
    }

    fn request_again(app: &mut App, root: Entity) {
        app.world_mut()
            .get_mut::<SplineViewer>(root)
            .unwrap()
            .request();
    }

    #[test]
    fn test_curve_mesh_has_closing_vertex() {
        let points = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(10.0, 10.0, 0.0),
            Vec3::new(0.0, 10.0, 0.0),
        ];
        let mesh = curve_mesh(&points, 100);
        assert_eq!(mesh.count_vertices(), 101);
        assert_eq!(mesh.primitive_topology(), PrimitiveTopology::LineStrip);
    }

    #[test]
    fn test_rotation_rate_matches_reference_frame() {
        let mut world = World::new();
        let mut time = Time::<()>::default();
        time.advance_by(Duration::from_secs_f32(0.5));
        world.insert_resource(time);
        let group = world
            .spawn((SplineGroup { rotation_speed: 0.01 }, Transform::default()))
            .id();

        world.run_system_once(rotate_spline_groups).unwrap();

        // Half a second at 60 reference frames is 30 steps of 0.01 rad
        let rotation = world.get::<Transform>(group).unwrap().rotation;
        let (_, angle) = rotation.to_axis_angle();
        assert!((angle - 0.3).abs() < 1e-4);
    }

    #[test]
    fn test_superseded_classification_is_dropped() {
        let mut app = viewer_app();
        let root = spawn_viewer(&mut app, canned_classify(vec![Ok(dataset_a()), Ok(dataset_b())]));
        // A second request before any answer makes the first one stale
        request_again(&mut app, root);

        update_until(&mut app, root, is_ready);

        assert_eq!(viewer(&app, root).generation(), 2);
        assert_eq!(viewer(&app, root).labels, ["b1"]);
        assert_eq!(markers_of(&mut app, root).len(), 5);
        // Five markers plus one curve
        assert_eq!(group_children(&app, root).len(), 6);
    }

    #[test]
    fn test_new_dataset_replaces_previous_geometry() {
        let mut app = viewer_app();
        let root = spawn_viewer(&mut app, canned_classify(vec![Ok(dataset_a()), Ok(dataset_b())]));
        update_until(&mut app, root, is_ready);
        let previous = group_children(&app, root);
        assert_eq!(previous.len(), 2 + 7);

        request_again(&mut app, root);
        update_until(&mut app, root, is_ready);

        for entity in previous {
            assert!(app.world().get_entity(entity).is_err());
        }
        let markers = markers_of(&mut app, root);
        assert_eq!(markers.len(), 5);
        assert!(markers.iter().all(|(_, spline, _, _)| *spline == 0));
        assert_eq!(
            viewer(&app, root).status,
            SplineStatus::Ready {
                splines: 1,
                scalars: 0,
                points: 5
            }
        );
    }

    #[test]
    fn test_rebuild_with_same_data_is_identical() {
        let mut app = viewer_app();
        let root = spawn_viewer(&mut app, canned_classify(vec![Ok(dataset_a()), Ok(dataset_a())]));
        update_until(&mut app, root, is_ready);
        let first: Vec<_> = markers_of(&mut app, root)
            .into_iter()
            .map(|(_, spline, index, position)| (spline, index, position))
            .collect();

        request_again(&mut app, root);
        update_until(&mut app, root, is_ready);
        let second: Vec<_> = markers_of(&mut app, root)
            .into_iter()
            .map(|(_, spline, index, position)| (spline, index, position))
            .collect();

        assert_eq!(first.len(), 7);
        assert_eq!(first, second);
    }

    #[test]
    fn test_failed_reload_clears_previous_geometry() {
        let mut app = viewer_app();
        let root = spawn_viewer(
            &mut app,
            canned_classify(vec![
                Ok(dataset_a()),
                Err(WorkerError::Network("HTTP 500".to_string())),
            ]),
        );
        update_until(&mut app, root, is_ready);
        let marker = markers_of(&mut app, root)[0].0;
        app.world_mut().write_message(MarkerPicked {
            viewer: root,
            hit: Some(marker),
        });
        app.update();
        assert_eq!(viewer(&app, root).selected(), Some(marker));

        request_again(&mut app, root);
        update_until(&mut app, root, is_failed);

        assert!(group_children(&app, root).is_empty());
        assert!(viewer(&app, root).labels.is_empty());
        assert_eq!(viewer(&app, root).selected(), None);
    }

    #[test]
    fn test_failed_normalization_clears_previous_geometry() {
        let unusable = Dataset {
            scalars: Vec::new(),
            splines: vec![spline("far", &[[f32::INFINITY, 0.0, 0.0]])],
        };
        let mut app = viewer_app();
        let root = spawn_viewer(&mut app, canned_classify(vec![Ok(dataset_a()), Ok(unusable)]));
        update_until(&mut app, root, is_ready);
        assert!(!group_children(&app, root).is_empty());

        request_again(&mut app, root);
        update_until(&mut app, root, is_failed);

        assert!(group_children(&app, root).is_empty());
    }

    #[test]
    fn test_pick_moves_highlight_and_miss_keeps_it() {
        let mut app = viewer_app();
        let root = spawn_viewer(&mut app, canned_classify(vec![Ok(dataset_a())]));
        update_until(&mut app, root, is_ready);

        let markers = markers_of(&mut app, root);
        let (first, second) = (markers[0].0, markers[1].0);
        let materials = app.world().get::<SplineMaterials>(root).unwrap();
        let (plain, highlight) = (materials.marker.clone(), materials.highlight.clone());
        let material_of = |app: &App, entity: Entity| {
            app.world()
                .get::<MeshMaterial3d<StandardMaterial>>(entity)
                .unwrap()
                .0
                .clone()
        };

        app.world_mut().write_message(MarkerPicked {
            viewer: root,
            hit: Some(first),
        });
        app.update();
        assert_eq!(material_of(&app, first), highlight);
        assert_eq!(material_of(&app, second), plain);

        app.world_mut().write_message(MarkerPicked {
            viewer: root,
            hit: Some(second),
        });
        app.update();
        assert_eq!(material_of(&app, first), plain);
        assert_eq!(material_of(&app, second), highlight);

        app.world_mut().write_message(MarkerPicked {
            viewer: root,
            hit: None,
        });
        app.update();
        assert_eq!(material_of(&app, first), plain);
        assert_eq!(material_of(&app, second), highlight);
        assert_eq!(viewer(&app, root).selected(), Some(second));
    }
}
