//! Viewer cameras: orbit control, viewport layout and the egui overlay camera
//!
//! Controls (mesh viewer):
//! - Left drag: orbit around the target
//! - Mouse wheel: dolly in/out

use bevy::camera::Viewport;
use bevy::input::mouse::{MouseMotion, MouseScrollUnit, MouseWheel};
use bevy::prelude::*;
use bevy::window::PrimaryWindow;
use bevy_egui::EguiContexts;

/// Pitch limit keeping the orbit camera off the poles
const MAX_PITCH: f32 = 1.5;
const MIN_ORBIT_RADIUS: f32 = 0.1;

/// Camera owned by a viewer; its viewport is kept beside the side panel
#[derive(Component)]
pub struct ViewerCamera;

/// Camera the egui side panel renders with. It lives for the whole app so
/// the UI survives viewer teardown.
#[derive(Component)]
pub struct OverlayCamera;

/// Logical width taken by the side panel, written by the UI each frame
#[derive(Resource, Debug, Default, Clone, Copy)]
pub struct PanelInset {
    pub left: f32,
}

#[derive(Component, Debug, Clone)]
pub struct OrbitCamera {
    pub target: Vec3,
    pub radius: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub sensitivity: f32,
    pub zoom_speed: f32,
}

impl OrbitCamera {
    /// Orbit state reproducing a camera placed at `position` looking at `target`
    pub fn looking_from(position: Vec3, target: Vec3) -> Self {
        let offset = position - target;
        let radius = offset.length().max(MIN_ORBIT_RADIUS);
        Self {
            target,
            radius,
            yaw: offset.x.atan2(offset.z),
            pitch: (offset.y / radius).clamp(-1.0, 1.0).asin(),
            sensitivity: 0.3,
            zoom_speed: 0.1,
        }
    }

    pub fn position(&self) -> Vec3 {
        orbit_position(self.target, self.radius, self.yaw, self.pitch)
    }

    pub fn rotate(&mut self, delta: Vec2) {
        let scaled = delta * self.sensitivity * 0.01;
        self.yaw -= scaled.x;
        self.pitch = (self.pitch + scaled.y).clamp(-MAX_PITCH, MAX_PITCH);
    }

    /// Positive `amount` moves closer
    pub fn dolly(&mut self, amount: f32) {
        let factor = (1.0 - amount * self.zoom_speed).max(0.1);
        self.radius = (self.radius * factor).max(MIN_ORBIT_RADIUS);
    }
}

/// Point on a sphere around `target`; yaw 0 and pitch 0 is +Z
pub fn orbit_position(target: Vec3, radius: f32, yaw: f32, pitch: f32) -> Vec3 {
    let horizontal = radius * pitch.cos();
    target
        + Vec3::new(
            horizontal * yaw.sin(),
            radius * pitch.sin(),
            horizontal * yaw.cos(),
        )
}

pub struct ViewerCameraPlugin;

impl Plugin for ViewerCameraPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PanelInset>()
            .add_systems(Startup, spawn_overlay_camera)
            .add_systems(Update, (orbit_camera_controller, sync_camera_viewports));
    }
}

fn spawn_overlay_camera(mut commands: Commands) {
    commands.spawn((
        Camera2d,
        Camera {
            order: 1,
            clear_color: ClearColorConfig::None,
            ..default()
        },
        OverlayCamera,
    ));
}

/// Drag-to-orbit and wheel dolly for cameras with [`OrbitCamera`]
pub fn orbit_camera_controller(
    mut mouse_motion: MessageReader<MouseMotion>,
    mut mouse_wheel: MessageReader<MouseWheel>,
    buttons: Res<ButtonInput<MouseButton>>,
    mut query: Query<(&mut Transform, &mut OrbitCamera)>,
    mut egui_contexts: EguiContexts,
) {
    if query.is_empty() {
        mouse_motion.clear();
        mouse_wheel.clear();
        return;
    }

    // Check if egui wants to use the mouse
    if let Ok(ctx) = egui_contexts.ctx_mut() {
        if ctx.wants_pointer_input() || ctx.is_pointer_over_area() {
            mouse_motion.clear();
            mouse_wheel.clear();
            return;
        }
    }

    let mut drag = Vec2::ZERO;
    for motion in mouse_motion.read() {
        drag += motion.delta;
    }
    if !buttons.pressed(MouseButton::Left) {
        drag = Vec2::ZERO;
    }

    let mut scroll = 0.0;
    for wheel in mouse_wheel.read() {
        scroll += match wheel.unit {
            MouseScrollUnit::Line => wheel.y,
            MouseScrollUnit::Pixel => wheel.y / 40.0,
        };
    }

    for (mut transform, mut orbit) in &mut query {
        if drag != Vec2::ZERO {
            orbit.rotate(drag);
        }
        if scroll != 0.0 {
            orbit.dolly(scroll);
        }
        if drag != Vec2::ZERO || scroll != 0.0 {
            *transform =
                Transform::from_translation(orbit.position()).looking_at(orbit.target, Vec3::Y);
        }
    }
}

/// Physical viewport to the right of the side panel, `None` if nothing is left
pub fn viewport_beside_panel(window_size: UVec2, scale_factor: f32, inset: f32) -> Option<Viewport> {
    let left = ((inset * scale_factor).round().max(0.0) as u32).min(window_size.x);
    let width = window_size.x - left;
    if width == 0 || window_size.y == 0 {
        return None;
    }
    Some(Viewport {
        physical_position: UVec2::new(left, 0),
        physical_size: UVec2::new(width, window_size.y),
        ..default()
    })
}

/// Keep viewer cameras out from under the side panel, following resizes
pub fn sync_camera_viewports(
    inset: Res<PanelInset>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut cameras: Query<&mut Camera, With<ViewerCamera>>,
) {
    let Ok(window) = windows.single() else {
        return;
    };
    let size = UVec2::new(window.physical_width(), window.physical_height());
    let viewport = viewport_beside_panel(size, window.scale_factor(), inset.left);

    for mut camera in &mut cameras {
        let unchanged = match (&camera.viewport, &viewport) {
            (Some(current), Some(next)) => {
                current.physical_position == next.physical_position
                    && current.physical_size == next.physical_size
            }
            (None, None) => true,
            _ => false,
        };
        if !unchanged {
            camera.viewport = viewport.clone();
        }
    }
}
