//! Light rigs for the two viewers

use bevy::light::DirectionalLightShadowMap;
use bevy::prelude::*;

/// Ambient brightness matching a half-intensity white fill
pub const AMBIENT_BRIGHTNESS: f32 = 500.0;
pub const KEY_LIGHT_ILLUMINANCE: f32 = 10_000.0;
pub const SHADOW_MAP_SIZE: usize = 1024;

/// Position of the mesh viewer's shadow-casting key light
pub const MESH_KEY_LIGHT_POSITION: Vec3 = Vec3::new(5.0, 10.0, 7.5);
/// Position of the spline viewer's key light
pub const SPLINE_KEY_LIGHT_POSITION: Vec3 = Vec3::new(50.0, 50.0, 50.0);

/// Marker for lights owned by a viewer root
#[derive(Component)]
pub struct ViewerLight;

pub fn insert_ambient_light(commands: &mut Commands) {
    commands.insert_resource(AmbientLight {
        color: Color::WHITE,
        brightness: AMBIENT_BRIGHTNESS,
        ..default()
    });
}

/// Directional light aimed at the origin, as a child of `root`
pub fn spawn_key_light(commands: &mut Commands, root: Entity, position: Vec3, shadows: bool) {
    if shadows {
        commands.insert_resource(DirectionalLightShadowMap {
            size: SHADOW_MAP_SIZE,
        });
    }
    commands.entity(root).with_children(|parent| {
        parent.spawn((
            DirectionalLight {
                illuminance: KEY_LIGHT_ILLUMINANCE,
                shadows_enabled: shadows,
                ..default()
            },
            Transform::from_translation(position).looking_at(Vec3::ZERO, Vec3::Y),
            ViewerLight,
        ));
    });
}
