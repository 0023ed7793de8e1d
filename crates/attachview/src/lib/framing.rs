//! Camera placement that keeps a whole spline dataset in view

use bevy::math::Vec3;

use super::geometry::Bounds;

/// Distance between neighbouring scalar placeholders along X
pub const SCALAR_SPACING: f32 = 10.0;

/// Margin factor applied to the larger of width and height
pub const FRAMING_MARGIN: f32 = 2.0;

/// Camera distance used when the framed volume is flat in X and Y
pub const MIN_FRAMING_DISTANCE: f32 = 10.0;

/// Placeholder positions for `count` scalars, centered on the origin along X
pub fn scalar_offsets(count: usize) -> Vec<Vec3> {
    let mid = (count as f32 - 1.0) / 2.0;
    (0..count)
        .map(|i| Vec3::new((i as f32 - mid) * SCALAR_SPACING, 0.0, 0.0))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraFraming {
    pub position: Vec3,
    pub target: Vec3,
}

/// Frame all normalized spline points plus the scalar placeholders.
///
/// Returns `None` when there is nothing to frame.
pub fn frame_dataset<'a, I>(spline_points: I, scalar_count: usize) -> Option<CameraFraming>
where
    I: IntoIterator<Item = &'a Vec3>,
{
    let points = spline_points
        .into_iter()
        .copied()
        .chain(scalar_offsets(scalar_count));
    let bounds = Bounds::from_points(points)?;
    Some(frame_bounds(&bounds))
}

/// Camera on the +Z side at `max(width, height) * 2`, looking at the center
pub fn frame_bounds(bounds: &Bounds) -> CameraFraming {
    let size = bounds.size();
    let center = bounds.center();
    let mut distance = size.x.max(size.y) * FRAMING_MARGIN;
    if distance <= 0.0 || !distance.is_finite() {
        distance = MIN_FRAMING_DISTANCE;
    }

    CameraFraming {
        position: Vec3::new(center.x, center.y, distance),
        target: center,
    }
}
