//! Closed centripetal Catmull-Rom curves through spline control points

use bevy::math::Vec3;

/// Number of segments a spline curve is sampled into
pub const CURVE_DIVISIONS: usize = 100;

/// Segment parameters shorter than this collapse to a uniform parameterization
const MIN_KNOT_INTERVAL: f32 = 1e-4;

/// A closed curve passing through every control point
#[derive(Debug, Clone)]
pub struct ClosedCatmullRom {
    points: Vec<Vec3>,
}

impl ClosedCatmullRom {
    /// `None` without control points
    pub fn new(points: Vec<Vec3>) -> Option<Self> {
        if points.is_empty() {
            None
        } else {
            Some(Self { points })
        }
    }

    pub fn control_points(&self) -> &[Vec3] {
        &self.points
    }

    /// Point at `t` in `[0, 1]`; `t = 0` and `t = 1` both return the first
    /// control point.
    pub fn point_at(&self, t: f32) -> Vec3 {
        let len = self.points.len();
        let p = len as f32 * t.clamp(0.0, 1.0);
        let segment = p.floor();
        let weight = p - segment;
        let index = segment as usize;

        let p0 = self.points[(index + len - 1) % len];
        let p1 = self.points[index % len];
        let p2 = self.points[(index + 1) % len];
        let p3 = self.points[(index + 2) % len];

        let mut dt0 = p0.distance_squared(p1).powf(0.25);
        let mut dt1 = p1.distance_squared(p2).powf(0.25);
        let mut dt2 = p2.distance_squared(p3).powf(0.25);

        if dt1 < MIN_KNOT_INTERVAL {
            dt1 = 1.0;
        }
        if dt0 < MIN_KNOT_INTERVAL {
            dt0 = dt1;
        }
        if dt2 < MIN_KNOT_INTERVAL {
            dt2 = dt1;
        }

        // Tangents of the non-uniform segment, rescaled to [0, 1]
        let t1 = ((p1 - p0) / dt0 - (p2 - p0) / (dt0 + dt1) + (p2 - p1) / dt1) * dt1;
        let t2 = ((p2 - p1) / dt1 - (p3 - p1) / (dt1 + dt2) + (p3 - p2) / dt2) * dt1;

        hermite(p1, p2, t1, t2, weight)
    }

    /// `divisions + 1` evenly parameterized samples, the last one closing the loop
    pub fn sample(&self, divisions: usize) -> Vec<Vec3> {
        let divisions = divisions.max(1);
        (0..=divisions)
            .map(|d| self.point_at(d as f32 / divisions as f32))
            .collect()
    }
}

fn hermite(p1: Vec3, p2: Vec3, t1: Vec3, t2: Vec3, w: f32) -> Vec3 {
    let c0 = p1;
    let c1 = t1;
    let c2 = -3.0 * p1 + 3.0 * p2 - 2.0 * t1 - t2;
    let c3 = 2.0 * p1 - 2.0 * p2 + t1 + t2;
    let w2 = w * w;
    c0 + c1 * w + c2 * w2 + c3 * w2 * w
}

/// Sampled closed curve through `points`, empty when there are none
pub fn closed_curve(points: &[Vec3], divisions: usize) -> Vec<Vec3> {
    ClosedCatmullRom::new(points.to_vec())
        .map(|curve| curve.sample(divisions))
        .unwrap_or_default()
}
