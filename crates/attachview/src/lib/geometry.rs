//! Bounding volumes and uniform normalization of point sets
//!
//! Everything here is pure: the same input always yields the same output and
//! nothing touches the ECS. Both viewers use the same policy, only the target
//! extent differs (200 units for splines, 3 units for a mesh).

use bevy::math::Vec3;
use serde::{Deserialize, Serialize};

/// Largest dimension of a normalized spline set, in scene units
pub const SPLINE_TARGET_EXTENT: f32 = 200.0;

/// Largest dimension of a fitted mesh, in scene units
pub const MESH_TARGET_EXTENT: f32 = 3.0;

/// Axis-aligned bounding volume
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    /// Bounds enclosing every point, `None` for an empty iterator
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Vec3>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bounds = Bounds {
            min: first,
            max: first,
        };
        for p in iter {
            bounds.expand(p);
        }
        Some(bounds)
    }

    pub fn expand(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Per-axis extents
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn max_dimension(&self) -> f32 {
        self.size().max_element()
    }

    /// Whether a uniform scale can be derived from these bounds
    pub fn is_normalizable(&self) -> bool {
        let max_dim = self.max_dimension();
        max_dim.is_finite() && max_dim > 0.0
    }
}

/// How the shared scale and center are chosen for a set of splines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NormalizationScope {
    /// One scale and center from the union of all splines
    #[default]
    Global,
    /// Every spline fitted on its own
    PerSpline,
}

impl NormalizationScope {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "global" => Ok(Self::Global),
            "per-spline" | "per_spline" | "perspline" => Ok(Self::PerSpline),
            _ => Err(format!(
                "Unknown normalization scope: {s}. Valid options are: global, per-spline"
            )),
        }
    }
}

/// Result of [`normalize`]
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSet {
    /// Transformed points, same grouping and order as the input
    pub points: Vec<Vec<Vec3>>,
    pub scale: f32,
    /// Center of the input bounds, in input coordinates
    pub center: Vec3,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("cannot normalize an empty point set")]
    Empty,
    #[error("point set has zero extent (max dimension {max_dimension})")]
    Degenerate { max_dimension: f32 },
}

/// Scale and center that fit `bounds` into `target_extent`
pub fn fit(bounds: &Bounds, target_extent: f32) -> Result<(f32, Vec3), GeometryError> {
    if !bounds.is_normalizable() {
        return Err(GeometryError::Degenerate {
            max_dimension: bounds.max_dimension(),
        });
    }
    Ok((target_extent / bounds.max_dimension(), bounds.center()))
}

/// Re-center and uniformly rescale a group of point sequences.
///
/// The bounds are taken over the union of all sequences, so the relative
/// placement of the sequences survives the transform.
pub fn normalize(point_sets: &[Vec<Vec3>], target_extent: f32) -> Result<NormalizedSet, GeometryError> {
    let bounds = Bounds::from_points(point_sets.iter().flatten().copied())
        .ok_or(GeometryError::Empty)?;
    let (scale, center) = fit(&bounds, target_extent)?;

    let points = point_sets
        .iter()
        .map(|set| set.iter().map(|&p| (p - center) * scale).collect())
        .collect();

    Ok(NormalizedSet {
        points,
        scale,
        center,
    })
}
