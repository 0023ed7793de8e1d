//! Ray casting against spherical point markers

use bevy::math::{Rect, Vec2, Vec3};

/// Pointer position inside `viewport` to normalized device coordinates.
///
/// X grows to the right and Y grows upward, both in `[-1, 1]`. Returns `None`
/// when the pointer lies outside the viewport.
pub fn viewport_to_ndc(cursor: Vec2, viewport: Rect) -> Option<Vec2> {
    let size = viewport.size();
    if size.x <= 0.0 || size.y <= 0.0 || !viewport.contains(cursor) {
        return None;
    }
    let local = cursor - viewport.min;
    Some(Vec2::new(
        local.x / size.x * 2.0 - 1.0,
        -(local.y / size.y * 2.0 - 1.0),
    ))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickRay {
    pub origin: Vec3,
    /// Unit length
    pub direction: Vec3,
}

impl PickRay {
    /// Ray from `near` through `far`; `None` if the points coincide
    pub fn through(near: Vec3, far: Vec3) -> Option<Self> {
        let direction = (far - near).try_normalize()?;
        Some(Self {
            origin: near,
            direction,
        })
    }

    pub fn at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }

    /// Distance to the first intersection with a sphere in front of the origin
    pub fn intersect_sphere(&self, center: Vec3, radius: f32) -> Option<f32> {
        let oc = self.origin - center;
        let b = oc.dot(self.direction);
        let c = oc.length_squared() - radius * radius;
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        let root = discriminant.sqrt();
        let near = -b - root;
        if near >= 0.0 {
            return Some(near);
        }
        // Origin inside the sphere
        let far = -b + root;
        (far >= 0.0).then_some(0.0)
    }
}

/// Nearest marker hit by `ray`, as `(id, distance)`
pub fn pick_nearest<T, I>(ray: &PickRay, markers: I) -> Option<(T, f32)>
where
    I: IntoIterator<Item = (T, Vec3, f32)>,
{
    markers
        .into_iter()
        .filter_map(|(id, center, radius)| {
            ray.intersect_sphere(center, radius).map(|d| (id, d))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Which marker is highlighted. A new hit replaces the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection<T> {
    current: Option<T>,
}

impl<T> Default for Selection<T> {
    fn default() -> Self {
        Self { current: None }
    }
}

/// Highlight changes produced by a click
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionChange<T> {
    pub deselected: Option<T>,
    pub selected: T,
}

impl<T: Copy + PartialEq> Selection<T> {
    pub fn current(&self) -> Option<T> {
        self.current
    }

    /// Apply a pick result. A miss leaves everything untouched.
    pub fn apply(&mut self, hit: Option<T>) -> Option<SelectionChange<T>> {
        let selected = hit?;
        let deselected = self.current.filter(|previous| *previous != selected);
        self.current = Some(selected);
        Some(SelectionChange {
            deselected,
            selected,
        })
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn test_viewport_to_ndc() {
        let viewport = Rect::new(100.0, 0.0, 500.0, 200.0);
        assert_eq!(
            viewport_to_ndc(Vec2::new(300.0, 100.0), viewport),
            Some(Vec2::ZERO)
        );
        assert_eq!(
            viewport_to_ndc(Vec2::new(100.0, 0.0), viewport),
            Some(Vec2::new(-1.0, 1.0))
        );
        assert_eq!(
            viewport_to_ndc(Vec2::new(500.0, 200.0), viewport),
            Some(Vec2::new(1.0, -1.0))
        );
        assert_eq!(viewport_to_ndc(Vec2::new(50.0, 100.0), viewport), None);
    }

    #[test]
    fn test_ray_sphere_hit_and_miss() {
        let ray = PickRay::through(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO).unwrap();
        let hit = ray.intersect_sphere(Vec3::ZERO, 2.0).unwrap();
        assert!((hit - 8.0).abs() < EPS);
        assert!((ray.at(hit) - Vec3::new(0.0, 0.0, 2.0)).length() < EPS);

        assert!(ray.intersect_sphere(Vec3::new(5.0, 0.0, 0.0), 2.0).is_none());
        // Behind the origin
        assert!(ray.intersect_sphere(Vec3::new(0.0, 0.0, 20.0), 2.0).is_none());
    }

    #[test]
    fn test_ray_from_inside_sphere() {
        let ray = PickRay::through(Vec3::ZERO, Vec3::X).unwrap();
        assert_eq!(ray.intersect_sphere(Vec3::ZERO, 1.0), Some(0.0));
    }

    #[test]
    fn test_pick_nearest_marker() {
        let ray = PickRay::through(Vec3::new(0.0, 0.0, 100.0), Vec3::ZERO).unwrap();
        let markers = vec![
            ("far", Vec3::new(0.0, 0.0, -50.0), 2.0),
            ("near", Vec3::new(0.5, 0.0, 30.0), 2.0),
            ("off", Vec3::new(40.0, 0.0, 60.0), 2.0),
        ];
        let (id, _) = pick_nearest(&ray, markers).unwrap();
        assert_eq!(id, "near");

        let empty: Vec<(&str, Vec3, f32)> = Vec::new();
        assert!(pick_nearest(&ray, empty).is_none());
    }

    #[test]
    fn test_degenerate_ray() {
        assert!(PickRay::through(Vec3::ONE, Vec3::ONE).is_none());
    }

    #[test]
    fn test_single_selection_replaces_previous() {
        let mut selection = Selection::default();
        assert_eq!(
            selection.apply(Some(1)),
            Some(SelectionChange {
                deselected: None,
                selected: 1
            })
        );
        assert_eq!(
            selection.apply(Some(2)),
            Some(SelectionChange {
                deselected: Some(1),
                selected: 2
            })
        );
        assert_eq!(selection.current(), Some(2));
    }

    #[test]
    fn test_miss_changes_nothing() {
        let mut selection = Selection::default();
        selection.apply(Some(4));
        assert_eq!(selection.apply(None), None);
        assert_eq!(selection.current(), Some(4));
    }

    #[test]
    fn test_reselecting_same_marker() {
        let mut selection = Selection::default();
        selection.apply(Some(9));
        let change = selection.apply(Some(9)).unwrap();
        assert_eq!(change.deselected, None);
        assert_eq!(change.selected, 9);
    }
}
