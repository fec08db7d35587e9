//! Axis-aligned boxes, spheres, and the combined box+sphere bounds carried by
//! every scene primitive.

use glam::{Mat4, Vec3};

/// An axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box.
    pub min: Vec3,
    /// Maximum corner of the bounding box.
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB from min and max corners.
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// An inverted box that unions to identity: any point grows it.
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(f32::MIN),
        }
    }

    /// Returns the center point of the AABB.
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Returns the half-extents (half-size along each axis).
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Grow the box to include a point.
    pub fn add_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// The smallest box containing both operands.
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Whether two boxes overlap (touching counts).
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Whether `p` lies inside or on the box.
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Whether `other` lies entirely inside this box.
    pub fn contains_box(&self, other: &Aabb) -> bool {
        self.contains_point(other.min) && self.contains_point(other.max)
    }

    /// The 8 corner vertices, in `(x, y, z)` bit order: bit 0 selects min/max
    /// x, bit 1 y, bit 2 z.
    pub fn corners(&self) -> [Vec3; 8] {
        let mut out = [Vec3::ZERO; 8];
        for (i, corner) in out.iter_mut().enumerate() {
            *corner = Vec3::new(
                if i & 1 != 0 { self.max.x } else { self.min.x },
                if i & 2 != 0 { self.max.y } else { self.min.y },
                if i & 4 != 0 { self.max.z } else { self.min.z },
            );
        }
        out
    }

    /// The AABB of this box transformed by `m` (transforms all 8 corners).
    pub fn transformed(&self, m: &Mat4) -> Aabb {
        let mut out = Aabb::empty();
        for corner in self.corners() {
            out.add_point(m.project_point3(corner));
        }
        out
    }
}

/// A bounding sphere.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Whether two spheres overlap.
    pub fn intersects(&self, other: &Sphere) -> bool {
        self.center.distance_squared(other.center)
            <= (self.radius + other.radius) * (self.radius + other.radius)
    }
}

/// Combined box and sphere bounds, the form every primitive and light reports.
///
/// The sphere gives a cheap first-pass test; the box a tighter second pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxSphereBounds {
    /// Shared center of the box and sphere.
    pub origin: Vec3,
    /// Half-extents of the box.
    pub box_extent: Vec3,
    /// Radius of the sphere. Always >= `box_extent.length()` is NOT required;
    /// callers use whichever volume is appropriate for the test.
    pub radius: f32,
}

impl BoxSphereBounds {
    pub fn new(origin: Vec3, box_extent: Vec3, radius: f32) -> Self {
        Self {
            origin,
            box_extent,
            radius,
        }
    }

    /// Bounds tightly enclosing an AABB.
    pub fn from_aabb(aabb: &Aabb) -> Self {
        let extent = aabb.extents();
        Self {
            origin: aabb.center(),
            box_extent: extent,
            radius: extent.length(),
        }
    }

    /// The box component as an [`Aabb`].
    pub fn aabb(&self) -> Aabb {
        Aabb::new(self.origin - self.box_extent, self.origin + self.box_extent)
    }

    /// The sphere component.
    pub fn sphere(&self) -> Sphere {
        Sphere::new(self.origin, self.radius)
    }

    /// The smallest bounds containing both operands.
    pub fn union(&self, other: &BoxSphereBounds) -> BoxSphereBounds {
        let merged = self.aabb().union(&other.aabb());
        let origin = merged.center();
        let radius = f32::max(
            self.radius + (self.origin - origin).length(),
            other.radius + (other.origin - origin).length(),
        );
        BoxSphereBounds {
            origin,
            box_extent: merged.extents(),
            radius,
        }
    }

    /// Bounds scaled and padded outward. Used before occlusion queries so a
    /// primitive cannot occlude its own query geometry.
    pub fn expanded(&self, scale: f32, offset: f32) -> BoxSphereBounds {
        BoxSphereBounds {
            origin: self.origin,
            box_extent: self.box_extent * scale + Vec3::splat(offset),
            radius: self.radius * scale + offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_contains_both_boxes() {
        let a = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let b = Aabb::new(Vec3::new(2.0, 0.0, 0.0), Vec3::new(4.0, 1.0, 1.0));
        let u = a.union(&b);
        assert!(u.contains_box(&a));
        assert!(u.contains_box(&b));
    }

    #[test]
    fn test_corner_bit_order() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let corners = aabb.corners();
        assert_eq!(corners[0], Vec3::ZERO);
        assert_eq!(corners[1], Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(corners[2], Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(corners[7], Vec3::ONE);
    }

    #[test]
    fn test_box_sphere_union_covers_both_spheres() {
        let a = BoxSphereBounds::new(Vec3::ZERO, Vec3::ONE, 1.7);
        let b = BoxSphereBounds::new(Vec3::new(10.0, 0.0, 0.0), Vec3::ONE, 1.7);
        let u = a.union(&b);
        assert!(u.radius + 1e-4 >= (a.origin - u.origin).length() + a.radius);
        assert!(u.radius + 1e-4 >= (b.origin - u.origin).length() + b.radius);
    }

    #[test]
    fn test_expanded_bounds_strictly_grow() {
        let b = BoxSphereBounds::new(Vec3::ZERO, Vec3::ONE, 1.7);
        let e = b.expanded(1.1, 1.1);
        assert!(e.radius > b.radius);
        assert!(e.box_extent.cmpgt(b.box_extent).all());
    }

    #[test]
    fn test_transformed_box_translates() {
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let moved = aabb.transformed(&Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)));
        assert_eq!(moved.center(), Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(moved.extents(), Vec3::ONE);
    }

    #[test]
    fn test_intersects_is_inclusive_at_touch() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0));
        assert!(a.intersects(&b));
    }
}
