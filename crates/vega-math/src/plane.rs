//! Planes and convex volumes (view and shadow frusta).

use glam::{Vec3, Vec4};

use crate::bounds::Sphere;

/// A plane stored as `(a, b, c, d)` with `(a,b,c)` the normalized inward
/// normal; a point `p` is on the inside when `dot(n, p) + d >= 0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane(pub Vec4);

impl Plane {
    /// Build from an unnormalized coefficient vector. Returns `None` when the
    /// normal is degenerate.
    pub fn from_coefficients(v: Vec4) -> Option<Self> {
        let len = v.truncate().length();
        if len > 1e-8 { Some(Self(v / len)) } else { None }
    }

    /// Signed distance from the plane; positive on the inside.
    pub fn signed_distance(&self, p: Vec3) -> f32 {
        self.0.truncate().dot(p) + self.0.w
    }

    /// How far a box with the given half-extents reaches along the plane
    /// normal. A box centered at `c` crosses the plane iff
    /// `|signed_distance(c)| < push_out`.
    pub fn push_out(&self, extent: Vec3) -> f32 {
        let n = self.0.truncate();
        extent.x * n.x.abs() + extent.y * n.y.abs() + extent.z * n.z.abs()
    }
}

/// A convex volume bounded by inward-facing planes. View frusta have six;
/// shadow frusta built from arbitrary projection matrices may have fewer when
/// a plane extraction degenerates.
#[derive(Clone, Debug, Default)]
pub struct ConvexVolume {
    planes: Vec<Plane>,
}

impl ConvexVolume {
    pub fn new(planes: Vec<Plane>) -> Self {
        Self { planes }
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Whether a sphere is at least partially inside the volume.
    ///
    /// Conservative: may return `true` for spheres fully outside near plane
    /// corners, never `false` for an intersecting sphere.
    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        self.planes
            .iter()
            .all(|p| p.signed_distance(sphere.center) + sphere.radius >= 0.0)
    }

    /// Whether a box given as center + half-extent is at least partially
    /// inside the volume.
    pub fn intersects_box(&self, center: Vec3, extent: Vec3) -> bool {
        self.planes
            .iter()
            .all(|p| p.signed_distance(center) + p.push_out(extent) >= 0.0)
    }
}
