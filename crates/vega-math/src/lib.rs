//! Bounding volumes, planes, and convex-volume intersection tests shared by
//! the visibility, shadow, and spatial-index crates.

mod bounds;
mod plane;
mod projection;

pub use bounds::{Aabb, BoxSphereBounds, Sphere};
pub use plane::{ConvexVolume, Plane};
pub use projection::{frustum_from_matrix, screen_radius};
