//! Frame rendering: per-view visibility, occlusion history, dynamic shadow
//! setup, and the multi-pass pipeline that turns the scene into an ordered
//! command stream.
//!
//! A frame runs in a fixed sequence. The renderer drains the scene channel,
//! allocates each [`View`]'s visibility bitsets, culls primitives and lights,
//! gathers projected shadows, then executes the pass pipeline per depth
//! priority group and presents. The [`View`] carries a stage marker so a
//! pass can assert it never reads state that has not been produced yet.

mod occlusion;
mod passes;
mod renderer;
mod shadows;
mod view;
mod visibility;

#[cfg(test)]
mod test_support;

pub use occlusion::{
    OCCLUSION_BOUNDS_OFFSET, OCCLUSION_BOUNDS_SCALE, OcclusionVerdict, ViewState,
    is_large_camera_movement,
};
pub use passes::{BOUNDS_PROXY_MESH, FULLSCREEN_QUAD_MESH, PROXY_VERTEX_FORMAT, PostProcessEffect};
pub use renderer::SceneRenderer;
pub use shadows::{ProjectedShadowInfo, create_projected_shadow, gather_shadows};
pub use view::{FrameStage, SortedPrimitive, View, ViewInit, VisibleLightInfo};
pub use visibility::{cull_lights, determine_visibility};
