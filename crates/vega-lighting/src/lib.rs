//! Dynamic shadow math: fade heuristics and projected-shadow transform
//! construction.

mod fade;
mod transform;

pub use fade::{
    SHADOW_FADE_SKIP_THRESHOLD, ShadowFadeState, shadow_fade_alpha, shadow_resolution,
    mod_shadow_time_fade,
};
pub use transform::{SHADOW_BORDER, ShadowTransforms, shadow_projection_matrix};
