//! Renderer configuration.
//!
//! Tunables for visibility, occlusion, and shadow quality that persist to
//! disk as RON files, with forward/backward compatible serialization and
//! hot-reload detection.

mod error;
mod settings;

pub use error::SettingsError;
pub use settings::{DebugSettings, OcclusionSettings, RenderSettings, Settings, ShadowSettings};
