//! Settings structs with sensible defaults and RON persistence.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Top-level renderer settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Visibility and pass-selection settings.
    pub render: RenderSettings,
    /// Occlusion query settings.
    pub occlusion: OcclusionSettings,
    /// Dynamic shadow quality settings.
    pub shadow: ShadowSettings,
    /// Debug/development settings.
    pub debug: DebugSettings,
}

/// Visibility and pass-selection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderSettings {
    /// Minimum projected screen radius, as a fraction of the smaller view
    /// dimension, for a dynamic occluder to enter the depth-only pre-pass.
    pub min_screen_radius_for_depth_prepass: f32,
    /// Minimum projected screen radius, as a fraction of the smaller view
    /// dimension, for a primitive to render motion vectors.
    pub min_screen_radius_for_velocity: f32,
    /// Half-size, on each axis, of the cube the scene octrees span.
    pub octree_extent: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            min_screen_radius_for_depth_prepass: 0.03,
            min_screen_radius_for_velocity: 0.025,
            octree_extent: 524_288.0,
        }
    }
}

/// Occlusion query settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OcclusionSettings {
    /// Seconds a primitive that has not returned a query result stays
    /// treated as visible before it is presumed occluded.
    pub probably_visible_time: f32,
    /// Camera rotation, in degrees, past which occlusion history is reset.
    pub camera_rotation_threshold_degrees: f32,
    /// Camera translation, in world units, past which occlusion history is
    /// reset.
    pub camera_translation_threshold: f32,
    /// Fraction of the view's pixels an unoccluded query may cover before
    /// grouped queries for that primitive are split into individual ones.
    pub max_occluded_pixels_fraction: f32,
    /// Seconds of unused history an occlusion record survives before it is
    /// trimmed.
    pub history_keep_time: f32,
}

impl Default for OcclusionSettings {
    fn default() -> Self {
        Self {
            probably_visible_time: 8.0,
            camera_rotation_threshold_degrees: 45.0,
            camera_translation_threshold: 10_000.0,
            max_occluded_pixels_fraction: 0.1,
            history_keep_time: 3.0,
        }
    }
}

/// Dynamic shadow quality settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShadowSettings {
    /// Shadow depth buffer resolution below which shadows are dropped.
    pub min_shadow_resolution: u32,
    /// Upper clamp on the shadow depth buffer resolution.
    pub max_shadow_resolution: u32,
    /// Resolution at which a shadow reaches full opacity; between the
    /// minimum and this, the shadow fades in.
    pub shadow_fade_resolution: u32,
    /// Exponent applied to the resolution fade factor.
    pub shadow_fade_exponent: f32,
    /// Shadow depth texels allocated per screen pixel of the subject.
    pub shadow_texels_per_pixel: f32,
    /// Seconds a modulated shadow takes to fade in or out.
    pub mod_shadow_fade_time: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            min_shadow_resolution: 32,
            max_shadow_resolution: 512,
            shadow_fade_resolution: 64,
            shadow_fade_exponent: 0.25,
            shadow_texels_per_pixel: 1.273_24,
            mod_shadow_fade_time: 1.0,
        }
    }
}

/// Debug/development settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugSettings {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Disable occlusion queries, treating every frustum-visible primitive
    /// as unoccluded.
    pub disable_occlusion_queries: bool,
    /// Disable all dynamic shadow rendering.
    pub disable_shadows: bool,
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            disable_occlusion_queries: false,
            disable_shadows: false,
        }
    }
}

// --- Load / Save / Reload ---

impl Settings {
    /// Load settings from the given directory, or create a default settings
    /// file.
    pub fn load_or_create(settings_dir: &Path) -> Result<Self, SettingsError> {
        let settings_path = settings_dir.join("renderer.ron");

        if settings_path.exists() {
            let contents = std::fs::read_to_string(&settings_path)
                .map_err(|e| SettingsError::io(&settings_path, e))?;
            let settings: Settings = ron::from_str(&contents).map_err(SettingsError::Parse)?;
            log::info!("Loaded settings from {}", settings_path.display());
            Ok(settings)
        } else {
            let settings = Settings::default();
            settings.save(settings_dir)?;
            log::info!("Created default settings at {}", settings_path.display());
            Ok(settings)
        }
    }

    /// Save settings to the given directory as `renderer.ron`.
    pub fn save(&self, settings_dir: &Path) -> Result<(), SettingsError> {
        std::fs::create_dir_all(settings_dir).map_err(|e| SettingsError::io(settings_dir, e))?;

        let settings_path = settings_dir.join("renderer.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(SettingsError::Serialize)?;

        std::fs::write(&settings_path, serialized)
            .map_err(|e| SettingsError::io(&settings_path, e))?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_settings)` if the file changed, `None`
    /// otherwise.
    pub fn reload(&self, settings_dir: &Path) -> Result<Option<Self>, SettingsError> {
        let settings_path = settings_dir.join("renderer.ron");
        let contents = std::fs::read_to_string(&settings_path)
            .map_err(|e| SettingsError::io(&settings_path, e))?;
        let new_settings: Settings = ron::from_str(&contents).map_err(SettingsError::Parse)?;

        if &new_settings != self {
            log::info!("Settings reloaded with changes");
            Ok(Some(new_settings))
        } else {
            Ok(None)
        }
    }
}
