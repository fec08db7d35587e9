//! Per-frame projected shadow setup.
//!
//! After light culling, every shadow-casting visible light contributes
//! [`ProjectedShadowInfo`]s: a single whole-scene shadow when the light
//! supports one, otherwise one shadow per shadowed subject (shadow groups
//! merged into their parent), plus preshadows from static casters onto
//! dynamic subjects.

use vega_config::Settings;
use vega_lighting::{
    SHADOW_BORDER, SHADOW_FADE_SKIP_THRESHOLD, ShadowFadeState, ShadowTransforms,
    mod_shadow_time_fade, shadow_fade_alpha,
};
use vega_math::BoxSphereBounds;
use vega_scene::{LightId, PrimitiveId, Scene};

use crate::view::{FrameStage, View};

/// Preshadows reuse the depth buffer at reduced density; static casters are
/// stable enough that half resolution does not crawl.
const PRESHADOW_RESOLUTION_FACTOR: f32 = 0.5;

/// One projected shadow to render this frame.
pub struct ProjectedShadowInfo {
    pub light: LightId,
    /// `None` for a whole-scene shadow.
    pub subject: Option<PrimitiveId>,
    pub transforms: ShadowTransforms,
    /// Shadow depth buffer extent, border included.
    pub resolution: (u32, u32),
    pub fade_alpha: f32,
    pub modulated: bool,
    /// Static casters shadowing a dynamic subject.
    pub preshadow: bool,
    pub self_shadow_only: bool,
    /// Casters rendered into the shadow depth buffer.
    pub subject_primitives: Vec<PrimitiveId>,
    /// Receivers gathered for masked modulated projection.
    pub receiver_primitives: Vec<PrimitiveId>,
}

struct ShadowResolutionSettings {
    min: u32,
    max: u32,
    fade: u32,
    exponent: f32,
    texels_per_pixel: f32,
}

impl ShadowResolutionSettings {
    fn for_light(light: &vega_scene::LightSceneInfo, settings: &Settings) -> Self {
        Self {
            min: light.min_shadow_resolution.unwrap_or(settings.shadow.min_shadow_resolution),
            max: light.max_shadow_resolution.unwrap_or(settings.shadow.max_shadow_resolution),
            fade: light.shadow_fade_resolution.unwrap_or(settings.shadow.shadow_fade_resolution),
            exponent: settings.shadow.shadow_fade_exponent,
            texels_per_pixel: settings.shadow.shadow_texels_per_pixel,
        }
    }
}

/// Build the frame's projected shadows.
///
/// Every view must have finished light culling; all views advance to
/// `ShadowsGathered` whether or not any shadow is created.
pub fn gather_shadows(
    scene: &mut Scene,
    views: &mut [View],
    settings: &Settings,
    time: f32,
) -> Vec<ProjectedShadowInfo> {
    for view in views.iter() {
        assert_eq!(view.stage(), FrameStage::LightsCulled);
    }

    let mut shadows = Vec::new();
    if !settings.debug.disable_shadows {
        let light_ids: Vec<LightId> = scene.iter_lights().map(|light| light.id).collect();
        for light_id in light_ids {
            gather_for_light(scene, views, settings, time, light_id, &mut shadows);
        }
    }

    for view in views.iter_mut() {
        view.advance_to(FrameStage::ShadowsGathered);
    }
    log::debug!("gathered {} projected shadows", shadows.len());
    shadows
}

fn gather_for_light(
    scene: &mut Scene,
    views: &[View],
    settings: &Settings,
    time: f32,
    light_id: LightId,
    shadows: &mut Vec<ProjectedShadowInfo>,
) {
    let light = scene.light(light_id).unwrap();
    if !light.casts_shadows() {
        return;
    }
    if !views.iter().any(|view| view.light_info(light_id).in_view_frustum) {
        return;
    }

    if let Some(scene_bounds) = whole_scene_bounds(scene) {
        if let Some(initializer) = light.whole_scene_shadow_initializer(&scene_bounds) {
            if let Some(transforms) = ShadowTransforms::calculate(&initializer) {
                let casters: Vec<PrimitiveId> = scene
                    .interactions
                    .iter_light_list(light.dynamic_interaction_head)
                    .filter(|(_, interaction)| interaction.has_shadow)
                    .map(|(_, interaction)| interaction.primitive)
                    .collect();
                let resolution = settings.shadow.max_shadow_resolution;
                shadows.push(ProjectedShadowInfo {
                    light: light_id,
                    subject: None,
                    resolution: buffer_resolution(resolution, transforms.aspect),
                    transforms,
                    fade_alpha: 1.0,
                    modulated: light.shadow_mode.is_modulated(),
                    preshadow: false,
                    self_shadow_only: false,
                    subject_primitives: casters,
                    receiver_primitives: Vec::new(),
                });
            }
            // A whole-scene shadow covers every caster; per-primitive
            // shadows for this light would double-darken.
            return;
        }
    }

    let subjects: Vec<PrimitiveId> = scene
        .interactions
        .iter_light_list(light.dynamic_interaction_head)
        .filter(|(_, interaction)| interaction.has_shadow)
        .map(|(_, interaction)| interaction.primitive)
        .collect();

    for subject in subjects {
        let info = scene
            .primitive(subject)
            .unwrap_or_else(|| panic!("interaction references detached primitive {subject:?}"));
        if info.shadow_parent.is_some() {
            // Merged into the parent's shadow group.
            continue;
        }
        if let Some(shadow) = create_projected_shadow(scene, views, settings, time, light_id, subject) {
            if scene.light(light_id).unwrap().static_interaction_head.is_some() {
                if let Some(preshadow) = create_preshadow(scene, &shadow) {
                    shadows.push(preshadow);
                }
            }
            shadows.push(shadow);
        }
    }
}

/// Build one subject's projected shadow, or `None` when it is faded out,
/// out of the light's range, or geometrically degenerate.
pub fn create_projected_shadow(
    scene: &mut Scene,
    views: &[View],
    settings: &Settings,
    time: f32,
    light_id: LightId,
    subject: PrimitiveId,
) -> Option<ProjectedShadowInfo> {
    let light = scene.light(light_id).unwrap();
    let resolution_settings = ShadowResolutionSettings::for_light(light, settings);
    let shadow_mode = light.shadow_mode;
    let fadeout_time = light.mod_shadow_fadeout_time;
    let fadeout_exponent = light.mod_shadow_fadeout_exponent;

    let bounds = match scene.shadow_group_bounds(subject) {
        Some(bounds) => bounds,
        None => scene.primitive(subject)?.bounds,
    };

    let screen_radius = views
        .iter()
        .map(|view| view.screen_radius_of(&bounds))
        .fold(0.0f32, f32::max);
    let desired_resolution = screen_radius * resolution_settings.texels_per_pixel;
    let mut fade_alpha = shadow_fade_alpha(
        desired_resolution,
        resolution_settings.fade,
        resolution_settings.min,
        resolution_settings.exponent,
    );
    if fade_alpha <= SHADOW_FADE_SKIP_THRESHOLD {
        return None;
    }

    if fadeout_time > 0.0 {
        let visible_now = views
            .iter()
            .any(|view| view.primitive_visibility.get(subject.index()));
        let info = scene.primitive_mut(subject).unwrap();
        let (state, start_percent) = if visible_now {
            (ShadowFadeState::FadingIn, info.mod_shadow_start_fade_in_percent)
        } else {
            (ShadowFadeState::FadingOut, info.mod_shadow_start_fade_out_percent)
        };
        let (time_alpha, percent) = mod_shadow_time_fade(
            time - info.last_visibility_change_time,
            fadeout_time,
            fadeout_exponent,
            state,
            start_percent,
        );
        match state {
            ShadowFadeState::FadingIn => info.mod_shadow_start_fade_in_percent = percent,
            ShadowFadeState::FadingOut => info.mod_shadow_start_fade_out_percent = percent,
        }
        fade_alpha *= time_alpha;
        if fade_alpha <= SHADOW_FADE_SKIP_THRESHOLD {
            return None;
        }
    }

    let light = scene.light(light_id).unwrap();
    let initializer = light.projected_shadow_initializer(&bounds)?;
    let transforms = ShadowTransforms::calculate(&initializer)?;

    let resolution = vega_lighting::shadow_resolution(
        screen_radius,
        resolution_settings.texels_per_pixel,
        resolution_settings.max,
        SHADOW_BORDER,
    )
    .max(resolution_settings.min);

    let mut subject_primitives = vec![subject];
    if let Some(group) = scene.shadow_groups.get(&subject) {
        subject_primitives.extend(group.children.iter().copied());
    }

    let receiver_primitives = if shadow_mode == vega_scene::ShadowMode::ModulatedBetter {
        gather_from_octree(scene, &transforms.receiver_frustum())
    } else {
        Vec::new()
    };

    let self_shadow_only = scene.primitive(subject).unwrap().flags.self_shadow_only;
    Some(ProjectedShadowInfo {
        light: light_id,
        subject: Some(subject),
        resolution: buffer_resolution(resolution, transforms.aspect),
        transforms,
        fade_alpha,
        modulated: shadow_mode.is_modulated(),
        preshadow: false,
        self_shadow_only,
        subject_primitives,
        receiver_primitives,
    })
}

/// Static casters shadowing the subject: gathered from the octree inside the
/// shadow's caster frustum, rendered at reduced resolution.
fn create_preshadow(scene: &Scene, shadow: &ProjectedShadowInfo) -> Option<ProjectedShadowInfo> {
    let casters: Vec<PrimitiveId> = gather_from_octree(scene, &shadow.transforms.subject_frustum())
        .into_iter()
        .filter(|&id| {
            scene
                .primitive(id)
                .is_some_and(|info| info.flags.static_shadowing)
        })
        .collect();
    if casters.is_empty() {
        return None;
    }
    let (width, height) = shadow.resolution;
    Some(ProjectedShadowInfo {
        light: shadow.light,
        subject: shadow.subject,
        transforms: shadow.transforms.clone(),
        resolution: (
            ((width as f32 * PRESHADOW_RESOLUTION_FACTOR) as u32).max(1),
            ((height as f32 * PRESHADOW_RESOLUTION_FACTOR) as u32).max(1),
        ),
        fade_alpha: shadow.fade_alpha,
        modulated: shadow.modulated,
        preshadow: true,
        self_shadow_only: shadow.self_shadow_only,
        subject_primitives: casters,
        receiver_primitives: Vec::new(),
    })
}

fn gather_from_octree(scene: &Scene, volume: &vega_math::ConvexVolume) -> Vec<PrimitiveId> {
    let mut gathered = Vec::new();
    scene
        .primitive_octree
        .query_volume(volume, |&id, _| gathered.push(id));
    gathered
}

fn whole_scene_bounds(scene: &Scene) -> Option<BoxSphereBounds> {
    let mut bounds: Option<BoxSphereBounds> = None;
    for (_, element_bounds) in scene.primitive_octree.iter() {
        bounds = Some(match bounds {
            Some(current) => current.union(element_bounds),
            None => *element_bounds,
        });
    }
    bounds
}

/// Shadow buffer extent from the x resolution and projected aspect; x always
/// carries the larger extent.
fn buffer_resolution(x_resolution: u32, aspect: f32) -> (u32, u32) {
    let y = ((x_resolution as f32 / aspect.max(1.0)) as u32).max(1);
    (x_resolution.max(1), y)
}
