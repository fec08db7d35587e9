//! The per-frame visibility pass: octree walk, distance and hidden-set
//! culling, occlusion resolution, relevance routing, and light culling.

use vega_config::Settings;
use vega_gpu::{CommandSink, OcclusionQueryPool};
use vega_scene::{DepthPriorityGroup, LightId, PrimitiveId, PrimitiveSceneInfo, Scene};

use crate::occlusion::ViewState;
use crate::view::{FrameStage, SortedPrimitive, View};

/// A primitive unseen for longer than this counts as having left visibility;
/// crossing the gap in either direction restarts the modulated shadow fade.
const VISIBILITY_CHANGE_GAP: f32 = 0.1;

/// DPGs a primitive draws in: the groups of its static elements, or World
/// for purely dynamic primitives.
fn primitive_dpg_mask(scene: &Scene, info: &PrimitiveSceneInfo) -> [bool; 5] {
    let mut mask = [false; 5];
    for &mesh_id in &info.static_meshes {
        if let Some(record) = scene.static_mesh(mesh_id) {
            mask[record.element.dpg.index()] = true;
        }
    }
    if !mask.iter().any(|&m| m) {
        mask[DepthPriorityGroup::World.index()] = true;
    }
    mask
}

/// Cull primitives against one view and fill its visibility state.
///
/// Runs the full culling sequence per candidate: frustum (via the octree
/// walk), distance band, hidden set, occlusion history. Visible primitives
/// have their relevance classified and are routed into the per-DPG buckets.
#[allow(clippy::too_many_arguments)]
pub fn determine_visibility(
    scene: &mut Scene,
    view: &mut View,
    state: &mut ViewState,
    settings: &Settings,
    sink: &mut dyn CommandSink,
    pool: &mut OcclusionQueryPool,
    time: f32,
) {
    assert_eq!(view.stage(), FrameStage::BitsetsAllocated);
    state.begin_frame(
        &view.init.view_matrix,
        view.init.view_origin,
        &settings.occlusion,
        pool,
        time,
    );

    let mut candidates: Vec<PrimitiveId> = Vec::new();
    scene
        .primitive_octree
        .query_volume(&view.frustum, |&id, _| candidates.push(id));

    for id in candidates {
        let info = scene
            .primitive(id)
            .unwrap_or_else(|| panic!("octree references detached primitive {id:?}"));
        let bounds = info.bounds;
        let flags = info.flags;
        let was_recently_visible = time - info.last_render_time <= VISIBILITY_CHANGE_GAP;

        let mut visible = true;
        if view.init.is_perspective && !flags.always_visible {
            let distance_squared = view.init.view_origin.distance_squared(bounds.origin);
            let min = info.min_draw_distance;
            let max = info.max_draw_distance;
            // Visible band is [min, max): a primitive at exactly the max
            // distance is culled.
            if distance_squared < min * min || distance_squared >= max * max {
                visible = false;
            }
        }

        if visible && view.init.hidden_primitives.contains(&id) {
            visible = false;
        }

        let mut definitely_unoccluded = false;
        if visible {
            let verdict = state.update_primitive(
                id,
                &bounds,
                flags.always_visible,
                view.init.view_origin,
                view.screen_radius_of(&bounds),
                &settings.occlusion,
                settings.debug.disable_occlusion_queries,
                sink,
                pool,
                time,
            );
            visible = verdict.visible;
            definitely_unoccluded = verdict.definitely_unoccluded;
        }

        if visible {
            mark_visible(
                scene,
                view,
                id,
                definitely_unoccluded,
                was_recently_visible,
                settings.render.min_screen_radius_for_depth_prepass,
                time,
            );
        } else if was_recently_visible {
            // Just dropped out of visibility; restart the modulated fade
            // from the complement of however far the fade-in got.
            let info = scene.primitive_mut(id).unwrap();
            info.last_visibility_change_time = time;
            info.mod_shadow_start_fade_out_percent = 1.0 - info.mod_shadow_start_fade_in_percent;
        }
    }

    for dpg in DepthPriorityGroup::ALL {
        view.sort_ordered_sets(dpg);
    }
    state.trim(time, settings.occlusion.history_keep_time, pool);
    view.advance_to(FrameStage::PrimitivesCulled);
}

#[allow(clippy::too_many_arguments)]
fn mark_visible(
    scene: &mut Scene,
    view: &mut View,
    id: PrimitiveId,
    definitely_unoccluded: bool,
    was_recently_visible: bool,
    min_prepass_fraction: f32,
    time: f32,
) {
    let (relevance, bounds, dpg_mask, static_meshes) = {
        let info = scene.primitive(id).unwrap();
        (
            info.proxy.view_relevance(),
            info.bounds,
            primitive_dpg_mask(scene, info),
            info.static_meshes.clone(),
        )
    };

    view.primitive_visibility.set(id.index());
    view.relevance[id.index()] = Some(relevance);
    if definitely_unoccluded {
        view.definitely_unoccluded.set(id.index());
    }

    {
        let info = scene.primitive_mut(id).unwrap();
        if !was_recently_visible {
            info.last_visibility_change_time = time;
            info.mod_shadow_start_fade_in_percent = 1.0 - info.mod_shadow_start_fade_out_percent;
        }
        // External streaming and shadow fading only trust confirmed
        // sightings.
        if definitely_unoccluded {
            info.last_render_time = time;
        }
    }

    if relevance.static_relevance && relevance.has_opaque() {
        for mesh_id in &static_meshes {
            let record = scene.static_mesh(*mesh_id).unwrap();
            view.static_mesh_visibility.set(mesh_id.index());
            let occluder = record.element.use_as_occluder
                && scene.primitive(id).unwrap().flags.use_as_occluder
                && view.passes_screen_size(&bounds, min_prepass_fraction);
            if occluder {
                view.occluder_visibility.set(mesh_id.index());
            }
        }
    } else if relevance.static_relevance {
        // Translucent/distortion static elements draw through the sorted
        // sets, but their visibility bits still gate the draw lists.
        for mesh_id in &static_meshes {
            view.static_mesh_visibility.set(mesh_id.index());
        }
    }

    for dpg in DepthPriorityGroup::ALL {
        if !dpg_mask[dpg.index()] {
            continue;
        }
        if relevance.dynamic_relevance {
            view.visible_dynamic_primitives[dpg.index()].push(id);
        }
        let sorted = SortedPrimitive {
            id,
            priority: relevance.translucency_sort_priority,
            depth: view.view_depth(bounds.origin),
            reads_scene_color: relevance.reads_scene_color,
        };
        if relevance.translucent {
            view.translucent[dpg.index()].push(sorted);
        }
        if relevance.distortion {
            view.distortion[dpg.index()].push(sorted);
        }
    }
}

/// Mark lights visible for one view.
///
/// Directional lights are always in-frustum. Bounded lights must intersect
/// the frustum and either light at least one visible lit primitive or use a
/// modulated shadow mode, which renders regardless of visible subjects.
pub fn cull_lights(scene: &Scene, view: &mut View) {
    assert_eq!(view.stage(), FrameStage::PrimitivesCulled);

    let light_ids: Vec<LightId> = scene.iter_lights().map(|light| light.id).collect();
    for id in light_ids {
        let light = scene.light(id).unwrap();

        let in_frustum = match light.bounding_sphere() {
            None => true,
            Some(sphere) => view.frustum.intersects_sphere(&sphere),
        };
        if !in_frustum {
            continue;
        }

        let mut dpg_has_visible_lit = [false; 5];
        for (_, interaction) in scene.interactions.iter_light_list(light.dynamic_interaction_head) {
            let primitive = interaction.primitive;
            if !view.primitive_visibility.get(primitive.index()) {
                continue;
            }
            let Some(relevance) = view.relevance[primitive.index()] else {
                continue;
            };
            if !relevance.lit {
                continue;
            }
            let info = scene
                .primitive(primitive)
                .unwrap_or_else(|| panic!("interaction references detached primitive {primitive:?}"));
            let mask = primitive_dpg_mask(scene, info);
            for dpg in 0..5 {
                dpg_has_visible_lit[dpg] |= mask[dpg];
            }
        }

        let any_lit = dpg_has_visible_lit.iter().any(|&lit| lit);
        let visible = light.is_directional() || any_lit || light.shadow_mode.is_modulated();
        if visible {
            view.lights[id.index()] = crate::view::VisibleLightInfo {
                in_view_frustum: true,
                dpg_has_visible_lit,
            };
        }
    }

    view.advance_to(FrameStage::LightsCulled);
}
