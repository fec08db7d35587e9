//! The ordered pass pipeline, executed per depth priority group.
//!
//! Each group runs depth pre-pass, base pass, lighting with shadows,
//! distortion, translucency, then its post-process effects before the next
//! group starts. Scene color carries a dirty flag; the resolve that makes it
//! readable is deferred until a pass actually samples it.

use glam::Mat4;

use vega_draw::{DEFAULT_MATERIAL, DrawPolicy, Pass, fallback_program};
use vega_gpu::{
    BlendState, CommandSink, DepthState, InstanceConstants, MeshElementId, RasterizerState,
    RenderTargetId, RenderTargetKind, ShaderProgramId, VertexFormatId,
};
use vega_lighting::SHADOW_BORDER;
use vega_math::BoxSphereBounds;
use vega_scene::{
    Bitset, DepthPriorityGroup, DynamicElementCollector, DynamicMeshElement, LightId,
    LightMapKind, LightSceneInfo, PrimitiveId, StaticMeshId,
};

use crate::occlusion::{OCCLUSION_BOUNDS_OFFSET, OCCLUSION_BOUNDS_SCALE, ViewState};
use crate::renderer::SceneRenderer;
use crate::shadows::ProjectedShadowInfo;
use crate::view::View;

/// Unit-cube mesh the device layer provides for bounds-proxy draws
/// (occlusion queries, shadow frustum volumes).
pub const BOUNDS_PROXY_MESH: MeshElementId = MeshElementId(u64::MAX);
/// Full-screen triangle for post-process draws.
pub const FULLSCREEN_QUAD_MESH: MeshElementId = MeshElementId(u64::MAX - 1);
/// Position-only declaration shared by the proxy meshes.
pub const PROXY_VERTEX_FORMAT: VertexFormatId = VertexFormatId(u64::MAX);

/// A registered full-screen post-process effect, run at the end of its
/// depth priority group.
#[derive(Debug, Clone, Copy)]
pub struct PostProcessEffect {
    pub dpg: DepthPriorityGroup,
    pub program: ShaderProgramId,
    /// Lighting-only effects run before full effects within the group.
    pub lighting_only: bool,
}

/// Per-frame surface bookkeeping shared by the pass stages.
struct FrameSurfaces {
    scene_color: RenderTargetId,
    scene_depth: RenderTargetId,
    width: u32,
    height: u32,
    /// Scene color has unresolved writes; the next reader must resolve.
    scene_color_dirty: bool,
}

impl FrameSurfaces {
    fn bind_scene(&self, sink: &mut dyn CommandSink) {
        sink.set_render_target(Some(self.scene_color), Some(self.scene_depth));
        sink.set_viewport(0, 0, self.width, self.height);
    }

    /// Resolve scene color if it carries unresolved writes.
    fn resolve_scene_color(&mut self, sink: &mut dyn CommandSink) {
        if self.scene_color_dirty {
            sink.resolve(self.scene_color);
            self.scene_color_dirty = false;
        }
    }
}

/// Build the policy for one dynamic mesh element in one pass.
fn dynamic_policy(pass: Pass, element: &DynamicMeshElement) -> DrawPolicy {
    match pass {
        Pass::Depth => DrawPolicy::DepthOnly {
            vertex_format: element.vertex_format,
            program: element
                .programs
                .depth
                .unwrap_or_else(|| fallback_program(Pass::Depth)),
        },
        Pass::BasePass => match element.programs.base_pass {
            Some(program) => DrawPolicy::BasePass {
                vertex_format: element.vertex_format,
                program,
                material: element.material,
                light_map: LightMapKind::None,
            },
            None => DrawPolicy::BasePass {
                vertex_format: element.vertex_format,
                program: fallback_program(Pass::BasePass),
                material: DEFAULT_MATERIAL,
                light_map: LightMapKind::None,
            },
        },
        Pass::Distortion => match element.programs.distortion {
            Some(program) => DrawPolicy::Distortion {
                vertex_format: element.vertex_format,
                program,
                material: element.material,
            },
            None => DrawPolicy::Distortion {
                vertex_format: element.vertex_format,
                program: fallback_program(Pass::Distortion),
                material: DEFAULT_MATERIAL,
            },
        },
        Pass::Translucency => match element.programs.translucency {
            Some(program) => DrawPolicy::Translucency {
                vertex_format: element.vertex_format,
                program,
                material: element.material,
            },
            None => DrawPolicy::Translucency {
                vertex_format: element.vertex_format,
                program: fallback_program(Pass::Translucency),
                material: DEFAULT_MATERIAL,
            },
        },
        _ => unreachable!("no dynamic draws in pass {pass:?}"),
    }
}

impl SceneRenderer {
    /// Execute every pass of one view's frame, in depth-priority order.
    pub(crate) fn render_view(
        &mut self,
        view: &View,
        state: &mut ViewState,
        shadows: &[ProjectedShadowInfo],
        sink: &mut dyn CommandSink,
    ) {
        let width = (view.init.size.x as u32).max(1);
        let height = (view.init.size.y as u32).max(1);
        let scene_color = self.targets.allocate(RenderTargetKind::SceneColor, width, height);
        let scene_depth = self.targets.allocate(RenderTargetKind::SceneDepth, width, height);
        let presentation = self.targets.allocate(RenderTargetKind::Presentation, width, height);
        self.targets.acquire(scene_color);
        self.targets.acquire(scene_depth);
        self.targets.acquire(presentation);

        let mut surfaces = FrameSurfaces {
            scene_color,
            scene_depth,
            width,
            height,
            scene_color_dirty: false,
        };
        surfaces.bind_scene(sink);
        sink.set_scissor(None);
        sink.clear(Some([0.0; 4]), Some(1.0));

        for dpg in DepthPriorityGroup::ALL {
            self.depth_prepass(dpg, view, sink, &surfaces);
            self.base_pass(dpg, view, sink, &mut surfaces);
            if dpg == DepthPriorityGroup::World {
                // Opaque world depth is final here; later passes and next
                // frame's queries test against it.
                sink.resolve(surfaces.scene_depth);
                self.occlusion_tests(state, sink, &surfaces);
            }
            self.lighting_passes(dpg, view, state, shadows, sink, &mut surfaces);
            self.translucent_decal_pass(dpg, view, sink, &mut surfaces);
            if dpg == DepthPriorityGroup::World {
                self.fog_pass(sink, &mut surfaces);
            }
            self.distortion_pass(dpg, view, sink, &mut surfaces);
            self.translucency_pass(dpg, view, sink, &mut surfaces);
            if dpg == DepthPriorityGroup::World {
                self.velocity_pass(view, sink, &mut surfaces);
            }
            self.post_process_pass(dpg, sink, &mut surfaces, presentation);
        }
    }

    /// Depth-only draws of occluders, establishing early-Z for the base
    /// pass. Static occluders use their position-only stream when they have
    /// one.
    fn depth_prepass(
        &self,
        dpg: DepthPriorityGroup,
        view: &View,
        sink: &mut dyn CommandSink,
        surfaces: &FrameSurfaces,
    ) {
        sink.set_render_target(None, Some(surfaces.scene_depth));
        let lists = &self.draw_lists[dpg.index()];
        lists.position_only_depth.draw_visible(sink, &view.occluder_visibility);
        lists.depth.draw_visible(sink, &view.occluder_visibility);

        let threshold = self.settings.render.min_screen_radius_for_depth_prepass;
        let mut collector = DynamicElementCollector::new();
        for &id in &view.visible_dynamic_primitives[dpg.index()] {
            let Some(info) = self.scene.primitive(id) else {
                continue;
            };
            if !info.flags.use_as_occluder {
                continue;
            }
            let relevance = view.relevance[id.index()].unwrap_or_default();
            if !relevance.has_opaque() {
                continue;
            }
            if !view.passes_screen_size(&info.bounds, threshold) {
                continue;
            }
            collector.clear();
            info.proxy.draw_dynamic_elements(&mut collector, dpg);
            for element in collector.elements() {
                let policy = dynamic_policy(Pass::Depth, element);
                policy.set_shared_state(sink);
                policy.draw(sink, element.element, element.material, element.local_to_world);
            }
        }
    }

    /// Opaque and masked color: the static draw list first, grouped by
    /// light-map policy, then the dynamic sub-phase.
    fn base_pass(
        &self,
        dpg: DepthPriorityGroup,
        view: &View,
        sink: &mut dyn CommandSink,
        surfaces: &mut FrameSurfaces,
    ) {
        surfaces.bind_scene(sink);
        let lists = &self.draw_lists[dpg.index()];
        if lists.base_pass.draw_visible(sink, &view.static_mesh_visibility) {
            surfaces.scene_color_dirty = true;
        }

        let mut collector = DynamicElementCollector::new();
        for &id in &view.visible_dynamic_primitives[dpg.index()] {
            let Some(info) = self.scene.primitive(id) else {
                continue;
            };
            let relevance = view.relevance[id.index()].unwrap_or_default();
            if !relevance.has_opaque() {
                continue;
            }
            collector.clear();
            info.proxy.draw_dynamic_elements(&mut collector, dpg);
            for element in collector.elements() {
                let policy = dynamic_policy(Pass::BasePass, element);
                policy.set_shared_state(sink);
                policy.draw(sink, element.element, element.material, element.local_to_world);
                surfaces.scene_color_dirty = true;
            }
        }
    }

    /// Draw the expanded-bounds proxy of every query issued this frame,
    /// bracketed by begin/end, against the resolved world depth.
    fn occlusion_tests(
        &mut self,
        state: &mut ViewState,
        sink: &mut dyn CommandSink,
        surfaces: &FrameSurfaces,
    ) {
        let issues = state.take_pending_issues();
        if issues.is_empty() {
            return;
        }
        sink.set_depth_state(DepthState::ReadOnly);
        sink.set_blend_state(BlendState::Opaque);
        sink.set_rasterizer_state(RasterizerState::SolidNoCull);
        sink.set_shared_state(fallback_program(Pass::Depth), PROXY_VERTEX_FORMAT);
        for (query, bounds) in issues {
            let expanded = bounds.expanded(OCCLUSION_BOUNDS_SCALE, OCCLUSION_BOUNDS_OFFSET);
            let transform =
                Mat4::from_translation(expanded.origin) * Mat4::from_scale(expanded.box_extent);
            sink.begin_occlusion_query(query);
            sink.draw_mesh(BOUNDS_PROXY_MESH, DEFAULT_MATERIAL, InstanceConstants::new(transform));
            sink.end_occlusion_query(query);
        }
        surfaces.bind_scene(sink);
    }

    /// Shadowed lights first (shadow depths, attenuation projection, then
    /// the light's contribution), modulated shadow projections in between,
    /// unshadowed lights last.
    fn lighting_passes(
        &mut self,
        dpg: DepthPriorityGroup,
        view: &View,
        state: &mut ViewState,
        shadows: &[ProjectedShadowInfo],
        sink: &mut dyn CommandSink,
        surfaces: &mut FrameSurfaces,
    ) {
        // Projected shadows live in the world group; other groups run the
        // plain unshadowed path for every light.
        let world = dpg == DepthPriorityGroup::World;
        let queries_disabled = self.settings.debug.disable_occlusion_queries;

        let mut shadowed_lights: Vec<LightId> = Vec::new();
        if world {
            for shadow in shadows {
                if !shadowed_lights.contains(&shadow.light) {
                    shadowed_lights.push(shadow.light);
                }
            }
        }

        let mut modulated: Vec<&ProjectedShadowInfo> = Vec::new();
        for &light_id in &shadowed_lights {
            if !view.light_info(light_id).in_view_frustum {
                continue;
            }
            for shadow in shadows.iter().filter(|s| s.light == light_id) {
                // Whole-scene shadows span the view and are never occlusion
                // tested.
                let subject_bounds = shadow
                    .subject
                    .and_then(|id| self.scene.primitive(id))
                    .map(|info| info.bounds);
                let occluded = match subject_bounds {
                    Some(bounds) => state.update_shadow(
                        light_id,
                        shadow.subject,
                        &bounds,
                        queries_disabled,
                        sink,
                        &mut self.query_pool,
                    ),
                    None => false,
                };
                if occluded {
                    continue;
                }
                self.render_shadow_depth(shadow, sink, surfaces);
                if shadow.modulated {
                    modulated.push(shadow);
                } else {
                    self.project_shadow_attenuation(shadow, sink, surfaces);
                }
            }
            self.render_light_contribution(light_id, dpg, view, sink, surfaces);
        }

        for shadow in modulated {
            self.project_modulated_shadow(shadow, sink, surfaces);
        }

        let unshadowed: Vec<LightId> = self
            .scene
            .iter_lights()
            .map(|l| l.id)
            .filter(|id| !shadowed_lights.contains(id))
            .collect();
        for light_id in unshadowed {
            self.render_light_contribution(light_id, dpg, view, sink, surfaces);
        }
    }

    /// Render every caster of one projected shadow into the shared shadow
    /// depth buffer, leaving the border texels untouched for filtering.
    fn render_shadow_depth(
        &mut self,
        shadow: &ProjectedShadowInfo,
        sink: &mut dyn CommandSink,
        surfaces: &FrameSurfaces,
    ) {
        let (res_x, res_y) = shadow.resolution;
        let target = self.targets.allocate(
            RenderTargetKind::ShadowDepth,
            res_x + 2 * SHADOW_BORDER,
            res_y + 2 * SHADOW_BORDER,
        );
        self.targets.acquire(target);
        sink.set_render_target(None, Some(target));
        sink.set_viewport(SHADOW_BORDER, SHADOW_BORDER, res_x, res_y);
        sink.clear(None, Some(1.0));

        let mut collector = DynamicElementCollector::new();
        for &caster in &shadow.subject_primitives {
            let Some(info) = self.scene.primitive(caster) else {
                continue;
            };
            for &mesh_id in &info.static_meshes {
                let record = self.scene.static_mesh(mesh_id).unwrap();
                let element = &record.element;
                if !element.casts_shadow {
                    continue;
                }
                let policy = DrawPolicy::shadow_depth_for(element);
                policy.set_shared_state(sink);
                policy.draw(sink, element.element, element.material, element.local_to_world);
            }
            if info.proxy.view_relevance().dynamic_relevance {
                collector.clear();
                info.proxy.draw_dynamic_elements(&mut collector, DepthPriorityGroup::World);
                for element in collector.elements() {
                    let policy = dynamic_policy(Pass::Depth, element);
                    policy.set_shared_state(sink);
                    policy.draw(sink, element.element, element.material, element.local_to_world);
                }
            }
        }
        sink.resolve(target);
        surfaces.bind_scene(sink);
    }

    /// Project a non-modulated shadow into the light attenuation buffer.
    fn project_shadow_attenuation(
        &mut self,
        shadow: &ProjectedShadowInfo,
        sink: &mut dyn CommandSink,
        surfaces: &FrameSurfaces,
    ) {
        let attenuation = self.targets.allocate(
            RenderTargetKind::LightAttenuation,
            surfaces.width,
            surfaces.height,
        );
        self.targets.acquire(attenuation);
        sink.set_render_target(Some(attenuation), Some(surfaces.scene_depth));
        sink.set_viewport(0, 0, surfaces.width, surfaces.height);
        sink.set_depth_state(DepthState::ReadOnly);
        sink.set_blend_state(BlendState::Translucent);
        sink.set_rasterizer_state(RasterizerState::SolidNoCull);
        sink.set_shared_state(fallback_program(Pass::ShadowVolume), PROXY_VERTEX_FORMAT);
        sink.draw_mesh(
            BOUNDS_PROXY_MESH,
            DEFAULT_MATERIAL,
            InstanceConstants::new(shadow.transforms.subject.inverse()),
        );
        sink.resolve(attenuation);
        surfaces.bind_scene(sink);
    }

    /// Project a modulated shadow straight into scene color with
    /// destination-multiply blending, over the receiver volume.
    fn project_modulated_shadow(
        &mut self,
        shadow: &ProjectedShadowInfo,
        sink: &mut dyn CommandSink,
        surfaces: &mut FrameSurfaces,
    ) {
        surfaces.bind_scene(sink);
        let policy = DrawPolicy::shadow_volume_for(PROXY_VERTEX_FORMAT);
        policy.set_shared_state(sink);
        policy.draw(
            sink,
            BOUNDS_PROXY_MESH,
            DEFAULT_MATERIAL,
            shadow.transforms.post_subject.inverse(),
        );
        surfaces.scene_color_dirty = true;
    }

    /// Additive contribution of one light over its visible lit meshes,
    /// scissored to the light's screen extent.
    fn render_light_contribution(
        &self,
        light_id: LightId,
        dpg: DepthPriorityGroup,
        view: &View,
        sink: &mut dyn CommandSink,
        surfaces: &mut FrameSurfaces,
    ) {
        let info = view.light_info(light_id);
        if !info.in_view_frustum || !info.dpg_has_visible_lit[dpg.index()] {
            return;
        }
        let Some(light) = self.scene.light(light_id) else {
            return;
        };

        let mut lit = Bitset::new();
        lit.reset(self.scene.static_mesh_capacity());
        let mut any = false;
        for (_, edge) in self
            .scene
            .interactions
            .iter_light_list(light.dynamic_interaction_head)
        {
            if !view.primitive_visibility.get(edge.primitive.index()) {
                continue;
            }
            let Some(primitive) = self.scene.primitive(edge.primitive) else {
                continue;
            };
            for &mesh_id in &primitive.static_meshes {
                let record = self.scene.static_mesh(mesh_id).unwrap();
                if record.element.dpg == dpg {
                    lit.set(mesh_id.index());
                    any = true;
                }
            }
        }
        if !any {
            return;
        }

        sink.set_scissor(self.light_scissor_rect(view, light));
        sink.set_depth_state(DepthState::ReadOnly);
        sink.set_blend_state(BlendState::Additive);
        sink.set_rasterizer_state(RasterizerState::Solid);
        for index in lit.iter_set() {
            let record = self.scene.static_mesh(StaticMeshId(index as u32)).unwrap();
            let element = &record.element;
            let program = element
                .programs
                .base_pass
                .unwrap_or_else(|| fallback_program(Pass::BasePass));
            sink.set_shared_state(program, element.vertex_format);
            sink.draw_mesh(
                element.element,
                element.material,
                InstanceConstants::new(element.local_to_world),
            );
        }
        sink.set_scissor(None);
        surfaces.scene_color_dirty = true;
    }

    /// Screen rect covering a local light's influence sphere; `None` means
    /// the light reaches the whole viewport.
    fn light_scissor_rect(
        &self,
        view: &View,
        light: &LightSceneInfo,
    ) -> Option<(u32, u32, u32, u32)> {
        let sphere = light.bounding_sphere()?;
        let clip = view.view_projection * sphere.center.extend(1.0);
        if clip.w <= sphere.radius {
            // Center behind or straddling the near plane; no useful rect.
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        let half_x = view.init.size.x * 0.5;
        let half_y = view.init.size.y * 0.5;
        let center_x = (ndc.x + 1.0) * half_x;
        let center_y = (1.0 - ndc.y) * half_y;
        let bounds = BoxSphereBounds::new(sphere.center, glam::Vec3::splat(sphere.radius), sphere.radius);
        let pixels = view.screen_radius_of(&bounds);

        let x0 = (center_x - pixels).max(0.0) as u32;
        let y0 = (center_y - pixels).max(0.0) as u32;
        let x1 = ((center_x + pixels).min(view.init.size.x)).max(0.0) as u32;
        let y1 = ((center_y + pixels).min(view.init.size.y)).max(0.0) as u32;
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0, y0, x1 - x0, y1 - y0))
    }

    /// Translucent decals, drawn after lighting.
    fn translucent_decal_pass(
        &self,
        dpg: DepthPriorityGroup,
        view: &View,
        sink: &mut dyn CommandSink,
        surfaces: &mut FrameSurfaces,
    ) {
        let mut collector = DynamicElementCollector::new();
        for &id in &view.visible_dynamic_primitives[dpg.index()] {
            let relevance = view.relevance[id.index()].unwrap_or_default();
            if !relevance.decal_dynamic {
                continue;
            }
            let Some(info) = self.scene.primitive(id) else {
                continue;
            };
            collector.clear();
            info.proxy.draw_dynamic_elements(&mut collector, dpg);
            for element in collector.elements() {
                let policy = dynamic_policy(Pass::Translucency, element);
                policy.set_shared_state(sink);
                policy.draw(sink, element.element, element.material, element.local_to_world);
                surfaces.scene_color_dirty = true;
            }
        }
    }

    /// Height fog over the world group, blended into scene color from the
    /// resolved depth. Skipped while no fog program is registered.
    fn fog_pass(&mut self, sink: &mut dyn CommandSink, surfaces: &mut FrameSurfaces) {
        let Some(program) = self.fog_program else {
            return;
        };
        surfaces.bind_scene(sink);
        sink.set_depth_state(DepthState::Disabled);
        sink.set_blend_state(BlendState::Translucent);
        sink.set_rasterizer_state(RasterizerState::Solid);
        sink.set_shared_state(program, PROXY_VERTEX_FORMAT);
        sink.draw_mesh(
            FULLSCREEN_QUAD_MESH,
            DEFAULT_MATERIAL,
            InstanceConstants::new(Mat4::IDENTITY),
        );
        surfaces.scene_color_dirty = true;
    }

    /// Distortion primitives sample the resolved scene color, so the pass
    /// resolves once up front when anything will draw.
    fn distortion_pass(
        &self,
        dpg: DepthPriorityGroup,
        view: &View,
        sink: &mut dyn CommandSink,
        surfaces: &mut FrameSurfaces,
    ) {
        if view.distortion[dpg.index()].is_empty() {
            return;
        }
        surfaces.resolve_scene_color(sink);
        surfaces.bind_scene(sink);
        for sorted in &view.distortion[dpg.index()] {
            if self.draw_sorted_primitive(sorted.id, dpg, Pass::Distortion, view, sink) {
                surfaces.scene_color_dirty = true;
            }
        }
    }

    /// Back-to-front translucency. A primitive that samples scene color
    /// forces a resolve-and-rebind immediately before its own draw so it
    /// sees every draw issued so far.
    fn translucency_pass(
        &self,
        dpg: DepthPriorityGroup,
        view: &View,
        sink: &mut dyn CommandSink,
        surfaces: &mut FrameSurfaces,
    ) {
        for sorted in &view.translucent[dpg.index()] {
            if sorted.reads_scene_color {
                surfaces.resolve_scene_color(sink);
                surfaces.bind_scene(sink);
            }
            if self.draw_sorted_primitive(sorted.id, dpg, Pass::Translucency, view, sink) {
                surfaces.scene_color_dirty = true;
            }
        }
    }

    fn draw_sorted_primitive(
        &self,
        id: PrimitiveId,
        dpg: DepthPriorityGroup,
        pass: Pass,
        view: &View,
        sink: &mut dyn CommandSink,
    ) -> bool {
        let Some(info) = self.scene.primitive(id) else {
            return false;
        };
        let relevance = view.relevance[id.index()].unwrap_or_default();
        let mut drew = false;
        if relevance.static_relevance {
            for &mesh_id in &info.static_meshes {
                let record = self.scene.static_mesh(mesh_id).unwrap();
                let element = &record.element;
                if element.dpg != dpg {
                    continue;
                }
                let policy = match pass {
                    Pass::Distortion => DrawPolicy::distortion_for(element),
                    _ => DrawPolicy::translucency_for(element),
                };
                policy.set_shared_state(sink);
                policy.draw(sink, element.element, element.material, element.local_to_world);
                drew = true;
            }
        }
        if relevance.dynamic_relevance {
            let mut collector = DynamicElementCollector::new();
            info.proxy.draw_dynamic_elements(&mut collector, dpg);
            for element in collector.elements() {
                let policy = dynamic_policy(pass, element);
                policy.set_shared_state(sink);
                policy.draw(sink, element.element, element.material, element.local_to_world);
                drew = true;
            }
        }
        drew
    }

    /// World-group velocity buffer for motion blur: meshes of visible,
    /// movable primitives that moved since the last presented frame.
    fn velocity_pass(
        &mut self,
        view: &View,
        sink: &mut dyn CommandSink,
        surfaces: &FrameSurfaces,
    ) {
        if !view.velocity_visibility.any() {
            return;
        }
        let velocity = self
            .targets
            .allocate(RenderTargetKind::Velocity, surfaces.width, surfaces.height);
        self.targets.acquire(velocity);
        sink.set_render_target(Some(velocity), Some(surfaces.scene_depth));
        sink.set_viewport(0, 0, surfaces.width, surfaces.height);
        sink.clear(Some([0.0; 4]), None);
        for index in view.velocity_visibility.iter_set() {
            let record = self.scene.static_mesh(StaticMeshId(index as u32)).unwrap();
            let element = &record.element;
            let policy = DrawPolicy::velocity_for(element);
            policy.set_shared_state(sink);
            policy.draw(sink, element.element, element.material, element.local_to_world);
        }
        sink.resolve(velocity);
        surfaces.bind_scene(sink);
    }

    /// Full-screen effects registered for this group, lighting-only effects
    /// first. In the final group the last effect writes the presentation
    /// target; if none is registered a plain copy does.
    fn post_process_pass(
        &mut self,
        dpg: DepthPriorityGroup,
        sink: &mut dyn CommandSink,
        surfaces: &mut FrameSurfaces,
        presentation: RenderTargetId,
    ) {
        let mut ordered: Vec<PostProcessEffect> = self
            .post_process
            .iter()
            .copied()
            .filter(|e| e.dpg == dpg && e.lighting_only)
            .collect();
        ordered.extend(
            self.post_process
                .iter()
                .copied()
                .filter(|e| e.dpg == dpg && !e.lighting_only),
        );

        let final_group = dpg == DepthPriorityGroup::PostProcess;
        let count = ordered.len();
        for (index, effect) in ordered.into_iter().enumerate() {
            surfaces.resolve_scene_color(sink);
            let writes_presentation = final_group && index + 1 == count;
            let target = if writes_presentation {
                presentation
            } else {
                surfaces.scene_color
            };
            sink.set_render_target(Some(target), None);
            sink.set_viewport(0, 0, surfaces.width, surfaces.height);
            sink.set_depth_state(DepthState::Disabled);
            sink.set_blend_state(BlendState::Opaque);
            sink.set_rasterizer_state(RasterizerState::Solid);
            sink.set_shared_state(effect.program, PROXY_VERTEX_FORMAT);
            sink.draw_mesh(
                FULLSCREEN_QUAD_MESH,
                DEFAULT_MATERIAL,
                InstanceConstants::new(Mat4::IDENTITY),
            );
            if !writes_presentation {
                surfaces.scene_color_dirty = true;
            }
        }

        if final_group && count == 0 {
            // Nothing registered; copy the frame so presentation always
            // holds the final image.
            surfaces.resolve_scene_color(sink);
            sink.set_render_target(Some(presentation), None);
            sink.set_viewport(0, 0, surfaces.width, surfaces.height);
            sink.set_depth_state(DepthState::Disabled);
            sink.set_blend_state(BlendState::Opaque);
            sink.set_rasterizer_state(RasterizerState::Solid);
            sink.set_shared_state(fallback_program(Pass::BasePass), PROXY_VERTEX_FORMAT);
            sink.draw_mesh(
                FULLSCREEN_QUAD_MESH,
                DEFAULT_MATERIAL,
                InstanceConstants::new(Mat4::IDENTITY),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};
    use vega_config::Settings;
    use vega_gpu::{RecordingSink, SinkCommand};
    use vega_scene::PrimitiveDescriptor;

    use crate::renderer::SceneRenderer;
    use crate::test_support::{MeshProxy, view_init};

    fn draws_of(sink: &RecordingSink, mesh: MeshElementId) -> Vec<usize> {
        sink.commands()
            .iter()
            .enumerate()
            .filter_map(|(i, c)| match c {
                SinkCommand::DrawMesh { element, .. } if *element == mesh => Some(i),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_frame_clears_once_then_draws_then_presents() {
        let (mut renderer, handle) = SceneRenderer::new(Settings::default());
        handle.add_primitive(
            MeshProxy::cube(Vec3::new(0.0, 0.0, -50.0)),
            Mat4::IDENTITY,
            PrimitiveDescriptor::default(),
        );
        let mut sink = RecordingSink::new();
        let mut states = [crate::occlusion::ViewState::new()];
        renderer.render_frame(vec![view_init()], &mut states, &mut sink, 1.0);

        let clears = sink
            .commands()
            .iter()
            .filter(|c| matches!(c, SinkCommand::Clear { color: Some(_), .. }))
            .count();
        assert_eq!(clears, 1);
        assert!(sink.draw_count() > 0);
        assert!(matches!(
            sink.commands().last(),
            Some(SinkCommand::Present(_))
        ));
    }

    #[test]
    fn test_scene_color_resolved_before_presentation_copy() {
        let (mut renderer, handle) = SceneRenderer::new(Settings::default());
        handle.add_primitive(
            MeshProxy::cube(Vec3::new(0.0, 0.0, -50.0)),
            Mat4::IDENTITY,
            PrimitiveDescriptor::default(),
        );
        let mut sink = RecordingSink::new();
        let mut states = [crate::occlusion::ViewState::new()];
        renderer.render_frame(vec![view_init()], &mut states, &mut sink, 1.0);

        let scene_color = renderer.targets.get(RenderTargetKind::SceneColor).unwrap();
        let resolve = sink
            .commands()
            .iter()
            .position(|c| matches!(c, SinkCommand::Resolve(t) if *t == scene_color));
        let copy = draws_of(&sink, FULLSCREEN_QUAD_MESH);
        assert!(resolve.is_some(), "dirty scene color must resolve");
        assert!(!copy.is_empty(), "presentation copy must draw");
        assert!(resolve.unwrap() < copy[0]);
    }

    #[test]
    fn test_occlusion_query_brackets_bounds_proxy_draw() {
        let (mut renderer, handle) = SceneRenderer::new(Settings::default());
        handle.add_primitive(
            MeshProxy::cube(Vec3::new(0.0, 0.0, -50.0)),
            Mat4::IDENTITY,
            PrimitiveDescriptor::default(),
        );
        let mut sink = RecordingSink::new();
        let mut states = [crate::occlusion::ViewState::new()];
        renderer.render_frame(vec![view_init()], &mut states, &mut sink, 1.0);

        let begin = sink
            .commands()
            .iter()
            .position(|c| matches!(c, SinkCommand::BeginOcclusionQuery(_)))
            .expect("a query must be issued for the cube");
        assert!(matches!(
            sink.commands()[begin + 1],
            SinkCommand::DrawMesh { element, .. } if element == BOUNDS_PROXY_MESH
        ));
        assert!(matches!(
            sink.commands()[begin + 2],
            SinkCommand::EndOcclusionQuery(_)
        ));
    }

    #[test]
    fn test_disabled_occlusion_issues_no_queries() {
        let mut settings = Settings::default();
        settings.debug.disable_occlusion_queries = true;
        let (mut renderer, handle) = SceneRenderer::new(settings);
        handle.add_primitive(
            MeshProxy::cube(Vec3::new(0.0, 0.0, -50.0)),
            Mat4::IDENTITY,
            PrimitiveDescriptor::default(),
        );
        let mut sink = RecordingSink::new();
        let mut states = [crate::occlusion::ViewState::new()];
        renderer.render_frame(vec![view_init()], &mut states, &mut sink, 1.0);
        assert!(
            !sink
                .commands()
                .iter()
                .any(|c| matches!(c, SinkCommand::BeginOcclusionQuery(_)))
        );
    }

    #[test]
    fn test_velocity_pass_draws_moved_primitive() {
        let (mut renderer, handle) = SceneRenderer::new(Settings::default());
        let id = handle.add_primitive(
            MeshProxy::cube(Vec3::new(0.0, 0.0, -50.0)),
            Mat4::IDENTITY,
            PrimitiveDescriptor::default(),
        );
        renderer.sync_scene();
        handle.update_primitive_transform(
            id,
            Mat4::from_translation(Vec3::new(3.0, 0.0, -50.0)),
            vega_math::BoxSphereBounds::new(Vec3::new(3.0, 0.0, -50.0), Vec3::ONE, 1.8),
        );
        let mut sink = RecordingSink::new();
        let mut states = [crate::occlusion::ViewState::new()];
        renderer.render_frame(vec![view_init()], &mut states, &mut sink, 1.0);

        let velocity = renderer
            .targets
            .get(RenderTargetKind::Velocity)
            .expect("velocity target allocated for the mover");
        assert!(
            sink.commands()
                .iter()
                .any(|c| matches!(c, SinkCommand::Resolve(t) if *t == velocity))
        );
    }

    #[test]
    fn test_stationary_scene_skips_velocity_target() {
        let (mut renderer, handle) = SceneRenderer::new(Settings::default());
        handle.add_primitive(
            MeshProxy::cube(Vec3::new(0.0, 0.0, -50.0)),
            Mat4::IDENTITY,
            PrimitiveDescriptor::default(),
        );
        let mut sink = RecordingSink::new();
        let mut states = [crate::occlusion::ViewState::new()];
        renderer.render_frame(vec![view_init()], &mut states, &mut sink, 1.0);
        assert!(renderer.targets.get(RenderTargetKind::Velocity).is_none());
    }

    #[test]
    fn test_registered_post_process_effect_writes_presentation() {
        let (mut renderer, handle) = SceneRenderer::new(Settings::default());
        handle.add_primitive(
            MeshProxy::cube(Vec3::new(0.0, 0.0, -50.0)),
            Mat4::IDENTITY,
            PrimitiveDescriptor::default(),
        );
        renderer.add_post_process_effect(PostProcessEffect {
            dpg: DepthPriorityGroup::PostProcess,
            program: ShaderProgramId(900),
            lighting_only: false,
        });
        let mut sink = RecordingSink::new();
        let mut states = [crate::occlusion::ViewState::new()];
        renderer.render_frame(vec![view_init()], &mut states, &mut sink, 1.0);

        let presentation = renderer
            .targets
            .get(RenderTargetKind::Presentation)
            .unwrap();
        let bind = sink
            .commands()
            .iter()
            .position(
                |c| matches!(c, SinkCommand::SetRenderTarget { color: Some(t), .. } if *t == presentation),
            )
            .expect("final effect binds presentation");
        let quad_draws = draws_of(&sink, FULLSCREEN_QUAD_MESH);
        assert_eq!(quad_draws.len(), 1, "only the registered effect draws a quad");
        assert!(bind < quad_draws[0]);
        let effect_bind = sink
            .commands()
            .iter()
            .any(|c| matches!(c, SinkCommand::SetSharedState { program, .. } if *program == ShaderProgramId(900)));
        assert!(effect_bind);
    }

    #[test]
    fn test_fog_draws_one_quad_into_scene_color() {
        let (mut renderer, handle) = SceneRenderer::new(Settings::default());
        handle.add_primitive(
            MeshProxy::cube(Vec3::new(0.0, 0.0, -50.0)),
            Mat4::IDENTITY,
            PrimitiveDescriptor::default(),
        );
        renderer.set_fog_program(Some(ShaderProgramId(800)));
        let mut sink = RecordingSink::new();
        let mut states = [crate::occlusion::ViewState::new()];
        renderer.render_frame(vec![view_init()], &mut states, &mut sink, 1.0);

        // The fog quad plus the implicit presentation copy.
        let quad_draws = draws_of(&sink, FULLSCREEN_QUAD_MESH);
        assert_eq!(quad_draws.len(), 2);
        let fog_bind = sink
            .commands()
            .iter()
            .position(|c| matches!(c, SinkCommand::SetSharedState { program, .. } if *program == ShaderProgramId(800)))
            .expect("fog program must bind");
        assert!(fog_bind < quad_draws[0]);
    }

    #[test]
    fn test_view_sized_targets_grow_only() {
        let (mut renderer, _handle) = SceneRenderer::new(Settings::default());
        let mut sink = RecordingSink::new();
        let mut states = [crate::occlusion::ViewState::new()];
        renderer.render_frame(vec![view_init()], &mut states, &mut sink, 1.0);
        let color = renderer.targets.get(RenderTargetKind::SceneColor).unwrap();
        assert_eq!(renderer.targets.size(color), (1280, 720));

        // A smaller view keeps the existing surface.
        let mut small = view_init();
        small.size = Vec2::new(640.0, 360.0);
        let mut states = [crate::occlusion::ViewState::new()];
        renderer.render_frame(vec![small], &mut states, &mut sink, 2.0);
        assert_eq!(renderer.targets.size(color), (1280, 720));
    }
}
