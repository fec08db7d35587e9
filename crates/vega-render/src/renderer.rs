//! The render-thread context.
//!
//! [`SceneRenderer`] owns everything the render thread works with: the
//! scene, the command channel consumer, the static draw lists, the render
//! target registry, the occlusion query pool, and the motion table for the
//! velocity pass. One `render_frame` call runs the whole frame: drain the
//! channel, init views, gather shadows, run the pass pipeline, present.

use glam::Mat4;
use rustc_hash::FxHashMap;

use vega_config::Settings;
use vega_draw::{DrawPolicy, StaticDrawList};
use vega_gpu::{
    CommandSink, OcclusionQueryPool, RenderTargetKind, RenderTargets, ShaderProgramId,
};
use vega_scene::{
    DepthPriorityGroup, PrimitiveId, Scene, SceneChannel, SceneEvent, SceneHandle, StaticMeshId,
};

use crate::occlusion::ViewState;
use crate::passes::PostProcessEffect;
use crate::shadows::gather_shadows;
use crate::view::{FrameStage, View, ViewInit};
use crate::visibility::{cull_lights, determine_visibility};

/// Which static draw list a mesh entry lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListKind {
    PositionOnlyDepth,
    Depth,
    BasePass,
}

#[derive(Debug, Clone, Copy)]
struct MeshSlot {
    dpg: DepthPriorityGroup,
    kind: ListKind,
    slot: vega_draw::DrawListSlot,
}

/// The static draw lists of one depth priority group.
#[derive(Default)]
pub(crate) struct DpgDrawLists {
    pub position_only_depth: StaticDrawList,
    pub depth: StaticDrawList,
    pub base_pass: StaticDrawList,
}

impl DpgDrawLists {
    fn list_mut(&mut self, kind: ListKind) -> &mut StaticDrawList {
        match kind {
            ListKind::PositionOnlyDepth => &mut self.position_only_depth,
            ListKind::Depth => &mut self.depth,
            ListKind::BasePass => &mut self.base_pass,
        }
    }
}

/// Render-thread frame orchestrator and state owner.
pub struct SceneRenderer {
    pub scene: Scene,
    pub settings: Settings,
    pub targets: RenderTargets,
    channel: SceneChannel,
    pub(crate) query_pool: OcclusionQueryPool,
    pub(crate) draw_lists: [DpgDrawLists; 5],
    mesh_slots: FxHashMap<StaticMeshId, Vec<MeshSlot>>,
    /// Previous local-to-world of primitives that moved since the last
    /// presented frame; feeds the velocity pass and is cleared per present.
    motion_table: FxHashMap<PrimitiveId, Mat4>,
    pub(crate) post_process: Vec<PostProcessEffect>,
    /// Full-screen height-fog program; fog is disabled while unset.
    pub(crate) fog_program: Option<ShaderProgramId>,
    frame_index: u64,
}

impl SceneRenderer {
    /// Create a renderer and the logic-thread handle feeding it.
    pub fn new(settings: Settings) -> (Self, SceneHandle) {
        let (handle, channel) = SceneChannel::new();
        let renderer = Self {
            scene: Scene::new(settings.render.octree_extent),
            settings,
            targets: RenderTargets::new(),
            channel,
            query_pool: OcclusionQueryPool::new(),
            draw_lists: Default::default(),
            mesh_slots: FxHashMap::default(),
            motion_table: FxHashMap::default(),
            post_process: Vec::new(),
            fog_program: None,
            frame_index: 0,
        };
        (renderer, handle)
    }

    /// Register a full-screen post-process effect; registration order is
    /// draw order within its group and lighting-only class.
    pub fn add_post_process_effect(&mut self, effect: PostProcessEffect) {
        self.post_process.push(effect);
    }

    /// Enable height fog with the given full-screen program, or disable it
    /// with `None`.
    pub fn set_fog_program(&mut self, program: Option<ShaderProgramId>) {
        self.fog_program = program;
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Previous transform of a primitive that moved since the last present.
    pub fn previous_transform(&self, id: PrimitiveId) -> Option<Mat4> {
        self.motion_table.get(&id).copied()
    }

    /// Apply every pending scene command and mirror the structural changes
    /// into the draw lists and motion table.
    pub fn sync_scene(&mut self) {
        let events = self.channel.drain(&mut self.scene);
        if !events.is_empty() {
            log::debug!("applied {} scene commands", events.len());
        }
        for event in events {
            match event {
                SceneEvent::PrimitiveAdded(id) => self.attach_draw_list_entries(id),
                SceneEvent::PrimitiveRemoved(id, meshes) => {
                    for mesh in meshes {
                        self.detach_draw_list_entries(mesh);
                    }
                    self.motion_table.remove(&id);
                }
                SceneEvent::PrimitiveMoved { id, previous } => {
                    // Keep the oldest pre-move transform until the frame is
                    // presented; velocity measures motion across the whole
                    // presented interval.
                    self.motion_table.entry(id).or_insert(previous);
                    self.refresh_draw_list_transforms(id);
                }
                SceneEvent::LightAdded(_) | SceneEvent::LightRemoved(_) => {}
            }
        }
    }

    fn attach_draw_list_entries(&mut self, id: PrimitiveId) {
        let Some(info) = self.scene.primitive(id) else {
            return;
        };
        let relevance = info.proxy.view_relevance();
        if !relevance.has_opaque() {
            // Translucent and distortion elements draw through the sorted
            // per-frame sets, never through the static lists.
            return;
        }
        let local_to_world = info.local_to_world;
        let meshes = info.static_meshes.clone();

        for mesh_id in meshes {
            let record = self.scene.static_mesh(mesh_id).unwrap();
            let element = record.element.clone();
            let lists = &mut self.draw_lists[element.dpg.index()];
            let mut slots = Vec::new();

            if element.use_as_occluder {
                match DrawPolicy::position_only_depth_for(&element) {
                    Some(policy) => {
                        let slot = lists.position_only_depth.add_mesh(
                            mesh_id,
                            element.element,
                            element.material,
                            local_to_world,
                            policy,
                        );
                        slots.push(MeshSlot { dpg: element.dpg, kind: ListKind::PositionOnlyDepth, slot });
                    }
                    None => {
                        let slot = lists.depth.add_mesh(
                            mesh_id,
                            element.element,
                            element.material,
                            local_to_world,
                            DrawPolicy::depth_for(&element),
                        );
                        slots.push(MeshSlot { dpg: element.dpg, kind: ListKind::Depth, slot });
                    }
                }
            }

            let slot = lists.base_pass.add_mesh(
                mesh_id,
                element.element,
                element.material,
                local_to_world,
                DrawPolicy::base_pass_for(&element),
            );
            slots.push(MeshSlot { dpg: element.dpg, kind: ListKind::BasePass, slot });
            self.mesh_slots.insert(mesh_id, slots);
        }
    }

    fn detach_draw_list_entries(&mut self, mesh_id: StaticMeshId) {
        let Some(slots) = self.mesh_slots.remove(&mesh_id) else {
            return;
        };
        for entry in slots {
            self.draw_lists[entry.dpg.index()].list_mut(entry.kind).remove_mesh(entry.slot);
        }
    }

    /// Re-register a moved primitive's meshes so the lists carry its current
    /// transform.
    fn refresh_draw_list_transforms(&mut self, id: PrimitiveId) {
        let Some(info) = self.scene.primitive(id) else {
            return;
        };
        for mesh_id in info.static_meshes.clone() {
            self.detach_draw_list_entries(mesh_id);
        }
        self.attach_draw_list_entries(id);
    }

    /// Run one full frame for a set of views sharing the scene.
    ///
    /// `view_states` pairs one persistent [`ViewState`] per entry in
    /// `view_inits`, in order.
    pub fn render_frame(
        &mut self,
        view_inits: Vec<ViewInit>,
        view_states: &mut [ViewState],
        sink: &mut dyn CommandSink,
        time: f32,
    ) -> Vec<View> {
        assert_eq!(
            view_inits.len(),
            view_states.len(),
            "every view needs its persistent state"
        );
        self.frame_index += 1;
        self.sync_scene();
        self.query_pool.begin_frame();

        let mut views: Vec<View> = view_inits.into_iter().map(View::new).collect();
        for (view, state) in views.iter_mut().zip(view_states.iter_mut()) {
            view.allocate_bitsets(&self.scene);
            determine_visibility(
                &mut self.scene,
                view,
                state,
                &self.settings,
                sink,
                &mut self.query_pool,
                time,
            );
            cull_lights(&self.scene, view);
            self.mark_velocity_meshes(view);
        }

        let shadows = gather_shadows(&mut self.scene, &mut views, &self.settings, time);

        for (view, state) in views.iter_mut().zip(view_states.iter_mut()) {
            self.render_view(view, state, &shadows, sink);
            view.advance_to(FrameStage::Rendered);
        }

        self.present(sink);
        for view in views.iter_mut() {
            view.advance_to(FrameStage::Finalized);
        }
        self.motion_table.clear();
        views
    }

    /// Flag world-DPG static meshes of moved, movable primitives for the
    /// velocity pass.
    fn mark_velocity_meshes(&mut self, view: &mut View) {
        let threshold = self.settings.render.min_screen_radius_for_velocity;
        for &id in self.motion_table.keys() {
            if !view.primitive_visibility.get(id.index()) {
                continue;
            }
            let Some(info) = self.scene.primitive(id) else {
                continue;
            };
            if info.flags.static_shadowing {
                continue;
            }
            if !view.passes_screen_size(&info.bounds, threshold) {
                continue;
            }
            for &mesh_id in &info.static_meshes {
                let record = self.scene.static_mesh(mesh_id).unwrap();
                if record.element.dpg == DepthPriorityGroup::World {
                    view.velocity_visibility.set(mesh_id.index());
                }
            }
        }
    }

    fn present(&mut self, sink: &mut dyn CommandSink) {
        if let Some(presentation) = self.targets.get(RenderTargetKind::Presentation) {
            sink.present(presentation);
        }
    }

    /// Device reset: drop every cached device-side object; surfaces and
    /// light state rebuild lazily.
    pub fn handle_device_reset(&mut self) {
        self.targets.device_reset();
        self.scene.invalidate_cached_light_state();
    }
}
