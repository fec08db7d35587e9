//! The persistent scene: sparse primitive/light arrays, the spatial
//! octrees, interactions, and shadow groups.

use glam::Mat4;
use rustc_hash::FxHashMap;

use vega_math::BoxSphereBounds;
use vega_octree::Octree;

use crate::interactions::{InteractionArena, InteractionId, LightPrimitiveInteraction};
use crate::light::{LightId, LightSceneInfo};
use crate::primitive::{PrimitiveFlags, PrimitiveSceneInfo};
use crate::proxy::{PrimitiveDescriptor, PrimitiveProxy, StaticElementCollector};
use crate::types::{PrimitiveId, StaticMeshElement, StaticMeshId};

/// A shadow parent and the children merged into its shadow.
#[derive(Debug, Clone, Default)]
pub struct ShadowGroup {
    pub children: Vec<PrimitiveId>,
}

/// One registered static mesh element and the primitive it belongs to.
pub struct StaticMeshRecord {
    pub primitive: PrimitiveId,
    pub element: StaticMeshElement,
}

/// Render-thread-owned scene state.
///
/// Primitive and light ids are stable indices into the sparse arrays for the
/// object's attached lifetime. Structural mutations arrive through the
/// command channel and are applied here strictly in enqueue order.
pub struct Scene {
    primitives: Vec<Option<PrimitiveSceneInfo>>,
    lights: Vec<Option<LightSceneInfo>>,
    static_meshes: Vec<Option<StaticMeshRecord>>,
    static_mesh_free: Vec<u32>,
    pub primitive_octree: Octree<PrimitiveId>,
    pub light_octree: Octree<LightId>,
    pub interactions: InteractionArena,
    /// Keyed by shadow parent; children never appear as keys.
    pub shadow_groups: FxHashMap<PrimitiveId, ShadowGroup>,
}

impl Scene {
    /// Create a scene whose octrees span a cube of half-size `extent`.
    pub fn new(extent: f32) -> Self {
        Self {
            primitives: Vec::new(),
            lights: Vec::new(),
            static_meshes: Vec::new(),
            static_mesh_free: Vec::new(),
            primitive_octree: Octree::new(glam::Vec3::ZERO, extent),
            light_octree: Octree::new(glam::Vec3::ZERO, extent),
            interactions: InteractionArena::new(),
            shadow_groups: FxHashMap::default(),
        }
    }

    /// One past the highest primitive index ever used; bitsets are sized to
    /// this.
    pub fn primitive_capacity(&self) -> usize {
        self.primitives.len()
    }

    pub fn light_capacity(&self) -> usize {
        self.lights.len()
    }

    pub fn static_mesh_capacity(&self) -> usize {
        self.static_meshes.len()
    }

    pub fn primitive(&self, id: PrimitiveId) -> Option<&PrimitiveSceneInfo> {
        self.primitives.get(id.index()).and_then(|p| p.as_ref())
    }

    pub fn primitive_mut(&mut self, id: PrimitiveId) -> Option<&mut PrimitiveSceneInfo> {
        self.primitives.get_mut(id.index()).and_then(|p| p.as_mut())
    }

    pub fn light(&self, id: LightId) -> Option<&LightSceneInfo> {
        self.lights.get(id.index()).and_then(|l| l.as_ref())
    }

    pub fn light_mut(&mut self, id: LightId) -> Option<&mut LightSceneInfo> {
        self.lights.get_mut(id.index()).and_then(|l| l.as_mut())
    }

    pub fn iter_primitives(&self) -> impl Iterator<Item = &PrimitiveSceneInfo> {
        self.primitives.iter().filter_map(|p| p.as_ref())
    }

    pub fn iter_lights(&self) -> impl Iterator<Item = &LightSceneInfo> {
        self.lights.iter().filter_map(|l| l.as_ref())
    }

    pub fn static_mesh(&self, id: StaticMeshId) -> Option<&StaticMeshRecord> {
        self.static_meshes.get(id.index()).and_then(|m| m.as_ref())
    }

    // --- Primitive lifecycle ---

    /// Attach a primitive under a caller-chosen stable id.
    ///
    /// Collects the proxy's static elements, inserts the bounds into the
    /// octree, links interactions with every affecting light, and merges the
    /// primitive into its shadow parent's group if it has one.
    pub fn add_primitive(
        &mut self,
        id: PrimitiveId,
        proxy: Box<dyn PrimitiveProxy>,
        local_to_world: Mat4,
        descriptor: PrimitiveDescriptor,
    ) {
        if self.primitives.len() <= id.index() {
            self.primitives.resize_with(id.index() + 1, || None);
        }
        assert!(
            self.primitives[id.index()].is_none(),
            "primitive id {id:?} is already attached"
        );

        let mut info = PrimitiveSceneInfo::new(
            id,
            proxy,
            local_to_world,
            descriptor.flags,
            descriptor.min_draw_distance,
            descriptor.max_draw_distance,
            descriptor.shadow_parent,
        );

        let mut collector = StaticElementCollector::new();
        info.proxy.draw_static_elements(&mut collector);
        for element in collector.into_elements() {
            let mesh_id = self.register_static_mesh(id, element);
            info.static_meshes.push(mesh_id);
        }

        info.octree_id = Some(self.primitive_octree.add(id, info.bounds));

        if let Some(parent) = descriptor.shadow_parent {
            self.shadow_groups.entry(parent).or_default().children.push(id);
        }

        let bounds = info.bounds;
        let flags = info.flags;
        self.primitives[id.index()] = Some(info);
        self.link_primitive_to_lights(id, &bounds, flags);
        log::debug!("primitive {:?} attached", id);
    }

    /// Detach a primitive and drop everything hanging off it.
    pub fn remove_primitive(&mut self, id: PrimitiveId) -> PrimitiveSceneInfo {
        self.unlink_primitive_from_lights(id);

        let mut info = self.primitives[id.index()]
            .take()
            .unwrap_or_else(|| panic!("primitive id {id:?} is not attached"));

        let octree_id = info.octree_id.take().expect("attached primitive missing octree id");
        self.primitive_octree.remove(octree_id);

        for mesh_id in info.static_meshes.drain(..) {
            self.static_meshes[mesh_id.index()] = None;
            self.static_mesh_free.push(mesh_id.0);
        }

        if let Some(parent) = info.shadow_parent {
            if let Some(group) = self.shadow_groups.get_mut(&parent) {
                group.children.retain(|&child| child != id);
                if group.children.is_empty() {
                    self.shadow_groups.remove(&parent);
                }
            }
        }
        // A removed shadow parent releases its children to cast their own
        // shadows again.
        if let Some(group) = self.shadow_groups.remove(&id) {
            for child in group.children {
                if let Some(child_info) = self.primitive_mut(child) {
                    child_info.shadow_parent = None;
                }
            }
        }

        log::debug!("primitive {:?} detached", id);
        info
    }

    /// Apply a transform update: new bounds, octree re-insertion
    /// (remove-then-add, never in place), and interaction rebuild.
    ///
    /// Returns the previous local-to-world so the caller can record motion
    /// for the velocity pass.
    pub fn update_primitive_transform(
        &mut self,
        id: PrimitiveId,
        local_to_world: Mat4,
        bounds: BoxSphereBounds,
    ) -> Mat4 {
        self.unlink_primitive_from_lights(id);

        let (previous, octree_id, flags) = {
            let info = self.primitives[id.index()]
                .as_mut()
                .unwrap_or_else(|| panic!("primitive id {id:?} is not attached"));
            let previous = info.local_to_world;
            info.local_to_world = local_to_world;
            info.bounds = bounds;
            let octree_id = info.octree_id.take().expect("attached primitive missing octree id");
            (previous, octree_id, info.flags)
        };
        self.primitive_octree.remove(octree_id);
        let new_octree_id = self.primitive_octree.add(id, bounds);
        self.primitives[id.index()]
            .as_mut()
            .expect("primitive vanished mid-update")
            .octree_id = Some(new_octree_id);

        self.link_primitive_to_lights(id, &bounds, flags);
        previous
    }

    // --- Light lifecycle ---

    pub fn add_light(&mut self, mut light: LightSceneInfo) {
        let id = light.id;
        if self.lights.len() <= id.index() {
            self.lights.resize_with(id.index() + 1, || None);
        }
        assert!(
            self.lights[id.index()].is_none(),
            "light id {id:?} is already attached"
        );

        if let Some(sphere) = light.bounding_sphere() {
            let bounds = BoxSphereBounds::new(
                sphere.center,
                glam::Vec3::splat(sphere.radius),
                sphere.radius,
            );
            light.octree_id = Some(self.light_octree.add(id, bounds));
        }
        self.lights[id.index()] = Some(light);
        self.link_light_to_primitives(id);
        log::debug!("light {:?} attached", id);
    }

    pub fn remove_light(&mut self, id: LightId) -> LightSceneInfo {
        self.unlink_light_from_primitives(id);
        let mut light = self.lights[id.index()]
            .take()
            .unwrap_or_else(|| panic!("light id {id:?} is not attached"));
        if let Some(octree_id) = light.octree_id.take() {
            self.light_octree.remove(octree_id);
        }
        log::debug!("light {:?} detached", id);
        light
    }

    /// Replace a light's shape/position and rebuild its interactions.
    pub fn update_light_transform(&mut self, id: LightId, kind: crate::light::LightKind) {
        self.unlink_light_from_primitives(id);
        {
            let light = self.lights[id.index()]
                .as_mut()
                .unwrap_or_else(|| panic!("light id {id:?} is not attached"));
            light.kind = kind;
            light.invalidate_cached_state();
            if let Some(octree_id) = light.octree_id.take() {
                self.light_octree.remove(octree_id);
            }
        }
        let sphere = self.lights[id.index()].as_ref().unwrap().bounding_sphere();
        if let Some(sphere) = sphere {
            let bounds = BoxSphereBounds::new(
                sphere.center,
                glam::Vec3::splat(sphere.radius),
                sphere.radius,
            );
            let octree_id = self.light_octree.add(id, bounds);
            self.lights[id.index()].as_mut().unwrap().octree_id = Some(octree_id);
        }
        self.link_light_to_primitives(id);
    }

    pub fn update_light_color(&mut self, id: LightId, color: glam::Vec3) {
        let light = self.lights[id.index()]
            .as_mut()
            .unwrap_or_else(|| panic!("light id {id:?} is not attached"));
        light.color = color;
        light.invalidate_cached_state();
    }

    /// Device reset: every light's cached device state is gone.
    pub fn invalidate_cached_light_state(&mut self) {
        for light in self.lights.iter_mut().filter_map(|l| l.as_mut()) {
            light.invalidate_cached_state();
        }
    }

    // --- Queries ---

    /// Lights currently affecting a primitive, via its interaction list.
    pub fn relevant_lights(&self, id: PrimitiveId) -> Vec<LightId> {
        let Some(info) = self.primitive(id) else {
            return Vec::new();
        };
        self.interactions
            .iter_primitive_list(info.interaction_head)
            .map(|(_, interaction)| interaction.light)
            .collect()
    }

    /// Combined bounds of a shadow parent and its grouped children.
    pub fn shadow_group_bounds(&self, parent: PrimitiveId) -> Option<BoxSphereBounds> {
        let parent_info = self.primitive(parent)?;
        let mut bounds = parent_info.bounds;
        if let Some(group) = self.shadow_groups.get(&parent) {
            for &child in &group.children {
                if let Some(child_info) = self.primitive(child) {
                    bounds = bounds.union(&child_info.bounds);
                }
            }
        }
        Some(bounds)
    }

    // --- Internal wiring ---

    fn register_static_mesh(&mut self, primitive: PrimitiveId, element: StaticMeshElement) -> StaticMeshId {
        let record = StaticMeshRecord { primitive, element };
        match self.static_mesh_free.pop() {
            Some(index) => {
                self.static_meshes[index as usize] = Some(record);
                StaticMeshId(index)
            }
            None => {
                self.static_meshes.push(Some(record));
                StaticMeshId((self.static_meshes.len() - 1) as u32)
            }
        }
    }

    fn link_primitive_to_lights(
        &mut self,
        id: PrimitiveId,
        bounds: &BoxSphereBounds,
        flags: PrimitiveFlags,
    ) {
        if !flags.accepts_lights {
            return;
        }
        let light_ids: Vec<LightId> = self
            .lights
            .iter()
            .filter_map(|l| l.as_ref())
            .filter(|light| light.affects_bounds(bounds))
            .map(|light| light.id)
            .collect();
        for light_id in light_ids {
            self.link_one(light_id, id);
        }
    }

    fn link_light_to_primitives(&mut self, light_id: LightId) {
        let primitive_ids: Vec<PrimitiveId> = {
            let light = self.lights[light_id.index()].as_ref().unwrap();
            self.primitives
                .iter()
                .filter_map(|p| p.as_ref())
                .filter(|info| info.flags.accepts_lights && light.affects_bounds(&info.bounds))
                .map(|info| info.id)
                .collect()
        };
        for primitive_id in primitive_ids {
            self.link_one(light_id, primitive_id);
        }
    }

    fn link_one(&mut self, light_id: LightId, primitive_id: PrimitiveId) {
        let light = self.lights[light_id.index()]
            .as_mut()
            .expect("linking against a dead light");
        let info = self.primitives[primitive_id.index()]
            .as_mut()
            .expect("linking against a dead primitive");

        let uncached = info.flags.unbuilt_static_lighting;
        let on_static_list = info.flags.static_shadowing && !uncached;
        let data = LightPrimitiveInteraction {
            light: light_id,
            primitive: primitive_id,
            has_shadow: info.flags.casts_dynamic_shadow && light.casts_shadows(),
            uncached_static_lighting: uncached,
            on_static_light_list: on_static_list,
        };
        let light_head = if on_static_list {
            &mut light.static_interaction_head
        } else {
            &mut light.dynamic_interaction_head
        };
        self.interactions.link(data, light_head, &mut info.interaction_head);
    }

    fn unlink_primitive_from_lights(&mut self, id: PrimitiveId) {
        let Some(info) = self.primitives.get(id.index()).and_then(|p| p.as_ref()) else {
            return;
        };
        let edges: Vec<(InteractionId, LightId, bool)> = self
            .interactions
            .iter_primitive_list(info.interaction_head)
            .map(|(edge_id, data)| (edge_id, data.light, data.on_static_light_list))
            .collect();

        for (edge_id, light_id, on_static_list) in edges {
            let light = self.lights[light_id.index()]
                .as_mut()
                .expect("interaction references a dead light");
            let info = self.primitives[id.index()].as_mut().unwrap();
            let light_head = if on_static_list {
                &mut light.static_interaction_head
            } else {
                &mut light.dynamic_interaction_head
            };
            self.interactions.unlink(edge_id, light_head, &mut info.interaction_head);
        }
    }

    fn unlink_light_from_primitives(&mut self, id: LightId) {
        let Some(light) = self.lights.get(id.index()).and_then(|l| l.as_ref()) else {
            return;
        };
        let mut edges: Vec<(InteractionId, PrimitiveId, bool)> = Vec::new();
        for head in [light.dynamic_interaction_head, light.static_interaction_head] {
            edges.extend(
                self.interactions
                    .iter_light_list(head)
                    .map(|(edge_id, data)| (edge_id, data.primitive, data.on_static_light_list)),
            );
        }

        for (edge_id, primitive_id, on_static_list) in edges {
            let light = self.lights[id.index()].as_mut().unwrap();
            let info = self.primitives[primitive_id.index()]
                .as_mut()
                .expect("interaction references a dead primitive");
            let light_head = if on_static_list {
                &mut light.static_interaction_head
            } else {
                &mut light.dynamic_interaction_head
            };
            self.interactions.unlink(edge_id, light_head, &mut info.interaction_head);
        }
    }
}
