//! The logic-to-render command channel.
//!
//! The logic thread owns the external scene graph and never touches the
//! `Scene` directly. Structural mutations cross to the render thread as
//! by-value commands over a single-producer single-consumer channel and are
//! applied strictly in enqueue order, at one point per frame, before
//! visibility runs. A remove enqueued after an add for the same id can
//! therefore never apply out of order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};
use glam::{Mat4, Vec3};

use vega_math::BoxSphereBounds;

use crate::light::{LightId, LightKind, LightSceneInfo, ShadowMode};
use crate::proxy::{PrimitiveDescriptor, PrimitiveProxy};
use crate::scene::Scene;
use crate::types::{PrimitiveId, StaticMeshId};

/// A structural mutation crossing the thread boundary.
pub enum SceneCommand {
    AddPrimitive {
        id: PrimitiveId,
        proxy: Box<dyn PrimitiveProxy>,
        local_to_world: Mat4,
        descriptor: PrimitiveDescriptor,
    },
    RemovePrimitive(PrimitiveId),
    UpdatePrimitiveTransform {
        id: PrimitiveId,
        local_to_world: Mat4,
        bounds: BoxSphereBounds,
    },
    AddLight(LightSceneInfo),
    RemoveLight(LightId),
    UpdateLightTransform { id: LightId, kind: LightKind },
    UpdateLightColor { id: LightId, color: Vec3 },
    /// Synchronous query; the reply channel is the rendezvous.
    RelevantLights {
        id: PrimitiveId,
        reply: Sender<Vec<LightId>>,
    },
}

/// What the drain applied, for the renderer to sync its draw lists and
/// motion table against.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    PrimitiveAdded(PrimitiveId),
    PrimitiveRemoved(PrimitiveId, Vec<StaticMeshId>),
    PrimitiveMoved { id: PrimitiveId, previous: Mat4 },
    LightAdded(LightId),
    LightRemoved(LightId),
}

/// Producer half, owned by the logic thread.
#[derive(Clone)]
pub struct SceneHandle {
    sender: Sender<SceneCommand>,
    next_primitive: Arc<AtomicU32>,
    next_light: Arc<AtomicU32>,
}

/// Consumer half, owned by the render thread.
pub struct SceneChannel {
    receiver: Receiver<SceneCommand>,
}

impl SceneChannel {
    pub fn new() -> (SceneHandle, SceneChannel) {
        let (sender, receiver) = unbounded();
        (
            SceneHandle {
                sender,
                next_primitive: Arc::new(AtomicU32::new(0)),
                next_light: Arc::new(AtomicU32::new(0)),
            },
            SceneChannel { receiver },
        )
    }

    /// Drain every pending command into the scene, in enqueue order.
    ///
    /// Called once per render-thread frame, before visibility. Returns the
    /// structural events the renderer must mirror.
    pub fn drain(&self, scene: &mut Scene) -> Vec<SceneEvent> {
        let mut events = Vec::new();
        while let Ok(command) = self.receiver.try_recv() {
            match command {
                SceneCommand::AddPrimitive {
                    id,
                    proxy,
                    local_to_world,
                    descriptor,
                } => {
                    scene.add_primitive(id, proxy, local_to_world, descriptor);
                    events.push(SceneEvent::PrimitiveAdded(id));
                }
                SceneCommand::RemovePrimitive(id) => {
                    let meshes = scene
                        .primitive(id)
                        .map(|info| info.static_meshes.clone())
                        .unwrap_or_default();
                    scene.remove_primitive(id);
                    events.push(SceneEvent::PrimitiveRemoved(id, meshes));
                }
                SceneCommand::UpdatePrimitiveTransform {
                    id,
                    local_to_world,
                    bounds,
                } => {
                    let previous = scene.update_primitive_transform(id, local_to_world, bounds);
                    events.push(SceneEvent::PrimitiveMoved { id, previous });
                }
                SceneCommand::AddLight(light) => {
                    let id = light.id;
                    scene.add_light(light);
                    events.push(SceneEvent::LightAdded(id));
                }
                SceneCommand::RemoveLight(id) => {
                    scene.remove_light(id);
                    events.push(SceneEvent::LightRemoved(id));
                }
                SceneCommand::UpdateLightTransform { id, kind } => {
                    scene.update_light_transform(id, kind);
                }
                SceneCommand::UpdateLightColor { id, color } => {
                    scene.update_light_color(id, color);
                }
                SceneCommand::RelevantLights { id, reply } => {
                    // The producer is blocked on this reply; a dropped
                    // receiver just means it gave up waiting.
                    let _ = reply.send(scene.relevant_lights(id));
                }
            }
        }
        events
    }
}

impl SceneHandle {
    /// Enqueue a primitive attach. The returned id is valid immediately for
    /// enqueuing further commands against it.
    pub fn add_primitive(
        &self,
        proxy: Box<dyn PrimitiveProxy>,
        local_to_world: Mat4,
        descriptor: PrimitiveDescriptor,
    ) -> PrimitiveId {
        let id = PrimitiveId(self.next_primitive.fetch_add(1, Ordering::Relaxed));
        self.send(SceneCommand::AddPrimitive {
            id,
            proxy,
            local_to_world,
            descriptor,
        });
        id
    }

    pub fn remove_primitive(&self, id: PrimitiveId) {
        self.send(SceneCommand::RemovePrimitive(id));
    }

    pub fn update_primitive_transform(
        &self,
        id: PrimitiveId,
        local_to_world: Mat4,
        bounds: BoxSphereBounds,
    ) {
        self.send(SceneCommand::UpdatePrimitiveTransform {
            id,
            local_to_world,
            bounds,
        });
    }

    /// Build a light record with a fresh id; the caller may adjust shadow
    /// tuning fields before attaching it with [`SceneHandle::add_light`].
    pub fn new_light(&self, kind: LightKind, color: Vec3, shadow_mode: ShadowMode) -> LightSceneInfo {
        let id = LightId(self.next_light.fetch_add(1, Ordering::Relaxed));
        LightSceneInfo::new(id, kind, color, shadow_mode)
    }

    pub fn add_light(&self, light: LightSceneInfo) -> LightId {
        let id = light.id;
        self.send(SceneCommand::AddLight(light));
        id
    }

    pub fn remove_light(&self, id: LightId) {
        self.send(SceneCommand::RemoveLight(id));
    }

    pub fn update_light_transform(&self, id: LightId, kind: LightKind) {
        self.send(SceneCommand::UpdateLightTransform { id, kind });
    }

    pub fn update_light_color(&self, id: LightId, color: Vec3) {
        self.send(SceneCommand::UpdateLightColor { id, color });
    }

    /// Synchronously query the lights affecting a primitive.
    ///
    /// Blocks until the render thread drains the queue; a deliberate, rare
    /// stall, not a steady-state pattern.
    pub fn relevant_lights(&self, id: PrimitiveId) -> Vec<LightId> {
        let (reply, response) = crossbeam_channel::bounded(1);
        self.send(SceneCommand::RelevantLights { id, reply });
        response.recv().unwrap_or_default()
    }

    fn send(&self, command: SceneCommand) {
        if self.sender.send(command).is_err() {
            log::warn!("scene command dropped, render side has shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::PrimitiveFlags;
    use crate::proxy::StaticElementCollector;
    use crate::types::ViewRelevance;

    struct TestProxy;

    impl PrimitiveProxy for TestProxy {
        fn bounds(&self) -> BoxSphereBounds {
            BoxSphereBounds::new(Vec3::ZERO, Vec3::ONE, 1.8)
        }

        fn view_relevance(&self) -> ViewRelevance {
            ViewRelevance::default()
        }

        fn draw_static_elements(&self, _collector: &mut StaticElementCollector) {}

        fn draw_dynamic_elements(
            &self,
            _collector: &mut crate::proxy::DynamicElementCollector,
            _dpg: crate::types::DepthPriorityGroup,
        ) {
        }
    }

    #[test]
    fn test_add_then_remove_applies_in_order() {
        let (handle, channel) = SceneChannel::new();
        let mut scene = Scene::new(4096.0);

        let id = handle.add_primitive(
            Box::new(TestProxy),
            Mat4::IDENTITY,
            PrimitiveDescriptor::default(),
        );
        handle.remove_primitive(id);

        let events = channel.drain(&mut scene);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], SceneEvent::PrimitiveAdded(id));
        assert!(matches!(events[1], SceneEvent::PrimitiveRemoved(removed, _) if removed == id));
        assert!(scene.primitive(id).is_none());
    }

    #[test]
    fn test_handle_allocates_distinct_ids() {
        let (handle, _channel) = SceneChannel::new();
        let a = handle.add_primitive(
            Box::new(TestProxy),
            Mat4::IDENTITY,
            PrimitiveDescriptor::default(),
        );
        let b = handle.add_primitive(
            Box::new(TestProxy),
            Mat4::IDENTITY,
            PrimitiveDescriptor::default(),
        );
        assert_ne!(a, b);
    }

    #[test]
    fn test_relevant_lights_rendezvous() {
        let (handle, channel) = SceneChannel::new();
        let mut scene = Scene::new(4096.0);

        let light = handle.new_light(
            LightKind::Point {
                position: Vec3::ZERO,
                radius: 100.0,
            },
            Vec3::ONE,
            ShadowMode::None,
        );
        let light_id = handle.add_light(light);
        let descriptor = PrimitiveDescriptor {
            flags: PrimitiveFlags::default(),
            ..Default::default()
        };
        let primitive = handle.add_primitive(Box::new(TestProxy), Mat4::IDENTITY, descriptor);

        // The producer-side query blocks on a reply, so drain from another
        // thread the way the render thread would.
        let query = std::thread::spawn({
            let handle = handle.clone();
            move || handle.relevant_lights(primitive)
        });
        // Wait for the query to land in the channel before draining.
        while channel.receiver.len() < 3 {
            std::thread::yield_now();
        }
        channel.drain(&mut scene);
        let lights = query.join().unwrap();
        assert_eq!(lights, vec![light_id]);
    }

    #[test]
    fn test_transform_update_reports_previous() {
        let (handle, channel) = SceneChannel::new();
        let mut scene = Scene::new(4096.0);
        let id = handle.add_primitive(
            Box::new(TestProxy),
            Mat4::IDENTITY,
            PrimitiveDescriptor::default(),
        );
        let moved = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
        handle.update_primitive_transform(
            id,
            moved,
            BoxSphereBounds::new(Vec3::new(5.0, 0.0, 0.0), Vec3::ONE, 1.8),
        );

        let events = channel.drain(&mut scene);
        assert!(events.contains(&SceneEvent::PrimitiveMoved {
            id,
            previous: Mat4::IDENTITY,
        }));
        assert_eq!(scene.primitive(id).unwrap().local_to_world, moved);
    }
}
