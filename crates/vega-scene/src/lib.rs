//! Persistent scene state on the render thread.
//!
//! The external scene graph describes primitives and lights; this crate owns
//! their render-side records: stable-index sparse arrays, the spatial
//! octrees, the light-primitive interaction arena, and the command channel
//! structural mutations arrive through.

mod bitset;
mod channel;
mod interactions;
mod light;
mod primitive;
mod proxy;
mod scene;
mod types;

pub use bitset::Bitset;
pub use channel::{SceneChannel, SceneCommand, SceneEvent, SceneHandle};
pub use interactions::{InteractionArena, InteractionId, LightPrimitiveInteraction};
pub use light::{LightId, LightKind, LightSceneInfo, ShadowInitializer, ShadowMode};
pub use primitive::{PrimitiveFlags, PrimitiveSceneInfo};
pub use proxy::{DynamicElementCollector, PrimitiveDescriptor, PrimitiveProxy, StaticElementCollector};
pub use scene::{Scene, ShadowGroup, StaticMeshRecord};
pub use types::{
    DepthPriorityGroup, DynamicMeshElement, LightMapKind, PrimitiveId, ProgramSet, StaticMeshElement,
    StaticMeshId, ViewRelevance,
};
