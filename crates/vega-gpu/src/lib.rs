//! Graphics-device boundary.
//!
//! The renderer never talks to a native graphics API. Everything it needs
//! from the device is expressed through [`CommandSink`], an ordered stream of
//! state changes, draws, resolves, and occlusion queries. The only contract
//! the sink must honor is submission order: resolve-then-read sequences
//! issued on one thread are observed in that order by the device.
//!
//! [`RecordingSink`] implements the trait by recording the stream, which is
//! how the pass pipeline is tested without a GPU.

mod queries;
mod sink;
mod targets;

pub use queries::{OcclusionQueryId, OcclusionQueryPool};
pub use sink::{
    BlendState, CommandSink, DepthState, InstanceConstants, MaterialId, MeshElementId,
    RasterizerState, RecordingSink, ShaderProgramId, SinkCommand, VertexFormatId,
};
pub use targets::{RenderTargetId, RenderTargetKind, RenderTargets};
