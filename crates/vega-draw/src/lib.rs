//! Drawing policies and static draw lists.
//!
//! A drawing policy is the batching key for one pass: which shader program,
//! vertex declaration, and material identity draw a mesh. Policies compare
//! and order so draw lists can bind shared state once per group and keep
//! state changes cheap-outermost.

mod draw_list;
mod policy;

pub use draw_list::{DrawListSlot, StaticDrawList};
pub use policy::{DEFAULT_MATERIAL, DrawPolicy, Pass, fallback_program};
