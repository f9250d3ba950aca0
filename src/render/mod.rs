//! Rendering side of the session
//!
//! The render loop runs on its own thread at display rate and only reads the
//! session state snapshot; it never takes the lifecycle lock.

mod backend;
mod frame;
mod render_loop;

pub use backend::{FrontFace, LogBackend, RenderBackend};
pub use frame::{FrameRenderer, FrameReport, ModelRenderer, ViewKind, ViewState};
pub use render_loop::RenderLoop;
