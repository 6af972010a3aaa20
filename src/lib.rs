//! Shaderglass: live image through a chain of GPU fragment-shader passes
//!
//! Grabs a frame from a capture source (or a synthetic pattern), runs it
//! through every configured GLSL pass on the GPU, and presents the result.

pub mod config;
pub mod error;
pub mod frame;
pub mod gpu;
pub mod output;
pub mod shader;
pub mod source;
