//! Presentation of the final pass.

mod window;

pub use window::WindowSurface;
