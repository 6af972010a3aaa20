//! GPU side of the pass pipeline.

mod auxiliary;
mod base_texture;
mod context;
mod pass;
mod renderer;
mod targets;

pub use auxiliary::{AuxiliaryImages, AuxiliaryTextures};
pub use base_texture::{plan_upload, BaseTexture, UploadKind};
pub use context::GpuContext;
pub use pass::ShaderPass;
pub use renderer::{
    intermediate_target_count, plan_frame, FrameContext, PipelineRenderer, StageInput, StageOutput, StagePlan,
};
pub use targets::{RenderTarget, RenderTargetPool, TargetFactory, WgpuTargetFactory, INTERMEDIATE_FORMAT};
