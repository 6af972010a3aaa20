//! Threads the base image through every pass and onto the presentation view.

use super::auxiliary::{AuxiliaryImages, AuxiliaryTextures};
use super::base_texture::BaseTexture;
use super::pass::ShaderPass;
use super::targets::{check_size, RenderTargetPool, WgpuTargetFactory};
use crate::error::{PipelineError, ResourceError};
use crate::frame::QuadVertex;
use crate::shader::builtin::VERTEX_SHADER;
use crate::shader::uniforms::{
    INPUT_TEXTURE_BINDING, NOISE_TEXTURE_BINDING, OVERLAY_TEXTURE_BINDING, PARAMS_BINDING, SAMPLER_BINDING,
};
use crate::shader::{CompiledShader, PassUniforms, ShaderCompiler, UniformName};
use std::borrow::Cow;
use tracing::{debug, info, warn};
use wgpu::util::DeviceExt;

/// Per-frame values shared by every stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    pub output: (u32, u32),
    pub source: (u32, u32),
    pub frame_count: u64,
    pub time: f32,
    pub opacity: f32,
}

/// Texture a stage samples as `Texture`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageInput {
    Base,
    Target(usize),
}

/// Where a stage draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutput {
    Target(usize),
    Presentation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePlan {
    pub index: usize,
    pub input: StageInput,
    pub output: StageOutput,
    /// Size of the image read by this stage.
    pub input_size: (u32, u32),
}

impl StagePlan {
    pub fn uniforms(&self, frame: &FrameContext) -> PassUniforms {
        PassUniforms::new(self.input_size, frame.output, frame.frame_count, frame.time, frame.opacity)
    }
}

/// Offscreen targets needed by a pipeline of `stages` passes.
pub fn intermediate_target_count(stages: usize) -> usize {
    stages.saturating_sub(1)
}

/// Routes each stage's input and output through a pool of `pool` targets.
///
/// Stage `i` writes target `i % pool` unless it is the last stage, which
/// writes the presentation view. A pool too small to keep a stage from
/// reading its own output is rejected.
pub fn plan_frame(
    stages: usize,
    pool: usize,
    source: (u32, u32),
    output: (u32, u32),
) -> Result<Vec<StagePlan>, ResourceError> {
    let aliasing = || ResourceError::TargetAliasing { pool, stages };
    let mut plan = Vec::with_capacity(stages);
    let mut input = StageInput::Base;
    let mut input_size = source;

    for index in 0..stages {
        let output_slot = if index + 1 == stages {
            StageOutput::Presentation
        } else if pool == 0 {
            return Err(aliasing());
        } else {
            StageOutput::Target(index % pool)
        };
        if let (StageInput::Target(read), StageOutput::Target(write)) = (input, output_slot) {
            if read == write {
                return Err(aliasing());
            }
        }

        plan.push(StagePlan {
            index,
            input,
            output: output_slot,
            input_size,
        });

        if let StageOutput::Target(written) = output_slot {
            input = StageInput::Target(written);
        }
        input_size = output;
    }
    Ok(plan)
}

/// Owns the compiled passes, the intermediate targets and everything bound
/// alongside them.
pub struct PipelineRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    passes: Vec<ShaderPass>,
    pool: RenderTargetPool<WgpuTargetFactory>,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    vertex_buffer: wgpu::Buffer,
    auxiliary: AuxiliaryTextures,
    output: (u32, u32),
    bind_groups: Vec<wgpu::BindGroup>,
    /// Pool generation and base allocation id the bind groups were built from.
    bound_to: Option<(u64, u64)>,
}

impl PipelineRenderer {
    /// Builds one GPU program per shader and allocates the intermediate
    /// targets for `output`. With no shaders the built-in default pass is used.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        shaders: &[CompiledShader],
        presentation_format: wgpu::TextureFormat,
        output: (u32, u32),
        images: &AuxiliaryImages,
    ) -> Result<Self, PipelineError> {
        let default_pass;
        let shaders = if shaders.is_empty() {
            default_pass = ShaderCompiler::new().compile_pipeline(&[])?;
            &default_pass[..]
        } else {
            shaders
        };

        check_size(device, "output", output.0, output.1)?;
        let auxiliary = AuxiliaryTextures::new(device, queue, images)?;

        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Vertex Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(VERTEX_SHADER)),
        });

        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Pass Bind Group Layout"),
            entries: &[
                texture_entry(INPUT_TEXTURE_BINDING),
                wgpu::BindGroupLayoutEntry {
                    binding: SAMPLER_BINDING,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: PARAMS_BINDING,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                texture_entry(OVERLAY_TEXTURE_BINDING),
                texture_entry(NOISE_TEXTURE_BINDING),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Pass Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let last = shaders.len() - 1;
        let passes: Vec<ShaderPass> = shaders
            .iter()
            .enumerate()
            .map(|(i, shader)| {
                let format = if i == last {
                    presentation_format
                } else {
                    super::targets::INTERMEDIATE_FORMAT
                };
                ShaderPass::new(device, i, shader, &pipeline_layout, &vertex_module, format)
            })
            .collect();

        for pass in &passes {
            for name in [UniformName::Overlay, UniformName::Noise] {
                if pass.uniforms.contains(name) && !auxiliary.has(name) {
                    warn!(
                        "{} samples {} but none was configured; binding a white placeholder",
                        pass.name,
                        name.glsl_name()
                    );
                }
            }
        }

        let mut pool = RenderTargetPool::new(WgpuTargetFactory::new(device.clone()));
        pool.ensure(output.0, output.1, intermediate_target_count(passes.len()))?;

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Pass Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Vertex Buffer"),
            contents: bytemuck::cast_slice(QuadVertex::VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        info!(
            "Pipeline ready: {} passes, {} intermediate targets at {}x{}",
            passes.len(),
            pool.len(),
            output.0,
            output.1
        );

        Ok(Self {
            device: device.clone(),
            queue: queue.clone(),
            passes,
            pool,
            bind_group_layout,
            sampler,
            vertex_buffer,
            auxiliary,
            output,
            bind_groups: Vec::new(),
            bound_to: None,
        })
    }

    /// Reallocates every intermediate target at the new output size. On
    /// failure the previous targets and output size stay in place.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), ResourceError> {
        if self.output == (width, height) {
            return Ok(());
        }
        check_size(&self.device, "output", width, height)?;
        self.pool.ensure(width, height, intermediate_target_count(self.passes.len()))?;
        info!("Pipeline resized {}x{} -> {}x{}", self.output.0, self.output.1, width, height);
        self.output = (width, height);
        Ok(())
    }

    pub fn output_size(&self) -> (u32, u32) {
        self.output
    }

    pub fn stage_count(&self) -> usize {
        self.passes.len()
    }

    pub fn intermediate_targets(&self) -> usize {
        self.pool.len()
    }

    /// Sizes of the intermediate targets currently held.
    pub fn target_sizes(&self) -> Vec<(u32, u32)> {
        self.pool.targets().iter().map(|t| (t.width, t.height)).collect()
    }

    /// Renders one frame. The final pass draws into `presentation`, which
    /// must be a view of an `output`-sized texture in the presentation format.
    pub fn render(
        &mut self,
        base: &BaseTexture,
        presentation: &wgpu::TextureView,
        frame: &FrameContext,
    ) -> Result<wgpu::SubmissionIndex, ResourceError> {
        if frame.output != self.output {
            return Err(ResourceError::SizeMismatch {
                what: "frame output",
                expected: self.output,
                actual: frame.output,
            });
        }
        let base_size = base.size().ok_or(ResourceError::NoBaseTexture)?;
        if frame.source != base_size {
            return Err(ResourceError::SizeMismatch {
                what: "frame source",
                expected: base_size,
                actual: frame.source,
            });
        }

        let plan = plan_frame(self.passes.len(), self.pool.len(), frame.source, frame.output)?;
        self.prepare_bind_groups(base, &plan)?;

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });

        for stage in &plan {
            let pass = &self.passes[stage.index];
            pass.write_params(&self.queue, &stage.uniforms(frame));

            let target_view = match stage.output {
                StageOutput::Target(slot) => &self.pool.targets()[slot].view,
                StageOutput::Presentation => presentation,
            };

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&format!("Render Pass {}", stage.index)),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            render_pass.set_viewport(0.0, 0.0, frame.output.0 as f32, frame.output.1 as f32, 0.0, 1.0);
            render_pass.set_pipeline(&pass.pipeline);
            render_pass.set_bind_group(0, &self.bind_groups[stage.index], &[]);
            render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
            render_pass.draw(0..QuadVertex::VERTICES.len() as u32, 0..1);
        }

        Ok(self.queue.submit(std::iter::once(encoder.finish())))
    }

    /// Rebuilds the per-stage bind groups when the target set or the base
    /// texture was replaced since they were last built.
    fn prepare_bind_groups(&mut self, base: &BaseTexture, plan: &[StagePlan]) -> Result<(), ResourceError> {
        let key = (self.pool.generation(), base.allocation_id());
        if self.bound_to == Some(key) && self.bind_groups.len() == plan.len() {
            return Ok(());
        }

        let base_view = base.view().ok_or(ResourceError::NoBaseTexture)?;
        let targets = self.pool.targets();
        self.bind_groups = plan
            .iter()
            .map(|stage| {
                let pass = &self.passes[stage.index];
                let input_view = match stage.input {
                    StageInput::Base => base_view,
                    StageInput::Target(slot) => &targets[slot].view,
                };
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("Bind Group {}", stage.index)),
                    layout: &self.bind_group_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: INPUT_TEXTURE_BINDING,
                            resource: wgpu::BindingResource::TextureView(input_view),
                        },
                        wgpu::BindGroupEntry {
                            binding: SAMPLER_BINDING,
                            resource: wgpu::BindingResource::Sampler(&self.sampler),
                        },
                        wgpu::BindGroupEntry {
                            binding: PARAMS_BINDING,
                            resource: pass.params().as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: OVERLAY_TEXTURE_BINDING,
                            resource: wgpu::BindingResource::TextureView(
                                self.auxiliary.view_for(UniformName::Overlay, &pass.uniforms),
                            ),
                        },
                        wgpu::BindGroupEntry {
                            binding: NOISE_TEXTURE_BINDING,
                            resource: wgpu::BindingResource::TextureView(
                                self.auxiliary.view_for(UniformName::Noise, &pass.uniforms),
                            ),
                        },
                    ],
                })
            })
            .collect();
        self.bound_to = Some(key);
        debug!("Rebuilt {} bind groups", self.bind_groups.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intermediate_count_is_stages_minus_one() {
        assert_eq!(intermediate_target_count(1), 0);
        assert_eq!(intermediate_target_count(2), 1);
        assert_eq!(intermediate_target_count(5), 4);
    }

    #[test]
    fn single_stage_goes_straight_to_presentation() {
        let plan = plan_frame(1, 0, (320, 240), (1280, 720)).unwrap();
        assert_eq!(
            plan,
            vec![StagePlan {
                index: 0,
                input: StageInput::Base,
                output: StageOutput::Presentation,
                input_size: (320, 240),
            }]
        );
    }

    #[test]
    fn stages_chain_through_the_pool() {
        let plan = plan_frame(3, 2, (800, 600), (1024, 768)).unwrap();
        let routes: Vec<_> = plan.iter().map(|s| (s.input, s.output)).collect();
        assert_eq!(
            routes,
            vec![
                (StageInput::Base, StageOutput::Target(0)),
                (StageInput::Target(0), StageOutput::Target(1)),
                (StageInput::Target(1), StageOutput::Presentation),
            ]
        );
        assert_eq!(plan.iter().filter(|s| s.output == StageOutput::Presentation).count(), 1);
    }

    #[test]
    fn input_size_follows_output_after_stage_zero() {
        let plan = plan_frame(3, 2, (1920, 1080), (640, 360)).unwrap();
        let sizes: Vec<_> = plan.iter().map(|s| s.input_size).collect();
        assert_eq!(sizes, vec![(1920, 1080), (640, 360), (640, 360)]);
    }

    #[test]
    fn smaller_pool_reuses_targets_modulo() {
        let plan = plan_frame(4, 2, (8, 8), (8, 8)).unwrap();
        let outputs: Vec<_> = plan.iter().map(|s| s.output).collect();
        assert_eq!(
            outputs,
            vec![
                StageOutput::Target(0),
                StageOutput::Target(1),
                StageOutput::Target(0),
                StageOutput::Presentation,
            ]
        );
        assert_eq!(plan[2].input, StageInput::Target(1));
        assert_eq!(plan[3].input, StageInput::Target(0));
    }

    #[test]
    fn pool_that_would_alias_is_rejected() {
        assert!(matches!(
            plan_frame(3, 1, (8, 8), (8, 8)),
            Err(ResourceError::TargetAliasing { pool: 1, stages: 3 })
        ));
        assert!(matches!(
            plan_frame(2, 0, (8, 8), (8, 8)),
            Err(ResourceError::TargetAliasing { pool: 0, stages: 2 })
        ));
    }

    #[test]
    fn stage_uniforms_report_new_source_size() {
        let frame = FrameContext {
            output: (1280, 720),
            source: (1920, 1080),
            frame_count: 42,
            time: 1.5,
            opacity: 0.8,
        };
        let plan = plan_frame(2, 1, frame.source, frame.output).unwrap();
        let first = plan[0].uniforms(&frame);
        assert_eq!(first.input_size, [1920.0, 1080.0]);
        assert_eq!(first.texture_size, [1920.0, 1080.0]);
        assert_eq!(first.output_size, [1280.0, 720.0]);
        assert_eq!(first.frame_count, 42);
        assert_eq!(first.frame_direction, 1);
        assert_eq!(plan[1].uniforms(&frame).input_size, [1280.0, 720.0]);
    }
}
