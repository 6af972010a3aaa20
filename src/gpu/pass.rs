//! One compiled pass turned into a GPU program.

use crate::frame::QuadVertex;
use crate::shader::{CompiledShader, PassUniforms, UniformTable};
use std::borrow::Cow;

/// GLSL entry points come out of naga named `main`.
const FRAGMENT_ENTRY_POINT: &str = "main";

/// Smallest uniform buffer handed to the device; passes without value
/// uniforms still get something to bind at the parameter slot.
const MIN_PARAMS_SIZE: u64 = 16;

pub struct ShaderPass {
    pub name: String,
    pub pipeline: wgpu::RenderPipeline,
    pub uniforms: UniformTable,
    params: wgpu::Buffer,
}

impl ShaderPass {
    pub fn new(
        device: &wgpu::Device,
        index: usize,
        shader: &CompiledShader,
        layout: &wgpu::PipelineLayout,
        vertex_module: &wgpu::ShaderModule,
        target_format: wgpu::TextureFormat,
    ) -> Self {
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("Fragment Shader {}", index)),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(&shader.fragment_wgsl)),
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&format!("Render Pipeline {} ({})", index, shader.name)),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: vertex_module,
                entry_point: Some("vs_main"),
                buffers: &[QuadVertex::layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some(FRAGMENT_ENTRY_POINT),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("Pass Parameters {}", index)),
            size: (shader.uniforms.block_size() as u64).max(MIN_PARAMS_SIZE),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            name: shader.name.clone(),
            pipeline,
            uniforms: shader.uniforms.clone(),
            params,
        }
    }

    /// Uploads this frame's values for every block uniform the pass declared.
    pub fn write_params(&self, queue: &wgpu::Queue, values: &PassUniforms) {
        if self.uniforms.block_size() == 0 {
            return;
        }
        queue.write_buffer(&self.params, 0, &self.uniforms.encode(values));
    }

    pub fn params(&self) -> &wgpu::Buffer {
        &self.params
    }
}
