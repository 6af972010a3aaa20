use shaderglass::frame::SourceFrame;
use shaderglass::gpu::{AuxiliaryImages, BaseTexture, FrameContext, GpuContext, PipelineRenderer, UploadKind};
use shaderglass::shader::builtin::COPY_SHADER;
use shaderglass::shader::{ShaderCompiler, ShaderSource};
use shaderglass::source::{FrameSource, PatternSource, SourceProvider, SourceUpdate};
use std::collections::VecDeque;

const SIZE: u32 = 64;
const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const RED: [u8; 4] = [255, 0, 0, 255];
const GREEN: [u8; 4] = [0, 255, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];

const OVERLAY_PASS: &str = "in vec2 TEX0;\nout vec4 FragColor;\nuniform sampler2D OverlayTexture;\nvoid main() { FragColor = texture(OverlayTexture, TEX0); }\n";
const NOISE_PASS: &str = "in vec2 TEX0;\nout vec4 FragColor;\nuniform sampler2D NoiseTexture;\nvoid main() { FragColor = texture(NoiseTexture, TEX0); }\n";

fn gpu() -> Option<GpuContext> {
    match GpuContext::headless() {
        Ok(context) => Some(context),
        Err(e) => {
            eprintln!("skipping: no GPU adapter available ({e})");
            None
        }
    }
}

fn renderer_with(context: &GpuContext, passes: &[&str], images: &AuxiliaryImages) -> PipelineRenderer {
    let sources: Vec<_> = passes
        .iter()
        .enumerate()
        .map(|(i, code)| ShaderSource::builtin(&format!("pass{i}"), code))
        .collect();
    let shaders = ShaderCompiler::new().compile_pipeline(&sources).unwrap();
    PipelineRenderer::new(&context.device, &context.queue, &shaders, FORMAT, (SIZE, SIZE), images).unwrap()
}

/// An empty pass list selects the built-in default pass.
fn renderer(context: &GpuContext, passes: &[&str]) -> PipelineRenderer {
    renderer_with(context, passes, &AuxiliaryImages::none())
}

fn upload(context: &GpuContext, source: &SourceFrame) -> BaseTexture {
    let mut base = BaseTexture::new(context.device.clone(), context.queue.clone());
    assert_eq!(base.upload(source).unwrap(), UploadKind::Reallocated);
    base
}

/// Renders `base` through `renderer` into an offscreen presentation texture
/// and reads it back as tightly packed RGBA.
fn present(context: &GpuContext, renderer: &mut PipelineRenderer, base: &BaseTexture, opacity: f32) -> Vec<u8> {
    let (width, height) = renderer.output_size();
    let presentation = context.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Test Presentation"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = presentation.create_view(&wgpu::TextureViewDescriptor::default());

    let frame = FrameContext {
        output: (width, height),
        source: base.size().unwrap(),
        frame_count: 0,
        time: 0.0,
        opacity,
    };
    renderer.render(base, &view, &frame).unwrap();

    let row = width * 4;
    let padded_row = row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let readback = context.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Test Readback"),
        size: (padded_row * height) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = context
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Test Copy") });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: &presentation,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &readback,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    context.queue.submit(std::iter::once(encoder.finish()));

    let slice = readback.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| sender.send(result).unwrap());
    context
        .device
        .poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        })
        .unwrap();
    receiver.recv().unwrap().unwrap();
    let pixels = slice
        .get_mapped_range()
        .chunks_exact(padded_row as usize)
        .flat_map(|line| line[..row as usize].to_vec())
        .collect();
    readback.unmap();
    pixels
}

/// Uploads `source` into a fresh base texture and presents one frame at full opacity.
fn render_and_read(context: &GpuContext, renderer: &mut PipelineRenderer, source: &SourceFrame) -> Vec<u8> {
    let base = upload(context, source);
    present(context, renderer, &base, 1.0)
}

fn all_pixels(pixels: &[u8], rgba: [u8; 4]) -> bool {
    pixels.chunks_exact(4).all(|px| px == rgba)
}

#[test]
fn two_copy_passes_present_the_red_source() {
    let Some(context) = gpu() else { return };
    let mut renderer = renderer(&context, &[COPY_SHADER, COPY_SHADER]);
    assert_eq!(renderer.stage_count(), 2);
    assert_eq!(renderer.intermediate_targets(), 1);

    let red = SourceFrame::solid(SIZE, SIZE, RED);
    let pixels = render_and_read(&context, &mut renderer, &red);
    assert_eq!(pixels.len(), (SIZE * SIZE * 4) as usize);
    assert!(all_pixels(&pixels, RED));
}

#[test]
fn single_pass_allocates_no_intermediate_targets() {
    let Some(context) = gpu() else { return };
    let renderer = renderer(&context, &[COPY_SHADER]);
    assert_eq!(renderer.stage_count(), 1);
    assert_eq!(renderer.intermediate_targets(), 0);
    assert!(renderer.target_sizes().is_empty());
}

#[test]
fn pass_without_recognized_uniforms_still_draws() {
    let Some(context) = gpu() else { return };
    let solid_blue = "out vec4 FragColor;\nvoid main() { FragColor = vec4(0.0, 0.0, 1.0, 1.0); }\n";
    let mut renderer = renderer(&context, &[solid_blue]);

    let source = SourceFrame::solid(8, 8, [255, 255, 255, 255]);
    let pixels = render_and_read(&context, &mut renderer, &source);
    assert!(all_pixels(&pixels, BLUE));
}

#[test]
fn one_renderer_follows_a_replaced_base_texture() {
    let Some(context) = gpu() else { return };
    let mut renderer = renderer(&context, &[COPY_SHADER]);

    let red = upload(&context, &SourceFrame::solid(8, 8, RED));
    assert!(all_pixels(&present(&context, &mut renderer, &red, 1.0), RED));

    // Same size, different texture: cached bind groups must not be reused.
    let green = upload(&context, &SourceFrame::solid(8, 8, GREEN));
    assert_ne!(red.allocation_id(), green.allocation_id());
    assert!(all_pixels(&present(&context, &mut renderer, &green, 1.0), GREEN));
}

#[test]
fn capture_resolution_change_reallocates_then_updates_in_place() {
    let Some(context) = gpu() else { return };
    let mut renderer = renderer(&context, &[COPY_SHADER]);

    let mut base = upload(&context, &SourceFrame::solid(800, 600, RED));
    assert!(all_pixels(&present(&context, &mut renderer, &base, 1.0), RED));
    let first = base.allocation_id();

    assert_eq!(
        base.upload(&SourceFrame::solid(1920, 1080, GREEN)).unwrap(),
        UploadKind::Reallocated
    );
    assert_eq!(base.size(), Some((1920, 1080)));
    assert_ne!(base.allocation_id(), first);
    assert!(all_pixels(&present(&context, &mut renderer, &base, 1.0), GREEN));
    let second = base.allocation_id();

    assert_eq!(base.upload(&SourceFrame::solid(1920, 1080, BLUE)).unwrap(), UploadKind::Updated);
    assert_eq!(base.allocation_id(), second);
    assert!(all_pixels(&present(&context, &mut renderer, &base, 1.0), BLUE));
}

#[test]
fn default_pass_shades_the_source_and_fades_by_opacity() {
    let Some(context) = gpu() else { return };
    let mut renderer = renderer(&context, &[]);
    assert_eq!(renderer.stage_count(), 1);
    let base = upload(&context, &SourceFrame::solid(SIZE, SIZE, RED));

    // Alpha is 0.75 * opacity; blending over transparent black scales color by it.
    for (opacity, alpha) in [(1.0, 191), (0.5, 96)] {
        let pixels = present(&context, &mut renderer, &base, opacity);
        for px in pixels.chunks_exact(4) {
            assert!(px[3].abs_diff(alpha) <= 1, "alpha {} at opacity {}", px[3], opacity);
            assert_eq!((px[1], px[2]), (0, 0));
            assert!(px[0] > 0 && px[0] <= alpha + 1, "red {} at opacity {}", px[0], opacity);
        }
    }
}

#[test]
fn opacity_is_ignored_by_passes_that_do_not_read_it() {
    let Some(context) = gpu() else { return };
    let mut renderer = renderer(&context, &[COPY_SHADER]);
    let base = upload(&context, &SourceFrame::solid(SIZE, SIZE, RED));
    assert!(all_pixels(&present(&context, &mut renderer, &base, 0.25), RED));
}

#[test]
fn overlay_and_noise_images_reach_passes_that_declare_them() {
    let Some(context) = gpu() else { return };
    let images = AuxiliaryImages {
        overlay: Some(SourceFrame::solid(2, 2, [255, 0, 255, 255])),
        noise: Some(SourceFrame::solid(2, 2, [0, 255, 255, 255])),
    };
    let source = SourceFrame::solid(8, 8, RED);

    let mut overlay = renderer_with(&context, &[OVERLAY_PASS], &images);
    assert!(all_pixels(&render_and_read(&context, &mut overlay, &source), [255, 0, 255, 255]));

    let mut noise = renderer_with(&context, &[NOISE_PASS], &images);
    assert!(all_pixels(&render_and_read(&context, &mut noise, &source), [0, 255, 255, 255]));
}

#[test]
fn missing_overlay_samples_the_white_placeholder() {
    let Some(context) = gpu() else { return };
    let mut renderer = renderer(&context, &[OVERLAY_PASS]);
    let pixels = render_and_read(&context, &mut renderer, &SourceFrame::solid(8, 8, RED));
    assert!(all_pixels(&pixels, [255, 255, 255, 255]));
}

/// Replays a scripted sequence of grabs.
struct Scripted(VecDeque<Option<SourceFrame>>);

impl SourceProvider for Scripted {
    fn try_grab(&mut self) -> Option<SourceFrame> {
        self.0.pop_front().flatten()
    }
}

#[test]
fn failed_grab_keeps_the_last_capture_on_screen() {
    let Some(context) = gpu() else { return };
    let mut renderer = renderer(&context, &[COPY_SHADER]);
    let script = vec![
        None,
        Some(SourceFrame::solid(SIZE, SIZE, RED)),
        None,
        Some(SourceFrame::solid(SIZE, SIZE, BLUE)),
    ];
    let mut source = FrameSource::new(
        Some(Box::new(Scripted(script.into()))),
        PatternSource::gradient(SIZE, SIZE),
    );
    let mut base = BaseTexture::new(context.device.clone(), context.queue.clone());

    let mut shown = Vec::new();
    for _ in 0..4 {
        if let SourceUpdate::Upload { frame, .. } = source.acquire() {
            base.upload(frame).unwrap();
        }
        let pixels = present(&context, &mut renderer, &base, 1.0);
        shown.push([pixels[0], pixels[1], pixels[2], pixels[3]]);
    }
    // The gradient's top-left texel is pure green.
    assert_eq!(shown, vec![GREEN, RED, RED, BLUE]);
}

#[test]
fn resize_recreates_every_target_at_the_new_size() {
    let Some(context) = gpu() else { return };
    let mut renderer = renderer(&context, &[COPY_SHADER, COPY_SHADER, COPY_SHADER]);
    assert_eq!(renderer.target_sizes(), vec![(SIZE, SIZE); 2]);

    renderer.resize(96, 48).unwrap();
    assert_eq!(renderer.output_size(), (96, 48));
    assert_eq!(renderer.target_sizes(), vec![(96, 48); 2]);

    assert!(renderer.resize(0, 48).is_err());
    assert_eq!(renderer.output_size(), (96, 48));
    assert_eq!(renderer.target_sizes(), vec![(96, 48); 2]);
}

#[test]
fn mismatched_frame_output_is_rejected() {
    let Some(context) = gpu() else { return };
    let mut renderer = renderer(&context, &[COPY_SHADER]);
    let base = upload(&context, &SourceFrame::solid(4, 4, [0, 0, 0, 255]));

    let presentation = context.device.create_texture(&wgpu::TextureDescriptor {
        label: None,
        size: wgpu::Extent3d {
            width: SIZE,
            height: SIZE,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = presentation.create_view(&wgpu::TextureViewDescriptor::default());
    let frame = FrameContext {
        output: (SIZE * 2, SIZE),
        source: (4, 4),
        frame_count: 0,
        time: 0.0,
        opacity: 1.0,
    };
    assert!(renderer.render(&base, &view, &frame).is_err());
}
