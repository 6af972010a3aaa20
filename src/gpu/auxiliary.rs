//! Extra images passes may sample besides their input.

use super::targets::check_size;
use crate::error::{ConfigError, ResourceError};
use crate::frame::SourceFrame;
use crate::shader::{UniformName, UniformTable};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use tracing::info;

/// CPU-side overlay and noise images, both optional.
#[derive(Debug, Clone, Default)]
pub struct AuxiliaryImages {
    pub overlay: Option<SourceFrame>,
    pub noise: Option<SourceFrame>,
}

impl AuxiliaryImages {
    pub fn none() -> Self {
        Self::default()
    }

    /// Decodes an image file into RGBA.
    pub fn load_overlay(path: &Path) -> Result<SourceFrame, ConfigError> {
        let image = image::open(path)
            .map_err(|source| ConfigError::Overlay {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgba8();
        let (width, height) = image.dimensions();
        info!("Loaded overlay {:?} ({}x{})", path, width, height);
        Ok(SourceFrame {
            width,
            height,
            pixels: image.into_raw(),
        })
    }

    /// Opaque random color noise. The same seed always yields the same image.
    pub fn generate_noise(width: u32, height: u32, seed: u64) -> SourceFrame {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..width as usize * height as usize {
            let [r, g, b]: [u8; 3] = rng.random();
            pixels.extend_from_slice(&[r, g, b, 255]);
        }
        SourceFrame { width, height, pixels }
    }
}

/// Auxiliary images uploaded to the GPU, plus the placeholder bound for
/// passes that do not sample them.
pub struct AuxiliaryTextures {
    overlay: Option<wgpu::TextureView>,
    noise: Option<wgpu::TextureView>,
    placeholder: wgpu::TextureView,
}

impl AuxiliaryTextures {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, images: &AuxiliaryImages) -> Result<Self, ResourceError> {
        let placeholder = upload_rgba(device, queue, "Placeholder Texture", &SourceFrame::solid(1, 1, [255; 4]))?;
        let overlay = images
            .overlay
            .as_ref()
            .map(|frame| upload_rgba(device, queue, "Overlay Texture", frame))
            .transpose()?;
        let noise = images
            .noise
            .as_ref()
            .map(|frame| upload_rgba(device, queue, "Noise Texture", frame))
            .transpose()?;
        Ok(Self {
            overlay,
            noise,
            placeholder,
        })
    }

    pub fn has(&self, name: UniformName) -> bool {
        match name {
            UniformName::Overlay => self.overlay.is_some(),
            UniformName::Noise => self.noise.is_some(),
            _ => false,
        }
    }

    /// The view to bind for `name` in a pass with the given uniform table.
    pub fn view_for(&self, name: UniformName, table: &UniformTable) -> &wgpu::TextureView {
        let loaded = match name {
            UniformName::Overlay => self.overlay.as_ref(),
            UniformName::Noise => self.noise.as_ref(),
            _ => None,
        };
        match loaded {
            Some(view) if table.contains(name) => view,
            _ => &self.placeholder,
        }
    }
}

fn upload_rgba(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    frame: &SourceFrame,
) -> Result<wgpu::TextureView, ResourceError> {
    check_size(device, "auxiliary texture", frame.width, frame.height)?;
    let size = wgpu::Extent3d {
        width: frame.width,
        height: frame.height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &frame.pixels,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(frame.width * 4),
            rows_per_image: Some(frame.height),
        },
        size,
    );
    Ok(texture.create_view(&wgpu::TextureViewDescriptor::default()))
}
