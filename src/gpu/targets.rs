//! Offscreen color targets for intermediate passes.

use crate::error::ResourceError;
use tracing::info;

/// Color format of every intermediate target.
pub const INTERMEDIATE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// One offscreen color attachment. No depth or stencil.
pub struct RenderTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

/// Allocates individual targets for a [`RenderTargetPool`].
pub trait TargetFactory {
    type Target;

    fn create(&mut self, index: usize, width: u32, height: u32) -> Result<Self::Target, ResourceError>;
}

/// Creates [`RenderTarget`]s on a wgpu device.
pub struct WgpuTargetFactory {
    device: wgpu::Device,
    format: wgpu::TextureFormat,
}

impl WgpuTargetFactory {
    pub fn new(device: wgpu::Device) -> Self {
        Self {
            device,
            format: INTERMEDIATE_FORMAT,
        }
    }
}

impl TargetFactory for WgpuTargetFactory {
    type Target = RenderTarget;

    fn create(&mut self, index: usize, width: u32, height: u32) -> Result<RenderTarget, ResourceError> {
        check_size(&self.device, "render target", width, height)?;

        let required = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        let allowed = self.format.guaranteed_format_features(self.device.features()).allowed_usages;
        if !allowed.contains(required) {
            return Err(ResourceError::Incomplete {
                index,
                reason: format!("{:?} cannot be both rendered to and sampled", self.format),
            });
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("Intermediate Target {}", index)),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.format,
            usage: required | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(RenderTarget {
            texture,
            view,
            width,
            height,
        })
    }
}

/// Rejects sizes the device cannot allocate.
pub fn check_size(device: &wgpu::Device, what: &'static str, width: u32, height: u32) -> Result<(), ResourceError> {
    let max = device.limits().max_texture_dimension_2d;
    if width == 0 || height == 0 || width > max || height > max {
        return Err(ResourceError::InvalidSize {
            what,
            width,
            height,
            max,
        });
    }
    Ok(())
}

/// Holds exactly the targets the current pipeline needs, all at one size.
pub struct RenderTargetPool<F: TargetFactory> {
    factory: F,
    targets: Vec<F::Target>,
    size: Option<(u32, u32)>,
    generation: u64,
}

impl<F: TargetFactory> RenderTargetPool<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            targets: Vec::new(),
            size: None,
            generation: 0,
        }
    }

    /// Returns `count` targets of `width`x`height`, reallocating the whole set
    /// when either differs from what is held. On failure the previous set is
    /// left untouched.
    pub fn ensure(&mut self, width: u32, height: u32, count: usize) -> Result<&[F::Target], ResourceError> {
        if self.size == Some((width, height)) && self.targets.len() == count {
            return Ok(&self.targets);
        }

        let replacement = (0..count)
            .map(|index| self.factory.create(index, width, height))
            .collect::<Result<Vec<_>, _>>()?;

        info!("Allocated {} intermediate targets at {}x{}", count, width, height);
        self.targets = replacement;
        self.size = Some((width, height));
        self.generation += 1;
        Ok(&self.targets)
    }

    pub fn targets(&self) -> &[F::Target] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.size
    }

    /// Bumped every time the set is replaced; views into older sets are stale.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
