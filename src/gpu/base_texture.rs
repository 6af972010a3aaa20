//! The current input image on the GPU.

use super::targets::check_size;
use crate::error::ResourceError;
use crate::frame::SourceFrame;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

static NEXT_ALLOCATION: AtomicU64 = AtomicU64::new(1);

/// Hands out ids that no other texture allocation in the process shares.
fn next_allocation_id() -> u64 {
    NEXT_ALLOCATION.fetch_add(1, Ordering::Relaxed)
}

/// What an upload did to the base texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    /// A new texture was created at the incoming size.
    Reallocated,
    /// The existing texture was overwritten in place.
    Updated,
}

/// Decides between reallocation and an in-place write.
pub fn plan_upload(current: Option<(u32, u32)>, incoming: (u32, u32)) -> UploadKind {
    if current == Some(incoming) {
        UploadKind::Updated
    } else {
        UploadKind::Reallocated
    }
}

/// Holds the source image sampled by stage 0.
pub struct BaseTexture {
    device: wgpu::Device,
    queue: wgpu::Queue,
    texture: Option<(wgpu::Texture, wgpu::TextureView)>,
    size: Option<(u32, u32)>,
    allocation: u64,
}

impl BaseTexture {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            texture: None,
            size: None,
            allocation: 0,
        }
    }

    /// Writes `frame` into the texture, replacing the texture first when the
    /// frame size differs from the current one.
    pub fn upload(&mut self, frame: &SourceFrame) -> Result<UploadKind, ResourceError> {
        let (width, height) = frame.size();
        let expected = width as usize * height as usize * 4;
        if frame.pixels.len() != expected {
            return Err(ResourceError::Incomplete {
                index: 0,
                reason: format!(
                    "source frame {}x{} carries {} bytes, expected {}",
                    width,
                    height,
                    frame.pixels.len(),
                    expected
                ),
            });
        }

        let kind = plan_upload(self.size, (width, height));
        if kind == UploadKind::Reallocated {
            check_size(&self.device, "base texture", width, height)?;
            let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Base Texture"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            match self.size {
                Some((w, h)) => info!("Base texture resized {}x{} -> {}x{}", w, h, width, height),
                None => info!("Base texture created at {}x{}", width, height),
            }
            self.texture = Some((texture, view));
            self.size = Some((width, height));
            self.allocation = next_allocation_id();
        }

        let Some((texture, _)) = &self.texture else {
            return Err(ResourceError::NoBaseTexture);
        };
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &frame.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(kind)
    }

    pub fn view(&self) -> Option<&wgpu::TextureView> {
        self.texture.as_ref().map(|(_, view)| view)
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.size
    }

    /// Identifies the current allocation. Changes on every reallocation and
    /// is never shared by two base textures, so it can key cached bind groups.
    /// Zero before the first upload.
    pub fn allocation_id(&self) -> u64 {
        self.allocation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_upload_allocates() {
        assert_eq!(plan_upload(None, (640, 480)), UploadKind::Reallocated);
    }

    #[test]
    fn capture_resolution_change_reallocates() {
        assert_eq!(plan_upload(Some((800, 600)), (1920, 1080)), UploadKind::Reallocated);
        assert_eq!(plan_upload(Some((1920, 1080)), (1080, 1920)), UploadKind::Reallocated);
    }

    #[test]
    fn unchanged_resolution_updates_in_place() {
        assert_eq!(plan_upload(Some((1920, 1080)), (1920, 1080)), UploadKind::Updated);
    }

    #[test]
    fn allocation_ids_are_never_reused() {
        let first = next_allocation_id();
        let second = next_allocation_id();
        assert_ne!(first, 0);
        assert!(second > first);
    }
}
