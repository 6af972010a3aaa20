//! Presentation through a winit window surface.

use crate::gpu::GpuContext;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};
use winit::dpi::PhysicalSize;
use winit::window::Window;

/// The window's swapchain, sized to the pipeline output.
pub struct WindowSurface {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    window: Arc<Window>,
}

impl WindowSurface {
    /// Configures `surface` at the window's current inner size.
    pub fn new(context: &GpuContext, surface: wgpu::Surface<'static>, window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&context.adapter);

        // Pass output is written as-is, so avoid an sRGB re-encode on present.
        let format = surface_caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| anyhow!("Surface reports no supported formats"))?;

        let alpha_mode = [wgpu::CompositeAlphaMode::PostMultiplied, wgpu::CompositeAlphaMode::PreMultiplied]
            .into_iter()
            .find(|mode| surface_caps.alpha_modes.contains(mode))
            .or_else(|| surface_caps.alpha_modes.first().copied())
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        if !matches!(
            alpha_mode,
            wgpu::CompositeAlphaMode::PostMultiplied | wgpu::CompositeAlphaMode::PreMultiplied
        ) {
            warn!("Surface does not support transparency ({:?}); window will be opaque", alpha_mode);
        }

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&context.device, &config);
        info!(
            "Window surface configured: {}x{} {:?} ({:?})",
            config.width, config.height, format, alpha_mode
        );

        Ok(Self {
            surface,
            config,
            window,
        })
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Reconfigures the swapchain. Zero-sized requests (minimized windows)
    /// are ignored.
    pub fn resize(&mut self, device: &wgpu::Device, new_size: PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(device, &self.config);
        }
    }

    /// Returns the next swapchain image, or `None` when this frame should be
    /// skipped. A lost or outdated surface is reconfigured before returning.
    pub fn acquire(&mut self, device: &wgpu::Device) -> Result<Option<wgpu::SurfaceTexture>> {
        match self.surface.get_current_texture() {
            Ok(frame) => Ok(Some(frame)),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                debug!("Surface lost or outdated, reconfiguring");
                self.surface.configure(device, &self.config);
                Ok(None)
            }
            Err(wgpu::SurfaceError::Timeout) => {
                debug!("Timed out waiting for the next surface image");
                Ok(None)
            }
            Err(e) => Err(anyhow!("Failed to acquire surface image: {}", e)),
        }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }
}
