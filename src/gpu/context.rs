//! Shared GPU context for wgpu resources.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use winit::window::Window;

/// Device and queue used by every GPU component.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
}

impl GpuContext {
    /// Initializes a context for offscreen use.
    pub fn headless() -> Result<Self> {
        let instance = Self::instance();
        Self::with_surface(instance, None)
    }

    /// Initializes a context compatible with `window` and returns the
    /// surface it will present to.
    pub fn for_window(window: Arc<Window>) -> Result<(Self, wgpu::Surface<'static>)> {
        let instance = Self::instance();
        let surface = instance.create_surface(window)?;
        let context = Self::with_surface(instance, Some(&surface))?;
        Ok((context, surface))
    }

    fn instance() -> wgpu::Instance {
        wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        })
    }

    fn with_surface(instance: wgpu::Instance, surface: Option<&wgpu::Surface<'static>>) -> Result<Self> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface,
            force_fallback_adapter: false,
        }))
        .map_err(|e| anyhow!("Failed to obtain GPU adapter: {:?}", e))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Shaderglass Device"),
            required_features: wgpu::Features::empty(),
            required_limits: if surface.is_some() {
                wgpu::Limits::default()
            } else {
                wgpu::Limits::downlevel_defaults()
            },
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        }))?;

        tracing::info!("Using GPU adapter {}", adapter.get_info().name);
        Ok(Self {
            device,
            queue,
            instance,
            adapter,
        })
    }
}
