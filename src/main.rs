//! Shaderglass: live GPU shader passes over the screen, a camera or a test pattern.

use anyhow::Result;
use clap::Parser;
use shaderglass::config::{FileConfig, Overrides, RenderConfig, SourceKind};
use shaderglass::gpu::{AuxiliaryImages, BaseTexture, FrameContext, GpuContext, PipelineRenderer};
use shaderglass::output::WindowSurface;
use shaderglass::shader::{CompiledShader, ShaderCompiler};
use shaderglass::source::{FrameSource, PatternSource, SourceProvider, SourceUpdate};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{WindowAttributes, WindowId};

/// Run a live image through a chain of GLSL passes and show it in a window.
#[derive(Parser, Debug)]
#[command(name = "shaderglass")]
#[command(about = "Apply chained GPU fragment shaders to a live image in real-time")]
struct Args {
    /// GLSL pass file; repeat to chain passes in order
    #[arg(short, long)]
    shader: Vec<PathBuf>,

    /// Output width [default: 1280]
    #[arg(long)]
    width: Option<u32>,

    /// Output height [default: 720]
    #[arg(long)]
    height: Option<u32>,

    /// Opacity in [0, 1] handed to passes as the WindowOpacity uniform; passes
    /// that do not read it are drawn unchanged [default: 0.8]
    #[arg(long, allow_negative_numbers = true)]
    opacity: Option<f32>,

    /// Input source; screen and camera show the test pattern while unavailable [default: screen]
    #[arg(long, value_enum)]
    source: Option<SourceKind>,

    /// Camera device index for `--source camera`
    #[arg(short, long)]
    device: Option<u32>,

    /// Image bound as OverlayTexture
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Bind generated noise as NoiseTexture
    #[arg(long)]
    noise: bool,

    /// Seed for the generated noise
    #[arg(long)]
    noise_seed: Option<u64>,

    /// YAML file with defaults for any of the options above
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// List available cameras and exit
    #[cfg(feature = "camera")]
    #[arg(long)]
    list_devices: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            shaders: self.shader.clone(),
            width: self.width,
            height: self.height,
            opacity: self.opacity,
            source: self.source,
            device: self.device,
            overlay: self.overlay.clone(),
            noise: self.noise,
            noise_seed: self.noise_seed,
        }
    }
}

/// GPU state that exists once the window does.
struct RenderState {
    context: GpuContext,
    surface: WindowSurface,
    base: BaseTexture,
    renderer: PipelineRenderer,
}

/// Application state for the event loop.
struct ShaderglassApp {
    config: RenderConfig,
    shaders: Vec<CompiledShader>,
    images: AuxiliaryImages,
    source: FrameSource,
    quit: Arc<AtomicBool>,
    state: Option<RenderState>,
    pending_resize: Option<PhysicalSize<u32>>,
    fatal: Option<anyhow::Error>,
    start_time: Instant,
    frame_count: u64,
    fps_frames: u32,
    fps_last_time: Instant,
}

impl ShaderglassApp {
    fn new(
        config: RenderConfig,
        shaders: Vec<CompiledShader>,
        images: AuxiliaryImages,
        source: FrameSource,
        quit: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            shaders,
            images,
            source,
            quit,
            state: None,
            pending_resize: None,
            fatal: None,
            start_time: Instant::now(),
            frame_count: 0,
            fps_frames: 0,
            fps_last_time: Instant::now(),
        }
    }

    fn initialize(&mut self, event_loop: &ActiveEventLoop) -> Result<RenderState> {
        let window_attrs = WindowAttributes::default()
            .with_title("Shaderglass")
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height))
            .with_transparent(true)
            .with_resizable(true);
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let (context, surface) = GpuContext::for_window(window.clone())?;
        let surface = WindowSurface::new(&context, surface, window)?;
        let renderer = PipelineRenderer::new(
            &context.device,
            &context.queue,
            &self.shaders,
            surface.format(),
            surface.size(),
            &self.images,
        )?;
        let base = BaseTexture::new(context.device.clone(), context.queue.clone());
        info!("Window created at {}x{}", surface.size().0, surface.size().1);

        Ok(RenderState {
            context,
            surface,
            base,
            renderer,
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{:#}", err);
        self.fatal = Some(err);
        event_loop.exit();
    }

    /// Applies a queued resize. Runs only between frames.
    fn apply_resize(&mut self) -> Result<()> {
        let (Some(size), Some(state)) = (self.pending_resize.take(), self.state.as_mut()) else {
            return Ok(());
        };
        if size.width == 0 || size.height == 0 {
            debug!("Ignoring zero-sized resize");
            return Ok(());
        }
        state.renderer.resize(size.width, size.height)?;
        state.surface.resize(&state.context.device, size);
        Ok(())
    }

    fn render_frame(&mut self) -> Result<()> {
        self.apply_resize()?;
        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };

        let uploaded = match self.source.acquire() {
            SourceUpdate::Upload { frame, origin } => {
                let kind = state.base.upload(frame)?;
                debug!("Uploaded {:?} frame {}x{} ({:?})", origin, frame.width, frame.height, kind);
                true
            }
            SourceUpdate::Keep => false,
        };
        // A freshly created base texture starts empty even when the source
        // considers its image already shown.
        if !uploaded && state.base.size().is_none() {
            if let Some(frame) = self.source.current() {
                state.base.upload(frame)?;
            }
        }

        let Some(output) = state.surface.acquire(&state.context.device)? else {
            return Ok(());
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let source_size = state.base.size().unwrap_or(state.renderer.output_size());
        let frame = FrameContext {
            output: state.renderer.output_size(),
            source: source_size,
            frame_count: self.frame_count,
            time: self.start_time.elapsed().as_secs_f32(),
            opacity: self.config.opacity,
        };
        state.renderer.render(&state.base, &view, &frame)?;
        state.surface.window().pre_present_notify();
        output.present();

        self.frame_count += 1;
        self.fps_frames += 1;
        let elapsed = self.fps_last_time.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let fps = self.fps_frames as f32 / elapsed.as_secs_f32();
            let (w, h) = frame.output;
            debug!(
                "[Perf] Rendering at {:.2} FPS (Resolution: {}x{}, source: {:?})",
                fps,
                w,
                h,
                self.source.showing()
            );
            self.fps_frames = 0;
            self.fps_last_time = Instant::now();
        }
        Ok(())
    }
}

impl ApplicationHandler for ShaderglassApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        match self.initialize(event_loop) {
            Ok(state) => self.state = Some(state),
            Err(e) => self.fail(event_loop, e.context("Initialization failed")),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Window closed");
                event_loop.exit();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                info!("Escape pressed, exiting");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                self.pending_resize = Some(size);
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render_frame() {
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.quit.load(Ordering::SeqCst) {
            info!("Received interrupt signal, shutting down...");
            event_loop.exit();
            return;
        }
        if let Some(state) = &self.state {
            state.surface.window().request_redraw();
        }
    }
}

/// Builds the frame source for the configured input.
fn open_source(config: &RenderConfig) -> Result<FrameSource> {
    let pattern = PatternSource::gradient(config.width, config.height);
    let capture = match config.source {
        SourceKind::Pattern => None,
        SourceKind::Screen => open_screen(),
        SourceKind::Camera => open_camera(config)?,
    };
    Ok(FrameSource::new(capture, pattern))
}

#[cfg(all(feature = "screen", unix, not(target_os = "macos")))]
fn open_screen() -> Option<Box<dyn SourceProvider>> {
    use shaderglass::source::{CaptureSource, X11Screen};
    info!("Opening X11 screen capture...");
    match X11Screen::open() {
        Ok(screen) => Some(Box::new(CaptureSource::new(screen)) as Box<dyn SourceProvider>),
        Err(e) => {
            warn!("{}; showing the test pattern instead", e);
            None
        }
    }
}

#[cfg(not(all(feature = "screen", unix, not(target_os = "macos"))))]
fn open_screen() -> Option<Box<dyn SourceProvider>> {
    warn!("Screen capture is not available in this build; showing the test pattern instead");
    None
}

#[cfg(feature = "camera")]
fn open_camera(config: &RenderConfig) -> Result<Option<Box<dyn SourceProvider>>> {
    use shaderglass::source::{CaptureConfig, CaptureSource, NokhwaCapture};
    let capture_config = CaptureConfig {
        device_index: config.device,
        width: config.width,
        height: config.height,
        ..Default::default()
    };
    info!("Opening camera device {}...", config.device);
    match NokhwaCapture::open_threaded(&capture_config) {
        Ok(camera) => Ok(Some(Box::new(CaptureSource::new(camera)) as Box<dyn SourceProvider>)),
        Err(e) => {
            warn!("{}; showing the test pattern instead", e);
            Ok(None)
        }
    }
}

#[cfg(not(feature = "camera"))]
fn open_camera(_config: &RenderConfig) -> Result<Option<Box<dyn SourceProvider>>> {
    Err(shaderglass::error::ConfigError::UnsupportedSource("camera (rebuild with --features camera)".to_string()).into())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    #[cfg(feature = "camera")]
    if args.list_devices {
        println!("Available cameras:");
        for device in shaderglass::source::NokhwaCapture::list_devices()? {
            println!("  [{}] {}", device.index, device.name);
        }
        return Ok(());
    }

    let file = args.config.as_deref().map(FileConfig::load).transpose()?;
    let config = RenderConfig::resolve(args.overrides(), file)?;
    info!("Starting Shaderglass...");

    let shaders = ShaderCompiler::new().compile_pipeline(&config.load_shaders()?)?;
    let images = config.auxiliary_images()?;
    let source = open_source(&config)?;

    let quit = Arc::new(AtomicBool::new(false));
    let q = quit.clone();
    ctrlc::set_handler(move || q.store(true, Ordering::SeqCst))?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = ShaderglassApp::new(config, shaders, images, source, quit);
    event_loop.run_app(&mut app)?;

    if let Some(err) = app.fatal {
        return Err(err);
    }
    info!("Shaderglass stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn help_explains_where_opacity_applies() {
        let help = Args::command().render_long_help().to_string();
        assert!(help.contains("WindowOpacity"));
        assert!(help.contains("drawn unchanged"));
    }

    #[test]
    fn pattern_source_needs_no_device() {
        let config = RenderConfig {
            width: 8,
            height: 4,
            source: SourceKind::Pattern,
            ..Default::default()
        };
        let mut source = open_source(&config).unwrap();
        assert!(matches!(source.acquire(), SourceUpdate::Upload { frame, .. } if frame.size() == (8, 4)));
    }
}
