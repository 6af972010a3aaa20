//! Run configuration: command-line values layered over an optional YAML file.

use crate::error::ConfigError;
use crate::gpu::AuxiliaryImages;
use crate::shader::ShaderSource;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;
pub const DEFAULT_OPACITY: f32 = 0.8;
pub const DEFAULT_NOISE_SEED: u64 = 0x5eed;

/// Where input frames come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Desktop capture (X11), falling back to the gradient
    #[default]
    Screen,
    /// Synthetic gradient only
    Pattern,
    /// Live camera, falling back to the gradient
    Camera,
}

/// Contents of a `--config` file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub shaders: Vec<PathBuf>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub opacity: Option<f32>,
    pub source: Option<SourceKind>,
    pub device: Option<u32>,
    pub overlay: Option<PathBuf>,
    pub noise: Option<bool>,
    pub noise_seed: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&text, path)?;
        info!("Loaded config file {:?}", path);
        Ok(config)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        serde_yaml::from_str(text).map_err(|source| ConfigError::FileParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Values given on the command line. `None` (or an empty shader list) means
/// the option was not given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub shaders: Vec<PathBuf>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub opacity: Option<f32>,
    pub source: Option<SourceKind>,
    pub device: Option<u32>,
    pub overlay: Option<PathBuf>,
    pub noise: bool,
    pub noise_seed: Option<u64>,
}

/// Fully resolved settings handed to the renderer and the frame driver.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    /// Pass order. Empty means the built-in default pass.
    pub shaders: Vec<PathBuf>,
    pub width: u32,
    pub height: u32,
    /// Always within `[0, 1]`.
    pub opacity: f32,
    pub source: SourceKind,
    pub device: u32,
    pub overlay: Option<PathBuf>,
    pub noise: bool,
    pub noise_seed: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            shaders: Vec::new(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            opacity: DEFAULT_OPACITY,
            source: SourceKind::default(),
            device: 0,
            overlay: None,
            noise: false,
            noise_seed: DEFAULT_NOISE_SEED,
        }
    }
}

impl RenderConfig {
    /// Merges command-line values over file values over defaults.
    pub fn resolve(cli: Overrides, file: Option<FileConfig>) -> Result<Self, ConfigError> {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        let shaders = if cli.shaders.is_empty() { file.shaders } else { cli.shaders };
        let width = cli.width.or(file.width).unwrap_or(defaults.width);
        let height = cli.height.or(file.height).unwrap_or(defaults.height);
        if width == 0 || height == 0 {
            return Err(ConfigError::InvalidDimensions { width, height });
        }

        Ok(Self {
            shaders,
            width,
            height,
            opacity: clamp_opacity(cli.opacity.or(file.opacity).unwrap_or(defaults.opacity)),
            source: cli.source.or(file.source).unwrap_or(defaults.source),
            device: cli.device.or(file.device).unwrap_or(defaults.device),
            overlay: cli.overlay.or(file.overlay),
            noise: cli.noise || file.noise.unwrap_or(defaults.noise),
            noise_seed: cli.noise_seed.or(file.noise_seed).unwrap_or(defaults.noise_seed),
        })
    }

    /// Reads every configured shader in order. Any unreadable file fails the
    /// whole list.
    pub fn load_shaders(&self) -> Result<Vec<ShaderSource>, ConfigError> {
        if self.shaders.is_empty() {
            info!("No shader paths given, the built-in default pass will be used");
        }
        self.shaders
            .iter()
            .map(|path| {
                info!("Loading shader from {:?}", path);
                ShaderSource::from_file(path)
            })
            .collect()
    }

    /// Loads the overlay image and generates the noise image, if requested.
    pub fn auxiliary_images(&self) -> Result<AuxiliaryImages, ConfigError> {
        let overlay = self
            .overlay
            .as_deref()
            .map(AuxiliaryImages::load_overlay)
            .transpose()?;
        let noise = self
            .noise
            .then(|| AuxiliaryImages::generate_noise(self.width, self.height, self.noise_seed));
        Ok(AuxiliaryImages { overlay, noise })
    }
}

/// Pins opacity to `[0, 1]`. NaN becomes the default.
pub fn clamp_opacity(value: f32) -> f32 {
    if value.is_nan() {
        warn!("Opacity is not a number, using {}", DEFAULT_OPACITY);
        return DEFAULT_OPACITY;
    }
    let clamped = value.clamp(0.0, 1.0);
    if clamped != value {
        warn!("Opacity {} is outside [0, 1], clamped to {}", value, clamped);
    }
    clamped
}
