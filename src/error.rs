//! Error types for configuration, shader compilation and GPU resources.

use std::path::PathBuf;
use thiserror::Error;

/// Shader stage a diagnostic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Vertex,
    Fragment,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Vertex => f.write_str("vertex"),
            Stage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Invalid values supplied on the command line or in a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("output size must be non-zero, got {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("failed to read shader {path:?}: {source}")]
    ShaderRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read config file {path:?}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}: {source}")]
    FileParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to load overlay image {path:?}: {source}")]
    Overlay {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("source `{0}` is not available in this build")]
    UnsupportedSource(String),
}

/// Shader text that failed to compile or link. Always fatal.
#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("shader compile error in {shader} ({stage} stage):\n{log}")]
    Compile {
        shader: String,
        stage: Stage,
        log: String,
    },

    #[error("shader link error in {shader}:\n{log}")]
    Link { shader: String, log: String },
}

/// GPU resource allocation failures.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("{what} size {width}x{height} is outside the device limit of 1..={max}")]
    InvalidSize {
        what: &'static str,
        width: u32,
        height: u32,
        max: u32,
    },

    #[error("pool of {pool} targets cannot serve {stages} stages without reading and writing one target in the same stage")]
    TargetAliasing { pool: usize, stages: usize },

    #[error("render target {index} is incomplete: {reason}")]
    Incomplete { index: usize, reason: String },

    #[error("{what} is {actual:?} but the pipeline holds {expected:?}")]
    SizeMismatch {
        what: &'static str,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("no source image has been uploaded yet")]
    NoBaseTexture,
}

/// Failures while building or resizing the pass pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Shader(#[from] ShaderError),

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

/// A capture backend could not produce a frame. Recoverable: the frame
/// source falls back instead of propagating it.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device unavailable: {0}")]
    Unavailable(String),

    #[error("failed to grab frame: {0}")]
    Grab(String),

    #[error("no new frame ready yet")]
    NotReady,

    #[error("captured {width}x{height} frame does not match its buffer")]
    Malformed { width: u32, height: u32 },
}
