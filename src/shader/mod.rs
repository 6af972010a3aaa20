//! Shader pass compilation.

pub mod builtin;
mod compiler;
pub mod preprocess;
pub mod uniforms;

pub use compiler::{CompiledShader, ShaderCompiler};
pub use uniforms::{PassUniforms, UniformName, UniformSlot, UniformTable, UniformType};

use crate::error::ConfigError;
use std::path::Path;

/// GLSL pass text plus a name used in diagnostics.
#[derive(Debug, Clone)]
pub struct ShaderSource {
    pub name: String,
    pub code: String,
}

impl ShaderSource {
    pub fn builtin(name: &str, code: &str) -> Self {
        Self {
            name: format!("<builtin:{name}>"),
            code: code.to_string(),
        }
    }

    /// Reads a pass from disk.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let code = std::fs::read_to_string(path).map_err(|source| ConfigError::ShaderRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            name: path.display().to_string(),
            code,
        })
    }
}
