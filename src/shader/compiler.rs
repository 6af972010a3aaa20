//! GLSL pass compilation through naga.

use super::builtin::DEFAULT_SHADER;
use super::preprocess::{self, Preprocessed, MEMBER_PREFIX};
use super::uniforms::{UniformName, UniformSlot, UniformTable, PARAMS_BINDING};
use super::ShaderSource;
use crate::error::{ShaderError, Stage};
use naga::front::glsl::{Frontend, Options};
use naga::valid::{Capabilities, ModuleInfo, ValidationFlags, Validator};
use naga::{Module, ShaderStage};
use tracing::{debug, info};

/// A validated pass ready to become a GPU program.
#[derive(Debug, Clone)]
pub struct CompiledShader {
    pub name: String,
    pub fragment_wgsl: String,
    pub uniforms: UniformTable,
}

/// Turns GLSL pass text into WGSL plus a uniform slot table.
pub struct ShaderCompiler {
    frontend: Frontend,
    validator: Validator,
}

impl Default for ShaderCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderCompiler {
    pub fn new() -> Self {
        Self {
            frontend: Frontend::default(),
            validator: Validator::new(ValidationFlags::all(), Capabilities::all()),
        }
    }

    /// Compiles every configured pass in order, substituting the built-in
    /// default when `sources` is empty. The first failure aborts the lot.
    pub fn compile_pipeline(&mut self, sources: &[ShaderSource]) -> Result<Vec<CompiledShader>, ShaderError> {
        if sources.is_empty() {
            info!("No shaders configured, using the built-in default pass");
            return Ok(vec![self.compile(&ShaderSource::builtin("default", DEFAULT_SHADER))?]);
        }
        sources.iter().map(|source| self.compile(source)).collect()
    }

    pub fn compile(&mut self, source: &ShaderSource) -> Result<CompiledShader, ShaderError> {
        let compile_error = |stage, log| ShaderError::Compile {
            shader: source.name.clone(),
            stage,
            log,
        };
        let link_error = |log| ShaderError::Link {
            shader: source.name.clone(),
            log,
        };

        if preprocess::has_vertex_branch(&source.code) {
            let vertex = preprocess::preprocess(&source.code, Stage::Vertex)
                .map_err(|log| compile_error(Stage::Vertex, log))?;
            self.build(&vertex, ShaderStage::Vertex)
                .map_err(|log| compile_error(Stage::Vertex, log))?;
            debug!("{}: vertex branch validated", source.name);
        }

        let fragment = preprocess::preprocess(&source.code, Stage::Fragment)
            .map_err(|log| compile_error(Stage::Fragment, log))?;
        let (module, info) = self
            .build(&fragment, ShaderStage::Fragment)
            .map_err(|log| compile_error(Stage::Fragment, log))?;

        check_fragment_interface(&module).map_err(link_error)?;
        let uniforms = reflect_uniforms(&module, &fragment);

        let fragment_wgsl = naga::back::wgsl::write_string(&module, &info, naga::back::wgsl::WriterFlags::empty())
            .map_err(|e| link_error(format!("WGSL generation error: {e}")))?;

        info!(
            "Compiled pass {} ({} uniforms, {} byte parameter block)",
            source.name,
            uniforms.len(),
            uniforms.block_size()
        );
        Ok(CompiledShader {
            name: source.name.clone(),
            fragment_wgsl,
            uniforms,
        })
    }

    fn build(&mut self, pre: &Preprocessed, stage: ShaderStage) -> Result<(Module, ModuleInfo), String> {
        let options = Options::from(stage);
        let module = self
            .frontend
            .parse(&options, &pre.source)
            .map_err(|e| e.emit_to_string(&pre.source))?;
        let info = self
            .validator
            .validate(&module)
            .map_err(|e| e.emit_to_string(&pre.source))?;
        Ok((module, info))
    }
}

/// The fixed vertex stage feeds a single `vec2` at location 0; the pass must
/// not expect anything else and must write a color at location 0.
fn check_fragment_interface(module: &Module) -> Result<(), String> {
    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == ShaderStage::Fragment)
        .ok_or_else(|| "no fragment entry point `main`".to_string())?;

    for arg in &entry.function.arguments {
        check_input(module, arg.binding.as_ref(), arg.ty)?;
    }

    let writes_color = entry.function.result.as_ref().is_some_and(|result| {
        match (&result.binding, &module.types[result.ty].inner) {
            (Some(binding), _) => is_location_zero(binding),
            (None, naga::TypeInner::Struct { members, .. }) => {
                members.iter().any(|m| m.binding.as_ref().is_some_and(is_location_zero))
            }
            _ => false,
        }
    });
    if !writes_color {
        return Err("fragment stage writes no color output at location 0".to_string());
    }
    Ok(())
}

fn check_input(module: &Module, binding: Option<&naga::Binding>, ty: naga::Handle<naga::Type>) -> Result<(), String> {
    let inner = &module.types[ty].inner;
    match binding {
        Some(naga::Binding::BuiltIn(_)) => Ok(()),
        Some(naga::Binding::Location { location, .. }) => {
            if *location != 0 {
                return Err(format!(
                    "fragment input at location {location} has no matching vertex output (only location 0 is provided)"
                ));
            }
            match inner {
                naga::TypeInner::Vector {
                    size: naga::VectorSize::Bi,
                    scalar,
                } if scalar.kind == naga::ScalarKind::Float => Ok(()),
                _ => Err("fragment input at location 0 must be a vec2 of texture coordinates".to_string()),
            }
        }
        None => match inner {
            naga::TypeInner::Struct { members, .. } => members
                .iter()
                .try_for_each(|m| check_input(module, m.binding.as_ref(), m.ty)),
            _ => Ok(()),
        },
    }
}

fn is_location_zero(binding: &naga::Binding) -> bool {
    matches!(binding, naga::Binding::Location { location: 0, .. })
}

/// Resolves declared uniforms to their linked slots. Names the shader never
/// declared stay absent.
fn reflect_uniforms(module: &Module, pre: &Preprocessed) -> UniformTable {
    let mut table = UniformTable::new();
    for (_, var) in module.global_variables.iter() {
        let Some(naga::ResourceBinding { group: 0, binding }) = var.binding else {
            continue;
        };

        if binding == PARAMS_BINDING {
            if let naga::TypeInner::Struct { members, span } = &module.types[var.ty].inner {
                for member in members {
                    let Some(name) = member
                        .name
                        .as_deref()
                        .and_then(|n| n.strip_prefix(MEMBER_PREFIX))
                        .and_then(UniformName::from_glsl)
                    else {
                        continue;
                    };
                    if let Some(ty) = pre.declared_type(name) {
                        table.insert(name, UniformSlot::Block { offset: member.offset, ty });
                    }
                }
                table.set_block_size(span.next_multiple_of(16));
            }
            continue;
        }

        if let Some(name) = UniformName::ALL
            .into_iter()
            .find(|n| n.texture_binding() == Some(binding) && pre.declared_type(*n).is_some())
        {
            table.insert(name, UniformSlot::Texture { binding });
        }
    }
    table
}
