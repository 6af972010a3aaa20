//! Source rewriting applied before the GLSL front end sees a pass.
//!
//! User shaders are written against a GL-style interface: loose `uniform`
//! declarations and combined `sampler2D`s, one file branching on `VERTEX` /
//! `FRAGMENT`. The GLSL front end only accepts Vulkan-style resources, so the
//! recognized uniforms are lifted into an std140 parameter block (values) or
//! split texture + sampler pairs (samplers) and aliased back with `#define`.

use super::uniforms::{UniformName, UniformType, PARAMS_BINDING, SAMPLER_BINDING};
use crate::error::Stage;
use std::fmt::Write;

pub const VERSION_DIRECTIVE: &str = "#version 450 core";
pub const PARAMS_BLOCK: &str = "ShaderglassParams";
pub const PARAMS_INSTANCE: &str = "shaderglass_params";
pub const MEMBER_PREFIX: &str = "p_";
const SAMPLER_NAME: &str = "shaderglass_sampler";
const TEXTURE_PREFIX: &str = "shaderglass_";

/// A recognized uniform the user text declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Declaration {
    pub name: UniformName,
    pub ty: UniformType,
}

/// Stage-specific source ready for parsing.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub source: String,
    pub declared: Vec<Declaration>,
}

impl Preprocessed {
    pub fn declared_type(&self, name: UniformName) -> Option<UniformType> {
        self.declared.iter().find(|d| d.name == name).map(|d| d.ty)
    }
}

/// Whether the text carries its own vertex branch.
pub fn has_vertex_branch(source: &str) -> bool {
    source.lines().any(|line| {
        let line = line.trim_start();
        line.starts_with('#') && line.contains("if") && contains_word(line, "VERTEX")
    })
}

fn contains_word(haystack: &str, word: &str) -> bool {
    haystack
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|token| token == word)
}

/// Rewrites `source` for `stage`. Errors carry a diagnostic meant for the
/// shader author.
pub fn preprocess(source: &str, stage: Stage) -> Result<Preprocessed, String> {
    let mut declared: Vec<Declaration> = Vec::new();
    let mut body = String::with_capacity(source.len() + 64);

    for (number, line) in source.lines().enumerate() {
        let rewritten = match classify(line) {
            Line::Version | Line::Precision => String::new(),
            Line::Recognized(decl) => {
                match declared.iter().find(|d| d.name == decl.name) {
                    Some(existing) if existing.ty != decl.ty => {
                        return Err(format!(
                            "{}: uniform {} redeclared as {} (previously {})",
                            number + 1,
                            decl.name.glsl_name(),
                            decl.ty.glsl(),
                            existing.ty.glsl()
                        ));
                    }
                    Some(_) => {}
                    None if !decl.name.accepts(decl.ty) => {
                        return Err(format!(
                            "{}: uniform {} cannot be declared as {}",
                            number + 1,
                            decl.name.glsl_name(),
                            decl.ty.glsl()
                        ));
                    }
                    None => declared.push(decl),
                }
                String::new()
            }
            Line::Unrecognized { ty, name } => format!("{ty} {name} = {ty}(0);"),
            Line::Keep => line.to_string(),
        };
        body.push_str(&rewritten);
        body.push('\n');
    }

    let mut out = prelude(stage, &declared);
    out.push_str("#line 1\n");
    out.push_str(&body);
    Ok(Preprocessed { source: out, declared })
}

enum Line<'a> {
    Version,
    Precision,
    Recognized(Declaration),
    Unrecognized { ty: &'a str, name: &'a str },
    Keep,
}

fn classify(line: &str) -> Line<'_> {
    let code = line.split("//").next().unwrap_or_default().trim();
    if code.starts_with("#version") {
        return Line::Version;
    }
    if code.starts_with("precision ") {
        return Line::Precision;
    }
    let Some(decl) = code.strip_prefix("uniform ").and_then(|rest| rest.strip_suffix(';')) else {
        return Line::Keep;
    };
    if decl.contains(['{', ',', '[', '=', '(']) {
        return Line::Keep;
    }
    let tokens: Vec<&str> = decl.split_whitespace().collect();
    let [.., ty, name] = tokens[..] else {
        return Line::Keep;
    };

    if let Some(uniform) = UniformName::from_glsl(name) {
        return match UniformType::from_glsl(ty) {
            Some(ty) => Line::Recognized(Declaration { name: uniform, ty }),
            // Let the front end report the unknown type in context.
            None => Line::Keep,
        };
    }
    if is_constructible(ty) {
        Line::Unrecognized { ty, name }
    } else {
        Line::Keep
    }
}

fn is_constructible(ty: &str) -> bool {
    matches!(ty, "float" | "int" | "uint" | "bool")
        || ["vec", "ivec", "uvec", "bvec", "mat"].iter().any(|prefix| {
            ty.strip_prefix(prefix)
                .is_some_and(|dims| !dims.is_empty() && dims.chars().all(|c| matches!(c, '2'..='4' | 'x')))
        })
}

fn prelude(stage: Stage, declared: &[Declaration]) -> String {
    let mut out = String::new();
    let define = match stage {
        Stage::Vertex => "VERTEX",
        Stage::Fragment => "FRAGMENT",
    };
    let _ = writeln!(out, "{VERSION_DIRECTIVE}");
    let _ = writeln!(out, "#define {define}");

    let samplers: Vec<UniformName> = declared
        .iter()
        .filter_map(|d| d.name.texture_binding().map(|_| d.name))
        .collect();
    if !samplers.is_empty() {
        let _ = writeln!(out, "layout(set = 0, binding = {SAMPLER_BINDING}) uniform sampler {SAMPLER_NAME};");
    }
    for name in samplers {
        let binding = name.texture_binding().unwrap_or_default();
        let glsl = name.glsl_name();
        let _ = writeln!(out, "layout(set = 0, binding = {binding}) uniform texture2D {TEXTURE_PREFIX}{glsl};");
        let _ = writeln!(out, "#define {glsl} sampler2D({TEXTURE_PREFIX}{glsl}, {SAMPLER_NAME})");
    }

    // mat4 first keeps the block free of interior padding.
    let mut values: Vec<&Declaration> = declared.iter().filter(|d| d.name.texture_binding().is_none()).collect();
    values.sort_by_key(|d| d.name != UniformName::MvpMatrix);
    if !values.is_empty() {
        let _ = writeln!(out, "layout(std140, set = 0, binding = {PARAMS_BINDING}) uniform {PARAMS_BLOCK} {{");
        for decl in &values {
            let _ = writeln!(out, "    {} {MEMBER_PREFIX}{};", decl.ty.glsl(), decl.name.glsl_name());
        }
        let _ = writeln!(out, "}} {PARAMS_INSTANCE};");
        for decl in &values {
            let glsl = decl.name.glsl_name();
            let _ = writeln!(out, "#define {glsl} {PARAMS_INSTANCE}.{MEMBER_PREFIX}{glsl}");
        }
    }
    out
}
