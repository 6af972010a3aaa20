//! Built-in shader text.

/// Pass used when no shader paths are configured: light scanlines over the
/// source, faded by the window opacity.
pub const DEFAULT_SHADER: &str = r#"
#if defined(VERTEX)
layout(location = 0) in vec4 VertexCoord;
layout(location = 1) in vec2 TexCoord;
out vec2 TEX0;
uniform mat4 MVPMatrix;
void main() {
    gl_Position = MVPMatrix * VertexCoord;
    TEX0 = TexCoord;
}
#elif defined(FRAGMENT)
in vec2 TEX0;
out vec4 FragColor;
uniform sampler2D Texture;
uniform vec2 InputSize;
uniform float WindowOpacity;
void main() {
    vec2 uv = TEX0;
    vec3 base = texture(Texture, uv).rgb;
    vec3 lines = vec3(sin(uv.y * InputSize.y * 3.14159));
    float alpha = 0.75 * WindowOpacity;
    FragColor = vec4(base * (0.8 + 0.2 * lines), alpha);
}
#endif
"#;

/// Straight copy of the input texture.
pub const COPY_SHADER: &str = r#"
#if defined(FRAGMENT)
in vec2 TEX0;
out vec4 FragColor;
uniform sampler2D Texture;
void main() {
    FragColor = texture(Texture, TEX0);
}
#endif
"#;

/// The fixed vertex stage: a full-screen quad in clip space with passthrough
/// texture coordinates. MVPMatrix is always identity, so it is not applied.
pub const VERTEX_SHADER: &str = r#"
struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) tex_coords: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex_coords: vec2<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(in.position, 0.0, 1.0);
    out.tex_coords = in.tex_coords;
    return out;
}
"#;
