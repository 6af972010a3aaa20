//! Recognized pass uniforms and the per-pass slot table.

use std::collections::HashMap;

/// Uniform names a pass may declare. Every one is optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformName {
    Texture,
    InputSize,
    OutputSize,
    TextureSize,
    FrameCount,
    FrameDirection,
    MvpMatrix,
    Time,
    Opacity,
    Overlay,
    Noise,
}

impl UniformName {
    pub const ALL: [UniformName; 11] = [
        UniformName::Texture,
        UniformName::InputSize,
        UniformName::OutputSize,
        UniformName::TextureSize,
        UniformName::FrameCount,
        UniformName::FrameDirection,
        UniformName::MvpMatrix,
        UniformName::Time,
        UniformName::Opacity,
        UniformName::Overlay,
        UniformName::Noise,
    ];

    /// Identifier used in shader text.
    pub fn glsl_name(self) -> &'static str {
        match self {
            UniformName::Texture => "Texture",
            UniformName::InputSize => "InputSize",
            UniformName::OutputSize => "OutputSize",
            UniformName::TextureSize => "TextureSize",
            UniformName::FrameCount => "FrameCount",
            UniformName::FrameDirection => "FrameDirection",
            UniformName::MvpMatrix => "MVPMatrix",
            UniformName::Time => "Time",
            UniformName::Opacity => "WindowOpacity",
            UniformName::Overlay => "OverlayTexture",
            UniformName::Noise => "NoiseTexture",
        }
    }

    pub fn from_glsl(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.glsl_name() == name)
    }

    /// Texture binding for sampler uniforms, `None` for block members.
    pub fn texture_binding(self) -> Option<u32> {
        match self {
            UniformName::Texture => Some(INPUT_TEXTURE_BINDING),
            UniformName::Overlay => Some(OVERLAY_TEXTURE_BINDING),
            UniformName::Noise => Some(NOISE_TEXTURE_BINDING),
            _ => None,
        }
    }

    /// Whether `ty` is an acceptable declaration type for this name.
    pub fn accepts(self, ty: UniformType) -> bool {
        use UniformType::*;
        match self {
            UniformName::Texture | UniformName::Overlay | UniformName::Noise => ty == Sampler2D,
            UniformName::InputSize | UniformName::OutputSize | UniformName::TextureSize => ty == Vec2,
            UniformName::FrameCount | UniformName::FrameDirection => matches!(ty, Int | Uint | Float),
            UniformName::MvpMatrix => ty == Mat4,
            UniformName::Time | UniformName::Opacity => ty == Float,
        }
    }
}

pub const INPUT_TEXTURE_BINDING: u32 = 0;
pub const SAMPLER_BINDING: u32 = 1;
pub const PARAMS_BINDING: u32 = 2;
pub const OVERLAY_TEXTURE_BINDING: u32 = 3;
pub const NOISE_TEXTURE_BINDING: u32 = 4;

/// GLSL types a recognized uniform can be declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformType {
    Float,
    Int,
    Uint,
    Vec2,
    Mat4,
    Sampler2D,
}

impl UniformType {
    pub fn from_glsl(token: &str) -> Option<Self> {
        Some(match token {
            "float" => UniformType::Float,
            "int" => UniformType::Int,
            "uint" => UniformType::Uint,
            "vec2" => UniformType::Vec2,
            "mat4" => UniformType::Mat4,
            "sampler2D" => UniformType::Sampler2D,
            _ => return None,
        })
    }

    pub fn glsl(self) -> &'static str {
        match self {
            UniformType::Float => "float",
            UniformType::Int => "int",
            UniformType::Uint => "uint",
            UniformType::Vec2 => "vec2",
            UniformType::Mat4 => "mat4",
            UniformType::Sampler2D => "sampler2D",
        }
    }
}

/// Where a declared uniform lives once the pass is linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformSlot {
    /// Byte offset inside the pass parameter block.
    Block { offset: u32, ty: UniformType },
    /// Texture binding index in bind group 0.
    Texture { binding: u32 },
}

/// Sparse name -> slot lookup. Names missing from the table are unused by
/// the shader and skipped during binding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformTable {
    slots: HashMap<UniformName, UniformSlot>,
    block_size: u32,
}

impl UniformTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: UniformName, slot: UniformSlot) {
        self.slots.insert(name, slot);
    }

    pub fn set_block_size(&mut self, size: u32) {
        self.block_size = size;
    }

    pub fn slot(&self, name: UniformName) -> Option<UniformSlot> {
        self.slots.get(&name).copied()
    }

    pub fn contains(&self, name: UniformName) -> bool {
        self.slots.contains_key(&name)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Size in bytes of the parameter block, zero when the pass declares no
    /// value uniforms.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Lays out `values` into a std140 buffer matching this table.
    pub fn encode(&self, values: &PassUniforms) -> Vec<u8> {
        let mut bytes = vec![0u8; self.block_size as usize];
        for name in UniformName::ALL {
            let Some(UniformSlot::Block { offset, ty }) = self.slot(name) else {
                continue;
            };
            let offset = offset as usize;
            match (name, ty) {
                (UniformName::InputSize, _) => put_f32s(&mut bytes, offset, &values.input_size),
                (UniformName::OutputSize, _) => put_f32s(&mut bytes, offset, &values.output_size),
                (UniformName::TextureSize, _) => put_f32s(&mut bytes, offset, &values.texture_size),
                (UniformName::MvpMatrix, _) => {
                    let flat: &[f32; 16] = bytemuck::cast_ref(&values.mvp);
                    put_f32s(&mut bytes, offset, flat);
                }
                (UniformName::Time, _) => put_f32s(&mut bytes, offset, &[values.time]),
                (UniformName::Opacity, _) => put_f32s(&mut bytes, offset, &[values.opacity]),
                (UniformName::FrameCount, ty) => put_counter(&mut bytes, offset, ty, values.frame_count),
                (UniformName::FrameDirection, ty) => {
                    put_counter(&mut bytes, offset, ty, values.frame_direction as i64)
                }
                _ => {}
            }
        }
        bytes
    }
}

fn put_f32s(bytes: &mut [u8], offset: usize, values: &[f32]) {
    let raw: &[u8] = bytemuck::cast_slice(values);
    bytes[offset..offset + raw.len()].copy_from_slice(raw);
}

fn put_counter(bytes: &mut [u8], offset: usize, ty: UniformType, value: i64) {
    let raw = match ty {
        UniformType::Int => (value.clamp(i32::MIN as i64, i32::MAX as i64) as i32).to_ne_bytes(),
        UniformType::Uint => (value.clamp(0, u32::MAX as i64) as u32).to_ne_bytes(),
        _ => (value as f32).to_ne_bytes(),
    };
    bytes[offset..offset + 4].copy_from_slice(&raw);
}

pub const IDENTITY: [[f32; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Values bound to one stage of one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassUniforms {
    pub input_size: [f32; 2],
    pub output_size: [f32; 2],
    pub texture_size: [f32; 2],
    pub frame_count: i64,
    pub frame_direction: i32,
    pub mvp: [[f32; 4]; 4],
    pub time: f32,
    pub opacity: f32,
}

impl PassUniforms {
    pub fn new(input: (u32, u32), output: (u32, u32), frame_count: u64, time: f32, opacity: f32) -> Self {
        let input_size = [input.0 as f32, input.1 as f32];
        Self {
            input_size,
            output_size: [output.0 as f32, output.1 as f32],
            texture_size: input_size,
            frame_count: frame_count.min(i64::MAX as u64) as i64,
            frame_direction: 1,
            mvp: IDENTITY,
            time,
            opacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_f32(bytes: &[u8], offset: usize) -> f32 {
        f32::from_ne_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn glsl_names_round_trip() {
        for name in UniformName::ALL {
            assert_eq!(UniformName::from_glsl(name.glsl_name()), Some(name));
        }
        assert_eq!(UniformName::from_glsl("Unknown"), None);
    }

    #[test]
    fn empty_table_encodes_nothing() {
        let table = UniformTable::new();
        let values = PassUniforms::new((800, 600), (640, 480), 3, 0.5, 1.0);
        assert!(table.encode(&values).is_empty());
    }

    #[test]
    fn encode_writes_only_declared_slots() {
        let mut table = UniformTable::new();
        table.insert(UniformName::InputSize, UniformSlot::Block { offset: 0, ty: UniformType::Vec2 });
        table.insert(UniformName::FrameCount, UniformSlot::Block { offset: 8, ty: UniformType::Int });
        table.insert(UniformName::Opacity, UniformSlot::Block { offset: 12, ty: UniformType::Float });
        table.set_block_size(16);

        let values = PassUniforms::new((1920, 1080), (640, 480), 42, 1.5, 0.25);
        let bytes = table.encode(&values);

        assert_eq!(bytes.len(), 16);
        assert_eq!(read_f32(&bytes, 0), 1920.0);
        assert_eq!(read_f32(&bytes, 4), 1080.0);
        assert_eq!(i32::from_ne_bytes(bytes[8..12].try_into().unwrap()), 42);
        assert_eq!(read_f32(&bytes, 12), 0.25);
    }

    #[test]
    fn frame_count_follows_declared_type() {
        let mut table = UniformTable::new();
        table.insert(UniformName::FrameCount, UniformSlot::Block { offset: 0, ty: UniformType::Float });
        table.insert(UniformName::FrameDirection, UniformSlot::Block { offset: 4, ty: UniformType::Uint });
        table.set_block_size(16);

        let bytes = table.encode(&PassUniforms::new((1, 1), (1, 1), 7, 0.0, 1.0));
        assert_eq!(read_f32(&bytes, 0), 7.0);
        assert_eq!(u32::from_ne_bytes(bytes[4..8].try_into().unwrap()), 1);
    }

    #[test]
    fn texture_size_tracks_input_size() {
        let values = PassUniforms::new((320, 240), (64, 64), 0, 0.0, 1.0);
        assert_eq!(values.texture_size, values.input_size);
        assert_eq!(values.mvp, IDENTITY);
        assert_eq!(values.frame_direction, 1);
    }
}
