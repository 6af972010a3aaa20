//! Synthetic fallback image.

use crate::frame::SourceFrame;

/// A fixed, deterministic image. Never unavailable.
#[derive(Debug, Clone)]
pub struct PatternSource {
    frame: SourceFrame,
}

impl PatternSource {
    /// Horizontal red/green ramp with blue increasing downwards.
    pub fn gradient(width: u32, height: u32) -> Self {
        let (w, h) = (width.max(1), height.max(1));
        let mut pixels = Vec::with_capacity(w as usize * h as usize * 4);
        for y in 0..h {
            let yf = y as f32 / h as f32;
            for x in 0..w {
                let xf = x as f32 / w as f32;
                pixels.extend_from_slice(&[
                    (255.0 * xf) as u8,
                    (255.0 * (1.0 - xf)) as u8,
                    (255.0 * yf) as u8,
                    255,
                ]);
            }
        }
        Self {
            frame: SourceFrame {
                width: w,
                height: h,
                pixels,
            },
        }
    }

    pub fn frame(&self) -> &SourceFrame {
        &self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradient_is_deterministic() {
        let a = PatternSource::gradient(16, 9);
        let b = PatternSource::gradient(16, 9);
        assert_eq!(a.frame(), b.frame());
        assert_eq!(a.frame().pixels.len(), 16 * 9 * 4);
    }

    #[test]
    fn gradient_corners() {
        let pattern = PatternSource::gradient(4, 2);
        let px = |x: usize, y: usize| &pattern.frame().pixels[(y * 4 + x) * 4..(y * 4 + x) * 4 + 4];
        assert_eq!(px(0, 0), &[0, 255, 0, 255]);
        assert_eq!(px(2, 0), &[127, 127, 0, 255]);
        assert_eq!(px(0, 1), &[0, 255, 127, 255]);
    }

    #[test]
    fn zero_size_is_raised_to_one_pixel() {
        assert_eq!(PatternSource::gradient(0, 0).frame().size(), (1, 1));
    }
}
