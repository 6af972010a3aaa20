//! Desktop capture from the X11 root window.

use super::CaptureBackend;
use crate::error::CaptureError;
use crate::frame::{PixelFormat, VideoFrame};
use std::fmt::Display;
use tracing::info;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt as _, ImageFormat, ImageOrder, Window};
use x11rb::rust_connection::RustConnection;

/// Red, green and blue masks of a TrueColor visual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMasks {
    pub red: u32,
    pub green: u32,
    pub blue: u32,
}

/// How the server packs pixels in a ZPixmap image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelLayout {
    pub bits_per_pixel: u8,
    /// Rows are padded to a multiple of this many bits.
    pub scanline_pad: u8,
    pub msb_first: bool,
    pub masks: ChannelMasks,
}

impl PixelLayout {
    fn bytes_per_pixel(&self) -> usize {
        self.bits_per_pixel as usize / 8
    }

    fn stride(&self, width: u32) -> usize {
        let pad = usize::from(self.scanline_pad.max(8));
        let bits = width as usize * usize::from(self.bits_per_pixel);
        bits.div_ceil(pad) * pad / 8
    }
}

/// Scales the field under `mask` to 0..=255. An empty mask reads as 0.
fn channel(pixel: u32, mask: u32) -> u8 {
    if mask == 0 {
        return 0;
    }
    let shift = mask.trailing_zeros();
    let max = u64::from(mask >> shift);
    let value = u64::from((pixel & mask) >> shift);
    (value * 255 / max) as u8
}

/// Unpacks a ZPixmap reply into opaque RGBA. Only 24 and 32 bits per pixel
/// are understood.
pub fn decode_zpixmap(data: &[u8], width: u32, height: u32, layout: &PixelLayout) -> Result<Vec<u8>, CaptureError> {
    if !matches!(layout.bits_per_pixel, 24 | 32) {
        return Err(CaptureError::Grab(format!(
            "unsupported screen depth of {} bits per pixel",
            layout.bits_per_pixel
        )));
    }
    let stride = layout.stride(width);
    if width == 0 || height == 0 || data.len() < stride * height as usize {
        return Err(CaptureError::Malformed { width, height });
    }

    let bpp = layout.bytes_per_pixel();
    let masks = layout.masks;
    let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
    for row in data.chunks_exact(stride).take(height as usize) {
        for bytes in row[..width as usize * bpp].chunks_exact(bpp) {
            let pixel = bytes.iter().enumerate().fold(0u32, |acc, (i, &byte)| {
                let shift = if layout.msb_first { (bpp - 1 - i) * 8 } else { i * 8 };
                acc | (u32::from(byte) << shift)
            });
            rgba.extend_from_slice(&[
                channel(pixel, masks.red),
                channel(pixel, masks.green),
                channel(pixel, masks.blue),
                255,
            ]);
        }
    }
    Ok(rgba)
}

fn unavailable(e: impl Display) -> CaptureError {
    CaptureError::Unavailable(e.to_string())
}

fn grab_failed(e: impl Display) -> CaptureError {
    CaptureError::Grab(e.to_string())
}

/// Grabs the whole root window of the display named by `$DISPLAY`.
pub struct X11Screen {
    conn: RustConnection,
    root: Window,
    layout: PixelLayout,
    width: u32,
    height: u32,
}

impl X11Screen {
    pub fn open() -> Result<Self, CaptureError> {
        let (conn, screen_num) = x11rb::connect(None).map_err(unavailable)?;
        let setup = conn.setup();
        let screen = setup
            .roots
            .get(screen_num)
            .ok_or_else(|| unavailable(format!("display has no screen {}", screen_num)))?;

        let visual = screen
            .allowed_depths
            .iter()
            .filter(|depth| depth.depth == screen.root_depth)
            .flat_map(|depth| depth.visuals.iter())
            .find(|visual| visual.visual_id == screen.root_visual)
            .ok_or_else(|| unavailable("root visual not listed by the server"))?;
        let format = setup
            .pixmap_formats
            .iter()
            .find(|format| format.depth == screen.root_depth)
            .ok_or_else(|| unavailable(format!("no pixmap format for depth {}", screen.root_depth)))?;

        let layout = PixelLayout {
            bits_per_pixel: format.bits_per_pixel,
            scanline_pad: format.scanline_pad,
            msb_first: setup.image_byte_order == ImageOrder::MSB_FIRST,
            masks: ChannelMasks {
                red: visual.red_mask,
                green: visual.green_mask,
                blue: visual.blue_mask,
            },
        };
        if !matches!(layout.bits_per_pixel, 24 | 32) {
            return Err(unavailable(format!(
                "screen uses {} bits per pixel, only 24 and 32 are supported",
                layout.bits_per_pixel
            )));
        }
        let root = screen.root;
        let (width, height) = (u32::from(screen.width_in_pixels), u32::from(screen.height_in_pixels));
        info!(
            "Connected to X display: root window {}x{}, {} bits per pixel",
            width, height, layout.bits_per_pixel
        );

        Ok(Self {
            conn,
            root,
            layout,
            width,
            height,
        })
    }
}

impl CaptureBackend for X11Screen {
    /// Reads the root window at its current size, so resolution changes show
    /// up on the next grab.
    fn capture_frame(&mut self) -> Result<VideoFrame, CaptureError> {
        let geometry = self
            .conn
            .get_geometry(self.root)
            .map_err(grab_failed)?
            .reply()
            .map_err(grab_failed)?;
        let image = self
            .conn
            .get_image(
                ImageFormat::Z_PIXMAP,
                self.root,
                0,
                0,
                geometry.width,
                geometry.height,
                u32::MAX,
            )
            .map_err(grab_failed)?
            .reply()
            .map_err(grab_failed)?;

        let (width, height) = (u32::from(geometry.width), u32::from(geometry.height));
        let rgba = decode_zpixmap(&image.data, width, height, &self.layout)?;
        self.width = width;
        self.height = height;
        Ok(VideoFrame::from_data(width, height, PixelFormat::Rgba, rgba))
    }

    fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRUE_COLOR: ChannelMasks = ChannelMasks {
        red: 0x00ff_0000,
        green: 0x0000_ff00,
        blue: 0x0000_00ff,
    };

    fn layout(bits_per_pixel: u8, msb_first: bool, masks: ChannelMasks) -> PixelLayout {
        PixelLayout {
            bits_per_pixel,
            scanline_pad: 32,
            msb_first,
            masks,
        }
    }

    #[test]
    fn little_endian_bgrx_becomes_rgba() {
        // Two pixels, as a typical 24-bit depth server sends them.
        let data = [0x10, 0x20, 0x30, 0x00, 0xff, 0x00, 0x00, 0xaa];
        let rgba = decode_zpixmap(&data, 2, 1, &layout(32, false, TRUE_COLOR)).unwrap();
        assert_eq!(rgba, vec![0x30, 0x20, 0x10, 255, 0x00, 0x00, 0xff, 255]);
    }

    #[test]
    fn big_endian_servers_are_read_most_significant_byte_first() {
        let data = [0x00, 0x30, 0x20, 0x10];
        let rgba = decode_zpixmap(&data, 1, 1, &layout(32, true, TRUE_COLOR)).unwrap();
        assert_eq!(rgba, vec![0x30, 0x20, 0x10, 255]);
    }

    #[test]
    fn narrow_masks_are_scaled_to_full_range() {
        // 10-bit channels: full red, half green, no blue.
        let masks = ChannelMasks {
            red: 0x3ff0_0000,
            green: 0x000f_fc00,
            blue: 0x0000_03ff,
        };
        let pixel: u32 = (0x3ff << 20) | (0x1ff << 10);
        let rgba = decode_zpixmap(&pixel.to_le_bytes(), 1, 1, &layout(32, false, masks)).unwrap();
        assert_eq!(rgba, vec![255, 127, 0, 255]);
    }

    #[test]
    fn packed_24_bit_rows_skip_scanline_padding() {
        // 1x2 image: each 3-byte row is padded to 4 bytes.
        let data = [0x01, 0x02, 0x03, 0xee, 0x04, 0x05, 0x06, 0xee];
        let rgba = decode_zpixmap(&data, 1, 2, &layout(24, false, TRUE_COLOR)).unwrap();
        assert_eq!(rgba, vec![0x03, 0x02, 0x01, 255, 0x06, 0x05, 0x04, 255]);
    }

    #[test]
    fn short_or_unsupported_images_are_rejected() {
        assert!(matches!(
            decode_zpixmap(&[0; 4], 2, 1, &layout(32, false, TRUE_COLOR)),
            Err(CaptureError::Malformed { width: 2, height: 1 })
        ));
        assert!(matches!(
            decode_zpixmap(&[0; 4], 2, 1, &layout(16, false, TRUE_COLOR)),
            Err(CaptureError::Grab(_))
        ));
    }
}
