//! Captured video frames.
//!
//! Frames are packed RGB24, row-major, produced by the ingest layer and
//! consumed in order by the capture loop. A frame is dropped once it has been
//! detected on, annotated and (optionally) encoded.

use anyhow::{anyhow, Result};

pub const BYTES_PER_PIXEL: usize = 3;

pub type Rgb = [u8; 3];

pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Capture sequence number within the source, starting at 1.
    pub index: u64,
    pixels: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, index: u64, pixels: Vec<u8>) -> Result<Self> {
        let expected = expected_len(width, height)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{} frame, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        Ok(Self {
            width,
            height,
            index,
            pixels,
        })
    }

    /// Solid-color frame.
    pub fn filled(width: u32, height: u32, index: u64, color: Rgb) -> Result<Self> {
        let len = expected_len(width, height)?;
        let pixels = color.iter().copied().cycle().take(len).collect();
        Self::new(width, height, index, pixels)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable RGB24 bytes. The length is fixed at `width * height * 3`.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        let offset = self.offset(x, y)?;
        Some([
            self.pixels[offset],
            self.pixels[offset + 1],
            self.pixels[offset + 2],
        ])
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("index", &self.index)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

fn expected_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(BYTES_PER_PIXEL))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer() {
        assert!(Frame::new(4, 4, 1, vec![0; 47]).is_err());
        assert!(Frame::new(4, 4, 1, vec![0; 48]).is_ok());
    }

    #[test]
    fn pixel_reads_through_mutable_bytes() {
        let mut frame = Frame::filled(2, 2, 1, [0, 0, 0]).unwrap();
        frame.pixels_mut()[9..12].copy_from_slice(&[9, 8, 7]);
        assert_eq!(frame.pixel(1, 1), Some([9, 8, 7]));
        assert_eq!(frame.pixel(0, 0), Some([0, 0, 0]));
        assert_eq!(frame.pixel(2, 0), None);
        assert_eq!(frame.pixels_mut().len(), 12);
    }
}
