//! Getting finished passes in front of a viewer.
//!
//! The renderer copies its accumulation into a [`TransferBuffer`] between
//! passes and hands it to a [`DisplayTarget`]. The CPU target here keeps the
//! last image for tests and snapshots; the viewport crate provides a GPU one.

use std::path::Path;

use glint_math::Color;

/// Row-major RGBA32F staging image, one `[f32; 4]` per pixel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferBuffer {
    width: u32,
    height: u32,
    pixels: Vec<[f32; 4]>,
}

impl TransferBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0.0; 4]; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[[f32; 4]] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [[f32; 4]] {
        &mut self.pixels
    }

    /// Change the size, discarding contents.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels.clear();
        self.pixels.resize(width as usize * height as usize, [0.0; 4]);
    }

    /// Raw bytes for texture uploads.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// Bytes per row of [`TransferBuffer::as_bytes`].
    pub fn bytes_per_row(&self) -> u32 {
        self.width * std::mem::size_of::<[f32; 4]>() as u32
    }
}

/// Consumer of finished passes.
pub trait DisplayTarget {
    /// Display-ready resource handed to the host.
    type Output;

    /// Queue a copy of `buffer` for display. Called only between passes.
    fn enqueue_copy(&mut self, buffer: &TransferBuffer);

    fn output(&self) -> &Self::Output;
}

/// Simple image buffer for storing render output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageBuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Color>,
}

impl ImageBuffer {
    /// Create a new image buffer filled with black.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![Color::ZERO; width as usize * height as usize],
        }
    }

    /// Copy the RGB channels of a staging buffer.
    pub fn from_transfer(buffer: &TransferBuffer) -> Self {
        Self {
            width: buffer.width(),
            height: buffer.height(),
            pixels: buffer
                .pixels()
                .iter()
                .map(|p| Color::new(p[0], p[1], p[2]))
                .collect(),
        }
    }

    /// Get the pixel at (x, y).
    pub fn get(&self, x: u32, y: u32) -> Color {
        self.pixels[(y * self.width + x) as usize]
    }

    /// Save as an 8-bit, gamma-corrected image; format from the extension.
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> image::ImageResult<()> {
        let img = image::RgbaImage::from_fn(self.width, self.height, |x, y| {
            image::Rgba(color_to_rgba(self.get(x, y)))
        });
        img.save(path)
    }

    /// Save linear radiance as a 32-bit float OpenEXR image.
    pub fn save_exr<P: AsRef<Path>>(&self, path: P) -> image::ImageResult<()> {
        let img = image::Rgba32FImage::from_fn(self.width, self.height, |x, y| {
            let c = self.get(x, y);
            image::Rgba([c.x, c.y, c.z, 1.0])
        });
        img.save_with_format(path, image::ImageFormat::OpenExr)
    }
}

/// Display target that keeps the latest pass in memory.
#[derive(Debug, Default)]
pub struct CpuTarget {
    image: ImageBuffer,
    copies: u64,
}

impl CpuTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of copies received so far.
    pub fn copies(&self) -> u64 {
        self.copies
    }
}

impl DisplayTarget for CpuTarget {
    type Output = ImageBuffer;

    fn enqueue_copy(&mut self, buffer: &TransferBuffer) {
        self.image = ImageBuffer::from_transfer(buffer);
        self.copies += 1;
    }

    fn output(&self) -> &ImageBuffer {
        &self.image
    }
}

/// Apply gamma correction (gamma = 2.0).
#[inline]
pub fn linear_to_gamma(linear: f32) -> f32 {
    if linear > 0.0 {
        linear.sqrt()
    } else {
        0.0
    }
}

/// Convert a linear color to gamma-corrected 8-bit RGBA.
pub fn color_to_rgba(color: Color) -> [u8; 4] {
    let channel = |v: f32| (255.0 * linear_to_gamma(v).clamp(0.0, 1.0)) as u8;
    [channel(color.x), channel(color.y), channel(color.z), 255]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_to_gamma() {
        assert_eq!(linear_to_gamma(0.0), 0.0);
        assert_eq!(linear_to_gamma(-1.0), 0.0);
        assert!((linear_to_gamma(1.0) - 1.0).abs() < 0.0001);
        assert!((linear_to_gamma(0.25) - 0.5).abs() < 0.0001);
    }

    #[test]
    fn test_color_to_rgba_clamps() {
        assert_eq!(color_to_rgba(Color::new(4.0, 0.0, 0.25)), [255, 0, 127, 255]);
    }

    #[test]
    fn test_transfer_buffer_layout() {
        let mut buffer = TransferBuffer::new(3, 2);
        assert_eq!(buffer.pixels().len(), 6);
        assert_eq!(buffer.as_bytes().len(), 6 * 16);
        assert_eq!(buffer.bytes_per_row(), 48);

        buffer.resize(1, 1);
        assert_eq!(buffer.pixels(), &[[0.0; 4]]);
    }

    #[test]
    fn test_cpu_target_copies_pixels() {
        let mut buffer = TransferBuffer::new(2, 1);
        buffer.pixels_mut()[1] = [0.25, 0.5, 1.0, 1.0];

        let mut target = CpuTarget::new();
        target.enqueue_copy(&buffer);

        assert_eq!(target.copies(), 1);
        let image = target.output();
        assert_eq!((image.width, image.height), (2, 1));
        assert_eq!(image.get(1, 0), Color::new(0.25, 0.5, 1.0));
        assert_eq!(image.get(0, 0), Color::ZERO);
    }

    #[test]
    fn test_save_png_and_exr() {
        let dir = std::env::temp_dir().join(format!("glint_display_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut buffer = ImageBuffer::new(4, 4);
        buffer.pixels[5] = Color::new(1.0, 0.5, 0.25);
        buffer.save_png(dir.join("out.png")).unwrap();
        buffer.save_exr(dir.join("out.exr")).unwrap();
        assert!(dir.join("out.exr").exists());

        let png = image::open(dir.join("out.png")).unwrap().to_rgba8();
        assert_eq!(png.get_pixel(1, 1).0, color_to_rgba(Color::new(1.0, 0.5, 0.25)));

        std::fs::remove_dir_all(&dir).ok();
    }
}
