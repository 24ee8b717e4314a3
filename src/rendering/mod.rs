//! Rendering: decode the vector artifact onto a pixel surface, then export it.

pub mod export;
pub mod raster;

use image::{imageops, Rgba, RgbaImage};

/// Owned RGBA pixel buffer of fixed size, created fresh for every capture.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterSurface {
    image: RgbaImage,
}

impl RasterSurface {
    /// A fully transparent surface
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba(rgba);
        }
    }

    /// Draw `image` with its top-left corner at (`x`, `y`), alpha-blended.
    /// Anything outside the surface is clipped.
    pub fn draw_image(&mut self, image: &RgbaImage, x: i64, y: i64) {
        imageops::overlay(&mut self.image, image, x, y);
    }

    /// RGBA bytes, row-major, top to bottom
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_blends_over_background_and_clips() {
        let mut surface = RasterSurface::new(3, 2);
        surface.fill([255, 255, 255, 255]);

        let mut top = RgbaImage::new(4, 4);
        top.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        surface.draw_image(&top, 1, 1);

        assert_eq!(surface.pixels().len(), 3 * 2 * 4);
        assert_eq!(surface.image().get_pixel(1, 1).0, [255, 0, 0, 255]);
        assert_eq!(surface.image().get_pixel(2, 1).0, [255, 255, 255, 255]);
        assert_eq!(surface.image().get_pixel(0, 0).0, [255, 255, 255, 255]);
    }
}
