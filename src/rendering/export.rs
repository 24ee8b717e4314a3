//! Exporter: raw pixels, PNG/JPEG bytes, data URIs and blobs.

use base64::Engine as _;
use image::codecs::{jpeg::JpegEncoder, png::PngEncoder};
use image::{ColorType, DynamicImage, ImageEncoder};

use crate::data_url;
use crate::rendering::RasterSurface;
use crate::{Error, Result};

/// Compressed raster output format
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RasterFormat {
    Png,
    /// `quality` in `(0, 1]`
    Jpeg { quality: f32 },
}

impl RasterFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            RasterFormat::Png => "image/png",
            RasterFormat::Jpeg { .. } => "image/jpeg",
        }
    }
}

/// Binary image with its mime type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl Blob {
    /// Decode a base64 `data:` URI into a blob.
    pub fn from_data_uri(uri: &str) -> Result<Self> {
        let data = data_url::decode(uri)?;
        Ok(Self {
            mime: data.mime,
            bytes: data.bytes,
        })
    }
}

impl RasterSurface {
    /// Raw RGBA bytes, row-major, top to bottom
    pub fn to_pixel_buffer(&self) -> Vec<u8> {
        self.pixels().to_vec()
    }

    pub fn encode(&self, format: RasterFormat) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        match format {
            RasterFormat::Png => {
                PngEncoder::new(&mut buf).write_image(
                    self.pixels(),
                    self.width(),
                    self.height(),
                    ColorType::Rgba8.into(),
                )?;
            }
            RasterFormat::Jpeg { quality } => {
                // JPEG has no alpha channel
                let rgb = DynamicImage::ImageRgba8(self.image().clone()).to_rgb8();
                JpegEncoder::new_with_quality(&mut buf, jpeg_quality(quality)?).write_image(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    ColorType::Rgb8.into(),
                )?;
            }
        }
        Ok(buf)
    }

    pub fn to_data_uri(&self, format: RasterFormat) -> Result<String> {
        let bytes = self.encode(format)?;
        Ok(data_url::make_data_url(
            format.mime(),
            &base64::engine::general_purpose::STANDARD.encode(bytes),
        ))
    }

    /// PNG blob of the surface
    pub fn to_blob(&self) -> Result<Blob> {
        Ok(Blob {
            mime: RasterFormat::Png.mime().to_string(),
            bytes: self.encode(RasterFormat::Png)?,
        })
    }
}

fn jpeg_quality(quality: f32) -> Result<u8> {
    if !(quality > 0.0 && quality <= 1.0) {
        return Err(Error::InvalidOptions(format!(
            "JPEG quality must be in (0, 1], got {}",
            quality
        )));
    }
    Ok((quality * 100.0).round().clamp(1.0, 100.0) as u8)
}
