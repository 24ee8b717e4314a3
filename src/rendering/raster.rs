//! Rasterizer: decode the serialized envelope and paint it onto a surface.

use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use log::{debug, trace};

use crate::data_url;
use crate::rendering::RasterSurface;
use crate::{Error, Result};

/// Pause between decode completion and drawing, for decoders that report
/// completion before foreign content has finished rasterizing.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Platform image codec: turns a URI into drawable pixels.
#[async_trait]
pub trait ImageDecoder: Send + Sync {
    async fn decode(&self, uri: &str) -> Result<RgbaImage>;

    /// `true` when a successful `decode` already means the image is fully
    /// rasterized, so no settle delay is needed.
    fn reports_fully_rasterized(&self) -> bool {
        false
    }
}

/// Decoder for raster `data:` URIs (PNG, JPEG, GIF).
///
/// It has no renderer for `image/svg+xml` foreign content; hosts that render
/// to bitmaps supply their own [`ImageDecoder`] for that.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterDecoder;

#[async_trait]
impl ImageDecoder for RasterDecoder {
    async fn decode(&self, uri: &str) -> Result<RgbaImage> {
        let data = data_url::decode(uri).map_err(|e| Error::DecodeError(e.to_string()))?;
        if data.mime.starts_with("image/svg+xml") {
            return Err(Error::DecodeError(
                "no renderer available for image/svg+xml content".into(),
            ));
        }
        if data.bytes.is_empty() {
            return Err(Error::DecodeError("empty image payload".into()));
        }
        let image = image::load_from_memory(&data.bytes)
            .map_err(|e| Error::DecodeError(e.to_string()))?;
        Ok(image.to_rgba8())
    }

    fn reports_fully_rasterized(&self) -> bool {
        true
    }
}

/// Parse a CSS color into RGBA8.
pub fn parse_color(color: &str) -> Result<[u8; 4]> {
    csscolorparser::parse(color)
        .map(|c| c.to_rgba8())
        .map_err(|e| Error::InvalidOptions(format!("invalid background color {:?}: {}", color, e)))
}

/// Decode `svg_uri` and draw it at the origin of a fresh `width`x`height`
/// surface, filled with `background` first when given.
pub async fn rasterize(
    svg_uri: &str,
    width: u32,
    height: u32,
    background: Option<&str>,
    decoder: &dyn ImageDecoder,
    settle_delay: Duration,
) -> Result<RasterSurface> {
    let fill = background.map(parse_color).transpose()?;

    let image = decoder.decode(svg_uri).await?;
    debug!("decoded capture image {}x{}", image.width(), image.height());

    if !decoder.reports_fully_rasterized() && !settle_delay.is_zero() {
        trace!("settling for {:?}", settle_delay);
        tokio::time::sleep(settle_delay).await;
    }

    let mut surface = RasterSurface::new(width, height);
    if let Some(rgba) = fill {
        surface.fill(rgba);
    }
    surface.draw_image(&image, 0, 0);
    Ok(surface)
}
