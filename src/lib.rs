//! RFox Capture
//!
//! Captures how a node of an already-rendered document looks, as a
//! self-contained SVG, a PNG or JPEG, a blob, or a raw RGBA pixel buffer.
//!
//! # Pipeline
//!
//! - **Clone**: deep copy of the node with every computed style made explicit
//! - **Inline**: images, backgrounds and web fonts become `data:` URIs
//! - **Serialize**: the clone is wrapped in an SVG `foreignObject`
//! - **Rasterize/Export**: the SVG is decoded onto a pixel surface and encoded
//!
//! Style computation, networking and image decoding are supplied by the host
//! through [`StyleEngine`], [`ResourceFetcher`] and [`ImageDecoder`].
//!
//! # Example
//!
//! ```no_run
//! use rfcapture::{CaptureOptions, Document};
//!
//! # async fn run() -> rfcapture::Result<()> {
//! let doc = Document::parse_html(
//!     r#"<div id="card" style="width: 200px; height: 100px">Hi</div>"#,
//!     Some("https://example.com/"),
//! )?;
//! let card = doc.query_selector("#card")?.expect("card exists");
//!
//! let capturer = rfcapture::new_capturer(Default::default())?;
//! let options = CaptureOptions {
//!     background_color: Some("#ffffff".to_string()),
//!     ..Default::default()
//! };
//! let svg = capturer.to_svg(&doc, card, &options).await?;
//! println!("{}", svg);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub mod capture;
pub mod data_url;
pub mod dom;
pub mod error;
pub mod fetch;
pub mod rendering;
pub mod style;

pub use dom::{Document, NodeId, NodeRef};
pub use error::{Error, Result};
pub use fetch::{ResourceFetcher, StaticFetcher};
#[cfg(feature = "http")]
pub use fetch::{HttpFetcher, HttpFetcherConfig};
pub use rendering::export::{Blob, RasterFormat};
pub use rendering::raster::{ImageDecoder, RasterDecoder};
pub use rendering::RasterSurface;
pub use style::{InlineStyleEngine, MapStyleEngine, StyleEngine};

use capture::inline::FetchPolicy;
use capture::{CaptureSession, SvgCapture};
use rendering::raster;

/// Predicate deciding whether a descendant is cloned. Never applied to the
/// capture root.
#[derive(Clone)]
pub struct NodeFilter(Arc<dyn Fn(NodeRef<'_>) -> bool + Send + Sync>);

impl NodeFilter {
    pub fn new<F>(filter: F) -> Self
    where
        F: Fn(NodeRef<'_>) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(filter))
    }

    pub fn accepts(&self, node: NodeRef<'_>) -> bool {
        (self.0)(node)
    }
}

impl fmt::Debug for NodeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NodeFilter(..)")
    }
}

/// Options of one capture
///
/// Options are immutable for the duration of a capture and never shared
/// between captures.
///
/// # Examples
///
/// ```
/// let opts = rfcapture::CaptureOptions::default();
/// assert_eq!(opts.quality, 1.0);
/// assert!(opts.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Output width in pixels; the node's natural width when unset
    pub width: Option<u32>,
    /// Output height in pixels; the node's natural height when unset
    pub height: Option<u32>,
    /// CSS color painted behind the capture
    pub background_color: Option<String>,
    /// Extra style declarations applied to the cloned root
    pub extra_style: Vec<(String, String)>,
    /// `data:` URI used in place of any resource that fails to load
    pub image_placeholder: Option<String>,
    /// Append a timestamp query to every fetched URL
    pub cache_bust: bool,
    /// Filter applied to descendants of the captured node
    pub node_filter: Option<NodeFilter>,
    /// JPEG quality in `(0, 1]`
    pub quality: f32,
    /// Timeout for each resource fetch
    pub fetch_timeout: Duration,
    /// Pause after decoding the SVG, for decoders that report completion early
    pub settle_delay: Duration,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            background_color: None,
            extra_style: Vec::new(),
            image_placeholder: None,
            cache_bust: false,
            node_filter: None,
            quality: 1.0,
            fetch_timeout: Duration::from_secs(30),
            settle_delay: raster::DEFAULT_SETTLE_DELAY,
        }
    }
}

impl CaptureOptions {
    pub fn validate(&self) -> Result<()> {
        if self.width == Some(0) || self.height == Some(0) {
            return Err(Error::InvalidOptions("width and height must be positive".into()));
        }
        if !(self.quality > 0.0 && self.quality <= 1.0) {
            return Err(Error::InvalidOptions(format!(
                "quality must be in (0, 1], got {}",
                self.quality
            )));
        }
        if let Some(color) = &self.background_color {
            raster::parse_color(color)?;
        }
        if let Some(placeholder) = &self.image_placeholder {
            if data_url::payload(placeholder).is_none() {
                return Err(Error::InvalidOptions(format!(
                    "image placeholder must be a data URI with a payload: {}",
                    placeholder
                )));
            }
        }
        if self.fetch_timeout.is_zero() {
            return Err(Error::InvalidOptions("fetch timeout must be positive".into()));
        }
        Ok(())
    }

    pub(crate) fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            placeholder_payload: self
                .image_placeholder
                .as_deref()
                .and_then(data_url::payload)
                .map(str::to_string),
            cache_bust: self.cache_bust,
            timeout: self.fetch_timeout,
        }
    }
}

/// Captures document nodes through host-supplied collaborators.
///
/// A `Capturer` holds no per-capture state; concurrent captures through one
/// instance are independent.
#[derive(Clone)]
pub struct Capturer {
    styles: Arc<dyn StyleEngine>,
    fetcher: Arc<dyn ResourceFetcher>,
    decoder: Arc<dyn ImageDecoder>,
}

impl Capturer {
    pub fn new(
        styles: Arc<dyn StyleEngine>,
        fetcher: Arc<dyn ResourceFetcher>,
        decoder: Arc<dyn ImageDecoder>,
    ) -> Self {
        Self {
            styles,
            fetcher,
            decoder,
        }
    }

    /// Self-contained `data:image/svg+xml` URI of the node
    pub async fn to_svg(
        &self,
        doc: &Document,
        node: NodeId,
        options: &CaptureOptions,
    ) -> Result<String> {
        Ok(self.capture(doc, node, options).await?.data_uri)
    }

    /// The same capture as [`Capturer::to_svg`], as a plain SVG document
    pub async fn to_svg_markup(
        &self,
        doc: &Document,
        node: NodeId,
        options: &CaptureOptions,
    ) -> Result<String> {
        Ok(self.capture(doc, node, options).await?.markup)
    }

    /// Rasterize the node onto a fresh pixel surface.
    pub async fn render(
        &self,
        doc: &Document,
        node: NodeId,
        options: &CaptureOptions,
    ) -> Result<RasterSurface> {
        let svg = self.capture(doc, node, options).await?;
        raster::rasterize(
            &svg.data_uri,
            svg.width,
            svg.height,
            options.background_color.as_deref(),
            self.decoder.as_ref(),
            options.settle_delay,
        )
        .await
    }

    /// Raw RGBA bytes, row-major, top to bottom
    pub async fn to_pixel_data(
        &self,
        doc: &Document,
        node: NodeId,
        options: &CaptureOptions,
    ) -> Result<Vec<u8>> {
        Ok(self.render(doc, node, options).await?.to_pixel_buffer())
    }

    /// `data:image/png;base64,...`
    pub async fn to_png(
        &self,
        doc: &Document,
        node: NodeId,
        options: &CaptureOptions,
    ) -> Result<String> {
        self.render(doc, node, options)
            .await?
            .to_data_uri(RasterFormat::Png)
    }

    /// `data:image/jpeg;base64,...` at `options.quality`
    pub async fn to_jpeg(
        &self,
        doc: &Document,
        node: NodeId,
        options: &CaptureOptions,
    ) -> Result<String> {
        self.render(doc, node, options)
            .await?
            .to_data_uri(RasterFormat::Jpeg {
                quality: options.quality,
            })
    }

    /// PNG bytes of the capture
    pub async fn to_blob(
        &self,
        doc: &Document,
        node: NodeId,
        options: &CaptureOptions,
    ) -> Result<Blob> {
        self.render(doc, node, options).await?.to_blob()
    }

    async fn capture(
        &self,
        doc: &Document,
        node: NodeId,
        options: &CaptureOptions,
    ) -> Result<SvgCapture> {
        let node = doc.get(node).ok_or_else(|| {
            Error::InvalidNode(format!("{:?} does not belong to the document", node))
        })?;
        let mut session = CaptureSession::new(
            self.styles.as_ref(),
            self.fetcher.as_ref(),
            self.decoder.as_ref(),
            options,
        );
        session.capture_svg(node).await
    }
}

/// Create a capturer that fetches over HTTP(S), reads inline styles and
/// decodes raster images.
///
/// [`RasterDecoder`] cannot draw SVG foreign content, so this capturer only
/// supports [`Capturer::to_svg`] until a rendering [`ImageDecoder`] is
/// plugged in with [`Capturer::new`].
#[cfg(feature = "http")]
pub fn new_capturer(config: HttpFetcherConfig) -> Result<Capturer> {
    Ok(Capturer::new(
        Arc::new(InlineStyleEngine),
        Arc::new(HttpFetcher::new(config)?),
        Arc::new(RasterDecoder),
    ))
}
