//! Capture pipeline: clone, inline resources and fonts, serialize.
//!
//! One [`CaptureSession`] drives one capture. It owns everything that must
//! not leak between captures: the marker-class counter and, through the
//! [`inline::Inliner`] it creates, the fetch cache.

pub mod clone;
pub mod fonts;
pub mod images;
pub mod inline;
pub mod serialize;

use log::{debug, info};
use rand::Rng;

use crate::dom::NodeRef;
use crate::fetch::ResourceFetcher;
use crate::rendering::raster::ImageDecoder;
use crate::style::{parse_px, StyleEngine};
use crate::{CaptureOptions, Error, Result};

use self::clone::{clone_node, ClonedTree};
use self::inline::Inliner;

/// Generates marker class names unique within one capture
#[derive(Debug, Default)]
pub struct UidGenerator {
    index: u64,
}

impl UidGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `u` + four random base-36 characters + a per-session counter
    pub fn next_uid(&mut self) -> String {
        const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let mut rng = rand::thread_rng();
        let suffix: String = (0..4)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        let uid = format!("u{}{}", suffix, self.index);
        self.index += 1;
        uid
    }
}

/// Serialized capture: the SVG document, its `image/svg+xml` data URI and its
/// pixel size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvgCapture {
    pub markup: String,
    pub data_uri: String,
    pub width: u32,
    pub height: u32,
}

/// State and collaborators of a single capture
pub struct CaptureSession<'a> {
    styles: &'a dyn StyleEngine,
    fetcher: &'a dyn ResourceFetcher,
    decoder: &'a dyn ImageDecoder,
    options: &'a CaptureOptions,
    uids: UidGenerator,
}

impl<'a> CaptureSession<'a> {
    pub fn new(
        styles: &'a dyn StyleEngine,
        fetcher: &'a dyn ResourceFetcher,
        decoder: &'a dyn ImageDecoder,
        options: &'a CaptureOptions,
    ) -> Self {
        Self {
            styles,
            fetcher,
            decoder,
            options,
            uids: UidGenerator::new(),
        }
    }

    /// Run the pipeline up to the vector artifact.
    pub async fn capture_svg(&mut self, node: NodeRef<'_>) -> Result<SvgCapture> {
        self.options.validate()?;
        let doc = node.document();
        let base_url = doc.base_url().map(|u| u.to_string());

        let mut tree = clone_node(
            node,
            self.styles,
            self.options.node_filter.as_ref(),
            &mut self.uids,
        )?;
        // overrides go in first so their url(...) values are inlined as well
        self.apply_overrides(&mut tree);

        let inliner = Inliner::new(self.fetcher, self.options.fetch_policy());
        let (font_css, inlined) = futures::join!(
            fonts::harvest_font_faces(doc, &inliner),
            images::inline_images(&mut tree, &inliner, self.decoder, base_url.as_deref()),
        );
        inlined?;

        let root = tree.root();
        tree.append_style_block(root, &font_css);

        let (width, height) = self.capture_size(node)?;
        info!("captured {:?} at {}x{}", node.id(), width, height);
        let markup = serialize::to_svg_document(&tree, width, height);
        Ok(SvgCapture {
            data_uri: serialize::svg_data_uri(&markup),
            markup,
            width,
            height,
        })
    }

    fn apply_overrides(&self, tree: &mut ClonedTree) {
        let options = self.options;
        let root = tree.root();
        let Some(root) = tree.element_mut(root) else {
            return;
        };
        if let Some(color) = &options.background_color {
            root.style.set("background-color", color, false);
        }
        if let Some(width) = options.width {
            root.style.set("width", &format!("{}px", width), false);
        }
        if let Some(height) = options.height {
            root.style.set("height", &format!("{}px", height), false);
        }
        for (name, value) in &options.extra_style {
            root.style.set(name, value, false);
        }
    }

    /// Requested size, else the natural scroll-box size plus borders.
    fn capture_size(&self, node: NodeRef<'_>) -> Result<(u32, u32)> {
        if let (Some(w), Some(h)) = (self.options.width, self.options.height) {
            return Ok((w, h));
        }

        let (scroll_w, scroll_h) = self.styles.scroll_size(node).ok_or_else(|| {
            Error::InvalidOptions(
                "capture size is not set and the style engine reports no natural size".into(),
            )
        })?;
        let style = self
            .styles
            .computed_style(node, None)
            .unwrap_or_else(|| node.inline_style());
        let border = |name: &str| {
            style
                .get(name)
                .and_then(parse_px)
                .map(|v| v.round().max(0.0) as u32)
                .unwrap_or(0)
        };
        let natural_w = scroll_w + border("border-left-width") + border("border-right-width");
        let natural_h = scroll_h + border("border-top-width") + border("border-bottom-width");
        debug!("natural size of {:?}: {}x{}", node.id(), natural_w, natural_h);

        Ok((
            self.options.width.unwrap_or(natural_w),
            self.options.height.unwrap_or(natural_h),
        ))
    }
}
