//! Element pass of the resource inliner: `<img>` sources, `url(...)`
//! declarations and generated-content rules of every cloned element.

use log::{debug, warn};

use crate::capture::clone::{CloneId, ClonedTree};
use crate::capture::inline::{should_process, Inliner};
use crate::data_url::is_data_url;
use crate::rendering::raster::ImageDecoder;
use crate::{Error, Result};

/// Inline every image reference reachable from the clone.
///
/// Elements are visited one at a time in document order; an element's fetches
/// are issued only after the previous element is fully settled.
pub async fn inline_images(
    tree: &mut ClonedTree,
    inliner: &Inliner<'_>,
    decoder: &dyn ImageDecoder,
    base_url: Option<&str>,
) -> Result<()> {
    for id in tree.preorder() {
        inline_declarations(tree, id, inliner, base_url).await;
        inline_style_block(tree, id, inliner, base_url).await;
        inline_image_source(tree, id, inliner, decoder, base_url).await?;
    }
    Ok(())
}

async fn inline_declarations(
    tree: &mut ClonedTree,
    id: CloneId,
    inliner: &Inliner<'_>,
    base_url: Option<&str>,
) {
    let Some(el) = tree.element(id) else { return };
    let referencing: Vec<(String, String, bool)> = el
        .style
        .iter()
        .filter(|d| should_process(&d.value))
        .map(|d| (d.name.clone(), d.value.clone(), d.important))
        .collect();

    for (name, value, important) in referencing {
        let inlined = inliner.inline_all(&value, base_url).await;
        if let Some(el) = tree.element_mut(id) {
            el.style.set(&name, &inlined, important);
        }
    }
}

/// Rules of a `<style>` block, i.e. generated `:before`/`:after` content
async fn inline_style_block(
    tree: &mut ClonedTree,
    id: CloneId,
    inliner: &Inliner<'_>,
    base_url: Option<&str>,
) {
    let children = match tree.element(id) {
        Some(el) if el.is_html("style") => el.children.clone(),
        _ => return,
    };
    for child in children {
        let Some(css) = tree.text(child).filter(|css| should_process(css)) else {
            continue;
        };
        let css = css.to_string();
        let inlined = inliner.inline_all(&css, base_url).await;
        if let Some(text) = tree.text_mut(child) {
            *text = inlined;
        }
    }
}

async fn inline_image_source(
    tree: &mut ClonedTree,
    id: CloneId,
    inliner: &Inliner<'_>,
    decoder: &dyn ImageDecoder,
    base_url: Option<&str>,
) -> Result<()> {
    let src = match tree.element(id) {
        Some(el) if el.is_html("img") => match el.attr("src") {
            Some(src) if !src.is_empty() && !is_data_url(src) => src.to_string(),
            _ => return Ok(()),
        },
        _ => return Ok(()),
    };

    let resource = inliner.inline_resource(&src, base_url).await;
    let data_url = resource.to_data_url();
    if let Some(el) = tree.element_mut(id) {
        el.set_attr("src", &data_url);
    }
    if resource.payload.is_empty() {
        // fetch already failed and was logged; nothing to wait for
        debug!("image {} left empty", src);
        return Ok(());
    }

    // the element only counts as ready once its new source decodes
    match decoder.decode(&data_url).await {
        Ok(image) => {
            debug!("inlined image {} ({}x{})", src, image.width(), image.height());
            Ok(())
        }
        Err(e) if inliner.policy().placeholder_payload.is_some() => {
            warn!("inlined image {} failed to decode: {}", src, e);
            Ok(())
        }
        Err(e) => Err(Error::DecodeError(format!("image {}: {}", src, e))),
    }
}
