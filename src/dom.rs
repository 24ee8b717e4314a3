//! Host document model: an arena of nodes addressed by [`NodeId`].
//!
//! A [`Document`] is the live visual tree the pipeline snapshots. Hosts either
//! build one node by node or parse HTML with [`Document::parse_html`]. The
//! capture pipeline only ever reads it.

use futures::future::join_all;
use log::{debug, warn};
use scraper::{Html, Selector};
use url::Url;

use crate::fetch::ResourceFetcher;
use crate::style::{parse_stylesheet, CssRule, StyleDeclarations};
use crate::{Error, Result};

pub const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";
pub const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";

/// Handle of a node inside a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Html,
    Svg,
}

impl Namespace {
    pub fn uri(self) -> &'static str {
        match self {
            Namespace::Html => HTML_NAMESPACE,
            Namespace::Svg => SVG_NAMESPACE,
        }
    }
}

/// Current pixel content of a canvas-like raster surface (RGBA8, row-major)
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasPixels {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl CanvasPixels {
    /// A fully transparent surface
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rgba: vec![0; width as usize * height as usize * 4],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementData {
    /// Lowercase local name
    pub tag: String,
    pub namespace: Namespace,
    pub attrs: Vec<(String, String)>,
    /// Live value of form controls, which the markup alone does not carry
    pub value: Option<String>,
    /// Pixel content when the element is a raster surface
    pub canvas: Option<CanvasPixels>,
}

impl ElementData {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Document,
    Element(ElementData),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A stylesheet reachable from the document.
///
/// `rules` is `None` when the rule list cannot be read, e.g. a cross-origin
/// sheet or a linked sheet that was never loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleSheet {
    href: Option<String>,
    rules: Option<Vec<CssRule>>,
}

impl StyleSheet {
    /// An embedded or otherwise readable sheet
    pub fn parsed(href: Option<String>, text: &str) -> Self {
        Self {
            href,
            rules: Some(parse_stylesheet(text)),
        }
    }

    /// A sheet whose rules are not accessible
    pub fn unreadable(href: impl Into<String>) -> Self {
        Self {
            href: Some(href.into()),
            rules: None,
        }
    }

    pub fn href(&self) -> Option<&str> {
        self.href.as_deref()
    }

    /// Capability query: the rule list if it may be read.
    pub fn rules(&self) -> Option<&[CssRule]> {
        self.rules.as_deref()
    }
}

/// A host document: node arena, base URL and stylesheets.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    base_url: Option<Url>,
    style_sheets: Vec<StyleSheet>,
    // Parsed source and pre-order map from scraper nodes, for query_selector
    source: Option<String>,
    preorder: Vec<Option<NodeId>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Document,
                parent: None,
                children: Vec::new(),
            }],
            base_url: None,
            style_sheets: Vec::new(),
            source: None,
            preorder: Vec::new(),
        }
    }

    /// The document node itself
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub fn set_base_url(&mut self, url: &str) -> Result<()> {
        let parsed = Url::parse(url)
            .map_err(|e| Error::InvalidOptions(format!("invalid base URL {}: {}", url, e)))?;
        self.base_url = Some(parsed);
        Ok(())
    }

    pub fn get(&self, id: NodeId) -> Option<NodeRef<'_>> {
        (id.0 < self.nodes.len()).then_some(NodeRef { doc: self, id })
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let tag = tag.to_ascii_lowercase();
        let canvas = (tag == "canvas").then(|| CanvasPixels::blank(300, 150));
        self.push(NodeData::Element(ElementData {
            tag,
            namespace: Namespace::Html,
            attrs: Vec::new(),
            value: None,
            canvas,
        }))
    }

    pub fn create_svg_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeData::Element(ElementData {
            tag: tag.to_string(),
            namespace: Namespace::Svg,
            attrs: Vec::new(),
            value: None,
            canvas: None,
        }))
    }

    /// A `<canvas>` with transparent content of the given size
    pub fn create_canvas(&mut self, width: u32, height: u32) -> NodeId {
        let id = self.create_element("canvas");
        if let Some(el) = self.element_mut(id) {
            el.attrs.push(("width".into(), width.to_string()));
            el.attrs.push(("height".into(), height.to_string()));
            el.canvas = Some(CanvasPixels::blank(width, height));
        }
        id
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Comment(text.to_string()))
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if parent.0 >= self.nodes.len() || child.0 >= self.nodes.len() {
            return Err(Error::InvalidNode(format!("{:?} -> {:?}", parent, child)));
        }
        if parent == child || self.is_ancestor(child, parent) {
            return Err(Error::InvalidNode(format!(
                "appending {:?} to {:?} would create a cycle",
                child, parent
            )));
        }
        if let Some(old) = self.nodes[child.0].parent.take() {
            self.nodes[old.0].children.retain(|c| *c != child);
        }
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        Ok(())
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<()> {
        let el = self
            .element_mut(id)
            .ok_or_else(|| Error::NotAnElement(format!("{:?}", id)))?;
        match el.attrs.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value.to_string(),
            None => el.attrs.push((name.to_string(), value.to_string())),
        }
        Ok(())
    }

    /// Record the live value of a form control (what the user typed).
    pub fn set_value(&mut self, id: NodeId, value: &str) -> Result<()> {
        let el = self
            .element_mut(id)
            .ok_or_else(|| Error::NotAnElement(format!("{:?}", id)))?;
        el.value = Some(value.to_string());
        Ok(())
    }

    pub fn set_canvas_pixels(&mut self, id: NodeId, pixels: CanvasPixels) -> Result<()> {
        if pixels.rgba.len() != pixels.width as usize * pixels.height as usize * 4 {
            return Err(Error::InvalidOptions(format!(
                "canvas buffer of {} bytes does not match {}x{}",
                pixels.rgba.len(),
                pixels.width,
                pixels.height
            )));
        }
        let el = self
            .element_mut(id)
            .ok_or_else(|| Error::NotAnElement(format!("{:?}", id)))?;
        el.canvas = Some(pixels);
        Ok(())
    }

    pub fn add_style_sheet(&mut self, sheet: StyleSheet) {
        self.style_sheets.push(sheet);
    }

    pub fn style_sheets(&self) -> &[StyleSheet] {
        &self.style_sheets
    }

    /// First element with the given tag, in document order
    pub fn find_by_tag(&self, tag: &str) -> Option<NodeId> {
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.0];
            if let NodeData::Element(el) = &node.data {
                if el.tag.eq_ignore_ascii_case(tag) {
                    return Some(id);
                }
            }
            stack.extend(node.children.iter().rev().copied());
        }
        None
    }

    pub fn body(&self) -> Option<NodeId> {
        self.find_by_tag("body")
    }

    /// Parse an HTML document. `<style>` blocks become readable sheets and
    /// `<link rel="stylesheet">` references become unreadable sheets until
    /// [`Document::load_linked_stylesheets`] fetches them.
    pub fn parse_html(html: &str, base_url: Option<&str>) -> Result<Self> {
        let mut doc = Document::new();
        if let Some(base) = base_url {
            doc.set_base_url(base)?;
        }

        let parsed = Html::parse_document(html);
        let root = doc.root();
        let mut preorder = Vec::new();
        for child in parsed.tree.root().children() {
            doc.import(child, root, &mut preorder);
        }
        // The scraper document node itself sits at index 0
        preorder.insert(0, Some(root));
        doc.preorder = preorder;
        doc.source = Some(html.to_string());
        doc.collect_style_sheets();
        debug!(
            "parsed document: {} nodes, {} stylesheets",
            doc.nodes.len(),
            doc.style_sheets.len()
        );
        Ok(doc)
    }

    fn import(
        &mut self,
        node: ego_tree::NodeRef<'_, scraper::Node>,
        parent: NodeId,
        preorder: &mut Vec<Option<NodeId>>,
    ) {
        let created = match node.value() {
            scraper::Node::Element(el) => {
                let tag = el.name().to_string();
                let namespace = if &*el.name.ns == SVG_NAMESPACE {
                    Namespace::Svg
                } else {
                    Namespace::Html
                };
                let attrs: Vec<(String, String)> = el
                    .attrs()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                let canvas = (namespace == Namespace::Html && tag == "canvas").then(|| {
                    let dim = |name: &str, default: u32| {
                        el.attr(name)
                            .and_then(|v| v.trim().parse::<u32>().ok())
                            .unwrap_or(default)
                    };
                    CanvasPixels::blank(dim("width", 300), dim("height", 150))
                });
                let value = match tag.as_str() {
                    "input" => el.attr("value").map(str::to_string),
                    _ => None,
                };
                Some(self.push(NodeData::Element(ElementData {
                    tag,
                    namespace,
                    attrs,
                    value,
                    canvas,
                })))
            }
            scraper::Node::Text(text) => {
                let text: &str = text;
                Some(self.push(NodeData::Text(text.to_string())))
            }
            scraper::Node::Comment(comment) => {
                let comment: &str = comment;
                Some(self.push(NodeData::Comment(comment.to_string())))
            }
            _ => None,
        };
        preorder.push(created);

        let attach_to = match created {
            Some(id) => {
                // parent and child both come from this arena
                let _ = self.append_child(parent, id);
                id
            }
            None => parent,
        };
        for child in node.children() {
            self.import(child, attach_to, preorder);
        }

        if let Some(id) = created {
            self.finish_form_control(id);
        }
    }

    // A parsed <textarea> holds its value as text content
    fn finish_form_control(&mut self, id: NodeId) {
        let is_textarea = matches!(
            &self.nodes[id.0].data,
            NodeData::Element(el) if el.tag == "textarea" && el.namespace == Namespace::Html
        );
        if is_textarea {
            let text = self.get(id).map(|n| n.text_content()).unwrap_or_default();
            if let Some(el) = self.element_mut(id) {
                el.value = Some(text);
            }
        }
    }

    fn collect_style_sheets(&mut self) {
        let mut sheets = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.0];
            if let NodeData::Element(el) = &node.data {
                if el.namespace == Namespace::Html && el.tag == "style" {
                    let text = self.get(id).map(|n| n.text_content()).unwrap_or_default();
                    sheets.push(StyleSheet::parsed(None, &text));
                } else if el.namespace == Namespace::Html
                    && el.tag == "link"
                    && el
                        .attr("rel")
                        .map(|r| r.split_whitespace().any(|t| t.eq_ignore_ascii_case("stylesheet")))
                        .unwrap_or(false)
                {
                    if let Some(href) = el.attr("href") {
                        sheets.push(StyleSheet::unreadable(self.resolve(href)));
                    }
                }
            }
            stack.extend(node.children.iter().rev().copied());
        }
        self.style_sheets.extend(sheets);
    }

    /// Fetch every linked stylesheet that has no readable rules yet.
    ///
    /// Fetches run concurrently. A sheet that fails to load stays unreadable
    /// and is skipped by the font harvester.
    pub async fn load_linked_stylesheets(&mut self, fetcher: &dyn ResourceFetcher) {
        let pending: Vec<(usize, String)> = self
            .style_sheets
            .iter()
            .enumerate()
            .filter(|(_, s)| s.rules.is_none())
            .filter_map(|(i, s)| s.href.clone().map(|h| (i, h)))
            .collect();

        let results = join_all(pending.iter().map(|(_, href)| fetcher.fetch(href))).await;
        for ((idx, href), result) in pending.into_iter().zip(results) {
            match result {
                Ok(bytes) => {
                    let text = String::from_utf8_lossy(&bytes);
                    self.style_sheets[idx].rules = Some(parse_stylesheet(&text));
                }
                Err(e) => warn!("Failed to load stylesheet {}: {}", href, e),
            }
        }
    }

    /// First element matching a CSS selector. Only available for documents
    /// created with [`Document::parse_html`].
    pub fn query_selector(&self, selectors: &str) -> Result<Option<NodeId>> {
        let source = self.source.as_deref().ok_or_else(|| {
            Error::InvalidOptions("query_selector needs a document parsed from HTML".into())
        })?;
        let selector = Selector::parse(selectors)
            .map_err(|e| Error::InvalidSelector(format!("{}: {:?}", selectors, e)))?;
        let parsed = Html::parse_document(source);
        let Some(found) = parsed.select(&selector).next() else {
            return Ok(None);
        };
        let position = parsed
            .tree
            .root()
            .descendants()
            .position(|n| n.id() == found.id());
        Ok(position.and_then(|p| self.preorder.get(p).copied().flatten()))
    }

    fn resolve(&self, href: &str) -> String {
        match &self.base_url {
            Some(base) => base
                .join(href)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| href.to_string()),
            None => href.to_string(),
        }
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        NodeId(self.nodes.len() - 1)
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match self.nodes.get_mut(id.0).map(|n| &mut n.data) {
            Some(NodeData::Element(el)) => Some(el),
            _ => None,
        }
    }

    fn is_ancestor(&self, candidate: NodeId, of: NodeId) -> bool {
        let mut cur = self.nodes[of.0].parent;
        while let Some(p) = cur {
            if p == candidate {
                return true;
            }
            cur = self.nodes[p.0].parent;
        }
        false
    }
}

/// Borrowed view of one node
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a> {
    doc: &'a Document,
    id: NodeId,
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn document(&self) -> &'a Document {
        self.doc
    }

    pub fn data(&self) -> &'a NodeData {
        &self.doc.nodes[self.id.0].data
    }

    pub fn element(&self) -> Option<&'a ElementData> {
        match self.data() {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn is_element(&self) -> bool {
        self.element().is_some()
    }

    pub fn tag(&self) -> Option<&'a str> {
        self.element().map(|el| el.tag.as_str())
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.element().and_then(|el| el.attr(name))
    }

    /// Declarations of the inline `style` attribute
    pub fn inline_style(&self) -> StyleDeclarations {
        self.attr("style")
            .map(StyleDeclarations::parse)
            .unwrap_or_default()
    }

    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.doc.nodes[self.id.0]
            .parent
            .and_then(|p| self.doc.get(p))
    }

    /// Child handles in order, including any that do not resolve
    pub fn child_ids(&self) -> &'a [NodeId] {
        &self.doc.nodes[self.id.0].children
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let doc = self.doc;
        self.child_ids().iter().filter_map(move |c| doc.get(*c))
    }

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![*self];
        while let Some(node) = stack.pop() {
            if let NodeData::Text(t) = node.data() {
                out.push_str(t);
            }
            let children: Vec<_> = node.children().collect();
            stack.extend(children.into_iter().rev());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html><head>
<style>@font-face { font-family: F; src: url(f.woff); }</style>
<link rel="stylesheet" href="/css/site.css">
</head><body>
<div id="card" class="c"><p>Hi <b>there</b></p><canvas width="4" height="2"></canvas></div>
<textarea id="t">typed</textarea>
<svg><rect width="10" height="5"/></svg>
</body></html>"#;

    #[test]
    fn parse_html_builds_tree_and_sheets() {
        let doc = Document::parse_html(PAGE, Some("https://example.com/page/")).unwrap();
        let card = doc.query_selector("#card").unwrap().expect("card present");
        let card = doc.get(card).unwrap();
        assert_eq!(card.tag(), Some("div"));
        assert_eq!(card.attr("class"), Some("c"));
        assert_eq!(card.text_content(), "Hi there");

        let canvas = card.children().nth(1).unwrap();
        let pixels = canvas.element().unwrap().canvas.as_ref().unwrap();
        assert_eq!((pixels.width, pixels.height), (4, 2));

        let sheets = doc.style_sheets();
        assert_eq!(sheets.len(), 2);
        assert!(sheets[0].rules().is_some());
        assert_eq!(sheets[1].href(), Some("https://example.com/css/site.css"));
        assert!(sheets[1].rules().is_none());

        let rect = doc.query_selector("rect").unwrap().unwrap();
        assert_eq!(doc.get(rect).unwrap().element().unwrap().namespace, Namespace::Svg);

        let t = doc.query_selector("#t").unwrap().unwrap();
        assert_eq!(doc.get(t).unwrap().element().unwrap().value.as_deref(), Some("typed"));
    }

    #[test]
    fn query_selector_requires_parsed_source() {
        let doc = Document::new();
        assert!(doc.query_selector("div").is_err());
        let doc = Document::parse_html("<p>x</p>", None).unwrap();
        assert!(matches!(doc.query_selector("p[").unwrap_err(), Error::InvalidSelector(_)));
        assert_eq!(doc.query_selector("span").unwrap(), None);
    }

    #[test]
    fn append_child_rejects_cycles() {
        let mut doc = Document::new();
        let a = doc.create_element("div");
        let b = doc.create_element("div");
        doc.append_child(a, b).unwrap();
        assert!(doc.append_child(b, a).is_err());
        assert!(doc.append_child(a, a).is_err());
        let text = doc.create_text("x");
        assert!(doc.set_attribute(text, "id", "y").is_err());
    }
}
