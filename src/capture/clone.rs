//! Cloner: deep-copies a live node into a detached, owned tree.
//!
//! Every cloned element carries its full computed style as explicit
//! declarations, so the copy renders the same once detached from the
//! original cascade. Generated `:before`/`:after` content is reproduced with
//! marker classes and scoped `<style>` children.

use base64::Engine as _;
use image::{codecs::png::PngEncoder, ColorType, ImageEncoder};
use log::{debug, warn};

use crate::capture::UidGenerator;
use crate::data_url::make_data_url;
use crate::dom::{CanvasPixels, Namespace, NodeData, NodeId, NodeRef};
use crate::style::{PseudoElement, StyleDeclarations, StyleEngine};
use crate::{Error, NodeFilter, Result};

/// HTML elements that never have content
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Handle of a node inside a [`ClonedTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloneId(usize);

#[derive(Debug, Clone, PartialEq)]
pub struct ClonedElement {
    pub tag: String,
    pub namespace: Namespace,
    /// Attributes other than `style`, in source order
    pub attrs: Vec<(String, String)>,
    pub style: StyleDeclarations,
    pub children: Vec<CloneId>,
}

impl ClonedElement {
    fn new(tag: &str, namespace: Namespace) -> Self {
        Self {
            tag: tag.to_string(),
            namespace,
            attrs: Vec::new(),
            style: StyleDeclarations::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: &str) {
        match self.attrs.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some(slot) => slot.1 = value.to_string(),
            None => self.attrs.push((name.to_string(), value.to_string())),
        }
    }

    pub fn add_class(&mut self, class: &str) {
        let classes = match self.attr("class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing, class),
            _ => class.to_string(),
        };
        self.set_attr("class", &classes);
    }

    pub fn is_html(&self, tag: &str) -> bool {
        self.namespace == Namespace::Html && self.tag == tag
    }

    pub fn is_void(&self) -> bool {
        self.namespace == Namespace::Html && VOID_ELEMENTS.contains(&self.tag.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClonedNode {
    Element(ClonedElement),
    Text(String),
    Comment(String),
}

/// Owned arena holding one cloned subtree; dropped as a whole.
#[derive(Debug, Clone)]
pub struct ClonedTree {
    nodes: Vec<ClonedNode>,
    root: CloneId,
}

impl ClonedTree {
    pub fn root(&self) -> CloneId {
        self.root
    }

    pub fn get(&self, id: CloneId) -> Option<&ClonedNode> {
        self.nodes.get(id.0)
    }

    pub fn element(&self, id: CloneId) -> Option<&ClonedElement> {
        match self.nodes.get(id.0) {
            Some(ClonedNode::Element(el)) => Some(el),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: CloneId) -> Option<&mut ClonedElement> {
        match self.nodes.get_mut(id.0) {
            Some(ClonedNode::Element(el)) => Some(el),
            _ => None,
        }
    }

    pub fn text(&self, id: CloneId) -> Option<&str> {
        match self.nodes.get(id.0) {
            Some(ClonedNode::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn text_mut(&mut self, id: CloneId) -> Option<&mut String> {
        match self.nodes.get_mut(id.0) {
            Some(ClonedNode::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// Append a `<style>` element holding `css` to `parent`.
    pub fn append_style_block(&mut self, parent: CloneId, css: &str) {
        let text = self.push(ClonedNode::Text(css.to_string()));
        let mut style = ClonedElement::new("style", Namespace::Html);
        style.children.push(text);
        let style = self.push(ClonedNode::Element(style));
        if let Some(el) = self.element_mut(parent) {
            el.children.push(style);
        }
    }

    /// Every node id in document (pre-)order
    pub fn preorder(&self) -> Vec<CloneId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(el) = self.element(id) {
                stack.extend(el.children.iter().rev().copied());
            }
        }
        out
    }

    fn push(&mut self, node: ClonedNode) -> CloneId {
        self.nodes.push(node);
        CloneId(self.nodes.len() - 1)
    }
}

/// Clone `node` and its descendants.
///
/// The root is always cloned; descendants rejected by `filter` are dropped
/// together with their subtree.
pub fn clone_node(
    node: NodeRef<'_>,
    styles: &dyn StyleEngine,
    filter: Option<&NodeFilter>,
    uids: &mut UidGenerator,
) -> Result<ClonedTree> {
    if !node.is_element() {
        return Err(Error::NotAnElement(format!(
            "capture root {:?} is not an element",
            node.id()
        )));
    }

    let mut cloner = Cloner {
        styles,
        filter,
        uids,
        nodes: Vec::new(),
    };
    let root = cloner.clone_subtree(node);
    debug!("cloned {} nodes from {:?}", cloner.nodes.len(), node.id());
    Ok(ClonedTree {
        nodes: cloner.nodes,
        root,
    })
}

struct Cloner<'a, 'u> {
    styles: &'a dyn StyleEngine,
    filter: Option<&'a NodeFilter>,
    uids: &'u mut UidGenerator,
    nodes: Vec<ClonedNode>,
}

impl Cloner<'_, '_> {
    fn push(&mut self, node: ClonedNode) -> CloneId {
        self.nodes.push(node);
        CloneId(self.nodes.len() - 1)
    }

    fn accepts(&self, node: NodeRef<'_>) -> bool {
        self.filter.map(|f| f.accepts(node)).unwrap_or(true)
    }

    fn clone_subtree(&mut self, node: NodeRef<'_>) -> CloneId {
        let el = match node.data() {
            NodeData::Element(el) => el,
            NodeData::Text(text) => return self.push(ClonedNode::Text(text.clone())),
            NodeData::Comment(text) => return self.push(ClonedNode::Comment(text.clone())),
            NodeData::Document => return self.placeholder(node.id()),
        };

        let mut clone = match &el.canvas {
            Some(pixels) => snapshot_canvas(pixels),
            None => {
                let mut shallow = ClonedElement::new(&el.tag, el.namespace);
                shallow.attrs = el
                    .attrs
                    .iter()
                    .filter(|(k, _)| !k.eq_ignore_ascii_case("style"))
                    .cloned()
                    .collect();
                shallow
            }
        };

        if el.canvas.is_none() {
            for child_id in node.child_ids() {
                let child = match node.document().get(*child_id) {
                    Some(child) => child,
                    None => {
                        let id = self.placeholder(*child_id);
                        clone.children.push(id);
                        continue;
                    }
                };
                if !self.accepts(child) {
                    continue;
                }
                let id = self.clone_subtree(child);
                clone.children.push(id);
            }
        }

        clone.style = self
            .styles
            .computed_style(node, None)
            .unwrap_or_else(|| node.inline_style());

        self.copy_user_input(node, &mut clone);
        self.clone_pseudo_elements(node, &mut clone);
        fix_svg(&mut clone);

        self.push(ClonedNode::Element(clone))
    }

    // Malformed or disconnected nodes render as nothing
    fn placeholder(&mut self, id: NodeId) -> CloneId {
        warn!("cloning unreadable node {:?} as an empty placeholder", id);
        self.push(ClonedNode::Text(String::new()))
    }

    fn copy_user_input(&mut self, node: NodeRef<'_>, clone: &mut ClonedElement) {
        let Some(el) = node.element() else { return };
        let Some(value) = &el.value else { return };
        if clone.is_html("textarea") {
            let text = self.push(ClonedNode::Text(value.clone()));
            clone.children = vec![text];
        } else if clone.is_html("input") {
            clone.set_attr("value", value);
        }
    }

    fn clone_pseudo_elements(&mut self, node: NodeRef<'_>, clone: &mut ClonedElement) {
        for pseudo in PseudoElement::ALL {
            let Some(style) = self.styles.computed_style(node, Some(pseudo)) else {
                continue;
            };
            let content = style.get("content").unwrap_or("").trim();
            if content.is_empty() || content == "none" {
                continue;
            }

            let class = self.uids.next_uid();
            clone.add_class(&class);
            let rule = format!(".{}{}{{{}}}", class, pseudo.selector(), style.to_css_text());
            let text = self.push(ClonedNode::Text(rule));
            let mut block = ClonedElement::new("style", Namespace::Html);
            block.children.push(text);
            let block = self.push(ClonedNode::Element(block));
            clone.children.push(block);
        }
    }
}

/// A canvas clones as a static `<img>` of its current pixels.
fn snapshot_canvas(pixels: &CanvasPixels) -> ClonedElement {
    let mut img = ClonedElement::new("img", Namespace::Html);
    let mut png = Vec::new();
    let encoded = PngEncoder::new(&mut png).write_image(
        &pixels.rgba,
        pixels.width,
        pixels.height,
        ColorType::Rgba8.into(),
    );
    match encoded {
        Ok(()) => {
            let payload = base64::engine::general_purpose::STANDARD.encode(&png);
            img.set_attr("src", &make_data_url("image/png", &payload));
        }
        Err(e) => warn!("cannot snapshot canvas content: {}", e),
    }
    img
}

fn fix_svg(clone: &mut ClonedElement) {
    if clone.namespace != Namespace::Svg {
        return;
    }
    clone.set_attr("xmlns", Namespace::Svg.uri());
    if clone.tag == "rect" {
        for dim in ["width", "height"] {
            if let Some(value) = clone.attr(dim).map(str::to_string) {
                clone.style.set(dim, &value, false);
            }
        }
    }
}
