//! XML serialization of a cloned tree and the SVG `foreignObject` envelope.

use crate::capture::clone::{CloneId, ClonedElement, ClonedNode, ClonedTree};
use crate::dom::{Namespace, SVG_NAMESPACE};

const SVG_DATA_URI_PREFIX: &str = "data:image/svg+xml;charset=utf-8,";

/// Serialize the tree as well-formed XHTML, declaring the XHTML namespace on
/// the root element.
pub fn to_xhtml(tree: &ClonedTree) -> String {
    let mut out = String::new();
    write_node(tree, tree.root(), true, &mut out);
    out
}

/// Escape the characters that would terminate or corrupt the data URI.
pub fn escape_xhtml(markup: &str) -> String {
    markup.replace('#', "%23").replace('\n', "%0A")
}

/// Wrap the tree in an SVG document of `width`x`height` pixels.
pub fn to_svg_document(tree: &ClonedTree, width: u32, height: u32) -> String {
    format!(
        r#"<svg xmlns="{}" width="{}" height="{}"><foreignObject x="0" y="0" width="100%" height="100%">{}</foreignObject></svg>"#,
        SVG_NAMESPACE,
        width,
        height,
        to_xhtml(tree)
    )
}

/// `data:image/svg+xml` URI of an SVG document
pub fn svg_data_uri(document: &str) -> String {
    format!("{}{}", SVG_DATA_URI_PREFIX, escape_xhtml(document))
}

/// Wrap the tree in an SVG envelope of `width`x`height` pixels and return it
/// as a `data:image/svg+xml` URI.
pub fn to_svg_data_uri(tree: &ClonedTree, width: u32, height: u32) -> String {
    svg_data_uri(&to_svg_document(tree, width, height))
}

fn write_node(tree: &ClonedTree, id: CloneId, is_root: bool, out: &mut String) {
    match tree.get(id) {
        Some(ClonedNode::Element(el)) => write_element(tree, el, is_root, out),
        Some(ClonedNode::Text(text)) => out.push_str(&escape_text(text)),
        Some(ClonedNode::Comment(text)) => {
            // "--" is not allowed inside an XML comment
            out.push_str("<!--");
            out.push_str(&text.replace("--", "- -"));
            out.push_str("-->");
        }
        None => {}
    }
}

fn write_element(tree: &ClonedTree, el: &ClonedElement, is_root: bool, out: &mut String) {
    out.push('<');
    out.push_str(&el.tag);

    if is_root && el.attr("xmlns").is_none() {
        push_attr(out, "xmlns", el.namespace.uri());
    }
    for (name, value) in &el.attrs {
        push_attr(out, name, value);
    }
    if !el.style.is_empty() {
        push_attr(out, "style", &el.style.to_css_text());
    }

    if el.is_void() {
        out.push_str(" />");
        // style blocks cannot live inside a void element; keep them next to it
        for child in &el.children {
            if let Some(ClonedNode::Element(style)) = tree.get(*child) {
                if style.is_html("style") {
                    write_element(tree, style, is_root, out);
                }
            }
        }
        return;
    }
    if el.namespace == Namespace::Svg && el.children.is_empty() {
        out.push_str(" />");
        return;
    }

    out.push('>');
    for child in &el.children {
        write_node(tree, *child, false, out);
    }
    out.push_str("</");
    out.push_str(&el.tag);
    out.push('>');
}

fn push_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&escape_attr(value));
    out.push('"');
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(c),
        }
    }
    out
}
