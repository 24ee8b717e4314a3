//! Style declarations, stylesheet rules and the host style-engine seam.
//!
//! The capture pipeline never computes styles itself. It asks a
//! [`StyleEngine`] for the computed declarations of a node (and of its
//! generated `:before`/`:after` content) and copies them verbatim onto the
//! clone.

use std::collections::HashMap;

use cssparser::{
    parse_important, AtRuleParser, AtRuleType, CowRcStr, DeclarationListParser,
    DeclarationParser, ParseError, Parser, ParserInput, QualifiedRuleParser, RuleListParser,
    SourceLocation,
};

use crate::dom::{NodeId, NodeRef};

/// A single `name: value [!important]` declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleDeclaration {
    pub name: String,
    pub value: String,
    pub important: bool,
}

/// An ordered declaration block, the equivalent of a style object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleDeclarations {
    decls: Vec<StyleDeclaration>,
}

impl StyleDeclarations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the body of a declaration block (`color: red; width: 1px`).
    ///
    /// Invalid declarations are dropped and later duplicates replace earlier
    /// ones.
    pub fn parse(text: &str) -> Self {
        let mut input = ParserInput::new(text);
        let mut parser = Parser::new(&mut input);
        declarations_from_block(&mut parser)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.find(name).map(|d| d.value.as_str())
    }

    /// Whether the named declaration carries `!important`
    pub fn priority(&self, name: &str) -> bool {
        self.find(name).map(|d| d.important).unwrap_or(false)
    }

    /// Set a declaration, replacing an existing one in place.
    pub fn set(&mut self, name: &str, value: &str, important: bool) {
        let name = name.to_ascii_lowercase();
        match self.decls.iter_mut().find(|d| d.name == name) {
            Some(existing) => {
                existing.value = value.to_string();
                existing.important = important;
            }
            None => self.decls.push(StyleDeclaration {
                name,
                value: value.to_string(),
                important,
            }),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<StyleDeclaration> {
        let idx = self.decls.iter().position(|d| d.name.eq_ignore_ascii_case(name))?;
        Some(self.decls.remove(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &StyleDeclaration> {
        self.decls.iter()
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Serialize as `name: value; other: value !important;`
    pub fn to_css_text(&self) -> String {
        self.decls
            .iter()
            .map(|d| {
                if d.important {
                    format!("{}: {} !important;", d.name, d.value)
                } else {
                    format!("{}: {};", d.name, d.value)
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn find(&self, name: &str) -> Option<&StyleDeclaration> {
        self.decls.iter().find(|d| d.name.eq_ignore_ascii_case(name))
    }
}

/// Generated-content pseudo-elements the cloner reproduces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PseudoElement {
    Before,
    After,
}

impl PseudoElement {
    pub const ALL: [PseudoElement; 2] = [PseudoElement::Before, PseudoElement::After];

    /// Selector suffix, e.g. `:before`
    pub fn selector(self) -> &'static str {
        match self {
            PseudoElement::Before => ":before",
            PseudoElement::After => ":after",
        }
    }
}

/// Host style/layout engine.
///
/// Implementations are treated as pure reads: the pipeline may call them any
/// number of times for the same node.
pub trait StyleEngine: Send + Sync {
    /// Computed declarations of `node`, or of its generated content when
    /// `pseudo` is set. `None` means the engine has nothing for that node.
    fn computed_style(
        &self,
        node: NodeRef<'_>,
        pseudo: Option<PseudoElement>,
    ) -> Option<StyleDeclarations>;

    /// Natural scroll-box size of `node` in CSS pixels, borders excluded.
    fn scroll_size(&self, _node: NodeRef<'_>) -> Option<(u32, u32)> {
        None
    }
}

/// Style engine for hosts without a cascade: the inline `style` attribute is
/// the computed style and there is no generated content.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineStyleEngine;

impl StyleEngine for InlineStyleEngine {
    fn computed_style(
        &self,
        node: NodeRef<'_>,
        pseudo: Option<PseudoElement>,
    ) -> Option<StyleDeclarations> {
        match pseudo {
            Some(_) => None,
            None => node.is_element().then(|| node.inline_style()),
        }
    }

    fn scroll_size(&self, node: NodeRef<'_>) -> Option<(u32, u32)> {
        let style = node.inline_style();
        let width = style.get("width").and_then(parse_px)?;
        let height = style.get("height").and_then(parse_px)?;
        Some((width.round() as u32, height.round() as u32))
    }
}

/// Style engine backed by values a host computed ahead of time.
///
/// Nodes without a recorded style fall back to their inline style.
#[derive(Debug, Clone, Default)]
pub struct MapStyleEngine {
    styles: HashMap<(NodeId, Option<PseudoElement>), StyleDeclarations>,
    sizes: HashMap<NodeId, (u32, u32)>,
}

impl MapStyleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_style(&mut self, node: NodeId, style: StyleDeclarations) {
        self.styles.insert((node, None), style);
    }

    pub fn set_pseudo_style(
        &mut self,
        node: NodeId,
        pseudo: PseudoElement,
        style: StyleDeclarations,
    ) {
        self.styles.insert((node, Some(pseudo)), style);
    }

    pub fn set_scroll_size(&mut self, node: NodeId, width: u32, height: u32) {
        self.sizes.insert(node, (width, height));
    }
}

impl StyleEngine for MapStyleEngine {
    fn computed_style(
        &self,
        node: NodeRef<'_>,
        pseudo: Option<PseudoElement>,
    ) -> Option<StyleDeclarations> {
        if let Some(style) = self.styles.get(&(node.id(), pseudo)) {
            return Some(style.clone());
        }
        InlineStyleEngine.computed_style(node, pseudo)
    }

    fn scroll_size(&self, node: NodeRef<'_>) -> Option<(u32, u32)> {
        self.sizes.get(&node.id()).copied()
    }
}

/// Parse a `12px` / `12.5px` / `0` length.
pub fn parse_px(value: &str) -> Option<f32> {
    let value = value.trim();
    let number = value.strip_suffix("px").unwrap_or(value);
    number.trim().parse::<f32>().ok().filter(|v| v.is_finite())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CssRuleKind {
    Style,
    FontFace,
    /// Any other at-rule (`@media`, `@import`, ...)
    Other,
}

/// A top-level rule of a stylesheet
#[derive(Debug, Clone, PartialEq)]
pub struct CssRule {
    pub kind: CssRuleKind,
    /// Selector or at-rule prelude
    pub prelude: String,
    /// Declarations of the rule (empty for nested at-rules)
    pub style: StyleDeclarations,
    /// Re-serialized rule text
    pub css_text: String,
}

/// Split stylesheet text into its top-level rules.
pub fn parse_stylesheet(text: &str) -> Vec<CssRule> {
    let mut input = ParserInput::new(text);
    let mut parser = Parser::new(&mut input);
    let mut rules = Vec::new();
    for rule in RuleListParser::new_for_stylesheet(&mut parser, RuleParser).flatten() {
        rules.push(rule);
    }
    rules
}

/// At-rules that end with `;` instead of a block
const STATEMENT_AT_RULES: [&str; 3] = ["charset", "import", "namespace"];

fn declarations_from_block(input: &mut Parser<'_, '_>) -> StyleDeclarations {
    let mut block = StyleDeclarations::new();
    for decl in DeclarationListParser::new(input, DeclParser).flatten() {
        block.set(&decl.name, &decl.value, decl.important);
    }
    block
}

/// Consume the rest of `input` and return its source text.
fn consume_raw<'i>(input: &mut Parser<'i, '_>) -> &'i str {
    let start = input.position();
    while input.next_including_whitespace_and_comments().is_ok() {}
    input.slice_from(start)
}

/// Keeps the raw value text of each declaration, minus a trailing
/// `!important`.
struct DeclParser;

impl<'i> DeclarationParser<'i> for DeclParser {
    type Declaration = StyleDeclaration;
    type Error = ();

    fn parse_value<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
    ) -> Result<StyleDeclaration, ParseError<'i, ()>> {
        let start = input.position();
        let mut end = start;
        let mut important = false;
        while !input.is_exhausted() {
            if input.try_parse(parse_important).is_ok() {
                input.expect_exhausted()?;
                important = true;
                break;
            }
            input.next_including_whitespace_and_comments()?;
            end = input.position();
        }

        let value = input.slice(start..end).trim();
        if value.is_empty() {
            return Err(input.new_custom_error(()));
        }
        Ok(StyleDeclaration {
            name: name.to_ascii_lowercase(),
            value: value.to_string(),
            important,
        })
    }
}

impl<'i> AtRuleParser<'i> for DeclParser {
    type PreludeNoBlock = ();
    type PreludeBlock = ();
    type AtRule = StyleDeclaration;
    type Error = ();
}

struct RuleParser;

impl<'i> QualifiedRuleParser<'i> for RuleParser {
    type Prelude = String;
    type QualifiedRule = CssRule;
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        input: &mut Parser<'i, 't>,
    ) -> Result<String, ParseError<'i, ()>> {
        Ok(consume_raw(input).trim().to_string())
    }

    fn parse_block<'t>(
        &mut self,
        prelude: String,
        _location: SourceLocation,
        input: &mut Parser<'i, 't>,
    ) -> Result<CssRule, ParseError<'i, ()>> {
        let style = declarations_from_block(input);
        Ok(CssRule {
            kind: CssRuleKind::Style,
            css_text: format!("{} {{ {} }}", prelude, style.to_css_text()),
            prelude,
            style,
        })
    }
}

impl<'i> AtRuleParser<'i> for RuleParser {
    type PreludeNoBlock = String;
    type PreludeBlock = (CssRuleKind, String);
    type AtRule = CssRule;
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
    ) -> Result<AtRuleType<String, (CssRuleKind, String)>, ParseError<'i, ()>> {
        let rest = consume_raw(input).trim();
        let prelude = if rest.is_empty() {
            format!("@{}", &*name)
        } else {
            format!("@{} {}", &*name, rest)
        };

        if STATEMENT_AT_RULES.iter().any(|n| name.eq_ignore_ascii_case(n)) {
            return Ok(AtRuleType::WithoutBlock(prelude));
        }
        let kind = if name.eq_ignore_ascii_case("font-face") {
            CssRuleKind::FontFace
        } else {
            CssRuleKind::Other
        };
        Ok(AtRuleType::WithBlock((kind, prelude)))
    }

    fn rule_without_block(&mut self, prelude: String, _location: SourceLocation) -> CssRule {
        CssRule {
            kind: CssRuleKind::Other,
            css_text: format!("{};", prelude),
            prelude,
            style: StyleDeclarations::new(),
        }
    }

    fn parse_block<'t>(
        &mut self,
        (kind, prelude): (CssRuleKind, String),
        _location: SourceLocation,
        input: &mut Parser<'i, 't>,
    ) -> Result<CssRule, ParseError<'i, ()>> {
        if kind == CssRuleKind::FontFace {
            let style = declarations_from_block(input);
            return Ok(CssRule {
                kind,
                css_text: format!("@font-face {{ {} }}", style.to_css_text()),
                prelude,
                style,
            });
        }
        let body = consume_raw(input);
        Ok(CssRule {
            kind,
            css_text: format!("{} {{{}}}", prelude, body),
            prelude,
            style: StyleDeclarations::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declarations_keep_data_urls_and_priority() {
        let style = StyleDeclarations::parse(
            "color: red; background: url(data:image/png;base64,AAA=) no-repeat !important; ;",
        );
        assert_eq!(style.len(), 2);
        assert_eq!(style.get("color"), Some("red"));
        assert_eq!(
            style.get("background"),
            Some("url(data:image/png;base64,AAA=) no-repeat")
        );
        assert!(style.priority("background"));
        assert!(!style.priority("color"));
        assert_eq!(
            style.to_css_text(),
            "color: red; background: url(data:image/png;base64,AAA=) no-repeat !important;"
        );
    }

    #[test]
    fn important_is_read_from_tokens_not_text() {
        let style = StyleDeclarations::parse(
            "content: \"a !important\"; COLOR: Red ! important; /* note */ width: ; margin: 0 !important 1px",
        );
        assert_eq!(style.get("content"), Some("\"a !important\""));
        assert!(!style.priority("content"));
        assert_eq!(style.get("color"), Some("Red"));
        assert!(style.priority("color"));
        assert_eq!(style.get("width"), None);
        assert_eq!(style.get("margin"), None);
        assert_eq!(style.len(), 2);
    }

    #[test]
    fn set_replaces_in_place() {
        let mut style = StyleDeclarations::parse("a: 1; b: 2");
        style.set("A", "3", true);
        assert_eq!(style.to_css_text(), "a: 3 !important; b: 2;");
        assert!(style.remove("b").is_some());
        assert_eq!(style.len(), 1);
    }

    #[test]
    fn stylesheet_rules_are_classified() {
        let css = r#"
            /* fonts */
            @import url("other.css");
            @font-face { font-family: "X;Y"; src: url(fonts/x.woff) format("woff"); }
            body { color: red }
            @media print { body { color: black } }
        "#;
        let rules = parse_stylesheet(css);
        let kinds: Vec<_> = rules.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![CssRuleKind::Other, CssRuleKind::FontFace, CssRuleKind::Style, CssRuleKind::Other]
        );
        let font = &rules[1];
        assert_eq!(font.style.get("font-family"), Some("\"X;Y\""));
        assert_eq!(font.style.get("src"), Some("url(fonts/x.woff) format(\"woff\")"));
        assert!(font.css_text.starts_with("@font-face {"));
        assert!(font.css_text.contains("src: url(fonts/x.woff)"));
    }

    #[test]
    fn parse_px_accepts_plain_numbers() {
        assert_eq!(parse_px("12px"), Some(12.0));
        assert_eq!(parse_px(" 0 "), Some(0.0));
        assert_eq!(parse_px("auto"), None);
    }
}
