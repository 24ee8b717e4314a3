//! Stylesheet harvester: collects `@font-face` rules and embeds their fonts.

use futures::future::join_all;
use log::{debug, warn};

use crate::capture::inline::{read_urls, Inliner};
use crate::dom::Document;
use crate::style::{CssRule, CssRuleKind};

/// Web-font rules of every readable stylesheet, fonts inlined, joined by
/// newlines. Unreadable sheets are skipped.
pub async fn harvest_font_faces(doc: &Document, inliner: &Inliner<'_>) -> String {
    let document_base = doc.base_url().map(|u| u.to_string());
    let mut pending: Vec<(&CssRule, Option<String>)> = Vec::new();

    for sheet in doc.style_sheets() {
        let Some(rules) = sheet.rules() else {
            warn!(
                "Error while reading CSS rules from {}",
                sheet.href().unwrap_or("<inline>")
            );
            continue;
        };
        let base = sheet
            .href()
            .map(str::to_string)
            .or_else(|| document_base.clone());
        pending.extend(
            rules
                .iter()
                .filter(|rule| is_remote_font_face(rule))
                .map(|rule| (rule, base.clone())),
        );
    }

    debug!("harvesting {} font-face rules", pending.len());
    let inlined = join_all(
        pending
            .iter()
            .map(|(rule, base)| inliner.inline_all(&rule.css_text, base.as_deref())),
    )
    .await;
    inlined.join("\n")
}

fn is_remote_font_face(rule: &CssRule) -> bool {
    rule.kind == CssRuleKind::FontFace
        && rule
            .style
            .get("src")
            .map(|src| !read_urls(src).is_empty())
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::inline::FetchPolicy;
    use crate::dom::StyleSheet;
    use crate::fetch::StaticFetcher;

    #[tokio::test]
    async fn only_remote_font_faces_are_harvested() {
        let mut doc = Document::new();
        doc.add_style_sheet(StyleSheet::parsed(
            Some("https://cdn.test/css/site.css".into()),
            r#"
            body { background: url(bg.png) }
            @font-face { font-family: A; src: url("../fonts/a.woff2") format("woff2") }
            @font-face { font-family: B; src: url(data:application/font-woff;base64,AA==) }
            @font-face { font-family: C; src: local(Arial) }
            "#,
        ));
        doc.add_style_sheet(StyleSheet::unreadable("https://other.test/x.css"));

        let fetcher = StaticFetcher::new().with("https://cdn.test/fonts/a.woff2", b"woff".to_vec());
        let inliner = Inliner::new(&fetcher, FetchPolicy::default());
        let css = harvest_font_faces(&doc, &inliner).await;

        assert_eq!(fetcher.request_count(), 1);
        assert!(css.starts_with("@font-face {"), "{}", css);
        assert!(css.contains("font-family: A"));
        assert!(css.contains(r#"url("data:application/font-woff;base64,d29mZg==")"#));
        assert!(!css.contains("font-family: B"));
        assert!(!css.contains("font-family: C"));
        assert!(!css.contains('\n'));
    }

    #[tokio::test]
    async fn embedded_sheets_resolve_against_the_document() {
        let mut doc = Document::new();
        doc.set_base_url("http://site/dir/page.html").unwrap();
        doc.add_style_sheet(StyleSheet::parsed(
            None,
            "@font-face { font-family: A; src: url(a.ttf) } @font-face { font-family: B; src: url(b.ttf) }",
        ));
        let fetcher = StaticFetcher::new()
            .with("http://site/dir/a.ttf", b"a".to_vec())
            .with("http://site/dir/b.ttf", b"b".to_vec());
        let inliner = Inliner::new(&fetcher, FetchPolicy::default());

        let css = harvest_font_faces(&doc, &inliner).await;
        let lines: Vec<_> = css.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("data:application/font-truetype;base64,YQ=="));
        assert!(lines[1].contains("data:application/font-truetype;base64,Yg=="));
    }
}
