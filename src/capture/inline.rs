//! Resource inliner: rewrites `url(...)` references into `data:` URLs.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use futures::future::join_all;
use log::{debug, error};
use regex::Regex;
use url::Url;

use crate::data_url::{self, is_data_url};
use crate::fetch::ResourceFetcher;
use crate::Error;

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"url\(['"]?([^'"]+?)['"]?\)"#).expect("url pattern is valid")
    })
}

/// Whether `text` contains any `url(...)` reference at all
pub fn should_process(text: &str) -> bool {
    url_pattern().is_match(text)
}

/// Unique non-`data:` references in order of first appearance
pub fn read_urls(text: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for caps in url_pattern().captures_iter(text) {
        let url = &caps[1];
        if !is_data_url(url) && !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    }
    urls
}

/// Resolve `reference` against `base` with standard relative-URL rules.
pub fn resolve_url(reference: &str, base: Option<&str>) -> String {
    base.and_then(|b| Url::parse(b).ok())
        .and_then(|b| b.join(reference).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| reference.to_string())
}

/// A resource in self-contained form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinedResource {
    pub mime: String,
    /// Base64 payload; empty when the fetch failed and no placeholder is set
    pub payload: String,
}

impl InlinedResource {
    pub fn to_data_url(&self) -> String {
        data_url::make_data_url(&self.mime, &self.payload)
    }
}

/// Fetch policy shared by every stage of one capture
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Base64 payload substituted for failed fetches
    pub placeholder_payload: Option<String>,
    pub cache_bust: bool,
    pub timeout: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            placeholder_payload: None,
            cache_bust: false,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Inlines references through a fetcher, caching payloads per source URL.
///
/// One inliner lives exactly as long as one capture; the cache is never
/// shared between captures.
pub struct Inliner<'a> {
    fetcher: &'a dyn ResourceFetcher,
    policy: FetchPolicy,
    cache: Mutex<HashMap<String, String>>,
}

impl<'a> Inliner<'a> {
    pub fn new(fetcher: &'a dyn ResourceFetcher, policy: FetchPolicy) -> Self {
        Self {
            fetcher,
            policy,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// Rewrite every external `url(...)` in `css_text` into a data URL.
    ///
    /// References are fetched concurrently; rewrites are applied in the order
    /// the references first appear.
    pub async fn inline_all(&self, css_text: &str, base_url: Option<&str>) -> String {
        if !should_process(css_text) {
            return css_text.to_string();
        }
        let urls = read_urls(css_text);
        if urls.is_empty() {
            return css_text.to_string();
        }

        let inlined = join_all(urls.iter().map(|u| self.inline_resource(u, base_url))).await;

        let mut text = css_text.to_string();
        for (reference, resource) in urls.iter().zip(inlined) {
            text = replace_reference(&text, reference, &resource.to_data_url());
        }
        text
    }

    /// Fetch and encode one reference. Never fails: failures yield the
    /// placeholder payload or an empty one.
    pub async fn inline_resource(
        &self,
        reference: &str,
        base_url: Option<&str>,
    ) -> InlinedResource {
        let url = resolve_url(reference, base_url);
        let payload = self.get_and_encode(&url).await;
        InlinedResource {
            mime: data_url::mime_type(reference).to_string(),
            payload,
        }
    }

    async fn get_and_encode(&self, url: &str) -> String {
        if let Some(hit) = self.cached(url) {
            return hit;
        }

        let request_url = if self.policy.cache_bust {
            cache_busted(url)
        } else {
            url.to_string()
        };

        let fetched =
            tokio::time::timeout(self.policy.timeout, self.fetcher.fetch(&request_url)).await;
        let payload = match fetched {
            Ok(Ok(bytes)) => base64::engine::general_purpose::STANDARD.encode(bytes),
            Ok(Err(e)) => self.fallback(&request_url, &e),
            Err(_) => self.fallback(
                &request_url,
                &Error::Timeout(self.policy.timeout.as_millis() as u64),
            ),
        };

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(url.to_string(), payload.clone());
        }
        payload
    }

    fn cached(&self, url: &str) -> Option<String> {
        self.cache.lock().ok().and_then(|c| c.get(url).cloned())
    }

    fn fallback(&self, url: &str, err: &Error) -> String {
        match &self.policy.placeholder_payload {
            Some(placeholder) => {
                debug!("using image placeholder for {}: {}", url, err);
                placeholder.clone()
            }
            None => {
                error!("cannot fetch resource {}: {}", url, err);
                String::new()
            }
        }
    }
}

fn cache_busted(url: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", url, sep, millis)
}

/// Replace every `url(<reference>)` occurrence, keeping the original quotes.
fn replace_reference(text: &str, reference: &str, data_url: &str) -> String {
    let pattern = format!(r#"(url\(['"]?)({})(['"]?\))"#, regex::escape(reference));
    match Regex::new(&pattern) {
        Ok(re) => re
            .replace_all(text, |caps: &regex::Captures<'_>| {
                format!("{}{}{}", &caps[1], data_url, &caps[3])
            })
            .into_owned(),
        Err(e) => {
            error!("cannot build rewrite pattern for {}: {}", reference, e);
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticFetcher;
    use crate::Result;
    use async_trait::async_trait;

    fn b64(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn read_urls_filters_duplicates_and_data_urls() {
        let css = r#"a { background: url("a.png"), url('b.gif'), url(a.png), url(data:image/png;base64,AA==) }"#;
        assert_eq!(read_urls(css), vec!["a.png".to_string(), "b.gif".to_string()]);
        assert!(should_process(css));
        assert!(!should_process("color: red"));
    }

    #[test]
    fn resolve_url_joins_relative_references() {
        assert_eq!(
            resolve_url("../f/x.woff", Some("https://cdn.example.com/css/site.css")),
            "https://cdn.example.com/f/x.woff"
        );
        assert_eq!(resolve_url("bg.png", None), "bg.png");
        assert_eq!(resolve_url("bg.png", Some("not a url")), "bg.png");
    }

    #[tokio::test]
    async fn text_without_references_is_untouched_and_never_fetches() {
        let fetcher = StaticFetcher::new();
        let inliner = Inliner::new(&fetcher, FetchPolicy::default());
        let css = "color: red; font-weight: bold";
        assert_eq!(inliner.inline_all(css, None).await, css);
        assert_eq!(fetcher.request_count(), 0);
    }

    #[tokio::test]
    async fn every_occurrence_is_rewritten_with_original_quotes() {
        let fetcher = StaticFetcher::new().with("http://h/img/a.png", vec![1u8, 2, 3]);
        let inliner = Inliner::new(&fetcher, FetchPolicy::default());
        let css = r#"background: url("a.png"), url(a.png);"#;
        let out = inliner.inline_all(css, Some("http://h/img/")).await;
        let uri = format!("data:image/png;base64,{}", b64(&[1, 2, 3]));
        assert_eq!(out, format!(r#"background: url("{uri}"), url({uri});"#, uri = uri));
        assert_eq!(fetcher.request_count(), 1);
    }

    #[tokio::test]
    async fn inlining_is_idempotent() {
        let fetcher = StaticFetcher::new().with("x.woff", b"font".to_vec());
        let inliner = Inliner::new(&fetcher, FetchPolicy::default());
        let once = inliner.inline_all("src: url(x.woff)", None).await;
        let twice = inliner.inline_all(&once, None).await;
        assert_eq!(once, twice);
        assert!(once.starts_with("src: url(data:application/font-woff;base64,"));
    }

    #[tokio::test]
    async fn special_characters_in_urls_do_not_corrupt_rewrite() {
        let url = "img/a+b$1.png?x=[1]";
        let fetcher = StaticFetcher::new().with(url, vec![7u8]);
        let inliner = Inliner::new(&fetcher, FetchPolicy::default());
        let out = inliner.inline_all(&format!("url('{}')", url), None).await;
        assert_eq!(out, format!("url('data:image/png;base64,{}')", b64(&[7])));
    }

    #[tokio::test]
    async fn failed_fetch_uses_placeholder_or_empty_payload() {
        let fetcher = StaticFetcher::new();
        let policy = FetchPolicy {
            placeholder_payload: Some("UExBQ0U=".into()),
            ..Default::default()
        };
        let inliner = Inliner::new(&fetcher, policy);
        let out = inliner.inline_all("url(missing.png)", None).await;
        assert_eq!(out, "url(data:image/png;base64,UExBQ0U=)");

        let inliner = Inliner::new(&fetcher, FetchPolicy::default());
        let out = inliner.inline_all("url(missing.png)", None).await;
        assert_eq!(out, "url(data:image/png;base64,)");
    }

    struct RecordingFetcher {
        seen: Mutex<Vec<String>>,
        delay: Duration,
    }

    #[async_trait]
    impl ResourceFetcher for RecordingFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            self.seen.lock().unwrap().push(url.to_string());
            tokio::time::sleep(self.delay).await;
            Ok(vec![0])
        }
    }

    #[tokio::test]
    async fn cache_bust_appends_timestamp_query() {
        let fetcher = RecordingFetcher {
            seen: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        };
        let policy = FetchPolicy {
            cache_bust: true,
            ..Default::default()
        };
        let inliner = Inliner::new(&fetcher, policy);
        inliner.inline_all("url(a.png) url(b.png?v=1)", None).await;
        let seen = fetcher.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().any(|u| u.starts_with("a.png?")));
        assert!(seen.iter().any(|u| u.starts_with("b.png?v=1&")));
    }

    #[tokio::test]
    async fn slow_fetch_times_out_per_resource() {
        let fetcher = RecordingFetcher {
            seen: Mutex::new(Vec::new()),
            delay: Duration::from_millis(500),
        };
        let policy = FetchPolicy {
            timeout: Duration::from_millis(20),
            placeholder_payload: Some("UA==".into()),
            ..Default::default()
        };
        let inliner = Inliner::new(&fetcher, policy);
        let out = inliner.inline_all("url(slow.gif)", None).await;
        assert_eq!(out, "url(data:image/gif;base64,UA==)");
    }
}
