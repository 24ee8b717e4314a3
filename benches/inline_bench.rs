use criterion::{criterion_group, criterion_main, Criterion};

use rfcapture::capture::inline::{FetchPolicy, Inliner};
use rfcapture::{
    CaptureOptions, Capturer, Document, InlineStyleEngine, RasterDecoder, StaticFetcher,
};
use std::sync::Arc;

fn bench_inline_all(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("failed to build runtime");
    let mut fetcher = StaticFetcher::new();
    let mut css = String::new();
    for i in 0..32 {
        let url = format!("http://bench/img/{}.png", i);
        fetcher.insert(url.clone(), vec![i as u8; 2048]);
        css.push_str(&format!(".c{} {{ background: url(\"{}\") }}\n", i, url));
    }

    c.bench_function("inline_all_32_refs", |b| {
        b.iter(|| {
            let inliner = Inliner::new(&fetcher, FetchPolicy::default());
            rt.block_on(inliner.inline_all(&css, None))
        })
    });

    c.bench_function("inline_all_no_refs", |b| {
        let inliner = Inliner::new(&fetcher, FetchPolicy::default());
        b.iter(|| rt.block_on(inliner.inline_all("color: red; margin: 0 auto", None)))
    });
}

fn bench_to_svg(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("failed to build runtime");
    let mut html = String::from(r#"<div id="root">"#);
    for i in 0..200 {
        html.push_str(&format!(r#"<p style="color: red; margin: {}px">Row {}</p>"#, i % 8, i));
    }
    html.push_str("</div>");
    let doc = Document::parse_html(&html, None).expect("bench document parses");
    let root = doc.query_selector("#root").unwrap().expect("root exists");

    let capturer = Capturer::new(
        Arc::new(InlineStyleEngine),
        Arc::new(StaticFetcher::new()),
        Arc::new(RasterDecoder),
    );
    let options = CaptureOptions {
        width: Some(800),
        height: Some(600),
        ..Default::default()
    };

    c.bench_function("to_svg_200_rows", |b| {
        b.iter(|| rt.block_on(capturer.to_svg(&doc, root, &options)).unwrap())
    });
}

criterion_group!(benches, bench_inline_all, bench_to_svg);
criterion_main!(benches);
