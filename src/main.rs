use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::info;

use rfcapture::{
    CaptureOptions, Capturer, Document, HttpFetcher, HttpFetcherConfig,
    InlineStyleEngine, RasterDecoder,
};

/// Capture an element of an HTML file as a self-contained SVG.
#[derive(Parser, Debug)]
#[command(name = "rfcapture", version, about)]
struct Args {
    /// HTML file to read
    input: PathBuf,

    /// CSS selector of the element to capture
    #[arg(long, default_value = "body")]
    selector: String,

    /// URL that relative references resolve against
    #[arg(long)]
    base_url: Option<String>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Background color, any CSS color
    #[arg(long = "bg")]
    background_color: Option<String>,

    /// data: URI used for resources that fail to load
    #[arg(long)]
    placeholder: Option<String>,

    /// Append a timestamp to every fetched URL
    #[arg(long)]
    cache_bust: bool,

    /// Extra style for the captured element, as name=value (repeatable)
    #[arg(long = "style", value_parser = parse_style)]
    extra_style: Vec<(String, String)>,

    /// Per-resource fetch timeout in milliseconds
    #[arg(long, default_value_t = 30000)]
    timeout_ms: u64,

    /// Write the SVG document here instead of printing the data URI
    #[arg(long)]
    out: Option<PathBuf>,
}

fn parse_style(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected name=value, got {:?}", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let html = std::fs::read_to_string(&args.input)
        .with_context(|| format!("cannot read {}", args.input.display()))?;
    let mut doc = Document::parse_html(&html, args.base_url.as_deref())?;

    let fetcher = Arc::new(HttpFetcher::new(HttpFetcherConfig {
        timeout_ms: args.timeout_ms,
        ..Default::default()
    })?);
    doc.load_linked_stylesheets(fetcher.as_ref()).await;

    let node = doc
        .query_selector(&args.selector)?
        .with_context(|| format!("no element matches {:?}", args.selector))?;

    let options = CaptureOptions {
        width: args.width,
        height: args.height,
        background_color: args.background_color,
        extra_style: args.extra_style,
        image_placeholder: args.placeholder,
        cache_bust: args.cache_bust,
        fetch_timeout: Duration::from_millis(args.timeout_ms),
        ..Default::default()
    };

    let capturer = Capturer::new(Arc::new(InlineStyleEngine), fetcher, Arc::new(RasterDecoder));

    match args.out {
        Some(path) => {
            let markup = capturer.to_svg_markup(&doc, node, &options).await?;
            std::fs::write(&path, markup)
                .with_context(|| format!("cannot write {}", path.display()))?;
            info!("wrote {}", path.display());
        }
        None => println!("{}", capturer.to_svg(&doc, node, &options).await?),
    }
    Ok(())
}
