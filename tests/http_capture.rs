//! Captures fetching resources from a local HTTP server

#![cfg(feature = "http")]

use std::sync::{Arc, Mutex};

use rfcapture::{CaptureOptions, Document, HttpFetcherConfig};
use tiny_http::{Response, Server};

/// Start a test server on a free port; returns its base URL and the request log
fn start_test_server() -> (String, Arc<Mutex<Vec<String>>>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr();
    let log = Arc::new(Mutex::new(Vec::new()));
    let seen = log.clone();
    std::thread::spawn(move || {
        for request in server.incoming_requests() {
            let url = request.url().to_string();
            seen.lock().unwrap().push(url.clone());
            let path = url.split('?').next().unwrap_or("");
            let response = match path {
                "/img/logo.png" => Response::from_data(b"logo".to_vec()),
                "/css/site.css" => Response::from_string(
                    "@font-face { font-family: Site; src: url(../fonts/site.ttf) }",
                ),
                "/fonts/site.ttf" => Response::from_data(b"ttf".to_vec()),
                _ => Response::from_string("Not Found").with_status_code(404),
            };
            let _ = request.respond(response);
        }
    });
    (format!("http://{}", addr), log)
}

#[tokio::test]
async fn test_capture_over_http() {
    // Skip on CI where network may not be available
    if std::env::var("CI").is_ok() {
        return;
    }

    let (base, log) = start_test_server();
    let html = r#"<html><head><link rel="stylesheet" href="/css/site.css"></head>
        <body><div id="root" style="background: url(img/missing.png)"><img src="img/logo.png"></div></body></html>"#;
    let mut doc = Document::parse_html(html, Some(&format!("{}/index.html", base))).unwrap();

    let capturer = rfcapture::new_capturer(HttpFetcherConfig::default()).unwrap();
    let fetcher = rfcapture::HttpFetcher::new(HttpFetcherConfig::default()).unwrap();
    doc.load_linked_stylesheets(&fetcher).await;
    let root = doc.query_selector("#root").unwrap().unwrap();

    let options = CaptureOptions {
        width: Some(64),
        height: Some(32),
        cache_bust: true,
        image_placeholder: Some("data:image/png;base64,UEg=".into()),
        ..Default::default()
    };
    // the served logo is not a real PNG; with a placeholder set its decode
    // failure is only logged
    let svg = capturer.to_svg(&doc, root, &options).await.unwrap();

    assert!(svg.contains("url(data:image/png;base64,UEg=)"));
    assert!(svg.contains(r#"src="data:image/png;base64,bG9nbw==""#));
    assert!(svg.contains("data:application/font-truetype;base64,dHRm"));
    assert!(!svg.contains(&base));

    let requests = log.lock().unwrap().clone();
    assert!(requests.contains(&"/css/site.css".to_string()));
    for resource in ["/img/logo.png?", "/img/missing.png?", "/fonts/site.ttf?"] {
        assert!(
            requests.iter().any(|r| r.starts_with(resource)),
            "{} not requested with a cache-busting query: {:?}",
            resource,
            requests
        );
    }
}
