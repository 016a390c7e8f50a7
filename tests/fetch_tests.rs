use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use htmlsift::fetch::{FetchOptions, Fetcher};
use spectral::prelude::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

fn fetcher() -> Fetcher {
    Fetcher::new(FetchOptions::default()).expect("http client")
}

fn page_file(name: &str, paragraphs: usize) -> String {
    let path: PathBuf =
        std::env::temp_dir().join(format!("htmlsift-fetch-{}-{name}.html", std::process::id()));
    let body = "<p>filler text</p>".repeat(paragraphs);
    std::fs::write(&path, format!("<html><body><h1>{name}</h1>{body}</body></html>"))
        .expect("temp page written");
    path.to_string_lossy().into_owned()
}

/// Serves one HTTP response on a loopback port and returns its URL.
async fn serve_once(body: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("local address");

    tokio::spawn(async move {
        let Ok((mut stream, _)) = listener.accept().await else {
            return;
        };
        let mut request = Vec::new();
        let mut chunk = [0_u8; 512];
        while !request.windows(4).any(|window| window == b"\r\n\r\n") {
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(read) => request.extend_from_slice(chunk.get(..read).unwrap_or_default()),
            }
        }
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = stream.write_all(response.as_bytes()).await;
        let _ = stream.shutdown().await;
    });

    format!("http://{address}/page")
}

#[tokio::test]
async fn results_keep_input_order() {
    let sources = vec![
        page_file("large", 5_000),
        page_file("small", 1),
        page_file("medium", 500),
        page_file("tiny", 0),
        page_file("big", 2_000),
    ];
    let cancel = AtomicBool::new(false);

    let documents = fetcher().load_all(&sources, 3, &cancel).await;

    let loaded: Vec<&str> = documents.iter().map(|document| document.source.as_str()).collect();
    let expected: Vec<&str> = sources.iter().map(String::as_str).collect();
    assert_that(&loaded).is_equal_to(expected);
    assert_that(&documents.iter().all(|document| document.html.is_ok())).is_true();
}

#[tokio::test]
async fn failures_stay_in_place() {
    let sources = vec![
        page_file("before", 1),
        std::env::temp_dir()
            .join("htmlsift-fetch-missing.html")
            .to_string_lossy()
            .into_owned(),
        page_file("after", 1),
    ];
    let cancel = AtomicBool::new(false);

    let documents = fetcher().load_all(&sources, 3, &cancel).await;

    let loaded: Vec<bool> = documents.iter().map(|document| document.html.is_ok()).collect();
    assert_that(&loaded).is_equal_to(vec![true, false, true]);
}

#[tokio::test]
async fn raised_cancel_flag_takes_no_documents() {
    let sources = vec![page_file("first", 1), page_file("second", 1)];
    let cancel = AtomicBool::new(true);

    let documents = fetcher().load_all(&sources, 3, &cancel).await;

    assert_that(&documents).is_empty();
}

#[tokio::test]
async fn file_urls_and_short_files_are_read() {
    let path = std::env::temp_dir().join(format!("htmlsift-fetch-{}-short.html", std::process::id()));
    std::fs::write(&path, "<b>x</b>").expect("temp page written");
    let url = Url::from_file_path(&path).expect("absolute path");

    let document = fetcher().load(url.as_str()).await;

    assert_that(&document.html).is_equal_to(Ok("<b>x</b>".to_owned()));
}

#[tokio::test]
async fn short_response_body_is_a_fetch_error() {
    let url = serve_once("<p>tiny</p>".to_owned()).await;

    let document = fetcher().load(&url).await;

    let error = document.html.expect_err("short body rejected");
    assert_that(&error.contains("too short")).is_true();
}

#[tokio::test]
async fn full_response_body_is_loaded() {
    let body = format!("<html><body>{}</body></html>", "<p>enough text</p>".repeat(20));
    let url = serve_once(body.clone()).await;

    let document = fetcher().load(&url).await;

    assert_that(&document.html).is_equal_to(Ok(body));
}
