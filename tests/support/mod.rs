#![allow(dead_code)]

use std::io::{Cursor, Read as _};
use std::path::Path;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use serde_json::Value;

pub const ISBN: &str = "9780140449266";

#[derive(Debug, Clone)]
pub struct StubRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl StubRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("request body is json")
    }

    pub fn form_value(&self, key: &str) -> Option<String> {
        url::form_urlencoded::parse(&self.body)
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

pub struct StubResponse {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
}

impl StubResponse {
    pub fn json(status: u16, value: Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: value.to_string().into_bytes(),
        }
    }

    pub fn bytes(content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type,
            body,
        }
    }

    pub fn html(body: &str) -> Self {
        Self::bytes("text/html; charset=utf-8", body.as_bytes().to_vec())
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: b"stub".to_vec(),
        }
    }
}

/// One HTTP server standing in for every upstream: each upstream gets its own
/// path prefix (`/google`, `/ol`, `/covers`, `/notion`, `/push`, `/img`).
pub struct StubServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<StubRequest>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl StubServer {
    pub fn spawn<F>(routes: F) -> Self
    where
        F: Fn(&StubRequest) -> StubResponse + Send + 'static,
    {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start stub server");
        let base_url = format!("http://{}", server.server_addr());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let mut body = Vec::new();
                let _ = request.as_reader().read_to_end(&mut body);
                let url = request.url().to_string();
                let (path, query) = match url.split_once('?') {
                    Some((path, query)) => (path.to_owned(), query.to_owned()),
                    None => (url.clone(), String::new()),
                };
                let headers = request
                    .headers()
                    .iter()
                    .map(|h| (h.field.to_string(), h.value.to_string()))
                    .collect();
                let recorded = StubRequest {
                    method: request.method().to_string(),
                    path,
                    query,
                    headers,
                    body,
                };

                let response = routes(&recorded);
                seen.lock().expect("requests lock").push(recorded);

                let header = tiny_http::Header::from_bytes(
                    &b"Content-Type"[..],
                    response.content_type.as_bytes(),
                )
                .expect("content-type header");
                let _ = request.respond(
                    tiny_http::Response::from_data(response.body)
                        .with_status_code(response.status)
                        .with_header(header),
                );
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn requests(&self) -> Vec<StubRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn requests_to(&self, method: &str, prefix: &str) -> Vec<StubRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path.starts_with(prefix))
            .collect()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 128])
    });
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

pub fn notion_page(id: &str, title: &str, isbn: Option<&str>) -> Value {
    let mut properties = serde_json::json!({
        "Name": { "type": "title", "title": [{ "plain_text": title }] },
    });
    if let Some(isbn) = isbn {
        properties["ISBN"] = serde_json::json!({
            "type": "rich_text",
            "rich_text": [{ "plain_text": isbn }]
        });
    }
    serde_json::json!({ "object": "page", "id": id, "properties": properties })
}

pub fn notion_query(results: Vec<Value>, next_cursor: Option<&str>) -> Value {
    serde_json::json!({
        "object": "list",
        "results": results,
        "has_more": next_cursor.is_some(),
        "next_cursor": next_cursor,
    })
}

pub fn odyssey_volumes() -> Value {
    serde_json::json!({
        "totalItems": 1,
        "items": [{
            "volumeInfo": {
                "title": "The Odyssey",
                "authors": ["Homer"],
                "publisher": "Penguin",
                "publishedDate": "2003-04-29",
                "description": "<p>The epic of <b>Odysseus</b>.</p>",
                "pageCount": 541
            }
        }]
    })
}

pub fn open_library_data(olid: &str) -> Value {
    serde_json::json!({
        (format!("ISBN:{ISBN}")): {
            "identifiers": { "openlibrary": [olid] }
        }
    })
}

/// `once` wired to the stub, with Pushover enabled and local storage.
pub fn once_cmd(server: &StubServer, storage_dir: &Path, scratch_dir: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("bookshelf-enricher");
    cmd.env_remove("GOOGLE_API_KEY")
        .env("RUST_LOG", "debug")
        .arg("once")
        .arg("--notion-token")
        .arg("secret_test")
        .arg("--notion-database-id")
        .arg("db1")
        .arg("--notion-base-url")
        .arg(server.url("/notion"))
        .arg("--google-books-base-url")
        .arg(server.url("/google"))
        .arg("--open-library-base-url")
        .arg(server.url("/ol"))
        .arg("--open-library-covers-base-url")
        .arg(server.url("/covers"))
        .arg("--placeholder-cover-url")
        .arg(server.url("/img/placeholder.png"))
        .arg("--storage")
        .arg("local")
        .arg("--storage-dir")
        .arg(storage_dir)
        .arg("--public-base-url")
        .arg("https://cdn.example")
        .arg("--use-pushover")
        .arg("yes")
        .arg("--pushover-token")
        .arg("po_token")
        .arg("--pushover-user")
        .arg("po_user")
        .arg("--pushover-base-url")
        .arg(server.url("/push"))
        .arg("--scratch-dir")
        .arg(scratch_dir)
        .arg("--http-timeout-secs")
        .arg("5");
    cmd
}

pub fn report(stdout: &[u8]) -> Value {
    serde_json::from_slice(stdout).expect("report json on stdout")
}
