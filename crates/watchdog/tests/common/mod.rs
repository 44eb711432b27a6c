//! Minimal HTTP/1.1 server for exercising probes against real sockets.
//!
//! Routes:
//! - `POST /xor`: replies `{"magic_number": n ^ 0xFEEDFACE}`
//! - `POST /echo`: replies `{"empty_body": <body was {}>, "body": <raw body>}`
//! - `GET /status/<code>`: replies with that status and a JSON body
//! - `GET /malformed`: 200 with a body that is not JSON
//! - `GET /slow`: replies after two seconds
//! - `GET /items`: a small document with an array
//! - `GET /work`: holds the connection briefly, tracking peak concurrency
//! - `GET /hold`: counts the request, then replies after 300ms
//! - `GET /truncated`: 500 whose body is cut short of its `Content-Length`

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const MAGIC: i64 = 0xFEEDFACE;

#[derive(Default)]
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
    held: AtomicUsize,
}

pub struct TestServer {
    addr: SocketAddr,
    gauge: Arc<Gauge>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let gauge = Arc::new(Gauge::default());

        let shared = gauge.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let gauge = shared.clone();
                tokio::spawn(async move {
                    let _ = handle(stream, gauge).await;
                });
            }
        });

        Self { addr, gauge }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Highest number of `/work` requests seen in flight at once
    pub fn peak_concurrency(&self) -> usize {
        self.gauge.peak.load(Ordering::SeqCst)
    }

    /// Number of `/hold` requests received so far
    pub fn held(&self) -> usize {
        self.gauge.held.load(Ordering::SeqCst)
    }
}

/// A URL on a port nobody listens on
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/")
}

struct Request {
    method: String,
    path: String,
    body: Vec<u8>,
}

async fn read_request(stream: &mut TcpStream) -> std::io::Result<Option<Request>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();

    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(Some(Request { method, path, body }))
}

async fn respond(stream: &mut TcpStream, status: u16, body: &[u8]) -> std::io::Result<()> {
    let head = format!(
        "HTTP/1.1 {status} Test\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(body).await?;
    stream.flush().await
}

async fn respond_json(stream: &mut TcpStream, status: u16, body: Value) -> std::io::Result<()> {
    respond(stream, status, body.to_string().as_bytes()).await
}

async fn handle(mut stream: TcpStream, gauge: Arc<Gauge>) -> std::io::Result<()> {
    let Some(request) = read_request(&mut stream).await? else {
        return Ok(());
    };

    match (request.method.as_str(), request.path.as_str()) {
        ("POST", "/xor") => {
            let input: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
            match input["magic_number"].as_i64() {
                Some(n) => respond_json(&mut stream, 200, json!({"magic_number": n ^ MAGIC})).await,
                None => respond_json(&mut stream, 400, json!({"error": "missing magic_number"})).await,
            }
        }
        ("POST", "/echo") => {
            let raw = String::from_utf8_lossy(&request.body).to_string();
            let empty = serde_json::from_str::<Value>(&raw).ok() == Some(json!({}));
            respond_json(&mut stream, 200, json!({"empty_body": empty, "body": raw})).await
        }
        (_, path) if path.starts_with("/status/") => {
            let status = path["/status/".len()..].parse().unwrap_or(500);
            respond_json(&mut stream, status, json!({"status": status})).await
        }
        ("GET", "/malformed") => respond(&mut stream, 200, b"<html>not json</html>").await,
        ("GET", "/slow") => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            respond_json(&mut stream, 200, json!({"slow": true})).await
        }
        ("GET", "/items") => {
            respond_json(
                &mut stream,
                200,
                json!({"items": [{"id": 1, "tag": "a"}, {"id": 2, "tag": "b"}], "count": "2"}),
            )
            .await
        }
        ("GET", "/work") => {
            let now = gauge.current.fetch_add(1, Ordering::SeqCst) + 1;
            gauge.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            gauge.current.fetch_sub(1, Ordering::SeqCst);
            respond_json(&mut stream, 200, json!({"done": true})).await
        }
        ("GET", "/hold") => {
            gauge.held.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(300)).await;
            respond_json(&mut stream, 200, json!({"done": true})).await
        }
        ("GET", "/truncated") => {
            let head = "HTTP/1.1 500 Test\r\nContent-Type: application/json\r\nContent-Length: 4096\r\nConnection: close\r\n\r\n";
            stream.write_all(head.as_bytes()).await?;
            stream.write_all(b"{\"error\": ").await?;
            stream.flush().await?;
            stream.shutdown().await
        }
        _ => respond_json(&mut stream, 404, json!({"error": "not found"})).await,
    }
}
