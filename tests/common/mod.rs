//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use img_relay::{HttpServer, ProxyConfig, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};

/// A raw-TCP origin server that answers every request with bytes chosen by
/// the test, and reports each request line it receives.
pub struct Origin {
    pub addr: SocketAddr,
    requests: mpsc::UnboundedReceiver<String>,
}

impl Origin {
    /// Next request line seen by the origin, e.g. `GET /a?b=1 HTTP/1.1`.
    #[allow(dead_code)]
    pub async fn next_request_line(&mut self) -> String {
        self.requests.recv().await.expect("origin stopped")
    }

    /// `http://127.0.0.1:<port>` without a trailing slash.
    #[allow(dead_code)]
    pub fn base(&self) -> String {
        format!("http://{}", self.addr)
    }
}

/// Start an origin whose reply is computed from the request line.
pub async fn start_programmable_origin<F>(f: F) -> Origin
where
    F: Fn(&str) -> Vec<u8> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, requests) = mpsc::unbounded_channel();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let f = f.clone();
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let _ = serve_once(socket, &*f, &tx).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    Origin { addr, requests }
}

/// Start an origin that always sends the same raw response.
#[allow(dead_code)]
pub async fn start_origin(response: impl Into<Vec<u8>>) -> Origin {
    let response = response.into();
    start_programmable_origin(move |_| response.clone()).await
}

async fn serve_once<F>(
    mut socket: TcpStream,
    f: &F,
    tx: &mpsc::UnboundedSender<String>,
) -> std::io::Result<()>
where
    F: Fn(&str) -> Vec<u8>,
{
    let Some(request_line) = read_request_line(&mut socket).await? else {
        return Ok(());
    };
    let _ = tx.send(request_line.clone());

    socket.write_all(&f(&request_line)).await?;
    socket.shutdown().await
}

/// Read the request head and return its first line, or `None` on EOF.
async fn read_request_line(socket: &mut TcpStream) -> std::io::Result<Option<String>> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        head.extend_from_slice(&buf[..n]);
    }

    let head = String::from_utf8_lossy(&head);
    Ok(Some(head.lines().next().unwrap_or_default().to_string()))
}

/// Start an origin that answers one request with a chunked body it keeps
/// writing, one `chunk_size` chunk per `interval`, until a write fails or
/// `max_chunks` have gone out. The receiver yields the number of chunks
/// written.
#[allow(dead_code)]
pub async fn start_endless_origin(
    chunk_size: usize,
    interval: Duration,
    max_chunks: usize,
) -> (SocketAddr, oneshot::Receiver<usize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        if !matches!(read_request_line(&mut socket).await, Ok(Some(_))) {
            return;
        }

        let head = "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nTransfer-Encoding: chunked\r\n\r\n";
        if socket.write_all(head.as_bytes()).await.is_err() {
            let _ = tx.send(0);
            return;
        }

        let chunk = format!("{:x}\r\n{}\r\n", chunk_size, "x".repeat(chunk_size));
        let mut written = 0;
        while written < max_chunks {
            if socket.write_all(chunk.as_bytes()).await.is_err() {
                break;
            }
            written += 1;
            tokio::time::sleep(interval).await;
        }
        let _ = tx.send(written);
    });

    (addr, rx)
}

/// Build a raw HTTP/1.1 response that closes the connection.
#[allow(dead_code)]
pub fn raw_response(status_line: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {status_line}\r\n");
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str(&format!("Content-Length: {}\r\nConnection: close\r\n\r\n", body.len()));
    let mut out = out.into_bytes();
    out.extend_from_slice(body);
    out
}

/// A running relay bound to an ephemeral local port.
pub struct Relay {
    pub addr: SocketAddr,
    shutdown: Shutdown,
}

impl Relay {
    #[allow(dead_code)]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_relay(mut config: ProxyConfig) -> Relay {
    config.upstream.system_proxy = false;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config).unwrap();
    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, signal).await;
    });

    Relay { addr, shutdown }
}

/// Test client that neither follows redirects nor uses system proxies.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
