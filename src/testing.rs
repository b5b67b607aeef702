//! A local HTTP server answering canned responses, for client tests.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Answers one connection per canned `(status, body)` pair, in order, and
/// keeps the raw requests it read.
pub(crate) struct CannedServer {
    pub(crate) url: String,
    requests: JoinHandle<Vec<String>>,
}

impl CannedServer {
    pub(crate) async fn start(responses: Vec<(u16, &'static str)>) -> Self {
        let responses = responses
            .into_iter()
            .map(|(status, body)| response(status, body.len(), body))
            .collect();
        CannedServer::start_raw(responses).await
    }

    /// Like [`CannedServer::start`], with each response written as given.
    pub(crate) async fn start_raw(responses: Vec<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let requests = tokio::spawn(async move {
            let mut requests = vec![];
            for response in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                requests.push(read_request(&mut stream).await);
                stream.write_all(response.as_bytes()).await.unwrap();
                stream.shutdown().await.unwrap();
            }
            requests
        });

        CannedServer { url, requests }
    }

    /// Wait for every canned response to be served.
    pub(crate) async fn requests(self) -> Vec<String> {
        self.requests.await.unwrap()
    }
}

/// A JSON response announcing `content_length` bytes of body.
pub(crate) fn response(status: u16, content_length: usize, body: &str) -> String {
    let reason = http::StatusCode::from_u16(status)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or("Unknown");
    format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {content_length}\r\nConnection: close\r\n\r\n{body}"
    )
}

async fn read_request(stream: &mut TcpStream) -> String {
    let mut request = vec![];
    let mut chunk = [0u8; 4096];

    loop {
        let read = stream.read(&mut chunk).await.unwrap();
        if read == 0 {
            break;
        }
        request.extend_from_slice(&chunk[..read]);

        let Some(head_end) = request.windows(4).position(|window| window == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&request[..head_end]).to_lowercase();
        let content_length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if request.len() >= head_end + 4 + content_length {
            break;
        }
    }

    String::from_utf8_lossy(&request).into_owned()
}
