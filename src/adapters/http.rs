//! Shared HTTP plumbing for provider clients.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::core::output::ensure_parent;
use crate::core::pipeline::RetryPolicy;
use crate::error::StageError;

const USER_AGENT: &str = concat!("awareness-bot/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client every provider uses
pub fn client() -> Client {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(15))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Turn a non-success response into [`StageError::Http`]
pub async fn check(provider: &'static str, response: Response) -> Result<Response, StageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(StageError::Http {
        provider,
        status: status.as_u16(),
        body: truncate(&body, 500),
    })
}

/// Check the status and decode the JSON body
pub async fn read_json<T: DeserializeOwned>(
    provider: &'static str,
    response: Response,
) -> Result<T, StageError> {
    check(provider, response)
        .await?
        .json::<T>()
        .await
        .map_err(StageError::decode(provider))
}

/// Stream a remote file to `dest`, truncating whatever was there.
/// Returns the number of bytes written.
pub async fn download_to(
    client: &Client,
    provider: &'static str,
    url: &str,
    dest: &Path,
) -> Result<u64, StageError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(StageError::transport(provider))?;
    let mut response = check(provider, response).await?;

    ensure_parent(dest).await?;
    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| StageError::io(dest, e))?;

    let mut written = 0u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(StageError::transport(provider))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|e| StageError::io(dest, e))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| StageError::io(dest, e))?;

    debug!(provider, bytes = written, dest = %dest.display(), "Download finished");
    Ok(written)
}

/// Repeat `call` while it fails transiently and `policy` allows another
/// attempt. Only for requests that are safe to send twice.
pub async fn with_retry<T, F, Fut>(
    provider: &'static str,
    policy: &RetryPolicy,
    mut call: F,
) -> Result<T, StageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StageError>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match call().await {
            Err(e) if e.is_transient() && policy.should_retry(attempt) => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    provider,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Provider call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Local HTTP/1.1 server answering requests with queued replies, in order.
#[cfg(test)]
pub(crate) mod test_server {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    type Replies = Arc<Mutex<VecDeque<(u16, Vec<u8>)>>>;
    type Requests = Arc<Mutex<Vec<String>>>;

    pub(crate) struct TestServer {
        pub url: String,
        replies: Replies,
        requests: Requests,
    }

    impl TestServer {
        pub async fn start() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}", listener.local_addr().unwrap());
            let replies: Replies = Arc::default();
            let requests: Requests = Arc::default();

            let (queued, seen) = (replies.clone(), requests.clone());
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let (queued, seen) = (queued.clone(), seen.clone());
                    tokio::spawn(async move {
                        let _ = answer(stream, queued, seen).await;
                    });
                }
            });

            Self {
                url,
                replies,
                requests,
            }
        }

        /// Queue the reply for the next request
        pub fn reply(&self, status: u16, body: impl Into<Vec<u8>>) -> &Self {
            self.replies.lock().unwrap().push_back((status, body.into()));
            self
        }

        /// `METHOD /path` of every request received so far
        pub fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }

        pub fn count(&self, request: &str) -> usize {
            self.requests().iter().filter(|r| *r == request).count()
        }
    }

    async fn answer(mut stream: TcpStream, replies: Replies, requests: Requests) -> std::io::Result<()> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        let header_end = loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let content_length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buf.len() < header_end + content_length {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let mut request_line = head.split_whitespace();
        let method = request_line.next().unwrap_or_default();
        let path = request_line
            .next()
            .unwrap_or_default()
            .split('?')
            .next()
            .unwrap_or_default();
        requests.lock().unwrap().push(format!("{} {}", method, path));

        let (status, body) = replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((500, b"no reply queued".to_vec()));
        let head = format!(
            "HTTP/1.1 {} Test\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            body.len()
        );
        stream.write_all(head.as_bytes()).await?;
        stream.write_all(&body).await?;
        stream.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::test_server::TestServer;
    use super::*;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn test_truncate_long_bodies() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }

    #[tokio::test]
    async fn test_download_truncates_existing_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let dest = temp.path().join("video.mp4");
        tokio::fs::write(&dest, vec![b'x'; 4096]).await.unwrap();

        let server = TestServer::start().await;
        server.reply(200, b"short video".to_vec());

        let url = format!("{}/files/v.mp4", server.url);
        let written = download_to(&client(), "test", &url, &dest).await.unwrap();

        assert_eq!(written, 11);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"short video");
    }

    #[tokio::test]
    async fn test_download_error_status() {
        let temp = tempfile::TempDir::new().unwrap();
        let server = TestServer::start().await;
        server.reply(404, "not found");

        let url = format!("{}/files/missing.mp4", server.url);
        let err = download_to(&client(), "test", &url, &temp.path().join("v.mp4"))
            .await
            .unwrap_err();

        assert!(matches!(err, StageError::Http { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_retry_stops_after_success() {
        let mut calls = 0;
        let result = with_retry("test", &fast_retry(), || {
            calls += 1;
            let outcome = if calls < 3 {
                Err(StageError::Http {
                    provider: "test",
                    status: 503,
                    body: "busy".to_string(),
                })
            } else {
                Ok(calls)
            };
            async move { outcome }
        })
        .await
        .unwrap();

        assert_eq!(result, 3);
    }

    #[tokio::test]
    async fn test_retry_skips_permanent_errors() {
        let mut calls = 0;
        let result: Result<(), _> = with_retry("test", &fast_retry(), || {
            calls += 1;
            async {
                Err(StageError::Http {
                    provider: "test",
                    status: 400,
                    body: "bad request".to_string(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
