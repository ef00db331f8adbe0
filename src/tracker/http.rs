//! HTTP tracker client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::error::TorrentError;
use crate::tracker::{AnnounceRequest, AnnounceResponse, TrackerClient};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Announces over HTTP(S) with a single GET
pub struct HttpTracker {
    client: Client,
}

impl HttpTracker {
    pub fn new() -> Result<Self, TorrentError> {
        let client = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Announce URL with the query appended to any query the tracker URL
    /// already carries
    pub fn announce_url(base: &str, request: &AnnounceRequest) -> Result<Url, TorrentError> {
        let mut url = Url::parse(base)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TorrentError::tracker_error_full(
                "unsupported tracker scheme",
                base,
                format!("scheme '{}'", url.scheme()),
            ));
        }

        let query = format!(
            "info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1",
            urlencoding::encode_binary(&request.info_hash),
            urlencoding::encode_binary(&request.peer_id),
            request.port,
            request.uploaded,
            request.downloaded,
            request.left
        );

        let query = match url.query() {
            Some(existing) if !existing.is_empty() => format!("{}&{}", existing, query),
            _ => query,
        };
        url.set_query(Some(&query));
        Ok(url)
    }
}

#[async_trait]
impl TrackerClient for HttpTracker {
    async fn announce(&self, url: &str, request: &AnnounceRequest) -> Result<AnnounceResponse, TorrentError> {
        let url = Self::announce_url(url, request)?;
        info!("Announcing to {}", url.host_str().unwrap_or("tracker"));
        debug!("Announce URL: {}", url);

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TorrentError::tracker_error_full("tracker returned an error status", url.to_string(), status.to_string()));
        }

        let body = response.bytes().await?;
        debug!("Tracker response: {} bytes", body.len());
        AnnounceResponse::parse(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn request() -> AnnounceRequest {
        let mut info_hash = [0u8; 20];
        info_hash[0] = 0xd6;
        info_hash[1] = b'a';
        info_hash[2] = b' ';
        AnnounceRequest::new(info_hash, *b"-BF0001-abcdefghijkl", 92063)
    }

    #[test]
    fn test_announce_url() {
        let url = HttpTracker::announce_url("http://tracker.example/announce", &request()).unwrap();
        let query = url.query().unwrap();
        assert!(query.starts_with("info_hash=%D6a%20%00%00"));
        assert!(query.contains("&peer_id=-BF0001-abcdefghijkl&"));
        assert!(query.ends_with("&port=6881&uploaded=0&downloaded=0&left=92063&compact=1"));
    }

    #[test]
    fn test_announce_url_keeps_existing_query() {
        let url = HttpTracker::announce_url("https://t.example/a?key=xyz", &request()).unwrap();
        assert!(url.query().unwrap().starts_with("key=xyz&info_hash="));
    }

    #[test]
    fn test_announce_url_rejects_udp() {
        assert!(HttpTracker::announce_url("udp://t.example:80", &request()).is_err());
        assert!(HttpTracker::announce_url("not a url", &request()).is_err());
    }

    #[tokio::test]
    async fn test_announce_against_local_tracker() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }

            let mut body = b"d8:intervali900e5:peers6:".to_vec();
            body.extend_from_slice(&[192, 168, 0, 7, 0x1a, 0xe2]);
            body.push(b'e');
            let reply = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n", body.len());
            stream.write_all(reply.as_bytes()).await.unwrap();
            stream.write_all(&body).await.unwrap();
            String::from_utf8_lossy(&head).into_owned()
        });

        let tracker = HttpTracker::with_client(Client::builder().no_proxy().build().unwrap());
        let response = tracker
            .announce(&format!("http://{}/announce", addr), &request())
            .await
            .unwrap();
        assert_eq!(response.interval, Some(900));
        assert_eq!(response.peers[0].to_string(), "192.168.0.7:6882");

        let head = server.await.unwrap();
        assert!(head.starts_with("GET /announce?info_hash=%D6a%20"));
        assert!(head.contains("compact=1"));
    }
}
