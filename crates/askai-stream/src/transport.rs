use std::pin::Pin;

use futures::StreamExt as _;
use reqwest::header::{ACCEPT, HeaderValue};
use tracing::debug;

use crate::config::ChatClientConfig;
use crate::errors::{ChatError, StreamError};

/// Raw response body chunks as delivered by the transport.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, StreamError>> + Send + 'static>>;

const API_KEY_HEADER: &str = "api-key";

/// Outgoing request body: `{"query": ..., "sessionId": ...}`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// Opens the streamed reply for one chat request.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    /// Sends `request` and returns the body stream once a success status has
    /// been received.
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, StreamError>;
}

/// `reqwest`-backed transport posting JSON to the configured endpoint.
pub struct HttpChatTransport {
    client: reqwest::Client,
    config: ChatClientConfig,
}

impl HttpChatTransport {
    /// Creates a transport from explicit configuration.
    pub fn new(config: ChatClientConfig) -> Result<Self, ChatError> {
        reqwest::Url::parse(&config.endpoint).map_err(|e| {
            ChatError::Config(format!("invalid chat endpoint {:?}: {e}", config.endpoint))
        })?;
        if let Some(key) = config.api_key.as_deref() {
            HeaderValue::from_str(key)
                .map_err(|e| ChatError::Config(format!("invalid api key header value: {e}")))?;
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates a transport using `ASKAI_*` environment variables.
    pub fn from_env() -> Result<Self, ChatError> {
        Self::new(ChatClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ChatClientConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl ChatTransport for HttpChatTransport {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, StreamError> {
        debug!(endpoint = %self.config.endpoint, session_id = %request.session_id, "posting chat query");

        let mut http_req = self
            .client
            .post(&self.config.endpoint)
            .header(ACCEPT, "application/json")
            .json(request);
        if let Some(key) = self.config.api_key.as_deref() {
            http_req = http_req.header(API_KEY_HEADER, key);
        }

        let response = http_req
            .send()
            .await
            .map_err(|e| StreamError::transport(format!("chat request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(StreamError::status(
                status.as_u16(),
                format!("chat request failed with status {status}: {body}"),
            ));
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            return Err(StreamError::unavailable(format!(
                "chat endpoint answered {status} without a body"
            )));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| StreamError::transport(format!("chat stream read failed: {e}"))));
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio::net::TcpListener;

    #[derive(Debug)]
    struct CapturedRequest {
        head: String,
        body: String,
    }

    /// Serves exactly one canned HTTP response on a loopback port.
    async fn serve_once(response: String) -> (String, tokio::task::JoinHandle<CapturedRequest>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut buf = Vec::new();
            let mut chunk = [0_u8; 1024];
            let (head, body) = loop {
                let n = socket.read(&mut chunk).await.expect("read");
                assert!(n > 0, "client closed before sending a full request");
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                let Some(split) = text.find("\r\n\r\n") else {
                    continue;
                };
                let head = text[..split].to_string();
                let length = head
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                let body = &text[split + 4..];
                if body.len() >= length {
                    break (head, body.to_string());
                }
            };
            socket
                .write_all(response.as_bytes())
                .await
                .expect("write");
            socket.shutdown().await.expect("shutdown");
            CapturedRequest { head, body }
        });
        (format!("http://{addr}/api/chat/"), handle)
    }

    fn ok_response(body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    async fn read_all(mut stream: ByteStream) -> String {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.expect("chunk"));
        }
        String::from_utf8(out).expect("utf8")
    }

    #[tokio::test]
    async fn posts_query_and_session_and_streams_the_body() {
        let payload = r#"{"response": "hi", "sources": []}"#;
        let (url, server) = serve_once(ok_response(payload)).await;
        let transport =
            HttpChatTransport::new(ChatClientConfig::new(url).api_key("k-123")).expect("transport");

        let request = ChatRequest {
            query: "what do you do?".into(),
            session_id: "s-1".into(),
        };
        let stream = transport.open_stream(&request).await.expect("open");
        assert_eq!(read_all(stream).await, payload);

        let captured = server.await.expect("server");
        let head = captured.head.to_ascii_lowercase();
        assert!(head.starts_with("post /api/chat/ "));
        assert!(head.contains("content-type: application/json"));
        assert!(head.contains("accept: application/json"));
        assert!(head.contains("api-key: k-123"));
        let body: serde_json::Value = serde_json::from_str(&captured.body).expect("json body");
        assert_eq!(
            body,
            serde_json::json!({"query": "what do you do?", "sessionId": "s-1"})
        );
    }

    #[tokio::test]
    async fn non_success_status_is_a_transport_error() {
        let response =
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 4\r\nConnection: close\r\n\r\nboom"
                .to_string();
        let (url, server) = serve_once(response).await;
        let transport = HttpChatTransport::new(ChatClientConfig::new(url)).expect("transport");

        let request = ChatRequest {
            query: "q".into(),
            session_id: "s".into(),
        };
        let err = match transport.open_stream(&request).await {
            Ok(_) => panic!("500 should fail"),
            Err(err) => err,
        };
        assert_eq!(err.status_code(), Some(500));
        assert!(err.message().contains("boom"));
        let _ = server.await;
    }

    #[tokio::test]
    async fn no_content_status_means_stream_unavailable() {
        let response = "HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n".to_string();
        let (url, server) = serve_once(response).await;
        let transport = HttpChatTransport::new(ChatClientConfig::new(url)).expect("transport");

        let request = ChatRequest {
            query: "q".into(),
            session_id: "s".into(),
        };
        let err = match transport.open_stream(&request).await {
            Ok(_) => panic!("204 should fail"),
            Err(err) => err,
        };
        assert!(matches!(err, StreamError::StreamUnavailable { .. }));
        let _ = server.await;
    }

    #[tokio::test]
    async fn connection_refused_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let transport = HttpChatTransport::new(ChatClientConfig::new(format!("http://{addr}/")))
            .expect("transport");
        let request = ChatRequest {
            query: "q".into(),
            session_id: "s".into(),
        };
        let err = match transport.open_stream(&request).await {
            Ok(_) => panic!("closed port should fail"),
            Err(err) => err,
        };
        assert!(matches!(err, StreamError::Transport { status_code: None, .. }));
    }

    #[test]
    fn rejects_unparseable_endpoints() {
        let err = match HttpChatTransport::new(ChatClientConfig::new("not a url")) {
            Ok(_) => panic!("bad url should fail"),
            Err(err) => err,
        };
        assert!(matches!(err, ChatError::Config(msg) if msg.contains("invalid chat endpoint")));
    }
}
