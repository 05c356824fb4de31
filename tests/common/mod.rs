#![allow(dead_code)]

use async_trait::async_trait;
use buildot::app::App;
use buildot::config::Settings;
use buildot::errors::AdapterError;
use buildot::services::backends::BackendConfig;
use buildot::services::client_factory::{
    ClientFactory, ScopedClient, UpstreamRequest, UpstreamResponse,
};
use buildot::services::credential::Credential;
use buildot::services::logger::{LogLevel, Logger};
use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

pub static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub fn quiet_logger() -> Logger {
    Logger::with_level("test", LogLevel::Error)
}

pub fn restore_env(key: &str, previous: Option<String>) {
    match previous {
        Some(value) => std::env::set_var(key, value),
        None => std::env::remove_var(key),
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub backend: String,
    pub authorization: String,
    pub request: UpstreamRequest,
}

#[derive(Default)]
struct Recorder {
    opens: AtomicUsize,
    releases: AtomicUsize,
    requests: StdMutex<Vec<RecordedRequest>>,
    responses: StdMutex<VecDeque<Result<UpstreamResponse, AdapterError>>>,
}

/// Client factory double. Records every request, answers from a queue
/// (default `200 {}`) and counts opens/releases.
#[derive(Clone, Default)]
pub struct RecordingFactory {
    recorder: Arc<Recorder>,
    forbid_network: bool,
    delay: Option<Duration>,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panics on `open`: proves a path performs zero I/O.
    pub fn forbidden() -> Self {
        Self {
            forbid_network: true,
            ..Self::default()
        }
    }

    /// Every `send` sleeps first, leaving room to cancel mid-flight.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn respond(&self, response: Result<UpstreamResponse, AdapterError>) {
        if let Ok(mut queue) = self.recorder.responses.lock() {
            queue.push_back(response);
        }
    }

    pub fn respond_json(&self, status: u16, body: serde_json::Value) {
        self.respond(Ok(UpstreamResponse {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: body.to_string().into_bytes(),
        }));
    }

    pub fn respond_raw(&self, status: u16, content_type: Option<&str>, body: &[u8]) {
        self.respond(Ok(UpstreamResponse {
            status,
            headers: content_type
                .map(|ct| vec![("content-type".to_string(), ct.to_string())])
                .unwrap_or_default(),
            body: body.to_vec(),
        }));
    }

    pub fn opens(&self) -> usize {
        self.recorder.opens.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.recorder.releases.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.recorder
            .requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn last_request(&self) -> RecordedRequest {
        self.requests().pop().expect("at least one recorded request")
    }
}

impl ClientFactory for RecordingFactory {
    fn open(
        &self,
        backend: &BackendConfig,
        credential: &Credential,
    ) -> Result<Box<dyn ScopedClient>, AdapterError> {
        if self.forbid_network {
            panic!("client factory contacted for backend '{}'", backend.id);
        }
        self.recorder.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingClient {
            recorder: self.recorder.clone(),
            backend: backend.id.clone(),
            authorization: credential.authorization_value(),
            delay: self.delay,
        }))
    }

    fn active(&self) -> usize {
        self.opens() - self.releases()
    }
}

struct RecordingClient {
    recorder: Arc<Recorder>,
    backend: String,
    authorization: String,
    delay: Option<Duration>,
}

#[async_trait]
impl ScopedClient for RecordingClient {
    async fn send(&mut self, request: UpstreamRequest) -> Result<UpstreamResponse, AdapterError> {
        if let Ok(mut guard) = self.recorder.requests.lock() {
            guard.push(RecordedRequest {
                backend: self.backend.clone(),
                authorization: self.authorization.clone(),
                request,
            });
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .recorder
            .responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        next.unwrap_or_else(|| {
            Ok(UpstreamResponse {
                status: 200,
                headers: Vec::new(),
                body: b"{}".to_vec(),
            })
        })
    }
}

impl Drop for RecordingClient {
    fn drop(&mut self) {
        self.recorder.releases.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn app_with(factory: &RecordingFactory) -> App {
    App::with_factory(Settings::default(), quiet_logger(), Arc::new(factory.clone()))
        .expect("app wiring")
}

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or("")
    }

    pub fn query(&self) -> &str {
        self.target.split_once('?').map(|(_, q)| q).unwrap_or("")
    }
}

/// Loopback HTTP/1.1 upstream that answers every request with one canned
/// response and records what it received.
pub struct FakeUpstream {
    pub base: String,
    captured: Arc<StdMutex<Vec<CapturedRequest>>>,
}

impl FakeUpstream {
    pub async fn start(status: u16, content_type: &str, body: &[u8]) -> Self {
        Self::start_with_delay(status, content_type, body, Duration::ZERO).await
    }

    pub async fn start_with_delay(
        status: u16,
        content_type: &str,
        body: &[u8],
        delay: Duration,
    ) -> Self {
        Self::spawn(status, content_type, body, delay, Vec::new()).await
    }

    /// Answers every request with `302 Location: <location>`.
    pub async fn start_redirect(location: &str) -> Self {
        let headers = vec![("Location".to_string(), location.to_string())];
        Self::spawn(302, "text/plain", b"moved", Duration::ZERO, headers).await
    }

    async fn spawn(
        status: u16,
        content_type: &str,
        body: &[u8],
        delay: Duration,
        extra_headers: Vec<(String, String)>,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        let captured = Arc::new(StdMutex::new(Vec::new()));
        let sink = captured.clone();
        let content_type = content_type.to_string();
        let body = body.to_vec();

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let sink = sink.clone();
                let content_type = content_type.clone();
                let body = body.clone();
                let extra_headers = extra_headers.clone();
                tokio::spawn(async move {
                    let Some(request) = read_request(&mut stream).await else {
                        return;
                    };
                    if let Ok(mut guard) = sink.lock() {
                        guard.push(request);
                    }
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let extra: String = extra_headers
                        .iter()
                        .map(|(name, value)| format!("{}: {}\r\n", name, value))
                        .collect();
                    let head = format!(
                        "HTTP/1.1 {} Canned\r\nContent-Type: {}\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
                        status,
                        content_type,
                        body.len(),
                        extra
                    );
                    let _ = stream.write_all(head.as_bytes()).await;
                    let _ = stream.write_all(&body).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self {
            base: format!("http://{}", addr),
            captured,
        }
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.captured
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn only_request(&self) -> CapturedRequest {
        let requests = self.requests();
        assert_eq!(requests.len(), 1, "expected exactly one upstream request");
        requests.into_iter().next().expect("one request")
    }
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> Option<CapturedRequest> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(pos) = find_header_end(&buffer) {
            break pos;
        }
        let read = stream.read(&mut chunk).await.ok()?;
        if read == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..read]);
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buffer[header_end + 4..].to_vec();
    while body.len() < content_length {
        let read = stream.read(&mut chunk).await.ok()?;
        if read == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..read]);
    }

    Some(CapturedRequest {
        method,
        target,
        headers,
        body,
    })
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}
