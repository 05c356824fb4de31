use crate::catalog::HttpMethod;
use crate::constants::content;
use crate::errors::AdapterError;
use crate::services::backends::BackendConfig;
use crate::services::credential::Credential;
use crate::services::logger::Logger;
use crate::services::normalizer::RequestBody;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// Client bound to one backend and one credential for exactly one call.
/// Release happens when the value is dropped, on every exit path.
#[async_trait]
pub trait ScopedClient: Send {
    async fn send(&mut self, request: UpstreamRequest) -> Result<UpstreamResponse, AdapterError>;
}

pub trait ClientFactory: Send + Sync {
    fn open(
        &self,
        backend: &BackendConfig,
        credential: &Credential,
    ) -> Result<Box<dyn ScopedClient>, AdapterError>;

    /// Scoped clients currently open.
    fn active(&self) -> usize;
}

/// `reqwest`-backed factory. Connection pools are shared per backend; the
/// credential lives only on the scoped client and is attached per request.
pub struct HttpClientFactory {
    logger: Logger,
    clients: Arc<Mutex<HashMap<String, Client>>>,
    active: Arc<AtomicUsize>,
}

impl HttpClientFactory {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger: logger.child("http"),
            clients: Arc::new(Mutex::new(HashMap::new())),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn get_client(&self, backend: &BackendConfig) -> Result<Client, AdapterError> {
        let mut guard = self
            .clients
            .lock()
            .map_err(|_| AdapterError::transport("Failed to access HTTP client cache"))?;
        if let Some(existing) = guard.get(&backend.id) {
            return Ok(existing.clone());
        }
        let mut builder = Client::builder()
            .connect_timeout(backend.connect_timeout)
            .timeout(backend.total_timeout)
            .redirect(reqwest::redirect::Policy::none());
        if !backend.tls_verification {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if !backend.multiplexing {
            builder = builder.http1_only();
        }
        let client = builder.build().map_err(|err| {
            AdapterError::configuration(format!("Failed to build HTTP client: {}", err))
        })?;
        guard.insert(backend.id.clone(), client.clone());
        Ok(client)
    }
}

impl ClientFactory for HttpClientFactory {
    fn open(
        &self,
        backend: &BackendConfig,
        credential: &Credential,
    ) -> Result<Box<dyn ScopedClient>, AdapterError> {
        let client = self.get_client(backend)?;
        let mut headers = headers_to_headermap(&backend.default_headers)?;
        let mut auth = HeaderValue::from_str(&credential.authorization_value()).map_err(|_| {
            AdapterError::invalid_arguments(
                "authorization",
                "bearer token contains characters not allowed in an HTTP header",
            )
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        self.active.fetch_add(1, Ordering::SeqCst);
        self.logger.debug(
            "opened scoped client",
            Some(&serde_json::json!({ "backend": backend.id })),
        );
        Ok(Box::new(HttpScopedClient {
            client,
            backend_id: backend.id.clone(),
            base: backend.base().to_string(),
            headers,
            active: self.active.clone(),
            logger: self.logger.clone(),
        }))
    }

    fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

struct HttpScopedClient {
    client: Client,
    backend_id: String,
    base: String,
    headers: HeaderMap,
    active: Arc<AtomicUsize>,
    logger: Logger,
}

#[async_trait]
impl ScopedClient for HttpScopedClient {
    async fn send(&mut self, request: UpstreamRequest) -> Result<UpstreamResponse, AdapterError> {
        let url = build_url(&self.base, &request.path, &request.query)?;
        let mut req = self
            .client
            .request(request.method.to_reqwest(), url)
            .headers(self.headers.clone());
        req = match request.body {
            RequestBody::None => req,
            RequestBody::Json(map) => {
                let text = serde_json::to_vec(&map).map_err(|err| {
                    AdapterError::transport(format!("Failed to encode JSON body: {}", err))
                })?;
                req.header(CONTENT_TYPE, content::JSON).body(text)
            }
            RequestBody::Form(pairs) => {
                let encoded = serde_urlencoded::to_string(&pairs).map_err(|err| {
                    AdapterError::transport(format!("Failed to encode form body: {}", err))
                })?;
                req.header(CONTENT_TYPE, content::FORM).body(encoded)
            }
        };

        let response = req.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();
        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

impl Drop for HttpScopedClient {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.logger.debug(
            "released scoped client",
            Some(&serde_json::json!({ "backend": self.backend_id })),
        );
    }
}

pub(crate) fn build_url(
    base: &str,
    path: &str,
    query: &[(String, String)],
) -> Result<Url, AdapterError> {
    let joined = format!("{}{}", base.trim_end_matches('/'), path);
    let mut url = Url::parse(&joined).map_err(|err| {
        AdapterError::configuration(format!("Invalid upstream URL '{}': {}", joined, err))
    })?;
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }
    Ok(url)
}

fn headers_to_headermap(headers: &[(String, String)]) -> Result<HeaderMap, AdapterError> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
            AdapterError::configuration(format!("Invalid default header name '{}'", key))
        })?;
        let value = HeaderValue::from_str(value).map_err(|_| {
            AdapterError::configuration(format!("Invalid value for default header '{}'", key))
        })?;
        map.append(name, value);
    }
    Ok(map)
}
