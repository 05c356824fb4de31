use crate::config::{parse_base_url, Settings};
use crate::constants::{backends, network};
use crate::errors::AdapterError;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Transport policy and fixed headers of one upstream REST service.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    pub id: String,
    pub base_address: Url,
    /// Sent on every request, in order. Never contains credentials.
    pub default_headers: Vec<(String, String)>,
    pub connect_timeout: Duration,
    pub total_timeout: Duration,
    pub multiplexing: bool,
    pub tls_verification: bool,
}

impl BackendConfig {
    pub fn new(id: impl Into<String>, base_address: Url) -> Self {
        Self {
            id: id.into(),
            base_address,
            default_headers: Vec::new(),
            connect_timeout: Duration::from_millis(network::TIMEOUT_CONNECTION_MS),
            total_timeout: Duration::from_millis(network::TIMEOUT_API_REQUEST_MS),
            multiplexing: true,
            tls_verification: false,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Base address without a trailing slash, ready for `path` concatenation.
    pub fn base(&self) -> &str {
        self.base_address.as_str().trim_end_matches('/')
    }
}

/// Read-only table of backends keyed by id.
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<String, BackendConfig>,
}

impl BackendRegistry {
    pub fn new(configs: impl IntoIterator<Item = BackendConfig>) -> Self {
        Self {
            backends: configs
                .into_iter()
                .map(|config| (config.id.clone(), config))
                .collect(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, AdapterError> {
        let connect = Duration::from_millis(settings.connect_timeout_ms);
        let total = Duration::from_millis(settings.request_timeout_ms);
        let policy = |config: BackendConfig| BackendConfig {
            connect_timeout: connect,
            total_timeout: total,
            tls_verification: settings.tls_verify,
            ..config
        };

        let data = BackendConfig::new(
            backends::DATA_API,
            parse_base_url("DATA_API_BASE", &settings.data_api_base)?,
        )
        .header("User-Agent", network::USER_AGENT)
        .header("Accept", network::ACCEPT);

        let ems = BackendConfig::new(
            backends::EMS_API,
            parse_base_url("EMS_API_BASE", &settings.ems_api_base)?,
        )
        .header("User-Agent", network::USER_AGENT)
        .header("Accept", network::ACCEPT)
        .header("Referer", settings.ems_referer.clone());

        Ok(Self::new([policy(data), policy(ems)]))
    }

    pub fn get(&self, id: &str) -> Option<&BackendConfig> {
        self.backends.get(id)
    }

    pub fn require(&self, id: &str) -> Result<&BackendConfig, AdapterError> {
        self.get(id)
            .ok_or_else(|| AdapterError::configuration(format!("unknown backend '{}'", id)))
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.backends.keys().cloned().collect();
        ids.sort();
        ids
    }
}
