use crate::constants::{network, protocols::ALLOWED_HTTP};
use crate::errors::AdapterError;
use crate::services::logger::LogLevel;
use crate::utils::feature_flags::is_tls_verify_enabled;
use url::Url;

/// Startup configuration. Resolved once from the environment (and CLI
/// overrides) and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_api_base: String,
    pub ems_api_base: String,
    pub ems_referer: String,
    pub tls_verify: bool,
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub log_level: LogLevel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_api_base: network::DATA_API_DEFAULT_BASE.to_string(),
            ems_api_base: network::EMS_API_DEFAULT_BASE.to_string(),
            ems_referer: network::EMS_API_DEFAULT_REFERER.to_string(),
            tls_verify: false,
            request_timeout_ms: network::TIMEOUT_API_REQUEST_MS,
            connect_timeout_ms: network::TIMEOUT_CONNECTION_MS,
            log_level: LogLevel::Info,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_millis(key: &str) -> Result<Option<u64>, AdapterError> {
    let Some(raw) = env_string(key) else {
        return Ok(None);
    };
    match raw.parse::<u64>() {
        Ok(value) if value > 0 => Ok(Some(value)),
        _ => Err(AdapterError::configuration(format!(
            "{} must be a positive integer (milliseconds), got '{}'",
            key, raw
        ))),
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, AdapterError> {
        let defaults = Settings::default();
        let settings = Settings {
            data_api_base: env_string("DATA_API_BASE").unwrap_or(defaults.data_api_base),
            ems_api_base: env_string("EMS_API_BASE").unwrap_or(defaults.ems_api_base),
            ems_referer: env_string("EMS_API_REFERER").unwrap_or(defaults.ems_referer),
            tls_verify: is_tls_verify_enabled(),
            request_timeout_ms: env_millis("BUILDOT_HTTP_TIMEOUT_MS")?
                .unwrap_or(defaults.request_timeout_ms),
            connect_timeout_ms: env_millis("BUILDOT_CONNECT_TIMEOUT_MS")?
                .unwrap_or(defaults.connect_timeout_ms),
            log_level: LogLevel::from_env(),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn with_data_api_base(mut self, base: Option<String>) -> Self {
        if let Some(base) = base {
            self.data_api_base = base;
        }
        self
    }

    pub fn with_ems_api_base(mut self, base: Option<String>) -> Self {
        if let Some(base) = base {
            self.ems_api_base = base;
        }
        self
    }

    pub fn with_log_level(mut self, level: Option<LogLevel>) -> Self {
        if let Some(level) = level {
            self.log_level = level;
        }
        self
    }

    pub fn validate(&self) -> Result<(), AdapterError> {
        parse_base_url("DATA_API_BASE", &self.data_api_base)?;
        parse_base_url("EMS_API_BASE", &self.ems_api_base)?;
        if self.connect_timeout_ms > self.request_timeout_ms {
            return Err(AdapterError::configuration(
                "connect timeout must not exceed the total request timeout",
            ));
        }
        Ok(())
    }
}

pub fn parse_base_url(label: &str, raw: &str) -> Result<Url, AdapterError> {
    let parsed = Url::parse(raw)
        .map_err(|err| AdapterError::configuration(format!("{} is not a valid URL: {}", label, err)))?;
    if !scheme_allowed(parsed.scheme()) {
        return Err(AdapterError::configuration(format!(
            "{} must use http or https",
            label
        )));
    }
    Ok(parsed)
}

fn scheme_allowed(scheme: &str) -> bool {
    let normalized = scheme.trim_end_matches(':');
    ALLOWED_HTTP
        .iter()
        .any(|allowed| allowed.trim_end_matches(':') == normalized)
}
