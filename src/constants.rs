pub mod network {
    pub const DATA_API_DEFAULT_BASE: &str = "https://api.pre.iot.machinesensiot.com";
    pub const EMS_API_DEFAULT_BASE: &str = "https://energy.machinesensiot.com";
    pub const EMS_API_DEFAULT_REFERER: &str = "https://energy.machinesensiot.com/";
    pub const TIMEOUT_API_REQUEST_MS: u64 = 30_000;
    pub const TIMEOUT_CONNECTION_MS: u64 = 10_000;
    pub const USER_AGENT: &str = concat!("buildot/", env!("CARGO_PKG_VERSION"));
    pub const ACCEPT: &str = "application/json, text/plain, */*";
}

pub mod backends {
    pub const DATA_API: &str = "data";
    pub const EMS_API: &str = "ems";
}

pub mod limits {
    pub const UPSTREAM_BODY_EXCERPT_BYTES: usize = 4 * 1024;
    pub const LOG_STRING_BYTES: usize = 512;
    pub const SUGGESTION_LIMIT: usize = 3;
}

pub mod content {
    pub const OCTET_STREAM: &str = "application/octet-stream";
    pub const JSON: &str = "application/json";
    pub const FORM: &str = "application/x-www-form-urlencoded";
}

pub mod protocols {
    pub const ALLOWED_HTTP: &[&str] = &["http:", "https:"];
}
