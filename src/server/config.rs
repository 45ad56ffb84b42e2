//! Server Configuration

use std::str::FromStr;

use crate::error::ServerError;
use crate::observability::DEFAULT_HISTOGRAM_CAPACITY;
use crate::security::AuthConfig;

/// External HTTP dependency polled by the health endpoints.
///
/// Parsed from `name=url`; a trailing `!` on the name marks it critical,
/// e.g. `auth!=http://svc-auth:4001/health/live`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCheckConfig {
    pub name: String,
    pub url: String,
    pub critical: bool,
}

impl FromStr for HttpCheckConfig {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, url) = s
            .split_once('=')
            .ok_or_else(|| ServerError::Config(format!("expected name=url, got {s:?}")))?;
        let (name, critical) = match name.strip_suffix('!') {
            Some(name) => (name, true),
            None => (name, false),
        };
        let (name, url) = (name.trim(), url.trim());
        if name.is_empty() || url.is_empty() {
            return Err(ServerError::Config(format!(
                "empty name or url in health check {s:?}"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
            critical,
        })
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address
    pub bind: String,

    /// Port number
    pub port: u16,

    /// Service name reported by `/health` and `/metrics/json`
    pub service_name: String,

    /// Service version reported by `/health`
    pub version: String,

    /// Token verification parameters
    pub auth: AuthConfig,

    /// External HTTP dependencies
    pub http_checks: Vec<HttpCheckConfig>,

    /// Samples kept per histogram
    pub histogram_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 4000,
            service_name: "vigil".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            auth: AuthConfig::default(),
            http_checks: Vec::new(),
            histogram_capacity: DEFAULT_HISTOGRAM_CAPACITY,
        }
    }
}

impl Config {
    /// Create a new config with custom port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Create a new config with custom bind address
    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = bind.into();
        self
    }

    pub fn with_service(mut self, name: &str, version: &str) -> Self {
        self.service_name = name.to_string();
        self.version = version.to_string();
        self
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_http_check(mut self, check: HttpCheckConfig) -> Self {
        self.http_checks.push(check);
        self
    }

    pub fn with_histogram_capacity(mut self, capacity: usize) -> Self {
        self.histogram_capacity = capacity;
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_http_check() {
        let check: HttpCheckConfig = "auth!=http://svc-auth:4001/health".parse().unwrap();
        assert_eq!(check.name, "auth");
        assert_eq!(check.url, "http://svc-auth:4001/health");
        assert!(check.critical);

        let check: HttpCheckConfig = "crm=http://svc-crm/health".parse().unwrap();
        assert!(!check.critical);

        assert!("no-separator".parse::<HttpCheckConfig>().is_err());
        assert!("=http://x".parse::<HttpCheckConfig>().is_err());
    }

    #[test]
    fn test_config_builders() {
        let config = Config::default()
            .with_bind("127.0.0.1")
            .with_port(8080)
            .with_service("svc-crm", "2.0.0");
        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(config.service_name, "svc-crm");
        assert_eq!(config.auth.audience, "ewh-saas");
    }
}
