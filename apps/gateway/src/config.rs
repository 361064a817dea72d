//! Gateway configuration.
//!
//! Values come from the environment with the `HIE` prefix and a `__`
//! section separator (`HIE__SERVER__PORT=8080`), optionally seeded from a
//! `.env` file in development.

use std::net::SocketAddr;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub http: HttpConfig,
    pub direct: DirectConfig,
    /// CommonWell OAuth2 credentials. Absent means unauthenticated calls,
    /// which is only useful against test fixtures.
    pub commonwell: Option<CommonWellConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info` or `hie_gateway=debug,info`.
    pub level: String,
    /// `text` or `json`.
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout for outbound HTTP calls.
    pub timeout_secs: u64,
    /// Budget for each participant in a federated fan-out.
    pub fanout_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectConfig {
    /// Allow self-signed bootstrap certificates on address registration.
    /// Never enable outside development.
    pub insecure_bootstrap: bool,
    /// Comma-separated paths to PEM trust anchor files.
    pub trust_anchor_files: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommonWellConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "text")?
            .set_default("http.timeout_secs", 30)?
            .set_default("http.fanout_timeout_secs", 30)?
            .set_default("direct.insecure_bootstrap", false)?
            .add_source(config::Environment::with_prefix("HIE").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be non-zero".to_string());
        }
        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(format!(
                "logging.format must be `text` or `json`, got `{}`",
                self.logging.format
            ));
        }
        if self.http.timeout_secs == 0 || self.http.fanout_timeout_secs == 0 {
            return Err("http timeouts must be non-zero".to_string());
        }
        if let Some(commonwell) = &self.commonwell {
            if commonwell.token_url.is_empty() || commonwell.client_id.is_empty() {
                return Err(
                    "commonwell.token_url and commonwell.client_id must be set when the section is present"
                        .to_string(),
                );
            }
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }

    /// Trust anchor file paths, split from the comma-separated setting.
    pub fn trust_anchor_paths(&self) -> Vec<String> {
        self.direct
            .trust_anchor_files
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "text".to_string(),
            },
            http: HttpConfig {
                timeout_secs: 30,
                fanout_timeout_secs: 30,
            },
            direct: DirectConfig {
                insecure_bootstrap: false,
                trust_anchor_files: Some("anchors/a.pem, anchors/b.pem".to_string()),
            },
            commonwell: None,
        }
    }

    #[test]
    fn valid_config_passes() {
        let config = base_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.socket_addr().unwrap().port(), 8080);
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut config = base_config();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let mut config = base_config();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn anchor_paths_are_split_and_trimmed() {
        let config = base_config();
        assert_eq!(
            config.trust_anchor_paths(),
            vec!["anchors/a.pem".to_string(), "anchors/b.pem".to_string()]
        );
    }
}
