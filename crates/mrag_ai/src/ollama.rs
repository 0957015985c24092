use std::time::Duration;

use mrag_core::config::OllamaConfig;
use mrag_core::error::{codes, AppError};

const HEALTH_TIMEOUT: Duration = Duration::from_millis(800);

/// HTTP client for a local Ollama server. Shared by the embedder and the generation client.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    agent: ureq::Agent,
}

impl OllamaClient {
    /// Client with the default host allowlist and timeouts.
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let defaults = OllamaConfig::default();
        Self::from_config(&OllamaConfig {
            base_url: base_url.to_string(),
            ..defaults
        })
    }

    pub fn from_config(config: &OllamaConfig) -> Result<Self, AppError> {
        let base_url = check_base_url(&config.base_url, &config.allowed_hosts)?;
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_millis(config.connect_timeout_ms))
            .timeout_read(Duration::from_millis(config.read_timeout_ms))
            .build();
        Ok(Self { base_url, agent })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn agent(&self) -> &ureq::Agent {
        &self.agent
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn health_check(&self) -> Result<(), AppError> {
        let resp = self
            .agent
            .get(&self.url("/api/tags"))
            .timeout(HEALTH_TIMEOUT)
            .call();

        match resp {
            Ok(r) if r.status() == 200 => Ok(()),
            Ok(r) => Err(AppError::upstream_unavailable("Ollama health check failed")
                .with_details(format!("status={}", r.status()))),
            Err(e) => Err(AppError::upstream_unavailable("Failed to reach Ollama")
                .with_details(format!("base_url={}; err={}", self.base_url, e))),
        }
    }
}

/// Accepts only `http://<allowed-host>[:port]`, with an optional trailing slash.
fn check_base_url(raw: &str, allowed_hosts: &[String]) -> Result<String, AppError> {
    let base_url = raw.trim().trim_end_matches('/').to_string();
    let reject = |reason: &str| {
        AppError::new(
            codes::REMOTE_NOT_ALLOWED,
            "Ollama base URL must point at an allowed local host",
        )
        .with_details(format!("base_url={base_url}; reason={reason}"))
    };

    let authority = base_url
        .strip_prefix("http://")
        .ok_or_else(|| reject("scheme must be http"))?;
    if authority.is_empty() {
        return Err(reject("missing host"));
    }
    if authority.contains(['/', '@', '?', '#', '[', ']']) {
        return Err(reject("only host and port are allowed"));
    }

    let host = match authority.split_once(':') {
        Some((host, port)) => {
            match port.parse::<u16>() {
                Ok(p) if p != 0 => {}
                _ => return Err(reject("invalid port")),
            }
            host
        }
        None => authority,
    };

    if !allowed_hosts.iter().any(|h| h.eq_ignore_ascii_case(host)) {
        return Err(reject("host not in allowlist"));
    }
    Ok(base_url)
}
