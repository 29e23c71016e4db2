//! HTTP Client Factory
//!
//! Builds the reqwest client used by providers, with optional proxy support.

use std::time::Duration;

use opsdesk_core::proxy::ProxyConfig;

use crate::types::{LlmError, LlmResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Build a `reqwest::Client` with the resolved proxy configuration.
///
/// - `Some(proxy)` -> route all requests through the proxy
/// - `None` -> explicitly disable proxy (`no_proxy`), ignoring env vars
///
/// Only the connect phase is bounded; request duration is left to the caller.
pub fn build_http_client(proxy: Option<&ProxyConfig>) -> LlmResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT);
    match proxy {
        Some(cfg) => {
            let mut p = reqwest::Proxy::all(cfg.url()).map_err(|e| LlmError::InvalidRequest {
                message: format!("invalid proxy {}: {}", cfg.url(), e),
            })?;
            if let (Some(u), Some(pw)) = (&cfg.username, &cfg.password) {
                p = p.basic_auth(u, pw);
            }
            builder = builder.proxy(p);
        }
        None => {
            builder = builder.no_proxy();
        }
    }
    builder.build().map_err(|e| LlmError::Other {
        message: format!("failed to build HTTP client: {}", e),
    })
}
