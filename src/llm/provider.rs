//! Model transports
//!
//! A transport performs exactly one chat-completion call against one backend.
//! It knows nothing about councils, retries or fallbacks; those live in the
//! invoker.

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::error::{CouncilError, TransportError};
use crate::llm::{BackendId, ChatCompletion, ChatMessage, ProviderResponse};

/// Generic chat-completion transport
#[async_trait::async_trait]
pub trait ModelTransport: Send + Sync {
    /// Send `messages` to `backend`. A `timeout` the backend cannot honour
    /// must be rejected with [`TransportError::UnsupportedParameter`].
    async fn complete(
        &self,
        backend: &BackendId,
        messages: &[ChatMessage],
        timeout: Option<Duration>,
    ) -> Result<ProviderResponse, TransportError>;
}

#[derive(Debug, Clone)]
struct Route {
    endpoint: String,
    api_key: Option<String>,
    key_reference: Option<String>,
    supports_timeout: bool,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

/// OpenAI-compatible `/chat/completions` transport
pub struct HttpTransport {
    client: Client,
    routes: HashMap<String, Route>,
    default_provider: String,
}

impl HttpTransport {
    /// Build routes for every enabled provider in `config`
    pub fn from_config(config: &Config) -> crate::error::Result<Self> {
        let client = Client::builder().build().map_err(CouncilError::Network)?;

        let routes = config
            .providers
            .iter()
            .filter(|(_, provider)| provider.enabled)
            .map(|(name, provider)| {
                let key_reference = provider
                    .api_key
                    .strip_prefix('$')
                    .map(|var| var.to_string());
                let route = Route {
                    endpoint: provider.endpoint.trim_end_matches('/').to_string(),
                    api_key: config.resolve_api_key(name),
                    key_reference,
                    supports_timeout: provider.supports_timeout,
                };
                (name.clone(), route)
            })
            .collect();

        Ok(Self {
            client,
            routes,
            default_provider: config.default_provider.clone(),
        })
    }

    /// Pick the provider route and upstream model name for a backend.
    /// `provider/model` ids select a configured provider; anything else is
    /// sent verbatim to the default provider.
    fn resolve<'a>(
        &'a self,
        backend: &'a BackendId,
    ) -> Result<(&'a Route, &'a str), TransportError> {
        if let (Some(provider), model) = backend.route() {
            if let Some(route) = self.routes.get(provider) {
                return Ok((route, model));
            }
        }

        self.routes
            .get(&self.default_provider)
            .map(|route| (route, backend.as_str()))
            .ok_or_else(|| TransportError::UnknownRoute(backend.to_string()))
    }
}

#[async_trait::async_trait]
impl ModelTransport for HttpTransport {
    async fn complete(
        &self,
        backend: &BackendId,
        messages: &[ChatMessage],
        timeout: Option<Duration>,
    ) -> Result<ProviderResponse, TransportError> {
        let (route, model) = self.resolve(backend)?;

        if route.api_key.is_none() {
            if let Some(var) = &route.key_reference {
                return Err(TransportError::MissingApiKey(var.clone()));
            }
        }

        let url = format!("{}/chat/completions", route.endpoint);
        let mut request = self
            .client
            .post(&url)
            .json(&CompletionRequest { model, messages });

        if let Some(key) = &route.api_key {
            request = request.bearer_auth(key);
        }
        if let Some(timeout) = timeout {
            if !route.supports_timeout {
                return Err(TransportError::UnsupportedParameter("timeout"));
            }
            request = request.timeout(timeout);
        }

        debug!("POST {} model={}", url, model);
        let response = request
            .send()
            .await
            .map_err(|e| classify_error(e, timeout))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify_error(e, timeout))?;
        if !status.is_success() {
            return Err(TransportError::Provider {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        decode_completion(&body)
    }
}

/// The request deadline covers the body as well as the headers
fn classify_error(error: reqwest::Error, timeout: Option<Duration>) -> TransportError {
    match timeout {
        Some(after) if error.is_timeout() => TransportError::Timeout(after),
        _ => TransportError::Network(error),
    }
}

/// Decode a completion body, preferring the typed layout
pub fn decode_completion(body: &[u8]) -> Result<ProviderResponse, TransportError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| TransportError::Malformed(e.to_string()))?;

    match serde_json::from_value::<ChatCompletion>(value.clone()) {
        Ok(completion) => Ok(ProviderResponse::Attributes(completion)),
        Err(_) => Ok(ProviderResponse::Mapping(value)),
    }
}
