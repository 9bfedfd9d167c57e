use std::time::Duration;

use hyper::ext::ReasonPhrase;
use reqwest::{blocking, header, Method, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use iothub_data_formats::{
    constants::{
        self, DEFAULT_API_VERSION, DEFAULT_MAX_IDLE_CONNECTIONS, DEFAULT_REQUEST_TIMEOUT_SECS,
        DEFAULT_TOKEN_VALIDITY_SECS, HOST_NAME,
    },
    Credentials, TokenSigner,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Error in client data: {0}")]
    DataFormat(#[from] iothub_data_formats::Error),
    #[error("Error performing request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Operation '{operation}' is not available with {scope} credentials")]
    WrongScope {
        operation: &'static str,
        scope: &'static str,
    },
}

pub type RequestResult<T> = Result<T, Error>;

/// What the authorization token gets signed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceScope {
    /// The lower-cased host name of the hub.
    Host,
    /// The lower-cased host, path and query of each request.
    RequestPath,
}

impl Default for ResourceScope {
    fn default() -> Self {
        ResourceScope::Host
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Https,
    Http,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Https => "https",
            Scheme::Http => "http",
        }
    }
}

impl Default for Scheme {
    fn default() -> Self {
        Scheme::Https
    }
}

/// Client tunables. Every field has a default, so a partial settings file
/// deserializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_version: String,
    pub request_timeout_secs: u64,
    pub token_validity_secs: u64,
    /// Idle connections kept per host by the pool.
    pub max_idle_connections: usize,
    pub user_agent: String,
    pub resource_scope: ResourceScope,
    pub scheme: Scheme,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            api_version: DEFAULT_API_VERSION.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            token_validity_secs: DEFAULT_TOKEN_VALIDITY_SECS,
            max_idle_connections: DEFAULT_MAX_IDLE_CONNECTIONS,
            user_agent: constants::default_user_agent(),
            resource_scope: ResourceScope::default(),
            scheme: Scheme::default(),
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn token_validity(&self) -> Duration {
        Duration::from_secs(self.token_validity_secs)
    }
}

/// Outcome of a request that reached the hub, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubResponse {
    status: StatusCode,
    status_line: String,
    body: String,
}

impl HubResponse {
    /// `reason` is the phrase the hub sent, when it differs from the
    /// canonical one for `status`.
    pub(crate) fn new(status: StatusCode, reason: Option<&str>, body: String) -> Self {
        let status_line = match reason.or_else(|| status.canonical_reason()) {
            Some(reason) => format!("{} {}", status.as_u16(), reason),
            None => status.as_u16().to_string(),
        };
        HubResponse {
            status,
            status_line,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// `"<code> <reason>"`, e.g. `"204 No Content"`.
    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn into_body(self) -> String {
        self.body
    }
}

/// Signs and sends requests for one set of credentials.
///
/// The underlying connection pool lives as long as the client and is shared
/// by every request made through it, including from other threads.
#[derive(Debug)]
pub struct ServiceClient {
    credentials: Credentials,
    config: ClientConfig,
    signer: TokenSigner,
    client: blocking::Client,
}

impl ServiceClient {
    pub fn new(credentials: Credentials, config: ClientConfig) -> RequestResult<Self> {
        if credentials.host_name().is_empty() {
            return Err(iothub_data_formats::Error::MissingField(HOST_NAME).into());
        }
        let signer = TokenSigner::new(&credentials, config.token_validity())?;

        let client = blocking::Client::builder()
            .pool_max_idle_per_host(config.max_idle_connections)
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.as_str())
            .build()?;

        log::debug!(
            "Created client for {} ({} scope)",
            credentials.host_name(),
            if credentials.is_device() {
                "device"
            } else {
                "service"
            }
        );

        Ok(ServiceClient {
            credentials,
            config,
            signer,
            client,
        })
    }

    pub fn from_connection_string(
        connection_string: &str,
        config: ClientConfig,
    ) -> RequestResult<Self> {
        Self::new(connection_string.parse()?, config)
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    pub fn is_device(&self) -> bool {
        self.credentials.is_device()
    }

    fn signed_resource<'a>(&'a self, url: &'a str) -> &'a str {
        match self.config.resource_scope {
            ResourceScope::Host => self.credentials.host_name(),
            ResourceScope::RequestPath => url,
        }
    }

    /// Sends `method` to `url` (`host/path?query`, no scheme) with a fresh
    /// token. An empty `body` sends no body.
    ///
    /// Only failures to get a response at all are errors; any status the hub
    /// answers with is returned in the [`HubResponse`].
    pub fn perform(&self, method: Method, url: &str, body: &str) -> RequestResult<HubResponse> {
        let token = self.signer.sign_now(self.signed_resource(url))?;
        let full_url = format!("{}://{}", self.config.scheme.as_str(), url);

        log::debug!("{} {}", method, full_url);

        let mut req = self
            .client
            .request(method.clone(), full_url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, token.to_string());

        if method == Method::DELETE {
            req = req.header(header::IF_MATCH, "*");
        }
        if !body.is_empty() {
            log::trace!("Request body: {}", body);
            req = req.body(body.to_string());
        }

        let resp = req.send()?;
        let status = resp.status();
        let reason = resp
            .extensions()
            .get::<ReasonPhrase>()
            .and_then(|reason| std::str::from_utf8(reason.as_bytes()).ok())
            .map(String::from);
        // Read to the end so the connection goes back to the pool
        let text = resp.text()?;

        log::debug!("{} {} -> {}", method, url, status);
        log::trace!("Response body: {}", text);

        Ok(HubResponse::new(status, reason.as_deref(), text))
    }
}
