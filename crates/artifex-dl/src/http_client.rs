use std::{fmt, time::Duration};

use ureq::{
    http::{self, HeaderMap, Uri},
    typestate::WithoutBody,
    Agent, Proxy, RequestBuilder,
};

pub const DEFAULT_USER_AGENT: &str = concat!("artifex/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub user_agent: Option<String>,
    pub headers: Option<HeaderMap>,
    pub proxy: Option<Proxy>,
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    /// A config with the `artifex/<version>` user agent and no proxy, headers or timeout.
    ///
    /// # Examples
    ///
    /// ```
    /// use artifex_dl::http_client::{ClientConfig, DEFAULT_USER_AGENT};
    ///
    /// let cfg = ClientConfig::default();
    /// assert_eq!(cfg.user_agent.as_deref(), Some(DEFAULT_USER_AGENT));
    /// assert!(cfg.proxy.is_none());
    /// ```
    fn default() -> Self {
        Self {
            user_agent: Some(DEFAULT_USER_AGENT.into()),
            proxy: None,
            headers: None,
            timeout: None,
        }
    }
}

impl ClientConfig {
    /// Builds an [`HttpClient`] from this config.
    ///
    /// `timeout` bounds connecting and waiting for the response head. Reading the body is
    /// never timed, so a slow transfer that keeps delivering bytes runs to completion.
    ///
    /// Non-2xx statuses are returned as ordinary responses rather than errors so callers
    /// decide what a given status means for them.
    pub fn build(&self) -> HttpClient {
        let mut config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .proxy(self.proxy.clone())
            .timeout_connect(self.timeout)
            .timeout_recv_response(self.timeout);

        if let Some(user_agent) = &self.user_agent {
            config = config.user_agent(user_agent);
        }

        HttpClient {
            agent: config.build().into(),
            headers: self.headers.clone(),
        }
    }
}

/// An HTTP client handle passed explicitly to everything that talks to the network.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Clone)]
pub struct HttpClient {
    agent: Agent,
    headers: Option<HeaderMap>,
}

impl HttpClient {
    pub fn new(config: &ClientConfig) -> Self {
        config.build()
    }

    /// Create a GET request builder for `uri` with the configured extra headers applied.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use artifex_dl::http_client::HttpClient;
    ///
    /// let client = HttpClient::default();
    /// let response = client.get("https://example.com").call();
    /// ```
    pub fn get<T>(&self, uri: T) -> RequestBuilder<WithoutBody>
    where
        Uri: TryFrom<T>,
        <Uri as TryFrom<T>>::Error: Into<http::Error>,
    {
        apply_headers(self.agent.get(uri), &self.headers)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        ClientConfig::default().build()
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Apply headers from an optional `HeaderMap` to a `RequestBuilder`.
fn apply_headers<B>(mut req: RequestBuilder<B>, headers: &Option<HeaderMap>) -> RequestBuilder<B> {
    if let Some(headers) = headers {
        for (key, value) in headers.iter() {
            req = req.header(key, value);
        }
    }
    req
}

#[cfg(test)]
mod tests {
    use std::{net::TcpListener, thread};

    use httpmock::prelude::*;

    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert!(config.user_agent.unwrap().starts_with("artifex/"));
        assert!(config.proxy.is_none());
        assert!(config.headers.is_none());
        assert!(config.timeout.is_none());
    }

    #[test]
    fn test_client_sends_configured_headers_and_user_agent() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/ping")
                .header("x-artifex", "1")
                .header("user-agent", "artifex-test/1.0");
            then.status(200).body("pong");
        });

        let mut headers = HeaderMap::new();
        headers.insert("x-artifex", http::HeaderValue::from_static("1"));
        let client = ClientConfig {
            user_agent: Some("artifex-test/1.0".into()),
            headers: Some(headers),
            proxy: None,
            timeout: Some(Duration::from_secs(5)),
        }
        .build();

        let resp = client.get(server.url("/ping")).call().unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        mock.assert();
    }

    #[test]
    fn test_client_returns_error_statuses_as_responses() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/missing");
            then.status(404).body("nope");
        });

        let client = HttpClient::default();
        let resp = client.get(server.url("/missing")).call().unwrap();
        assert_eq!(resp.status().as_u16(), 404);
    }

    #[test]
    fn test_client_clone_and_debug() {
        let client = HttpClient::default();
        let cloned = client.clone();
        assert!(format!("{:?}", cloned).contains("HttpClient"));
    }

    #[test]
    fn test_timeout_applies_to_silent_servers() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (_stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_secs(3));
        });

        let client = ClientConfig {
            timeout: Some(Duration::from_millis(300)),
            ..Default::default()
        }
        .build();

        assert!(client.get(format!("http://{addr}/slow")).call().is_err());
    }
}
