//! GitHub GraphQL transport
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client with the configured user agent and previews
//! - Posting rendered queries with bearer authentication
//! - Classifying failures as transient or terminal

use super::{Transport, TransportError};
use crate::config::GithubConfig;
use crate::query::Query;
use crate::ConfigError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

/// Body of a GraphQL response
#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    #[serde(rename = "type")]
    kind: Option<String>,
    message: Option<String>,
}

/// Transport posting queries to GitHub's GraphQL endpoint
#[derive(Debug, Clone)]
pub struct GithubTransport {
    client: Client,
    endpoint: Url,
    token: Option<String>,
}

impl GithubTransport {
    /// Creates a transport from an existing client
    pub fn new(client: Client, endpoint: Url, token: Option<String>) -> Self {
        Self {
            client,
            endpoint,
            token,
        }
    }

    /// Builds a transport from the `[github]` config table
    ///
    /// The access token is read from the environment variable named by
    /// `token-env`; requests are sent unauthenticated if it is unset.
    ///
    /// # Arguments
    ///
    /// * `config` - The GitHub configuration
    ///
    /// # Returns
    ///
    /// * `Ok(GithubTransport)` - Successfully built transport
    /// * `Err(TrawlError)` - Invalid endpoint or failed to build the HTTP client
    pub fn from_config(config: &GithubConfig) -> crate::Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid endpoint '{}': {}", config.endpoint, e))
        })?;
        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|token| !token.is_empty());
        if token.is_none() {
            tracing::warn!(
                "{} is not set; sending unauthenticated requests",
                config.token_env
            );
        }
        Ok(Self::new(build_http_client(config)?, endpoint, token))
    }

    fn classify(status: StatusCode, body: &[u8]) -> Result<Value, TransportError> {
        match status {
            StatusCode::NOT_FOUND => {
                return Err(TransportError::Terminal(format!("HTTP {}", status)))
            }
            StatusCode::UNAUTHORIZED => {
                return Err(TransportError::Terminal(
                    "HTTP 401: bad credentials".to_string(),
                ))
            }
            s if !s.is_success() => return Err(TransportError::Transient(format!("HTTP {}", s))),
            _ => {}
        }

        let parsed: GraphqlResponse = serde_json::from_slice(body)
            .map_err(|e| TransportError::Transient(format!("undecodable response body: {}", e)))?;

        if let Some(not_found) = parsed
            .errors
            .iter()
            .find(|e| e.kind.as_deref() == Some("NOT_FOUND"))
        {
            return Err(TransportError::Terminal(format!(
                "NOT_FOUND: {}",
                not_found.message.as_deref().unwrap_or("")
            )));
        }

        match parsed.data {
            Some(data) if !data.is_null() => {
                for error in &parsed.errors {
                    tracing::warn!(
                        "GraphQL error alongside data: {}",
                        error.message.as_deref().unwrap_or("unknown")
                    );
                }
                Ok(data)
            }
            _ => {
                let messages: Vec<_> = parsed
                    .errors
                    .iter()
                    .filter_map(|e| e.message.as_deref())
                    .collect();
                Err(TransportError::Transient(format!(
                    "no data in response: {}",
                    messages.join("; ")
                )))
            }
        }
    }
}

#[async_trait]
impl Transport for GithubTransport {
    async fn execute(&self, query: &Query) -> Result<Value, TransportError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&json!({ "query": query.to_string() }));
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("bearer {}", token));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Transient("request timeout".to_string())
            } else if e.is_connect() {
                TransportError::Transient(format!("connection failed: {}", e))
            } else {
                TransportError::Transient(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Transient(format!("failed to read body: {}", e)))?;

        Self::classify(status, &body)
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The GitHub configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(TrawlError)` - Invalid Accept media types or failed to build client
pub fn build_http_client(config: &GithubConfig) -> crate::Result<Client> {
    let accept = HeaderValue::from_str(&config.accept.join(",")).map_err(|e| {
        ConfigError::Validation(format!(
            "accept media types {:?} are not a valid header value: {}",
            config.accept, e
        ))
    })?;
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, accept);

    Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Field;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config() -> GithubConfig {
        GithubConfig {
            endpoint: "https://api.github.com/graphql".to_string(),
            user_agent: "repo-trawler-test/0.1".to_string(),
            token_env: "REPO_TRAWLER_TEST_TOKEN_UNSET".to_string(),
            accept: vec!["application/vnd.github.hawkgirl-preview+json".to_string()],
            timeout_secs: 5,
        }
    }

    fn rate_limit_query() -> Query {
        Query::new(vec![Field::new("rateLimit").leaves(&["remaining"])])
    }

    async fn transport_for(server: &MockServer, token: Option<&str>) -> GithubTransport {
        let client = build_http_client(&create_test_config()).unwrap();
        let endpoint = Url::parse(&format!("{}/graphql", server.uri())).unwrap();
        GithubTransport::new(client, endpoint, token.map(str::to_string))
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(&create_test_config()).is_ok());
    }

    #[test]
    fn test_build_http_client_rejects_bad_accept() {
        let mut config = create_test_config();
        config.accept = vec!["application/json\r\nX-Injected: 1".to_string()];
        assert!(matches!(
            build_http_client(&config),
            Err(crate::TrawlError::Config(ConfigError::Validation(_)))
        ));
    }

    #[test]
    fn test_from_config_rejects_bad_endpoint() {
        let mut config = create_test_config();
        assert!(GithubTransport::from_config(&config).is_ok());

        config.endpoint = "not a url".to_string();
        assert!(GithubTransport::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_execute_returns_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(header("authorization", "bearer s3cret"))
            .and(header("accept", "application/vnd.github.hawkgirl-preview+json"))
            .and(body_partial_json(
                json!({ "query": "query { rateLimit { remaining } }" }),
            ))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "data": { "rateLimit": { "remaining": 4999 } } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = transport_for(&server, Some("s3cret")).await;
        let data = transport.execute(&rate_limit_query()).await.unwrap();
        assert_eq!(data["rateLimit"]["remaining"], 4999);
    }

    #[tokio::test]
    async fn test_not_found_error_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "repository": null },
                "errors": [{
                    "type": "NOT_FOUND",
                    "path": ["repository"],
                    "message": "Could not resolve to a Repository with the name 'x/y'."
                }]
            })))
            .mount(&server)
            .await;

        let err = transport_for(&server, None)
            .await
            .execute(&rate_limit_query())
            .await
            .unwrap_err();
        assert!(err.is_terminal());
    }

    #[tokio::test]
    async fn test_http_status_classification() {
        for (status, terminal) in [
            (404, true),
            (401, true),
            (403, false),
            (429, false),
            (502, false),
        ] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;

            let err = transport_for(&server, None)
                .await
                .execute(&rate_limit_query())
                .await
                .unwrap_err();
            assert_eq!(err.is_terminal(), terminal, "status {}", status);
        }
    }

    #[tokio::test]
    async fn test_errors_without_data_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": [{ "message": "Something went wrong while executing your query." }]
            })))
            .mount(&server)
            .await;

        let err = transport_for(&server, None)
            .await
            .execute(&rate_limit_query())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::Transient(
                "no data in response: Something went wrong while executing your query."
                    .to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_undecodable_body_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>unicorn</html>"))
            .mount(&server)
            .await;

        let err = transport_for(&server, None)
            .await
            .execute(&rate_limit_query())
            .await
            .unwrap_err();
        assert!(!err.is_terminal());
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let client = build_http_client(&create_test_config()).unwrap();
        let transport =
            GithubTransport::new(client, Url::parse("http://127.0.0.1:9/graphql").unwrap(), None);
        let err = transport.execute(&rate_limit_query()).await.unwrap_err();
        assert!(!err.is_terminal());
    }
}
