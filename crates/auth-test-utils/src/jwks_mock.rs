//! Mock JWKS endpoint backed by wiremock.
//!
//! Expected fetch counts are set with [`MockJwksBuilder::expect_fetches`];
//! wiremock verifies them when the server is dropped.

use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock serves the key set from.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Wrap keys in a JWKS document.
pub fn jwks_document(keys: Vec<Value>) -> Value {
    json!({ "keys": keys })
}

/// Builder for a [`MockJwksServer`].
#[derive(Debug)]
pub struct MockJwksBuilder {
    response: ResponseTemplate,
    expected_fetches: Option<u64>,
}

impl MockJwksBuilder {
    /// Answer each fetch only after `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.response = self.response.set_delay(delay);
        self
    }

    /// Require exactly `count` fetches over the server's lifetime.
    pub fn expect_fetches(mut self, count: u64) -> Self {
        self.expected_fetches = Some(count);
        self
    }

    pub async fn start(self) -> MockJwksServer {
        let server = MockServer::start().await;
        let mock = Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(self.response);
        let mock = match self.expected_fetches {
            Some(count) => mock.expect(count),
            None => mock,
        };
        mock.mount(&server).await;
        MockJwksServer { server }
    }
}

/// A running JWKS endpoint.
pub struct MockJwksServer {
    server: MockServer,
}

impl MockJwksServer {
    /// Serve `keys` with status 200.
    pub fn serving(keys: Vec<Value>) -> MockJwksBuilder {
        MockJwksBuilder {
            response: ResponseTemplate::new(200).set_body_json(jwks_document(keys)),
            expected_fetches: None,
        }
    }

    /// Answer every fetch with `status` and an empty body.
    pub fn failing(status: u16) -> MockJwksBuilder {
        MockJwksBuilder {
            response: ResponseTemplate::new(status),
            expected_fetches: None,
        }
    }

    /// Answer every fetch with an arbitrary body.
    pub fn raw(status: u16, body: &str) -> MockJwksBuilder {
        MockJwksBuilder {
            response: ResponseTemplate::new(status).set_body_string(body),
            expected_fetches: None,
        }
    }

    /// Shorthand for `serving(keys).start()`.
    pub async fn start(keys: Vec<Value>) -> Self {
        Self::serving(keys).start().await
    }

    /// Full URL of the key set.
    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Number of requests the server has seen so far.
    pub async fn fetch_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map_or(0, |requests| requests.len())
    }

    /// Replace the served response, e.g. to model key rotation or an outage.
    /// Also clears the recorded requests.
    pub async fn respond_with(&self, response: ResponseTemplate) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    /// Start serving `keys`, replacing whatever was served before.
    pub async fn rotate_to(&self, keys: Vec<Value>) {
        self.respond_with(ResponseTemplate::new(200).set_body_json(jwks_document(keys)))
            .await;
    }

    pub fn inner(&self) -> &MockServer {
        &self.server
    }
}
