// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Probing the [Metadata Service].
//!
//! Google Cloud environments such as Compute Engine, Kubernetes Engine, or
//! Cloud Run provide a metadata service local to the VM (or pod). The
//! service issues access tokens for the service accounts attached to the
//! VM, without any key material.
//!
//! [Metadata Service]: https://cloud.google.com/compute/docs/metadata/overview

use crate::Result;
use crate::constants::GCE_METADATA_HOST_ENV_VAR;
use crate::errors::{self, CredentialsError};
use crate::scopes::ScopeSet;
use crate::token::{Token, TokenProvider};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::{Client as ReqwestClient, RequestBuilder, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const METADATA_FLAVOR_VALUE: &str = "Google";
const METADATA_FLAVOR: &str = "metadata-flavor";
const METADATA_ROOT: &str = "http://metadata.google.internal";
const SERVICE_ACCOUNTS_URI: &str = "/computeMetadata/v1/instance/service-accounts";

// Keeps the service account in a single path segment. Emails pass unchanged.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

fn service_account_segment(service_account: &str) -> Result<String> {
    if matches!(service_account, "" | "." | "..") {
        return Err(errors::non_transient_from_msg(format!(
            "`{service_account}` is not a valid service account"
        )));
    }
    Ok(utf8_percent_encode(service_account, PATH_SEGMENT).to_string())
}

/// The service account name the metadata service uses for the VM's
/// default service account.
pub const DEFAULT_SERVICE_ACCOUNT: &str = "default";

/// Obtains tokens from the metadata service of the current host.
///
/// Implementations must return `Ok(None)`, not an error, when the host is
/// not running on a platform with a metadata service. The chain bounds each
/// probe with a timeout, so implementations need not.
#[async_trait::async_trait]
pub trait MetadataProbe: std::fmt::Debug + Send + Sync {
    async fn probe(&self, service_account: &str, scopes: &ScopeSet) -> Result<Option<Token>>;
}

/// The default [MetadataProbe], talking HTTP to the metadata server.
///
/// The endpoint is `http://metadata.google.internal` unless the
/// `GCE_METADATA_HOST` environment variable names a different host.
#[derive(Clone, Debug)]
pub struct HttpMetadataProbe {
    endpoint: String,
    inner: ReqwestClient,
}

impl Default for HttpMetadataProbe {
    fn default() -> Self {
        Self::new(None)
    }
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
struct MDSTokenResponse {
    access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_in: Option<u64>,
    token_type: String,
}

impl HttpMetadataProbe {
    /// Creates a probe, optionally overriding the endpoint.
    ///
    /// The `GCE_METADATA_HOST` environment variable takes precedence over
    /// `endpoint`.
    pub fn new(endpoint: Option<String>) -> Self {
        let endpoint = std::env::var(GCE_METADATA_HOST_ENV_VAR)
            .map(|host| format!("http://{host}"))
            .ok()
            .or(endpoint)
            .unwrap_or_else(|| METADATA_ROOT.to_string());
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            inner: ReqwestClient::new(),
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.inner
            .get(format!("{}{}", self.endpoint, path))
            .header(METADATA_FLAVOR, METADATA_FLAVOR_VALUE)
    }

    /// Returns `true` if the endpoint answers as a metadata server.
    async fn on_platform(&self) -> bool {
        match self.get("/").send().await {
            Ok(response) => response
                .headers()
                .get(METADATA_FLAVOR)
                .is_some_and(|v| v == METADATA_FLAVOR_VALUE),
            Err(e) => {
                tracing::debug!("metadata server not reachable: {e}");
                false
            }
        }
    }

    async fn access_token(&self, service_account: &str, scopes: &ScopeSet) -> Result<Token> {
        let path = format!(
            "{SERVICE_ACCOUNTS_URI}/{}/token",
            service_account_segment(service_account)?
        );
        let request = self.get(&path);
        let request = if scopes.is_empty() {
            request
        } else {
            request.query(&[("scopes", scopes.joined(","))])
        };

        let response = request
            .send()
            .await
            .map_err(|e| CredentialsError::new(true, "failed to fetch access token", e))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(errors::non_transient_from_msg(format!(
                "the metadata server does not know the service account `{service_account}`"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialsError::from_msg(
                errors::is_transient_status(status),
                format!("failed to fetch access token. Status: {status}. Body: {body}"),
            ));
        }
        let response = response
            .json::<MDSTokenResponse>()
            .await
            .map_err(|e| CredentialsError::from_source(!e.is_decode(), e))?;

        Ok(Token {
            token: response.access_token,
            token_type: response.token_type,
            expires_at: response
                .expires_in
                .map(|d| Instant::now() + Duration::from_secs(d)),
            metadata: None,
        })
    }
}

#[async_trait::async_trait]
impl MetadataProbe for HttpMetadataProbe {
    async fn probe(&self, service_account: &str, scopes: &ScopeSet) -> Result<Option<Token>> {
        if !self.on_platform().await {
            return Ok(None);
        }
        self.access_token(service_account, scopes).await.map(Some)
    }
}

/// Refreshes a metadata service credential by probing again.
#[derive(Debug)]
pub(crate) struct MetadataTokenProvider {
    pub(crate) probe: Arc<dyn MetadataProbe>,
    pub(crate) service_account: String,
    pub(crate) scopes: ScopeSet,
    pub(crate) timeout: Duration,
}

#[async_trait::async_trait]
impl TokenProvider for MetadataTokenProvider {
    async fn token(&self) -> Result<Token> {
        let probe = self.probe.probe(&self.service_account, &self.scopes);
        match tokio::time::timeout(self.timeout, probe).await {
            Ok(Ok(Some(token))) => Ok(token),
            Ok(Ok(None)) => Err(errors::non_transient_from_msg(
                "the metadata service is no longer available",
            )),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CredentialsError::from_msg(
                true,
                "timeout waiting for the metadata service",
            )),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use scoped_env::ScopedEnv;
    use serial_test::{parallel, serial};
    use test_case::test_case;

    mockall::mock! {
        #[derive(Debug)]
        pub MetadataProbe { }

        #[async_trait::async_trait]
        impl MetadataProbe for MetadataProbe {
            async fn probe(&self, service_account: &str, scopes: &ScopeSet) -> Result<Option<Token>>;
        }
    }

    fn expect_ping(server: &Server) {
        server.expect(
            Expectation::matching(request::method_path("GET", "/")).respond_with(
                status_code(200).insert_header("Metadata-Flavor", METADATA_FLAVOR_VALUE),
            ),
        );
    }

    #[tokio::test]
    #[parallel]
    async fn probe_success() -> anyhow::Result<()> {
        let server = Server::run();
        expect_ping(&server);
        let response = MDSTokenResponse {
            access_token: "test-token".to_string(),
            expires_in: Some(3600),
            token_type: "Bearer".to_string(),
        };
        server.expect(
            Expectation::matching(all_of![
                request::method("GET"),
                request::path(format!("{SERVICE_ACCOUNTS_URI}/default/token")),
                request::headers(contains(("metadata-flavor", "Google"))),
                request::query(url_decoded(contains(("scopes", "scope1,scope2")))),
            ])
            .respond_with(
                status_code(200)
                    .insert_header("Content-Type", "application/json")
                    .body(serde_json::to_string(&response)?),
            ),
        );

        let probe = HttpMetadataProbe::new(Some(format!("http://{}", server.addr())));
        let token = probe
            .probe("default", &ScopeSet::from(["scope1", "scope2"]))
            .await?
            .expect("running against a fake metadata server");
        assert_eq!(token.token, "test-token");
        assert_eq!(token.token_type, "Bearer");
        assert!(token.expires_at.is_some(), "{token:?}");
        Ok(())
    }

    #[tokio::test]
    #[parallel]
    async fn probe_not_a_metadata_server() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/"))
                .respond_with(status_code(200).body("hello")),
        );
        let probe = HttpMetadataProbe::new(Some(format!("http://{}", server.addr())));
        let got = probe.probe("default", &ScopeSet::new()).await?;
        assert!(got.is_none(), "{got:?}");
        Ok(())
    }

    #[tokio::test]
    #[parallel]
    async fn probe_unreachable() -> anyhow::Result<()> {
        // Nothing listens on port 1 in the test environments.
        let probe = HttpMetadataProbe::new(Some("http://127.0.0.1:1".to_string()));
        let got = probe.probe("default", &ScopeSet::new()).await?;
        assert!(got.is_none(), "{got:?}");
        Ok(())
    }

    #[tokio::test]
    #[parallel]
    async fn probe_unknown_service_account() {
        let server = Server::run();
        expect_ping(&server);
        server.expect(
            Expectation::matching(request::method_path(
                "GET",
                format!("{SERVICE_ACCOUNTS_URI}/nobody@p.iam/token"),
            ))
            .respond_with(status_code(404).body("Not Found")),
        );
        let probe = HttpMetadataProbe::new(Some(format!("http://{}", server.addr())));
        let err = probe
            .probe("nobody@p.iam", &ScopeSet::new())
            .await
            .expect_err("unknown service accounts are rejected");
        assert!(!err.is_transient(), "{err:?}");
        assert!(err.to_string().contains("nobody@p.iam"), "{err}");
    }

    #[tokio::test]
    #[parallel]
    async fn service_account_is_one_path_segment() -> anyhow::Result<()> {
        let server = Server::run();
        expect_ping(&server);
        let response = MDSTokenResponse {
            access_token: "test-token".to_string(),
            expires_in: None,
            token_type: "Bearer".to_string(),
        };
        server.expect(
            Expectation::matching(request::method_path(
                "GET",
                format!("{SERVICE_ACCOUNTS_URI}/a%2F..%2Fb@p.iam/token"),
            ))
            .respond_with(
                status_code(200)
                    .insert_header("Content-Type", "application/json")
                    .body(serde_json::to_string(&response)?),
            ),
        );
        let client = HttpMetadataProbe::new(Some(format!("http://{}", server.addr())));
        let token = client
            .probe("a/../b@p.iam", &ScopeSet::new())
            .await?
            .expect("running against a fake metadata server");
        assert_eq!(token.token, "test-token");
        Ok(())
    }

    #[test_case(""; "empty")]
    #[test_case("."; "dot")]
    #[test_case(".."; "dot dot")]
    #[tokio::test]
    #[parallel]
    async fn dot_segments_rejected(service_account: &str) {
        let server = Server::run();
        expect_ping(&server);
        let client = HttpMetadataProbe::new(Some(format!("http://{}", server.addr())));
        let err = client
            .probe(service_account, &ScopeSet::new())
            .await
            .expect_err("not a valid path segment");
        assert!(!err.is_transient(), "{err:?}");
    }

    #[tokio::test]
    #[parallel]
    async fn probe_server_error_is_transient() {
        let server = Server::run();
        expect_ping(&server);
        server.expect(
            Expectation::matching(request::method_path(
                "GET",
                format!("{SERVICE_ACCOUNTS_URI}/default/token"),
            ))
            .respond_with(status_code(503).body("try again")),
        );
        let probe = HttpMetadataProbe::new(Some(format!("http://{}", server.addr())));
        let err = probe
            .probe("default", &ScopeSet::new())
            .await
            .expect_err("503 is an error");
        assert!(err.is_transient(), "{err:?}");
        assert!(err.to_string().contains("try again"), "{err}");
    }

    #[test]
    #[serial]
    fn endpoint_from_env() {
        let _e = ScopedEnv::set(GCE_METADATA_HOST_ENV_VAR, "10.0.0.1:8080");
        let probe = HttpMetadataProbe::new(Some("http://ignored".to_string()));
        assert_eq!(probe.endpoint, "http://10.0.0.1:8080");
    }

    #[test]
    #[serial]
    fn endpoint_default() {
        let _e = ScopedEnv::remove(GCE_METADATA_HOST_ENV_VAR);
        assert_eq!(HttpMetadataProbe::default().endpoint, METADATA_ROOT);
        let probe = HttpMetadataProbe::new(Some("http://localhost:9000/".to_string()));
        assert_eq!(probe.endpoint, "http://localhost:9000");
    }

    #[tokio::test]
    async fn token_provider_refreshes_through_probe() -> anyhow::Result<()> {
        let mut mock = MockMetadataProbe::new();
        mock.expect_probe()
            .withf(|sa, scopes| sa == "sa@p.iam" && *scopes == ScopeSet::from(["drive"]))
            .times(1)
            .returning(|_, _| Ok(Some(Token::bearer("refreshed", None))));
        let provider = MetadataTokenProvider {
            probe: Arc::new(mock),
            service_account: "sa@p.iam".to_string(),
            scopes: ScopeSet::from(["drive"]),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(provider.token().await?.token, "refreshed");
        Ok(())
    }

    #[tokio::test]
    async fn token_provider_platform_gone() {
        let mut mock = MockMetadataProbe::new();
        mock.expect_probe().returning(|_, _| Ok(None));
        let provider = MetadataTokenProvider {
            probe: Arc::new(mock),
            service_account: DEFAULT_SERVICE_ACCOUNT.to_string(),
            scopes: ScopeSet::new(),
            timeout: Duration::from_secs(1),
        };
        assert!(provider.token().await.is_err());
    }
}
