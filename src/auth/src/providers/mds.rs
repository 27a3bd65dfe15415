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

//! Service account credentials from the [Metadata Service].
//!
//! [Metadata Service]: https://cloud.google.com/compute/docs/metadata/overview

use super::{Outcome, Provider};
use crate::credentials::{AccessCredential, CredentialSource, Provenance};
use crate::mds::{DEFAULT_SERVICE_ACCOUNT, MetadataProbe, MetadataTokenProvider};
use crate::params::{Param, ParamBag, SERVICE_ACCOUNT};
use crate::scopes::ScopeSet;
use std::sync::Arc;
use std::time::Duration;

/// How long to wait for the metadata service before assuming it is absent.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Asks the metadata service for a token.
///
/// The `service_account` parameter selects the account, it defaults to the
/// VM's default service account. The provider skips if the host is not on
/// a platform with a metadata service, or if the service does not answer in
/// time.
#[derive(Clone, Debug)]
pub struct MetadataProvider {
    probe: Arc<dyn MetadataProbe>,
    timeout: Duration,
}

impl MetadataProvider {
    pub fn new(probe: Arc<dyn MetadataProbe>) -> Self {
        Self {
            probe,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, v: Duration) -> Self {
        self.timeout = v;
        self
    }
}

#[async_trait::async_trait]
impl Provider for MetadataProvider {
    async fn provide(&self, scopes: &ScopeSet, params: &ParamBag) -> Outcome {
        let service_account = match params.get(SERVICE_ACCOUNT) {
            None => DEFAULT_SERVICE_ACCOUNT,
            Some(Param::Text(v)) => v.as_str(),
            Some(_) => return Outcome::failed("the `service_account` parameter is not text"),
        };
        let probe = self.probe.probe(service_account, scopes);
        let token = match tokio::time::timeout(self.timeout, probe).await {
            Err(_) => {
                return Outcome::skipped(format!(
                    "the metadata service did not answer within {:?}",
                    self.timeout
                ));
            }
            Ok(Ok(None)) => return Outcome::skipped("not running on Google Cloud"),
            Ok(Err(e)) => {
                return Outcome::failed(format!("the metadata service rejected the request: {e}"));
            }
            Ok(Ok(Some(token))) => token,
        };
        let refresher = MetadataTokenProvider {
            probe: self.probe.clone(),
            service_account: service_account.to_string(),
            scopes: scopes.clone(),
            timeout: self.timeout,
        };
        Outcome::Success(CredentialSource::new(
            Provenance::ComputeMetadata {
                service_account: service_account.to_string(),
            },
            scopes.clone(),
            AccessCredential::refreshing(Some(token), refresher),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::SourceKind;
    use crate::mds::tests::MockMetadataProbe;
    use crate::token::Token;

    #[tokio::test]
    async fn success_default_account() -> anyhow::Result<()> {
        let mut mock = MockMetadataProbe::new();
        mock.expect_probe()
            .withf(|sa, _| sa == DEFAULT_SERVICE_ACCOUNT)
            .times(1)
            .returning(|_, _| Ok(Some(Token::bearer("mds-token", None))));
        let got = MetadataProvider::new(Arc::new(mock))
            .provide(&ScopeSet::from(["drive"]), &ParamBag::new())
            .await;
        let Outcome::Success(source) = got else {
            panic!("expected a success, got {got:?}");
        };
        assert_eq!(source.kind(), SourceKind::ComputeMetadata);
        assert_eq!(source.email(), Some(DEFAULT_SERVICE_ACCOUNT));
        assert_eq!(*source.scopes(), ScopeSet::from(["drive"]));
        assert_eq!(source.token().await?.token, "mds-token");
        Ok(())
    }

    #[tokio::test]
    async fn explicit_account() {
        let mut mock = MockMetadataProbe::new();
        mock.expect_probe()
            .withf(|sa, _| sa == "sa@p.iam.gserviceaccount.com")
            .times(1)
            .returning(|_, _| Ok(Some(Token::bearer("mds-token", None))));
        let params = ParamBag::new().with_text(SERVICE_ACCOUNT, "sa@p.iam.gserviceaccount.com");
        let got = MetadataProvider::new(Arc::new(mock))
            .provide(&ScopeSet::new(), &params)
            .await;
        assert!(
            matches!(&got, Outcome::Success(s) if s.email() == Some("sa@p.iam.gserviceaccount.com")),
            "{got:?}"
        );
    }

    #[tokio::test]
    async fn service_account_not_text() {
        let mut mock = MockMetadataProbe::new();
        mock.expect_probe().never();
        let params = ParamBag::new().with_flag(SERVICE_ACCOUNT, true);
        let got = MetadataProvider::new(Arc::new(mock))
            .provide(&ScopeSet::new(), &params)
            .await;
        assert!(
            matches!(&got, Outcome::Failed(r) if r.message().contains("`service_account`")),
            "{got:?}"
        );
    }

    #[tokio::test]
    async fn not_on_platform() {
        let mut mock = MockMetadataProbe::new();
        mock.expect_probe().returning(|_, _| Ok(None));
        let got = MetadataProvider::new(Arc::new(mock))
            .provide(&ScopeSet::new(), &ParamBag::new())
            .await;
        assert!(matches!(got, Outcome::Skipped(_)), "{got:?}");
    }

    #[tokio::test]
    async fn rejected() {
        let mut mock = MockMetadataProbe::new();
        mock.expect_probe()
            .returning(|_, _| Err(crate::errors::non_transient_from_msg("unknown service account")));
        let got = MetadataProvider::new(Arc::new(mock))
            .provide(&ScopeSet::new(), &ParamBag::new())
            .await;
        assert!(
            matches!(&got, Outcome::Failed(r) if r.message().contains("unknown service account")),
            "{got:?}"
        );
    }

    #[derive(Debug)]
    struct HangingProbe;

    #[async_trait::async_trait]
    impl MetadataProbe for HangingProbe {
        async fn probe(&self, _sa: &str, _scopes: &ScopeSet) -> crate::Result<Option<Token>> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_skips() {
        let provider = MetadataProvider::new(Arc::new(HangingProbe))
            .with_timeout(Duration::from_millis(250));
        let got = provider.provide(&ScopeSet::new(), &ParamBag::new()).await;
        assert!(
            matches!(&got, Outcome::Skipped(r) if r.message().contains("did not answer")),
            "{got:?}"
        );
    }
}
