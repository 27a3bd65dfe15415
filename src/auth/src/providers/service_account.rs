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

//! [Service account] keys.
//!
//! [Service account]: https://cloud.google.com/iam/docs/service-account-overview

use super::{Outcome, Provider, exchange_credential, path_param};
use crate::credential_file::CredentialFile;
use crate::credentials::{CredentialSource, Provenance};
use crate::exchange::KeyExchange;
use crate::params::ParamBag;
use crate::scopes::ScopeSet;
use std::sync::Arc;

/// Uses the service account key named by the `path` parameter.
#[derive(Clone, Debug, Default)]
pub struct ServiceAccountProvider {
    exchange: Option<Arc<dyn KeyExchange>>,
}

impl ServiceAccountProvider {
    pub fn new(exchange: Option<Arc<dyn KeyExchange>>) -> Self {
        Self { exchange }
    }
}

#[async_trait::async_trait]
impl Provider for ServiceAccountProvider {
    async fn provide(&self, scopes: &ScopeSet, params: &ParamBag) -> Outcome {
        let file = match path_param(params).await {
            Ok(f) => f,
            Err(outcome) => return outcome,
        };
        let CredentialFile::ServiceAccount(key) = &file else {
            return Outcome::failed(format!(
                "`path` is a {} credential, not a service account key",
                file.type_name()
            ));
        };
        let provenance = Provenance::ServiceAccount {
            client_email: key.client_email.clone(),
        };
        match exchange_credential(self.exchange.as_ref(), file, scopes).await {
            Ok(credential) => {
                Outcome::Success(CredentialSource::new(provenance, scopes.clone(), credential))
            }
            Err(outcome) => outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential_file::tests::{authorized_user_json, service_account_json};
    use crate::credentials::SourceKind;
    use crate::exchange::tests::MockKeyExchange;
    use crate::params::PATH;
    use crate::token::Token;

    fn minting() -> Option<Arc<dyn KeyExchange>> {
        let mut mock = MockKeyExchange::new();
        mock.expect_exchange()
            .withf(|f, _| matches!(f, CredentialFile::ServiceAccount(_)))
            .returning(|_, _| Ok(Token::bearer("sa-token", None)));
        Some(Arc::new(mock))
    }

    #[tokio::test]
    async fn skipped_without_path() {
        let got = ServiceAccountProvider::new(minting())
            .provide(&ScopeSet::new(), &ParamBag::new())
            .await;
        assert!(matches!(got, Outcome::Skipped(_)), "{got:?}");
    }

    #[tokio::test]
    async fn success_from_file() -> anyhow::Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        std::fs::write(file.path(), service_account_json().to_string())?;
        let params = ParamBag::new().with_text(PATH, file.path().to_string_lossy());
        let scopes = ScopeSet::from(["https://www.googleapis.com/auth/drive"]);

        let got = ServiceAccountProvider::new(minting())
            .provide(&scopes, &params)
            .await;
        let Outcome::Success(source) = got else {
            panic!("expected a success, got {got:?}");
        };
        assert_eq!(source.kind(), SourceKind::ServiceAccount);
        assert_eq!(
            source.email(),
            Some("test-sa@test-project-id.iam.gserviceaccount.com")
        );
        assert_eq!(*source.scopes(), scopes);
        assert_eq!(source.token().await?.token, "sa-token");
        Ok(())
    }

    #[tokio::test]
    async fn wrong_file_type() {
        let params = ParamBag::new().with_json(PATH, authorized_user_json());
        let got = ServiceAccountProvider::new(minting())
            .provide(&ScopeSet::new(), &params)
            .await;
        assert!(
            matches!(&got, Outcome::Failed(r) if r.message().contains("authorized_user")),
            "{got:?}"
        );
    }

    #[tokio::test]
    async fn unparsable() {
        let params = ParamBag::new().with_text(PATH, "{ not json");
        let got = ServiceAccountProvider::new(minting())
            .provide(&ScopeSet::new(), &params)
            .await;
        assert!(matches!(got, Outcome::Failed(_)), "{got:?}");
    }

    #[tokio::test]
    async fn no_exchange() {
        let params = ParamBag::new().with_json(PATH, service_account_json());
        let got = ServiceAccountProvider::default()
            .provide(&ScopeSet::new(), &params)
            .await;
        assert!(
            matches!(&got, Outcome::Failed(r) if r.message().contains("no key exchange")),
            "{got:?}"
        );
    }
}
