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

//! Tokens supplied by the caller.

use super::{Outcome, Provider};
use crate::credentials::{AccessCredential, CredentialSource, Provenance};
use crate::params::{Param, ParamBag, TOKEN};
use crate::scopes::ScopeSet;

/// Uses the token in the `token` parameter, if it is usable.
///
/// The token must not be expired, all its scopes must be Google scopes, and
/// it must carry every requested scope. The token cannot be refreshed.
#[derive(Clone, Debug, Default)]
pub struct ByoTokenProvider;

#[async_trait::async_trait]
impl Provider for ByoTokenProvider {
    async fn provide(&self, scopes: &ScopeSet, params: &ParamBag) -> Outcome {
        let provided = match params.get(TOKEN) {
            None => return Outcome::skipped("no `token` parameter"),
            Some(Param::Token(t)) => t,
            Some(_) => return Outcome::failed("the `token` parameter is not a token"),
        };
        if !provided.scopes.is_google_scoped() {
            return Outcome::failed(format!(
                "the provided token scopes {} are not Google scopes",
                provided.scopes
            ));
        }
        if !provided.scopes.is_superset_of(scopes) {
            return Outcome::failed(format!(
                "the provided token scopes {} do not include the requested scopes {scopes}",
                provided.scopes
            ));
        }
        if provided.token.is_expired() {
            return Outcome::failed("the provided token has expired");
        }
        Outcome::Success(CredentialSource::new(
            Provenance::ByoToken,
            provided.scopes.clone(),
            AccessCredential::from_token(provided.token.clone()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::SourceKind;
    use crate::params::ProvidedToken;
    use crate::token::Token;
    use std::time::Duration;
    use tokio::time::Instant;

    const DRIVE: &str = "https://www.googleapis.com/auth/drive";
    const CLOUD: &str = "https://www.googleapis.com/auth/cloud-platform";

    fn provided(scopes: &[&str]) -> ParamBag {
        ParamBag::new().with_token(ProvidedToken::new(
            Token::bearer("test-only-token", None),
            scopes.iter().copied(),
        ))
    }

    #[tokio::test]
    async fn skipped_without_token() {
        let got = ByoTokenProvider
            .provide(&ScopeSet::from([DRIVE]), &ParamBag::new())
            .await;
        assert!(matches!(got, Outcome::Skipped(_)), "{got:?}");
    }

    #[tokio::test]
    async fn success_keeps_token_scopes() -> anyhow::Result<()> {
        let got = ByoTokenProvider
            .provide(&ScopeSet::from([DRIVE]), &provided(&[DRIVE, CLOUD, "email"]))
            .await;
        let Outcome::Success(source) = got else {
            panic!("expected a success, got {got:?}");
        };
        assert_eq!(source.kind(), SourceKind::ByoToken);
        assert_eq!(*source.scopes(), ScopeSet::from([DRIVE, CLOUD, "email"]));
        assert_eq!(source.token().await?.token, "test-only-token");
        Ok(())
    }

    #[tokio::test]
    async fn wrong_type() {
        let params = ParamBag::new().with_text(TOKEN, "raw-string");
        let got = ByoTokenProvider.provide(&ScopeSet::new(), &params).await;
        assert!(matches!(got, Outcome::Failed(_)), "{got:?}");
    }

    #[tokio::test]
    async fn not_google_scoped() {
        let got = ByoTokenProvider
            .provide(&ScopeSet::new(), &provided(&["https://example.com/auth/x"]))
            .await;
        assert!(matches!(&got, Outcome::Failed(r) if r.message().contains("not Google")), "{got:?}");

        let got = ByoTokenProvider.provide(&ScopeSet::new(), &provided(&[])).await;
        assert!(matches!(got, Outcome::Failed(_)), "{got:?}");
    }

    #[tokio::test]
    async fn narrower_than_requested() {
        let got = ByoTokenProvider
            .provide(&ScopeSet::from([DRIVE, CLOUD]), &provided(&[DRIVE]))
            .await;
        assert!(
            matches!(&got, Outcome::Failed(r) if r.message().contains("do not include")),
            "{got:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn expired() {
        let token = Token::bearer("t", Some(Instant::now() + Duration::from_secs(5)));
        let params = ParamBag::new().with_token(ProvidedToken::new(token, [DRIVE]));
        let got = ByoTokenProvider.provide(&ScopeSet::from([DRIVE]), &params).await;
        assert!(matches!(&got, Outcome::Failed(r) if r.message().contains("expired")), "{got:?}");
    }
}
