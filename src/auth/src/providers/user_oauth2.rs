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

//! User credentials, reused from the token cache or obtained interactively.

use super::{Outcome, Provider, Reason, TerminalCause};
use crate::constants::CRATE_NAME;
use crate::credentials::{AccessCredential, CredentialSource, Provenance};
use crate::disambiguate::{DisambiguationError, Disambiguator, Resolution};
use crate::oauth::{Authorization, AuthorizationRequest, OAuthFlow, UserTokenProvider};
use crate::params::{APP, ClientIdentity, PACKAGE, Param, ParamBag};
use crate::scopes::ScopeSet;
use crate::token::Token;
use crate::token_cache::{CacheEntry, CacheKey, StoredCredential, TokenCache};
use std::sync::Arc;

/// The last provider in the default chain.
///
/// The provider looks up the [TokenCache] for credentials obtained for
/// exactly this request (scopes, `app`, and `package`), lets the
/// [Disambiguator] choose among them, and then either reuses the chosen
/// credential (refreshing it if it has expired) or runs a new authorization
/// through the [OAuthFlow]. New and refreshed credentials are written back
/// to the cache.
///
/// The provider never skips. Without an `app` parameter it uses the default
/// client identity, if one is configured.
#[derive(Clone, Debug)]
pub struct UserOAuth2Provider {
    flow: Option<Arc<dyn OAuthFlow>>,
    cache: TokenCache,
    disambiguator: Disambiguator,
    default_app: Option<ClientIdentity>,
}

impl UserOAuth2Provider {
    pub fn new(
        flow: Option<Arc<dyn OAuthFlow>>,
        cache: TokenCache,
        disambiguator: Disambiguator,
    ) -> Self {
        Self {
            flow,
            cache,
            disambiguator,
            default_app: None,
        }
    }

    /// Uses `app` when the request has no `app` parameter.
    pub fn with_default_app(mut self, app: ClientIdentity) -> Self {
        self.default_app = Some(app);
        self
    }

    fn handle(
        &self,
        app: &ClientIdentity,
        credential: StoredCredential,
        token: Token,
        scopes: &ScopeSet,
    ) -> AccessCredential {
        match &self.flow {
            Some(flow) => AccessCredential::refreshing(
                Some(token),
                UserTokenProvider {
                    flow: flow.clone(),
                    app: app.clone(),
                    credential,
                    scopes: scopes.clone(),
                },
            ),
            None => AccessCredential::from_token(token),
        }
    }

    async fn reuse(&self, entry: CacheEntry, scopes: &ScopeSet) -> Outcome {
        let CacheEntry {
            key,
            email,
            credential,
            ..
        } = entry;
        if !credential.is_expired() {
            let token = credential.to_token();
            return self.success(&key, email, credential, token, scopes);
        }

        let Some(flow) = &self.flow else {
            return Outcome::Failed(Reason::terminal(
                TerminalCause::RefreshFailed,
                format!("the cached credential for {email} has expired and no OAuth2 flow is configured to refresh it"),
            ));
        };
        let token = match flow.refresh(key.app(), &credential, scopes).await {
            Ok(t) => t,
            Err(e) => {
                return Outcome::Failed(Reason::terminal(
                    TerminalCause::RefreshFailed,
                    format!("cannot refresh the cached credential for {email}: {e}"),
                ));
            }
        };
        let refreshed = StoredCredential::from_token(&token, credential.refresh_token.clone());
        if let Err(e) = self
            .cache
            .insert(key.clone(), email.clone(), refreshed.clone())
            .await
        {
            tracing::warn!("cannot update the cached credential for {email}: {e}");
        }
        self.success(&key, email, refreshed, token, scopes)
    }

    async fn acquire(&self, key: CacheKey, hint: Option<String>, scopes: &ScopeSet) -> Outcome {
        let Some(flow) = &self.flow else {
            return Outcome::failed("no OAuth2 flow is configured to authorize a new user credential");
        };
        let request = AuthorizationRequest {
            app: key.app().clone(),
            scopes: scopes.clone(),
            email_hint: hint,
        };
        let grant = match flow.authorize(&request).await {
            Ok(Authorization::Granted(g)) => g,
            Ok(Authorization::Aborted) => {
                return Outcome::Failed(Reason::terminal(
                    TerminalCause::UserAborted,
                    "the user cancelled the authorization",
                ));
            }
            Err(e) => return Outcome::failed(format!("the authorization failed: {e}")),
        };
        let stored = StoredCredential::from_token(&grant.token, grant.refresh_token.clone());
        if let Err(e) = self
            .cache
            .insert(key.clone(), grant.email.clone(), stored.clone())
            .await
        {
            tracing::warn!("cannot cache the credential for {}: {e}", grant.email);
        }
        self.success(&key, grant.email, stored, grant.token, scopes)
    }

    fn success(
        &self,
        key: &CacheKey,
        email: String,
        credential: StoredCredential,
        token: Token,
        scopes: &ScopeSet,
    ) -> Outcome {
        let handle = self.handle(key.app(), credential, token, scopes);
        Outcome::Success(CredentialSource::new(
            Provenance::UserOAuth2 { email },
            key.scopes().clone(),
            handle,
        ))
    }
}

#[async_trait::async_trait]
impl Provider for UserOAuth2Provider {
    async fn provide(&self, scopes: &ScopeSet, params: &ParamBag) -> Outcome {
        let app = match params.get(APP) {
            None => self.default_app.as_ref(),
            Some(Param::App(app)) => Some(app),
            Some(_) => return Outcome::failed("the `app` parameter is not a client identity"),
        };
        let Some(app) = app else {
            return Outcome::failed("no `app` client identity provided");
        };
        let package = match params.get(PACKAGE) {
            None => CRATE_NAME,
            Some(Param::Text(package)) => package.as_str(),
            Some(_) => return Outcome::failed("the `package` parameter is not text"),
        };
        let key = CacheKey::new(scopes.clone(), app.clone(), package);

        let matches = self.cache.query(&key).await;
        match self.disambiguator.resolve(matches, &params.email()).await {
            Ok(Resolution::Reuse(entry)) => self.reuse(entry, scopes).await,
            Ok(Resolution::Acquire { hint }) => self.acquire(key, hint, scopes).await,
            Err(e @ DisambiguationError::Ambiguous { .. }) => {
                Outcome::Failed(Reason::terminal(TerminalCause::Ambiguous, e.to_string()))
            }
            Err(e @ DisambiguationError::Aborted) => {
                Outcome::Failed(Reason::terminal(TerminalCause::UserAborted, e.to_string()))
            }
            Err(e @ DisambiguationError::Prompt(_)) => Outcome::failed(e.to_string()),
        }
    }
}
