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

//! Interactive user authorization.
//!
//! Obtaining a user credential requires a browser based [OAuth2 flow] and
//! talking to the token endpoint. Both are left to the application, which
//! provides an [OAuthFlow] to the chain [Builder][crate::chain::Builder].
//!
//! [OAuth2 flow]: https://developers.google.com/identity/protocols/oauth2/native-app

use crate::Result;
use crate::params::ClientIdentity;
use crate::scopes::ScopeSet;
use crate::token::{Token, TokenProvider};
use crate::token_cache::StoredCredential;
use std::sync::Arc;

/// The inputs to a new user authorization.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthorizationRequest {
    /// The application requesting access.
    pub app: ClientIdentity,
    /// The scopes requested.
    pub scopes: ScopeSet,
    /// The account the caller expects the user to sign in with, if known.
    pub email_hint: Option<String>,
}

/// The credential granted by the user.
#[derive(Clone, PartialEq)]
pub struct UserGrant {
    /// The account that granted access.
    pub email: String,
    pub token: Token,
    pub refresh_token: Option<String>,
}

impl std::fmt::Debug for UserGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserGrant")
            .field("email", &self.email)
            .field("token", &self.token)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[censored]"),
            )
            .finish()
    }
}

/// The result of an interactive authorization.
#[derive(Clone, Debug, PartialEq)]
pub enum Authorization {
    Granted(UserGrant),
    /// The user cancelled the flow before granting access.
    Aborted,
}

/// Drives user authorizations and refreshes user credentials.
#[async_trait::async_trait]
pub trait OAuthFlow: std::fmt::Debug + Send + Sync {
    /// Runs a new authorization, typically by sending the user to a browser.
    async fn authorize(&self, request: &AuthorizationRequest) -> Result<Authorization>;

    /// Obtains a new access token for a previously granted credential.
    async fn refresh(
        &self,
        app: &ClientIdentity,
        credential: &StoredCredential,
        scopes: &ScopeSet,
    ) -> Result<Token>;
}

/// Refreshes a user credential through the [OAuthFlow].
#[derive(Debug)]
pub(crate) struct UserTokenProvider {
    pub(crate) flow: Arc<dyn OAuthFlow>,
    pub(crate) app: ClientIdentity,
    pub(crate) credential: StoredCredential,
    pub(crate) scopes: ScopeSet,
}

#[async_trait::async_trait]
impl TokenProvider for UserTokenProvider {
    async fn token(&self) -> Result<Token> {
        self.flow
            .refresh(&self.app, &self.credential, &self.scopes)
            .await
    }
}
