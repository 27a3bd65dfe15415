// Copyright 2024 Google LLC
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

use crate::Result;
use crate::scopes::ScopeSet;
use crate::token::{Token, TokenProvider};
use crate::token_refresh::RefreshingTokenProvider;
use std::path::PathBuf;
use std::sync::Arc;

/// A refreshable handle to an access token.
///
/// Cloning the handle is cheap, all the clones share the same token and
/// refresh it at most once when it expires.
#[derive(Clone, Debug)]
pub struct AccessCredential {
    inner: Arc<dyn TokenProvider>,
}

impl AccessCredential {
    /// Returns a valid token, refreshing the current token if needed.
    pub async fn token(&self) -> Result<Token> {
        self.inner.token().await
    }

    /// Creates a handle that refreshes through `provider`.
    ///
    /// `initial` seeds the handle, the provider is only called once that
    /// token expires.
    pub fn refreshing<T>(initial: Option<Token>, provider: T) -> Self
    where
        T: TokenProvider + 'static,
    {
        Self {
            inner: Arc::new(RefreshingTokenProvider::with_token(initial, provider)),
        }
    }

    /// Creates a handle that always returns `token` and cannot be refreshed.
    pub fn from_token(token: Token) -> Self {
        Self {
            inner: Arc::new(StaticTokenProvider { token }),
        }
    }
}

#[derive(Debug)]
struct StaticTokenProvider {
    token: Token,
}

#[async_trait::async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<Token> {
        if self.token.is_expired() {
            return Err(crate::errors::non_transient_from_msg(
                "the provided token has expired and cannot be refreshed",
            ));
        }
        Ok(self.token.clone())
    }
}

/// The kind of credential, one per built-in provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceKind {
    ByoToken,
    ServiceAccount,
    ExternalAccount,
    Adc,
    ComputeMetadata,
    UserOAuth2,
}

impl SourceKind {
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::ByoToken => "byo_token",
            SourceKind::ServiceAccount => "service_account",
            SourceKind::ExternalAccount => "external_account",
            SourceKind::Adc => "adc",
            SourceKind::ComputeMetadata => "compute_metadata",
            SourceKind::UserOAuth2 => "user_oauth2",
        }
    }
}

/// The type of file found by the Application Default Credentials search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdcFileKind {
    ServiceAccount,
    ExternalAccount,
    AuthorizedUser,
}

/// Describes how a credential was obtained.
#[derive(Clone, Debug, PartialEq)]
pub enum Provenance {
    ByoToken,
    ServiceAccount { client_email: String },
    ExternalAccount { audience: String },
    Adc { path: PathBuf, file_kind: AdcFileKind },
    ComputeMetadata { service_account: String },
    UserOAuth2 { email: String },
}

impl Provenance {
    pub fn kind(&self) -> SourceKind {
        match self {
            Provenance::ByoToken => SourceKind::ByoToken,
            Provenance::ServiceAccount { .. } => SourceKind::ServiceAccount,
            Provenance::ExternalAccount { .. } => SourceKind::ExternalAccount,
            Provenance::Adc { .. } => SourceKind::Adc,
            Provenance::ComputeMetadata { .. } => SourceKind::ComputeMetadata,
            Provenance::UserOAuth2 { .. } => SourceKind::UserOAuth2,
        }
    }
}

/// A credential produced by one of the providers in the chain.
///
/// A `CredentialSource` does not change once created. Refreshing the token
/// happens inside the [AccessCredential] handle.
#[derive(Clone, Debug)]
pub struct CredentialSource {
    scopes: ScopeSet,
    credential: AccessCredential,
    provenance: Provenance,
}

impl CredentialSource {
    pub fn new(provenance: Provenance, scopes: ScopeSet, credential: AccessCredential) -> Self {
        Self {
            scopes,
            credential,
            provenance,
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.provenance.kind()
    }

    /// The scopes this credential is valid for.
    pub fn scopes(&self) -> &ScopeSet {
        &self.scopes
    }

    pub fn credential(&self) -> &AccessCredential {
        &self.credential
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// Returns the account email for user and service account credentials.
    pub fn email(&self) -> Option<&str> {
        match &self.provenance {
            Provenance::ServiceAccount { client_email } => Some(client_email),
            Provenance::ComputeMetadata { service_account } => Some(service_account),
            Provenance::UserOAuth2 { email } => Some(email),
            _ => None,
        }
    }

    /// Shorthand for `self.credential().token()`.
    pub async fn token(&self) -> Result<Token> {
        self.credential.token().await
    }
}
