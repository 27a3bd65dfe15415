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

//! Minting tokens from credential files.
//!
//! Turning a service account key, an external account configuration, or an
//! `authorized_user` refresh token into an access token requires talking to
//! an OAuth2 token endpoint (and, for service accounts, signing a JWT). This
//! crate does not implement those protocols. Applications provide a
//! [KeyExchange] to the chain [Builder][crate::chain::Builder].

use crate::Result;
use crate::credential_file::CredentialFile;
use crate::scopes::ScopeSet;
use crate::token::{Token, TokenProvider};
use std::sync::Arc;

/// Exchanges the contents of a credentials file for an access token.
#[async_trait::async_trait]
pub trait KeyExchange: std::fmt::Debug + Send + Sync {
    async fn exchange(&self, file: &CredentialFile, scopes: &ScopeSet) -> Result<Token>;
}

/// Adapts a [KeyExchange] call into a [TokenProvider], so the credential
/// handle can refresh by exchanging the same file again.
#[derive(Debug)]
pub(crate) struct ExchangeTokenProvider {
    pub(crate) exchange: Arc<dyn KeyExchange>,
    pub(crate) file: CredentialFile,
    pub(crate) scopes: ScopeSet,
}

#[async_trait::async_trait]
impl TokenProvider for ExchangeTokenProvider {
    async fn token(&self) -> Result<Token> {
        self.exchange.exchange(&self.file, &self.scopes).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::credential_file::tests::authorized_user_json;

    mockall::mock! {
        #[derive(Debug)]
        pub KeyExchange { }

        #[async_trait::async_trait]
        impl KeyExchange for KeyExchange {
            async fn exchange(&self, file: &CredentialFile, scopes: &ScopeSet) -> Result<Token>;
        }
    }

    #[tokio::test]
    async fn provider_forwards_file_and_scopes() -> anyhow::Result<()> {
        let file = CredentialFile::from_value(authorized_user_json())?;
        let want_file = file.clone();
        let mut mock = MockKeyExchange::new();
        mock.expect_exchange()
            .withf(move |f, s| *f == want_file && *s == ScopeSet::from(["drive"]))
            .times(1)
            .returning(|_, _| Ok(Token::bearer("minted", None)));

        let provider = ExchangeTokenProvider {
            exchange: Arc::new(mock),
            file,
            scopes: ScopeSet::from(["drive"]),
        };
        assert_eq!(provider.token().await?.token, "minted");
        Ok(())
    }
}
