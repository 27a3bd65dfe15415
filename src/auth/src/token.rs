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
use std::collections::HashMap;
use std::time::Duration;
// Using tokio's clock makes expiration testable with a paused runtime.
use tokio::time::Instant;

/// Tokens this close to their expiration are treated as expired.
pub(crate) const EXPIRY_SKEW: Duration = Duration::from_secs(10);

/// Represents an auth token.
#[derive(Clone, PartialEq)]
pub struct Token {
    /// The actual token string.
    ///
    /// This is the value used in `Authorization:` header.
    pub token: String,

    /// The type of the token.
    ///
    /// The most common type is `"Bearer"` but other types may appear in the
    /// future.
    pub token_type: String,

    /// The instant at which the token expires.
    ///
    /// If `None`, the token does not expire.
    ///
    /// Note that the `Instant` is not valid across processes. The token
    /// cache converts it to a `time::OffsetDateTime` before writing it to
    /// disk.
    pub expires_at: Option<Instant>,

    /// Optional metadata associated with the token.
    pub metadata: Option<HashMap<String, String>>,
}

impl Token {
    /// Creates a bearer token.
    pub fn bearer<S: Into<String>>(token: S, expires_at: Option<Instant>) -> Self {
        Self {
            token: token.into(),
            token_type: "Bearer".to_string(),
            expires_at,
            metadata: None,
        }
    }

    /// Returns `true` if the token has expired, or expires in the next few
    /// seconds.
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|e| e <= Instant::now() + EXPIRY_SKEW)
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("token", &"[censored]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Produces new tokens on demand.
///
/// Each credential handle wraps one of these. Calls are expected to
/// perform I/O (a token exchange, a metadata query, an OAuth2 refresh).
#[async_trait::async_trait]
pub trait TokenProvider: std::fmt::Debug + Send + Sync {
    async fn token(&self) -> Result<Token>;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    // Used by tests in other modules.
    mockall::mock! {
        #[derive(Debug)]
        pub TokenProvider { }

        #[async_trait::async_trait]
        impl TokenProvider for TokenProvider {
            async fn token(&self) -> Result<Token>;
        }
    }

    #[test]
    fn debug() {
        let expires_at = Instant::now() + Duration::from_secs(3600);
        let metadata =
            HashMap::from([("a", "test-only")].map(|(k, v)| (k.to_string(), v.to_string())));

        let token = Token {
            token: "token-test-only".into(),
            token_type: "token-type-test-only".into(),
            expires_at: Some(expires_at),
            metadata: Some(metadata.clone()),
        };
        let got = format!("{token:?}");
        assert!(!got.contains("token-test-only"), "{got}");
        assert!(got.contains("token: \"[censored]\""), "{got}");
        assert!(got.contains("token_type: \"token-type-test-only"), "{got}");
        assert!(
            got.contains(&format!("expires_at: Some({expires_at:?}")),
            "{got}"
        );
        assert!(
            got.contains(&format!("metadata: Some({metadata:?}")),
            "{got}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn expiration() {
        let token = Token::bearer("test-only", None);
        assert!(!token.is_expired(), "{token:?}");

        let token = Token::bearer("test-only", Some(Instant::now() + Duration::from_secs(60)));
        assert!(!token.is_expired(), "{token:?}");
        tokio::time::advance(Duration::from_secs(55)).await;
        assert!(token.is_expired(), "{token:?}");

        let token = Token::bearer("test-only", Some(Instant::now()));
        assert!(token.is_expired(), "{token:?}");
    }
}
