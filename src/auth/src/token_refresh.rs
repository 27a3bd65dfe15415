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

use crate::Result;
use crate::token::{Token, TokenProvider};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Holds the current token of a credential and refreshes it in place.
///
/// The token may be seeded at construction, for example with a token read
/// from the cache or returned by the metadata service. Concurrent callers
/// share a single refresh.
#[derive(Debug)]
pub(crate) struct RefreshingTokenProvider<T>
where
    T: TokenProvider,
{
    // The last token obtained, if any.
    current: Arc<Mutex<Option<Token>>>,

    // Serializes refreshes. Waiters re-check `current` once they hold it.
    refresh_in_progress: Arc<Mutex<()>>,

    // The token provider. This thing does the refreshing.
    inner: Arc<T>,
}

// We manually implement the `Clone` trait because the Rust compiler will
// squawk if `T` is not `Clone`, even though we only hold an `Arc<T>`.
impl<T: TokenProvider> Clone for RefreshingTokenProvider<T> {
    fn clone(&self) -> Self {
        Self {
            current: self.current.clone(),
            refresh_in_progress: self.refresh_in_progress.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<T: TokenProvider> RefreshingTokenProvider<T> {
    pub fn new(inner: T) -> Self {
        Self::with_token(None, inner)
    }

    pub fn with_token(initial: Option<Token>, inner: T) -> Self {
        Self {
            current: Arc::new(Mutex::new(initial)),
            refresh_in_progress: Arc::new(Mutex::new(())),
            inner: Arc::new(inner),
        }
    }

    async fn valid_token(&self) -> Option<Token> {
        self.current
            .lock()
            .await
            .as_ref()
            .filter(|t| !t.is_expired())
            .cloned()
    }
}

#[async_trait::async_trait]
impl<T: TokenProvider + 'static> TokenProvider for RefreshingTokenProvider<T> {
    async fn token(&self) -> Result<Token> {
        if let Some(token) = self.valid_token().await {
            return Ok(token);
        }

        let _guard = self.refresh_in_progress.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(token) = self.valid_token().await {
            return Ok(token);
        }

        let token = self.inner.token().await?;
        *self.current.lock().await = Some(token.clone());
        Ok(token)
    }
}
