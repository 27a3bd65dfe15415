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

pub mod adc;
pub mod byo_token;
pub mod external_account;
pub mod mds;
pub mod service_account;
pub mod user_oauth2;

use crate::credential_file::{CredentialFile, load_credential_file};
use crate::credentials::{AccessCredential, CredentialSource};
use crate::exchange::{ExchangeTokenProvider, KeyExchange};
use crate::params::{PATH, Param, ParamBag};
use crate::scopes::ScopeSet;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// The result of asking a [Provider] for a credential.
#[derive(Clone, Debug)]
pub enum Outcome {
    Success(CredentialSource),
    /// The inputs the provider needs are absent. The provider does not
    /// apply to this request.
    Skipped(Reason),
    /// The inputs were present, but invalid or unusable.
    Failed(Reason),
}

impl Outcome {
    pub fn skipped<S: Into<String>>(message: S) -> Self {
        Outcome::Skipped(Reason::new(message))
    }

    pub fn failed<S: Into<String>>(message: S) -> Self {
        Outcome::Failed(Reason::new(message))
    }
}

/// Why a provider did not produce a credential.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reason {
    message: String,
    cause: Option<TerminalCause>,
}

/// Failures that end the request if no later provider succeeds.
///
/// Unlike other failures these need a decision from the caller: the chain
/// reports them instead of a generic "no credentials" error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminalCause {
    /// More than one cached credential matched and none could be chosen.
    Ambiguous,
    /// A cached credential could not be refreshed.
    RefreshFailed,
    /// The user cancelled an interactive step.
    UserAborted,
}

impl Reason {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn terminal<S: Into<String>>(cause: TerminalCause, message: S) -> Self {
        Self {
            message: message.into(),
            cause: Some(cause),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<TerminalCause> {
        self.cause
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// A strategy to obtain credentials.
///
/// Providers read only the [ParamBag] keys they recognize. A missing key
/// means the provider does not apply, and must result in
/// [Outcome::Skipped], never in an error. Providers report every failure as
/// [Outcome::Failed]. They do not panic, but the chain contains panics
/// anyway.
#[async_trait::async_trait]
pub trait Provider: std::fmt::Debug + Send + Sync {
    async fn provide(&self, scopes: &ScopeSet, params: &ParamBag) -> Outcome;
}

/// Creates a [Provider] from a synchronous function.
///
/// # Example
/// ```
/// # use google_cloud_token_fetch::providers::{from_fn, Outcome};
/// let provider = from_fn(|_scopes, params| match params.text("my-key") {
///     None => Outcome::skipped("no `my-key` parameter"),
///     Some(_) => Outcome::failed("not implemented"),
/// });
/// ```
pub fn from_fn<F>(f: F) -> FnProvider<F>
where
    F: Fn(&ScopeSet, &ParamBag) -> Outcome + Send + Sync,
{
    FnProvider(f)
}

/// A [Provider] returned by [from_fn].
pub struct FnProvider<F>(F);

impl<F> std::fmt::Debug for FnProvider<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnProvider").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl<F> Provider for FnProvider<F>
where
    F: Fn(&ScopeSet, &ParamBag) -> Outcome + Send + Sync,
{
    async fn provide(&self, scopes: &ScopeSet, params: &ParamBag) -> Outcome {
        (self.0)(scopes, params)
    }
}

/// Calls `provider`, turning a panic into [Outcome::Failed].
pub(crate) async fn contain(provider: &dyn Provider, scopes: &ScopeSet, params: &ParamBag) -> Outcome {
    match AssertUnwindSafe(provider.provide(scopes, params))
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome,
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Outcome::failed(format!("the provider panicked: {detail}"))
        }
    }
}

// Loads the credentials file named by the `path` parameter.
//
// The `Err` branch is the outcome to report: skipped if there is no `path`,
// failed if it cannot be loaded or parsed.
pub(crate) async fn path_param(params: &ParamBag) -> Result<CredentialFile, Outcome> {
    let value = match params.get(PATH) {
        None => return Err(Outcome::skipped("no `path` parameter")),
        Some(Param::Text(p)) => load_credential_file(p)
            .await
            .map_err(|e| Outcome::failed(e.to_string()))?,
        Some(Param::Json(v)) => v.clone(),
        Some(_) => {
            return Err(Outcome::failed(
                "the `path` parameter must be a path or a JSON object",
            ));
        }
    };
    CredentialFile::from_value(value).map_err(|e| Outcome::failed(e.to_string()))
}

// Mints a token for `file` and wraps it in a handle that refreshes through
// the same exchange.
pub(crate) async fn exchange_credential(
    exchange: Option<&Arc<dyn KeyExchange>>,
    file: CredentialFile,
    scopes: &ScopeSet,
) -> Result<AccessCredential, Outcome> {
    let Some(exchange) = exchange else {
        return Err(Outcome::failed(format!(
            "no key exchange is configured for {} credentials",
            file.type_name()
        )));
    };
    let token = exchange
        .exchange(&file, scopes)
        .await
        .map_err(|e| Outcome::failed(format!("cannot mint a token: {e}")))?;
    let provider = ExchangeTokenProvider {
        exchange: exchange.clone(),
        file,
        scopes: scopes.clone(),
    };
    Ok(AccessCredential::refreshing(Some(token), provider))
}
