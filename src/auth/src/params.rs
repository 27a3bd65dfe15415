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

//! Provider-specific inputs for a credential request.
//!
//! A [ParamBag] is an open map. Each provider reads the keys it recognizes
//! and treats a missing key as "not applicable". Unknown keys are ignored.

use crate::scopes::ScopeSet;
use crate::token::Token;
use serde_json::Value;
use std::collections::HashMap;

/// A token supplied by the caller (bring your own token).
pub const TOKEN: &str = "token";
/// A path to a credentials file, or the JSON contents of one.
pub const PATH: &str = "path";
/// The service account used with the metadata service.
pub const SERVICE_ACCOUNT: &str = "service_account";
/// The [ClientIdentity] used for interactive user flows.
pub const APP: &str = "app";
/// Identifies the calling package in the token cache.
pub const PACKAGE: &str = "package";
/// The [EmailPreference] for user credentials.
pub const EMAIL: &str = "email";

/// The identity of the application requesting user credentials.
///
/// This is the OAuth2 client registration. Two identities are equal if
/// their client ids are equal, the other fields are informational.
#[derive(Clone)]
pub struct ClientIdentity {
    client_id: String,
    client_secret: Option<String>,
    name: Option<String>,
}

impl ClientIdentity {
    pub fn new<S: Into<String>>(client_id: S) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            name: None,
        }
    }

    pub fn with_client_secret<S: Into<String>>(mut self, v: S) -> Self {
        self.client_secret = Some(v.into());
        self
    }

    /// Sets a human readable name for the application.
    pub fn with_name<S: Into<String>>(mut self, v: S) -> Self {
        self.name = Some(v.into());
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> Option<&str> {
        self.client_secret.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl PartialEq for ClientIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.client_id == other.client_id
    }
}

impl Eq for ClientIdentity {}

impl std::hash::Hash for ClientIdentity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.client_id.hash(state);
    }
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[censored]"))
            .field("name", &self.name)
            .finish()
    }
}

/// A token supplied by the caller, together with the scopes it carries.
#[derive(Clone, Debug, PartialEq)]
pub struct ProvidedToken {
    pub token: Token,
    pub scopes: ScopeSet,
}

impl ProvidedToken {
    pub fn new<I, S>(token: Token, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            token,
            scopes: scopes.into_iter().collect(),
        }
    }
}

/// A single value in a [ParamBag].
#[derive(Clone, Debug)]
pub enum Param {
    Text(String),
    Flag(bool),
    Json(Value),
    Token(ProvidedToken),
    App(ClientIdentity),
}

/// How the caller wants a cached user credential to be chosen.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum EmailPreference {
    /// No preference, ask the user when there is a choice to make.
    #[default]
    Unset,
    /// Use the cached credential if exactly one matches.
    Any,
    /// Use the credential for this account.
    Exact(String),
}

/// The open set of named inputs to the provider chain.
///
/// # Example
/// ```
/// # use google_cloud_token_fetch::params::{EmailPreference, ParamBag};
/// let params = ParamBag::new()
///     .with_text("path", "/tmp/service-account.json")
///     .with_flag("email", true);
/// assert_eq!(params.text("path"), Some("/tmp/service-account.json"));
/// assert_eq!(params.email(), EmailPreference::Any);
/// assert!(params.get("token").is_none());
/// ```
#[derive(Clone, Debug, Default)]
pub struct ParamBag {
    values: HashMap<String, Param>,
}

impl ParamBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn with<K: Into<String>>(mut self, key: K, value: Param) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn with_text<K: Into<String>, V: Into<String>>(self, key: K, value: V) -> Self {
        self.with(key, Param::Text(value.into()))
    }

    pub fn with_flag<K: Into<String>>(self, key: K, value: bool) -> Self {
        self.with(key, Param::Flag(value))
    }

    pub fn with_json<K: Into<String>>(self, key: K, value: Value) -> Self {
        self.with(key, Param::Json(value))
    }

    pub fn with_token(self, value: ProvidedToken) -> Self {
        self.with(TOKEN, Param::Token(value))
    }

    pub fn with_app(self, value: ClientIdentity) -> Self {
        self.with(APP, Param::App(value))
    }

    pub fn get(&self, key: &str) -> Option<&Param> {
        self.values.get(key)
    }

    /// Returns the value of `key` if it is present and is text.
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(Param::Text(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Returns the client identity in the `app` key, if any.
    pub fn app(&self) -> Option<&ClientIdentity> {
        match self.get(APP) {
            Some(Param::App(v)) => Some(v),
            _ => None,
        }
    }

    /// Interprets the `email` key.
    ///
    /// `true` means "any single match", a string names an account, anything
    /// else (including `false`) is no preference.
    pub fn email(&self) -> EmailPreference {
        match self.get(EMAIL) {
            Some(Param::Flag(true)) => EmailPreference::Any,
            Some(Param::Text(e)) => EmailPreference::Exact(e.clone()),
            _ => EmailPreference::Unset,
        }
    }
}
