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

//! Loading and classifying credential files.
//!
//! Service account keys, [external account] configurations, and
//! `authorized_user` files produced by `gcloud auth application-default
//! login` share a JSON format with a `type` field.
//!
//! [external account]: https://google.aip.dev/auth/4117

use crate::build_errors::Error as BuildError;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

type BuildResult<T> = std::result::Result<T, BuildError>;

/// Loads a credentials file.
///
/// The input may be a path to the file or the JSON contents themselves. An
/// input that starts with `{` (after trimming whitespace) is parsed as JSON.
pub async fn load_credential_file(path_or_json: &str) -> BuildResult<Value> {
    let trimmed = path_or_json.trim_start();
    let contents = if trimmed.starts_with('{') {
        trimmed.to_string()
    } else {
        tokio::fs::read_to_string(path_or_json)
            .await
            .map_err(|e| BuildError::loading(format!("`{path_or_json}`: {e}")))?
    };
    serde_json::from_str(&contents).map_err(BuildError::parsing)
}

/// A parsed credentials file.
#[derive(Clone, Debug, PartialEq)]
pub enum CredentialFile {
    ServiceAccount(ServiceAccountKey),
    ExternalAccount(ExternalAccountConfig),
    AuthorizedUser(AuthorizedUser),
}

impl CredentialFile {
    /// Classifies `value` by its `type` field and parses it.
    pub fn from_value(value: Value) -> BuildResult<Self> {
        let cred_type = value
            .get("type")
            .ok_or_else(|| BuildError::missing_field("type"))?
            .as_str()
            .ok_or_else(|| BuildError::parsing("the `type` field is not a string"))?;
        match cred_type {
            "service_account" => parse(value).map(CredentialFile::ServiceAccount),
            "external_account" => parse(value).map(CredentialFile::ExternalAccount),
            "authorized_user" => parse(value).map(CredentialFile::AuthorizedUser),
            other => Err(BuildError::unknown_type(format!("`{other}`"))),
        }
    }

    /// The value of the `type` field.
    pub fn type_name(&self) -> &'static str {
        match self {
            CredentialFile::ServiceAccount(_) => "service_account",
            CredentialFile::ExternalAccount(_) => "external_account",
            CredentialFile::AuthorizedUser(_) => "authorized_user",
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(value: Value) -> BuildResult<T> {
    serde_json::from_value(value).map_err(BuildError::parsing)
}

/// A [service account key] file.
///
/// [service account key]: https://google.aip.dev/auth/4112
#[derive(Clone, Deserialize, PartialEq)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key_id: String,
    pub private_key: String,
    pub project_id: Option<String>,
    pub token_uri: Option<String>,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"[censored]")
            .field("project_id", &self.project_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

/// An [external account] configuration.
///
/// [external account]: https://google.aip.dev/auth/4117#configuration-file-generation-and-usage
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ExternalAccountConfig {
    pub audience: String,
    pub subject_token_type: String,
    pub token_url: String,
    pub credential_source: CredentialSourceConfig,
    pub service_account_impersonation_url: Option<String>,
}

/// Where an external account obtains its subject token.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CredentialSourceConfig {
    Executable {
        executable: ExecutableConfig,
    },
    Environment {
        environment_id: String,
        region_url: Option<String>,
        regional_cred_verification_url: Option<String>,
    },
    Url {
        url: String,
        headers: Option<HashMap<String, String>>,
    },
    File {
        file: String,
    },
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ExecutableConfig {
    pub command: String,
    pub timeout_millis: Option<u32>,
    pub output_file: Option<String>,
}

/// A user credential, as written by `gcloud auth application-default login`.
#[derive(Clone, Deserialize, PartialEq)]
pub struct AuthorizedUser {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub quota_project_id: Option<String>,
}

impl std::fmt::Debug for AuthorizedUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedUser")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[censored]")
            .field("refresh_token", &"[censored]")
            .field("quota_project_id", &self.quota_project_id)
            .finish()
    }
}
