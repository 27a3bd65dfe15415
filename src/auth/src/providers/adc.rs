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

//! [Application Default Credentials] found in well-known locations.
//!
//! [Application Default Credentials]: https://cloud.google.com/docs/authentication/application-default-credentials

use super::external_account::validate;
use super::{Outcome, Provider, exchange_credential};
use crate::constants::{ADC_ENV_VAR, ADC_FILE_NAME, CLOUD_PLATFORM_SCOPE, CLOUDSDK_CONFIG_ENV_VAR};
use crate::credential_file::{CredentialFile, load_credential_file};
use crate::credentials::{AdcFileKind, CredentialSource, Provenance};
use crate::env::non_empty_var;
use crate::exchange::KeyExchange;
use crate::params::ParamBag;
use crate::scopes::ScopeSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Returns the paths searched for Application Default Credentials, in
/// order.
///
/// 1. The file named by `GOOGLE_APPLICATION_CREDENTIALS`.
/// 2. `application_default_credentials.json` in the `CLOUDSDK_CONFIG`
///    directory.
/// 3. The gcloud configuration directory: `$HOME/.config/gcloud` on Unix,
///    `%APPDATA%\gcloud` and then `%SystemDrive%\gcloud` on Windows.
pub fn adc_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(path) = non_empty_var(ADC_ENV_VAR) {
        paths.push(PathBuf::from(path));
    }
    if let Some(dir) = non_empty_var(CLOUDSDK_CONFIG_ENV_VAR) {
        paths.push(PathBuf::from(dir).join(ADC_FILE_NAME));
    }
    paths.extend(platform_paths());
    paths
}

#[cfg(target_os = "windows")]
fn platform_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(appdata) = non_empty_var("APPDATA") {
        paths.push(PathBuf::from(appdata).join("gcloud").join(ADC_FILE_NAME));
    }
    let drive = non_empty_var("SystemDrive").unwrap_or_else(|| "C:".to_string());
    paths.push(
        PathBuf::from(format!("{drive}\\"))
            .join("gcloud")
            .join(ADC_FILE_NAME),
    );
    paths
}

#[cfg(not(target_os = "windows"))]
fn platform_paths() -> Vec<PathBuf> {
    non_empty_var("HOME")
        .map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("gcloud")
                .join(ADC_FILE_NAME)
        })
        .into_iter()
        .collect()
}

/// Searches the [adc_search_paths] for a usable credentials file.
///
/// The first file that exists, parses, and is usable for the request wins.
/// User credentials (`authorized_user`) are only usable if the request
/// includes the `cloud-platform` scope.
#[derive(Clone, Debug, Default)]
pub struct AdcProvider {
    exchange: Option<Arc<dyn KeyExchange>>,
    search_paths: Option<Vec<PathBuf>>,
}

impl AdcProvider {
    pub fn new(exchange: Option<Arc<dyn KeyExchange>>) -> Self {
        Self {
            exchange,
            search_paths: None,
        }
    }

    /// Searches `paths` instead of the [adc_search_paths].
    pub fn with_search_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.search_paths = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    // Returns the kind of file if it is usable for `scopes`.
    fn usable(file: &CredentialFile, scopes: &ScopeSet) -> Result<AdcFileKind, String> {
        match file {
            CredentialFile::ServiceAccount(_) => Ok(AdcFileKind::ServiceAccount),
            CredentialFile::ExternalAccount(config) => {
                validate(config).map(|_| AdcFileKind::ExternalAccount)
            }
            CredentialFile::AuthorizedUser(_) if scopes.contains(CLOUD_PLATFORM_SCOPE) => {
                Ok(AdcFileKind::AuthorizedUser)
            }
            CredentialFile::AuthorizedUser(_) => Err(format!(
                "user credentials do not meet scope criteria: the request must include {CLOUD_PLATFORM_SCOPE}"
            )),
        }
    }
}

#[async_trait::async_trait]
impl Provider for AdcProvider {
    async fn provide(&self, scopes: &ScopeSet, _params: &ParamBag) -> Outcome {
        let paths = self.search_paths.clone().unwrap_or_else(adc_search_paths);
        let mut rejected = Vec::new();
        for path in paths {
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                rejected.push(format!("{}: not found", path.display()));
                continue;
            }
            let file = match load_credential_file(&path.to_string_lossy())
                .await
                .and_then(CredentialFile::from_value)
            {
                Ok(f) => f,
                Err(e) => {
                    rejected.push(format!("{}: {e}", path.display()));
                    continue;
                }
            };
            let file_kind = match Self::usable(&file, scopes) {
                Ok(k) => k,
                Err(e) => {
                    rejected.push(format!("{}: {e}", path.display()));
                    continue;
                }
            };
            tracing::debug!("using application default credentials in {}", path.display());
            let provenance = Provenance::Adc { path, file_kind };
            return match exchange_credential(self.exchange.as_ref(), file, scopes).await {
                Ok(credential) => {
                    Outcome::Success(CredentialSource::new(provenance, scopes.clone(), credential))
                }
                Err(outcome) => outcome,
            };
        }
        if rejected.is_empty() {
            return Outcome::failed("no application default credentials: no paths to search");
        }
        Outcome::failed(format!(
            "no application default credentials found [{}]",
            rejected.join("; ")
        ))
    }
}
