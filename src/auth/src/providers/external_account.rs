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

//! [Workload identity federation] with external accounts.
//!
//! [Workload identity federation]: https://cloud.google.com/iam/docs/workload-identity-federation

use super::{Outcome, Provider, exchange_credential, path_param};
use crate::constants::ALLOW_EXECUTABLES_ENV_VAR;
use crate::credential_file::{CredentialFile, CredentialSourceConfig, ExternalAccountConfig};
use crate::credentials::{CredentialSource, Provenance};
use crate::exchange::KeyExchange;
use crate::params::ParamBag;
use crate::scopes::ScopeSet;
use std::sync::Arc;

const SUPPORTED_ENVIRONMENT: &str = "aws1";

/// Uses the external account configuration named by the `path` parameter.
#[derive(Clone, Debug, Default)]
pub struct ExternalAccountProvider {
    exchange: Option<Arc<dyn KeyExchange>>,
}

impl ExternalAccountProvider {
    pub fn new(exchange: Option<Arc<dyn KeyExchange>>) -> Self {
        Self { exchange }
    }
}

#[async_trait::async_trait]
impl Provider for ExternalAccountProvider {
    async fn provide(&self, scopes: &ScopeSet, params: &ParamBag) -> Outcome {
        let file = match path_param(params).await {
            Ok(f) => f,
            Err(outcome) => return outcome,
        };
        let CredentialFile::ExternalAccount(config) = &file else {
            return Outcome::failed(format!(
                "`path` is a {} credential, not an external account configuration",
                file.type_name()
            ));
        };
        if let Err(message) = validate(config) {
            return Outcome::failed(message);
        }
        let provenance = Provenance::ExternalAccount {
            audience: config.audience.clone(),
        };
        match exchange_credential(self.exchange.as_ref(), file, scopes).await {
            Ok(credential) => {
                Outcome::Success(CredentialSource::new(provenance, scopes.clone(), credential))
            }
            Err(outcome) => outcome,
        }
    }
}

/// Checks that this host can use the external account configuration.
pub(crate) fn validate(config: &ExternalAccountConfig) -> Result<(), String> {
    if !names_pool_provider(&config.audience) {
        return Err(format!(
            "identity pool misconfigured: the audience `{}` does not name a workload or workforce identity pool provider",
            config.audience
        ));
    }
    match &config.credential_source {
        CredentialSourceConfig::File { .. } | CredentialSourceConfig::Url { .. } => Ok(()),
        CredentialSourceConfig::Environment { environment_id, .. } => {
            if environment_id == SUPPORTED_ENVIRONMENT {
                Ok(())
            } else {
                Err(format!(
                    "host platform unsupported: environment `{environment_id}`"
                ))
            }
        }
        CredentialSourceConfig::Executable { executable } => {
            if std::env::var(ALLOW_EXECUTABLES_ENV_VAR).is_ok_and(|v| v == "1") {
                Ok(())
            } else {
                Err(format!(
                    "required helper unavailable: running `{}` requires {ALLOW_EXECUTABLES_ENV_VAR}=1",
                    executable.command
                ))
            }
        }
    }
}

fn names_pool_provider(audience: &str) -> bool {
    let segments = audience.split('/').collect::<Vec<_>>();
    let has = |name: &str| {
        segments
            .iter()
            .position(|s| *s == name)
            .is_some_and(|i| segments.get(i + 1).is_some_and(|v| !v.is_empty()))
    };
    (has("workloadIdentityPools") || has("workforcePools")) && has("providers")
}
