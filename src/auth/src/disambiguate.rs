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

//! Choosing among cached user credentials.
//!
//! The policy lives in [decide], a pure function of the matching accounts,
//! the caller preference, and whether the user can be asked. The
//! [Disambiguator] carries out the decision, asking the user through a
//! [Prompt] when needed.

use crate::errors::CredentialsError;
use crate::params::EmailPreference;
use crate::prompt::{Choice, Prompt};
use crate::token_cache::CacheEntry;
use std::sync::Arc;

/// What to do with the cached credentials matching a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Reuse the match at this index.
    Reuse(usize),
    /// Ask the user to pick one of these choices.
    Prompt(Vec<Choice>),
    /// Authorize a new credential, optionally hinting at the account.
    Acquire { hint: Option<String> },
    /// More than one match and no way to choose.
    Ambiguous,
}

/// Decides how to resolve the cached accounts `emails` for a request.
///
/// * An exact preference reuses the matching account, or acquires a new
///   credential for it.
/// * No matches always acquire a new credential.
/// * A single match is reused if the preference is [EmailPreference::Any]
///   or the user cannot be asked, otherwise the user chooses between it and
///   starting over.
/// * Multiple matches are ambiguous with [EmailPreference::Any] or when the
///   user cannot be asked, otherwise the user chooses.
///
/// # Example
/// ```
/// # use google_cloud_token_fetch::disambiguate::{decide, Decision};
/// # use google_cloud_token_fetch::params::EmailPreference;
/// let emails = ["a@x.com", "b@x.com"];
/// assert_eq!(decide(&emails, &EmailPreference::Any, true), Decision::Ambiguous);
/// assert_eq!(
///     decide(&emails, &EmailPreference::Exact("b@x.com".into()), false),
///     Decision::Reuse(1)
/// );
/// ```
pub fn decide<S: AsRef<str>>(
    emails: &[S],
    preference: &EmailPreference,
    interactive: bool,
) -> Decision {
    if let EmailPreference::Exact(want) = preference {
        return match emails.iter().position(|e| e.as_ref() == want) {
            Some(i) => Decision::Reuse(i),
            None => Decision::Acquire {
                hint: Some(want.clone()),
            },
        };
    }
    let auto_select = matches!(preference, EmailPreference::Any) || !interactive;
    match emails.len() {
        0 => Decision::Acquire { hint: None },
        1 if auto_select => Decision::Reuse(0),
        _ if emails.len() > 1 && auto_select => Decision::Ambiguous,
        _ => Decision::Prompt(
            std::iter::once(Choice::StartNew)
                .chain(emails.iter().map(|e| Choice::Account(e.as_ref().to_string())))
                .collect(),
        ),
    }
}

/// The outcome of a successful disambiguation.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Reuse(CacheEntry),
    Acquire { hint: Option<String> },
}

#[derive(thiserror::Error, Debug)]
pub enum DisambiguationError {
    #[error(
        "{count} cached credentials match the request; set `email` to one of them or allow prompting"
    )]
    Ambiguous { count: usize },
    #[error("the account selection was cancelled")]
    Aborted,
    #[error("cannot ask for an account selection: {0}")]
    Prompt(#[source] CredentialsError),
}

/// Resolves the cached credentials matching a request.
///
/// A disambiguator without a [Prompt] never asks the user.
#[derive(Clone, Debug, Default)]
pub struct Disambiguator {
    prompt: Option<Arc<dyn Prompt>>,
    verbose: bool,
}

impl Disambiguator {
    pub fn new(prompt: Option<Arc<dyn Prompt>>) -> Self {
        Self {
            prompt,
            verbose: false,
        }
    }

    /// Logs the decisions at `INFO` instead of `DEBUG`.
    pub fn verbose(mut self, v: bool) -> Self {
        self.verbose = v;
        self
    }

    pub fn is_interactive(&self) -> bool {
        self.prompt.is_some()
    }

    pub async fn resolve(
        &self,
        mut matches: Vec<CacheEntry>,
        preference: &EmailPreference,
    ) -> Result<Resolution, DisambiguationError> {
        let emails = matches.iter().map(|e| e.email.as_str()).collect::<Vec<_>>();
        let decision = decide(&emails, preference, self.is_interactive());
        if self.verbose {
            tracing::info!(matches = emails.len(), ?preference, ?decision, "disambiguating cached credentials");
        } else {
            tracing::debug!(matches = emails.len(), ?preference, ?decision, "disambiguating cached credentials");
        }

        match decision {
            Decision::Reuse(i) => Ok(Resolution::Reuse(matches.swap_remove(i))),
            Decision::Acquire { hint } => Ok(Resolution::Acquire { hint }),
            Decision::Ambiguous => Err(DisambiguationError::Ambiguous {
                count: matches.len(),
            }),
            Decision::Prompt(choices) => {
                let Some(prompt) = &self.prompt else {
                    return Err(DisambiguationError::Ambiguous {
                        count: matches.len(),
                    });
                };
                let selected = prompt
                    .select(&choices)
                    .await
                    .map_err(DisambiguationError::Prompt)?;
                match selected.and_then(|i| choices.get(i)) {
                    None => Err(DisambiguationError::Aborted),
                    Some(Choice::StartNew) => Ok(Resolution::Acquire { hint: None }),
                    Some(Choice::Account(email)) => matches
                        .into_iter()
                        .find(|e| e.email == *email)
                        .map(Resolution::Reuse)
                        .ok_or(DisambiguationError::Aborted),
                }
            }
        }
    }
}
