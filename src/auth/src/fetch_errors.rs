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

//! Errors returned by [Chain::fetch][crate::chain::Chain::fetch].

use crate::chain::Attempt;
use crate::providers::TerminalCause;

/// The error type for [Chain::fetch][crate::chain::Chain::fetch].
///
/// Every provider in the chain was skipped or failed. Applications can
/// use the predicates to decide what to do next, for example, asking the
/// user for an explicit `email` after [is_ambiguous][Error::is_ambiguous].
/// The [trace][Error::trace] lists every provider tried, in order, with the
/// reason it did not produce a credential.
#[derive(thiserror::Error, Debug)]
#[error("{kind}")]
pub struct Error {
    kind: ErrorKind,
    trace: Vec<Attempt>,
}

impl Error {
    /// No provider produced a credential, and none reported a terminal
    /// failure.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.kind, ErrorKind::Exhausted(_))
    }

    /// More than one cached user credential matched, and the request did
    /// not say which one to use.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self.kind, ErrorKind::Ambiguous(_))
    }

    /// A cached user credential had expired and could not be refreshed.
    ///
    /// Retrying with a new authorization may succeed.
    pub fn is_refresh_failed(&self) -> bool {
        matches!(self.kind, ErrorKind::RefreshFailed(_))
    }

    /// The user cancelled an account selection or an authorization. The
    /// token cache was not modified.
    pub fn is_user_aborted(&self) -> bool {
        matches!(self.kind, ErrorKind::UserAborted(_))
    }

    /// The providers tried, in order.
    pub fn trace(&self) -> &[Attempt] {
        &self.trace
    }

    /// Classifies a chain run where no provider succeeded.
    ///
    /// The last terminal failure, if any, determines the kind of error.
    pub(crate) fn from_trace(trace: Vec<Attempt>) -> Error {
        let terminal = trace.iter().rev().find_map(|a| {
            a.reason
                .as_ref()
                .and_then(|r| r.cause().map(|c| (c, r.message().to_string())))
        });
        let kind = match terminal {
            Some((TerminalCause::Ambiguous, m)) => ErrorKind::Ambiguous(m),
            Some((TerminalCause::RefreshFailed, m)) => ErrorKind::RefreshFailed(m),
            Some((TerminalCause::UserAborted, m)) => ErrorKind::UserAborted(m),
            None if trace.is_empty() => ErrorKind::Exhausted("no providers are registered".to_string()),
            None => ErrorKind::Exhausted(
                trace
                    .iter()
                    .map(Attempt::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
        };
        Error { kind, trace }
    }
}

#[derive(thiserror::Error, Debug)]
enum ErrorKind {
    #[error("no credential provider succeeded [{0}]")]
    Exhausted(String),
    #[error("cannot choose a cached credential: {0}")]
    Ambiguous(String),
    #[error("cannot refresh the cached credential: {0}")]
    RefreshFailed(String),
    #[error("the credential flow was cancelled: {0}")]
    UserAborted(String),
}
