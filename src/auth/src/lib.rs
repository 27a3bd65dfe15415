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

//! Google Cloud Client Libraries for Rust - Credential Provider Chain
//!
//! This crate resolves an access credential for a caller by walking an
//! ordered chain of credential providers. Each provider either produces a
//! [CredentialSource][credentials::CredentialSource], declares itself not
//! applicable (skipped), or reports that its inputs were present but invalid
//! (failed). The first success wins.
//!
//! The default chain, from cheapest to most interactive, is:
//!
//! 1. A token supplied by the caller.
//! 2. A [service account] key file.
//! 3. An [external account] configuration (workload identity federation).
//! 4. [Application Default Credentials] found in the well-known locations.
//! 5. The [metadata service] on Google Compute Engine and similar
//!    environments.
//! 6. An interactive user OAuth2 flow, backed by a persistent token cache.
//!
//! The last provider consults the [token cache][token_cache] before
//! starting a new authorization. When more than one cached credential could
//! satisfy the request the [disambiguator][disambiguate] decides whether to
//! reuse one, ask the user, or start over.
//!
//! Example usage:
//!
//! ```no_run
//! # use google_cloud_token_fetch::chain::Builder;
//! # use google_cloud_token_fetch::params::ParamBag;
//! # use google_cloud_token_fetch::scopes::ScopeSet;
//! # tokio_test::block_on(async {
//! let chain = Builder::default().build();
//! let scopes = ScopeSet::from(["https://www.googleapis.com/auth/cloud-platform"]);
//! let params = ParamBag::new().with_text("path", "/does/not/exist.json");
//! match chain.fetch(&scopes, &params).await {
//!     Ok(source) => println!("found {:?} credentials", source.kind()),
//!     Err(e) => println!("no credentials: {e}"),
//! }
//! # });
//! ```
//!
//! [Application Default Credentials]: https://cloud.google.com/docs/authentication/application-default-credentials
//! [external account]: https://cloud.google.com/iam/docs/workload-identity-federation
//! [metadata service]: https://cloud.google.com/compute/docs/metadata/overview
//! [service account]: https://cloud.google.com/iam/docs/service-account-overview

pub mod build_errors;
pub mod errors;
pub mod fetch_errors;

pub mod params;
pub mod scopes;

/// Types and functions to work with auth [Tokens].
///
/// [Tokens]: https://cloud.google.com/docs/authentication#token
pub mod token;

pub(crate) mod token_refresh;

/// Credential handles and the typed description of where they came from.
pub mod credentials;

pub mod credential_file;
pub mod exchange;
pub mod mds;
pub mod oauth;
pub mod prompt;

/// The persistent cache of user OAuth2 credentials.
pub mod token_cache;

pub mod disambiguate;

/// The built-in credential providers and the provider contract.
pub mod providers;

pub mod chain;
pub mod registry;

pub(crate) mod constants;
pub(crate) mod env;

/// A `Result` alias where the `Err` case is
/// `google_cloud_token_fetch::errors::CredentialsError`.
pub(crate) type Result<T> = std::result::Result<T, crate::errors::CredentialsError>;
