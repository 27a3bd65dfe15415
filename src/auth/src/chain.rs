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

//! The provider chain.
//!
//! A [Chain] tries the providers in its [ProviderRegistry], in order, until
//! one produces a credential. Use the [Builder] to create a chain with the
//! built-in providers and the collaborators they need.

use crate::credentials::CredentialSource;
use crate::disambiguate::Disambiguator;
use crate::exchange::KeyExchange;
use crate::fetch_errors::Error;
use crate::mds::{HttpMetadataProbe, MetadataProbe};
use crate::oauth::OAuthFlow;
use crate::params::{ClientIdentity, ParamBag};
use crate::prompt::{ConsolePrompt, Prompt};
use crate::providers::adc::AdcProvider;
use crate::providers::byo_token::ByoTokenProvider;
use crate::providers::external_account::ExternalAccountProvider;
use crate::providers::mds::{DEFAULT_PROBE_TIMEOUT, MetadataProvider};
use crate::providers::service_account::ServiceAccountProvider;
use crate::providers::user_oauth2::UserOAuth2Provider;
use crate::providers::{Outcome, Provider, Reason, contain};
use crate::registry::{
    ADC, BYO_TOKEN, COMPUTE_METADATA, EXTERNAL_ACCOUNT, ProviderRegistry, SERVICE_ACCOUNT,
    USER_OAUTH2,
};
use crate::scopes::ScopeSet;
use crate::token_cache::{CacheStore, FileStore, MemoryStore, TokenCache};
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

/// What a provider did in a [Chain::fetch].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    Skipped,
    Failed,
}

impl OutcomeKind {
    pub fn name(&self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::Skipped => "skipped",
            OutcomeKind::Failed => "failed",
        }
    }
}

/// One entry in the diagnostic trace of a [Chain::fetch].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attempt {
    /// The name of the provider in the registry.
    pub provider: String,
    pub outcome: OutcomeKind,
    /// Why the provider did not produce a credential, `None` on success.
    pub reason: Option<Reason>,
}

impl std::fmt::Display for Attempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.reason {
            Some(r) => write!(f, "{}: {} ({r})", self.provider, self.outcome.name()),
            None => write!(f, "{}: {}", self.provider, self.outcome.name()),
        }
    }
}

/// Finds credentials by trying a sequence of providers.
///
/// # Example
/// ```
/// # use google_cloud_token_fetch::chain::Chain;
/// # use google_cloud_token_fetch::params::ParamBag;
/// # use google_cloud_token_fetch::providers::{from_fn, Outcome};
/// # use google_cloud_token_fetch::registry::ProviderRegistry;
/// # use google_cloud_token_fetch::scopes::ScopeSet;
/// # use std::sync::Arc;
/// # tokio_test::block_on(async {
/// let registry = ProviderRegistry::default();
/// registry.set("never", Some(Arc::new(from_fn(|_, _| Outcome::skipped("not applicable")))));
/// let chain = Chain::new(registry);
/// let err = chain.fetch(&ScopeSet::from(["drive"]), &ParamBag::new()).await.unwrap_err();
/// assert!(err.is_exhausted());
/// assert_eq!(err.trace()[0].provider, "never");
/// # });
/// ```
#[derive(Clone, Debug)]
pub struct Chain {
    registry: ProviderRegistry,
    verbose: bool,
}

impl Chain {
    /// Creates a chain over `registry`.
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            registry,
            verbose: false,
        }
    }

    /// The providers of this chain.
    ///
    /// Changes to the registry apply to any later [fetch][Chain::fetch].
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Returns the credential of the first provider that succeeds.
    ///
    /// Providers are tried in registry order, one at a time, and no provider
    /// after the first success is called. A credential whose scopes do not
    /// include all of `scopes` is never returned, it counts as a failure of
    /// the provider that produced it.
    ///
    /// If no provider succeeds the error carries the full trace. The error
    /// is [ambiguous][Error::is_ambiguous],
    /// [refresh failed][Error::is_refresh_failed] or
    /// [user aborted][Error::is_user_aborted] if a provider failed for one
    /// of those reasons, and [exhausted][Error::is_exhausted] otherwise.
    pub async fn fetch(
        &self,
        scopes: &ScopeSet,
        params: &ParamBag,
    ) -> Result<CredentialSource, Error> {
        self.run(self.registry.list(), scopes, params).await
    }

    /// Like [fetch][Chain::fetch], with `overrides` applied for this call
    /// only.
    ///
    /// The overrides have the same meaning as in [ProviderRegistry::set].
    /// They are applied to a snapshot, concurrent calls do not see them.
    pub async fn fetch_with_overrides<I, S>(
        &self,
        overrides: I,
        scopes: &ScopeSet,
        params: &ParamBag,
    ) -> Result<CredentialSource, Error>
    where
        I: IntoIterator<Item = (S, Option<Arc<dyn Provider>>)>,
        S: Into<String>,
    {
        let snapshot = self.registry.snapshot();
        for (name, provider) in overrides {
            snapshot.set(name, provider);
        }
        self.run(snapshot.list(), scopes, params).await
    }

    async fn run(
        &self,
        providers: Vec<(String, Arc<dyn Provider>)>,
        scopes: &ScopeSet,
        params: &ParamBag,
    ) -> Result<CredentialSource, Error> {
        let mut trace = Vec::with_capacity(providers.len());
        for (name, provider) in providers {
            let outcome = match contain(provider.as_ref(), scopes, params).await {
                Outcome::Success(source) if !source.scopes().is_superset_of(scopes) => {
                    Outcome::failed(format!(
                        "the credential scopes {} do not include the requested scopes {scopes}",
                        source.scopes()
                    ))
                }
                o => o,
            };
            let (entry, source) = match outcome {
                Outcome::Success(source) => {
                    (attempt(name, OutcomeKind::Success, None), Some(source))
                }
                Outcome::Skipped(r) => (attempt(name, OutcomeKind::Skipped, Some(r)), None),
                Outcome::Failed(r) => (attempt(name, OutcomeKind::Failed, Some(r)), None),
            };
            self.log(&entry);
            if let Some(source) = source {
                return Ok(source);
            }
            trace.push(entry);
        }
        let error = Error::from_trace(trace);
        if self.verbose {
            tracing::info!("credential chain failed: {error}");
        } else {
            tracing::debug!("credential chain failed: {error}");
        }
        Err(error)
    }

    fn log(&self, attempt: &Attempt) {
        let reason = attempt.reason.as_ref().map(Reason::message).unwrap_or_default();
        if self.verbose {
            tracing::info!(provider = %attempt.provider, outcome = attempt.outcome.name(), reason, "credential provider");
        } else {
            tracing::debug!(provider = %attempt.provider, outcome = attempt.outcome.name(), reason, "credential provider");
        }
    }
}

fn attempt(provider: String, outcome: OutcomeKind, reason: Option<Reason>) -> Attempt {
    Attempt {
        provider,
        outcome,
        reason,
    }
}

/// A builder for a [Chain] with the built-in providers.
///
/// The built-in providers are registered in the default order, see
/// [DEFAULT_ORDER][crate::registry::DEFAULT_ORDER]. Providers that need a
/// collaborator which is not configured report a failure instead of a
/// credential:
///
/// * Service account, external account, and Application Default
///   Credentials files need a [KeyExchange].
/// * New or expired user credentials need an [OAuthFlow].
///
/// By default the metadata service is probed over HTTP, user credentials are
/// cached in [FileStore::with_default_dir], and the user is prompted on the
/// terminal when stdin is a terminal.
///
/// # Example
/// ```
/// # use google_cloud_token_fetch::chain::Builder;
/// # use google_cloud_token_fetch::token_cache::MemoryStore;
/// let chain = Builder::default()
///     .with_cache_store(MemoryStore::new())
///     .with_interactive(false)
///     .verbose(true)
///     .build();
/// assert_eq!(chain.registry().names().len(), 6);
/// ```
#[derive(Debug)]
pub struct Builder {
    key_exchange: Option<Arc<dyn KeyExchange>>,
    metadata_probe: Option<Arc<dyn MetadataProbe>>,
    metadata_timeout: Duration,
    oauth_flow: Option<Arc<dyn OAuthFlow>>,
    prompt: Option<Arc<dyn Prompt>>,
    cache_store: Option<Arc<dyn CacheStore>>,
    interactive: Option<bool>,
    default_app: Option<ClientIdentity>,
    verbose: bool,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            key_exchange: None,
            metadata_probe: None,
            metadata_timeout: DEFAULT_PROBE_TIMEOUT,
            oauth_flow: None,
            prompt: None,
            cache_store: None,
            interactive: None,
            default_app: None,
            verbose: false,
        }
    }
}

impl Builder {
    /// Mints tokens for service account, external account, and user
    /// credential files.
    pub fn with_key_exchange<T: KeyExchange + 'static>(mut self, v: T) -> Self {
        self.key_exchange = Some(Arc::new(v));
        self
    }

    /// Replaces the default [HttpMetadataProbe].
    pub fn with_metadata_probe<T: MetadataProbe + 'static>(mut self, v: T) -> Self {
        self.metadata_probe = Some(Arc::new(v));
        self
    }

    /// How long to wait for the metadata service, 3 seconds by default.
    pub fn with_metadata_timeout(mut self, v: Duration) -> Self {
        self.metadata_timeout = v;
        self
    }

    /// Authorizes and refreshes user credentials.
    pub fn with_oauth_flow<T: OAuthFlow + 'static>(mut self, v: T) -> Self {
        self.oauth_flow = Some(Arc::new(v));
        self
    }

    /// Replaces the default [ConsolePrompt].
    pub fn with_prompt<T: Prompt + 'static>(mut self, v: T) -> Self {
        self.prompt = Some(Arc::new(v));
        self
    }

    /// Stores user credentials in `v` instead of the default directory.
    pub fn with_cache_store<T: CacheStore + 'static>(mut self, v: T) -> Self {
        self.cache_store = Some(Arc::new(v));
        self
    }

    /// Whether the user can be asked to choose an account.
    ///
    /// Defaults to `true` if stdin is a terminal.
    pub fn with_interactive(mut self, v: bool) -> Self {
        self.interactive = Some(v);
        self
    }

    /// The client identity for user credentials when the request has no
    /// `app` parameter.
    pub fn with_default_app(mut self, v: ClientIdentity) -> Self {
        self.default_app = Some(v);
        self
    }

    /// Logs the provider outcomes and the account selection at `INFO`
    /// instead of `DEBUG`.
    pub fn verbose(mut self, v: bool) -> Self {
        self.verbose = v;
        self
    }

    pub fn build(self) -> Chain {
        let probe = self
            .metadata_probe
            .unwrap_or_else(|| Arc::new(HttpMetadataProbe::default()) as Arc<dyn MetadataProbe>);
        let store = self.cache_store.unwrap_or_else(default_cache_store);
        let interactive = self
            .interactive
            .unwrap_or_else(|| std::io::stdin().is_terminal());
        let prompt = interactive.then(|| {
            self.prompt
                .unwrap_or_else(|| Arc::new(ConsolePrompt) as Arc<dyn Prompt>)
        });

        let mut user = UserOAuth2Provider::new(
            self.oauth_flow,
            TokenCache::from_arc(store),
            Disambiguator::new(prompt).verbose(self.verbose),
        );
        if let Some(app) = self.default_app {
            user = user.with_default_app(app);
        }

        let exchange = self.key_exchange;
        let providers: [(&str, Arc<dyn Provider>); 6] = [
            (BYO_TOKEN, Arc::new(ByoTokenProvider)),
            (
                SERVICE_ACCOUNT,
                Arc::new(ServiceAccountProvider::new(exchange.clone())),
            ),
            (
                EXTERNAL_ACCOUNT,
                Arc::new(ExternalAccountProvider::new(exchange.clone())),
            ),
            (ADC, Arc::new(AdcProvider::new(exchange))),
            (
                COMPUTE_METADATA,
                Arc::new(MetadataProvider::new(probe).with_timeout(self.metadata_timeout)),
            ),
            (USER_OAUTH2, Arc::new(user)),
        ];
        Chain {
            registry: ProviderRegistry::new(providers),
            verbose: self.verbose,
        }
    }
}

fn default_cache_store() -> Arc<dyn CacheStore> {
    match FileStore::with_default_dir() {
        Some(s) => Arc::new(s),
        None => {
            tracing::warn!(
                "cannot find a directory for the token cache, user credentials will not persist"
            );
            Arc::new(MemoryStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Provenance;
    use crate::credentials::tests::test_source;
    use crate::mds::tests::MockMetadataProbe;
    use crate::providers::tests::{MockProvider, success};
    use crate::providers::{TerminalCause, from_fn};
    use crate::registry::DEFAULT_ORDER;

    fn skipping(reason: &'static str) -> Arc<dyn Provider> {
        Arc::new(from_fn(move |_, _| Outcome::skipped(reason)))
    }

    fn succeeding() -> Arc<dyn Provider> {
        Arc::new(from_fn(|scopes, _| success(scopes)))
    }

    fn never_called() -> Arc<dyn Provider> {
        let mut mock = MockProvider::new();
        mock.expect_provide().never();
        Arc::new(mock)
    }

    #[tokio::test]
    async fn short_circuit() -> anyhow::Result<()> {
        let registry = ProviderRegistry::new([
            ("a", skipping("no a")),
            ("b", succeeding()),
            ("c", never_called()),
        ]);
        let chain = Chain::new(registry);
        let scopes = ScopeSet::from(["drive"]);
        let source = chain.fetch(&scopes, &ParamBag::new()).await?;
        assert_eq!(*source.scopes(), scopes);
        Ok(())
    }

    #[tokio::test]
    async fn exhausted_trace_in_order() {
        let registry = ProviderRegistry::new([
            ("a", skipping("no a")),
            ("b", Arc::new(from_fn(|_, _| Outcome::failed("bad b"))) as Arc<dyn Provider>),
            ("c", skipping("no c")),
        ]);
        let err = Chain::new(registry)
            .fetch(&ScopeSet::new(), &ParamBag::new())
            .await
            .expect_err("nothing succeeds");
        assert!(err.is_exhausted(), "{err:?}");
        let got = err
            .trace()
            .iter()
            .map(|a| (a.provider.as_str(), a.outcome, a.reason.as_ref().map(|r| r.message().to_string())))
            .collect::<Vec<_>>();
        assert_eq!(
            got,
            vec![
                ("a", OutcomeKind::Skipped, Some("no a".to_string())),
                ("b", OutcomeKind::Failed, Some("bad b".to_string())),
                ("c", OutcomeKind::Skipped, Some("no c".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn narrower_scopes_are_failures() -> anyhow::Result<()> {
        let narrow: Arc<dyn Provider> = Arc::new(from_fn(|_, _| {
            Outcome::Success(test_source(Provenance::ByoToken, ScopeSet::from(["drive"])))
        }));
        let registry = ProviderRegistry::new([("narrow", narrow), ("wide", succeeding())]);
        let chain = Chain::new(registry);
        let scopes = ScopeSet::from(["drive", "email"]);
        let source = chain.fetch(&scopes, &ParamBag::new()).await?;
        assert!(source.scopes().is_superset_of(&scopes));

        chain.registry().set("wide", None);
        let err = chain
            .fetch(&scopes, &ParamBag::new())
            .await
            .expect_err("only a narrower credential is available");
        assert_eq!(err.trace()[0].outcome, OutcomeKind::Failed);
        Ok(())
    }

    #[tokio::test]
    async fn panics_are_failures() -> anyhow::Result<()> {
        let panicking: Arc<dyn Provider> = Arc::new(from_fn(|_, _| panic!("test-only panic")));
        let registry = ProviderRegistry::new([("panics", panicking), ("ok", succeeding())]);
        let chain = Chain::new(registry);
        chain.fetch(&ScopeSet::new(), &ParamBag::new()).await?;

        chain.registry().set("ok", None);
        let err = chain
            .fetch(&ScopeSet::new(), &ParamBag::new())
            .await
            .expect_err("the only provider panics");
        assert_eq!(err.trace()[0].outcome, OutcomeKind::Failed);
        Ok(())
    }

    #[tokio::test]
    async fn terminal_cause_surfaces() {
        let aborted: Arc<dyn Provider> = Arc::new(from_fn(|_, _| {
            Outcome::Failed(Reason::terminal(TerminalCause::UserAborted, "cancelled"))
        }));
        let registry = ProviderRegistry::new([("aborted", aborted), ("after", skipping("n/a"))]);
        let err = Chain::new(registry)
            .fetch(&ScopeSet::new(), &ParamBag::new())
            .await
            .expect_err("nothing succeeds");
        assert!(err.is_user_aborted(), "{err:?}");
        assert_eq!(err.trace().len(), 2);
    }

    #[tokio::test]
    async fn overrides_apply_to_one_call() -> anyhow::Result<()> {
        let registry = ProviderRegistry::new([("a", skipping("no a"))]);
        let chain = Chain::new(registry);
        chain
            .fetch_with_overrides([("b", Some(succeeding()))], &ScopeSet::new(), &ParamBag::new())
            .await?;
        assert_eq!(chain.registry().names(), vec!["a"]);
        assert!(chain.fetch(&ScopeSet::new(), &ParamBag::new()).await.is_err());

        chain.registry().set("b", Some(succeeding()));
        let err = chain
            .fetch_with_overrides([("b", None)], &ScopeSet::new(), &ParamBag::new())
            .await
            .expect_err("the override removes the only success");
        assert_eq!(err.trace().len(), 1);
        Ok(())
    }

    #[test]
    fn builder_defaults() {
        let builder = Builder::default();
        assert_eq!(builder.metadata_timeout, DEFAULT_PROBE_TIMEOUT);
        assert!(builder.interactive.is_none());
        let chain = builder
            .with_cache_store(MemoryStore::new())
            .with_interactive(false)
            .build();
        assert_eq!(chain.registry().names(), DEFAULT_ORDER);
        assert!(!chain.verbose);
    }

    #[tokio::test]
    async fn builder_wires_metadata_probe() -> anyhow::Result<()> {
        let mut probe = MockMetadataProbe::new();
        probe
            .expect_probe()
            .times(1)
            .returning(|_, _| Ok(Some(crate::token::Token::bearer("mds-token", None))));
        let chain = Builder::default()
            .with_metadata_probe(probe)
            .with_cache_store(MemoryStore::new())
            .with_interactive(false)
            .build();
        // Keep the search for application default credentials away from the
        // developer's own files.
        chain.registry().set(ADC, None);
        let source = chain.fetch(&ScopeSet::new(), &ParamBag::new()).await?;
        assert_eq!(source.email(), Some("default"));
        assert_eq!(
            chain.registry().names(),
            vec![BYO_TOKEN, SERVICE_ACCOUNT, EXTERNAL_ACCOUNT, COMPUTE_METADATA, USER_OAUTH2]
        );
        Ok(())
    }

    #[test]
    fn attempt_display() {
        let a = attempt("a".into(), OutcomeKind::Skipped, Some(Reason::new("why")));
        assert_eq!(a.to_string(), "a: skipped (why)");
        let a = attempt("b".into(), OutcomeKind::Success, None);
        assert_eq!(a.to_string(), "b: success");
    }
}
