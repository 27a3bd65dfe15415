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

//! The ordered set of named providers used by the chain.

use crate::providers::Provider;
use std::sync::{Arc, PoisonError, RwLock};

pub const BYO_TOKEN: &str = "byo_token";
pub const SERVICE_ACCOUNT: &str = "service_account";
pub const EXTERNAL_ACCOUNT: &str = "external_account";
pub const ADC: &str = "adc";
pub const COMPUTE_METADATA: &str = "compute_metadata";
pub const USER_OAUTH2: &str = "user_oauth2";

/// The names of the built-in providers, in their default order.
///
/// The order goes from the cheapest and most explicit provider to the most
/// expensive and interactive one.
pub const DEFAULT_ORDER: [&str; 6] = [
    BYO_TOKEN,
    SERVICE_ACCOUNT,
    EXTERNAL_ACCOUNT,
    ADC,
    COMPUTE_METADATA,
    USER_OAUTH2,
];

type Entries = Vec<(String, Arc<dyn Provider>)>;
type Overrides = Vec<(String, Option<Arc<dyn Provider>>)>;

#[derive(Debug, Default)]
struct State {
    base: Entries,
    // Active scoped overrides, in installation order.
    layers: Vec<(u64, Overrides)>,
    next_layer: u64,
}

impl State {
    fn effective(&self) -> Entries {
        let mut entries = self.base.clone();
        for (_, overrides) in &self.layers {
            for (name, provider) in overrides {
                apply(&mut entries, name.clone(), provider.clone());
            }
        }
        entries
    }
}

/// An ordered map from provider names to providers.
///
/// Clones share the same providers: a change made through one clone is
/// visible to all of them, and to the [Chain][crate::chain::Chain] that
/// owns the registry. Reads and writes are serialized, each
/// [fetch][crate::chain::Chain::fetch] works on a consistent copy taken
/// when it starts.
///
/// # Example
/// ```
/// # use google_cloud_token_fetch::providers::{from_fn, Outcome};
/// # use google_cloud_token_fetch::registry::ProviderRegistry;
/// # use std::sync::Arc;
/// let registry = ProviderRegistry::default();
/// registry.set("first", Some(Arc::new(from_fn(|_, _| Outcome::skipped("n/a")))));
/// registry.set("second", Some(Arc::new(from_fn(|_, _| Outcome::skipped("n/a")))));
/// registry.set("first", None);
/// assert_eq!(registry.names(), vec!["second"]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct ProviderRegistry {
    state: Arc<RwLock<State>>,
}

impl ProviderRegistry {
    /// Creates a registry with `providers`, in order.
    ///
    /// Later providers replace earlier providers with the same name.
    pub fn new<I, S>(providers: I) -> Self
    where
        I: IntoIterator<Item = (S, Arc<dyn Provider>)>,
        S: Into<String>,
    {
        let registry = Self::default();
        for (name, provider) in providers {
            registry.set(name, Some(provider));
        }
        registry
    }

    /// Inserts, replaces, or removes the provider called `name`.
    ///
    /// Replacing a provider keeps its position, a new name goes to the end.
    /// Setting `None` removes the provider. The order of the other providers
    /// does not change. Active [scoped overrides][Self::scoped_override]
    /// take precedence over this change until they are dropped.
    pub fn set<S: Into<String>>(&self, name: S, provider: Option<Arc<dyn Provider>>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut state.base, name.into(), provider);
    }

    /// Returns the providers, in order.
    pub fn list(&self) -> Vec<(String, Arc<dyn Provider>)> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .effective()
    }

    /// Returns the provider names, in order.
    pub fn names(&self) -> Vec<String> {
        self.list().into_iter().map(|(n, _)| n).collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.list()
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p)
    }

    /// Returns an independent copy of this registry.
    ///
    /// Changes to the copy do not affect this registry, or vice versa. The
    /// copy includes any active scoped overrides as plain entries.
    pub fn snapshot(&self) -> ProviderRegistry {
        let state = State {
            base: self.list(),
            ..State::default()
        };
        ProviderRegistry {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Applies `overrides` until the returned guard is dropped.
    ///
    /// Each override has the same meaning as in [set][Self::set]. Dropping
    /// the guard removes exactly these overrides, other guards stay in
    /// effect no matter the order in which guards are dropped. The guard is
    /// dropped on every exit path, including errors, panics, and
    /// cancellation of the future holding it.
    #[must_use = "the overrides are removed when the guard is dropped"]
    pub fn scoped_override<I, S>(&self, overrides: I) -> OverrideGuard
    where
        I: IntoIterator<Item = (S, Option<Arc<dyn Provider>>)>,
        S: Into<String>,
    {
        let overrides = overrides
            .into_iter()
            .map(|(n, p)| (n.into(), p))
            .collect();
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let id = state.next_layer;
        state.next_layer += 1;
        state.layers.push((id, overrides));
        OverrideGuard {
            registry: self.clone(),
            id,
        }
    }
}

fn apply(entries: &mut Entries, name: String, provider: Option<Arc<dyn Provider>>) {
    let position = entries.iter().position(|(n, _)| *n == name);
    match (position, provider) {
        (Some(i), Some(p)) => entries[i].1 = p,
        (Some(i), None) => {
            entries.remove(i);
        }
        (None, Some(p)) => entries.push((name, p)),
        (None, None) => {}
    }
}

/// Removes a set of overrides from a [ProviderRegistry] when dropped, see
/// [ProviderRegistry::scoped_override].
#[derive(Debug)]
pub struct OverrideGuard {
    registry: ProviderRegistry,
    id: u64,
}

impl Drop for OverrideGuard {
    fn drop(&mut self) {
        self.registry
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .layers
            .retain(|(id, _)| *id != self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{Outcome, from_fn};

    fn skipping() -> Arc<dyn Provider> {
        Arc::new(from_fn(|_, _| Outcome::skipped("test-only")))
    }

    fn registry(names: &[&str]) -> ProviderRegistry {
        ProviderRegistry::new(names.iter().map(|n| (*n, skipping())))
    }

    #[test]
    fn default_order() {
        assert_eq!(
            DEFAULT_ORDER,
            [
                "byo_token",
                "service_account",
                "external_account",
                "adc",
                "compute_metadata",
                "user_oauth2"
            ]
        );
    }

    #[test]
    fn set_insert_replace_remove() {
        let r = registry(&["a", "b", "c"]);
        assert_eq!(r.names(), vec!["a", "b", "c"]);

        let replacement = skipping();
        r.set("b", Some(replacement.clone()));
        assert_eq!(r.names(), vec!["a", "b", "c"]);
        let got = r.get("b").expect("b is registered");
        assert!(Arc::ptr_eq(&got, &replacement));

        r.set("d", Some(skipping()));
        assert_eq!(r.names(), vec!["a", "b", "c", "d"]);

        r.set("b", None);
        assert_eq!(r.names(), vec!["a", "c", "d"]);
        assert!(r.get("b").is_none());

        r.set("missing", None);
        assert_eq!(r.names(), vec!["a", "c", "d"]);

        // Re-adding a removed name appends it.
        r.set("b", Some(skipping()));
        assert_eq!(r.names(), vec!["a", "c", "d", "b"]);
    }

    #[test]
    fn new_deduplicates() {
        let r = registry(&["a", "b", "a"]);
        assert_eq!(r.names(), vec!["a", "b"]);
        assert_eq!(r.list().len(), 2);
    }

    #[test]
    fn clones_share_snapshots_do_not() {
        let r = registry(&["a", "b"]);
        let clone = r.clone();
        let snapshot = r.snapshot();
        clone.set("c", Some(skipping()));
        snapshot.set("a", None);
        assert_eq!(r.names(), vec!["a", "b", "c"]);
        assert_eq!(snapshot.names(), vec!["b"]);
    }

    #[test]
    fn scoped_override_restores() {
        let r = registry(&["a", "b", "c"]);
        {
            let _guard = r.scoped_override([("b", None), ("z", Some(skipping()))]);
            assert_eq!(r.names(), vec!["a", "c", "z"]);
        }
        assert_eq!(r.names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn scoped_override_keeps_later_sets() {
        let r = registry(&["a", "b"]);
        let replacement = skipping();
        {
            let _guard = r.scoped_override([("a", None::<Arc<dyn Provider>>)]);
            r.set("during", Some(skipping()));
            r.set("a", Some(replacement.clone()));
            assert_eq!(r.names(), vec!["b", "during"]);
        }
        assert_eq!(r.names(), vec!["a", "b", "during"]);
        let got = r.get("a").expect("a is registered");
        assert!(Arc::ptr_eq(&got, &replacement));
    }

    #[test]
    fn scoped_override_dropped_out_of_order() {
        let r = registry(&["a", "b"]);
        let g1 = r.scoped_override([("x", Some(skipping()))]);
        let g2 = r.scoped_override([("y", Some(skipping()))]);
        assert_eq!(r.names(), vec!["a", "b", "x", "y"]);
        drop(g1);
        assert_eq!(r.names(), vec!["a", "b", "y"]);
        drop(g2);
        assert_eq!(r.names(), vec!["a", "b"]);
    }

    #[test]
    fn scoped_override_same_name_out_of_order() {
        let r = registry(&["a", "b"]);
        let original = r.get("a").expect("a is registered");
        let first = skipping();
        let second = skipping();
        let g1 = r.scoped_override([("a", Some(first.clone()))]);
        let g2 = r.scoped_override([("a", Some(second.clone()))]);
        let got = r.get("a").expect("a is registered");
        assert!(Arc::ptr_eq(&got, &second));

        drop(g1);
        let got = r.get("a").expect("a is registered");
        assert!(Arc::ptr_eq(&got, &second));
        drop(g2);
        let got = r.get("a").expect("a is registered");
        assert!(Arc::ptr_eq(&got, &original));
        assert_eq!(r.names(), vec!["a", "b"]);
    }

    #[test]
    fn snapshot_includes_overrides() {
        let r = registry(&["a", "b"]);
        let guard = r.scoped_override([("a", None::<Arc<dyn Provider>>)]);
        let snapshot = r.snapshot();
        drop(guard);
        assert_eq!(snapshot.names(), vec!["b"]);
        assert_eq!(r.names(), vec!["a", "b"]);
    }

    #[test]
    fn scoped_override_restores_on_panic() {
        let r = registry(&["a", "b"]);
        let clone = r.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = clone.scoped_override([("a", None::<Arc<dyn Provider>>)]);
            assert_eq!(clone.names(), vec!["b"]);
            panic!("test-only panic");
        }));
        assert!(result.is_err());
        assert_eq!(r.names(), vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn scoped_override_restores_on_cancellation() {
        let r = registry(&["a", "b"]);
        let clone = r.clone();
        let task = async move {
            let _guard = clone.scoped_override([("a", None::<Arc<dyn Provider>>)]);
            std::future::pending::<()>().await;
        };
        let got = tokio::time::timeout(std::time::Duration::from_secs(1), task).await;
        assert!(got.is_err());
        assert_eq!(r.names(), vec!["a", "b"]);
    }
}
