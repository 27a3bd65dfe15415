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

//! Sets of OAuth2 [scopes].
//!
//! [scopes]: https://developers.google.com/identity/protocols/oauth2/scopes

use crate::constants::{GOOGLE_SCOPE_PREFIX, OPENID_SCOPES};
use std::collections::BTreeSet;

/// An unordered, deduplicated set of scopes.
///
/// Two sets are equal if they contain the same scopes, regardless of the
/// order in which they were provided.
///
/// # Example
/// ```
/// # use google_cloud_token_fetch::scopes::ScopeSet;
/// let a = ScopeSet::from(["b", "a", "a"]);
/// let b = ScopeSet::from(["a", "b"]);
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 2);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if every scope in `other` is also in `self`.
    pub fn is_superset_of(&self, other: &ScopeSet) -> bool {
        self.0.is_superset(&other.0)
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates the scopes in lexicographic order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Joins the scopes, in lexicographic order, with `sep`.
    pub fn joined(&self, sep: &str) -> String {
        self.iter().collect::<Vec<_>>().join(sep)
    }

    /// Returns `true` if all the scopes are recognizably Google scopes.
    ///
    /// The empty set is not Google-scoped.
    pub fn is_google_scoped(&self) -> bool {
        !self.is_empty()
            && self
                .iter()
                .all(|s| s.starts_with(GOOGLE_SCOPE_PREFIX) || OPENID_SCOPES.contains(&s))
    }
}

impl<S: Into<String>> FromIterator<S> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for ScopeSet {
    fn from(value: [S; N]) -> Self {
        value.into_iter().collect()
    }
}

impl<S: Into<String>> From<Vec<S>> for ScopeSet {
    fn from(value: Vec<S>) -> Self {
        value.into_iter().collect()
    }
}

impl std::fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.joined(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn set_equality() {
        let a = ScopeSet::from(["drive", "gmail", "drive"]);
        let b = ScopeSet::from(vec!["gmail", "drive"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.joined(" "), "drive gmail");
        assert_eq!(a.to_string(), "[drive, gmail]");
    }

    #[test]
    fn superset() {
        let wide = ScopeSet::from(["a", "b", "c"]);
        let narrow = ScopeSet::from(["a", "c"]);
        assert!(wide.is_superset_of(&narrow));
        assert!(!narrow.is_superset_of(&wide));
        assert!(wide.is_superset_of(&wide));
        assert!(narrow.is_superset_of(&ScopeSet::new()));
    }

    #[test_case(&["https://www.googleapis.com/auth/drive"], true)]
    #[test_case(&["https://www.googleapis.com/auth/drive", "email"], true)]
    #[test_case(&["openid", "profile"], true)]
    #[test_case(&["https://example.com/auth/drive"], false)]
    #[test_case(&["https://www.googleapis.com/auth/drive", "repo"], false)]
    #[test_case(&[], false)]
    fn google_scoped(scopes: &[&str], want: bool) {
        let scopes = scopes.iter().copied().collect::<ScopeSet>();
        assert_eq!(scopes.is_google_scoped(), want, "{scopes}");
    }
}
