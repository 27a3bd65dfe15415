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

use crate::Result;
use crate::constants::{CACHE_DIR_ENV_VAR, CRATE_NAME};
use crate::env::non_empty_var;
use crate::errors;
use crate::params::ClientIdentity;
use crate::scopes::ScopeSet;
use crate::token::{EXPIRY_SKEW, Token};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Mutex;
// `Instant` does not survive the process, the cache stores wall clock times.
use tokio::time::Instant;

const HASH_LEN: usize = 16;

/// Identifies the kind of token that would satisfy a request.
///
/// The key does not include the account: one key may have cached
/// credentials for many accounts.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    scopes: ScopeSet,
    app: ClientIdentity,
    package: String,
}

impl CacheKey {
    pub fn new<S: Into<String>>(scopes: ScopeSet, app: ClientIdentity, package: S) -> Self {
        Self {
            scopes,
            app,
            package: package.into(),
        }
    }

    pub fn scopes(&self) -> &ScopeSet {
        &self.scopes
    }

    pub fn app(&self) -> &ClientIdentity {
        &self.app
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// A short, stable digest of the key.
    ///
    /// The digest depends only on the client id, the package, and the set of
    /// scopes. The order in which the scopes were provided does not matter.
    pub fn hash(&self) -> String {
        let canonical = format!(
            "{}\n{}\n{}",
            self.app.client_id(),
            self.package,
            self.scopes.joined(" ")
        );
        let digest = Sha256::digest(canonical.as_bytes());
        let mut encoded = hex::encode(digest);
        encoded.truncate(HASH_LEN);
        encoded
    }

    /// Identifies the entry for `email` under this key.
    pub fn content_hash(&self, email: &str) -> String {
        format!("{}_{email}", self.hash())
    }
}

/// A user credential, as stored in the cache.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCredential {
    pub access_token: String,
    pub token_type: String,
    #[serde(default, with = "time::serde::timestamp::option")]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl StoredCredential {
    pub fn from_token(token: &Token, refresh_token: Option<String>) -> Self {
        let expires_at = token.expires_at.map(|e| {
            OffsetDateTime::now_utc() + e.saturating_duration_since(Instant::now())
        });
        Self {
            access_token: token.token.clone(),
            token_type: token.token_type.clone(),
            expires_at,
            refresh_token,
        }
    }

    pub fn to_token(&self) -> Token {
        let expires_at = self.expires_at.map(|e| {
            let remaining = std::time::Duration::try_from(e - OffsetDateTime::now_utc())
                .unwrap_or_default();
            Instant::now() + remaining
        });
        Token {
            token: self.access_token.clone(),
            token_type: self.token_type.clone(),
            expires_at,
            metadata: None,
        }
    }

    /// Returns `true` if the access token has expired, or expires in the
    /// next few seconds.
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|e| e <= OffsetDateTime::now_utc() + EXPIRY_SKEW)
    }
}

impl std::fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredCredential")
            .field("access_token", &"[censored]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[censored]"),
            )
            .finish()
    }
}

/// A cached user credential.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub key: CacheKey,
    /// The account that owns the credential.
    pub email: String,
    pub credential: StoredCredential,
    /// Identifies the entry without reading the credential, see
    /// [CacheKey::content_hash].
    pub content_hash: String,
}

impl CacheEntry {
    pub fn new<S: Into<String>>(key: CacheKey, email: S, credential: StoredCredential) -> Self {
        let email = email.into();
        let content_hash = key.content_hash(&email);
        Self {
            key,
            email,
            credential,
            content_hash,
        }
    }
}

/// Persists cache entries.
///
/// Implementations return the entries in insertion order. Writing an entry
/// with the content hash of an existing entry replaces it and keeps its
/// position.
#[async_trait::async_trait]
pub trait CacheStore: std::fmt::Debug + Send + Sync {
    /// Returns the entries that may belong to `key`.
    ///
    /// Implementations may return entries for other keys, the cache filters
    /// them out.
    async fn read_entries(&self, key: &CacheKey) -> Result<Vec<CacheEntry>>;

    async fn write_entry(&self, entry: &CacheEntry) -> Result<()>;
}

/// The store of cached user credentials, see [CacheStore].
#[derive(Clone, Debug)]
pub struct TokenCache {
    store: Arc<dyn CacheStore>,
}

impl TokenCache {
    pub fn new<T: CacheStore + 'static>(store: T) -> Self {
        Self::from_arc(Arc::new(store))
    }

    pub fn from_arc(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Returns the entries whose key is exactly `key`, in insertion order.
    ///
    /// Entries for a superset (or subset) of the scopes, or for a different
    /// client, are never returned. A store that cannot be read is treated as
    /// empty.
    pub async fn query(&self, key: &CacheKey) -> Vec<CacheEntry> {
        match self.store.read_entries(key).await {
            Ok(entries) => entries.into_iter().filter(|e| e.key == *key).collect(),
            Err(e) => {
                tracing::warn!("cannot read the token cache, treating it as empty: {e}");
                Vec::new()
            }
        }
    }

    /// Stores `credential` for `email`, replacing any previous credential
    /// for the same key and account.
    pub async fn insert<S: Into<String>>(
        &self,
        key: CacheKey,
        email: S,
        credential: StoredCredential,
    ) -> Result<CacheEntry> {
        let entry = CacheEntry::new(key, email, credential);
        self.store.write_entry(&entry).await?;
        Ok(entry)
    }
}

/// A [CacheStore] that lives only as long as the process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<Vec<CacheEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryStore {
    async fn read_entries(&self, key: &CacheKey) -> Result<Vec<CacheEntry>> {
        let entries = self.entries.lock().await;
        Ok(entries.iter().filter(|e| e.key == *key).cloned().collect())
    }

    async fn write_entry(&self, entry: &CacheEntry) -> Result<()> {
        let mut entries = self.entries.lock().await;
        match entries
            .iter_mut()
            .find(|e| e.content_hash == entry.content_hash)
        {
            Some(existing) => *existing = entry.clone(),
            None => entries.push(entry.clone()),
        }
        Ok(())
    }
}

/// A [CacheStore] keeping one JSON file per entry in a directory.
///
/// Files are named after the [key hash][CacheKey::hash] followed by a
/// SHA-256 digest of the email, so the entries for a key are found by
/// listing the directory, and distinct accounts never share a file. Each write goes to a temporary file
/// that is then renamed over the target, so concurrent readers (and other
/// processes) never observe a partial entry. Files that disappear, cannot
/// be read, or cannot be parsed are skipped.
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

#[derive(Debug, Deserialize, Serialize)]
struct EntryFile {
    client_id: String,
    package: String,
    scopes: Vec<String>,
    email: String,
    credential: StoredCredential,
    // Nanoseconds since the epoch at the first write of this entry.
    inserted: u64,
}

impl FileStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// Creates a store in the [default_cache_dir], if one can be found.
    pub fn with_default_dir() -> Option<Self> {
        default_cache_dir().map(Self::new)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &CacheKey, email: &str) -> PathBuf {
        self.dir.join(file_name(key, email))
    }

    async fn read_file(path: &Path) -> Option<EntryFile> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("skipping token cache file {}: {e}", path.display());
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(f) => Some(f),
            Err(e) => {
                tracing::warn!("skipping malformed token cache file {}: {e}", path.display());
                None
            }
        }
    }
}

// The email comes from the OAuth2 flow, it may contain any character.
fn file_name(key: &CacheKey, email: &str) -> String {
    let digest = Sha256::digest(email.as_bytes());
    format!("{}_{}", key.hash(), hex::encode(digest))
}

fn now_nanos() -> u64 {
    u64::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos()).unwrap_or_default()
}

#[async_trait::async_trait]
impl CacheStore for FileStore {
    async fn read_entries(&self, key: &CacheKey) -> Result<Vec<CacheEntry>> {
        let prefix = format!("{}_", key.hash());
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(errors::transient(e)),
        };

        let mut found = Vec::new();
        while let Some(item) = dir.next_entry().await.map_err(errors::transient)? {
            let name = item.file_name();
            if !name.to_string_lossy().starts_with(&prefix) {
                continue;
            }
            let Some(file) = Self::read_file(&item.path()).await else {
                continue;
            };
            let entry_key = CacheKey::new(
                file.scopes.into_iter().collect(),
                ClientIdentity::new(file.client_id),
                file.package,
            );
            found.push((
                file.inserted,
                CacheEntry::new(entry_key, file.email, file.credential),
            ));
        }
        found.sort_by(|(a, x), (b, y)| a.cmp(b).then_with(|| x.email.cmp(&y.email)));
        Ok(found.into_iter().map(|(_, e)| e).collect())
    }

    async fn write_entry(&self, entry: &CacheEntry) -> Result<()> {
        let path = self.path(&entry.key, &entry.email);
        let inserted = match tokio::fs::try_exists(&path).await {
            Ok(true) => Self::read_file(&path).await.map(|f| f.inserted),
            _ => None,
        }
        .unwrap_or_else(now_nanos);

        let file = EntryFile {
            client_id: entry.key.app().client_id().to_string(),
            package: entry.key.package().to_string(),
            scopes: entry.key.scopes().iter().map(str::to_string).collect(),
            email: entry.email.clone(),
            credential: entry.credential.clone(),
            inserted,
        };
        let contents = serde_json::to_vec_pretty(&file).map_err(errors::non_transient)?;

        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::create_dir_all(&dir)?;
            // The temporary file is created with owner-only permissions.
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&contents)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(errors::non_transient)?
        .map_err(errors::non_transient)
    }
}

/// The directory used by [FileStore::with_default_dir].
///
/// In order of preference: `$GOOGLE_TOKEN_FETCH_CACHE`, then
/// `$XDG_CACHE_HOME/google-cloud-token-fetch`, then a per-user location:
/// `$HOME/.cache/google-cloud-token-fetch` on Unix and
/// `%LOCALAPPDATA%\google-cloud-token-fetch` on Windows.
pub fn default_cache_dir() -> Option<PathBuf> {
    if let Some(dir) = non_empty_var(CACHE_DIR_ENV_VAR) {
        return Some(PathBuf::from(dir));
    }
    if let Some(dir) = non_empty_var("XDG_CACHE_HOME") {
        return Some(PathBuf::from(dir).join(CRATE_NAME));
    }
    platform_cache_root().map(|root| root.join(CRATE_NAME))
}

#[cfg(target_os = "windows")]
fn platform_cache_root() -> Option<PathBuf> {
    non_empty_var("LOCALAPPDATA").map(PathBuf::from)
}

#[cfg(not(target_os = "windows"))]
fn platform_cache_root() -> Option<PathBuf> {
    non_empty_var("HOME").map(|home| PathBuf::from(home).join(".cache"))
}
